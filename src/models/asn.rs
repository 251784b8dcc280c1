use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::ledger::{LedgerDocumentKind, LedgerDocumentRef, LedgerLine, LedgerPayload, LedgerRequest};
use super::task::{Task, TaskLine, TaskType};
use super::{non_empty, OperationKind, StockKey, TransitionRecord};
use crate::errors::ServiceError;
use crate::reconciliation::{receiving_variance, ReceivingVariance};
use crate::workflow::{require_lines, TransitionRule, Workflow};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum AsnStatus {
    Draft,
    Confirmed,
    Arrived,
    Unloading,
    Sorted,
    #[strum(serialize = "Putaway Created")]
    PutawayCreated,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum AsnTransition {
    Confirm,
    #[strum(serialize = "Mark Arrived")]
    MarkArrived,
    #[strum(serialize = "Start Unloading")]
    StartUnloading,
    #[strum(serialize = "Complete Sorting")]
    CompleteSorting,
    #[strum(serialize = "Create Putaway")]
    CreatePutaway,
    Complete,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum AsnLineStatus {
    Pending,
    Received,
    Short,
    Damaged,
}

/// One expected item on an inbound shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsnLine {
    pub id: Uuid,
    pub item_code: String,
    pub uom: Option<String>,
    pub expected_qty: Decimal,
    received_qty: Decimal,
    damage_qty: Decimal,
    variance: ReceivingVariance,
    pub target_bin: Option<String>,
    pub batch_no: Option<String>,
    pub row_status: AsnLineStatus,
}

impl AsnLine {
    pub fn new(item_code: impl Into<String>, expected_qty: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_code: item_code.into(),
            uom: None,
            expected_qty,
            received_qty: Decimal::ZERO,
            damage_qty: Decimal::ZERO,
            variance: receiving_variance(expected_qty, Decimal::ZERO),
            target_bin: None,
            batch_no: None,
            row_status: AsnLineStatus::Pending,
        }
    }

    pub fn with_target_bin(mut self, bin: impl Into<String>) -> Self {
        self.target_bin = Some(bin.into());
        self
    }

    pub fn with_batch(mut self, batch_no: impl Into<String>) -> Self {
        self.batch_no = Some(batch_no.into());
        self
    }

    pub fn received_qty(&self) -> Decimal {
        self.received_qty
    }

    pub fn damage_qty(&self) -> Decimal {
        self.damage_qty
    }

    pub fn shortage_qty(&self) -> Decimal {
        self.variance.shortage
    }

    pub fn overage_qty(&self) -> Decimal {
        self.variance.overage
    }

    fn record(&mut self, received: Decimal, damaged: Decimal) -> Result<(), ServiceError> {
        if received.is_sign_negative() || damaged.is_sign_negative() {
            return Err(ServiceError::ValidationError(format!(
                "Quantities for {} cannot be negative",
                self.item_code
            )));
        }
        self.received_qty = received;
        self.damage_qty = damaged;
        self.variance = receiving_variance(self.expected_qty, received);
        Ok(())
    }

    fn classify(&mut self) {
        self.row_status = if self.received_qty > Decimal::ZERO {
            if self.variance.shortage > Decimal::ZERO {
                AsnLineStatus::Short
            } else {
                AsnLineStatus::Received
            }
        } else if self.damage_qty > Decimal::ZERO {
            AsnLineStatus::Damaged
        } else {
            AsnLineStatus::Pending
        };
    }
}

/// Advanced shipping notice tracked through receiving and put-away.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asn {
    pub id: Uuid,
    pub supplier: Option<String>,
    pub warehouse: String,
    pub receiving_bin: Option<String>,
    pub purchase_order: Option<String>,
    pub expected_arrival: Option<DateTime<Utc>>,
    pub actual_arrival: Option<DateTime<Utc>>,
    status: AsnStatus,
    pub items: Vec<AsnLine>,
    pub putaway_task: Option<Uuid>,
    history: Vec<TransitionRecord>,
    documents: Vec<LedgerDocumentRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asn {
    pub fn new(warehouse: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            supplier: None,
            warehouse: warehouse.into(),
            receiving_bin: None,
            purchase_order: None,
            expected_arrival: None,
            actual_arrival: None,
            status: AsnStatus::Draft,
            items: Vec::new(),
            putaway_task: None,
            history: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_supplier(mut self, supplier: impl Into<String>) -> Self {
        self.supplier = Some(supplier.into());
        self
    }

    pub fn with_purchase_order(mut self, purchase_order: impl Into<String>) -> Self {
        self.purchase_order = Some(purchase_order.into());
        self
    }

    pub fn with_receiving_bin(mut self, bin: impl Into<String>) -> Self {
        self.receiving_bin = Some(bin.into());
        self
    }

    pub fn with_line(mut self, line: AsnLine) -> Self {
        self.items.push(line);
        self
    }

    pub fn documents(&self) -> &[LedgerDocumentRef] {
        &self.documents
    }

    pub fn total_expected(&self) -> Decimal {
        self.items.iter().map(|l| l.expected_qty).sum()
    }

    pub fn total_received(&self) -> Decimal {
        self.items.iter().map(|l| l.received_qty).sum()
    }

    pub fn total_shortage(&self) -> Decimal {
        self.items.iter().map(|l| l.shortage_qty()).sum()
    }

    pub fn total_damage(&self) -> Decimal {
        self.items.iter().map(|l| l.damage_qty).sum()
    }

    /// Records the physical receipt of a line while the truck is being worked.
    pub fn record_receipt(
        &mut self,
        line_id: Uuid,
        received: Decimal,
        damaged: Decimal,
    ) -> Result<(), ServiceError> {
        if !matches!(self.status, AsnStatus::Arrived | AsnStatus::Unloading) {
            return Err(ServiceError::InvalidState(format!(
                "Receipts can only be recorded on Arrived or Unloading ASNs, not {}",
                self.status
            )));
        }
        let line = self
            .items
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| ServiceError::NotFound(format!("ASN line {}", line_id)))?;
        line.record(received, damaged)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn received_lines(&self) -> impl Iterator<Item = &AsnLine> + '_ {
        self.items.iter().filter(|l| l.received_qty > Decimal::ZERO)
    }

    /// Builds the put-away task for received lines.
    pub fn putaway_task(&self) -> Result<Task, ServiceError> {
        let mut task = Task::new(TaskType::Putaway, None, Some(self.warehouse.clone()))?;
        task.target_bin = self.receiving_bin.clone();
        task.reference = Some((OperationKind::Asn, self.id));
        for line in self.received_lines() {
            let mut row = TaskLine::new(line.item_code.clone(), line.received_qty);
            row.uom = line.uom.clone();
            row.target_bin = line.target_bin.clone();
            row.batch_no = line.batch_no.clone();
            task.items.push(row);
        }
        Ok(task)
    }
}

impl Workflow for Asn {
    type Status = AsnStatus;
    type Transition = AsnTransition;

    const KIND: OperationKind = OperationKind::Asn;
    const TERMINAL: &'static [AsnStatus] = &[AsnStatus::Completed, AsnStatus::Cancelled];

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> AsnStatus {
        self.status
    }

    fn set_status(&mut self, status: AsnStatus) {
        self.status = status;
    }

    fn rule(transition: AsnTransition) -> TransitionRule<AsnStatus> {
        use AsnStatus::*;
        match transition {
            AsnTransition::Confirm => TransitionRule::new(&[Draft], Confirmed),
            AsnTransition::MarkArrived => TransitionRule::new(&[Confirmed], Arrived),
            AsnTransition::StartUnloading => TransitionRule::new(&[Arrived], Unloading),
            AsnTransition::CompleteSorting => TransitionRule::new(&[Unloading], Sorted),
            AsnTransition::CreatePutaway => TransitionRule::new(&[Sorted], PutawayCreated),
            AsnTransition::Complete => TransitionRule::new(&[PutawayCreated], Completed),
            AsnTransition::Cancel => TransitionRule::new(
                &[Draft, Confirmed, Arrived, Unloading, Sorted, PutawayCreated],
                Cancelled,
            ),
        }
    }

    fn guard(&self, transition: AsnTransition) -> Result<(), ServiceError> {
        match transition {
            AsnTransition::Confirm => require_lines(&self.items, "Add items before confirming the ASN"),
            AsnTransition::CreatePutaway => {
                if self.received_lines().next().is_none() {
                    return Err(ServiceError::ValidationError(
                        "No received items to create putaway task for".to_string(),
                    ));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_transition(&mut self, transition: AsnTransition, at: DateTime<Utc>) {
        match transition {
            AsnTransition::MarkArrived => self.actual_arrival = Some(at),
            AsnTransition::CompleteSorting => self.items.iter_mut().for_each(AsnLine::classify),
            _ => {}
        }
    }

    fn stock_movements(&self, transition: AsnTransition) -> Vec<StockKey> {
        if transition != AsnTransition::CreatePutaway {
            return Vec::new();
        }
        self.received_lines()
            .map(|line| {
                let bin = non_empty(&line.target_bin).or(non_empty(&self.receiving_bin));
                StockKey::new(
                    &line.item_code,
                    Some(&self.warehouse),
                    bin,
                    non_empty(&line.batch_no),
                )
            })
            .collect()
    }

    fn ledger_requests(&self, transition: AsnTransition) -> Vec<LedgerRequest> {
        if transition != AsnTransition::Complete {
            return Vec::new();
        }
        let lines: Vec<LedgerLine> = self
            .received_lines()
            .map(|line| LedgerLine {
                uom: line.uom.clone(),
                target_warehouse: Some(self.warehouse.clone()),
                target_bin: line.target_bin.clone(),
                batch_no: line.batch_no.clone(),
                against: self.purchase_order.clone(),
                ..LedgerLine::new(line.item_code.clone(), line.received_qty)
            })
            .collect();
        if lines.is_empty() {
            return Vec::new();
        }
        let payload = LedgerPayload::new(Self::KIND, self.id, lines)
            .with_party(self.supplier.clone())
            .with_warehouse(Some(self.warehouse.clone()));
        vec![LedgerRequest::new(LedgerDocumentKind::PurchaseReceipt, payload)]
    }

    fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    fn record_transition(&mut self, entry: TransitionRecord, documents: Vec<LedgerDocumentRef>) {
        self.updated_at = entry.at;
        self.history.push(entry);
        self.documents.extend(documents);
    }
}
