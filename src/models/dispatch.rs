use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::ledger::{LedgerDocumentKind, LedgerDocumentRef, LedgerLine, LedgerPayload, LedgerRequest};
use super::{non_empty, OperationKind, StockKey, TransitionRecord};
use crate::errors::ServiceError;
use crate::external::OrderLine;
use crate::workflow::{require_lines, TransitionRule, Workflow};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum DispatchStatus {
    Pending,
    Allocated,
    Picked,
    Packed,
    Weighed,
    Dispatched,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum DispatchTransition {
    Allocate,
    #[strum(serialize = "Mark Picked")]
    MarkPicked,
    #[strum(serialize = "Mark Packed")]
    MarkPacked,
    Weigh,
    Dispatch,
    #[strum(serialize = "Mark Delivered")]
    MarkDelivered,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum DispatchLineStatus {
    Pending,
    Picked,
    Packed,
    Dispatched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchLine {
    pub id: Uuid,
    pub item_code: String,
    pub uom: Option<String>,
    pub ordered_qty: Decimal,
    /// Zero until filled; stage transitions default-fill from the previous stage.
    pub picked_qty: Decimal,
    pub packed_qty: Decimal,
    pub dispatched_qty: Decimal,
    pub weight: Option<Decimal>,
    pub source_bin: Option<String>,
    pub batch_no: Option<String>,
    pub row_status: DispatchLineStatus,
}

impl DispatchLine {
    pub fn new(item_code: impl Into<String>, ordered_qty: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_code: item_code.into(),
            uom: None,
            ordered_qty,
            picked_qty: Decimal::ZERO,
            packed_qty: Decimal::ZERO,
            dispatched_qty: Decimal::ZERO,
            weight: None,
            source_bin: None,
            batch_no: None,
            row_status: DispatchLineStatus::Pending,
        }
    }
}

/// Outbound shipment moving from allocation to delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    pub id: Uuid,
    pub sales_order: Option<String>,
    pub customer: Option<String>,
    pub warehouse: String,
    status: DispatchStatus,
    pub items: Vec<DispatchLine>,
    pub total_weight: Option<Decimal>,
    pub carrier: Option<String>,
    pub tracking_no: Option<String>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    history: Vec<TransitionRecord>,
    documents: Vec<LedgerDocumentRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dispatch {
    pub fn new(warehouse: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sales_order: None,
            customer: None,
            warehouse: warehouse.into(),
            status: DispatchStatus::Pending,
            items: Vec::new(),
            total_weight: None,
            carrier: None,
            tracking_no: None,
            dispatched_at: None,
            delivered_at: None,
            history: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_order(mut self, sales_order: impl Into<String>, customer: Option<String>) -> Self {
        self.sales_order = Some(sales_order.into());
        self.customer = customer;
        self
    }

    pub fn with_line(mut self, line: DispatchLine) -> Self {
        self.items.push(line);
        self
    }

    pub fn documents(&self) -> &[LedgerDocumentRef] {
        &self.documents
    }

    pub fn total_qty(&self) -> Decimal {
        self.items.iter().map(|l| l.ordered_qty).sum()
    }

    pub fn total_dispatched(&self) -> Decimal {
        self.items.iter().map(|l| l.dispatched_qty).sum()
    }

    /// Replaces the lines with the linked sales order's lines.
    pub fn load_order_lines(&mut self, lines: Vec<OrderLine>) -> Result<(), ServiceError> {
        if self.status != DispatchStatus::Pending {
            return Err(ServiceError::InvalidState(format!(
                "Order lines can only be loaded on Pending dispatches, not {}",
                self.status
            )));
        }
        self.items = lines
            .into_iter()
            .map(|line| DispatchLine {
                uom: line.uom,
                ..DispatchLine::new(line.item_code, line.qty)
            })
            .collect();
        self.updated_at = Utc::now();
        Ok(())
    }

    fn dispatched_lines(&self) -> impl Iterator<Item = &DispatchLine> + '_ {
        self.items
            .iter()
            .filter(|l| l.dispatched_qty > Decimal::ZERO)
    }
}

impl Workflow for Dispatch {
    type Status = DispatchStatus;
    type Transition = DispatchTransition;

    const KIND: OperationKind = OperationKind::Dispatch;
    const TERMINAL: &'static [DispatchStatus] =
        &[DispatchStatus::Delivered, DispatchStatus::Cancelled];

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> DispatchStatus {
        self.status
    }

    fn set_status(&mut self, status: DispatchStatus) {
        self.status = status;
    }

    fn rule(transition: DispatchTransition) -> TransitionRule<DispatchStatus> {
        use DispatchStatus::*;
        match transition {
            DispatchTransition::Allocate => TransitionRule::new(&[Pending], Allocated),
            DispatchTransition::MarkPicked => TransitionRule::new(&[Allocated], Picked),
            DispatchTransition::MarkPacked => TransitionRule::new(&[Picked], Packed),
            DispatchTransition::Weigh => TransitionRule::new(&[Packed], Weighed),
            DispatchTransition::Dispatch => TransitionRule::new(&[Weighed], Dispatched),
            DispatchTransition::MarkDelivered => TransitionRule::new(&[Dispatched], Delivered),
            DispatchTransition::Cancel => TransitionRule::new(
                &[Pending, Allocated, Picked, Packed, Weighed],
                Cancelled,
            ),
        }
    }

    fn guard(&self, transition: DispatchTransition) -> Result<(), ServiceError> {
        match transition {
            DispatchTransition::Allocate => require_lines(&self.items, "Add items before allocating"),
            DispatchTransition::Weigh => match self.total_weight {
                Some(w) if w.is_sign_negative() => Err(ServiceError::ValidationError(
                    "Total weight cannot be negative".to_string(),
                )),
                _ => Ok(()),
            },
            DispatchTransition::Dispatch if non_empty(&self.carrier).is_none() => Err(
                ServiceError::ValidationError("A carrier is required to dispatch".to_string()),
            ),
            _ => Ok(()),
        }
    }

    fn on_transition(&mut self, transition: DispatchTransition, at: DateTime<Utc>) {
        match transition {
            DispatchTransition::MarkPicked => {
                for line in &mut self.items {
                    if line.picked_qty.is_zero() {
                        line.picked_qty = line.ordered_qty;
                    }
                    line.row_status = DispatchLineStatus::Picked;
                }
            }
            DispatchTransition::MarkPacked => {
                for line in &mut self.items {
                    if line.packed_qty.is_zero() {
                        line.packed_qty = line.picked_qty;
                    }
                    line.row_status = DispatchLineStatus::Packed;
                }
            }
            DispatchTransition::Dispatch => {
                for line in &mut self.items {
                    if line.dispatched_qty.is_zero() {
                        line.dispatched_qty = if line.packed_qty.is_zero() {
                            line.picked_qty
                        } else {
                            line.packed_qty
                        };
                    }
                    line.row_status = DispatchLineStatus::Dispatched;
                }
                self.dispatched_at = Some(at);
            }
            DispatchTransition::MarkDelivered => self.delivered_at = Some(at),
            _ => {}
        }
    }

    fn stock_movements(&self, transition: DispatchTransition) -> Vec<StockKey> {
        if transition != DispatchTransition::Allocate {
            return Vec::new();
        }
        self.items
            .iter()
            .map(|line| {
                StockKey::new(
                    &line.item_code,
                    Some(&self.warehouse),
                    non_empty(&line.source_bin),
                    non_empty(&line.batch_no),
                )
            })
            .collect()
    }

    fn ledger_requests(&self, transition: DispatchTransition) -> Vec<LedgerRequest> {
        if transition != DispatchTransition::Dispatch {
            return Vec::new();
        }
        let lines: Vec<LedgerLine> = self
            .dispatched_lines()
            .map(|line| LedgerLine {
                uom: line.uom.clone(),
                source_warehouse: Some(self.warehouse.clone()),
                source_bin: line.source_bin.clone(),
                batch_no: line.batch_no.clone(),
                against: self.sales_order.clone(),
                ..LedgerLine::new(line.item_code.clone(), line.dispatched_qty)
            })
            .collect();
        if lines.is_empty() {
            return Vec::new();
        }

        let delivery_note = LedgerPayload::new(Self::KIND, self.id, lines)
            .with_party(self.customer.clone())
            .with_warehouse(Some(self.warehouse.clone()));

        let mut shipment = LedgerPayload::new(Self::KIND, self.id, Vec::new())
            .with_party(self.customer.clone());
        shipment.carrier = self.carrier.clone();
        shipment.tracking_no = self.tracking_no.clone();
        shipment.gross_weight = self.total_weight;

        vec![
            LedgerRequest::new(LedgerDocumentKind::DeliveryNote, delivery_note),
            LedgerRequest::linked(LedgerDocumentKind::Shipment, shipment),
        ]
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
