use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::ledger::LedgerDocumentRef;
use super::task::{Task, TaskLine, TaskType};
use super::{OperationKind, TransitionRecord};
use crate::errors::ServiceError;
use crate::workflow::{require_lines, TransitionRule, Workflow};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum WaveStatus {
    Draft,
    Released,
    Picking,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum WaveTransition {
    Release,
    #[strum(serialize = "Start Picking")]
    StartPicking,
    Complete,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum WaveOrderStatus {
    Pending,
    Picked,
}

/// Back-reference to a source order contributing demand to the wave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveOrder {
    pub order_id: String,
    pub customer: Option<String>,
    pub row_status: WaveOrderStatus,
}

/// Quantity one source order contributed to a consolidated line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAllocation {
    pub order_id: String,
    pub qty: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveItem {
    pub item_code: String,
    pub uom: Option<String>,
    pub total_qty: Decimal,
    pub picked_qty: Decimal,
    pub source_bin: Option<String>,
    pub batch_no: Option<String>,
    pub sources: Vec<OrderAllocation>,
}

/// A batch of consolidated demand released as a single pick task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavePick {
    pub id: Uuid,
    pub warehouse: String,
    pub assigned_to: Option<String>,
    status: WaveStatus,
    orders: Vec<WaveOrder>,
    items: Vec<WaveItem>,
    pub pick_task: Option<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    history: Vec<TransitionRecord>,
    documents: Vec<LedgerDocumentRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WavePick {
    pub fn new(warehouse: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            warehouse: warehouse.into(),
            assigned_to: None,
            status: WaveStatus::Draft,
            orders: Vec::new(),
            items: Vec::new(),
            pick_task: None,
            completed_at: None,
            history: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn orders(&self) -> &[WaveOrder] {
        &self.orders
    }

    pub fn items(&self) -> &[WaveItem] {
        &self.items
    }

    pub fn total_orders(&self) -> usize {
        self.orders.len()
    }

    pub fn total_qty(&self) -> Decimal {
        self.items.iter().map(|i| i.total_qty).sum()
    }

    fn ensure_draft(&self, action: &str) -> Result<(), ServiceError> {
        if self.status != WaveStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "Cannot {} on a {} wave",
                action, self.status
            )));
        }
        Ok(())
    }

    /// Adds a contributing source order; duplicates are rejected.
    pub fn add_order(
        &mut self,
        order_id: impl Into<String>,
        customer: Option<String>,
    ) -> Result<(), ServiceError> {
        self.ensure_draft("add orders")?;
        let order_id = order_id.into();
        if order_id.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Order reference is required".to_string(),
            ));
        }
        if self.orders.iter().any(|o| o.order_id == order_id) {
            return Err(ServiceError::ValidationError(format!(
                "Order {} is already part of this wave",
                order_id
            )));
        }
        self.orders.push(WaveOrder {
            order_id,
            customer,
            row_status: WaveOrderStatus::Pending,
        });
        self.discard_consolidation();
        Ok(())
    }

    pub fn remove_order(&mut self, order_id: &str) -> Result<(), ServiceError> {
        self.ensure_draft("remove orders")?;
        let before = self.orders.len();
        self.orders.retain(|o| o.order_id != order_id);
        if self.orders.len() == before {
            return Err(ServiceError::NotFound(format!(
                "Order {} is not part of this wave",
                order_id
            )));
        }
        self.discard_consolidation();
        Ok(())
    }

    /// The order set changed, so the consolidated list must be rebuilt.
    fn discard_consolidation(&mut self) {
        self.items.clear();
        self.updated_at = Utc::now();
    }

    /// First order referenced by a consolidated line but no longer in the wave.
    fn stale_source(&self) -> Option<&str> {
        self.items
            .iter()
            .flat_map(|item| item.sources.iter())
            .map(|source| source.order_id.as_str())
            .find(|order_id| !self.orders.iter().any(|o| o.order_id == *order_id))
    }

    /// Discards the consolidated list and installs a new one.
    pub(crate) fn replace_items(&mut self, items: Vec<WaveItem>) -> Result<(), ServiceError> {
        self.ensure_draft("consolidate items")?;
        self.items = items;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Builds the pick task carrying the consolidated demand.
    pub fn pick_task(&self) -> Result<Task, ServiceError> {
        let mut task = Task::new(TaskType::Pick, Some(self.warehouse.clone()), None)?;
        task.assigned_to = self.assigned_to.clone();
        task.reference = Some((OperationKind::WavePick, self.id));
        task.items = self
            .items
            .iter()
            .map(|item| {
                let mut line = TaskLine::new(item.item_code.clone(), item.total_qty);
                line.uom = item.uom.clone();
                line.source_bin = item.source_bin.clone();
                line.batch_no = item.batch_no.clone();
                line
            })
            .collect();
        Ok(task)
    }
}

impl Workflow for WavePick {
    type Status = WaveStatus;
    type Transition = WaveTransition;

    const KIND: OperationKind = OperationKind::WavePick;
    const TERMINAL: &'static [WaveStatus] = &[WaveStatus::Completed, WaveStatus::Cancelled];

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> WaveStatus {
        self.status
    }

    fn set_status(&mut self, status: WaveStatus) {
        self.status = status;
    }

    fn rule(transition: WaveTransition) -> TransitionRule<WaveStatus> {
        use WaveStatus::*;
        match transition {
            WaveTransition::Release => TransitionRule::new(&[Draft], Released),
            WaveTransition::StartPicking => TransitionRule::new(&[Released], Picking),
            WaveTransition::Complete => TransitionRule::new(&[Picking], Completed),
            WaveTransition::Cancel => TransitionRule::new(&[Draft, Released, Picking], Cancelled),
        }
    }

    fn guard(&self, transition: WaveTransition) -> Result<(), ServiceError> {
        match transition {
            WaveTransition::Release => {
                require_lines(&self.orders, "Add orders before releasing the wave")?;
                require_lines(&self.items, "Consolidate items before releasing the wave")?;
                match self.stale_source() {
                    Some(order_id) => Err(ServiceError::ValidationError(format!(
                        "Consolidated items reference order {} which is not in the wave; consolidate again",
                        order_id
                    ))),
                    None => Ok(()),
                }
            }
            WaveTransition::StartPicking => {
                require_lines(&self.items, "No items to create pick task for")
            }
            _ => Ok(()),
        }
    }

    fn on_transition(&mut self, transition: WaveTransition, at: DateTime<Utc>) {
        if transition == WaveTransition::Complete {
            for order in &mut self.orders {
                order.row_status = WaveOrderStatus::Picked;
            }
            self.completed_at = Some(at);
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(code: &str, qty: Decimal) -> WaveItem {
        WaveItem {
            item_code: code.to_string(),
            uom: None,
            total_qty: qty,
            picked_qty: Decimal::ZERO,
            source_bin: None,
            batch_no: None,
            sources: Vec::new(),
        }
    }

    #[test]
    fn duplicate_orders_are_rejected_on_add() {
        let mut wave = WavePick::new("WH-1");
        wave.add_order("SO-1", None).unwrap();
        let dup = wave.add_order("SO-1", None);
        assert!(matches!(dup, Err(ServiceError::ValidationError(_))));
        assert_eq!(wave.total_orders(), 1);
    }

    #[test]
    fn orders_are_frozen_after_release() {
        let mut wave = WavePick::new("WH-1");
        wave.add_order("SO-1", None).unwrap();
        wave.set_status(WaveStatus::Released);
        assert!(matches!(
            wave.add_order("SO-2", None),
            Err(ServiceError::InvalidState(_))
        ));
        assert!(matches!(
            wave.remove_order("SO-1"),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn release_requires_orders_and_items() {
        let mut wave = WavePick::new("WH-1");
        assert!(wave.guard(WaveTransition::Release).is_err());
        wave.add_order("SO-1", None).unwrap();
        assert!(wave.guard(WaveTransition::Release).is_err());
        wave.replace_items(vec![item("ITEM-A", dec!(3))]).unwrap();
        assert!(wave.guard(WaveTransition::Release).is_ok());
    }

    #[test]
    fn pick_task_mirrors_consolidated_items() {
        let mut wave = WavePick::new("WH-1");
        wave.assigned_to = Some("picker@example.com".into());
        wave.replace_items(vec![item("ITEM-A", dec!(3)), item("ITEM-B", dec!(1))])
            .unwrap();

        let task = wave.pick_task().unwrap();
        assert_eq!(task.task_type, TaskType::Pick);
        assert_eq!(task.items.len(), 2);
        assert_eq!(task.source_warehouse.as_deref(), Some("WH-1"));
        assert_eq!(task.reference, Some((OperationKind::WavePick, wave.id)));
    }

    #[test]
    fn completion_marks_orders_picked() {
        let mut wave = WavePick::new("WH-1");
        wave.add_order("SO-1", None).unwrap();
        wave.add_order("SO-2", None).unwrap();
        wave.on_transition(WaveTransition::Complete, Utc::now());
        assert!(wave
            .orders()
            .iter()
            .all(|o| o.row_status == WaveOrderStatus::Picked));
        assert!(wave.completed_at.is_some());
    }

    #[test]
    fn changing_orders_discards_consolidated_items() {
        let mut wave = WavePick::new("WH-1");
        wave.add_order("SO-1", None).unwrap();
        wave.replace_items(vec![item("ITEM-A", dec!(3))]).unwrap();

        wave.add_order("SO-2", None).unwrap();
        assert!(wave.items().is_empty());

        wave.replace_items(vec![item("ITEM-A", dec!(5))]).unwrap();
        wave.remove_order("SO-2").unwrap();
        assert!(wave.items().is_empty());
        assert!(matches!(
            wave.guard(WaveTransition::Release),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn release_refuses_items_from_departed_orders() {
        let mut wave = WavePick::new("WH-1");
        wave.add_order("SO-1", None).unwrap();
        let mut line = item("ITEM-A", dec!(8));
        line.sources = vec![
            OrderAllocation {
                order_id: "SO-1".into(),
                qty: dec!(5),
            },
            OrderAllocation {
                order_id: "SO-9".into(),
                qty: dec!(3),
            },
        ];
        wave.replace_items(vec![line]).unwrap();

        assert!(matches!(
            wave.guard(WaveTransition::Release),
            Err(ServiceError::ValidationError(msg)) if msg.contains("SO-9")
        ));
    }
}
