use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::ledger::{LedgerDocumentKind, LedgerDocumentRef, LedgerLine, LedgerPayload, LedgerRequest};
use super::{non_empty, OperationKind, StockKey, TransitionRecord};
use crate::errors::ServiceError;
use crate::reconciliation::task_difference;
use crate::workflow::{require_lines, TransitionRule, Workflow};

const MATERIAL_TRANSFER: &str = "Material Transfer";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum TaskType {
    Pick,
    Putaway,
    Transfer,
    Count,
    Pack,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum TaskStatus {
    Pending,
    Assigned,
    #[strum(serialize = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum TaskTransition {
    Assign,
    Start,
    Complete,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum TaskLineStatus {
    Pending,
    Completed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLine {
    pub id: Uuid,
    pub item_code: String,
    pub uom: Option<String>,
    /// Required quantity.
    pub qty: Decimal,
    actual_qty: Option<Decimal>,
    difference_qty: Decimal,
    pub source_bin: Option<String>,
    pub target_bin: Option<String>,
    pub batch_no: Option<String>,
    pub pick_sequence: Option<u32>,
    pub error_message: Option<String>,
    pub row_status: TaskLineStatus,
}

impl TaskLine {
    pub fn new(item_code: impl Into<String>, qty: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_code: item_code.into(),
            uom: None,
            qty,
            actual_qty: None,
            difference_qty: Decimal::ZERO,
            source_bin: None,
            target_bin: None,
            batch_no: None,
            pick_sequence: None,
            error_message: None,
            row_status: TaskLineStatus::Pending,
        }
    }

    pub fn with_source_bin(mut self, bin: impl Into<String>) -> Self {
        self.source_bin = Some(bin.into());
        self
    }

    pub fn with_target_bin(mut self, bin: impl Into<String>) -> Self {
        self.target_bin = Some(bin.into());
        self
    }

    pub fn with_batch(mut self, batch_no: impl Into<String>) -> Self {
        self.batch_no = Some(batch_no.into());
        self
    }

    pub fn actual_qty(&self) -> Option<Decimal> {
        self.actual_qty
    }

    pub fn difference_qty(&self) -> Decimal {
        self.difference_qty
    }

    fn refresh_difference(&mut self, is_count: bool) {
        self.difference_qty = match (is_count, self.actual_qty) {
            (true, Some(actual)) => task_difference(self.qty, actual),
            _ => Decimal::ZERO,
        };
    }
}

/// A directed unit of floor work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub task_type: TaskType,
    status: TaskStatus,
    pub source_warehouse: Option<String>,
    pub target_warehouse: Option<String>,
    pub source_bin: Option<String>,
    pub target_bin: Option<String>,
    pub assigned_to: Option<String>,
    /// Operation record that spawned this task.
    pub reference: Option<(OperationKind, Uuid)>,
    pub items: Vec<TaskLine>,
    pub completed_at: Option<DateTime<Utc>>,
    history: Vec<TransitionRecord>,
    documents: Vec<LedgerDocumentRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Creates a Pending task; warehouses are checked against the task type.
    pub fn new(
        task_type: TaskType,
        source_warehouse: Option<String>,
        target_warehouse: Option<String>,
    ) -> Result<Self, ServiceError> {
        let needs_source = matches!(task_type, TaskType::Pick | TaskType::Transfer);
        let needs_target = matches!(task_type, TaskType::Putaway | TaskType::Transfer);

        if needs_source && non_empty(&source_warehouse).is_none() {
            return Err(ServiceError::ValidationError(format!(
                "Source Warehouse is required for {} tasks",
                task_type
            )));
        }
        if needs_target && non_empty(&target_warehouse).is_none() {
            return Err(ServiceError::ValidationError(format!(
                "Target Warehouse is required for {} tasks",
                task_type
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            task_type,
            status: TaskStatus::Pending,
            source_warehouse,
            target_warehouse,
            source_bin: None,
            target_bin: None,
            assigned_to: None,
            reference: None,
            items: Vec::new(),
            completed_at: None,
            history: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn with_line(mut self, line: TaskLine) -> Self {
        self.items.push(line);
        self
    }

    pub fn documents(&self) -> &[LedgerDocumentRef] {
        &self.documents
    }

    pub fn completed_items(&self) -> usize {
        self.items
            .iter()
            .filter(|l| l.row_status == TaskLineStatus::Completed)
            .count()
    }

    fn is_count(&self) -> bool {
        self.task_type == TaskType::Count
    }

    fn ensure_open(&self) -> Result<(), ServiceError> {
        if self.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "Task {} is {}",
                self.id, self.status
            )));
        }
        Ok(())
    }

    fn line_mut(&mut self, line_id: Uuid) -> Result<&mut TaskLine, ServiceError> {
        self.items
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Task line {}", line_id)))
    }

    /// Records the quantity actually handled; recomputes the difference.
    pub fn record_actual(&mut self, line_id: Uuid, actual: Decimal) -> Result<(), ServiceError> {
        self.ensure_open()?;
        if actual.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "Actual quantity cannot be negative".to_string(),
            ));
        }
        let is_count = self.is_count();
        let line = self.line_mut(line_id)?;
        line.actual_qty = Some(actual);
        line.refresh_difference(is_count);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Updates the required quantity; recomputes the difference.
    pub fn set_required(&mut self, line_id: Uuid, qty: Decimal) -> Result<(), ServiceError> {
        self.ensure_open()?;
        let is_count = self.is_count();
        let line = self.line_mut(line_id)?;
        line.qty = qty;
        line.refresh_difference(is_count);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Excludes a line from completion and from the ledger document.
    pub fn skip_line(&mut self, line_id: Uuid) -> Result<(), ServiceError> {
        self.ensure_open()?;
        let line = self.line_mut(line_id)?;
        if line.row_status != TaskLineStatus::Pending {
            return Err(ServiceError::ValidationError(format!(
                "Only Pending lines can be skipped, {} is {}",
                line.item_code, line.row_status
            )));
        }
        line.row_status = TaskLineStatus::Skipped;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn completed_lines(&self) -> impl Iterator<Item = &TaskLine> + '_ {
        self.items
            .iter()
            .filter(|l| l.row_status == TaskLineStatus::Completed)
    }

    fn movement_warehouse(&self) -> Option<&str> {
        non_empty(&self.source_warehouse).or(non_empty(&self.target_warehouse))
    }

    /// Warehouse stock lands in: Putaway and Transfer name it, other types
    /// fall back to the source.
    fn entry_target_warehouse(&self) -> Option<&str> {
        match self.task_type {
            TaskType::Putaway | TaskType::Transfer => non_empty(&self.target_warehouse),
            _ => non_empty(&self.target_warehouse).or(non_empty(&self.source_warehouse)),
        }
    }

    fn line_source_bin<'a>(&'a self, line: &'a TaskLine) -> Option<&'a str> {
        non_empty(&line.source_bin).or(non_empty(&self.source_bin))
    }

    fn line_target_bin<'a>(&'a self, line: &'a TaskLine) -> Option<&'a str> {
        non_empty(&line.target_bin).or(non_empty(&self.target_bin))
    }

    /// Freeze keys for one line: the side stock leaves and the side it
    /// lands on, each with the bin the ledger line will carry.
    fn movement_keys(&self, line: &TaskLine) -> Vec<StockKey> {
        let batch = non_empty(&line.batch_no);
        let source_bin = self.line_source_bin(line);
        let target_bin = self.line_target_bin(line);
        if self.is_count() {
            return vec![StockKey::new(
                &line.item_code,
                self.movement_warehouse(),
                source_bin.or(target_bin),
                batch,
            )];
        }

        let mut keys = Vec::with_capacity(2);
        if let Some(warehouse) = non_empty(&self.source_warehouse) {
            keys.push(StockKey::new(&line.item_code, Some(warehouse), source_bin, batch));
        }
        if let Some(warehouse) = self.entry_target_warehouse() {
            let key = StockKey::new(&line.item_code, Some(warehouse), target_bin, batch);
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            keys.push(StockKey::new(
                &line.item_code,
                None,
                source_bin.or(target_bin),
                batch,
            ));
        }
        keys
    }

    fn stock_entry_lines(&self) -> Vec<LedgerLine> {
        let target = self.entry_target_warehouse().map(str::to_string);
        self.completed_lines()
            .map(|line| LedgerLine {
                uom: line.uom.clone(),
                source_warehouse: self.source_warehouse.clone(),
                target_warehouse: target.clone(),
                source_bin: self.line_source_bin(line).map(str::to_string),
                target_bin: self.line_target_bin(line).map(str::to_string),
                batch_no: line.batch_no.clone(),
                ..LedgerLine::new(line.item_code.clone(), line.actual_qty.unwrap_or(line.qty))
            })
            .collect()
    }

    fn reconciliation_lines(&self) -> Vec<LedgerLine> {
        let warehouse = self.movement_warehouse().map(str::to_string);
        self.completed_lines()
            .filter(|line| !line.difference_qty.is_zero())
            .map(|line| LedgerLine {
                uom: line.uom.clone(),
                target_warehouse: warehouse.clone(),
                target_bin: self
                    .line_source_bin(line)
                    .or(self.line_target_bin(line))
                    .map(str::to_string),
                batch_no: line.batch_no.clone(),
                ..LedgerLine::new(line.item_code.clone(), line.actual_qty.unwrap_or(line.qty))
            })
            .collect()
    }
}

impl Workflow for Task {
    type Status = TaskStatus;
    type Transition = TaskTransition;

    const KIND: OperationKind = OperationKind::Task;
    const TERMINAL: &'static [TaskStatus] = &[TaskStatus::Completed, TaskStatus::Cancelled];

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> TaskStatus {
        self.status
    }

    fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    fn rule(transition: TaskTransition) -> TransitionRule<TaskStatus> {
        use TaskStatus::*;
        match transition {
            TaskTransition::Assign => TransitionRule::new(&[Pending], Assigned),
            TaskTransition::Start => TransitionRule::new(&[Pending, Assigned], InProgress),
            TaskTransition::Complete => TransitionRule::new(&[InProgress], Completed),
            TaskTransition::Cancel => {
                TransitionRule::new(&[Pending, Assigned, InProgress], Cancelled)
            }
        }
    }

    fn guard(&self, transition: TaskTransition) -> Result<(), ServiceError> {
        match transition {
            TaskTransition::Assign if non_empty(&self.assigned_to).is_none() => Err(
                ServiceError::ValidationError(
                    "Please specify a user to assign this task to".to_string(),
                ),
            ),
            TaskTransition::Complete => {
                require_lines(&self.items, "No items in this task to complete")
            }
            _ => Ok(()),
        }
    }

    fn on_transition(&mut self, transition: TaskTransition, at: DateTime<Utc>) {
        if transition != TaskTransition::Complete {
            return;
        }
        let is_count = self.is_count();
        for line in self
            .items
            .iter_mut()
            .filter(|l| l.row_status == TaskLineStatus::Pending)
        {
            // No entry means no discrepancy.
            if line.actual_qty.is_none() {
                line.actual_qty = Some(line.qty);
            }
            line.row_status = TaskLineStatus::Completed;
            line.refresh_difference(is_count);
        }
        self.completed_at = Some(at);
    }

    fn stock_movements(&self, transition: TaskTransition) -> Vec<StockKey> {
        if transition != TaskTransition::Complete {
            return Vec::new();
        }
        self.completed_lines()
            .flat_map(|line| self.movement_keys(line))
            .collect()
    }

    fn ledger_requests(&self, transition: TaskTransition) -> Vec<LedgerRequest> {
        if transition != TaskTransition::Complete {
            return Vec::new();
        }
        let (kind, lines, purpose) = if self.is_count() {
            (
                LedgerDocumentKind::StockReconciliation,
                self.reconciliation_lines(),
                "Stock Reconciliation",
            )
        } else {
            (
                LedgerDocumentKind::StockEntry,
                self.stock_entry_lines(),
                MATERIAL_TRANSFER,
            )
        };
        if lines.is_empty() {
            return Vec::new();
        }
        let payload = LedgerPayload::new(Self::KIND, self.id, lines)
            .with_purpose(purpose)
            .with_warehouse(self.movement_warehouse().map(str::to_string));
        vec![LedgerRequest::new(kind, payload)]
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

    fn count_task() -> Task {
        Task::new(TaskType::Count, Some("WH-1".into()), None)
            .unwrap()
            .with_line(TaskLine::new("ITEM-A", dec!(10)).with_source_bin("A-1"))
            .with_line(TaskLine::new("ITEM-B", dec!(4)).with_source_bin("A-2"))
    }

    #[test]
    fn warehouses_are_required_by_type() {
        assert!(Task::new(TaskType::Pick, None, None).is_err());
        assert!(Task::new(TaskType::Putaway, None, Some("WH".into())).is_ok());
        assert!(Task::new(TaskType::Transfer, Some("A".into()), None).is_err());
        assert!(Task::new(TaskType::Count, None, None).is_ok());
    }

    #[test]
    fn count_difference_follows_both_operands() {
        let mut task = count_task();
        let id = task.items[0].id;
        task.record_actual(id, dec!(7)).unwrap();
        assert_eq!(task.items[0].difference_qty(), dec!(-3));

        task.set_required(id, dec!(6)).unwrap();
        assert_eq!(task.items[0].difference_qty(), dec!(1));
    }

    #[test]
    fn completion_defaults_missing_actuals() {
        let mut task = count_task();
        let id = task.items[0].id;
        task.record_actual(id, dec!(8)).unwrap();

        task.on_transition(TaskTransition::Complete, Utc::now());

        assert_eq!(task.items[1].actual_qty(), Some(dec!(4)));
        assert_eq!(task.items[1].difference_qty(), Decimal::ZERO);
        assert_eq!(task.completed_items(), 2);

        let requests = task.ledger_requests(TaskTransition::Complete);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].kind, LedgerDocumentKind::StockReconciliation);
        assert_eq!(requests[0].payload.lines.len(), 1);
        assert_eq!(requests[0].payload.lines[0].qty, dec!(8));
    }

    #[test]
    fn clean_count_produces_no_document() {
        let mut task = count_task();
        task.on_transition(TaskTransition::Complete, Utc::now());
        assert!(task.ledger_requests(TaskTransition::Complete).is_empty());
    }

    #[test]
    fn pick_stock_entry_falls_back_to_source_warehouse() {
        let mut task = Task::new(TaskType::Pick, Some("WH-1".into()), None)
            .unwrap()
            .with_line(TaskLine::new("ITEM-A", dec!(2)));
        task.on_transition(TaskTransition::Complete, Utc::now());

        let requests = task.ledger_requests(TaskTransition::Complete);
        assert_eq!(requests[0].kind, LedgerDocumentKind::StockEntry);
        let line = &requests[0].payload.lines[0];
        assert_eq!(line.source_warehouse.as_deref(), Some("WH-1"));
        assert_eq!(line.target_warehouse.as_deref(), Some("WH-1"));
        assert_eq!(requests[0].payload.purpose.as_deref(), Some(MATERIAL_TRANSFER));
    }

    #[test]
    fn skipped_lines_are_left_out() {
        let mut task = Task::new(TaskType::Transfer, Some("A".into()), Some("B".into()))
            .unwrap()
            .with_line(TaskLine::new("ITEM-A", dec!(2)))
            .with_line(TaskLine::new("ITEM-B", dec!(3)));
        let skipped = task.items[1].id;
        task.skip_line(skipped).unwrap();
        task.on_transition(TaskTransition::Complete, Utc::now());

        assert_eq!(task.items[1].row_status, TaskLineStatus::Skipped);
        let requests = task.ledger_requests(TaskTransition::Complete);
        assert_eq!(requests[0].payload.lines.len(), 1);
        // One key for each side of the single completed line.
        assert_eq!(task.stock_movements(TaskTransition::Complete).len(), 2);
    }

    #[test]
    fn movement_keys_use_header_bins_like_the_stock_entry() {
        let mut task = Task::new(TaskType::Transfer, Some("WH-1".into()), Some("WH-2".into()))
            .unwrap()
            .with_line(TaskLine::new("ITEM-A", dec!(1)));
        task.source_bin = Some("1-1".into());
        task.target_bin = Some("7-1".into());
        task.on_transition(TaskTransition::Complete, Utc::now());

        let keys = task.stock_movements(TaskTransition::Complete);
        assert_eq!(
            keys,
            vec![
                StockKey::new("ITEM-A", Some("WH-1"), Some("1-1"), None),
                StockKey::new("ITEM-A", Some("WH-2"), Some("7-1"), None),
            ]
        );
        let line = &task.ledger_requests(TaskTransition::Complete)[0].payload.lines[0];
        assert_eq!(line.source_bin.as_deref(), Some("1-1"));
        assert_eq!(line.target_bin.as_deref(), Some("7-1"));
    }

    #[test]
    fn putaway_checks_only_the_target_side() {
        let mut task = Task::new(TaskType::Putaway, None, Some("WH-1".into()))
            .unwrap()
            .with_line(TaskLine::new("ITEM-A", dec!(1)).with_target_bin("2-1"));
        task.on_transition(TaskTransition::Complete, Utc::now());

        assert_eq!(
            task.stock_movements(TaskTransition::Complete),
            vec![StockKey::new("ITEM-A", Some("WH-1"), Some("2-1"), None)]
        );
    }

    #[test]
    fn pick_without_target_yields_a_single_source_key() {
        let mut task = Task::new(TaskType::Pick, Some("WH-1".into()), None)
            .unwrap()
            .with_line(TaskLine::new("ITEM-A", dec!(1)).with_source_bin("1-2"));
        task.on_transition(TaskTransition::Complete, Utc::now());

        let keys = task.stock_movements(TaskTransition::Complete);
        assert_eq!(keys[0], StockKey::new("ITEM-A", Some("WH-1"), Some("1-2"), None));
        assert!(keys.iter().all(|k| k.warehouse.as_deref() == Some("WH-1")));
    }

    #[test]
    fn assign_requires_a_user() {
        let task = count_task();
        assert!(matches!(
            task.guard(TaskTransition::Assign),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn start_is_reachable_from_pending_and_assigned() {
        let mut task = count_task();
        assert!(task.can_apply(TaskTransition::Start));
        task.set_status(TaskStatus::Assigned);
        assert!(task.can_apply(TaskTransition::Start));
        assert!(!task.can_apply(TaskTransition::Complete));
    }
}
