use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::ledger::{LedgerDocumentKind, LedgerDocumentRef, LedgerLine, LedgerPayload, LedgerRequest};
use super::{OperationKind, TransitionRecord};
use crate::errors::ServiceError;
use crate::external::StockLevel;
use crate::reconciliation::{count_variance, CountVariance, Severity};
use crate::workflow::{require_lines, TransitionRule, Workflow};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum CycleCountStatus {
    Draft,
    #[strum(serialize = "In Progress")]
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum CycleCountTransition {
    Start,
    Complete,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum CycleCountLineStatus {
    Pending,
    /// Never counted; closed at book quantity.
    Counted,
    Matched,
    Variance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleCountLine {
    pub id: Uuid,
    pub item_code: String,
    pub bin: Option<String>,
    pub batch_no: Option<String>,
    pub book_qty: Decimal,
    pub valuation_rate: Decimal,
    counted_qty: Option<Decimal>,
    variance: Option<CountVariance>,
    pub row_status: CycleCountLineStatus,
}

impl CycleCountLine {
    pub fn new(item_code: impl Into<String>, book_qty: Decimal, valuation_rate: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_code: item_code.into(),
            bin: None,
            batch_no: None,
            book_qty,
            valuation_rate,
            counted_qty: None,
            variance: None,
            row_status: CycleCountLineStatus::Pending,
        }
    }

    pub fn counted_qty(&self) -> Option<Decimal> {
        self.counted_qty
    }

    pub fn variance_qty(&self) -> Decimal {
        self.variance.map(|v| v.variance_qty).unwrap_or_default()
    }

    pub fn variance_pct(&self) -> Decimal {
        self.variance.map(|v| v.variance_pct).unwrap_or_default()
    }

    pub fn variance_value(&self) -> Decimal {
        self.variance.map(|v| v.variance_value).unwrap_or_default()
    }

    pub fn severity(&self) -> Severity {
        self.variance.map(|v| v.severity).unwrap_or(Severity::None)
    }

    fn set_counted(&mut self, counted: Decimal) {
        let variance = count_variance(self.book_qty, counted, self.valuation_rate);
        self.row_status = if variance.is_matched() {
            CycleCountLineStatus::Matched
        } else {
            CycleCountLineStatus::Variance
        };
        self.counted_qty = Some(counted);
        self.variance = Some(variance);
    }

    fn close_uncounted(&mut self) {
        self.counted_qty = Some(self.book_qty);
        self.variance = Some(count_variance(self.book_qty, self.book_qty, self.valuation_rate));
        self.row_status = CycleCountLineStatus::Counted;
    }
}

/// Scheduled inventory count for one warehouse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleCount {
    pub id: Uuid,
    pub warehouse: String,
    status: CycleCountStatus,
    pub items: Vec<CycleCountLine>,
    pub counted_at: Option<DateTime<Utc>>,
    history: Vec<TransitionRecord>,
    documents: Vec<LedgerDocumentRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CycleCount {
    pub fn new(warehouse: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            warehouse: warehouse.into(),
            status: CycleCountStatus::Draft,
            items: Vec::new(),
            counted_at: None,
            history: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_line(mut self, line: CycleCountLine) -> Self {
        self.items.push(line);
        self
    }

    pub fn documents(&self) -> &[LedgerDocumentRef] {
        &self.documents
    }

    pub fn items_with_variance(&self) -> usize {
        self.items
            .iter()
            .filter(|l| l.row_status == CycleCountLineStatus::Variance)
            .count()
    }

    pub fn total_variance_value(&self) -> Decimal {
        self.items.iter().map(|l| l.variance_value()).sum()
    }

    fn ensure_draft(&self, action: &str) -> Result<(), ServiceError> {
        if self.status != CycleCountStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "Cannot {} on a {} cycle count",
                action, self.status
            )));
        }
        Ok(())
    }

    /// Replaces the lines with one per stocked item; an empty list leaves
    /// the current lines untouched.
    pub fn populate_from_stock(
        &mut self,
        stock: Vec<(String, StockLevel)>,
    ) -> Result<usize, ServiceError> {
        self.ensure_draft("populate items")?;
        if stock.is_empty() {
            return Ok(0);
        }
        self.items = stock
            .into_iter()
            .map(|(item_code, level)| {
                CycleCountLine::new(item_code, level.actual_qty, level.valuation_rate)
            })
            .collect();
        self.updated_at = Utc::now();
        Ok(self.items.len())
    }

    /// Overwrites book quantity and valuation rate, index-aligned with the
    /// lines. Items without a stock record are booked at zero.
    pub fn refresh_book(&mut self, levels: Vec<Option<StockLevel>>) -> Result<(), ServiceError> {
        self.ensure_draft("refresh book quantities")?;
        require_lines(&self.items, "No items to fetch quantities for")?;
        for (line, level) in self.items.iter_mut().zip(levels) {
            let level = level.unwrap_or_default();
            line.book_qty = level.actual_qty;
            line.valuation_rate = level.valuation_rate;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a physical count for a line.
    pub fn record_count(&mut self, line_id: Uuid, counted: Decimal) -> Result<(), ServiceError> {
        if self.status != CycleCountStatus::InProgress {
            return Err(ServiceError::InvalidState(format!(
                "Counts can only be recorded while In Progress, not {}",
                self.status
            )));
        }
        if counted.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "Counted quantity cannot be negative".to_string(),
            ));
        }
        let line = self
            .items
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cycle count line {}", line_id)))?;
        line.set_counted(counted);
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl Workflow for CycleCount {
    type Status = CycleCountStatus;
    type Transition = CycleCountTransition;

    const KIND: OperationKind = OperationKind::CycleCount;
    const TERMINAL: &'static [CycleCountStatus] =
        &[CycleCountStatus::Completed, CycleCountStatus::Cancelled];

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> CycleCountStatus {
        self.status
    }

    fn set_status(&mut self, status: CycleCountStatus) {
        self.status = status;
    }

    fn rule(transition: CycleCountTransition) -> TransitionRule<CycleCountStatus> {
        use CycleCountStatus::*;
        match transition {
            CycleCountTransition::Start => TransitionRule::new(&[Draft], InProgress),
            CycleCountTransition::Complete => TransitionRule::new(&[InProgress], Completed),
            CycleCountTransition::Cancel => TransitionRule::new(&[Draft, InProgress], Cancelled),
        }
    }

    fn guard(&self, transition: CycleCountTransition) -> Result<(), ServiceError> {
        match transition {
            CycleCountTransition::Start => {
                require_lines(&self.items, "Add items before starting the count")
            }
            _ => Ok(()),
        }
    }

    fn on_transition(&mut self, transition: CycleCountTransition, at: DateTime<Utc>) {
        if transition != CycleCountTransition::Complete {
            return;
        }
        for line in &mut self.items {
            match line.counted_qty {
                Some(counted) => line.set_counted(counted),
                None => line.close_uncounted(),
            }
        }
        self.counted_at = Some(at);
    }

    fn ledger_requests(&self, transition: CycleCountTransition) -> Vec<LedgerRequest> {
        if transition != CycleCountTransition::Complete {
            return Vec::new();
        }
        let lines: Vec<LedgerLine> = self
            .items
            .iter()
            .filter(|l| l.row_status == CycleCountLineStatus::Variance && !l.variance_qty().is_zero())
            .map(|line| LedgerLine {
                target_warehouse: Some(self.warehouse.clone()),
                target_bin: line.bin.clone(),
                batch_no: line.batch_no.clone(),
                valuation_rate: Some(line.valuation_rate),
                ..LedgerLine::new(line.item_code.clone(), line.counted_qty.unwrap_or(line.book_qty))
            })
            .collect();
        if lines.is_empty() {
            return Vec::new();
        }
        let payload = LedgerPayload::new(Self::KIND, self.id, lines)
            .with_purpose("Stock Reconciliation")
            .with_warehouse(Some(self.warehouse.clone()));
        vec![LedgerRequest::new(LedgerDocumentKind::StockReconciliation, payload)]
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

    fn in_progress() -> CycleCount {
        let mut count = CycleCount::new("WH-1")
            .with_line(CycleCountLine::new("ITEM-A", dec!(100), dec!(5)))
            .with_line(CycleCountLine::new("ITEM-B", dec!(20), dec!(1)));
        count.set_status(CycleCountStatus::InProgress);
        count
    }

    #[test]
    fn recording_a_count_derives_variance_immediately() {
        let mut count = in_progress();
        let id = count.items[0].id;
        count.record_count(id, dec!(90)).unwrap();

        let line = &count.items[0];
        assert_eq!(line.variance_qty(), dec!(-10));
        assert_eq!(line.variance_value(), dec!(-50));
        assert_eq!(line.row_status, CycleCountLineStatus::Variance);
        assert_eq!(line.severity(), Severity::Low);
    }

    #[test]
    fn counts_are_only_accepted_in_progress() {
        let mut count = in_progress();
        count.set_status(CycleCountStatus::Draft);
        let id = count.items[0].id;
        assert!(matches!(
            count.record_count(id, dec!(1)),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[test]
    fn uncounted_lines_close_at_book_quantity() {
        let mut count = in_progress();
        let id = count.items[0].id;
        count.record_count(id, dec!(100)).unwrap();
        count.on_transition(CycleCountTransition::Complete, Utc::now());

        assert_eq!(count.items[0].row_status, CycleCountLineStatus::Matched);
        assert_eq!(count.items[1].row_status, CycleCountLineStatus::Counted);
        assert_eq!(count.items[1].counted_qty(), Some(dec!(20)));
        assert!(count.ledger_requests(CycleCountTransition::Complete).is_empty());
    }

    #[test]
    fn reconciliation_only_lists_variance_rows() {
        let mut count = in_progress();
        let id = count.items[1].id;
        count.record_count(id, dec!(25)).unwrap();
        count.on_transition(CycleCountTransition::Complete, Utc::now());

        assert_eq!(count.items_with_variance(), 1);
        assert_eq!(count.total_variance_value(), dec!(5));

        let requests = count.ledger_requests(CycleCountTransition::Complete);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payload.lines.len(), 1);
        assert_eq!(requests[0].payload.lines[0].qty, dec!(25));
    }
}
