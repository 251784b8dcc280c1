use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    external::InventoryAvailability,
    models::{CycleCount, CycleCountStatus, CycleCountTransition},
    workflow::{Aggregate, TransitionOutcome, Workflow, WorkflowEngine},
    WmsContext,
};

/// Service for scheduled cycle counts
#[derive(Clone)]
pub struct CycleCountService {
    engine: WorkflowEngine,
    availability: Arc<dyn InventoryAvailability>,
    lookup_timeout: Duration,
}

impl CycleCountService {
    pub fn new(ctx: &WmsContext) -> Self {
        Self {
            engine: ctx.engine(),
            availability: ctx.availability.clone(),
            lookup_timeout: ctx.config.availability_timeout(),
        }
    }

    /// Fills a Draft count with every item stocked in its warehouse
    #[instrument(skip(self, count), fields(cycle_count_id = %count.id()))]
    pub async fn populate_from_warehouse(
        &self,
        count: &Aggregate<CycleCount>,
    ) -> Result<usize, ServiceError> {
        let mut record = count.acquire().await?;
        if record.status() != CycleCountStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "Cannot populate items on a {} cycle count",
                record.status()
            )));
        }
        let warehouse = record.warehouse.clone();
        let stock = timeout(self.lookup_timeout, self.availability.stocked_items(&warehouse))
            .await
            .map_err(|_| {
                ServiceError::ExternalServiceError(format!(
                    "Stock lookup for {} timed out",
                    warehouse
                ))
            })??;

        let populated = record.populate_from_stock(stock)?;
        if populated == 0 {
            warn!(%warehouse, "No items with stock found in this warehouse");
        } else {
            info!(%warehouse, items = populated, "Cycle count populated");
        }
        Ok(populated)
    }

    /// Refreshes book quantities and valuation rates right before counting
    #[instrument(skip(self, count), fields(cycle_count_id = %count.id()))]
    pub async fn fetch_book_quantities(
        &self,
        count: &Aggregate<CycleCount>,
    ) -> Result<(), ServiceError> {
        let mut record = count.acquire().await?;
        let warehouse = record.warehouse.clone();
        let mut levels = Vec::with_capacity(record.items.len());
        for line in &record.items {
            let level = timeout(
                self.lookup_timeout,
                self.availability.stock_level(&line.item_code, &warehouse),
            )
            .await
            .map_err(|_| {
                ServiceError::ExternalServiceError(format!(
                    "Stock lookup for {} timed out",
                    line.item_code
                ))
            })??;
            levels.push(level);
        }

        record.refresh_book(levels)?;
        info!(%warehouse, items = record.items.len(), "Book quantities refreshed");
        Ok(())
    }

    #[instrument(skip(self, count), fields(cycle_count_id = %count.id()))]
    pub async fn start(
        &self,
        count: &Aggregate<CycleCount>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<CycleCountStatus>, ServiceError> {
        count
            .transition(&self.engine, CycleCountTransition::Start, actor)
            .await
    }

    /// Records a physical count; variance is recomputed immediately
    #[instrument(skip(self, count), fields(cycle_count_id = %count.id()))]
    pub async fn record_count(
        &self,
        count: &Aggregate<CycleCount>,
        line_id: Uuid,
        counted: Decimal,
    ) -> Result<(), ServiceError> {
        let mut record = count.acquire().await?;
        record.record_count(line_id, counted)?;
        info!(%line_id, %counted, "Count recorded");
        Ok(())
    }

    /// Completes the count; books a Stock Reconciliation when any line varies
    #[instrument(skip(self, count), fields(cycle_count_id = %count.id()))]
    pub async fn complete(
        &self,
        count: &Aggregate<CycleCount>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<CycleCountStatus>, ServiceError> {
        count
            .transition(&self.engine, CycleCountTransition::Complete, actor)
            .await
    }

    #[instrument(skip(self, count), fields(cycle_count_id = %count.id()))]
    pub async fn cancel(
        &self,
        count: &Aggregate<CycleCount>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<CycleCountStatus>, ServiceError> {
        count
            .transition(&self.engine, CycleCountTransition::Cancel, actor)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WmsConfig;
    use crate::models::{CycleCountLine, CycleCountLineStatus, LedgerDocumentKind};
    use crate::reconciliation::Severity;
    use crate::external::StockLevel;
    use crate::InMemoryWms;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn variance_lines_book_stock_reconciliation() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = CycleCountService::new(&wms.context);
        let short = CycleCountLine::new("ITEM-A", dec!(100), dec!(5));
        let short_id = short.id;
        let count = wms.context.aggregate(
            CycleCount::new("WH-1")
                .with_line(short)
                .with_line(CycleCountLine::new("ITEM-B", dec!(7), dec!(1))),
        );

        service.start(&count, None).await.unwrap();
        service.record_count(&count, short_id, dec!(90)).await.unwrap();
        let outcome = service.complete(&count, Some("auditor")).await.unwrap();

        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(
            outcome.documents[0].kind,
            LedgerDocumentKind::StockReconciliation
        );
        let record = count.snapshot().await;
        assert_eq!(record.items[0].variance_qty(), dec!(-10));
        assert_eq!(record.items[0].variance_value(), dec!(-50));
        assert_eq!(record.items[0].severity(), Severity::Low);
        assert_eq!(record.items[1].row_status, CycleCountLineStatus::Counted);
        assert_eq!(record.items[1].counted_qty(), Some(dec!(7)));
        assert_eq!(record.items_with_variance(), 1);
        assert_eq!(record.total_variance_value(), dec!(-50));
    }

    #[tokio::test]
    async fn matched_count_books_nothing() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = CycleCountService::new(&wms.context);
        let count = wms
            .context
            .aggregate(CycleCount::new("WH-1").with_line(CycleCountLine::new("ITEM-A", dec!(3), dec!(2))));

        service.start(&count, None).await.unwrap();
        let outcome = service.complete(&count, None).await.unwrap();

        assert!(outcome.documents.is_empty());
        assert!(wms.ledger.is_empty());
    }

    #[tokio::test]
    async fn populate_loads_stocked_items_with_book_and_rate() {
        let wms = InMemoryWms::new(WmsConfig::default());
        wms.availability.set_stock(
            "ITEM-B",
            "WH-1",
            StockLevel::new(dec!(12), dec!(2)).with_valuation_rate(dec!(3)),
        );
        wms.availability
            .set_stock("ITEM-A", "WH-1", StockLevel::new(dec!(5), dec!(0)));
        wms.availability
            .set_stock("ITEM-Z", "WH-1", StockLevel::new(dec!(0), dec!(0)));
        let service = CycleCountService::new(&wms.context);
        let count = wms.context.aggregate(CycleCount::new("WH-1"));

        assert_eq!(service.populate_from_warehouse(&count).await.unwrap(), 2);

        let record = count.snapshot().await;
        let lines: Vec<_> = record
            .items
            .iter()
            .map(|l| (l.item_code.as_str(), l.book_qty, l.valuation_rate))
            .collect();
        assert_eq!(
            lines,
            vec![("ITEM-A", dec!(5), dec!(0)), ("ITEM-B", dec!(12), dec!(3))]
        );
    }

    #[tokio::test]
    async fn empty_warehouse_keeps_existing_lines() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = CycleCountService::new(&wms.context);
        let count = wms
            .context
            .aggregate(CycleCount::new("WH-9").with_line(CycleCountLine::new("ITEM-A", dec!(1), dec!(1))));

        assert_eq!(service.populate_from_warehouse(&count).await.unwrap(), 0);
        assert_eq!(count.snapshot().await.items.len(), 1);
    }

    #[tokio::test]
    async fn fetch_refreshes_book_and_zeroes_unknown_items() {
        let wms = InMemoryWms::new(WmsConfig::default());
        wms.availability.set_stock(
            "ITEM-A",
            "WH-1",
            StockLevel::new(dec!(40), dec!(0)).with_valuation_rate(dec!(1.5)),
        );
        let service = CycleCountService::new(&wms.context);
        let count = wms.context.aggregate(
            CycleCount::new("WH-1")
                .with_line(CycleCountLine::new("ITEM-A", dec!(30), dec!(1)))
                .with_line(CycleCountLine::new("ITEM-GONE", dec!(8), dec!(2))),
        );

        service.fetch_book_quantities(&count).await.unwrap();

        let record = count.snapshot().await;
        assert_eq!(record.items[0].book_qty, dec!(40));
        assert_eq!(record.items[0].valuation_rate, dec!(1.5));
        assert_eq!(record.items[1].book_qty, dec!(0));
        assert_eq!(record.items[1].valuation_rate, dec!(0));
    }

    #[tokio::test]
    async fn stock_lookups_are_draft_only() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = CycleCountService::new(&wms.context);
        let count = wms
            .context
            .aggregate(CycleCount::new("WH-1").with_line(CycleCountLine::new("ITEM-A", dec!(3), dec!(2))));
        service.start(&count, None).await.unwrap();

        assert_matches!(
            service.populate_from_warehouse(&count).await,
            Err(ServiceError::InvalidState(_))
        );
        assert_matches!(
            service.fetch_book_quantities(&count).await,
            Err(ServiceError::InvalidState(_))
        );
        assert_eq!(count.snapshot().await.items[0].book_qty, dec!(3));
    }

    #[tokio::test]
    async fn fetch_without_lines_is_rejected() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = CycleCountService::new(&wms.context);
        let count = wms.context.aggregate(CycleCount::new("WH-1"));

        assert_matches!(
            service.fetch_book_quantities(&count).await,
            Err(ServiceError::ValidationError(_))
        );
    }
}
