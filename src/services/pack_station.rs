use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::fetch_order_lines;
use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    external::OrderSource,
    metrics,
    models::{non_empty, PackStation, PackStationStatus, PackStationTransition, ScanOutcome},
    workflow::{Aggregate, TransitionOutcome, WorkflowEngine},
    WmsContext,
};

/// Service for scan-to-verify packing
#[derive(Clone)]
pub struct PackStationService {
    engine: WorkflowEngine,
    events: EventSender,
    orders: Arc<dyn OrderSource>,
    lookup_timeout: Duration,
}

impl PackStationService {
    pub fn new(ctx: &WmsContext) -> Self {
        Self {
            engine: ctx.engine(),
            events: ctx.events.clone(),
            orders: ctx.orders.clone(),
            lookup_timeout: ctx.config.availability_timeout(),
        }
    }

    /// Replaces the pack lines with those of the linked sales order
    #[instrument(skip(self, station), fields(station_id = %station.id()))]
    pub async fn load_order_lines(&self, station: &Aggregate<PackStation>) -> Result<usize, ServiceError> {
        let mut record = station.acquire().await?;
        let sales_order = non_empty(&record.sales_order)
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::ValidationError("Set a sales order before loading lines".to_string())
            })?;
        let lines = fetch_order_lines(self.orders.as_ref(), &sales_order, self.lookup_timeout).await?;
        record.load_order_lines(lines)?;
        Ok(record.items.len())
    }

    /// Starts packing; the first package is opened automatically
    #[instrument(skip(self, station), fields(station_id = %station.id()))]
    pub async fn start_packing(
        &self,
        station: &Aggregate<PackStation>,
        packer: Option<&str>,
    ) -> Result<TransitionOutcome<PackStationStatus>, ServiceError> {
        let packer_name = packer.map(str::to_string);
        station
            .transition_with(
                &self.engine,
                PackStationTransition::StartPacking,
                packer,
                |draft: &mut PackStation| {
                    if packer_name.is_some() {
                        draft.packer = packer_name;
                    }
                    Ok(())
                },
            )
            .await
    }

    /// Packs `qty` units by barcode or item code. Scans on one station are
    /// serialized; an over-scan is rejected, never clamped.
    #[instrument(skip(self, station), fields(station_id = %station.id()))]
    pub async fn scan(
        &self,
        station: &Aggregate<PackStation>,
        code: &str,
        qty: Decimal,
    ) -> Result<ScanOutcome, ServiceError> {
        let result = station.with_lock(|record| record.scan(code, qty)).await;
        match &result {
            Ok(outcome) => {
                metrics::record_scan("accepted");
                info!(
                    item_code = %outcome.item_code,
                    package_no = outcome.package_no,
                    remaining = %outcome.remaining_qty,
                    "Item scanned"
                );
                self.events
                    .emit(Event::ItemScanned {
                        station_id: station.id(),
                        item_code: outcome.item_code.clone(),
                        package_no: outcome.package_no,
                        remaining_qty: outcome.remaining_qty,
                    })
                    .await;
            }
            Err(err) => {
                metrics::record_scan(err.error_code());
                warn!(code, %qty, "Scan rejected: {}", err);
            }
        }
        result
    }

    #[instrument(skip(self, station), fields(station_id = %station.id()))]
    pub async fn add_package(&self, station: &Aggregate<PackStation>) -> Result<u32, ServiceError> {
        station.with_lock(|record| record.add_package()).await
    }

    #[instrument(skip(self, station), fields(station_id = %station.id()))]
    pub async fn seal_package(
        &self,
        station: &Aggregate<PackStation>,
        package_no: u32,
    ) -> Result<(), ServiceError> {
        station
            .with_lock(|record| record.seal_package(package_no))
            .await?;
        self.events
            .emit(Event::PackageSealed {
                station_id: station.id(),
                package_no,
            })
            .await;
        Ok(())
    }

    #[instrument(skip(self, station), fields(station_id = %station.id()))]
    pub async fn set_package_weight(
        &self,
        station: &Aggregate<PackStation>,
        package_no: u32,
        weight: Decimal,
    ) -> Result<(), ServiceError> {
        station
            .with_lock(|record| record.set_package_weight(package_no, weight))
            .await
    }

    /// Completes packing; books the Delivery Note and linked Packing Slip
    #[instrument(skip(self, station), fields(station_id = %station.id()))]
    pub async fn complete_packing(
        &self,
        station: &Aggregate<PackStation>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<PackStationStatus>, ServiceError> {
        station
            .transition(&self.engine, PackStationTransition::CompletePacking, actor)
            .await
    }

    #[instrument(skip(self, station), fields(station_id = %station.id()))]
    pub async fn cancel(
        &self,
        station: &Aggregate<PackStation>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<PackStationStatus>, ServiceError> {
        station
            .transition(&self.engine, PackStationTransition::Cancel, actor)
            .await
    }
}
