use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument};

use crate::errors::ServiceError;
use crate::external::OrderSource;
use crate::models::{OrderAllocation, WaveItem, WavePick, WaveStatus};
use crate::workflow::Workflow;

/// Merges the demand of a wave's source orders into one item list.
pub struct DemandConsolidator {
    orders: Arc<dyn OrderSource>,
    lookup_timeout: Duration,
}

impl DemandConsolidator {
    pub fn new(orders: Arc<dyn OrderSource>, lookup_timeout: Duration) -> Self {
        Self {
            orders,
            lookup_timeout,
        }
    }

    /// Rebuilds the wave's items from its orders, grouped by item and unit of
    /// measure in first-seen order. The previous list is replaced, never
    /// merged, and is left untouched if any order lookup fails.
    #[instrument(skip(self, wave), fields(wave_id = %wave.id))]
    pub async fn consolidate(&self, wave: &mut WavePick) -> Result<Vec<WaveItem>, ServiceError> {
        if wave.status() != WaveStatus::Draft {
            return Err(ServiceError::InvalidState(format!(
                "Items can only be consolidated on a Draft wave, not {}",
                wave.status()
            )));
        }
        if wave.orders().is_empty() {
            return Err(ServiceError::ValidationError(
                "Add at least one order before consolidating".to_string(),
            ));
        }

        let mut items: Vec<WaveItem> = Vec::new();
        for order in wave.orders() {
            let lines = timeout(self.lookup_timeout, self.orders.get_lines(&order.order_id))
                .await
                .map_err(|_| {
                    ServiceError::ExternalServiceError(format!(
                        "Order {} lookup timed out",
                        order.order_id
                    ))
                })??;

            for line in lines {
                let allocation = OrderAllocation {
                    order_id: order.order_id.clone(),
                    qty: line.qty,
                };
                match items
                    .iter_mut()
                    .find(|i| i.item_code == line.item_code && i.uom == line.uom)
                {
                    Some(item) => {
                        item.total_qty += line.qty;
                        item.sources.push(allocation);
                    }
                    None => items.push(WaveItem {
                        item_code: line.item_code,
                        uom: line.uom,
                        total_qty: line.qty,
                        picked_qty: Decimal::ZERO,
                        source_bin: None,
                        batch_no: None,
                        sources: vec![allocation],
                    }),
                }
            }
        }

        wave.replace_items(items.clone())?;
        info!(
            orders = wave.total_orders(),
            items = items.len(),
            "Wave demand consolidated"
        );
        Ok(items)
    }
}
