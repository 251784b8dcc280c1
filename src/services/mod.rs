//! Operation services.
//!
//! Each service drives one operation record through the workflow engine and
//! wires the helpers it needs (route optimiser, consolidator, collaborators).
//! Records are passed in explicitly as [`Aggregate`](crate::workflow::Aggregate)s.

use std::time::Duration;
use tokio::time::timeout;

use crate::errors::ServiceError;
use crate::external::{OrderLine, OrderSource};

// Inbound
pub mod asn;

// Outbound
pub mod dispatch;
pub mod pack_station;
pub mod wave_pick;

// Floor work and stock control
pub mod bins;
pub mod cycle_count;
pub mod stock_freeze;
pub mod tasks;

pub use asn::AsnService;
pub use bins::BinService;
pub use cycle_count::CycleCountService;
pub use dispatch::DispatchService;
pub use pack_station::PackStationService;
pub use stock_freeze::StockFreezeService;
pub use tasks::TaskService;
pub use wave_pick::WavePickService;

/// Fetches order lines within the lookup bound.
pub(crate) async fn fetch_order_lines(
    orders: &dyn OrderSource,
    order_id: &str,
    limit: Duration,
) -> Result<Vec<OrderLine>, ServiceError> {
    timeout(limit, orders.get_lines(order_id))
        .await
        .map_err(|_| {
            ServiceError::ExternalServiceError(format!("Order {} lookup timed out", order_id))
        })?
}
