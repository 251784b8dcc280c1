use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    external::BinDirectory,
    models::{Bin, BinStatus, BinStatusChange},
    WmsContext,
};

/// Service for explicit bin status requests
#[derive(Clone)]
pub struct BinService {
    bins: Arc<dyn BinDirectory>,
    events: EventSender,
}

impl BinService {
    pub fn new(ctx: &WmsContext) -> Self {
        Self {
            bins: ctx.bins.clone(),
            events: ctx.events.clone(),
        }
    }

    /// Active bins of a warehouse, oldest first
    #[instrument(skip(self))]
    pub async fn active_bins(&self, warehouse: &str) -> Result<Vec<Bin>, ServiceError> {
        self.bins.query(warehouse, BinStatus::Active).await
    }

    /// Applies Block, Reactivate, MarkFull or Maintenance to a bin
    #[instrument(skip(self))]
    pub async fn request_status_change(
        &self,
        code: &str,
        change: BinStatusChange,
    ) -> Result<Bin, ServiceError> {
        let from = self
            .bins
            .get(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Bin {}", code)))?
            .status();
        let bin = self.bins.set_status(code, change).await?;

        info!(bin = code, %from, to = %bin.status(), "Bin status changed");
        self.events
            .emit(Event::BinStatusChanged {
                bin_code: bin.code.clone(),
                from,
                to: bin.status(),
            })
            .await;
        Ok(bin)
    }
}
