//! StateSet WMS
//!
//! Warehouse execution core: operation records driven through explicit state
//! machines, pick-route optimisation, wave demand consolidation and
//! quantity reconciliation. Persistence and the stock ledger are external
//! collaborators reached through the traits in [`external`].
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod models;

// Engines and calculators
pub mod consolidation;
pub mod reconciliation;
pub mod routing;
pub mod workflow;

// Collaborators and operation services
pub mod external;
pub mod services;

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::WmsConfig;
use crate::consolidation::DemandConsolidator;
use crate::events::{Event, EventSender};
use crate::external::{
    BinDirectory, FreezeRegistry, InMemoryAvailability, InMemoryBinDirectory,
    InMemoryFreezeRegistry, InMemoryLedger, InMemoryOrderSource, InventoryAvailability,
    LedgerService, OrderSource,
};
use crate::routing::PickRouteOptimizer;
use crate::workflow::{Aggregate, Workflow, WorkflowEngine};

/// Collaborators, configuration and event sender handed to every service.
#[derive(Clone)]
pub struct WmsContext {
    pub config: WmsConfig,
    pub events: EventSender,
    pub ledger: Arc<dyn LedgerService>,
    pub freezes: Arc<dyn FreezeRegistry>,
    pub bins: Arc<dyn BinDirectory>,
    pub availability: Arc<dyn InventoryAvailability>,
    pub orders: Arc<dyn OrderSource>,
}

impl WmsContext {
    pub fn new(
        config: WmsConfig,
        events: EventSender,
        ledger: Arc<dyn LedgerService>,
        freezes: Arc<dyn FreezeRegistry>,
        bins: Arc<dyn BinDirectory>,
        availability: Arc<dyn InventoryAvailability>,
        orders: Arc<dyn OrderSource>,
    ) -> Self {
        Self {
            config,
            events,
            ledger,
            freezes,
            bins,
            availability,
            orders,
        }
    }

    pub fn engine(&self) -> WorkflowEngine {
        WorkflowEngine::new(
            self.ledger.clone(),
            self.freezes.clone(),
            self.bins.clone(),
            self.events.clone(),
            self.config.ledger_timeout(),
        )
    }

    pub fn route_optimizer(&self) -> PickRouteOptimizer {
        PickRouteOptimizer::new(
            self.availability.clone(),
            self.bins.clone(),
            self.config.availability_timeout(),
        )
    }

    pub fn consolidator(&self) -> DemandConsolidator {
        DemandConsolidator::new(self.orders.clone(), self.config.availability_timeout())
    }

    /// Wraps a record in a lockable aggregate using the configured lock mode.
    pub fn aggregate<W: Workflow>(&self, record: W) -> Aggregate<W> {
        Aggregate::new(record, self.config.lock_mode())
    }
}

/// In-memory collaborators wired into a [`WmsContext`].
pub struct InMemoryWms {
    pub context: WmsContext,
    pub events: mpsc::Receiver<Event>,
    pub ledger: Arc<InMemoryLedger>,
    pub freezes: Arc<InMemoryFreezeRegistry>,
    pub bins: Arc<InMemoryBinDirectory>,
    pub availability: Arc<InMemoryAvailability>,
    pub orders: Arc<InMemoryOrderSource>,
}

impl InMemoryWms {
    pub fn new(config: WmsConfig) -> Self {
        let (sender, receiver) = EventSender::channel(config.event_channel_capacity);
        let ledger = Arc::new(InMemoryLedger::new());
        let freezes = Arc::new(InMemoryFreezeRegistry::new());
        let bins = Arc::new(InMemoryBinDirectory::new());
        let availability = Arc::new(InMemoryAvailability::new(bins.clone()));
        let orders = Arc::new(InMemoryOrderSource::new());

        let context = WmsContext::new(
            config,
            sender,
            ledger.clone(),
            freezes.clone(),
            bins.clone(),
            availability.clone(),
            orders.clone(),
        );

        Self {
            context,
            events: receiver,
            ledger,
            freezes,
            bins,
            availability,
            orders,
        }
    }

    /// Drains the events emitted so far without waiting.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

pub mod prelude {
    pub use crate::config::{LockMode, WmsConfig};
    pub use crate::errors::ServiceError;
    pub use crate::events::{Event, EventSender};
    pub use crate::external::{
        BinDirectory, FreezeRegistry, InventoryAvailability, LedgerService, OrderLine, OrderSource,
    };
    pub use crate::models::{
        Asn, AsnLine, AsnStatus, AsnTransition, Bin, BinCoordinates, BinStatus, BinStatusChange,
        CycleCount, CycleCountLine, CycleCountStatus, CycleCountTransition, Dispatch, DispatchLine,
        DispatchStatus, DispatchTransition, FreezeScope, FreezeStatus, FreezeTransition,
        LedgerDocumentKind, LedgerDocumentRef, OperationKind, PackLine, PackStation,
        PackStationStatus, PackStationTransition, StockFreeze, Task, TaskLine, TaskStatus,
        TaskTransition, TaskType, WavePick, WaveStatus, WaveTransition, ZoneType,
    };
    pub use crate::reconciliation::{count_variance, receiving_variance, CountVariance, Severity};
    pub use crate::routing::{PickRouteOptimizer, RouteComputation, RouteStop};
    pub use crate::services::{
        AsnService, BinService, CycleCountService, DispatchService, PackStationService,
        StockFreezeService, TaskService, WavePickService,
    };
    pub use crate::workflow::{Aggregate, TransitionOutcome, Workflow, WorkflowEngine};
    pub use crate::{InMemoryWms, WmsContext};
}
