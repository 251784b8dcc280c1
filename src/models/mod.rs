// Storage locations
pub mod bin;

// Ledger payloads handed to the downstream document service
pub mod ledger;

// Operation records
pub mod asn;
pub mod cycle_count;
pub mod dispatch;
pub mod pack_station;
pub mod stock_freeze;
pub mod task;
pub mod wave_pick;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

pub use asn::{Asn, AsnLine, AsnLineStatus, AsnStatus, AsnTransition};
pub use bin::{Bin, BinCoordinates, BinDimensions, BinStatus, BinStatusChange, ZoneType};
pub use cycle_count::{
    CycleCount, CycleCountLine, CycleCountLineStatus, CycleCountStatus, CycleCountTransition,
};
pub use dispatch::{Dispatch, DispatchLine, DispatchLineStatus, DispatchStatus, DispatchTransition};
pub use ledger::{LedgerDocumentKind, LedgerDocumentRef, LedgerLine, LedgerPayload, LedgerRequest};
pub use pack_station::{
    Package, PackageStatus, PackLine, PackLineStatus, PackStation, PackStationStatus,
    PackStationTransition, ScanOutcome,
};
pub use stock_freeze::{FreezeScope, FreezeStatus, FreezeTransition, StockFreeze};
pub use task::{Task, TaskLine, TaskLineStatus, TaskStatus, TaskTransition, TaskType};
pub use wave_pick::{
    OrderAllocation, WaveItem, WaveOrder, WaveOrderStatus, WavePick, WaveStatus, WaveTransition,
};

/// Closed set of operation record variants driven by the workflow engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum OperationKind {
    #[strum(serialize = "ASN")]
    Asn,
    Dispatch,
    #[strum(serialize = "Cycle Count")]
    CycleCount,
    #[strum(serialize = "Pack Station")]
    PackStation,
    Task,
    #[strum(serialize = "Wave Pick")]
    WavePick,
    #[strum(serialize = "Stock Freeze")]
    StockFreeze,
}

impl OperationKind {
    /// Short slug used in idempotency keys and metric labels.
    pub fn slug(&self) -> &'static str {
        match self {
            OperationKind::Asn => "asn",
            OperationKind::Dispatch => "dispatch",
            OperationKind::CycleCount => "cycle_count",
            OperationKind::PackStation => "pack_station",
            OperationKind::Task => "task",
            OperationKind::WavePick => "wave_pick",
            OperationKind::StockFreeze => "stock_freeze",
        }
    }
}

/// One committed status change, kept on the record for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub transition: String,
    pub from: String,
    pub to: String,
    pub at: DateTime<Utc>,
    pub actor: Option<String>,
}

/// Identifies a stock movement for freeze matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockKey {
    pub item_code: Option<String>,
    pub warehouse: Option<String>,
    pub bin: Option<String>,
    pub batch_no: Option<String>,
}

impl StockKey {
    pub fn new(
        item_code: &str,
        warehouse: Option<&str>,
        bin: Option<&str>,
        batch_no: Option<&str>,
    ) -> Self {
        Self {
            item_code: Some(item_code.to_string()),
            warehouse: warehouse.map(str::to_string),
            bin: bin.map(str::to_string),
            batch_no: batch_no.map(str::to_string),
        }
    }
}

/// Treats empty strings as absent.
pub(crate) fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
