//! Collaborator interfaces consumed by the core.
//!
//! Persistence, ledger document creation and stock availability live outside
//! this crate; each concern is a trait here with an in-memory implementation
//! used by tests and the CLI.

pub mod availability;
pub mod bins;
pub mod freezes;
pub mod ledger;
pub mod orders;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use availability::{InMemoryAvailability, InventoryAvailability, StockLevel};
pub use bins::{BinDirectory, InMemoryBinDirectory};
pub use freezes::{FreezeRegistry, InMemoryFreezeRegistry};
pub use ledger::{InMemoryLedger, LedgerService, StoredDocument};
pub use orders::{InMemoryOrderSource, OrderSource};

/// Demand line of a sales or purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub item_code: String,
    pub qty: Decimal,
    pub uom: Option<String>,
    pub barcode: Option<String>,
}

impl OrderLine {
    pub fn new(item_code: impl Into<String>, qty: Decimal) -> Self {
        Self {
            item_code: item_code.into(),
            qty,
            uom: None,
            barcode: None,
        }
    }

    pub fn with_uom(mut self, uom: impl Into<String>) -> Self {
        self.uom = Some(uom.into());
        self
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = Some(barcode.into());
        self
    }
}
