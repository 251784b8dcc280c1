use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::OperationKind;

/// Downstream documents the core asks the Ledger Service to create.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum LedgerDocumentKind {
    #[strum(serialize = "Purchase Receipt")]
    PurchaseReceipt,
    #[strum(serialize = "Stock Entry")]
    StockEntry,
    #[strum(serialize = "Stock Reconciliation")]
    StockReconciliation,
    #[strum(serialize = "Delivery Note")]
    DeliveryNote,
    Shipment,
    #[strum(serialize = "Packing Slip")]
    PackingSlip,
}

impl LedgerDocumentKind {
    pub fn slug(&self) -> &'static str {
        match self {
            LedgerDocumentKind::PurchaseReceipt => "purchase_receipt",
            LedgerDocumentKind::StockEntry => "stock_entry",
            LedgerDocumentKind::StockReconciliation => "stock_reconciliation",
            LedgerDocumentKind::DeliveryNote => "delivery_note",
            LedgerDocumentKind::Shipment => "shipment",
            LedgerDocumentKind::PackingSlip => "packing_slip",
        }
    }
}

/// One line of a ledger document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerLine {
    pub item_code: String,
    pub qty: Decimal,
    pub uom: Option<String>,
    pub source_warehouse: Option<String>,
    pub target_warehouse: Option<String>,
    pub source_bin: Option<String>,
    pub target_bin: Option<String>,
    pub batch_no: Option<String>,
    pub valuation_rate: Option<Decimal>,
    /// Upstream reference such as the sales order a delivery line fulfils.
    pub against: Option<String>,
}

impl LedgerLine {
    pub fn new(item_code: impl Into<String>, qty: Decimal) -> Self {
        Self {
            item_code: item_code.into(),
            qty,
            ..Default::default()
        }
    }
}

/// Input handed to the Ledger Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerPayload {
    pub operation: OperationKind,
    pub record_id: Uuid,
    /// Filled in by the workflow engine before the call.
    pub idempotency_key: String,
    pub purpose: Option<String>,
    pub party: Option<String>,
    pub warehouse: Option<String>,
    pub carrier: Option<String>,
    pub tracking_no: Option<String>,
    pub gross_weight: Option<Decimal>,
    /// Id of the document created just before this one in the same transition.
    pub linked_document: Option<String>,
    pub lines: Vec<LedgerLine>,
}

impl LedgerPayload {
    pub fn new(operation: OperationKind, record_id: Uuid, lines: Vec<LedgerLine>) -> Self {
        Self {
            operation,
            record_id,
            idempotency_key: String::new(),
            purpose: None,
            party: None,
            warehouse: None,
            carrier: None,
            tracking_no: None,
            gross_weight: None,
            linked_document: None,
            lines,
        }
    }

    pub fn with_purpose(mut self, purpose: &str) -> Self {
        self.purpose = Some(purpose.to_string());
        self
    }

    pub fn with_party(mut self, party: Option<String>) -> Self {
        self.party = party;
        self
    }

    pub fn with_warehouse(mut self, warehouse: Option<String>) -> Self {
        self.warehouse = warehouse;
        self
    }
}

/// A document a transition asks for, in creation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRequest {
    pub kind: LedgerDocumentKind,
    pub payload: LedgerPayload,
    /// Link this document to the one created before it.
    pub links_previous: bool,
}

impl LedgerRequest {
    pub fn new(kind: LedgerDocumentKind, payload: LedgerPayload) -> Self {
        Self {
            kind,
            payload,
            links_previous: false,
        }
    }

    pub fn linked(kind: LedgerDocumentKind, payload: LedgerPayload) -> Self {
        Self {
            kind,
            payload,
            links_previous: true,
        }
    }
}

/// Reference to a created ledger document, kept on the operation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDocumentRef {
    pub kind: LedgerDocumentKind,
    pub id: String,
    pub idempotency_key: String,
    pub linked_to: Option<String>,
    pub created_at: DateTime<Utc>,
}
