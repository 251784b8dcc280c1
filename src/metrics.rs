//! Prometheus counters for warehouse operations.
//!
//! Counters are registered in a crate-local [`Registry`] so embedding
//! applications can merge them into their own exposition.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::errors::ServiceError;

lazy_static! {
    static ref TRANSITIONS: IntCounterVec = IntCounterVec::new(
        Opts::new("wms_transitions_total", "Total number of applied workflow transitions"),
        &["operation", "transition"]
    )
    .expect("metric can be created");
    static ref TRANSITION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "wms_transition_failures_total",
            "Total number of rejected or failed workflow transitions"
        ),
        &["operation", "error_type"]
    )
    .expect("metric can be created");
    static ref LEDGER_DOCUMENTS: IntCounterVec = IntCounterVec::new(
        Opts::new("wms_ledger_documents_total", "Total number of ledger documents created"),
        &["kind"]
    )
    .expect("metric can be created");
    static ref SCANS: IntCounterVec = IntCounterVec::new(
        Opts::new("wms_pack_scans_total", "Total number of pack station barcode scans"),
        &["outcome"]
    )
    .expect("metric can be created");
    static ref UNRESOLVED_PICK_LINES: IntCounter = IntCounter::new(
        "wms_unresolved_pick_lines_total",
        "Total number of pick lines that could not be bound to a bin"
    )
    .expect("metric can be created");
    static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry
            .register(Box::new(TRANSITIONS.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(TRANSITION_FAILURES.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(LEDGER_DOCUMENTS.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(SCANS.clone()))
            .expect("metric can be registered");
        registry
            .register(Box::new(UNRESOLVED_PICK_LINES.clone()))
            .expect("metric can be registered");
        registry
    };
}

pub fn registry() -> &'static Registry {
    &REGISTRY
}

pub fn record_transition(operation: &str, transition: &str) {
    TRANSITIONS.with_label_values(&[operation, transition]).inc();
}

pub fn record_failure(operation: &str, error: &ServiceError) {
    TRANSITION_FAILURES
        .with_label_values(&[operation, error.error_code()])
        .inc();
}

pub fn record_ledger_document(kind: &str) {
    LEDGER_DOCUMENTS.with_label_values(&[kind]).inc();
}

pub fn record_scan(outcome: &str) {
    SCANS.with_label_values(&[outcome]).inc();
}

pub fn record_unresolved_lines(count: usize) {
    UNRESOLVED_PICK_LINES.inc_by(count as u64);
}

pub fn transitions_count(operation: &str, transition: &str) -> u64 {
    TRANSITIONS.with_label_values(&[operation, transition]).get()
}

pub fn failures_count(operation: &str, error_type: &str) -> u64 {
    TRANSITION_FAILURES
        .with_label_values(&[operation, error_type])
        .get()
}

/// Renders every registered counter in the Prometheus text format.
pub fn gather() -> Result<String, ServiceError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| ServiceError::SerializationError(e.to_string()))
}
