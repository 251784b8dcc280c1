use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::errors::ServiceError;
use crate::models::{LedgerDocumentKind, LedgerDocumentRef, LedgerPayload};

/// Creates downstream ledger documents (receipts, stock entries, delivery notes).
///
/// Implementations must treat `payload.idempotency_key` as the identity of a
/// creation attempt: a repeated key returns the document created the first time.
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn create(
        &self,
        kind: LedgerDocumentKind,
        payload: LedgerPayload,
    ) -> Result<LedgerDocumentRef, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub reference: LedgerDocumentRef,
    pub payload: LedgerPayload,
}

/// In-memory ledger keyed by idempotency key.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    documents: DashMap<String, StoredDocument>,
    failures: DashMap<LedgerDocumentKind, String>,
    sequence: AtomicU64,
    attempts: AtomicU64,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent creation of `kind` fail with `message`.
    pub fn fail_on(&self, kind: LedgerDocumentKind, message: impl Into<String>) {
        self.failures.insert(kind, message.into());
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of `create` calls received, including deduplicated and failed ones.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn get(&self, idempotency_key: &str) -> Option<StoredDocument> {
        self.documents.get(idempotency_key).map(|d| d.value().clone())
    }

    pub fn documents_of(&self, kind: LedgerDocumentKind) -> Vec<StoredDocument> {
        let mut docs: Vec<StoredDocument> = self
            .documents
            .iter()
            .filter(|d| d.reference.kind == kind)
            .map(|d| d.value().clone())
            .collect();
        docs.sort_by(|a, b| a.reference.id.cmp(&b.reference.id));
        docs
    }
}

#[async_trait]
impl LedgerService for InMemoryLedger {
    async fn create(
        &self,
        kind: LedgerDocumentKind,
        payload: LedgerPayload,
    ) -> Result<LedgerDocumentRef, ServiceError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);

        if let Some(message) = self.failures.get(&kind) {
            return Err(ServiceError::LedgerCreationError(format!(
                "{} creation failed: {}",
                kind,
                message.value()
            )));
        }
        if payload.idempotency_key.is_empty() {
            return Err(ServiceError::ValidationError(
                "Ledger requests require an idempotency key".to_string(),
            ));
        }

        match self.documents.entry(payload.idempotency_key.clone()) {
            Entry::Occupied(existing) => {
                debug!(key = %existing.key(), "Returning existing ledger document");
                Ok(existing.get().reference.clone())
            }
            Entry::Vacant(slot) => {
                let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
                let reference = LedgerDocumentRef {
                    kind,
                    id: format!("{}-{:05}", kind.slug().to_uppercase(), n),
                    idempotency_key: payload.idempotency_key.clone(),
                    linked_to: payload.linked_document.clone(),
                    created_at: Utc::now(),
                };
                slot.insert(StoredDocument {
                    reference: reference.clone(),
                    payload,
                });
                Ok(reference)
            }
        }
    }
}
