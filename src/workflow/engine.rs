use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use super::Workflow;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::external::{BinDirectory, FreezeRegistry, LedgerService};
use crate::metrics;
use crate::models::{BinStatus, LedgerDocumentRef, LedgerRequest, StockKey, TransitionRecord};

/// Result of a committed transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutcome<S> {
    pub from: S,
    pub to: S,
    pub documents: Vec<LedgerDocumentRef>,
}

/// Applies transitions to operation records.
///
/// All work happens on a draft clone of the record. The caller's record is
/// replaced only after the table check, guard, freeze and bin checks and
/// every ledger document have succeeded, so any failure leaves it exactly as
/// it was.
#[derive(Clone)]
pub struct WorkflowEngine {
    ledger: Arc<dyn LedgerService>,
    freezes: Arc<dyn FreezeRegistry>,
    bins: Arc<dyn BinDirectory>,
    events: EventSender,
    ledger_timeout: Duration,
}

impl WorkflowEngine {
    pub fn new(
        ledger: Arc<dyn LedgerService>,
        freezes: Arc<dyn FreezeRegistry>,
        bins: Arc<dyn BinDirectory>,
        events: EventSender,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            freezes,
            bins,
            events,
            ledger_timeout,
        }
    }

    pub async fn apply<W: Workflow>(
        &self,
        record: &mut W,
        transition: W::Transition,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<W::Status>, ServiceError> {
        self.apply_with(record, transition, actor, |_| Ok(())).await
    }

    /// Applies a transition after letting the caller set transition inputs
    /// (carrier, weight, assignee) on the draft. Inputs are discarded with the
    /// draft when the transition fails.
    #[instrument(
        skip(self, record, inputs),
        fields(operation = %W::KIND, record_id = %record.id(), transition = %transition)
    )]
    pub async fn apply_with<W, F>(
        &self,
        record: &mut W,
        transition: W::Transition,
        actor: Option<&str>,
        inputs: F,
    ) -> Result<TransitionOutcome<W::Status>, ServiceError>
    where
        W: Workflow,
        F: FnOnce(&mut W) -> Result<(), ServiceError> + Send,
    {
        let record_id = record.id();
        match self.prepare(record, transition, actor, inputs).await {
            Ok((draft, outcome)) => {
                *record = draft;
                info!(
                    from = %outcome.from,
                    to = %outcome.to,
                    documents = outcome.documents.len(),
                    "Transition applied"
                );
                metrics::record_transition(W::KIND.slug(), &transition.to_string());
                self.events
                    .emit(Event::TransitionApplied {
                        operation: W::KIND,
                        record_id,
                        transition: transition.to_string(),
                        from: outcome.from.to_string(),
                        to: outcome.to.to_string(),
                        actor: actor.map(str::to_string),
                    })
                    .await;
                for document in &outcome.documents {
                    metrics::record_ledger_document(document.kind.slug());
                    self.events
                        .emit(Event::LedgerDocumentCreated {
                            operation: W::KIND,
                            record_id,
                            document: document.clone(),
                        })
                        .await;
                }
                Ok(outcome)
            }
            Err(err) => {
                if matches!(err, ServiceError::LedgerCreationError(_)) {
                    error!(status = %record.status(), "Transition rolled back: {}", err);
                } else {
                    warn!(status = %record.status(), "Transition rejected: {}", err);
                }
                metrics::record_failure(W::KIND.slug(), &err);
                self.events
                    .emit(Event::TransitionRejected {
                        operation: W::KIND,
                        record_id,
                        transition: transition.to_string(),
                        error_code: err.error_code().to_string(),
                        reason: err.to_string(),
                    })
                    .await;
                Err(err)
            }
        }
    }

    async fn prepare<W, F>(
        &self,
        record: &W,
        transition: W::Transition,
        actor: Option<&str>,
        inputs: F,
    ) -> Result<(W, TransitionOutcome<W::Status>), ServiceError>
    where
        W: Workflow,
        F: FnOnce(&mut W) -> Result<(), ServiceError> + Send,
    {
        let from = record.status();
        let rule = W::rule(transition);
        if !rule.allows(&from) {
            return Err(ServiceError::InvalidState(format!(
                "Cannot {} {} {} in status {}",
                transition,
                W::KIND,
                record.id(),
                from
            )));
        }

        let mut draft = record.clone();
        inputs(&mut draft)?;
        draft.guard(transition)?;

        let now = Utc::now();
        draft.on_transition(transition, now);
        draft.set_status(rule.to);

        let movements = draft.stock_movements(transition);
        for key in &movements {
            self.check_freezes(key).await?;
        }
        self.check_bins(&movements).await?;

        // Committed history length; unchanged by a rollback so retries reuse keys.
        let attempt = record.history().len();
        let mut documents: Vec<LedgerDocumentRef> = Vec::new();
        for request in draft.ledger_requests(transition) {
            let document = self
                .create_document::<W>(request, record.id(), transition, attempt, documents.last())
                .await?;
            documents.push(document);
        }

        draft.record_transition(
            TransitionRecord {
                transition: transition.to_string(),
                from: from.to_string(),
                to: rule.to.to_string(),
                at: now,
                actor: actor.map(str::to_string),
            },
            documents.clone(),
        );

        Ok((
            draft,
            TransitionOutcome {
                from,
                to: rule.to,
                documents,
            },
        ))
    }

    async fn check_freezes(&self, key: &StockKey) -> Result<(), ServiceError> {
        let matches = self.freezes.active_freezes_matching(key).await?;
        match matches.first() {
            Some(freeze) => Err(ServiceError::FrozenStock(format!(
                "Item {} in warehouse {} is frozen by {}{}",
                key.item_code.as_deref().unwrap_or("-"),
                key.warehouse.as_deref().unwrap_or("-"),
                freeze.id,
                freeze
                    .reason
                    .as_deref()
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default()
            ))),
            None => Ok(()),
        }
    }

    /// Rejects movements through a Blocked bin. Bins unknown to the
    /// directory are not checked.
    async fn check_bins(&self, movements: &[StockKey]) -> Result<(), ServiceError> {
        let mut checked: Vec<&str> = Vec::new();
        for code in movements.iter().filter_map(|k| k.bin.as_deref()) {
            if checked.contains(&code) {
                continue;
            }
            checked.push(code);
            if let Some(bin) = self.bins.get(code).await? {
                if bin.status() == BinStatus::Blocked {
                    return Err(ServiceError::ValidationError(format!(
                        "Bin {} is Blocked and cannot be used",
                        code
                    )));
                }
            }
        }
        Ok(())
    }

    async fn create_document<W: Workflow>(
        &self,
        request: LedgerRequest,
        record_id: uuid::Uuid,
        transition: W::Transition,
        attempt: usize,
        previous: Option<&LedgerDocumentRef>,
    ) -> Result<LedgerDocumentRef, ServiceError> {
        let LedgerRequest {
            kind,
            mut payload,
            links_previous,
        } = request;
        payload.idempotency_key = format!(
            "{}:{}:{}:{}:{}",
            W::KIND.slug(),
            record_id,
            transition,
            attempt,
            kind.slug()
        );
        if links_previous {
            payload.linked_document = previous.map(|d| d.id.clone());
        }

        match timeout(self.ledger_timeout, self.ledger.create(kind, payload)).await {
            Ok(Ok(document)) => Ok(document),
            Ok(Err(err @ ServiceError::LedgerCreationError(_))) => Err(err),
            Ok(Err(err)) => Err(ServiceError::LedgerCreationError(format!(
                "{} creation failed: {}",
                kind, err
            ))),
            Err(_) => Err(ServiceError::LedgerCreationError(format!(
                "{} creation timed out after {}ms",
                kind,
                self.ledger_timeout.as_millis()
            ))),
        }
    }
}
