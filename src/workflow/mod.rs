//! Generic finite-state-machine driver shared by every operation record.
//!
//! Each record type implements [`Workflow`]: a closed transition table, guard
//! set, intrinsic transition effects and ledger payload assembly. The
//! [`WorkflowEngine`] applies a transition atomically against a draft copy and
//! [`Aggregate`] provides per-record mutual exclusion.

pub mod aggregate;
pub mod engine;

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{LedgerDocumentRef, LedgerRequest, OperationKind, StockKey, TransitionRecord};

pub use aggregate::Aggregate;
pub use engine::{TransitionOutcome, WorkflowEngine};

/// One row of a transition table.
#[derive(Debug, Clone, Copy)]
pub struct TransitionRule<S: 'static> {
    pub from: &'static [S],
    pub to: S,
}

impl<S: PartialEq> TransitionRule<S> {
    pub const fn new(from: &'static [S], to: S) -> Self {
        Self { from, to }
    }

    pub fn allows(&self, status: &S) -> bool {
        self.from.contains(status)
    }
}

pub trait Workflow: Clone + Send + Sync + 'static {
    type Status: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Transition: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;

    const KIND: OperationKind;
    const TERMINAL: &'static [Self::Status];

    fn id(&self) -> Uuid;
    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);

    /// Transition table lookup.
    fn rule(transition: Self::Transition) -> TransitionRule<Self::Status>;

    /// Precondition evaluated after the table check.
    fn guard(&self, _transition: Self::Transition) -> Result<(), ServiceError> {
        Ok(())
    }

    /// Mutations intrinsic to the transition (default fills, timestamps).
    fn on_transition(&mut self, _transition: Self::Transition, _at: DateTime<Utc>) {}

    /// Stock the transition moves; checked against active freezes.
    fn stock_movements(&self, _transition: Self::Transition) -> Vec<StockKey> {
        Vec::new()
    }

    /// Ledger documents to create, in order.
    fn ledger_requests(&self, _transition: Self::Transition) -> Vec<LedgerRequest> {
        Vec::new()
    }

    fn history(&self) -> &[TransitionRecord];

    /// Appends the audit entry and the documents created by the transition.
    fn record_transition(&mut self, entry: TransitionRecord, documents: Vec<LedgerDocumentRef>);

    fn is_terminal(&self) -> bool {
        Self::TERMINAL.contains(&self.status())
    }

    fn can_apply(&self, transition: Self::Transition) -> bool {
        Self::rule(transition).allows(&self.status())
    }
}

/// Guard helper for the common "must have lines" precondition.
pub(crate) fn require_lines<T>(lines: &[T], message: &str) -> Result<(), ServiceError> {
    if lines.is_empty() {
        Err(ServiceError::ValidationError(message.to_string()))
    } else {
        Ok(())
    }
}
