use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::ledger::LedgerDocumentRef;
use super::{non_empty, OperationKind, StockKey, TransitionRecord};
use crate::errors::ServiceError;
use crate::workflow::{TransitionRule, Workflow};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum FreezeStatus {
    Draft,
    Active,
    Released,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum FreezeTransition {
    Activate,
    Release,
    Cancel,
}

/// Conjunctive filter over stock identity; unset criteria are wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeScope {
    pub item_code: Option<String>,
    pub warehouse: Option<String>,
    pub bin: Option<String>,
    pub batch_no: Option<String>,
}

impl FreezeScope {
    pub fn is_empty(&self) -> bool {
        non_empty(&self.item_code).is_none()
            && non_empty(&self.warehouse).is_none()
            && non_empty(&self.bin).is_none()
            && non_empty(&self.batch_no).is_none()
    }

    /// Every criterion set on the scope must equal the movement's value.
    /// A movement that leaves a scoped criterion blank does not match.
    pub fn matches(&self, key: &StockKey) -> bool {
        fn criterion(scope: &Option<String>, value: &Option<String>) -> bool {
            match non_empty(scope) {
                None => true,
                Some(expected) => non_empty(value) == Some(expected),
            }
        }

        criterion(&self.item_code, &key.item_code)
            && criterion(&self.warehouse, &key.warehouse)
            && criterion(&self.bin, &key.bin)
            && criterion(&self.batch_no, &key.batch_no)
    }
}

/// Holds stock out of circulation during audits or quality checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockFreeze {
    pub id: Uuid,
    pub scope: FreezeScope,
    pub reason: Option<String>,
    status: FreezeStatus,
    pub frozen_by: Option<String>,
    pub frozen_at: Option<DateTime<Utc>>,
    pub released_by: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    history: Vec<TransitionRecord>,
    documents: Vec<LedgerDocumentRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockFreeze {
    pub fn new(scope: FreezeScope, reason: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            scope,
            reason,
            status: FreezeStatus::Draft,
            frozen_by: None,
            frozen_at: None,
            released_by: None,
            released_at: None,
            history: Vec::new(),
            documents: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == FreezeStatus::Active
    }

    pub fn applies_to(&self, key: &StockKey) -> bool {
        self.is_active() && self.scope.matches(key)
    }

    pub fn scoped_bin(&self) -> Option<&str> {
        non_empty(&self.scope.bin)
    }
}

impl Workflow for StockFreeze {
    type Status = FreezeStatus;
    type Transition = FreezeTransition;

    const KIND: OperationKind = OperationKind::StockFreeze;
    const TERMINAL: &'static [FreezeStatus] = &[FreezeStatus::Released, FreezeStatus::Cancelled];

    fn id(&self) -> Uuid {
        self.id
    }

    fn status(&self) -> FreezeStatus {
        self.status
    }

    fn set_status(&mut self, status: FreezeStatus) {
        self.status = status;
    }

    fn rule(transition: FreezeTransition) -> TransitionRule<FreezeStatus> {
        use FreezeStatus::*;
        match transition {
            FreezeTransition::Activate => TransitionRule::new(&[Draft], Active),
            FreezeTransition::Release => TransitionRule::new(&[Active], Released),
            FreezeTransition::Cancel => TransitionRule::new(&[Draft, Active], Cancelled),
        }
    }

    fn guard(&self, transition: FreezeTransition) -> Result<(), ServiceError> {
        if transition == FreezeTransition::Activate && self.scope.is_empty() {
            return Err(ServiceError::ValidationError(
                "Specify at least one of: Item Code, Warehouse, Bin, or Batch No".to_string(),
            ));
        }
        Ok(())
    }

    fn on_transition(&mut self, transition: FreezeTransition, at: DateTime<Utc>) {
        match transition {
            FreezeTransition::Activate => self.frozen_at = Some(at),
            FreezeTransition::Release => self.released_at = Some(at),
            FreezeTransition::Cancel => {}
        }
    }

    fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    fn record_transition(&mut self, entry: TransitionRecord, documents: Vec<LedgerDocumentRef>) {
        self.updated_at = entry.at;
        self.history.push(entry);
        self.documents.extend(documents);
    }
}
