use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{StockFreeze, StockKey};

/// Read side of stock freezes, consulted before any stock movement.
#[async_trait]
pub trait FreezeRegistry: Send + Sync {
    async fn active_freezes_matching(&self, key: &StockKey) -> Result<Vec<StockFreeze>, ServiceError>;

    /// Stores the latest committed state of a freeze.
    async fn upsert(&self, freeze: StockFreeze) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryFreezeRegistry {
    freezes: DashMap<Uuid, StockFreeze>,
}

impl InMemoryFreezeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.freezes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freezes.is_empty()
    }
}

#[async_trait]
impl FreezeRegistry for InMemoryFreezeRegistry {
    async fn active_freezes_matching(&self, key: &StockKey) -> Result<Vec<StockFreeze>, ServiceError> {
        Ok(self
            .freezes
            .iter()
            .filter(|f| f.applies_to(key))
            .map(|f| f.value().clone())
            .collect())
    }

    async fn upsert(&self, freeze: StockFreeze) -> Result<(), ServiceError> {
        self.freezes.insert(freeze.id, freeze);
        Ok(())
    }
}
