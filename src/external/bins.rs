use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::ServiceError;
use crate::models::{Bin, BinStatus, BinStatusChange};

/// Source of warehouse bin records.
#[async_trait]
pub trait BinDirectory: Send + Sync {
    /// Bins of a warehouse in the given status, oldest first.
    async fn query(&self, warehouse: &str, status: BinStatus) -> Result<Vec<Bin>, ServiceError>;

    async fn get(&self, code: &str) -> Result<Option<Bin>, ServiceError>;

    /// Applies an explicit status change request and returns the updated bin.
    async fn set_status(&self, code: &str, change: BinStatusChange) -> Result<Bin, ServiceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryBinDirectory {
    bins: DashMap<String, Bin>,
}

impl InMemoryBinDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bins(bins: impl IntoIterator<Item = Bin>) -> Self {
        let directory = Self::new();
        for bin in bins {
            directory.insert(bin);
        }
        directory
    }

    pub fn insert(&self, bin: Bin) {
        self.bins.insert(bin.code.clone(), bin);
    }
}

#[async_trait]
impl BinDirectory for InMemoryBinDirectory {
    async fn query(&self, warehouse: &str, status: BinStatus) -> Result<Vec<Bin>, ServiceError> {
        let mut bins: Vec<Bin> = self
            .bins
            .iter()
            .filter(|b| b.warehouse == warehouse && b.status() == status)
            .map(|b| b.value().clone())
            .collect();
        bins.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.code.cmp(&b.code)));
        Ok(bins)
    }

    async fn get(&self, code: &str) -> Result<Option<Bin>, ServiceError> {
        Ok(self.bins.get(code).map(|b| b.value().clone()))
    }

    async fn set_status(&self, code: &str, change: BinStatusChange) -> Result<Bin, ServiceError> {
        let mut bin = self
            .bins
            .get_mut(code)
            .ok_or_else(|| ServiceError::NotFound(format!("Bin {}", code)))?;
        bin.request_status_change(change)?;
        Ok(bin.clone())
    }
}
