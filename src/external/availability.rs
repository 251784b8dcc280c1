use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use super::bins::BinDirectory;
use crate::errors::ServiceError;
use crate::models::{Bin, BinStatus, ZoneType};

/// Stock figures and bin resolution for unlocated lines.
#[async_trait]
pub trait InventoryAvailability: Send + Sync {
    async fn resolve_bin(
        &self,
        item_code: &str,
        warehouse: &str,
        qty: Decimal,
    ) -> Result<Bin, ServiceError>;

    /// Book figures for one item, `None` when the warehouse holds no record.
    async fn stock_level(
        &self,
        item_code: &str,
        warehouse: &str,
    ) -> Result<Option<StockLevel>, ServiceError>;

    /// Items with positive actual stock in a warehouse, by item code.
    async fn stocked_items(&self, warehouse: &str)
        -> Result<Vec<(String, StockLevel)>, ServiceError>;
}

/// Warehouse-level stock figures for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StockLevel {
    pub actual_qty: Decimal,
    pub reserved_qty: Decimal,
    pub valuation_rate: Decimal,
}

impl StockLevel {
    pub fn new(actual_qty: Decimal, reserved_qty: Decimal) -> Self {
        Self {
            actual_qty,
            reserved_qty,
            valuation_rate: Decimal::ZERO,
        }
    }

    pub fn with_valuation_rate(mut self, rate: Decimal) -> Self {
        self.valuation_rate = rate;
        self
    }

    pub fn available(&self) -> Decimal {
        self.actual_qty - self.reserved_qty
    }
}

/// Resolves bins from warehouse-level stock and the bin directory.
///
/// Stock is tracked per warehouse, so the chosen bin is a routing hint: the
/// oldest Active Picking-zone bin, else the oldest Active bin of the
/// highest-priority zone.
pub struct InMemoryAvailability {
    bins: Arc<dyn BinDirectory>,
    stock: DashMap<(String, String), StockLevel>,
}

impl InMemoryAvailability {
    pub fn new(bins: Arc<dyn BinDirectory>) -> Self {
        Self {
            bins,
            stock: DashMap::new(),
        }
    }

    pub fn set_stock(&self, item_code: &str, warehouse: &str, level: StockLevel) {
        self.stock
            .insert((item_code.to_string(), warehouse.to_string()), level);
    }

    pub fn available_qty(&self, item_code: &str, warehouse: &str) -> Decimal {
        self.stock
            .get(&(item_code.to_string(), warehouse.to_string()))
            .map(|level| level.available())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InventoryAvailability for InMemoryAvailability {
    async fn resolve_bin(
        &self,
        item_code: &str,
        warehouse: &str,
        qty: Decimal,
    ) -> Result<Bin, ServiceError> {
        let available = self.available_qty(item_code, warehouse);
        if available <= Decimal::ZERO {
            return Err(ServiceError::ResolutionError(format!(
                "No available stock for {} in {}",
                item_code, warehouse
            )));
        }

        let mut candidates = self.bins.query(warehouse, BinStatus::Active).await?;
        candidates.sort_by(|a, b| {
            a.zone_type
                .pick_priority()
                .cmp(&b.zone_type.pick_priority())
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        let chosen = candidates
            .iter()
            .position(|b| b.zone_type == ZoneType::Picking)
            .or(if candidates.is_empty() { None } else { Some(0) })
            .map(|index| candidates.swap_remove(index))
            .ok_or_else(|| {
                ServiceError::ResolutionError(format!("No active bins in {}", warehouse))
            })?;

        debug!(
            item_code,
            warehouse,
            %qty,
            %available,
            bin = %chosen.code,
            "Resolved source bin"
        );
        Ok(chosen)
    }

    async fn stock_level(
        &self,
        item_code: &str,
        warehouse: &str,
    ) -> Result<Option<StockLevel>, ServiceError> {
        Ok(self
            .stock
            .get(&(item_code.to_string(), warehouse.to_string()))
            .map(|level| *level.value()))
    }

    async fn stocked_items(
        &self,
        warehouse: &str,
    ) -> Result<Vec<(String, StockLevel)>, ServiceError> {
        let mut items: Vec<(String, StockLevel)> = self
            .stock
            .iter()
            .filter(|entry| entry.key().1 == warehouse && entry.value().actual_qty > Decimal::ZERO)
            .map(|entry| (entry.key().0.clone(), *entry.value()))
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(items)
    }
}
