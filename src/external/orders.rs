use async_trait::async_trait;
use dashmap::DashMap;

use super::OrderLine;
use crate::errors::ServiceError;

/// Sales/purchase order lines.
#[async_trait]
pub trait OrderSource: Send + Sync {
    async fn get_lines(&self, order_id: &str) -> Result<Vec<OrderLine>, ServiceError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderSource {
    orders: DashMap<String, Vec<OrderLine>>,
}

impl InMemoryOrderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order_id: impl Into<String>, lines: Vec<OrderLine>) {
        self.orders.insert(order_id.into(), lines);
    }
}

#[async_trait]
impl OrderSource for InMemoryOrderSource {
    async fn get_lines(&self, order_id: &str) -> Result<Vec<OrderLine>, ServiceError> {
        self.orders
            .get(order_id)
            .map(|lines| lines.value().clone())
            .ok_or_else(|| ServiceError::NotFound(format!("Order {}", order_id)))
    }
}
