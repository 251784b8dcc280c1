use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

use super::fetch_order_lines;
use crate::{
    errors::ServiceError,
    external::OrderSource,
    models::{non_empty, Dispatch, DispatchStatus, DispatchTransition},
    workflow::{Aggregate, TransitionOutcome, WorkflowEngine},
    WmsContext,
};

/// Service driving outbound dispatches from allocation to delivery
#[derive(Clone)]
pub struct DispatchService {
    engine: WorkflowEngine,
    orders: Arc<dyn OrderSource>,
    lookup_timeout: Duration,
}

impl DispatchService {
    pub fn new(ctx: &WmsContext) -> Self {
        Self {
            engine: ctx.engine(),
            orders: ctx.orders.clone(),
            lookup_timeout: ctx.config.availability_timeout(),
        }
    }

    /// Replaces the dispatch lines with those of its sales order
    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id()))]
    pub async fn load_order_lines(&self, dispatch: &Aggregate<Dispatch>) -> Result<usize, ServiceError> {
        let mut record = dispatch.acquire().await?;
        let sales_order = non_empty(&record.sales_order)
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::ValidationError("Set a sales order before loading lines".to_string())
            })?;
        let lines = fetch_order_lines(self.orders.as_ref(), &sales_order, self.lookup_timeout).await?;
        record.load_order_lines(lines)?;
        info!(%sales_order, lines = record.items.len(), "Dispatch lines loaded");
        Ok(record.items.len())
    }

    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id()))]
    pub async fn allocate(
        &self,
        dispatch: &Aggregate<Dispatch>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<DispatchStatus>, ServiceError> {
        dispatch
            .transition(&self.engine, DispatchTransition::Allocate, actor)
            .await
    }

    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id()))]
    pub async fn mark_picked(
        &self,
        dispatch: &Aggregate<Dispatch>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<DispatchStatus>, ServiceError> {
        dispatch
            .transition(&self.engine, DispatchTransition::MarkPicked, actor)
            .await
    }

    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id()))]
    pub async fn mark_packed(
        &self,
        dispatch: &Aggregate<Dispatch>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<DispatchStatus>, ServiceError> {
        dispatch
            .transition(&self.engine, DispatchTransition::MarkPacked, actor)
            .await
    }

    /// Records the total weight of the packed shipment
    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id()))]
    pub async fn weigh(
        &self,
        dispatch: &Aggregate<Dispatch>,
        total_weight: Decimal,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<DispatchStatus>, ServiceError> {
        dispatch
            .transition_with(&self.engine, DispatchTransition::Weigh, actor, |draft: &mut Dispatch| {
                draft.total_weight = Some(total_weight);
                Ok(())
            })
            .await
    }

    /// Hands the shipment to a carrier; books the Delivery Note and Shipment
    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id()))]
    pub async fn dispatch(
        &self,
        dispatch: &Aggregate<Dispatch>,
        carrier: &str,
        tracking_no: Option<&str>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<DispatchStatus>, ServiceError> {
        let carrier = carrier.to_string();
        let tracking_no = tracking_no.map(str::to_string);
        dispatch
            .transition_with(&self.engine, DispatchTransition::Dispatch, actor, |draft: &mut Dispatch| {
                draft.carrier = Some(carrier);
                draft.tracking_no = tracking_no;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id()))]
    pub async fn mark_delivered(
        &self,
        dispatch: &Aggregate<Dispatch>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<DispatchStatus>, ServiceError> {
        dispatch
            .transition(&self.engine, DispatchTransition::MarkDelivered, actor)
            .await
    }

    #[instrument(skip(self, dispatch), fields(dispatch_id = %dispatch.id()))]
    pub async fn cancel(
        &self,
        dispatch: &Aggregate<Dispatch>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<DispatchStatus>, ServiceError> {
        dispatch
            .transition(&self.engine, DispatchTransition::Cancel, actor)
            .await
    }
}
