use std::sync::Arc;
use tracing::{info, instrument};

use crate::{
    consolidation::DemandConsolidator,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Task, WaveItem, WavePick, WaveStatus, WaveTransition},
    routing::PickRouteOptimizer,
    workflow::{Aggregate, TransitionOutcome, Workflow, WorkflowEngine},
    WmsContext,
};

/// Service for wave picking
#[derive(Clone)]
pub struct WavePickService {
    engine: WorkflowEngine,
    events: EventSender,
    consolidator: Arc<DemandConsolidator>,
    optimizer: Arc<PickRouteOptimizer>,
    auto_route: bool,
}

impl WavePickService {
    pub fn new(ctx: &WmsContext) -> Self {
        Self {
            engine: ctx.engine(),
            events: ctx.events.clone(),
            consolidator: Arc::new(ctx.consolidator()),
            optimizer: Arc::new(ctx.route_optimizer()),
            auto_route: ctx.config.auto_route_wave_tasks,
        }
    }

    #[instrument(skip(self, wave), fields(wave_id = %wave.id()))]
    pub async fn add_order(
        &self,
        wave: &Aggregate<WavePick>,
        order_id: &str,
        customer: Option<String>,
    ) -> Result<(), ServiceError> {
        let mut record = wave.acquire().await?;
        record.add_order(order_id, customer)
    }

    #[instrument(skip(self, wave), fields(wave_id = %wave.id()))]
    pub async fn remove_order(&self, wave: &Aggregate<WavePick>, order_id: &str) -> Result<(), ServiceError> {
        let mut record = wave.acquire().await?;
        record.remove_order(order_id)
    }

    /// Rebuilds the consolidated item list from the wave's orders
    #[instrument(skip(self, wave), fields(wave_id = %wave.id()))]
    pub async fn consolidate(&self, wave: &Aggregate<WavePick>) -> Result<Vec<WaveItem>, ServiceError> {
        let mut record = wave.acquire().await?;
        let items = self.consolidator.consolidate(&mut record).await?;
        let orders = record.total_orders();
        drop(record);

        self.events
            .emit(Event::WaveConsolidated {
                wave_id: wave.id(),
                orders,
                items: items.len(),
            })
            .await;
        Ok(items)
    }

    #[instrument(skip(self, wave), fields(wave_id = %wave.id()))]
    pub async fn release(
        &self,
        wave: &Aggregate<WavePick>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<WaveStatus>, ServiceError> {
        wave.transition(&self.engine, WaveTransition::Release, actor)
            .await
    }

    /// Starts picking and returns the pick task created for the wave.
    ///
    /// The task is routed before the wave commits, so a routing failure
    /// leaves the wave Released.
    #[instrument(skip(self, wave), fields(wave_id = %wave.id()))]
    pub async fn start_picking(
        &self,
        wave: &Aggregate<WavePick>,
        actor: Option<&str>,
    ) -> Result<(TransitionOutcome<WaveStatus>, Task), ServiceError> {
        let mut record = wave.acquire().await?;
        let mut task = record.pick_task()?;

        let routable = record.can_apply(WaveTransition::StartPicking)
            && record.guard(WaveTransition::StartPicking).is_ok();
        let route = if self.auto_route && routable {
            Some(self.optimizer.apply(&mut task).await?)
        } else {
            None
        };

        let task_id = task.id;
        let outcome = self
            .engine
            .apply_with(
                &mut *record,
                WaveTransition::StartPicking,
                actor,
                |draft: &mut WavePick| {
                    draft.pick_task = Some(task_id);
                    Ok(())
                },
            )
            .await?;
        drop(record);

        info!(%task_id, lines = task.items.len(), "Wave pick task created");
        if let Some(route) = route {
            self.events
                .emit(Event::PickRouteApplied {
                    task_id,
                    sequenced: route.sequence.len(),
                    unresolved: route.unresolved.len(),
                })
                .await;
        }
        Ok((outcome, task))
    }

    #[instrument(skip(self, wave), fields(wave_id = %wave.id()))]
    pub async fn complete(
        &self,
        wave: &Aggregate<WavePick>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<WaveStatus>, ServiceError> {
        wave.transition(&self.engine, WaveTransition::Complete, actor)
            .await
    }

    #[instrument(skip(self, wave), fields(wave_id = %wave.id()))]
    pub async fn cancel(
        &self,
        wave: &Aggregate<WavePick>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<WaveStatus>, ServiceError> {
        wave.transition(&self.engine, WaveTransition::Cancel, actor)
            .await
    }
}
