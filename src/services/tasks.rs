use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::{non_empty, Task, TaskStatus, TaskTransition},
    routing::{PickRouteOptimizer, RouteComputation},
    workflow::{Aggregate, TransitionOutcome, WorkflowEngine},
    WmsContext,
};

/// Service for directed floor work (pick, put-away, transfer, count, pack)
#[derive(Clone)]
pub struct TaskService {
    engine: WorkflowEngine,
    events: EventSender,
    optimizer: Arc<PickRouteOptimizer>,
}

impl TaskService {
    pub fn new(ctx: &WmsContext) -> Self {
        Self {
            engine: ctx.engine(),
            events: ctx.events.clone(),
            optimizer: Arc::new(ctx.route_optimizer()),
        }
    }

    /// Assigns the task; `user` may be omitted when an assignee is already set
    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub async fn assign(
        &self,
        task: &Aggregate<Task>,
        user: Option<&str>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<TaskStatus>, ServiceError> {
        let user = user.map(str::to_string);
        task.transition_with(&self.engine, TaskTransition::Assign, actor, |draft: &mut Task| {
            if let Some(user) = user.filter(|u| !u.trim().is_empty()) {
                draft.assigned_to = Some(user);
            }
            Ok(())
        })
        .await
    }

    /// Starts work; the acting user becomes the assignee if none is set
    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub async fn start(
        &self,
        task: &Aggregate<Task>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<TaskStatus>, ServiceError> {
        let worker = actor.map(str::to_string);
        task.transition_with(&self.engine, TaskTransition::Start, actor, |draft: &mut Task| {
            if non_empty(&draft.assigned_to).is_none() {
                draft.assigned_to = worker;
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub async fn record_actual(
        &self,
        task: &Aggregate<Task>,
        line_id: Uuid,
        actual: Decimal,
    ) -> Result<(), ServiceError> {
        let mut record = task.acquire().await?;
        record.record_actual(line_id, actual)
    }

    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub async fn set_required(
        &self,
        task: &Aggregate<Task>,
        line_id: Uuid,
        qty: Decimal,
    ) -> Result<(), ServiceError> {
        let mut record = task.acquire().await?;
        record.set_required(line_id, qty)
    }

    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub async fn skip_line(&self, task: &Aggregate<Task>, line_id: Uuid) -> Result<(), ServiceError> {
        let mut record = task.acquire().await?;
        record.skip_line(line_id)?;
        info!(%line_id, "Task line skipped");
        Ok(())
    }

    /// Completes the task; books a Stock Entry, or a Stock Reconciliation for counts
    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub async fn complete(
        &self,
        task: &Aggregate<Task>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<TaskStatus>, ServiceError> {
        task.transition(&self.engine, TaskTransition::Complete, actor)
            .await
    }

    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub async fn cancel(
        &self,
        task: &Aggregate<Task>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<TaskStatus>, ServiceError> {
        task.transition(&self.engine, TaskTransition::Cancel, actor)
            .await
    }

    /// Recomputes and stores the pick route of a Pick task
    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub async fn optimize_route(&self, task: &Aggregate<Task>) -> Result<RouteComputation, ServiceError> {
        let mut record = task.acquire().await?;
        let route = self.optimizer.apply(&mut record).await?;
        drop(record);
        self.events
            .emit(Event::PickRouteApplied {
                task_id: task.id(),
                sequenced: route.sequence.len(),
                unresolved: route.unresolved.len(),
            })
            .await;
        Ok(route)
    }

    /// Route of the last committed state, without storing it
    #[instrument(skip(self, task), fields(task_id = %task.id()))]
    pub async fn preview_route(&self, task: &Aggregate<Task>) -> Result<RouteComputation, ServiceError> {
        let snapshot = task.snapshot().await;
        self.optimizer.preview_route(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WmsConfig;
    use crate::models::{
        Bin, BinCoordinates, LedgerDocumentKind, TaskLine, TaskType, ZoneType,
    };
    use crate::workflow::Workflow;
    use crate::InMemoryWms;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn assign_requires_a_user() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = TaskService::new(&wms.context);
        let task = wms.context.aggregate(
            Task::new(TaskType::Count, Some("WH-1".into()), None)
                .unwrap()
                .with_line(TaskLine::new("ITEM-A", dec!(1))),
        );

        assert_matches!(
            service.assign(&task, None, None).await,
            Err(ServiceError::ValidationError(_))
        );
        service.assign(&task, Some("alex"), None).await.unwrap();
        assert_eq!(task.snapshot().await.assigned_to.as_deref(), Some("alex"));
    }

    #[tokio::test]
    async fn start_stamps_acting_user() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = TaskService::new(&wms.context);
        let task = wms.context.aggregate(
            Task::new(TaskType::Count, Some("WH-1".into()), None)
                .unwrap()
                .with_line(TaskLine::new("ITEM-A", dec!(1))),
        );

        service.start(&task, Some("sam")).await.unwrap();
        let record = task.snapshot().await;
        assert_eq!(record.assigned_to.as_deref(), Some("sam"));
        assert_eq!(record.history()[0].actor.as_deref(), Some("sam"));
    }

    #[tokio::test]
    async fn count_task_difference_books_reconciliation() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = TaskService::new(&wms.context);
        let line = TaskLine::new("ITEM-A", dec!(10));
        let line_id = line.id;
        let task = wms.context.aggregate(
            Task::new(TaskType::Count, Some("WH-1".into()), None)
                .unwrap()
                .with_line(line)
                .with_line(TaskLine::new("ITEM-B", dec!(4))),
        );

        service.start(&task, Some("sam")).await.unwrap();
        service.record_actual(&task, line_id, dec!(7)).await.unwrap();
        let outcome = service.complete(&task, None).await.unwrap();

        assert_eq!(
            outcome.documents[0].kind,
            LedgerDocumentKind::StockReconciliation
        );
        let record = task.snapshot().await;
        assert_eq!(record.items[0].difference_qty(), dec!(-3));
        assert_eq!(record.items[1].actual_qty(), Some(dec!(4)));
        assert_eq!(record.items[1].difference_qty(), dec!(0));
    }

    #[tokio::test]
    async fn ledger_failure_keeps_task_in_progress() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = TaskService::new(&wms.context);
        let task = wms.context.aggregate(
            Task::new(TaskType::Transfer, Some("WH-1".into()), Some("WH-2".into()))
                .unwrap()
                .with_line(TaskLine::new("ITEM-A", dec!(2))),
        );
        service.start(&task, Some("sam")).await.unwrap();
        wms.ledger.fail_on(LedgerDocumentKind::StockEntry, "ledger offline");

        assert_matches!(
            service.complete(&task, None).await,
            Err(ServiceError::LedgerCreationError(_))
        );
        let record = task.snapshot().await;
        assert_eq!(record.status(), TaskStatus::InProgress);
        assert!(record.documents().is_empty());
        assert!(wms.ledger.is_empty());
    }

    #[tokio::test]
    async fn optimize_route_emits_event() {
        let mut wms = InMemoryWms::new(WmsConfig::default());
        wms.bins.insert(
            Bin::new("WH-1", BinCoordinates::new("1", "1", "", ""), ZoneType::Picking).unwrap(),
        );
        let service = TaskService::new(&wms.context);
        let task = wms.context.aggregate(
            Task::new(TaskType::Pick, Some("WH-1".into()), None)
                .unwrap()
                .with_line(TaskLine::new("ITEM-A", dec!(1)).with_source_bin("1-1")),
        );

        let preview = service.preview_route(&task).await.unwrap();
        assert_eq!(task.snapshot().await.items[0].pick_sequence, None);

        let route = service.optimize_route(&task).await.unwrap();
        assert_eq!(route, preview);
        assert_eq!(task.snapshot().await.items[0].pick_sequence, Some(1));
        assert!(wms
            .drain_events()
            .iter()
            .any(|e| matches!(e, Event::PickRouteApplied { sequenced: 1, .. })));
    }
}
