use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{TransitionOutcome, Workflow, WorkflowEngine};
use crate::config::LockMode;
use crate::errors::ServiceError;

/// Shared handle to one operation record.
///
/// At most one transition runs against the record at a time. With
/// [`LockMode::Reject`] a second request fails with `ConcurrentModification`;
/// with [`LockMode::Wait`] it queues behind the first.
pub struct Aggregate<W> {
    id: Uuid,
    lock_mode: LockMode,
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for Aggregate<W> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            lock_mode: self.lock_mode,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: Workflow> Aggregate<W> {
    pub fn new(record: W, lock_mode: LockMode) -> Self {
        Self {
            id: record.id(),
            lock_mode,
            inner: Arc::new(Mutex::new(record)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn lock_mode(&self) -> LockMode {
        self.lock_mode
    }

    /// Copy of the last committed state.
    pub async fn snapshot(&self) -> W {
        self.inner.lock().await.clone()
    }

    /// Exclusive access for a multi-step operation, honouring the lock mode.
    pub async fn acquire(&self) -> Result<MutexGuard<'_, W>, ServiceError> {
        match self.lock_mode {
            LockMode::Reject => self
                .inner
                .try_lock()
                .map_err(|_| ServiceError::ConcurrentModification(self.id)),
            LockMode::Wait => Ok(self.inner.lock().await),
        }
    }

    pub async fn transition(
        &self,
        engine: &WorkflowEngine,
        transition: W::Transition,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<W::Status>, ServiceError> {
        let mut record = self.acquire().await?;
        engine.apply(&mut *record, transition, actor).await
    }

    pub async fn transition_with<F>(
        &self,
        engine: &WorkflowEngine,
        transition: W::Transition,
        actor: Option<&str>,
        inputs: F,
    ) -> Result<TransitionOutcome<W::Status>, ServiceError>
    where
        F: FnOnce(&mut W) -> Result<(), ServiceError> + Send,
    {
        let mut record = self.acquire().await?;
        engine
            .apply_with(&mut *record, transition, actor, inputs)
            .await
    }

    /// Runs a short in-place mutation; always queues, so concurrent scans on
    /// the same record are serialized rather than rejected.
    pub async fn with_lock<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut record = self.inner.lock().await;
        f(&mut record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSender;
    use crate::external::{InMemoryBinDirectory, InMemoryFreezeRegistry, InMemoryLedger};
    use crate::models::{Task, TaskLine, TaskStatus, TaskTransition, TaskType};
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn engine() -> WorkflowEngine {
        let (events, _rx) = EventSender::channel(16);
        WorkflowEngine::new(
            Arc::new(InMemoryLedger::new()),
            Arc::new(InMemoryFreezeRegistry::new()),
            Arc::new(InMemoryBinDirectory::new()),
            events,
            Duration::from_millis(200),
        )
    }

    fn count_task() -> Task {
        Task::new(TaskType::Count, Some("WH-1".into()), None)
            .unwrap()
            .with_line(TaskLine::new("ITEM-A", dec!(3)))
    }

    #[tokio::test]
    async fn reject_mode_fails_second_transition_in_flight() {
        let engine = engine();
        let aggregate = Aggregate::new(count_task(), LockMode::Reject);
        let id = aggregate.id();

        let guard = aggregate.acquire().await.unwrap();
        let result = aggregate
            .transition(&engine, TaskTransition::Start, None)
            .await;
        assert_matches!(result, Err(ServiceError::ConcurrentModification(busy)) if busy == id);
        drop(guard);

        aggregate
            .transition(&engine, TaskTransition::Start, None)
            .await
            .unwrap();
        assert_eq!(aggregate.snapshot().await.status(), TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn wait_mode_serializes_transitions() {
        let engine = engine();
        let aggregate = Aggregate::new(count_task(), LockMode::Wait);

        let holder = aggregate.clone();
        let guard = holder.acquire().await.unwrap();
        let waiter = {
            let aggregate = aggregate.clone();
            let engine = engine.clone();
            tokio::spawn(async move {
                aggregate
                    .transition(&engine, TaskTransition::Start, None)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);

        let outcome = waiter.await.unwrap().unwrap();
        assert_eq!(outcome.to, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn only_one_of_two_concurrent_completions_commits() {
        let engine = engine();
        let aggregate = Aggregate::new(count_task(), LockMode::Wait);
        aggregate
            .transition(&engine, TaskTransition::Start, None)
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            aggregate.transition(&engine, TaskTransition::Complete, None),
            aggregate.transition(&engine, TaskTransition::Complete, None),
        );

        assert!(first.is_ok() ^ second.is_ok());
        let task = aggregate.snapshot().await;
        assert_eq!(task.status(), TaskStatus::Completed);
        assert_eq!(task.history().len(), 2);
    }
}
