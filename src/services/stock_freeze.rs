use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    external::{BinDirectory, FreezeRegistry},
    models::{
        BinStatus, BinStatusChange, FreezeStatus, FreezeTransition, OperationKind, StockFreeze,
    },
    workflow::{Aggregate, TransitionOutcome, Workflow, WorkflowEngine},
    WmsContext,
};

/// Service for stock freezes.
///
/// Committed freezes are mirrored into the [`FreezeRegistry`] so stock-moving
/// transitions see them. A bin-scoped freeze blocks its bin while Active.
#[derive(Clone)]
pub struct StockFreezeService {
    engine: WorkflowEngine,
    events: EventSender,
    freezes: Arc<dyn FreezeRegistry>,
    bins: Arc<dyn BinDirectory>,
}

impl StockFreezeService {
    pub fn new(ctx: &WmsContext) -> Self {
        Self {
            engine: ctx.engine(),
            events: ctx.events.clone(),
            freezes: ctx.freezes.clone(),
            bins: ctx.bins.clone(),
        }
    }

    #[instrument(skip(self, freeze), fields(freeze_id = %freeze.id()))]
    pub async fn activate(
        &self,
        freeze: &Aggregate<StockFreeze>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<FreezeStatus>, ServiceError> {
        let frozen_by = actor.map(str::to_string);
        self.apply(freeze, FreezeTransition::Activate, actor, move |draft| {
            draft.frozen_by = frozen_by;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, freeze), fields(freeze_id = %freeze.id()))]
    pub async fn release(
        &self,
        freeze: &Aggregate<StockFreeze>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<FreezeStatus>, ServiceError> {
        let released_by = actor.map(str::to_string);
        self.apply(freeze, FreezeTransition::Release, actor, move |draft| {
            draft.released_by = released_by;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, freeze), fields(freeze_id = %freeze.id()))]
    pub async fn cancel(
        &self,
        freeze: &Aggregate<StockFreeze>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<FreezeStatus>, ServiceError> {
        self.apply(freeze, FreezeTransition::Cancel, actor, |_| Ok(()))
            .await
    }

    /// Applies the transition, then mirrors it into the registry and the
    /// scoped bin. A failed mirror restores the record and the registry
    /// entry to their state before the transition.
    async fn apply<F>(
        &self,
        freeze: &Aggregate<StockFreeze>,
        transition: FreezeTransition,
        actor: Option<&str>,
        inputs: F,
    ) -> Result<TransitionOutcome<FreezeStatus>, ServiceError>
    where
        F: FnOnce(&mut StockFreeze) -> Result<(), ServiceError> + Send,
    {
        let mut record = freeze.acquire().await?;
        let before = record.clone();
        let outcome = self
            .engine
            .apply_with(&mut *record, transition, actor, inputs)
            .await?;

        if let Err(err) = self.mirror(&before, &record, transition, &outcome).await {
            error!(
                restored = %before.status(),
                "Freeze {} rolled back: {}", transition, err
            );
            *record = before;
            self.events
                .emit(Event::TransitionRejected {
                    operation: OperationKind::StockFreeze,
                    record_id: record.id,
                    transition: transition.to_string(),
                    error_code: err.error_code().to_string(),
                    reason: err.to_string(),
                })
                .await;
            return Err(err);
        }
        Ok(outcome)
    }

    async fn mirror(
        &self,
        before: &StockFreeze,
        committed: &StockFreeze,
        transition: FreezeTransition,
        outcome: &TransitionOutcome<FreezeStatus>,
    ) -> Result<(), ServiceError> {
        self.freezes.upsert(committed.clone()).await?;

        let Some(bin) = committed.scoped_bin() else {
            return Ok(());
        };
        let change = match transition {
            FreezeTransition::Activate => Some((BinStatusChange::Block, BinStatus::Blocked)),
            _ if outcome.from == FreezeStatus::Active => {
                Some((BinStatusChange::Reactivate, BinStatus::Active))
            }
            _ => None,
        };
        let Some((change, target)) = change else {
            return Ok(());
        };

        if let Err(err) = self.change_bin(bin, change, target).await {
            if let Err(restore) = self.freezes.upsert(before.clone()).await {
                error!(freeze_id = %before.id, "Freeze registry restore failed: {}", restore);
            }
            return Err(err);
        }
        Ok(())
    }

    /// Moves a bin to `target` unless it is already there or unknown.
    async fn change_bin(
        &self,
        code: &str,
        change: BinStatusChange,
        target: BinStatus,
    ) -> Result<(), ServiceError> {
        let Some(bin) = self.bins.get(code).await? else {
            warn!(bin = code, "Freeze scoped to unknown bin");
            return Ok(());
        };
        let from = bin.status();
        let eligible = match change {
            BinStatusChange::Reactivate => from == BinStatus::Blocked,
            _ => from != target,
        };
        if !eligible {
            return Ok(());
        }

        let updated = self.bins.set_status(code, change).await?;
        info!(bin = code, %from, to = %updated.status(), "Bin status changed by freeze");
        self.events
            .emit(Event::BinStatusChanged {
                bin_code: code.to_string(),
                from,
                to: updated.status(),
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WmsConfig;
    use crate::models::{Bin, BinCoordinates, FreezeScope, StockKey, ZoneType};
    use crate::InMemoryWms;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        pub Registry {}

        #[async_trait]
        impl FreezeRegistry for Registry {
            async fn active_freezes_matching(
                &self,
                key: &StockKey,
            ) -> Result<Vec<StockFreeze>, ServiceError>;

            async fn upsert(&self, freeze: StockFreeze) -> Result<(), ServiceError>;
        }
    }

    mock! {
        pub Bins {}

        #[async_trait]
        impl BinDirectory for Bins {
            async fn query(&self, warehouse: &str, status: BinStatus) -> Result<Vec<Bin>, ServiceError>;

            async fn get(&self, code: &str) -> Result<Option<Bin>, ServiceError>;

            async fn set_status(&self, code: &str, change: BinStatusChange) -> Result<Bin, ServiceError>;
        }
    }

    fn bin_scoped(wms: &InMemoryWms) -> Aggregate<StockFreeze> {
        wms.bins.insert(
            Bin::new("WH-1", BinCoordinates::new("4", "2", "", ""), ZoneType::Stocking).unwrap(),
        );
        wms.context.aggregate(StockFreeze::new(
            FreezeScope {
                bin: Some("4-2".into()),
                ..FreezeScope::default()
            },
            Some("Audit".into()),
        ))
    }

    #[tokio::test]
    async fn activation_blocks_bin_and_release_reactivates_it() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = StockFreezeService::new(&wms.context);
        let freeze = bin_scoped(&wms);

        service.activate(&freeze, Some("auditor")).await.unwrap();
        let bin = wms.bins.get("4-2").await.unwrap().unwrap();
        assert_eq!(bin.status(), BinStatus::Blocked);
        let record = freeze.snapshot().await;
        assert_eq!(record.frozen_by.as_deref(), Some("auditor"));
        assert!(record.frozen_at.is_some());

        let key = StockKey::new("ITEM-A", Some("WH-1"), Some("4-2"), None);
        assert_eq!(wms.freezes.active_freezes_matching(&key).await.unwrap().len(), 1);

        service.release(&freeze, Some("auditor")).await.unwrap();
        let bin = wms.bins.get("4-2").await.unwrap().unwrap();
        assert_eq!(bin.status(), BinStatus::Active);
        assert!(wms.freezes.active_freezes_matching(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelling_a_draft_freeze_leaves_bin_alone() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = StockFreezeService::new(&wms.context);
        let freeze = bin_scoped(&wms);

        service.cancel(&freeze, None).await.unwrap();
        assert_eq!(freeze.snapshot().await.status(), FreezeStatus::Cancelled);
        let bin = wms.bins.get("4-2").await.unwrap().unwrap();
        assert_eq!(bin.status(), BinStatus::Active);
    }

    #[tokio::test]
    async fn empty_scope_cannot_be_activated() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let service = StockFreezeService::new(&wms.context);
        let freeze = wms
            .context
            .aggregate(StockFreeze::new(FreezeScope::default(), None));

        assert_matches!(
            service.activate(&freeze, None).await,
            Err(ServiceError::ValidationError(_))
        );
        assert!(wms.freezes.is_empty());
    }

    #[tokio::test]
    async fn registry_failure_restores_draft() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let mut registry = MockRegistry::new();
        registry
            .expect_upsert()
            .times(1)
            .returning(|_| Err(ServiceError::ExternalServiceError("registry offline".into())));
        let context = WmsContext {
            freezes: Arc::new(registry),
            ..wms.context.clone()
        };
        let service = StockFreezeService::new(&context);
        let freeze = bin_scoped(&wms);

        assert_matches!(
            service.activate(&freeze, Some("auditor")).await,
            Err(ServiceError::ExternalServiceError(_))
        );
        let record = freeze.snapshot().await;
        assert_eq!(record.status(), FreezeStatus::Draft);
        assert!(record.frozen_at.is_none());
        assert!(record.history().is_empty());
        let bin = wms.bins.get("4-2").await.unwrap().unwrap();
        assert_eq!(bin.status(), BinStatus::Active);
    }

    #[tokio::test]
    async fn bin_failure_withdraws_registry_entry() {
        let wms = InMemoryWms::new(WmsConfig::default());
        let mut bins = MockBins::new();
        bins.expect_get().returning(|_| {
            Ok(Some(
                Bin::new("WH-1", BinCoordinates::new("4", "2", "", ""), ZoneType::Stocking)
                    .unwrap(),
            ))
        });
        bins.expect_set_status()
            .returning(|_, _| Err(ServiceError::ExternalServiceError("directory offline".into())));
        let context = WmsContext {
            bins: Arc::new(bins),
            ..wms.context.clone()
        };
        let service = StockFreezeService::new(&context);
        let freeze = bin_scoped(&wms);

        assert!(service.activate(&freeze, None).await.is_err());
        assert_eq!(freeze.snapshot().await.status(), FreezeStatus::Draft);
        let key = StockKey::new("ITEM-A", Some("WH-1"), Some("4-2"), None);
        assert!(wms.freezes.active_freezes_matching(&key).await.unwrap().is_empty());
    }
}
