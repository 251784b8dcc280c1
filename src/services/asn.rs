use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    errors::ServiceError,
    models::{Asn, AsnStatus, AsnTransition, Task},
    workflow::{Aggregate, TransitionOutcome, WorkflowEngine},
    WmsContext,
};

/// Service for receiving Advanced Shipping Notices (ASNs)
#[derive(Clone)]
pub struct AsnService {
    engine: WorkflowEngine,
}

impl AsnService {
    /// Creates a new ASN service instance
    pub fn new(ctx: &WmsContext) -> Self {
        Self {
            engine: ctx.engine(),
        }
    }

    #[instrument(skip(self, asn), fields(asn_id = %asn.id()))]
    pub async fn confirm(
        &self,
        asn: &Aggregate<Asn>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<AsnStatus>, ServiceError> {
        asn.transition(&self.engine, AsnTransition::Confirm, actor)
            .await
    }

    /// Marks the shipment as arrived; stamps the actual arrival time
    #[instrument(skip(self, asn), fields(asn_id = %asn.id()))]
    pub async fn mark_arrived(
        &self,
        asn: &Aggregate<Asn>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<AsnStatus>, ServiceError> {
        asn.transition(&self.engine, AsnTransition::MarkArrived, actor)
            .await
    }

    #[instrument(skip(self, asn), fields(asn_id = %asn.id()))]
    pub async fn start_unloading(
        &self,
        asn: &Aggregate<Asn>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<AsnStatus>, ServiceError> {
        asn.transition(&self.engine, AsnTransition::StartUnloading, actor)
            .await
    }

    /// Records received and damaged quantities for one line
    #[instrument(skip(self, asn), fields(asn_id = %asn.id()))]
    pub async fn record_receipt(
        &self,
        asn: &Aggregate<Asn>,
        line_id: Uuid,
        received: Decimal,
        damaged: Decimal,
    ) -> Result<(), ServiceError> {
        let mut record = asn.acquire().await?;
        record.record_receipt(line_id, received, damaged)?;
        info!(%line_id, %received, %damaged, "ASN receipt recorded");
        Ok(())
    }

    /// Classifies every line as Received, Short, Damaged or Pending
    #[instrument(skip(self, asn), fields(asn_id = %asn.id()))]
    pub async fn complete_sorting(
        &self,
        asn: &Aggregate<Asn>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<AsnStatus>, ServiceError> {
        asn.transition(&self.engine, AsnTransition::CompleteSorting, actor)
            .await
    }

    /// Creates the put-away task for received lines and returns it
    #[instrument(skip(self, asn), fields(asn_id = %asn.id()))]
    pub async fn create_putaway(
        &self,
        asn: &Aggregate<Asn>,
        actor: Option<&str>,
    ) -> Result<Task, ServiceError> {
        let mut created = None;
        asn.transition_with(
            &self.engine,
            AsnTransition::CreatePutaway,
            actor,
            |draft: &mut Asn| {
                let task = draft.putaway_task()?;
                draft.putaway_task = Some(task.id);
                created = Some(task);
                Ok(())
            },
        )
        .await?;

        let task = created.ok_or_else(|| {
            ServiceError::InvalidState("Putaway task was not built".to_string())
        })?;
        info!(task_id = %task.id, lines = task.items.len(), "Putaway task created");
        Ok(task)
    }

    /// Completes receiving and books the Purchase Receipt
    #[instrument(skip(self, asn), fields(asn_id = %asn.id()))]
    pub async fn complete(
        &self,
        asn: &Aggregate<Asn>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<AsnStatus>, ServiceError> {
        asn.transition(&self.engine, AsnTransition::Complete, actor)
            .await
    }

    #[instrument(skip(self, asn), fields(asn_id = %asn.id()))]
    pub async fn cancel(
        &self,
        asn: &Aggregate<Asn>,
        actor: Option<&str>,
    ) -> Result<TransitionOutcome<AsnStatus>, ServiceError> {
        asn.transition(&self.engine, AsnTransition::Cancel, actor)
            .await
    }
}
