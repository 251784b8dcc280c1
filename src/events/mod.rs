use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{BinStatus, LedgerDocumentRef, OperationKind};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and returns the sender with its receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after a commit; delivery failures are logged only.
    pub async fn emit(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

// Domain events emitted after an aggregate commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    TransitionApplied {
        operation: OperationKind,
        record_id: Uuid,
        transition: String,
        from: String,
        to: String,
        actor: Option<String>,
    },
    TransitionRejected {
        operation: OperationKind,
        record_id: Uuid,
        transition: String,
        error_code: String,
        reason: String,
    },
    LedgerDocumentCreated {
        operation: OperationKind,
        record_id: Uuid,
        document: LedgerDocumentRef,
    },
    PickRouteApplied {
        task_id: Uuid,
        sequenced: usize,
        unresolved: usize,
    },
    WaveConsolidated {
        wave_id: Uuid,
        orders: usize,
        items: usize,
    },
    PackageSealed {
        station_id: Uuid,
        package_no: u32,
    },
    ItemScanned {
        station_id: Uuid,
        item_code: String,
        package_no: u32,
        remaining_qty: Decimal,
    },
    BinStatusChanged {
        bin_code: String,
        from: BinStatus,
        to: BinStatus,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) -> usize {
    info!("Starting event processing loop");
    let mut processed = 0;

    while let Some(event) = receiver.recv().await {
        processed += 1;
        match &event {
            Event::TransitionApplied {
                operation,
                record_id,
                transition,
                from,
                to,
                ..
            } => {
                info!(%operation, %record_id, %transition, %from, %to, "Transition applied");
            }
            Event::TransitionRejected {
                operation,
                record_id,
                transition,
                error_code,
                reason,
            } => {
                warn!(%operation, %record_id, %transition, %error_code, "Transition rejected: {}", reason);
            }
            Event::LedgerDocumentCreated {
                operation,
                record_id,
                document,
            } => {
                info!(
                    %operation,
                    %record_id,
                    kind = %document.kind,
                    document_id = %document.id,
                    "Ledger document created"
                );
            }
            Event::PickRouteApplied {
                task_id,
                sequenced,
                unresolved,
            } => {
                if *unresolved > 0 {
                    warn!(%task_id, sequenced, unresolved, "Pick route applied with unresolved lines");
                } else {
                    info!(%task_id, sequenced, "Pick route applied");
                }
            }
            Event::WaveConsolidated {
                wave_id,
                orders,
                items,
            } => {
                info!(%wave_id, orders, items, "Wave consolidated");
            }
            Event::PackageSealed {
                station_id,
                package_no,
            } => {
                info!(%station_id, package_no, "Package sealed");
            }
            Event::ItemScanned {
                station_id,
                item_code,
                package_no,
                remaining_qty,
            } => {
                info!(%station_id, %item_code, package_no, %remaining_qty, "Item scanned");
            }
            Event::BinStatusChanged { bin_code, from, to } => {
                info!(%bin_code, %from, %to, "Bin status changed");
            }
        }
    }

    warn!("Event processing loop has ended");
    processed
}
