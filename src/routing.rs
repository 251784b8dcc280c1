//! Pick-route optimisation.
//!
//! Lines are bound to bins (resolving unlocated lines through
//! [`InventoryAvailability`]) and ordered in a serpentine walk: aisles
//! ascending, racks alternating direction per visited aisle, then shelf and
//! level ascending.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::external::{BinDirectory, InventoryAvailability};
use crate::metrics;
use crate::models::bin::NaturalKey;
use crate::models::{
    non_empty, Bin, BinCoordinates, BinStatus, Task, TaskLine, TaskLineStatus, TaskStatus,
    TaskType, ZoneType,
};
use crate::workflow::Workflow;

/// A resolved line in walk order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStop {
    pub pick_sequence: u32,
    pub line_id: Uuid,
    pub item_code: String,
    pub qty: Decimal,
    pub bin: String,
    pub coordinates: BinCoordinates,
    pub zone_type: ZoneType,
}

/// A line excluded from the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedLine {
    pub line_id: Uuid,
    pub item_code: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteComputation {
    pub sequence: Vec<RouteStop>,
    pub unresolved: Vec<UnresolvedLine>,
}

impl RouteComputation {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Orders located stops in a serpentine walk.
///
/// The sort is stable, so stops sharing a full location keep their input order.
pub fn serpentine_order<T>(stops: Vec<(T, BinCoordinates)>) -> Vec<(T, BinCoordinates)> {
    let mut keyed: Vec<_> = stops
        .into_iter()
        .map(|(item, coords)| {
            let aisle = NaturalKey::new(&coords.aisle);
            (aisle, item, coords)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    let mut ordered = Vec::with_capacity(keyed.len());
    let mut ordinal = 0usize;
    let mut iter = keyed.into_iter().peekable();
    while let Some((aisle, item, coords)) = iter.next() {
        ordinal += 1;
        let mut group = vec![(item, coords)];
        while let Some((_, item, coords)) = iter.next_if(|(next, _, _)| *next == aisle) {
            group.push((item, coords));
        }

        let descending = ordinal % 2 == 0;
        group.sort_by(|(_, a), (_, b)| {
            let rack = NaturalKey::new(&a.rack).cmp(&NaturalKey::new(&b.rack));
            let rack = if descending { rack.reverse() } else { rack };
            rack.then_with(|| NaturalKey::new(&a.shelf).cmp(&NaturalKey::new(&b.shelf)))
                .then_with(|| NaturalKey::new(&a.level).cmp(&NaturalKey::new(&b.level)))
        });
        ordered.extend(group);
    }
    ordered
}

pub struct PickRouteOptimizer {
    availability: Arc<dyn InventoryAvailability>,
    bins: Arc<dyn BinDirectory>,
    availability_timeout: Duration,
}

impl PickRouteOptimizer {
    pub fn new(
        availability: Arc<dyn InventoryAvailability>,
        bins: Arc<dyn BinDirectory>,
        availability_timeout: Duration,
    ) -> Self {
        Self {
            availability,
            bins,
            availability_timeout,
        }
    }

    /// Binds and orders the given lines without touching them.
    pub async fn compute(
        &self,
        warehouse: &str,
        lines: &[TaskLine],
    ) -> Result<RouteComputation, ServiceError> {
        let mut located: Vec<((Uuid, String, Decimal, String, ZoneType), BinCoordinates)> =
            Vec::new();
        let mut unresolved = Vec::new();

        for line in lines
            .iter()
            .filter(|l| l.row_status != TaskLineStatus::Skipped)
        {
            match self.locate(warehouse, line).await? {
                Ok(bin) => located.push((
                    (
                        line.id,
                        line.item_code.clone(),
                        line.qty,
                        bin.code.clone(),
                        bin.zone_type,
                    ),
                    bin.coordinates,
                )),
                Err(message) => {
                    debug!(line_id = %line.id, item_code = %line.item_code, "Unresolved pick line: {}", message);
                    unresolved.push(UnresolvedLine {
                        line_id: line.id,
                        item_code: line.item_code.clone(),
                        error_message: message,
                    });
                }
            }
        }

        let sequence = serpentine_order(located)
            .into_iter()
            .enumerate()
            .map(
                |(index, ((line_id, item_code, qty, bin, zone_type), coordinates))| RouteStop {
                    pick_sequence: index as u32 + 1,
                    line_id,
                    item_code,
                    qty,
                    bin,
                    coordinates,
                    zone_type,
                },
            )
            .collect();

        Ok(RouteComputation {
            sequence,
            unresolved,
        })
    }

    /// Recomputes the route of a Pick task and writes it onto the lines.
    ///
    /// Every call starts from scratch, so applying twice to an unchanged task
    /// yields the same sequence.
    #[instrument(skip(self, task), fields(task_id = %task.id))]
    pub async fn apply(&self, task: &mut Task) -> Result<RouteComputation, ServiceError> {
        Self::ensure_routable(task)?;
        if matches!(task.status(), TaskStatus::Completed | TaskStatus::Cancelled) {
            return Err(ServiceError::InvalidState(format!(
                "Cannot optimize the route of a {} task",
                task.status()
            )));
        }
        let warehouse = Self::warehouse(task)?;
        let route = self.compute(&warehouse, &task.items).await?;

        for line in task.items.iter_mut() {
            line.pick_sequence = None;
            line.error_message = None;
        }
        for stop in &route.sequence {
            if let Some(line) = task.items.iter_mut().find(|l| l.id == stop.line_id) {
                line.pick_sequence = Some(stop.pick_sequence);
                line.source_bin = Some(stop.bin.clone());
            }
        }
        for miss in &route.unresolved {
            if let Some(line) = task.items.iter_mut().find(|l| l.id == miss.line_id) {
                line.error_message = Some(miss.error_message.clone());
            }
        }
        task.items
            .sort_by_key(|l| (l.pick_sequence.is_none(), l.pick_sequence));

        if route.unresolved.is_empty() {
            info!(stops = route.sequence.len(), "Pick route applied");
        } else {
            metrics::record_unresolved_lines(route.unresolved.len());
            warn!(
                stops = route.sequence.len(),
                unresolved = route.unresolved.len(),
                "Pick route applied with unresolved lines"
            );
        }
        Ok(route)
    }

    /// Computed route with bin coordinates, leaving the task untouched.
    pub async fn preview_route(&self, task: &Task) -> Result<RouteComputation, ServiceError> {
        Self::ensure_routable(task)?;
        let warehouse = Self::warehouse(task)?;
        self.compute(&warehouse, &task.items).await
    }

    fn ensure_routable(task: &Task) -> Result<(), ServiceError> {
        if task.task_type != TaskType::Pick {
            return Err(ServiceError::ValidationError(format!(
                "Route optimization only applies to Pick tasks, not {}",
                task.task_type
            )));
        }
        Ok(())
    }

    fn warehouse(task: &Task) -> Result<String, ServiceError> {
        non_empty(&task.source_warehouse)
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::ValidationError("Source Warehouse is required for routing".to_string())
            })
    }

    /// Outer error: collaborator failure. Inner error: line cannot be routed.
    async fn locate(
        &self,
        warehouse: &str,
        line: &TaskLine,
    ) -> Result<Result<Bin, String>, ServiceError> {
        if let Some(code) = non_empty(&line.source_bin) {
            return Ok(match self.bins.get(code).await? {
                None => Err(format!("Bin {} not found", code)),
                Some(bin) if bin.status() == BinStatus::Blocked => {
                    Err(format!("Bin {} is blocked", code))
                }
                Some(bin) => Ok(bin),
            });
        }

        match timeout(
            self.availability_timeout,
            self.availability
                .resolve_bin(&line.item_code, warehouse, line.qty),
        )
        .await
        {
            Ok(Ok(bin)) => Ok(Ok(bin)),
            Ok(Err(ServiceError::ResolutionError(message))) => Ok(Err(message)),
            Ok(Err(err)) => Err(err),
            Err(_) => Ok(Err(format!(
                "Bin resolution for {} timed out after {}ms",
                line.item_code,
                self.availability_timeout.as_millis()
            ))),
        }
    }
}
