//! Bounded fan-out of item pipelines and fan-in of their outcomes.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::catalog::ItemId;
use crate::error::{Result, NagareError};
use crate::outcome::{BatchResult, ItemOutcome};
use crate::pipeline::{ItemPipeline, PipelineContext};

/// Fixed-capacity gate limiting how many pipelines fetch, stage or assemble
/// at the same time. A slot is returned when its permit is dropped.
///
/// Metadata lookups have their own pool of the same size, so a long
/// collection never runs more catalog lookups at once than downloads.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    slots: Arc<Semaphore>,
    lookups: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            lookups: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Lookup permits currently free
    pub fn lookups_available(&self) -> usize {
        self.lookups.available_permits()
    }

    /// Wait for a download slot, giving up when `cancel` fires
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<OwnedSemaphorePermit> {
        acquire_from(&self.slots, cancel, "a download slot").await
    }

    /// Wait for a metadata lookup permit, giving up when `cancel` fires
    pub async fn acquire_lookup(&self, cancel: &CancellationToken) -> Result<OwnedSemaphorePermit> {
        acquire_from(&self.lookups, cancel, "a lookup slot").await
    }
}

async fn acquire_from(
    semaphore: &Arc<Semaphore>,
    cancel: &CancellationToken,
    what: &str,
) -> Result<OwnedSemaphorePermit> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            Err(NagareError::Cancelled(format!("cancelled while waiting for {}", what)))
        }
        permit = Arc::clone(semaphore).acquire_owned() => permit.map_err(|_| {
            NagareError::Cancelled("admission gate closed".to_string())
        }),
    }
}

pub struct Scheduler {
    ctx: Arc<PipelineContext>,
    gate: AdmissionGate,
}

impl Scheduler {
    pub fn new(ctx: PipelineContext, max_concurrent: usize) -> Self {
        Self {
            ctx: Arc::new(ctx),
            gate: AdmissionGate::new(max_concurrent.max(1)),
        }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    /// Run one pipeline per item and collect exactly one outcome for each.
    ///
    /// Failures never cancel siblings; the batch always runs to completion.
    /// Outcomes are in completion order.
    pub async fn run(&self, items: Vec<ItemId>) -> BatchResult {
        info!(
            "Dispatching {} items with up to {} in flight",
            items.len(),
            self.gate.capacity()
        );

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<ItemOutcome>();
        let mut tasks = JoinSet::new();

        for item in items.iter().cloned() {
            let ctx = Arc::clone(&self.ctx);
            let gate = self.gate.clone();
            let outcome_tx = outcome_tx.clone();
            tasks.spawn(async move {
                let outcome = ItemPipeline::new(item, ctx).run(&gate).await;
                // The receiver lives until every task has been joined.
                let _ = outcome_tx.send(outcome);
            });
        }
        drop(outcome_tx);

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Pipeline task ended abnormally: {}", e);
            }
        }

        let mut outcomes = Vec::with_capacity(items.len());
        while let Some(outcome) = outcome_rx.recv().await {
            outcomes.push(outcome);
        }

        let missing = missing_outcomes(&items, &outcomes);
        outcomes.extend(missing);
        let result = BatchResult::new(outcomes);
        info!("{}", result.summary());
        result
    }
}

/// Failure outcomes for items whose task died without reporting
fn missing_outcomes(items: &[ItemId], outcomes: &[ItemOutcome]) -> Vec<ItemOutcome> {
    let mut reported: HashMap<&ItemId, usize> = HashMap::new();
    for outcome in outcomes {
        *reported.entry(outcome.item()).or_default() += 1;
    }

    items
        .iter()
        .filter(|item| match reported.get_mut(item) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        })
        .map(|item| ItemOutcome::Failure {
            item: item.clone(),
            error: NagareError::Cancelled("pipeline task aborted before reporting".to_string()),
        })
        .collect()
}
