//! Harvest orchestrator
//!
//! Owns the run lifecycle: opens a run, drives enumeration, fans enrichment
//! out to a bounded pool of tasks, routes unpublishable records to a single
//! deletion task, and closes the run once every task has completed.

use super::context::HarvestContext;
use super::error::HarvestError;
use super::outcome::{HarvestReport, ItemOutcome, Tally};
use crate::deletion::{dedupe, DeletionOutcome, DeletionPropagator, PropagationError, RunContext};
use crate::downstream::DownstreamConsumer;
use crate::merge::Merger;
use crate::model::{ChangeStatus, ChangedRecord, RecordKind, Run, RunId, Source};
use crate::resolver::Resolver;
use crate::upstream::{ChangeEnumerator, UpstreamClient};
use futures::{StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

type DeletionTask = JoinHandle<Result<DeletionOutcome, PropagationError>>;

/// Runs harvests against the clients of one `HarvestContext`
pub struct HarvestOrchestrator {
    context: HarvestContext,
    merger: Merger,
}

impl HarvestOrchestrator {
    pub fn new(context: HarvestContext) -> Self {
        let resolver = Resolver::new(context.secondary.clone(), context.settings.max_ancestor_depth);
        Self {
            merger: Merger::new(resolver),
            context,
        }
    }

    pub fn context(&self) -> &HarvestContext {
        &self.context
    }

    /// Harvest changes since the last finished run for the triple
    ///
    /// Returns the number of records enriched-and-delivered or deleted.
    pub async fn run_harvest(
        &self,
        source: Source,
        kind: RecordKind,
        change_status: ChangeStatus,
    ) -> Result<usize, HarvestError> {
        self.harvest(source, kind, change_status)
            .await
            .map(|report| report.processed())
    }

    /// Like `run_harvest`, returning the closed run alongside the counts
    pub async fn harvest(
        &self,
        source: Source,
        kind: RecordKind,
        change_status: ChangeStatus,
    ) -> Result<HarvestReport, HarvestError> {
        if !source.supports(kind) {
            return Err(HarvestError::UnsupportedKind { system: source, kind });
        }
        let upstream = self.context.upstream(source)?;
        let ledger = &self.context.ledger;

        let watermark = ledger.last_finished_run_timestamp(source, kind, change_status)?;
        let run = ledger.create_run(source, kind, change_status)?;
        tracing::info!(
            run_id = %run.id,
            source = %source,
            kind = %kind,
            change_status = %change_status,
            watermark,
            "harvest started"
        );

        let result = match self.context.secondary.health().await {
            Err(e) => Err(HarvestError::Secondary(e)),
            Ok(()) => match change_status {
                ChangeStatus::Updated => self.harvest_updates(&run, upstream, kind, watermark).await,
                ChangeStatus::Deleted => self.harvest_deletions(&run, upstream, kind, watermark).await,
            },
        };

        match result {
            Err(e) => {
                tracing::error!(run_id = %run.id, error = %e, "harvest failed");
                ledger.error_run(&run.id, &e.to_string())?;
                Err(e)
            }
            Ok(tally) => {
                let run = ledger.finish_run(&run.id)?;
                tracing::info!(
                    run_id = %run.id,
                    processed = tally.processed(),
                    failed = tally.failed,
                    errors = run.error_count,
                    "harvest finished"
                );
                if run.error_count > 0 {
                    self.notify(&run).await;
                }
                Ok(HarvestReport { run, tally })
            }
        }
    }

    /// Best-effort error notification for a finished run
    async fn notify(&self, run: &Run) {
        let errors = match self.context.ledger.errors(&run.id) {
            Ok(errors) => errors,
            Err(e) => {
                tracing::warn!(run_id = %run.id, error = %e, "could not load run errors for notification");
                return;
            }
        };
        if let Err(e) = self.context.notifier.run_errors(run, &errors).await {
            tracing::warn!(run_id = %run.id, error = %e, "error notification failed");
        }
    }

    async fn harvest_updates(
        &self,
        run: &Run,
        upstream: Arc<dyn UpstreamClient>,
        kind: RecordKind,
        since: i64,
    ) -> Result<Tally, HarvestError> {
        let (deletions, deletion_task) = self.spawn_deletion_task(&run.id);
        let mut workers: JoinSet<ItemOutcome> = JoinSet::new();
        let mut tally = Tally::default();

        let dispatched = self
            .dispatch_updates(&run.id, upstream, kind, since, &deletions, &mut workers, &mut tally)
            .await;

        // Every dispatched task completes, even when enumeration failed part way
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => self.record_outcome(&run.id, outcome, &deletions, &mut tally)?,
                Err(e) => {
                    tally.failed += 1;
                    tracing::error!(run_id = %run.id, error = %e, "enrichment task did not complete");
                    self.context
                        .ledger
                        .append_error(&run.id, &format!("enrichment task did not complete: {}", e))?;
                }
            }
        }

        drop(deletions);
        tally.deleted = self.join_deletion_task(&run.id, deletion_task).await?;

        dispatched?;
        Ok(tally)
    }

    /// Enumerate, bulk-fetch and spawn one enrichment task per record
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_updates(
        &self,
        run_id: &RunId,
        upstream: Arc<dyn UpstreamClient>,
        kind: RecordKind,
        since: i64,
        deletions: &mpsc::UnboundedSender<String>,
        workers: &mut JoinSet<ItemOutcome>,
        tally: &mut Tally,
    ) -> Result<(), HarvestError> {
        let settings = &self.context.settings;
        // A zero limit would park every task forever
        let limiter = Arc::new(Semaphore::new(settings.concurrency.max(1)));
        let batch_size = settings.fetch_batch_size.max(1);
        let mut candidates = ChangeEnumerator::new(upstream.clone()).changes(kind, since);
        let mut batch: Vec<String> = Vec::with_capacity(batch_size);

        while let Some(candidate) = candidates.next().await {
            let stub = candidate.map_err(HarvestError::Enumeration)?;
            if !stub.publish {
                // Receiver only goes away if the deletion task died; the join reports that
                let _ = deletions.send(stub.uri);
                continue;
            }
            batch.push(stub.uri);
            if batch.len() >= batch_size {
                let ids = std::mem::take(&mut batch);
                self.dispatch_batch(run_id, &upstream, kind, ids, &limiter, workers, deletions, tally)
                    .await?;
            }
        }

        if !batch.is_empty() {
            self.dispatch_batch(run_id, &upstream, kind, batch, &limiter, workers, deletions, tally)
                .await?;
        }
        Ok(())
    }

    /// Fetch one batch and spawn its enrichment tasks
    ///
    /// Fetch failures are per item: every requested identifier ends up either
    /// in a task or recorded as exactly one failure.
    #[allow(clippy::too_many_arguments)]
    async fn dispatch_batch(
        &self,
        run_id: &RunId,
        upstream: &Arc<dyn UpstreamClient>,
        kind: RecordKind,
        ids: Vec<String>,
        limiter: &Arc<Semaphore>,
        workers: &mut JoinSet<ItemOutcome>,
        deletions: &mpsc::UnboundedSender<String>,
        tally: &mut Tally,
    ) -> Result<(), HarvestError> {
        let fetched = match upstream.fetch_batch(kind, &ids, kind.resolve_directive()).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(run_id = %run_id, requested = ids.len(), error = %e, "bulk fetch failed");
                let reason = format!("fetch failed: {}", e);
                for id in ids {
                    let failed = ItemOutcome::Failed {
                        id,
                        reason: reason.clone(),
                    };
                    self.record_outcome(run_id, failed, deletions, tally)?;
                }
                return Ok(());
            }
        };
        tracing::debug!(
            run_id = %run_id,
            requested = ids.len(),
            fetched = fetched.records.len(),
            failed = fetched.failed.len(),
            "batch fetched"
        );

        let mut answered = HashSet::new();
        let mut ready = Vec::with_capacity(fetched.records.len());
        let mut anonymous = Vec::new();
        for payload in fetched.records {
            let record = ChangedRecord::from_payload(payload);
            match record.identifier().map(str::to_string) {
                Some(id) => {
                    answered.insert(id.clone());
                    ready.push((id, record));
                }
                None => anonymous.push(record),
            }
        }

        for (id, e) in fetched.failed {
            answered.insert(id.clone());
            let failed = ItemOutcome::Failed {
                id,
                reason: format!("fetch failed: {}", e),
            };
            self.record_outcome(run_id, failed, deletions, tally)?;
        }

        // Payloads without an identifier answer for requested ids nothing else claimed
        let mut unanswered = ids.into_iter().filter(|id| !answered.contains(id));
        for record in anonymous {
            let id = unanswered.next().unwrap_or_else(|| "<unknown>".to_string());
            ready.push((id, record));
        }
        for id in unanswered {
            let missing = ItemOutcome::Failed {
                id,
                reason: "not returned by upstream".to_string(),
            };
            self.record_outcome(run_id, missing, deletions, tally)?;
        }

        for (id, record) in ready {
            let permit = limiter
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| HarvestError::Setup(format!("worker pool closed: {}", e)))?;
            let merger = self.merger.clone();
            let downstream = self.context.downstream.clone();
            workers.spawn(async move {
                let outcome = enrich_one(&merger, downstream.as_ref(), kind, id, record).await;
                drop(permit);
                outcome
            });
        }
        Ok(())
    }

    fn record_outcome(
        &self,
        run_id: &RunId,
        outcome: ItemOutcome,
        deletions: &mpsc::UnboundedSender<String>,
        tally: &mut Tally,
    ) -> Result<(), HarvestError> {
        match outcome {
            ItemOutcome::Enriched(_) => tally.enriched += 1,
            ItemOutcome::ToDelete(id) => {
                tally.routed_to_delete += 1;
                let _ = deletions.send(id);
            }
            failed @ ItemOutcome::Failed { .. } => {
                tally.failed += 1;
                self.record_failure(run_id, &failed)?;
            }
        }
        Ok(())
    }

    fn record_failure(&self, run_id: &RunId, outcome: &ItemOutcome) -> Result<(), HarvestError> {
        if let Some(message) = outcome.error_message() {
            tracing::warn!(run_id = %run_id, identifier = outcome.identifier(), "{}", message);
            self.context.ledger.append_error(run_id, &message)?;
        }
        Ok(())
    }

    async fn harvest_deletions(
        &self,
        run: &Run,
        upstream: Arc<dyn UpstreamClient>,
        kind: RecordKind,
        since: i64,
    ) -> Result<Tally, HarvestError> {
        let identifiers: Vec<String> = ChangeEnumerator::new(upstream)
            .deletions(kind, since)
            .try_collect()
            .await
            .map_err(HarvestError::Enumeration)?;

        let (deletions, deletion_task) = self.spawn_deletion_task(&run.id);
        for id in dedupe(identifiers) {
            let _ = deletions.send(id);
        }
        drop(deletions);

        Ok(Tally {
            deleted: self.join_deletion_task(&run.id, deletion_task).await?,
            ..Tally::default()
        })
    }

    /// Spawn the run's single deletion task
    ///
    /// It collects identifiers until every sender is dropped, then submits
    /// them as one batch. It does not hold a slot of the enrichment pool.
    fn spawn_deletion_task(&self, run_id: &RunId) -> (mpsc::UnboundedSender<String>, DeletionTask) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
        let propagator = DeletionPropagator::new(self.context.downstream.clone());
        let run = RunContext::new(self.context.ledger.clone(), run_id.clone());

        let task = tokio::spawn(async move {
            let mut identifiers = Vec::new();
            while let Some(id) = receiver.recv().await {
                identifiers.push(id);
            }
            propagator.propagate(identifiers, Some(&run)).await
        });
        (sender, task)
    }

    /// Wait for the deletion task; returns the number of accepted deletions
    async fn join_deletion_task(&self, run_id: &RunId, task: DeletionTask) -> Result<usize, HarvestError> {
        match task.await {
            Ok(outcome) => Ok(outcome?.accepted()),
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "deletion task did not complete");
                self.context
                    .ledger
                    .append_error(run_id, &format!("deletion task did not complete: {}", e))?;
                Ok(0)
            }
        }
    }
}

/// Merge one record and hand it downstream
///
/// `id` labels the outcome; it is the requested identifier.
async fn enrich_one(
    merger: &Merger,
    downstream: &dyn DownstreamConsumer,
    kind: RecordKind,
    id: String,
    record: ChangedRecord,
) -> ItemOutcome {
    if !record.publishable {
        return ItemOutcome::ToDelete(id);
    }

    let enriched = match merger.merge(kind, record.payload).await {
        Ok((enriched, _)) => enriched,
        Err(e) => {
            return ItemOutcome::Failed {
                id,
                reason: e.cause.to_string(),
            }
        }
    };

    match downstream.deliver(&enriched).await {
        Ok(()) => ItemOutcome::Enriched(id),
        Err(e) => ItemOutcome::Failed {
            id,
            reason: e.to_string(),
        },
    }
}
