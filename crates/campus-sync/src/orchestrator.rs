//! Run orchestration.
//!
//! One run owns one portal session for its whole duration. Partitions are
//! processed strictly in source order, each through
//! `Fetching → Extracting → Resolving → Writing → Done`; a failure in any
//! stage marks that partition `Failed` and the run moves on. Only
//! configuration and connectivity errors end the run early. The portal is
//! closed on every exit path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::fetch::PartitionFetcher;
use crate::jobs::PartitionJob;
use crate::portal::Portal;
use crate::progress::{self, PartitionState, ProgressEventKind, ProgressSender};
use crate::store::Store;
use crate::types::{Partition, SyncError, SyncResult};

/// Everything a run needs besides its portal.
#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<dyn Store>,
    pub config: RunConfig,
}

impl RunContext {
    pub fn new(store: Arc<dyn Store>, config: RunConfig) -> Self {
        Self { store, config }
    }
}

/// A partition that ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionFailure {
    pub partition: String,
    pub stage: PartitionState,
    pub reason: String,
}

/// Summary of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub job: String,
    pub partitions_total: usize,
    pub partitions_done: usize,
    pub partitions_failed: usize,
    pub partitions_skipped: usize,
    pub records_extracted: usize,
    pub records_written: usize,
    pub records_dropped: usize,
    /// Partitions that failed while writing.
    pub write_errors: usize,
    pub failures: Vec<PartitionFailure>,
    pub elapsed_ms: u64,
}

impl RunStats {
    fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            ..Self::default()
        }
    }
}

pub struct Orchestrator<'a> {
    ctx: &'a RunContext,
    fetcher: PartitionFetcher,
    delay: Duration,
    progress: Option<ProgressSender>,
    seq: u64,
}

impl<'a> Orchestrator<'a> {
    /// Orchestrator pausing `delay` between partitions.
    pub fn new(ctx: &'a RunContext, delay: Duration) -> Self {
        Self {
            ctx,
            fetcher: PartitionFetcher::new(ctx.config.retry.clone()),
            delay,
            progress: None,
            seq: 0,
        }
    }

    /// Broadcast progress events to `tx`.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Run `job` over every partition `portal` lists.
    pub async fn run<P, J>(&mut self, mut portal: P, job: &mut J) -> SyncResult<RunStats>
    where
        P: Portal,
        J: PartitionJob,
    {
        let result = self.run_session(&mut portal, job).await;
        portal.close().await;
        result
    }

    async fn run_session<P, J>(&mut self, portal: &mut P, job: &mut J) -> SyncResult<RunStats>
    where
        P: Portal,
        J: PartitionJob,
    {
        let started = Instant::now();
        let mut stats = RunStats::new(job.name());

        let partitions = portal.open().await?;
        stats.partitions_total = partitions.len();
        info!(job = job.name(), portal = portal.name(), partitions = partitions.len(), "session open");
        self.emit(
            job.name(),
            ProgressEventKind::SessionOpened {
                partitions: partitions.len() as u32,
            },
        );

        if partitions.is_empty() {
            warn!(job = job.name(), "no partitions listed, nothing to sync");
        }
        for partition in partitions.iter().filter(|p| job.accepts(p)) {
            self.transition(job.name(), partition, PartitionState::Pending);
        }

        let ctx = self.ctx;
        if let Err(e) = job.prepare(ctx.store.as_ref(), &partitions).await {
            if e.is_fatal() {
                return Err(e);
            }
            warn!(job = job.name(), "prepare step failed: {e}");
            self.emit(
                job.name(),
                ProgressEventKind::Warning {
                    message: e.to_string(),
                },
            );
        }

        let mut processed = 0usize;
        for partition in &partitions {
            if !job.accepts(partition) {
                debug!(partition = %partition, "skipped");
                stats.partitions_skipped += 1;
                self.transition(job.name(), partition, PartitionState::Skipped);
                continue;
            }

            if processed > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            processed += 1;

            match self.process(portal, job, partition, &mut stats).await {
                Ok(written) => {
                    stats.partitions_done += 1;
                    info!(partition = %partition, written, "partition synced");
                    self.transition(job.name(), partition, PartitionState::Done);
                }
                Err((_, e)) if e.is_fatal() => return Err(e),
                Err((stage, e)) => {
                    stats.partitions_failed += 1;
                    if stage == PartitionState::Writing {
                        stats.write_errors += 1;
                    }
                    error!(partition = %partition, %stage, "partition failed: {e}");
                    self.emit(
                        job.name(),
                        ProgressEventKind::PartitionFailed {
                            partition: partition.label.clone(),
                            stage,
                            reason: e.to_string(),
                        },
                    );
                    self.transition(job.name(), partition, PartitionState::Failed);
                    stats.failures.push(PartitionFailure {
                        partition: partition.label.clone(),
                        stage,
                        reason: e.to_string(),
                    });
                }
            }
        }

        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        self.emit(
            job.name(),
            ProgressEventKind::RunComplete {
                done: stats.partitions_done as u32,
                failed: stats.partitions_failed as u32,
                skipped: stats.partitions_skipped as u32,
                elapsed_ms: stats.elapsed_ms,
            },
        );
        info!(
            job = job.name(),
            done = stats.partitions_done,
            failed = stats.partitions_failed,
            skipped = stats.partitions_skipped,
            written = stats.records_written,
            dropped = stats.records_dropped,
            elapsed_ms = stats.elapsed_ms,
            "run complete"
        );
        Ok(stats)
    }

    /// Drive one partition through its stages.
    async fn process<P, J>(
        &mut self,
        portal: &mut P,
        job: &mut J,
        partition: &Partition,
        stats: &mut RunStats,
    ) -> Result<usize, (PartitionState, SyncError)>
    where
        P: Portal,
        J: PartitionJob,
    {
        let ctx = self.ctx;
        let store = ctx.store.as_ref();

        self.transition(job.name(), partition, PartitionState::Fetching);
        let markup = self
            .fetcher
            .fetch(portal, partition)
            .await
            .map_err(|e| (PartitionState::Fetching, e))?;

        self.transition(job.name(), partition, PartitionState::Extracting);
        let records = job
            .extract(partition, &markup)
            .map_err(|e| (PartitionState::Extracting, e))?;
        drop(markup);
        stats.records_extracted += records.len();

        self.transition(job.name(), partition, PartitionState::Resolving);
        let resolved = job
            .resolve(store, partition, records)
            .await
            .map_err(|e| (PartitionState::Resolving, e))?;
        stats.records_dropped += resolved.dropped;

        self.transition(job.name(), partition, PartitionState::Writing);
        let written = job
            .write(store, partition, resolved)
            .await
            .map_err(|e| (PartitionState::Writing, e))?;
        stats.records_written += written;

        Ok(written)
    }

    fn transition(&mut self, job: &str, partition: &Partition, state: PartitionState) {
        debug!(partition = %partition, %state, "state");
        self.emit(
            job,
            ProgressEventKind::StateChanged {
                partition: partition.label.clone(),
                state,
            },
        );
    }

    fn emit(&mut self, job: &str, event: ProgressEventKind) {
        progress::emit(&self.progress, job, &mut self.seq, event);
    }
}
