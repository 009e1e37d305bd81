//! Orchestration of one run across all workers.
//!
//! Each worker is an OS thread with a fixed rank in `0..workers` and walks
//! through the same phases:
//!
//! ```text
//! Init -> Load (rank 0 only) -> Broadcast -> Count -> Emit -> Done
//! ```
//!
//! Rank 0 is the only worker that reads the input. It broadcasts the
//! sequence set to every other rank, then all workers count their own
//! partition and emit their own output file. Workers meet at a checkpoint
//! after replication, after counting and after emission. If any worker fails
//! before a checkpoint, every worker stops there and no output file is kept:
//! a run either produces all of its files or none of them.

use std::{
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Barrier,
    },
    thread,
    time::Instant,
};

use serde::Serialize;
use tracing::{debug, info, info_span, warn, Span};

use crate::{
    config::Config,
    counter::{count_shard, HistogramShard},
    emit::{shard_path, OutputFormat, ShardWriter},
    error::KmerShardError,
    kmer::{window_count, KmerLength, SymbolPolicy},
    partition::{plan_all, unassigned, Partition, PartitionPolicy},
    reader::read,
    store::{broadcast, channels, Inbox, Peer, SequenceSet},
    summary::{shard_histogram, RunSummary, WorkerReport},
};

/// Shape of a run: k, worker count and policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub k: KmerLength,
    pub workers: usize,
    pub partition: PartitionPolicy,
    pub symbols: SymbolPolicy,
}

impl Plan {
    /// A plan with default policies.
    pub fn new(k: usize, workers: usize) -> Result<Self, KmerShardError> {
        if workers == 0 {
            return Err(KmerShardError::InvalidWorkerCount { workers });
        }
        Ok(Self {
            k: KmerLength::new(k)?,
            workers,
            partition: PartitionPolicy::default(),
            symbols: SymbolPolicy::default(),
        })
    }

    #[must_use]
    pub const fn with_partition(mut self, partition: PartitionPolicy) -> Self {
        self.partition = partition;
        self
    }

    #[must_use]
    pub const fn with_symbols(mut self, symbols: SymbolPolicy) -> Self {
        self.symbols = symbols;
        self
    }

    /// Every worker's partition, in rank order.
    pub fn partitions(&self) -> Vec<Partition> {
        plan_all(self.k.index_space(), self.workers, self.partition)
    }
}

/// Lifecycle phase of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Init,
    Load,
    Broadcast,
    Count,
    Emit,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Load => "load",
            Self::Broadcast => "broadcast",
            Self::Count => "count",
            Self::Emit => "emit",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tracks a worker's current phase and how long each one took.
struct PhaseClock {
    rank: usize,
    phase: Phase,
    since: Instant,
    started: Instant,
}

impl PhaseClock {
    fn start(rank: usize) -> Self {
        let now = Instant::now();
        Self {
            rank,
            phase: Phase::Init,
            since: now,
            started: now,
        }
    }

    fn advance(&mut self, next: Phase) {
        debug!(
            rank = self.rank,
            phase = %self.phase,
            next = %next,
            elapsed = ?self.since.elapsed(),
            "Phase finished"
        );
        self.phase = next;
        self.since = Instant::now();
        if next == Phase::Done {
            debug!(rank = self.rank, elapsed = ?self.started.elapsed(), "Worker finished");
        }
    }
}

/// Why a worker stopped early.
#[derive(Debug)]
enum Halt {
    /// This worker failed.
    Failed(KmerShardError),
    /// Another worker failed before the same checkpoint.
    Aborted,
}

impl From<KmerShardError> for Halt {
    fn from(err: KmerShardError) -> Self {
        Self::Failed(err)
    }
}

/// A point every worker reaches before any of them moves on.
struct Checkpoint {
    barrier: Barrier,
    failed: AtomicBool,
}

impl Checkpoint {
    fn new(workers: usize) -> Self {
        Self {
            barrier: Barrier::new(workers),
            failed: AtomicBool::new(false),
        }
    }

    /// Waits for every worker and passes `result` on only if none failed.
    fn pass<T>(&self, result: Result<T, KmerShardError>) -> Result<T, Halt> {
        if result.is_err() {
            self.failed.store(true, Ordering::SeqCst);
        }
        self.barrier.wait();
        let value = result?;
        if self.failed.load(Ordering::SeqCst) {
            return Err(Halt::Aborted);
        }
        Ok(value)
    }
}

/// Where a worker gets its copy of the sequence set.
enum Source<L> {
    Root { load: L, peers: Vec<Peer> },
    Replica(Inbox),
}

/// What happens to each shard once counted.
enum Sink<'a> {
    /// Shards are handed back to the caller.
    Memory,
    /// Each shard goes to `<prefix>-<rank>.out`.
    Files {
        prefix: &'a Path,
        format: OutputFormat,
        min_count: u64,
    },
}

struct Context<'a> {
    plan: Plan,
    partitions: Vec<Partition>,
    sink: Sink<'a>,
    replicated: Checkpoint,
    counted: Checkpoint,
    emitted: Checkpoint,
    span: Span,
}

struct Finished {
    report: WorkerReport,
    shard: Option<HistogramShard>,
}

/// Runs `stage`, turning a panic into [`KmerShardError::WorkerPanicked`] so
/// that the worker still reaches its next checkpoint.
fn guarded<T>(
    rank: usize,
    stage: impl FnOnce() -> Result<T, KmerShardError>,
) -> Result<T, KmerShardError> {
    panic::catch_unwind(AssertUnwindSafe(stage))
        .unwrap_or(Err(KmerShardError::WorkerPanicked { rank }))
}

fn run_worker<L>(ctx: &Context<'_>, rank: usize, source: Source<L>) -> Result<Finished, Halt>
where
    L: FnOnce() -> Result<SequenceSet, KmerShardError>,
{
    let _span = info_span!(parent: &ctx.span, "worker", rank).entered();
    let plan = ctx.plan;
    let partition = ctx.partitions[rank];
    let mut clock = PhaseClock::start(rank);

    let set = guarded(rank, || match source {
        Source::Root { load, peers } => {
            clock.advance(Phase::Load);
            let set = load()?;
            clock.advance(Phase::Broadcast);
            broadcast(&set, &peers)?;
            Ok(set)
        }
        Source::Replica(inbox) => {
            clock.advance(Phase::Broadcast);
            inbox.receive()
        }
    });
    let set = ctx.replicated.pass(set)?;

    let counted = guarded(rank, || {
        clock.advance(Phase::Count);
        let shard = count_shard(&set, plan.k, partition, plan.symbols, rank == 0)?;
        let writer = match ctx.sink {
            Sink::Memory => None,
            Sink::Files { prefix, .. } => Some(ShardWriter::create(shard_path(prefix, rank))?),
        };
        Ok((shard, writer))
    });
    let (shard, mut writer) = ctx.counted.pass(counted)?;

    let emitted = guarded(rank, || {
        clock.advance(Phase::Emit);
        match (&mut writer, &ctx.sink) {
            (
                Some(writer),
                Sink::Files {
                    format, min_count, ..
                },
            ) => writer.write(&shard, *format, *min_count),
            _ => Ok(0),
        }
    });
    let records_written = ctx.emitted.pass(emitted)?;
    let output = writer.map(ShardWriter::persist);
    clock.advance(Phase::Done);

    let report = WorkerReport {
        rank,
        partition,
        records: set.len(),
        windows: set
            .iter()
            .map(|record| window_count(record.len(), plan.k) as u64)
            .sum(),
        distinct: shard.distinct(),
        total: shard.total(),
        other: shard.other(),
        output,
        records_written,
        spectrum: shard_histogram(&shard),
    };
    let shard = matches!(ctx.sink, Sink::Memory).then_some(shard);
    Ok(Finished { report, shard })
}

/// Runs every worker to completion and returns their results in rank order.
///
/// On failure the error of the lowest failing rank is returned.
fn execute<L>(plan: Plan, load: L, sink: Sink<'_>) -> Result<Vec<Finished>, KmerShardError>
where
    L: FnOnce() -> Result<SequenceSet, KmerShardError> + Send,
{
    if plan.workers == 0 {
        return Err(KmerShardError::InvalidWorkerCount {
            workers: plan.workers,
        });
    }
    let span = info_span!("run", k = plan.k.get(), workers = plan.workers);
    let _entered = span.enter();

    let partitions = plan.partitions();
    let lost = unassigned(plan.k.index_space(), &partitions);
    if lost > 0 {
        warn!(
            unassigned = lost,
            policy = %plan.partition,
            "Partition plan leaves indices unassigned; their k-mers will not be counted"
        );
    }

    let (peers, inboxes) = channels(plan.workers);
    let mut sources = Vec::with_capacity(plan.workers);
    sources.push(Source::Root { load, peers });
    sources.extend(inboxes.into_iter().map(Source::Replica));

    let ctx = Context {
        plan,
        partitions,
        sink,
        replicated: Checkpoint::new(plan.workers),
        counted: Checkpoint::new(plan.workers),
        emitted: Checkpoint::new(plan.workers),
        span: span.clone(),
    };

    let outcomes: Vec<Result<Finished, Halt>> = thread::scope(|scope| {
        let handles: Vec<_> = sources
            .into_iter()
            .enumerate()
            .map(|(rank, source)| {
                let ctx = &ctx;
                (rank, scope.spawn(move || run_worker(ctx, rank, source)))
            })
            .collect();
        handles
            .into_iter()
            .map(|(rank, handle)| {
                handle
                    .join()
                    .unwrap_or(Err(Halt::Failed(KmerShardError::WorkerPanicked { rank })))
            })
            .collect()
    });

    let mut finished = Vec::with_capacity(outcomes.len());
    let mut aborted = false;
    for outcome in outcomes {
        match outcome {
            Ok(done) => finished.push(done),
            Err(Halt::Failed(err)) => return Err(err),
            Err(Halt::Aborted) => aborted = true,
        }
    }
    if aborted {
        // A checkpoint only aborts when some worker failed.
        return Err(KmerShardError::Replication {
            rank: 0,
            details: "run aborted without a reported failure".to_string(),
        });
    }
    Ok(finished)
}

/// Counts `set` in memory and returns every worker's shard in rank order.
///
/// Nothing is written to disk. The shards are disjoint and together cover
/// the whole histogram (except indices left unassigned by a naive plan).
///
/// # Errors
///
/// Returns the first worker error, as for a file-backed run.
pub fn count_sequences(
    set: &SequenceSet,
    plan: Plan,
) -> Result<Vec<HistogramShard>, KmerShardError> {
    let finished = execute(plan, || Ok(set.clone()), Sink::Memory)?;
    Ok(finished.into_iter().filter_map(|done| done.shard).collect())
}

/// Drives a complete file-to-files run.
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: Config,
}

impl Coordinator {
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Reads the input, counts it across all workers and writes one output
    /// file per worker.
    ///
    /// # Errors
    ///
    /// Returns the first failure of any worker. No output file is left behind
    /// when a run fails.
    pub fn run(&self) -> Result<RunSummary, KmerShardError> {
        let started = Instant::now();
        let plan = self.config.plan();
        let input = self.config.input.as_path();
        let concatenate = self.config.concatenate;
        let sink = Sink::Files {
            prefix: &self.config.output_prefix,
            format: self.config.format,
            min_count: self.config.min_count,
        };

        let load = || -> Result<SequenceSet, KmerShardError> {
            let set = read(input)?;
            Ok(if concatenate { set.concatenated() } else { set })
        };
        let finished = execute(plan, load, sink)?;
        let reports: Vec<WorkerReport> = finished.into_iter().map(|done| done.report).collect();
        let lost = unassigned(plan.k.index_space(), &plan.partitions());
        let summary = RunSummary::new(plan.k, plan.partition, plan.symbols, lost, reports);

        info!(
            k = plan.k.get(),
            workers = plan.workers,
            windows = summary.windows,
            counted = summary.counted,
            distinct = summary.stats.distinct_kmers,
            elapsed = ?started.elapsed(),
            "Run finished"
        );
        Ok(summary)
    }
}
