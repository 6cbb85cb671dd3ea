//! Worker threads: off-thread subtree and level expansion.
//!
//! Each worker is a long-lived OS thread configured once with the crop
//! catalog (in wire form), the branching shortlist, and the run parameters.
//! It owns a private node cache that stays warm across jobs; nothing is
//! shared between workers, so duplicated work across the pool is accepted
//! as the price of lock-free parallelism.
//!
//! Calendars cross the job channel in their canonical wire form and are
//! rebuilt against the worker's own catalog copy.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use tracing::debug;

use planner_core::{
    from_wire, to_wire, Calendar, CropBook, EngineConfig, PlannerError, RunParams,
};

use crate::cache::NodeCache;
use crate::expand::{expand, ExpandContext};
use crate::memory::MemoryMonitor;
use crate::models::{FrontierNode, SimStats};

/// Pool size when the host cannot tell us how parallel it is.
const FALLBACK_WORKERS: usize = 4;

/// Workers to spawn: capped so the pool does not crowd out the host.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4))
        .unwrap_or(FALLBACK_WORKERS)
}

/// Everything a worker needs installed before it can take jobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Crop catalog, one crop per line in wire form.
    pub crops_wire: String,
    /// Names of the crops the search may branch over.
    pub shortlist: Vec<String>,
    pub engine: EngineConfig,
    pub params: RunParams,
}

#[derive(Debug)]
pub enum WorkerRequest {
    /// Drain the whole subtree under one frontier node; report the best leaf.
    Subtree {
        input_index: usize,
        day: i64,
        calendar_wire: String,
    },
    /// Expand a contiguous frontier chunk by exactly one level.
    Level {
        chunk_index: usize,
        /// (input offset, decision day, calendar wire)
        nodes: Vec<(usize, i64, String)>,
    },
    Shutdown,
}

/// Output of one level expansion for one input node, keyed by the node's
/// offset in the dispatched frontier so merges stay deterministic.
#[derive(Debug)]
pub struct LevelGroup {
    pub input_offset: usize,
    pub successors: Vec<(i64, String)>,
    pub leaves: Vec<(f64, String)>,
}

#[derive(Debug)]
pub enum WorkerOutput {
    Subtree {
        input_index: usize,
        best_wealth: f64,
        best_calendar_wire: Option<String>,
        stats: SimStats,
        /// Nodes left unexpanded because the abort flag went up.
        pending: usize,
    },
    Level {
        chunk_index: usize,
        groups: Vec<LevelGroup>,
        stats: SimStats,
    },
}

#[derive(Debug)]
pub struct WorkerReply {
    pub worker_id: usize,
    pub result: Result<WorkerOutput, PlannerError>,
}

struct WorkerState {
    id: usize,
    book: CropBook,
    ctx: ExpandContext,
    cache: NodeCache,
    abort: Arc<AtomicBool>,
    /// Shares the run's abort flag; a ceiling crossed in any worker stops
    /// every worker.
    monitor: MemoryMonitor,
}

impl WorkerState {
    fn handle(&mut self, req: WorkerRequest) -> Result<WorkerOutput, PlannerError> {
        match req {
            WorkerRequest::Subtree {
                input_index,
                day,
                calendar_wire,
            } => self.run_subtree(input_index, day, &calendar_wire),
            WorkerRequest::Level { chunk_index, nodes } => self.run_level(chunk_index, nodes),
            WorkerRequest::Shutdown => Err(PlannerError::Internal(
                "shutdown is handled by the job loop".to_string(),
            )),
        }
    }

    fn decode(&self, wire: &str) -> Result<Calendar, PlannerError> {
        from_wire(
            wire,
            &self.book,
            self.ctx.config.payday_delay,
            self.ctx.config.return_tiles_asap,
        )
    }

    fn run_subtree(
        &mut self,
        input_index: usize,
        day: i64,
        wire: &str,
    ) -> Result<WorkerOutput, PlannerError> {
        let root = self.decode(wire)?;
        let mut frontier = VecDeque::new();
        frontier.push_back(FrontierNode {
            day,
            calendar: root,
        });
        let mut best: Option<(f64, Calendar)> = None;
        let mut stats = SimStats::default();

        loop {
            if self.abort.load(Ordering::Relaxed) {
                stats.aborted = true;
                break;
            }
            let Some(node) = frontier.pop_front() else {
                break;
            };
            if self.cache.check_and_insert(&node.calendar, node.day) {
                stats.cache_hits += 1;
                continue;
            }
            stats.nodes_expanded += 1;
            self.monitor.record_ops(1);
            let exp = expand(&node, &self.ctx);
            for leaf in exp.leaves {
                stats.leaves_seen += 1;
                let wealth = leaf.wealth();
                if best.as_ref().map(|(w, _)| wealth > *w).unwrap_or(true) {
                    best = Some((wealth, leaf));
                }
            }
            frontier.extend(exp.successors);
        }

        let pending = frontier.len();
        Ok(WorkerOutput::Subtree {
            input_index,
            best_wealth: best.as_ref().map(|(w, _)| *w).unwrap_or(f64::NEG_INFINITY),
            best_calendar_wire: best.map(|(_, cal)| to_wire(&cal)),
            stats,
            pending,
        })
    }

    fn run_level(
        &mut self,
        chunk_index: usize,
        nodes: Vec<(usize, i64, String)>,
    ) -> Result<WorkerOutput, PlannerError> {
        let mut groups = Vec::with_capacity(nodes.len());
        let mut stats = SimStats::default();

        for (input_offset, day, wire) in nodes {
            if self.abort.load(Ordering::Relaxed) {
                stats.aborted = true;
                break;
            }
            let calendar = self.decode(&wire)?;
            let node = FrontierNode { day, calendar };
            if self.cache.check_and_insert(&node.calendar, node.day) {
                stats.cache_hits += 1;
                groups.push(LevelGroup {
                    input_offset,
                    successors: Vec::new(),
                    leaves: Vec::new(),
                });
                continue;
            }
            stats.nodes_expanded += 1;
            self.monitor.record_ops(1);
            let exp = expand(&node, &self.ctx);
            let successors = exp
                .successors
                .into_iter()
                .map(|n| (n.day, to_wire(&n.calendar)))
                .collect();
            let leaves = exp
                .leaves
                .into_iter()
                .map(|cal| {
                    stats.leaves_seen += 1;
                    (cal.wealth(), to_wire(&cal))
                })
                .collect();
            groups.push(LevelGroup {
                input_offset,
                successors,
                leaves,
            });
        }

        Ok(WorkerOutput::Level {
            chunk_index,
            groups,
            stats,
        })
    }
}

/// Handle to one spawned worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: usize,
    job_tx: mpsc::Sender<WorkerRequest>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub async fn send(&self, req: WorkerRequest) -> Result<(), PlannerError> {
        self.job_tx
            .send(req)
            .await
            .map_err(|_| PlannerError::WorkerFault(format!("worker {} is gone", self.id)))
    }

    /// Ask the thread to stop and wait for it.
    pub async fn shutdown(mut self) {
        let _ = self.job_tx.send(WorkerRequest::Shutdown).await;
        if let Some(thread) = self.thread.take() {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
        }
    }
}

/// Build a worker's private state from its configure payload and start its
/// thread. Replies and idle notifications go out on the shared channels.
pub fn spawn_worker(
    id: usize,
    config: &WorkerConfig,
    abort: Arc<AtomicBool>,
    reply_tx: mpsc::Sender<WorkerReply>,
    idle_tx: mpsc::Sender<usize>,
) -> Result<WorkerHandle, PlannerError> {
    let book = CropBook::from_wire(&config.crops_wire)?;
    let mut shortlist = Vec::with_capacity(config.shortlist.len());
    for name in &config.shortlist {
        let crop = book.get(name).ok_or_else(|| {
            PlannerError::InvalidInput(format!("shortlist crop {:?} not in catalog", name))
        })?;
        shortlist.push(Arc::clone(crop));
    }
    let ctx = ExpandContext::new(shortlist, config.engine.clone(), config.params);
    let cache = NodeCache::new(config.engine.use_cache, config.engine.cache_sig_digits);
    let monitor = MemoryMonitor::with_flag(config.engine.memory_threshold_gb, Arc::clone(&abort));
    let mut state = WorkerState {
        id,
        book,
        ctx,
        cache,
        abort,
        monitor,
    };

    let (job_tx, mut job_rx) = mpsc::channel::<WorkerRequest>(2);
    let thread = std::thread::Builder::new()
        .name(format!("schedule-worker-{}", id))
        .spawn(move || {
            while let Some(req) = job_rx.blocking_recv() {
                if matches!(req, WorkerRequest::Shutdown) {
                    break;
                }
                let result = state.handle(req);
                if reply_tx
                    .blocking_send(WorkerReply {
                        worker_id: state.id,
                        result,
                    })
                    .is_err()
                {
                    break;
                }
                if idle_tx.blocking_send(state.id).is_err() {
                    break;
                }
            }
            debug!(worker = state.id, cached = state.cache.len(), "worker stopped");
        })
        .map_err(|e| PlannerError::Internal(format!("failed to spawn worker thread: {}", e)))?;

    Ok(WorkerHandle {
        id,
        job_tx,
        thread: Some(thread),
    })
}
