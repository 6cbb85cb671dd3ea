//! Worker-pool dispatch.
//!
//! The dispatcher owns the pool and a bounded available-worker channel:
//! a subtree or frontier slice is only handed out once a worker signals it
//! is free, so the queue never runs ahead of the pool. Two shapes of
//! dispatch exist: Deep hands one whole subtree per free worker in
//! longest-processing-time-first order; Shallow cuts the frontier into one
//! contiguous chunk per worker and advances a single level at a time.
//!
//! Replies are merged in input order, never arrival order, so a run's
//! result does not depend on which worker finished first.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use planner_core::{from_wire, to_wire, Calendar, CropBook, EngineConfig, PlannerError, RunParams};

use crate::memory::MemoryMonitor;
use crate::models::{subtree_cost, FrontierNode, SimStats};
use crate::pacer::FramePacer;
use crate::worker::{
    default_worker_count, spawn_worker, LevelGroup, WorkerConfig, WorkerHandle, WorkerOutput,
    WorkerReply, WorkerRequest,
};

/// Best leaf found by a Deep dispatch round.
#[derive(Debug)]
pub struct DeepOutcome {
    pub best: Option<(f64, Calendar)>,
    pub stats: SimStats,
}

/// Result of one Shallow level: the next frontier and the best leaf the
/// level produced.
#[derive(Debug)]
pub struct LevelOutcome {
    pub next_frontier: Vec<FrontierNode>,
    pub best: Option<(f64, Calendar)>,
    pub stats: SimStats,
}

#[derive(Debug)]
pub struct Dispatcher {
    workers: Vec<WorkerHandle>,
    idle_rx: mpsc::Receiver<usize>,
    reply_rx: mpsc::Receiver<WorkerReply>,
    book: CropBook,
    config: EngineConfig,
}

impl Dispatcher {
    /// Spawn the pool and install the catalog and run parameters into every
    /// worker. The pool starts fully idle.
    pub fn configure(
        book: &CropBook,
        shortlist: &[String],
        config: &EngineConfig,
        params: RunParams,
        abort: Arc<AtomicBool>,
    ) -> Result<Dispatcher, PlannerError> {
        let count = config
            .worker_threads
            .unwrap_or_else(default_worker_count)
            .max(1);
        let worker_config = WorkerConfig {
            crops_wire: book.to_wire(),
            shortlist: shortlist.to_vec(),
            engine: config.clone(),
            params,
        };
        let (idle_tx, idle_rx) = mpsc::channel(count);
        let (reply_tx, reply_rx) = mpsc::channel(count);
        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            workers.push(spawn_worker(
                id,
                &worker_config,
                Arc::clone(&abort),
                reply_tx.clone(),
                idle_tx.clone(),
            )?);
            idle_tx
                .try_send(id)
                .map_err(|_| PlannerError::Internal("idle queue sized wrong".to_string()))?;
        }
        debug!(workers = count, "worker pool configured");
        Ok(Dispatcher {
            workers,
            idle_rx,
            reply_rx,
            book: book.clone(),
            config: config.clone(),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn decode(&self, wire: &str) -> Result<Calendar, PlannerError> {
        from_wire(
            wire,
            &self.book,
            self.config.payday_delay,
            self.config.return_tiles_asap,
        )
    }

    async fn next_idle_worker(&mut self) -> Result<usize, PlannerError> {
        self.idle_rx
            .recv()
            .await
            .ok_or_else(|| PlannerError::Internal("worker pool closed".to_string()))
    }

    /// Hand each frontier node's whole subtree to one worker, heaviest
    /// subtree first, and merge the per-subtree bests in input order.
    pub async fn run_deep(
        &mut self,
        mut nodes: Vec<FrontierNode>,
        monitor: &mut MemoryMonitor,
        pacer: &mut FramePacer,
    ) -> Result<DeepOutcome, PlannerError> {
        nodes.sort_by_key(|n| std::cmp::Reverse(subtree_cost(n)));

        let mut results: Vec<Option<(f64, String)>> = Vec::new();
        results.resize_with(nodes.len(), || None);
        let mut stats = SimStats::default();
        let mut dispatched = 0usize;
        let mut received = 0usize;
        let mut faults = 0usize;
        let mut successes = 0usize;

        for (index, node) in nodes.into_iter().enumerate() {
            if monitor.aborted() {
                break;
            }
            pacer.yield_if_due().await;
            let worker_id = self.next_idle_worker().await?;
            while let Ok(reply) = self.reply_rx.try_recv() {
                received += 1;
                absorb_subtree_reply(reply, &mut results, &mut stats, &mut faults, &mut successes);
                monitor.probe_now();
            }
            self.workers[worker_id]
                .send(WorkerRequest::Subtree {
                    input_index: index,
                    day: node.day,
                    calendar_wire: to_wire(&node.calendar),
                })
                .await?;
            dispatched += 1;
            stats.subtrees_dispatched += 1;
        }

        while received < dispatched {
            let Some(reply) = self.reply_rx.recv().await else {
                break;
            };
            received += 1;
            absorb_subtree_reply(reply, &mut results, &mut stats, &mut faults, &mut successes);
            monitor.probe_now();
            pacer.yield_if_due().await;
        }

        if dispatched > 0 && successes == 0 && faults > 0 {
            return Err(PlannerError::WorkerFault(format!(
                "every subtree dispatch failed ({} of {})",
                faults, dispatched
            )));
        }

        let mut best: Option<(f64, Calendar)> = None;
        for slot in results.into_iter().flatten() {
            let (wealth, wire) = slot;
            if !wealth.is_finite() {
                continue;
            }
            if best.as_ref().map(|(w, _)| wealth > *w).unwrap_or(true) {
                match self.decode(&wire) {
                    Ok(cal) => best = Some((wealth, cal)),
                    Err(e) => {
                        warn!(error = %e, "dropping undecodable subtree result");
                        stats.worker_faults += 1;
                    }
                }
            }
        }
        if monitor.aborted() {
            stats.aborted = true;
        }
        Ok(DeepOutcome { best, stats })
    }

    /// Expand one frontier level across the pool: one contiguous chunk per
    /// worker, outputs stitched back together in input order.
    pub async fn run_shallow_level(
        &mut self,
        frontier: Vec<FrontierNode>,
        monitor: &mut MemoryMonitor,
        pacer: &mut FramePacer,
    ) -> Result<LevelOutcome, PlannerError> {
        let chunk_size = frontier.len().div_ceil(self.workers.len()).max(1);
        let mut chunks: Vec<Vec<(usize, i64, String)>> = Vec::new();
        let mut offset = 0usize;
        let mut current: Vec<(usize, i64, String)> = Vec::new();
        for node in &frontier {
            current.push((offset, node.day, to_wire(&node.calendar)));
            offset += 1;
            if current.len() == chunk_size {
                chunks.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        let mut outputs: Vec<Option<Vec<LevelGroup>>> = Vec::new();
        outputs.resize_with(chunks.len(), || None);
        let mut stats = SimStats::default();
        let mut dispatched = 0usize;
        let mut received = 0usize;
        let mut faults = 0usize;
        let mut successes = 0usize;

        for (index, chunk) in chunks.into_iter().enumerate() {
            if monitor.aborted() {
                break;
            }
            pacer.yield_if_due().await;
            let worker_id = self.next_idle_worker().await?;
            while let Ok(reply) = self.reply_rx.try_recv() {
                received += 1;
                absorb_level_reply(reply, &mut outputs, &mut stats, &mut faults, &mut successes);
                monitor.probe_now();
            }
            self.workers[worker_id]
                .send(WorkerRequest::Level {
                    chunk_index: index,
                    nodes: chunk,
                })
                .await?;
            dispatched += 1;
        }

        while received < dispatched {
            let Some(reply) = self.reply_rx.recv().await else {
                break;
            };
            received += 1;
            absorb_level_reply(reply, &mut outputs, &mut stats, &mut faults, &mut successes);
            monitor.probe_now();
            pacer.yield_if_due().await;
        }

        if dispatched > 0 && successes == 0 && faults > 0 {
            return Err(PlannerError::WorkerFault(format!(
                "every chunk dispatch failed ({} of {})",
                faults, dispatched
            )));
        }

        let mut next_frontier = Vec::new();
        let mut best: Option<(f64, Calendar)> = None;
        for groups in outputs.into_iter().flatten() {
            pacer.yield_if_due().await;
            for group in groups {
                for (day, wire) in group.successors {
                    match self.decode(&wire) {
                        Ok(calendar) => next_frontier.push(FrontierNode { day, calendar }),
                        Err(e) => {
                            warn!(error = %e, "dropping undecodable successor");
                            stats.worker_faults += 1;
                        }
                    }
                }
                for (wealth, wire) in group.leaves {
                    if best.as_ref().map(|(w, _)| wealth > *w).unwrap_or(true) {
                        match self.decode(&wire) {
                            Ok(cal) => best = Some((wealth, cal)),
                            Err(e) => {
                                warn!(error = %e, "dropping undecodable leaf");
                                stats.worker_faults += 1;
                            }
                        }
                    }
                }
            }
        }
        if monitor.aborted() {
            stats.aborted = true;
        }
        Ok(LevelOutcome {
            next_frontier,
            best,
            stats,
        })
    }

    /// Stop every worker and wait for the threads.
    pub async fn shutdown(self) {
        for worker in self.workers {
            worker.shutdown().await;
        }
    }
}

fn absorb_subtree_reply(
    reply: WorkerReply,
    results: &mut [Option<(f64, String)>],
    stats: &mut SimStats,
    faults: &mut usize,
    successes: &mut usize,
) {
    match reply.result {
        Ok(WorkerOutput::Subtree {
            input_index,
            best_wealth,
            best_calendar_wire,
            stats: worker_stats,
            pending,
        }) => {
            stats.merge(&worker_stats);
            if pending > 0 {
                debug!(
                    worker = reply.worker_id,
                    pending, "subtree returned early with unexpanded nodes"
                );
            }
            if let Some(wire) = best_calendar_wire {
                if let Some(slot) = results.get_mut(input_index) {
                    *slot = Some((best_wealth, wire));
                }
            }
            *successes += 1;
        }
        Ok(other) => {
            warn!(worker = reply.worker_id, "unexpected reply shape: {:?}", other);
            *faults += 1;
            stats.worker_faults += 1;
        }
        Err(e) => {
            warn!(worker = reply.worker_id, error = %e, "worker fault, dropping its subtree");
            *faults += 1;
            stats.worker_faults += 1;
        }
    }
}

fn absorb_level_reply(
    reply: WorkerReply,
    outputs: &mut [Option<Vec<LevelGroup>>],
    stats: &mut SimStats,
    faults: &mut usize,
    successes: &mut usize,
) {
    match reply.result {
        Ok(WorkerOutput::Level {
            chunk_index,
            groups,
            stats: worker_stats,
        }) => {
            stats.merge(&worker_stats);
            if let Some(slot) = outputs.get_mut(chunk_index) {
                *slot = Some(groups);
            }
            *successes += 1;
        }
        Ok(other) => {
            warn!(worker = reply.worker_id, "unexpected reply shape: {:?}", other);
            *faults += 1;
            stats.worker_faults += 1;
        }
        Err(e) => {
            warn!(worker = reply.worker_id, error = %e, "worker fault, dropping its chunk");
            *faults += 1;
            stats.worker_faults += 1;
        }
    }
}
