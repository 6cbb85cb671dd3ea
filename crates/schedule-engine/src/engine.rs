//! The breadth-first schedule search.
//!
//! The search drains a FIFO frontier of `(day, calendar)` nodes, branching
//! each over the shortlist. It runs sequentially until the frontier is wide
//! enough to be worth spreading over the worker pool, then hands the rest
//! out subtree-per-worker (or level-by-level when shallow dispatch is
//! forced). The canonical cache collapses equivalent futures, and the
//! memory monitor can wind the whole thing down early.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info};

use planner_core::{Calendar, Crop, CropBook, EngineConfig, PlannerError, RunParams};

use crate::cache::NodeCache;
use crate::dispatcher::Dispatcher;
use crate::expand::{expand, ExpandContext};
use crate::memory::MemoryMonitor;
use crate::models::{DispatchMode, FrontierNode, SimOutcome, SimStats};
use crate::pacer::FramePacer;

pub struct SimEngine {
    config: EngineConfig,
    params: RunParams,
    book: CropBook,
    ctx: ExpandContext,
    shortlist_names: Vec<String>,
}

fn consider(best: &mut Option<(f64, Calendar)>, wealth: f64, cal: Calendar) {
    // First seen wins on equal wealth.
    if best.as_ref().map(|(w, _)| wealth > *w).unwrap_or(true) {
        *best = Some((wealth, cal));
    }
}

impl SimEngine {
    pub fn new(
        book: CropBook,
        shortlist: Vec<Arc<Crop>>,
        params: RunParams,
        config: EngineConfig,
    ) -> SimEngine {
        let shortlist_names = shortlist.iter().map(|c| c.name.clone()).collect();
        let ctx = ExpandContext::new(shortlist, config.clone(), params);
        SimEngine {
            config,
            params,
            book,
            ctx,
            shortlist_names,
        }
    }

    /// Search the whole decision tree under `root` and return the richest
    /// schedule found. A memory abort surfaces as `stats.aborted` with the
    /// best result seen so far.
    pub async fn run(&self, root: Calendar) -> Result<SimOutcome, PlannerError> {
        let mut stats = SimStats::default();
        if self.ctx.shortlist.is_empty() {
            return Ok(SimOutcome {
                best_wealth: root.wealth(),
                best_calendar: root,
                stats,
            });
        }

        let mut monitor = MemoryMonitor::new(self.config.memory_threshold_gb);
        let mut pacer = FramePacer::new();
        let mut cache = NodeCache::new(self.config.use_cache, self.config.cache_sig_digits);
        let mut best: Option<(f64, Calendar)> = None;

        let mut frontier: VecDeque<FrontierNode> = VecDeque::new();
        if let Some(day) = self.ctx.next_decision_day(&root, 1) {
            frontier.push_back(FrontierNode {
                day,
                calendar: root.clone(),
            });
        }

        // Sequential phase: expand in-line until the frontier is wide enough
        // to seed the pool.
        while frontier.len() < self.config.deep_seeds.max(1) {
            let Some(node) = frontier.pop_front() else {
                break;
            };
            if cache.check_and_insert(&node.calendar, node.day) {
                stats.cache_hits += 1;
                continue;
            }
            stats.nodes_expanded += 1;
            let expansion = expand(&node, &self.ctx);
            for leaf in expansion.leaves {
                stats.leaves_seen += 1;
                let wealth = leaf.wealth();
                consider(&mut best, wealth, leaf);
            }
            frontier.extend(expansion.successors);
            if monitor.record_ops(1) {
                break;
            }
            pacer.yield_if_due().await;
        }

        // Parallel phase: the remaining frontier goes to the pool.
        if !frontier.is_empty() && !monitor.aborted() {
            let mode = self.parallel_mode();
            let nodes: Vec<FrontierNode> = frontier.drain(..).collect();
            debug!(seeds = nodes.len(), ?mode, "switching to pooled dispatch");
            let mut dispatcher = Dispatcher::configure(
                &self.book,
                &self.shortlist_names,
                &self.config,
                self.params,
                monitor.abort_flag(),
            )?;
            let dispatch_result = self
                .run_dispatched(mode, &mut dispatcher, nodes, &mut monitor, &mut pacer, &mut best)
                .await;
            dispatcher.shutdown().await;
            stats.merge(&dispatch_result?);
        }

        if monitor.aborted() {
            stats.aborted = true;
        }

        let (best_wealth, best_calendar) = match best {
            Some((wealth, cal)) => (wealth, cal),
            None => (root.wealth(), root),
        };
        info!(
            best_wealth,
            nodes = stats.nodes_expanded,
            cache_hits = stats.cache_hits,
            aborted = stats.aborted,
            "schedule search finished"
        );
        Ok(SimOutcome {
            best_wealth,
            best_calendar,
            stats,
        })
    }

    /// How the frontier is spread once it outgrows the sequential phase.
    fn parallel_mode(&self) -> DispatchMode {
        if self.config.shallow_dispatch {
            DispatchMode::Shallow
        } else {
            DispatchMode::Deep
        }
    }

    async fn run_dispatched(
        &self,
        mode: DispatchMode,
        dispatcher: &mut Dispatcher,
        nodes: Vec<FrontierNode>,
        monitor: &mut MemoryMonitor,
        pacer: &mut FramePacer,
        best: &mut Option<(f64, Calendar)>,
    ) -> Result<SimStats, PlannerError> {
        let mut stats = SimStats::default();
        match mode {
            // Sequential work never reaches the pool; the in-line phase in
            // `run` owns it.
            DispatchMode::Sequential => debug_assert!(nodes.is_empty()),
            DispatchMode::Shallow => {
                let mut level = nodes;
                while !level.is_empty() && !monitor.aborted() {
                    let outcome = dispatcher.run_shallow_level(level, monitor, pacer).await?;
                    stats.merge(&outcome.stats);
                    if let Some((wealth, cal)) = outcome.best {
                        consider(best, wealth, cal);
                    }
                    level = outcome.next_frontier;
                }
            }
            DispatchMode::Deep => {
                let outcome = dispatcher.run_deep(nodes, monitor, pacer).await?;
                stats.merge(&outcome.stats);
                if let Some((wealth, cal)) = outcome.best {
                    consider(best, wealth, cal);
                }
            }
        }
        Ok(stats)
    }
}
