//! Multi-source acquisition with failover.
//!
//! Workers are grouped by [`StrategyKind`] and tried group by group in
//! chain order (remote workers → direct fetch → secondary source →
//! synthetic). Within a group, up to `max_parallel_attempts` workers run
//! concurrently, ranked by success rate, and the first non-empty result
//! wins unless `merge_results` is set.
//!
//! `acquire` never fails. Every attempt is bounded by `attempt_timeout`
//! and its outcome is written to that worker's [`WorkerHealth`] before the
//! attempt future completes.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;

use crate::clock::{Clock, SystemClock};
use crate::error::AppError;
use crate::models::{CandidateListing, SearchSpec, StrategyKind};
use crate::pacing::PacingPolicy;
use crate::traits::SourceStrategy;
use crate::worker_health::{CooldownPolicy, SourceWorkerState, WorkerHealth};

pub const MAX_PARALLEL_ATTEMPTS_LIMIT: usize = 4;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Simultaneous outbound attempts across all searches.
    pub max_parallel_attempts: usize,
    pub attempt_timeout: Duration,
    /// Keep going through the chain and merge every non-empty result.
    pub merge_results: bool,
    /// Delay before falling back to the next strategy group.
    pub step_pacing: PacingPolicy,
    pub cooldown: CooldownPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_parallel_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            merge_results: false,
            step_pacing: PacingPolicy::range(Duration::from_secs(2), Duration::from_secs(5)),
            cooldown: CooldownPolicy::default(),
        }
    }
}

/// A strategy plus its health record.
pub struct SourceWorker<S> {
    strategy: S,
    health: WorkerHealth,
}

impl<S: SourceStrategy> SourceWorker<S> {
    pub fn new(strategy: S, policy: CooldownPolicy) -> Self {
        let health = WorkerHealth::new(strategy.id(), strategy.kind(), policy);
        Self { strategy, health }
    }

    pub fn id(&self) -> &str {
        self.health.id()
    }

    pub fn kind(&self) -> StrategyKind {
        self.health.kind()
    }

    pub fn health(&self) -> &WorkerHealth {
        &self.health
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }
}

pub struct FetchOrchestrator<S, C = SystemClock> {
    workers: Vec<Arc<SourceWorker<S>>>,
    config: OrchestratorConfig,
    limiter: Arc<Semaphore>,
    clock: C,
}

impl<S: SourceStrategy> FetchOrchestrator<S, SystemClock> {
    pub fn new(strategies: Vec<S>, config: OrchestratorConfig) -> Self {
        Self::with_clock(strategies, config, SystemClock)
    }
}

impl<S: SourceStrategy, C: Clock> FetchOrchestrator<S, C> {
    pub fn with_clock(strategies: Vec<S>, config: OrchestratorConfig, clock: C) -> Self {
        let permits = config
            .max_parallel_attempts
            .clamp(1, MAX_PARALLEL_ATTEMPTS_LIMIT);
        let workers = strategies
            .into_iter()
            .map(|s| Arc::new(SourceWorker::new(s, config.cooldown.clone())))
            .collect();
        Self {
            workers,
            limiter: Arc::new(Semaphore::new(permits)),
            config: OrchestratorConfig {
                max_parallel_attempts: permits,
                ..config
            },
            clock,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn workers(&self) -> &[Arc<SourceWorker<S>>] {
        &self.workers
    }

    pub fn worker_states(&self) -> Vec<SourceWorkerState> {
        self.workers.iter().map(|w| w.health.snapshot()).collect()
    }

    /// Available workers, ranked by chain position then success rate.
    pub fn select_workers(&self) -> Vec<Arc<SourceWorker<S>>> {
        let now = self.clock.now();
        let mut ranked: Vec<(u8, f64, Arc<SourceWorker<S>>)> = self
            .workers
            .iter()
            .filter(|w| w.health.is_available(now))
            .map(|w| (w.kind().priority(), w.health.success_rate(), Arc::clone(w)))
            .collect();

        ranked.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.total_cmp(&a.1)));
        ranked.into_iter().map(|(_, _, w)| w).collect()
    }

    /// Best available candidate set for a search. Never fails.
    pub async fn acquire(&self, search: &SearchSpec) -> Vec<CandidateListing> {
        let selected = self.select_workers();
        if selected.is_empty() {
            tracing::warn!(
                search_id = %search.id,
                workers = self.workers.len(),
                "No available source workers"
            );
            return Vec::new();
        }

        let mut merged = Vec::new();
        let mut tried_group = false;

        for kind in StrategyKind::CHAIN {
            let group: Vec<&SourceWorker<S>> = selected
                .iter()
                .filter(|w| w.kind() == kind)
                .map(|w| w.as_ref())
                .collect();
            if group.is_empty() {
                continue;
            }

            if tried_group {
                self.config.step_pacing.pause().await;
            }
            tried_group = true;

            tracing::debug!(search_id = %search.id, %kind, workers = group.len(), "Trying strategy group");
            let found = self.run_group(&group, search).await;

            if !found.is_empty() {
                if !self.config.merge_results {
                    tracing::info!(search_id = %search.id, %kind, count = found.len(), "Acquired listings");
                    return found;
                }
                merged.extend(found);
            }
        }

        if merged.is_empty() {
            tracing::info!(search_id = %search.id, "All strategies exhausted without results");
            return merged;
        }

        let mut seen = HashSet::new();
        merged.retain(|c| seen.insert(c.fingerprint()));
        tracing::info!(search_id = %search.id, count = merged.len(), "Acquired merged listings");
        merged
    }

    /// Sliding window over the group: at most `max_parallel_attempts` in flight.
    async fn run_group(
        &self,
        group: &[&SourceWorker<S>],
        search: &SearchSpec,
    ) -> Vec<CandidateListing> {
        let mut queue = group.iter().copied();
        let mut in_flight = FuturesUnordered::new();
        for worker in queue.by_ref().take(self.config.max_parallel_attempts) {
            in_flight.push(self.attempt(worker, search));
        }

        let mut collected = Vec::new();
        while let Some(listings) = in_flight.next().await {
            if !listings.is_empty() {
                if !self.config.merge_results {
                    return listings;
                }
                collected.extend(listings);
            }
            if let Some(next) = queue.next() {
                in_flight.push(self.attempt(next, search));
            }
        }
        collected
    }

    async fn attempt(&self, worker: &SourceWorker<S>, search: &SearchSpec) -> Vec<CandidateListing> {
        let Ok(_permit) = self.limiter.acquire().await else {
            return Vec::new();
        };

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.config.attempt_timeout, worker.strategy.attempt(search))
                .await;
        let now = self.clock.now();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(listings)) if listings.is_empty() => {
                worker.health.record_no_match(now);
                tracing::info!(worker = %worker.id(), search_id = %search.id, elapsed_ms, "No match");
                listings
            }
            Ok(Ok(listings)) => {
                worker.health.record_success(now);
                tracing::info!(
                    worker = %worker.id(),
                    search_id = %search.id,
                    count = listings.len(),
                    elapsed_ms,
                    "Attempt succeeded"
                );
                listings
            }
            Ok(Err(e)) => {
                if e.counts_against_worker() {
                    worker.health.record_failure(&e, now);
                } else {
                    tracing::warn!(worker = %worker.id(), error = %e, "Attempt failed outside the worker");
                }
                Vec::new()
            }
            Err(_) => {
                let e = AppError::Timeout(self.config.attempt_timeout.as_secs());
                worker.health.record_failure(&e, now);
                Vec::new()
            }
        }
    }

    /// Probe every worker's liveness endpoint concurrently.
    ///
    /// Returns the number of workers that had something to probe.
    pub async fn probe_health(&self) -> usize {
        let probes = self.workers.iter().map(|w| async move {
            match w.strategy.probe().await {
                Some(healthy) => {
                    w.health.set_healthy(healthy);
                    true
                }
                None => false,
            }
        });
        let probed = futures::future::join_all(probes)
            .await
            .into_iter()
            .filter(|p| *p)
            .count();
        tracing::debug!(probed, "Health probes complete");
        probed
    }
}
