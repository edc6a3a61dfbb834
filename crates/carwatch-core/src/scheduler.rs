//! Tier-aware polling loop.
//!
//! Each tier keeps its own next-fire time. A cycle polls only the tiers
//! that are due, in configured order, and the loop then sleeps until the
//! earliest next-fire time (or the next health probe, whichever is
//! sooner). A tier whose poll overran its interval is simply due again on
//! the next cycle; no tier is ever skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::{Clock, add_saturating, remaining};
use crate::error::AppError;
use crate::models::{SearchSpec, Tier};
use crate::monitor::MonitorService;
use crate::pacing::PacingPolicy;
use crate::traits::{ListingStore, SearchSource, SourceStrategy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPolicy {
    pub tier: Tier,
    pub interval: Duration,
    /// Per-account cap on searches polled in this tier.
    pub max_active_searches: usize,
}

impl TierPolicy {
    pub fn default_for(tier: Tier) -> Self {
        Self {
            tier,
            interval: tier.default_interval(),
            max_active_searches: tier.default_max_searches(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Polled in this order whenever several tiers are due together.
    pub tiers: Vec<TierPolicy>,
    pub search_pacing: PacingPolicy,
    pub tier_pacing: PacingPolicy,
    /// Envelope for one search, acquisition through persistence.
    pub search_timeout: Duration,
    /// Sleep after a cycle that failed as a whole.
    pub error_backoff: Duration,
    pub health_check_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tiers: Tier::ALL.into_iter().map(TierPolicy::default_for).collect(),
            search_pacing: PacingPolicy::range(Duration::from_secs(3), Duration::from_secs(8)),
            tier_pacing: PacingPolicy::fixed(Duration::from_secs(5)),
            search_timeout: Duration::from_secs(180),
            error_backoff: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(300),
        }
    }
}

// ---------------------------------------------------------------------------
// Schedule bookkeeping
// ---------------------------------------------------------------------------

/// Next-fire time per tier. A tier never polled is due immediately.
#[derive(Debug, Clone)]
pub struct TierSchedule {
    policies: Vec<TierPolicy>,
    next_due: HashMap<Tier, DateTime<Utc>>,
}

impl TierSchedule {
    pub fn new(policies: Vec<TierPolicy>) -> Self {
        Self {
            policies,
            next_due: HashMap::new(),
        }
    }

    pub fn policies(&self) -> &[TierPolicy] {
        &self.policies
    }

    pub fn policy(&self, tier: Tier) -> Option<&TierPolicy> {
        self.policies.iter().find(|p| p.tier == tier)
    }

    pub fn next_due(&self, tier: Tier) -> Option<DateTime<Utc>> {
        self.next_due.get(&tier).copied()
    }

    pub fn is_due(&self, tier: Tier, now: DateTime<Utc>) -> bool {
        self.next_due.get(&tier).is_none_or(|due| *due <= now)
    }

    /// Due tiers, in configured order.
    pub fn due_tiers(&self, now: DateTime<Utc>) -> Vec<Tier> {
        self.policies
            .iter()
            .map(|p| p.tier)
            .filter(|t| self.is_due(*t, now))
            .collect()
    }

    /// Record a poll that started at `started`.
    pub fn mark_polled(&mut self, tier: Tier, started: DateTime<Utc>) {
        if let Some(policy) = self.policy(tier) {
            let due = add_saturating(started, policy.interval);
            self.next_due.insert(tier, due);
        }
    }

    /// Time until the earliest tier is due; zero if one already is.
    pub fn next_wake(&self, now: DateTime<Utc>) -> Duration {
        self.policies
            .iter()
            .map(|p| match self.next_due.get(&p.tier) {
                Some(due) => remaining(now, *due),
                None => Duration::ZERO,
            })
            .min()
            .unwrap_or(Duration::from_secs(60))
    }
}

/// Cap each account at `max` searches, keeping its oldest ones.
///
/// Output is ordered by creation time.
pub fn enforce_quota(mut searches: Vec<SearchSpec>, max: usize) -> Vec<SearchSpec> {
    searches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    let mut per_account: HashMap<Uuid, usize> = HashMap::new();
    searches.retain(|s| {
        let count = per_account.entry(s.account_id).or_default();
        *count += 1;
        *count <= max
    });
    searches
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by the scheduler for monitoring/logging.
#[derive(Debug, Clone)]
pub enum SchedulerEvent<'a> {
    Started {
        tiers: usize,
    },
    CycleStarted {
        due: &'a [Tier],
    },
    TierStarted {
        tier: Tier,
        searches: usize,
        over_quota: usize,
    },
    SearchCompleted {
        tier: Tier,
        search_id: Uuid,
        new_listings: usize,
    },
    SearchFailed {
        tier: Tier,
        search_id: Uuid,
        error: &'a str,
    },
    SearchTimedOut {
        tier: Tier,
        search_id: Uuid,
        timeout: Duration,
    },
    TierFailed {
        tier: Tier,
        error: &'a str,
    },
    HealthChecked {
        probed: usize,
    },
    CycleFailed {
        error: &'a str,
        backoff: Duration,
    },
    Sleeping {
        duration: Duration,
    },
    Stopped,
}

/// Trait for receiving scheduler events (decoupled logging).
pub trait SchedulerReporter: Send + Sync {
    fn report(&self, event: SchedulerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSchedulerReporter;

impl SchedulerReporter for TracingSchedulerReporter {
    fn report(&self, event: SchedulerEvent<'_>) {
        match event {
            SchedulerEvent::Started { tiers } => {
                tracing::info!(%tiers, "Scheduler started");
            }
            SchedulerEvent::CycleStarted { due } => {
                tracing::debug!(?due, "Cycle started");
            }
            SchedulerEvent::TierStarted {
                tier,
                searches,
                over_quota,
            } => {
                tracing::info!(%tier, %searches, %over_quota, "Polling tier");
            }
            SchedulerEvent::SearchCompleted {
                tier,
                search_id,
                new_listings,
            } => {
                tracing::info!(%tier, %search_id, %new_listings, "Search completed");
            }
            SchedulerEvent::SearchFailed {
                tier,
                search_id,
                error,
            } => {
                tracing::warn!(%tier, %search_id, %error, "Search failed");
            }
            SchedulerEvent::SearchTimedOut {
                tier,
                search_id,
                timeout,
            } => {
                tracing::warn!(%tier, %search_id, timeout_secs = timeout.as_secs(), "Search timed out");
            }
            SchedulerEvent::TierFailed { tier, error } => {
                tracing::error!(%tier, %error, "Failed to list searches for tier");
            }
            SchedulerEvent::HealthChecked { probed } => {
                tracing::debug!(%probed, "Worker health probed");
            }
            SchedulerEvent::CycleFailed { error, backoff } => {
                tracing::error!(%error, backoff_secs = backoff.as_secs(), "Cycle failed, backing off");
            }
            SchedulerEvent::Sleeping { duration } => {
                tracing::debug!(sleep_secs = duration.as_secs(), "Sleeping until next tier is due");
            }
            SchedulerEvent::Stopped => {
                tracing::info!("Scheduler stopped");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub tiers_polled: Vec<Tier>,
    pub searches: usize,
    pub new_listings: usize,
    pub failed_searches: usize,
}

pub struct TieredScheduler<Q, S, L, C>
where
    Q: SearchSource,
    S: SourceStrategy,
    L: ListingStore,
    C: Clock,
{
    searches: Q,
    monitor: Arc<MonitorService<S, L, C>>,
    config: SchedulerConfig,
}

impl<Q, S, L, C> TieredScheduler<Q, S, L, C>
where
    Q: SearchSource,
    S: SourceStrategy,
    L: ListingStore,
    C: Clock,
{
    pub fn new(searches: Q, monitor: Arc<MonitorService<S, L, C>>, config: SchedulerConfig) -> Self {
        Self {
            searches,
            monitor,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn schedule(&self) -> TierSchedule {
        TierSchedule::new(self.config.tiers.clone())
    }

    fn now(&self) -> DateTime<Utc> {
        self.monitor.orchestrator().clock().now()
    }

    /// Run until cancelled. Cycle failures back off; they never end the loop.
    pub async fn run<R: SchedulerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &R,
    ) -> Result<(), AppError> {
        reporter.report(SchedulerEvent::Started {
            tiers: self.config.tiers.len(),
        });

        let mut schedule = self.schedule();
        let mut next_health_check = self.now();

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            if self.now() >= next_health_check {
                let probed = tokio::select! {
                    probed = self.monitor.orchestrator().probe_health() => probed,
                    () = cancel_token.cancelled() => break,
                };
                reporter.report(SchedulerEvent::HealthChecked { probed });
                next_health_check = add_saturating(self.now(), self.config.health_check_interval);
            }

            let cycle = tokio::select! {
                result = self.run_cycle(&mut schedule, reporter) => result,
                () = cancel_token.cancelled() => break,
            };

            let sleep_for = match cycle {
                Ok(_) => {
                    let now = self.now();
                    schedule
                        .next_wake(now)
                        .min(remaining(now, next_health_check))
                }
                Err(e) => {
                    let error = e.to_string();
                    reporter.report(SchedulerEvent::CycleFailed {
                        error: &error,
                        backoff: self.config.error_backoff,
                    });
                    self.config.error_backoff
                }
            };

            if !sleep_for.is_zero() {
                reporter.report(SchedulerEvent::Sleeping {
                    duration: sleep_for,
                });
                tokio::select! {
                    () = tokio::time::sleep(sleep_for) => {}
                    () = cancel_token.cancelled() => break,
                }
            }
        }

        reporter.report(SchedulerEvent::Stopped);
        Ok(())
    }

    /// Poll every due tier once.
    ///
    /// A tier whose search listing fails stays due and the cycle reports
    /// the first such error after the remaining tiers have been polled.
    pub async fn run_cycle<R: SchedulerReporter>(
        &self,
        schedule: &mut TierSchedule,
        reporter: &R,
    ) -> Result<CycleSummary, AppError> {
        let due = schedule.due_tiers(self.now());
        reporter.report(SchedulerEvent::CycleStarted { due: &due });

        let mut summary = CycleSummary::default();
        let mut first_error = None;

        for (i, tier) in due.iter().copied().enumerate() {
            if i > 0 {
                self.config.tier_pacing.pause().await;
            }

            let Some(policy) = schedule.policy(tier).cloned() else {
                continue;
            };
            let started = self.now();

            match self.poll_tier(&policy, reporter).await {
                Ok(tier_summary) => {
                    schedule.mark_polled(tier, started);
                    summary.tiers_polled.push(tier);
                    summary.searches += tier_summary.searches;
                    summary.new_listings += tier_summary.new_listings;
                    summary.failed_searches += tier_summary.failed_searches;
                }
                Err(e) => {
                    let error = e.to_string();
                    reporter.report(SchedulerEvent::TierFailed {
                        tier,
                        error: &error,
                    });
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Poll every active search of one tier, sequentially.
    ///
    /// Only a failure to list the tier's searches is returned as an error.
    pub async fn poll_tier<R: SchedulerReporter>(
        &self,
        policy: &TierPolicy,
        reporter: &R,
    ) -> Result<CycleSummary, AppError> {
        let tier = policy.tier;
        let active = self.searches.list_active_searches(tier).await?;
        let total = active.len();
        let searches = enforce_quota(active, policy.max_active_searches);

        reporter.report(SchedulerEvent::TierStarted {
            tier,
            searches: searches.len(),
            over_quota: total - searches.len(),
        });

        let mut summary = CycleSummary {
            tiers_polled: vec![tier],
            ..CycleSummary::default()
        };

        for (i, search) in searches.iter().enumerate() {
            if i > 0 {
                self.config.search_pacing.pause().await;
            }
            summary.searches += 1;

            match tokio::time::timeout(self.config.search_timeout, self.monitor.monitor_once(search))
                .await
            {
                Ok(Ok(listings)) => {
                    summary.new_listings += listings.len();
                    reporter.report(SchedulerEvent::SearchCompleted {
                        tier,
                        search_id: search.id,
                        new_listings: listings.len(),
                    });
                }
                Ok(Err(e)) => {
                    summary.failed_searches += 1;
                    let error = e.to_string();
                    reporter.report(SchedulerEvent::SearchFailed {
                        tier,
                        search_id: search.id,
                        error: &error,
                    });
                }
                Err(_) => {
                    summary.failed_searches += 1;
                    reporter.report(SchedulerEvent::SearchTimedOut {
                        tier,
                        search_id: search.id,
                        timeout: self.config.search_timeout,
                    });
                }
            }
        }

        Ok(summary)
    }
}
