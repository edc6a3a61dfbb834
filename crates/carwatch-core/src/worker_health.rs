//! Health and cooldown bookkeeping for one source worker.
//!
//! # Worker States
//!
//! ```text
//! AVAILABLE --[failure]--> COOLING DOWN --[cooldown elapsed]--> AVAILABLE
//!     |                         |
//!     +--[probe fails]--> UNHEALTHY <--[probe fails]--+
//!                             |
//! AVAILABLE <--[probe passes]-+
//! ```
//!
//! Cooldown grows with consecutive failures: `base * 2^(n-1)`, scaled by
//! `block_multiplier` when the failure was an explicit block, capped at
//! `max`. "No match" outcomes reset the streak without a penalty.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::clock::{add_saturating, remaining};
use crate::error::AppError;
use crate::models::StrategyKind;

#[derive(Debug, Clone)]
pub struct CooldownPolicy {
    /// Cooldown after the first failure.
    pub base: Duration,

    /// Upper bound for any cooldown.
    pub max: Duration,

    /// Applied on top of the streak backoff when the source blocked us.
    pub block_multiplier: f32,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            max: Duration::from_secs(300),
            block_multiplier: 2.0,
        }
    }
}

impl CooldownPolicy {
    pub fn cooldown_for(&self, consecutive_failures: u32, blocked: bool) -> Duration {
        let exponent = consecutive_failures.saturating_sub(1).min(16);
        let mut secs = self.base.as_secs_f32() * 2f32.powi(exponent as i32);
        if blocked {
            secs *= self.block_multiplier;
        }
        Duration::from_secs_f32(secs.min(self.max.as_secs_f32()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    Unhealthy,
    CoolingDown { remaining: Duration },
}

/// Point-in-time view of a worker, for selection logs and status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct SourceWorkerState {
    pub id: String,
    pub kind: StrategyKind,
    pub healthy: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct HealthInner {
    healthy: bool,
    success_count: u64,
    failure_count: u64,
    consecutive_failures: u32,
    cooldown_until: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_used: Option<DateTime<Utc>>,
}

/// Thread-safe health record. Clones share state.
#[derive(Clone)]
pub struct WorkerHealth {
    id: String,
    kind: StrategyKind,
    policy: CooldownPolicy,
    inner: Arc<Mutex<HealthInner>>,
}

impl WorkerHealth {
    pub fn new(id: impl Into<String>, kind: StrategyKind, policy: CooldownPolicy) -> Self {
        Self {
            id: id.into(),
            kind,
            policy,
            inner: Arc::new(Mutex::new(HealthInner {
                healthy: true,
                success_count: 0,
                failure_count: 0,
                consecutive_failures: 0,
                cooldown_until: None,
                last_error: None,
                last_used: None,
            })),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    /// Acquires the inner mutex lock, recovering from poison if necessary.
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, HealthInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(worker = %self.id, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    pub fn availability(&self, now: DateTime<Utc>) -> Availability {
        let inner = self.lock_inner();
        if !inner.healthy {
            return Availability::Unhealthy;
        }
        match inner.cooldown_until {
            Some(until) if now < until => Availability::CoolingDown {
                remaining: remaining(now, until),
            },
            _ => Availability::Available,
        }
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.availability(now) == Availability::Available
    }

    /// Historical success rate; 0.5 before any attempt.
    pub fn success_rate(&self) -> f64 {
        let inner = self.lock_inner();
        rate(inner.success_count, inner.failure_count)
    }

    pub fn record_success(&self, now: DateTime<Utc>) {
        let mut inner = self.lock_inner();
        inner.success_count += 1;
        inner.consecutive_failures = 0;
        inner.cooldown_until = None;
        inner.last_used = Some(now);
    }

    /// Neutral outcome: the channel answered but had nothing for this search.
    pub fn record_no_match(&self, now: DateTime<Utc>) {
        let mut inner = self.lock_inner();
        inner.consecutive_failures = 0;
        inner.last_used = Some(now);
    }

    pub fn record_failure(&self, error: &AppError, now: DateTime<Utc>) {
        let mut inner = self.lock_inner();
        inner.failure_count += 1;
        inner.consecutive_failures += 1;
        inner.last_error = Some(error.to_string());
        inner.last_used = Some(now);

        let cooldown = self
            .policy
            .cooldown_for(inner.consecutive_failures, error.is_block());
        inner.cooldown_until = Some(add_saturating(now, cooldown));

        tracing::warn!(
            worker = %self.id,
            kind = %self.kind,
            consecutive = inner.consecutive_failures,
            cooldown_secs = cooldown.as_secs(),
            error = %error,
            "Worker attempt failed, cooling down"
        );
    }

    /// Apply a liveness probe result.
    pub fn set_healthy(&self, healthy: bool) {
        let mut inner = self.lock_inner();
        if inner.healthy != healthy {
            if healthy {
                tracing::info!(worker = %self.id, "Worker passed liveness probe");
            } else {
                tracing::warn!(worker = %self.id, "Worker failed liveness probe, excluding");
            }
        }
        inner.healthy = healthy;
    }

    pub fn snapshot(&self) -> SourceWorkerState {
        let inner = self.lock_inner();
        SourceWorkerState {
            id: self.id.clone(),
            kind: self.kind,
            healthy: inner.healthy,
            success_count: inner.success_count,
            failure_count: inner.failure_count,
            consecutive_failures: inner.consecutive_failures,
            success_rate: rate(inner.success_count, inner.failure_count),
            cooldown_until: inner.cooldown_until,
            last_error: inner.last_error.clone(),
            last_used: inner.last_used,
        }
    }
}

fn rate(success: u64, failure: u64) -> f64 {
    let total = success + failure;
    if total == 0 {
        0.5
    } else {
        success as f64 / total as f64
    }
}
