use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dedup::DedupConfig;
use crate::error::AppError;
use crate::models::Tier;
use crate::orchestrator::{MAX_PARALLEL_ATTEMPTS_LIMIT, OrchestratorConfig};
use crate::pacing::PacingPolicy;
use crate::scheduler::{SchedulerConfig, TierPolicy};
use crate::worker_health::CooldownPolicy;

/// One remote scraping node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWorkerConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Sent as `X-API-Key`. Falls back to `CARWATCH_WORKER_SECRET`.
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,
}

/// Monitor pipeline configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub synthetic_data: bool,
    pub headless_fallback: bool,
    pub remote_workers: Vec<RemoteWorkerConfig>,
    pub tiers: Vec<TierPolicy>,
    pub search_pacing: PacingPolicy,
    pub tier_pacing: PacingPolicy,
    pub step_pacing: PacingPolicy,
    pub attempt_timeout: Duration,
    pub search_timeout: Duration,
    pub max_parallel_attempts: usize,
    pub merge_results: bool,
    pub health_check_interval: Duration,
    pub dedup_capacity: u64,
    pub warm_dedup: bool,
    /// Site slug for the classifieds-style secondary source.
    pub secondary_site: String,
    /// Outbound proxy for direct page fetches (http, https or socks5).
    pub proxy_url: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let scheduler = SchedulerConfig::default();
        let orchestrator = OrchestratorConfig::default();
        Self {
            synthetic_data: false,
            headless_fallback: false,
            remote_workers: Vec::new(),
            tiers: scheduler.tiers,
            search_pacing: scheduler.search_pacing,
            tier_pacing: scheduler.tier_pacing,
            step_pacing: orchestrator.step_pacing,
            attempt_timeout: orchestrator.attempt_timeout,
            search_timeout: scheduler.search_timeout,
            max_parallel_attempts: orchestrator.max_parallel_attempts,
            merge_results: orchestrator.merge_results,
            health_check_interval: scheduler.health_check_interval,
            dedup_capacity: DedupConfig::default().max_entries,
            warm_dedup: true,
            secondary_site: "miami".to_string(),
            proxy_url: None,
        }
    }
}

impl MonitorConfig {
    /// Read configuration from environment variables.
    ///
    /// Every variable is optional; see [`MonitorConfig::from_lookup`].
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup.
    ///
    /// - `CARWATCH_SYNTHETIC_DATA`, `CARWATCH_HEADLESS_FALLBACK` (bool, default false)
    /// - `CARWATCH_REMOTE_WORKERS` (JSON array of `{id, url, provider?, region?, secret?}`)
    /// - `CARWATCH_WORKER_SECRET` (secret for workers that omit one)
    /// - `CARWATCH_TIER_<PREMIUM|PRO|FREE>_INTERVAL_SECS`, `..._MAX_SEARCHES`
    /// - `CARWATCH_SEARCH_PACING_MIN_MS`, `CARWATCH_SEARCH_PACING_MAX_MS`, `CARWATCH_TIER_PACING_MS`
    /// - `CARWATCH_ATTEMPT_TIMEOUT_SECS` (30), `CARWATCH_SEARCH_TIMEOUT_SECS` (180)
    /// - `CARWATCH_MAX_PARALLEL_ATTEMPTS` (3, clamped to 1..=4)
    /// - `CARWATCH_MERGE_RESULTS` (false), `CARWATCH_HEALTH_CHECK_INTERVAL_SECS` (300)
    /// - `CARWATCH_DEDUP_CAPACITY` (100000), `CARWATCH_WARM_DEDUP` (true)
    /// - `CARWATCH_SECONDARY_SITE` (miami)
    /// - `CARWATCH_PROXY_URL` (unset)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let flag = |name: &str, default: bool| -> Result<bool, AppError> {
            var(name).map_or(Ok(default), |raw| parse_bool(name, &raw))
        };
        let secs = |name: &str, default: Duration| -> Result<Duration, AppError> {
            match var(name) {
                None => Ok(default),
                Some(raw) => match parse_number::<u64>(name, &raw)? {
                    0 => Err(AppError::ConfigError(format!("{name} must be at least 1"))),
                    n => Ok(Duration::from_secs(n)),
                },
            }
        };
        let millis = |name: &str, default: Duration| -> Result<Duration, AppError> {
            var(name).map_or(Ok(default), |raw| {
                parse_number::<u64>(name, &raw).map(Duration::from_millis)
            })
        };

        let mut tiers = Vec::with_capacity(Tier::ALL.len());
        for tier in Tier::ALL {
            let prefix = format!("CARWATCH_TIER_{}", tier.as_str().to_ascii_uppercase());
            let interval = secs(&format!("{prefix}_INTERVAL_SECS"), tier.default_interval())?;
            let max_name = format!("{prefix}_MAX_SEARCHES");
            let max_active_searches = match var(&max_name) {
                None => tier.default_max_searches(),
                Some(raw) => parse_number(&max_name, &raw)?,
            };
            tiers.push(TierPolicy {
                tier,
                interval,
                max_active_searches,
            });
        }

        let search_pacing = PacingPolicy::range(
            millis("CARWATCH_SEARCH_PACING_MIN_MS", defaults.search_pacing.min)?,
            millis("CARWATCH_SEARCH_PACING_MAX_MS", defaults.search_pacing.max)?,
        );
        let tier_pacing = PacingPolicy::fixed(millis("CARWATCH_TIER_PACING_MS", defaults.tier_pacing.max)?);

        let max_parallel_attempts = match var("CARWATCH_MAX_PARALLEL_ATTEMPTS") {
            None => defaults.max_parallel_attempts,
            Some(raw) => parse_number::<usize>("CARWATCH_MAX_PARALLEL_ATTEMPTS", &raw)?
                .clamp(1, MAX_PARALLEL_ATTEMPTS_LIMIT),
        };

        let dedup_capacity = match var("CARWATCH_DEDUP_CAPACITY") {
            None => defaults.dedup_capacity,
            Some(raw) => match parse_number::<u64>("CARWATCH_DEDUP_CAPACITY", &raw)? {
                0 => {
                    return Err(AppError::ConfigError(
                        "CARWATCH_DEDUP_CAPACITY must be at least 1".into(),
                    ));
                }
                n => n,
            },
        };

        let shared_secret = var("CARWATCH_WORKER_SECRET");
        let remote_workers = match var("CARWATCH_REMOTE_WORKERS") {
            None => Vec::new(),
            Some(raw) => parse_remote_workers(&raw, shared_secret.as_deref())?,
        };

        Ok(Self {
            synthetic_data: flag("CARWATCH_SYNTHETIC_DATA", defaults.synthetic_data)?,
            headless_fallback: flag("CARWATCH_HEADLESS_FALLBACK", defaults.headless_fallback)?,
            remote_workers,
            tiers,
            search_pacing,
            tier_pacing,
            step_pacing: defaults.step_pacing,
            attempt_timeout: secs("CARWATCH_ATTEMPT_TIMEOUT_SECS", defaults.attempt_timeout)?,
            search_timeout: secs("CARWATCH_SEARCH_TIMEOUT_SECS", defaults.search_timeout)?,
            max_parallel_attempts,
            merge_results: flag("CARWATCH_MERGE_RESULTS", defaults.merge_results)?,
            health_check_interval: secs(
                "CARWATCH_HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval,
            )?,
            dedup_capacity,
            warm_dedup: flag("CARWATCH_WARM_DEDUP", defaults.warm_dedup)?,
            secondary_site: var("CARWATCH_SECONDARY_SITE").unwrap_or(defaults.secondary_site),
            proxy_url: var("CARWATCH_PROXY_URL"),
        })
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_parallel_attempts: self.max_parallel_attempts,
            attempt_timeout: self.attempt_timeout,
            merge_results: self.merge_results,
            step_pacing: self.step_pacing,
            cooldown: CooldownPolicy::default(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            tiers: self.tiers.clone(),
            search_pacing: self.search_pacing,
            tier_pacing: self.tier_pacing,
            search_timeout: self.search_timeout,
            health_check_interval: self.health_check_interval,
            ..SchedulerConfig::default()
        }
    }

    pub fn dedup_config(&self) -> DedupConfig {
        DedupConfig {
            max_entries: self.dedup_capacity,
            ..DedupConfig::default()
        }
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, AppError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::ConfigError(format!(
            "Invalid {name} '{raw}': expected true or false"
        ))),
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> Result<T, AppError> {
    raw.parse().map_err(|_| {
        AppError::ConfigError(format!(
            "Invalid {name} '{raw}': must be a non-negative integer"
        ))
    })
}

fn parse_remote_workers(
    raw: &str,
    shared_secret: Option<&str>,
) -> Result<Vec<RemoteWorkerConfig>, AppError> {
    let mut workers: Vec<RemoteWorkerConfig> = serde_json::from_str(raw).map_err(|e| {
        AppError::ConfigError(format!("Invalid CARWATCH_REMOTE_WORKERS: {e}"))
    })?;

    let mut ids = HashSet::new();
    for worker in &mut workers {
        if worker.id.trim().is_empty() {
            return Err(AppError::ConfigError(
                "CARWATCH_REMOTE_WORKERS entry has an empty id".into(),
            ));
        }
        if !ids.insert(worker.id.clone()) {
            return Err(AppError::ConfigError(format!(
                "Duplicate remote worker id '{}'",
                worker.id
            )));
        }
        let url = Url::parse(&worker.url).map_err(|e| {
            AppError::ConfigError(format!("Invalid URL for remote worker '{}': {e}", worker.id))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "Remote worker '{}' must use http or https",
                worker.id
            )));
        }
        worker.url = worker.url.trim_end_matches('/').to_string();
        if worker.secret.is_none() {
            worker.secret = shared_secret.map(str::to_string);
        }
    }
    Ok(workers)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<MonitorConfig, AppError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MonitorConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert!(!config.synthetic_data);
        assert!(!config.headless_fallback);
        assert!(config.remote_workers.is_empty());
        assert_eq!(config.attempt_timeout, Duration::from_secs(30));
        assert_eq!(config.search_timeout, Duration::from_secs(180));
        assert_eq!(config.max_parallel_attempts, 3);
        assert_eq!(config.dedup_capacity, 100_000);
        assert!(config.warm_dedup);
        assert_eq!(config.secondary_site, "miami");
        assert!(config.proxy_url.is_none());
        let intervals: Vec<_> = config.tiers.iter().map(|t| t.interval.as_secs()).collect();
        assert_eq!(intervals, vec![300, 900, 1500]);
    }

    #[test]
    fn tier_overrides_apply() {
        let config = config_from(&[
            ("CARWATCH_TIER_PRO_INTERVAL_SECS", "600"),
            ("CARWATCH_TIER_FREE_MAX_SEARCHES", "1"),
        ])
        .unwrap();
        let pro = config.tiers.iter().find(|t| t.tier == Tier::Pro).unwrap();
        let free = config.tiers.iter().find(|t| t.tier == Tier::Free).unwrap();
        assert_eq!(pro.interval, Duration::from_secs(600));
        assert_eq!(free.max_active_searches, 1);
    }

    #[test]
    fn remote_workers_inherit_shared_secret() {
        let config = config_from(&[
            (
                "CARWATCH_REMOTE_WORKERS",
                r#"[{"id":"node-1","url":"https://a.example.com/","provider":"railway","region":"us-east"},
                    {"id":"node-2","url":"https://b.example.com","secret":"own"}]"#,
            ),
            ("CARWATCH_WORKER_SECRET", "shared"),
        ])
        .unwrap();

        assert_eq!(config.remote_workers.len(), 2);
        assert_eq!(config.remote_workers[0].url, "https://a.example.com");
        assert_eq!(config.remote_workers[0].secret.as_deref(), Some("shared"));
        assert_eq!(config.remote_workers[0].region.as_deref(), Some("us-east"));
        assert_eq!(config.remote_workers[1].secret.as_deref(), Some("own"));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config_from(&[("CARWATCH_MERGE_RESULTS", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("CARWATCH_MERGE_RESULTS"));

        let err = config_from(&[("CARWATCH_ATTEMPT_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("CARWATCH_ATTEMPT_TIMEOUT_SECS"));

        let err = config_from(&[("CARWATCH_SEARCH_TIMEOUT_SECS", "0")]).unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn rejects_bad_worker_definitions() {
        assert!(config_from(&[("CARWATCH_REMOTE_WORKERS", "not json")]).is_err());
        assert!(
            config_from(&[(
                "CARWATCH_REMOTE_WORKERS",
                r#"[{"id":"a","url":"ftp://x"}]"#
            )])
            .is_err()
        );
        assert!(
            config_from(&[(
                "CARWATCH_REMOTE_WORKERS",
                r#"[{"id":"a","url":"https://x"},{"id":"a","url":"https://y"}]"#
            )])
            .is_err()
        );
    }

    #[test]
    fn parallelism_is_clamped() {
        let high = config_from(&[("CARWATCH_MAX_PARALLEL_ATTEMPTS", "16")]).unwrap();
        let low = config_from(&[("CARWATCH_MAX_PARALLEL_ATTEMPTS", "0")]).unwrap();
        assert_eq!(high.max_parallel_attempts, 4);
        assert_eq!(low.max_parallel_attempts, 1);
    }

    #[test]
    fn flags_accept_common_spellings() {
        let config = config_from(&[
            ("CARWATCH_SYNTHETIC_DATA", "yes"),
            ("CARWATCH_HEADLESS_FALLBACK", "1"),
            ("CARWATCH_WARM_DEDUP", "off"),
        ])
        .unwrap();
        assert!(config.synthetic_data);
        assert!(config.headless_fallback);
        assert!(!config.warm_dedup);
    }

    #[test]
    fn pacing_bounds_are_read_in_millis() {
        let config = config_from(&[
            ("CARWATCH_SEARCH_PACING_MIN_MS", "500"),
            ("CARWATCH_SEARCH_PACING_MAX_MS", "1500"),
            ("CARWATCH_TIER_PACING_MS", "0"),
        ])
        .unwrap();
        assert_eq!(config.search_pacing.min, Duration::from_millis(500));
        assert_eq!(config.search_pacing.max, Duration::from_millis(1500));
        assert!(config.tier_pacing.is_none());
        assert_eq!(config.scheduler_config().search_pacing, config.search_pacing);
    }
}
