//! Client for remote scraping nodes.
//!
//! A node exposes `POST /scrape` taking a search config and returning
//! `{"results": [...]}`, plus `GET /health`. Nodes are independent HTTP
//! services; several may run in different regions behind different egress.

use std::time::Duration;

use carwatch_core::config::RemoteWorkerConfig;
use carwatch_core::error::AppError;
use carwatch_core::heuristics::is_likely_vehicle;
use carwatch_core::models::{CandidateListing, SearchSpec, VehicleAttributes};
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    search_config: SearchConfig<'a>,
}

#[derive(Debug, Serialize)]
struct SearchConfig<'a> {
    make: Option<&'a str>,
    model: Option<&'a str>,
    year_min: Option<i32>,
    year_max: Option<i32>,
    price_min: Option<u32>,
    price_max: Option<u32>,
    mileage_max: Option<u32>,
    location: &'a str,
    distance_miles: u32,
}

impl<'a> From<&'a SearchSpec> for SearchConfig<'a> {
    fn from(search: &'a SearchSpec) -> Self {
        Self {
            make: search.make.as_deref(),
            model: search.model.as_deref(),
            year_min: search.year_min,
            year_max: search.year_max,
            price_min: search.price_min,
            price_max: search.price_max,
            mileage_max: search.mileage_max,
            location: &search.location.text,
            distance_miles: search.radius_miles,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    results: Vec<RemoteListing>,
}

/// Listing as returned by a node. Numeric fields arrive as strings or numbers.
#[derive(Debug, Deserialize)]
struct RemoteListing {
    #[serde(default)]
    title: String,
    #[serde(default)]
    price: Value,
    #[serde(default)]
    year: Value,
    #[serde(default)]
    mileage: Value,
    url: Option<String>,
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    fuel_type: Option<String>,
    transmission: Option<String>,
    body_style: Option<String>,
    #[serde(alias = "exterior_color")]
    color: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

fn loose_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl RemoteListing {
    fn into_candidate(self, source: &str) -> Option<CandidateListing> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            return None;
        }
        let mut candidate = CandidateListing::new(
            title,
            loose_string(&self.price).unwrap_or_default(),
            source,
            Utc::now(),
        );
        candidate.year = loose_string(&self.year);
        candidate.mileage = loose_string(&self.mileage);
        candidate.url = self.url.filter(|u| !u.is_empty());
        candidate.location = self.location.filter(|l| !l.is_empty());
        candidate.raw_text = self.description.unwrap_or_default();
        candidate.attributes = VehicleAttributes {
            fuel_type: non_blank(self.fuel_type),
            transmission: non_blank(self.transmission),
            body_style: non_blank(self.body_style),
            color: non_blank(self.color),
        };
        Some(candidate)
    }
}

/// HTTP client bound to one remote node.
#[derive(Clone)]
pub struct RemoteWorkerClient {
    client: Client,
    config: RemoteWorkerConfig,
    timeout: Duration,
}

impl RemoteWorkerClient {
    pub fn new(config: RemoteWorkerConfig, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;
        Ok(Self {
            client,
            config,
            timeout,
        })
    }

    pub fn config(&self) -> &RemoteWorkerConfig {
        &self.config
    }

    fn source(&self) -> String {
        format!("remote:{}", self.config.id)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.config.url.trim_end_matches('/'))
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout.as_secs())
        } else if e.is_connect() {
            AppError::NetworkError(format!("Worker {} unreachable: {e}", self.config.id))
        } else {
            AppError::HttpError(e.to_string())
        }
    }

    /// Ask the node to run a search and return relevance-filtered candidates.
    pub async fn scrape(&self, search: &SearchSpec) -> Result<Vec<CandidateListing>, AppError> {
        let mut request = self.client.post(self.endpoint("scrape")).json(&ScrapeRequest {
            search_config: SearchConfig::from(search),
        });
        if let Some(secret) = &self.config.secret {
            request = request.header("X-API-Key", secret);
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AppError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} from worker {}",
                status.as_u16(),
                self.config.id
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read worker response: {e}")))?;
        let parsed: ScrapeResponse = serde_json::from_str(&body)?;

        let source = self.source();
        let candidates: Vec<CandidateListing> = parsed
            .results
            .into_iter()
            .filter_map(|item| item.into_candidate(&source))
            .filter(|c| is_likely_vehicle(&c.text()))
            .collect();

        tracing::debug!(
            worker = %self.config.id,
            count = candidates.len(),
            "Remote worker returned listings"
        );
        Ok(candidates)
    }

    /// `GET /health`. Any transport error or non-success status is unhealthy.
    pub async fn health(&self) -> bool {
        let request = self
            .client
            .get(self.endpoint("health"))
            .timeout(HEALTH_TIMEOUT);
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(worker = %self.config.id, error = %e, "Health check failed");
                false
            }
        }
    }
}
