use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::http_client::build_client;

pub const STATS_BASE_URL: &str = "https://stats.nba.com/stats";

const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_BASE_DELAY_MS: u64 = 500;
const ERROR_BODY_LIMIT: usize = 200;

// stats.nba.com drops requests that don't look like they came from nba.com.
const STATS_HEADERS: &[(&str, &str)] = &[
    ("Accept", "application/json, text/plain, */*"),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Origin", "https://www.nba.com"),
    ("Referer", "https://www.nba.com/"),
    ("x-nba-stats-origin", "stats"),
    ("x-nba-stats-token", "true"),
];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed")]
    Request(#[from] reqwest::Error),

    #[error("http {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid game log json")]
    Decode(#[from] serde_json::Error),

    #[error("response has no result set")]
    MissingResultSet,
}

/// Every attempt against the remote source failed.
#[derive(Debug, Error)]
#[error("game log fetch failed after {attempts} attempts")]
pub struct FetchExhausted {
    pub attempts: u32,
    #[source]
    pub last: FetchError,
}

/// Row-oriented batch with named columns, exactly as the source sent it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Builds a batch from keyed records. Columns follow first-seen key order
    /// and keys a record lacks become nulls.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Map<String, Value>>) -> Self {
        let records = records.into_iter().collect::<Vec<_>>();
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub trait GameLogSource {
    fn fetch_game_log(&self, player_id: u32, season: &str) -> Result<RawBatch, FetchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `attempt`-th failure (1-based); grows linearly.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

pub fn fetch_with_retry<S: GameLogSource + ?Sized>(
    source: &S,
    player_id: u32,
    season: &str,
    policy: RetryPolicy,
) -> Result<RawBatch, FetchExhausted> {
    let attempts = policy.max_attempts.max(1);
    let mut last_err: Option<FetchError> = None;
    for attempt in 1..=attempts {
        match source.fetch_game_log(player_id, season) {
            Ok(batch) => {
                info!(player_id, season, attempt, rows = batch.len(), "fetched game log");
                return Ok(batch);
            }
            Err(err) => {
                warn!(
                    player_id,
                    season,
                    attempt,
                    error = &err as &(dyn std::error::Error + 'static),
                    "game log fetch failed"
                );
                last_err = Some(err);
                if attempt < attempts {
                    std::thread::sleep(policy.delay_after(attempt));
                }
            }
        }
    }
    Err(FetchExhausted {
        attempts,
        last: last_err.unwrap_or(FetchError::MissingResultSet),
    })
}

/// Live source backed by the stats.nba.com `playergamelog` endpoint.
#[derive(Debug, Clone)]
pub struct StatsApiSource {
    client: Client,
    base_url: String,
    season_type: String,
}

impl StatsApiSource {
    pub fn new(base_url: &str, season_type: &str, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            season_type: season_type.to_string(),
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self, FetchError> {
        Self::new(&config.api_base_url, &config.season_type, config.request_timeout)
    }

    fn game_log_request(&self, player_id: u32, season: &str) -> RequestBuilder {
        let mut req = self
            .client
            .get(format!("{}/playergamelog", self.base_url))
            .query(&[
                ("PlayerID", player_id.to_string()),
                ("Season", season.to_string()),
                ("SeasonType", self.season_type.clone()),
            ]);
        for (name, value) in STATS_HEADERS {
            req = req.header(*name, *value);
        }
        req
    }
}

impl GameLogSource for StatsApiSource {
    fn fetch_game_log(&self, player_id: u32, season: &str) -> Result<RawBatch, FetchError> {
        let resp = self.game_log_request(player_id, season).send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }
        parse_game_log_json(&body)
    }
}

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(rename = "resultSets", default)]
    result_sets: Vec<ResultSet>,
    // A few endpoints return a single object under this key instead.
    #[serde(rename = "resultSet", default)]
    result_set: Option<ResultSet>,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    #[serde(default)]
    name: String,
    #[serde(default)]
    headers: Vec<String>,
    #[serde(rename = "rowSet", default)]
    row_set: Vec<Vec<Value>>,
}

pub fn parse_game_log_json(raw: &str) -> Result<RawBatch, FetchError> {
    let parsed = serde_json::from_str::<StatsResponse>(raw.trim())?;
    let mut sets = parsed.result_sets;
    sets.extend(parsed.result_set);
    let idx = sets
        .iter()
        .position(|s| s.name.eq_ignore_ascii_case("PlayerGameLog"))
        .unwrap_or(0);
    if idx >= sets.len() {
        return Err(FetchError::MissingResultSet);
    }
    let set = sets.swap_remove(idx);
    Ok(RawBatch::new(set.headers, set.row_set))
}
