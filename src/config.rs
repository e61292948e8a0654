use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::fetch::{RetryPolicy, STATS_BASE_URL};
use crate::http_client::DEFAULT_REQUEST_TIMEOUT_SECS;

pub const DEFAULT_PLAYER_ID: u32 = 201939;
pub const DEFAULT_SEASON: &str = "2025-26";
pub const DEFAULT_SEASON_TYPE: &str = "Regular Season";
pub const DEFAULT_DATA_DIR: &str = "data";

const DB_FILE: &str = "db.sqlite";
const LAST_UPDATED_FILE: &str = "LAST_UPDATED.txt";
const SEED_FILE: &str = "seed_alltime_3pm.csv";
const MAX_FETCH_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub player_id: u32,
    pub season: String,
    pub season_type: String,
    pub api_base_url: String,
    pub data_dir: PathBuf,
    pub table: String,
    pub db_path: PathBuf,
    pub csv_path: PathBuf,
    pub last_updated_path: PathBuf,
    pub seed_path: PathBuf,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER_ID, DEFAULT_SEASON, DEFAULT_DATA_DIR)
    }
}

impl PipelineConfig {
    /// Table and file names follow the season, e.g. `2025-26` stores into
    /// `games_2025_26` and snapshots to `season_2025_26_games.csv`.
    pub fn new(player_id: u32, season: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        let season = season.into();
        let data_dir = data_dir.into();
        let slug = season_slug(&season);
        Self {
            player_id,
            table: format!("games_{slug}"),
            db_path: data_dir.join(DB_FILE),
            csv_path: data_dir.join(format!("season_{slug}_games.csv")),
            last_updated_path: data_dir.join(LAST_UPDATED_FILE),
            seed_path: data_dir.join(SEED_FILE),
            season,
            season_type: DEFAULT_SEASON_TYPE.to_string(),
            api_base_url: STATS_BASE_URL.to_string(),
            data_dir,
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Compiled defaults with optional `SHOTLOG_*` overrides from the environment.
    pub fn from_env() -> Self {
        let player_id = env_parse::<u32>("SHOTLOG_PLAYER_ID")
            .filter(|id| *id != 0)
            .unwrap_or(DEFAULT_PLAYER_ID);
        let season = env_string("SHOTLOG_SEASON").unwrap_or_else(|| DEFAULT_SEASON.to_string());
        let data_dir = env_string("SHOTLOG_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        let mut cfg = Self::new(player_id, season, data_dir);
        if let Some(season_type) = env_string("SHOTLOG_SEASON_TYPE") {
            cfg.season_type = season_type;
        }
        if let Some(url) = env_string("SHOTLOG_API_BASE_URL") {
            cfg.api_base_url = url;
        }
        if let Some(attempts) = env_parse::<u32>("SHOTLOG_FETCH_ATTEMPTS") {
            cfg.retry.max_attempts = attempts.clamp(1, MAX_FETCH_ATTEMPTS);
        }
        if let Some(ms) = env_parse::<u64>("SHOTLOG_RETRY_BASE_MS") {
            cfg.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("SHOTLOG_REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout = Duration::from_secs(secs.max(1));
        }
        cfg
    }
}

pub fn season_slug(season: &str) -> String {
    season
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse::<T>().ok())
}
