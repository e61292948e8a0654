use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use rusqlite::Connection;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::fetch::{GameLogSource, StatsApiSource, fetch_with_retry};
use crate::normalize::normalize;
use crate::snapshot::write_csv_snapshot;
use crate::stamp::write_last_updated;
use crate::store::{self, load_games, merge_games, replace_table};

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// The source had no games; nothing was touched.
    EmptyBatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub superseded: usize,
    pub stored: usize,
    pub table: String,
    pub csv_path: PathBuf,
    pub last_updated: NaiveDateTime,
}

/// One full run against the live stats API and the configured database.
pub fn run(config: &PipelineConfig) -> Result<RunOutcome> {
    let source = StatsApiSource::from_config(config)?;
    let mut conn = store::open_db(&config.db_path).map_err(PipelineError::Open)?;
    run_with(config, &source, &mut conn, Local::now().naive_local())
}

/// Fetch → normalize → merge/replace → snapshot → stamp, stopping at the
/// first failure. Nothing before the replace writes anything.
pub fn run_with<S: GameLogSource + ?Sized>(
    config: &PipelineConfig,
    source: &S,
    conn: &mut Connection,
    now: NaiveDateTime,
) -> Result<RunOutcome> {
    info!(
        player_id = config.player_id,
        season = %config.season,
        table = %config.table,
        "starting game log ingest"
    );

    let raw = fetch_with_retry(source, config.player_id, &config.season, config.retry)?;
    if raw.is_empty() {
        info!("no games returned; leaving stored data as is");
        return Ok(RunOutcome::EmptyBatch);
    }

    let fresh = normalize(&raw)?;
    info!(games = fresh.len(), "normalized game log");

    let previous = load_games(conn, &config.table).map_err(PipelineError::StorageRead)?;
    let merged = merge_games(previous, fresh);
    info!(
        inserted = merged.inserted,
        superseded = merged.superseded,
        total = merged.rows.len(),
        "merged with stored games"
    );
    let stored =
        replace_table(conn, &config.table, &merged.rows).map_err(PipelineError::StorageWrite)?;

    write_csv_snapshot(conn, &config.table, &config.csv_path)?;
    write_last_updated(&config.last_updated_path, now).map_err(PipelineError::Marker)?;

    info!(games = stored, "ingest complete");
    Ok(RunOutcome::Completed(RunSummary {
        fetched: raw.len(),
        inserted: merged.inserted,
        superseded: merged.superseded,
        stored,
        table: config.table.clone(),
        csv_path: config.csv_path.clone(),
        last_updated: now,
    }))
}
