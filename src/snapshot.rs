use std::fs;
use std::path::Path;

use rusqlite::Connection;
use thiserror::Error;
use tracing::info;

use crate::store::{self, StoreError};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("read table for snapshot")]
    Store(#[from] StoreError),

    #[error("write csv")]
    Csv(#[from] csv::Error),

    #[error("swap snapshot file")]
    Io(#[from] std::io::Error),
}

/// Rewrites `path` from the stored table, oldest game first. Returns the row
/// count written.
pub fn write_csv_snapshot(conn: &Connection, table: &str, path: &Path) -> Result<usize, SnapshotError> {
    let games = store::load_games(conn, table)?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        if games.is_empty() {
            writer.write_record(store::GAME_COLUMNS)?;
        }
        for game in &games {
            writer.serialize(game)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;

    info!(path = %path.display(), rows = games.len(), "wrote csv snapshot");
    Ok(games.len())
}
