use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::info;

use crate::normalize::{GameRecord, GameResult, pct};

/// Persisted column order. Also the select list for reads.
pub const GAME_COLUMNS: &[&str] = &[
    "game_id",
    "game_date",
    "matchup",
    "result",
    "minutes",
    "field_goals_made",
    "field_goals_attempted",
    "three_pointers_made",
    "three_pointers_attempted",
    "free_throws_made",
    "free_throws_attempted",
    "points",
    "plus_minus",
    "season",
    "field_goal_pct",
    "three_point_pct",
    "free_throw_pct",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid table name {0:?}")]
    InvalidTableName(String),

    #[error("table {table} has no {column} column; rebuild it before ingesting")]
    MissingKeyColumn { table: String, column: &'static str },

    #[error("stored game {game_id} has unparsable date {value:?}")]
    InvalidDate { game_id: String, value: String },

    #[error("stored game {game_id} has unknown result {value:?}")]
    InvalidResult { game_id: String, value: String },
}

pub fn open_db(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn = Connection::open(path)?;
    // WAL keeps readers on the old table until the replace commits.
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    Ok(conn)
}

/// Opens an existing database for reads only. Never creates the file or
/// touches the journal mode.
pub fn open_db_read_only(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

pub fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn create_table_sql(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE "{table}" (
            game_id TEXT PRIMARY KEY NOT NULL,
            game_date TEXT NOT NULL,
            matchup TEXT NULL,
            result TEXT NULL,
            minutes REAL NULL,
            field_goals_made INTEGER NULL,
            field_goals_attempted INTEGER NULL,
            three_pointers_made INTEGER NULL,
            three_pointers_attempted INTEGER NULL,
            free_throws_made INTEGER NULL,
            free_throws_attempted INTEGER NULL,
            points INTEGER NULL,
            plus_minus INTEGER NULL,
            season TEXT NULL,
            field_goal_pct REAL NOT NULL,
            three_point_pct REAL NOT NULL,
            free_throw_pct REAL NOT NULL
        );
        "#
    )
}

/// Columns a stored table must carry for its rows to be read back.
const KEY_COLUMNS: &[&str] = &["game_id", "game_date"];

/// Select list for `table`; columns an older table lacks read as NULL,
/// except the key columns, whose absence rejects the table.
fn select_list(conn: &Connection, table: &str) -> Result<String, StoreError> {
    let mut stmt = conn.prepare(&format!(r#"PRAGMA table_info("{table}")"#))?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<HashSet<_>, _>>()?;
    if let Some(column) = KEY_COLUMNS.iter().copied().find(|c| !present.contains(*c)) {
        return Err(StoreError::MissingKeyColumn {
            table: table.to_string(),
            column,
        });
    }
    let cols = GAME_COLUMNS
        .iter()
        .map(|c| {
            if present.contains(*c) {
                (*c).to_string()
            } else {
                format!("NULL AS {c}")
            }
        })
        .collect::<Vec<_>>();
    Ok(cols.join(", "))
}

/// Every stored game, oldest first. A table that doesn't exist yet reads as empty.
pub fn load_games(conn: &Connection, table: &str) -> Result<Vec<GameRecord>, StoreError> {
    query_games(conn, table, "ASC", None)
}

/// Most recent games first, capped at `limit`.
pub fn load_recent_games(
    conn: &Connection,
    table: &str,
    limit: usize,
) -> Result<Vec<GameRecord>, StoreError> {
    query_games(conn, table, "DESC", Some(limit))
}

fn query_games(
    conn: &Connection,
    table: &str,
    direction: &str,
    limit: Option<usize>,
) -> Result<Vec<GameRecord>, StoreError> {
    validate_table_name(table)?;
    if !table_exists(conn, table)? {
        return Ok(Vec::new());
    }
    let mut sql = format!(
        r#"SELECT {} FROM "{table}" ORDER BY game_date {direction}, game_id {direction}"#,
        select_list(conn, table)?
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], StoredRow::from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?.into_record()?);
    }
    Ok(out)
}

struct StoredRow {
    game_id: String,
    game_date: String,
    matchup: Option<String>,
    result: Option<String>,
    minutes: Option<f64>,
    counts: [Option<i64>; 8],
    season: Option<String>,
    pcts: [Option<f64>; 3],
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            game_id: row.get(0)?,
            game_date: row.get(1)?,
            matchup: row.get(2)?,
            result: row.get(3)?,
            minutes: row.get(4)?,
            counts: [
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
            ],
            season: row.get(13)?,
            pcts: [row.get(14)?, row.get(15)?, row.get(16)?],
        })
    }

    fn into_record(self) -> Result<GameRecord, StoreError> {
        let game_date = NaiveDate::parse_from_str(&self.game_date, DATE_FORMAT).map_err(|_| {
            StoreError::InvalidDate {
                game_id: self.game_id.clone(),
                value: self.game_date.clone(),
            }
        })?;
        let result = match self.result {
            None => None,
            Some(raw) => Some(GameResult::parse(&raw).ok_or_else(|| {
                StoreError::InvalidResult {
                    game_id: self.game_id.clone(),
                    value: raw,
                }
            })?),
        };
        let [fgm, fga, fg3m, fg3a, ftm, fta, points, plus_minus] = self.counts;
        let [fg_pct, fg3_pct, ft_pct] = self.pcts;
        Ok(GameRecord {
            game_id: self.game_id,
            game_date,
            matchup: self.matchup,
            result,
            minutes: self.minutes,
            field_goals_made: fgm,
            field_goals_attempted: fga,
            three_pointers_made: fg3m,
            three_pointers_attempted: fg3a,
            free_throws_made: ftm,
            free_throws_attempted: fta,
            points,
            plus_minus,
            season: self.season,
            field_goal_pct: fg_pct.unwrap_or_else(|| pct(fgm, fga)),
            three_point_pct: fg3_pct.unwrap_or_else(|| pct(fg3m, fg3a)),
            free_throw_pct: ft_pct.unwrap_or_else(|| pct(ftm, fta)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub rows: Vec<GameRecord>,
    pub inserted: usize,
    pub superseded: usize,
}

/// previous ++ fresh, one row per `game_id`, the later copy winning.
pub fn merge_games(previous: Vec<GameRecord>, fresh: Vec<GameRecord>) -> MergeOutcome {
    let (inserted, superseded) = {
        let stored_ids = previous
            .iter()
            .map(|g| g.game_id.as_str())
            .collect::<HashSet<_>>();
        let fresh_ids = fresh
            .iter()
            .map(|g| g.game_id.as_str())
            .collect::<HashSet<_>>();
        let superseded = fresh_ids.intersection(&stored_ids).count();
        (fresh_ids.len() - superseded, superseded)
    };

    let mut by_id: HashMap<String, GameRecord> = HashMap::with_capacity(previous.len() + fresh.len());
    for game in previous.into_iter().chain(fresh) {
        by_id.insert(game.game_id.clone(), game);
    }
    let mut rows = by_id.into_values().collect::<Vec<_>>();
    rows.sort_by(|a, b| {
        a.game_date
            .cmp(&b.game_date)
            .then_with(|| a.game_id.cmp(&b.game_id))
    });

    MergeOutcome {
        rows,
        inserted,
        superseded,
    }
}

/// Swaps `table` for exactly `rows` in one transaction. On any error the
/// transaction rolls back and the previous table is untouched.
pub fn replace_table(
    conn: &mut Connection,
    table: &str,
    rows: &[GameRecord],
) -> Result<usize, StoreError> {
    validate_table_name(table)?;
    let staging = format!("{table}__staging");

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(r#"DROP TABLE IF EXISTS "{staging}";"#))?;
    tx.execute_batch(&create_table_sql(&staging))?;
    {
        let mut stmt = tx.prepare(&format!(
            r#"INSERT INTO "{staging}" ({}) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17
            )"#,
            GAME_COLUMNS.join(", ")
        ))?;
        for g in rows {
            stmt.execute(params![
                g.game_id,
                g.game_date.format(DATE_FORMAT).to_string(),
                g.matchup,
                g.result.map(GameResult::as_str),
                g.minutes,
                g.field_goals_made,
                g.field_goals_attempted,
                g.three_pointers_made,
                g.three_pointers_attempted,
                g.free_throws_made,
                g.free_throws_attempted,
                g.points,
                g.plus_minus,
                g.season,
                g.field_goal_pct,
                g.three_point_pct,
                g.free_throw_pct,
            ])?;
        }
    }
    tx.execute_batch(&format!(
        r#"
        DROP TABLE IF EXISTS "{table}";
        ALTER TABLE "{staging}" RENAME TO "{table}";
        CREATE INDEX IF NOT EXISTS "idx_{table}_game_date" ON "{table}"(game_date);
        "#
    ))?;
    tx.commit()?;

    info!(table, rows = rows.len(), "replaced game table");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(id: &str, date: &str, points: i64) -> GameRecord {
        let mut g = GameRecord {
            game_id: id.to_string(),
            game_date: NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap(),
            matchup: Some("GSW vs. LAL".to_string()),
            result: Some(GameResult::Win),
            minutes: Some(34.5),
            field_goals_made: Some(10),
            field_goals_attempted: Some(20),
            three_pointers_made: Some(5),
            three_pointers_attempted: Some(10),
            free_throws_made: Some(2),
            free_throws_attempted: Some(2),
            points: Some(points),
            plus_minus: Some(-3),
            season: Some("22025".to_string()),
            field_goal_pct: 0.0,
            three_point_pct: 0.0,
            free_throw_pct: 0.0,
        };
        g.derive_percentages();
        g
    }

    fn memory() -> Connection {
        Connection::open_in_memory().expect("in-memory db")
    }

    #[test]
    fn table_names_are_plain_identifiers() {
        assert!(validate_table_name("games_2025_26").is_ok());
        assert!(validate_table_name("_scratch").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2025_games").is_err());
        assert!(validate_table_name("games\"; DROP TABLE x; --").is_err());
    }

    #[test]
    fn missing_table_loads_empty() {
        let conn = memory();
        assert!(load_games(&conn, "games_2025_26").unwrap().is_empty());
    }

    #[test]
    fn replace_then_load_round_trips() {
        let mut conn = memory();
        let rows = vec![game("A1", "2025-01-01", 27), game("A2", "2025-01-03", 31)];
        assert_eq!(replace_table(&mut conn, "games", &rows).unwrap(), 2);
        assert_eq!(load_games(&conn, "games").unwrap(), rows);
        assert!(!table_exists(&conn, "games__staging").unwrap());
    }

    #[test]
    fn replace_drops_rows_not_in_the_new_set() {
        let mut conn = memory();
        replace_table(&mut conn, "games", &[game("A1", "2025-01-01", 27), game("A2", "2025-01-03", 31)]).unwrap();
        replace_table(&mut conn, "games", &[game("A2", "2025-01-03", 30)]).unwrap();
        let stored = load_games(&conn, "games").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].points, Some(30));
    }

    #[test]
    fn failed_replace_keeps_previous_table() {
        let mut conn = memory();
        let before = vec![game("A1", "2025-01-01", 27)];
        replace_table(&mut conn, "games", &before).unwrap();

        // Duplicate primary key fails halfway through the staging insert.
        let broken = vec![game("B1", "2025-01-05", 10), game("B1", "2025-01-05", 12)];
        assert!(matches!(
            replace_table(&mut conn, "games", &broken),
            Err(StoreError::Sqlite(_))
        ));
        assert_eq!(load_games(&conn, "games").unwrap(), before);
    }

    #[test]
    fn merge_prefers_fresh_rows() {
        let previous = vec![game("A1", "2025-01-01", 27), game("A2", "2025-01-03", 31)];
        let fresh = vec![game("A1", "2025-01-01", 30), game("A3", "2025-01-05", 18)];
        let merged = merge_games(previous, fresh);
        assert_eq!(merged.inserted, 1);
        assert_eq!(merged.superseded, 1);
        let ids = merged.rows.iter().map(|g| g.game_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["A1", "A2", "A3"]);
        assert_eq!(merged.rows[0].points, Some(30));
    }

    #[test]
    fn merge_collapses_duplicates_within_a_batch() {
        let fresh = vec![game("A1", "2025-01-01", 27), game("A1", "2025-01-01", 29)];
        let merged = merge_games(Vec::new(), fresh);
        assert_eq!(merged.rows.len(), 1);
        assert_eq!(merged.rows[0].points, Some(29));
        assert_eq!(merged.inserted, 1);
    }

    #[test]
    fn older_table_missing_columns_reads_nulls() {
        let conn = memory();
        conn.execute_batch(
            r#"
            CREATE TABLE games (game_id TEXT PRIMARY KEY, game_date TEXT NOT NULL,
                field_goals_made INTEGER, field_goals_attempted INTEGER);
            INSERT INTO games VALUES ('A1', '2025-01-01', 3, 4);
            "#,
        )
        .unwrap();
        let stored = load_games(&conn, "games").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].plus_minus, None);
        assert_eq!(stored[0].field_goal_pct, 0.75);
        assert_eq!(stored[0].free_throw_pct, 0.0);
    }

    #[test]
    fn read_only_open_reads_but_never_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");
        let mut writer = open_db(&path).unwrap();
        replace_table(&mut writer, "games", &[game("A1", "2025-01-01", 27)]).unwrap();

        let mut reader = open_db_read_only(&path).unwrap();
        assert_eq!(load_games(&reader, "games").unwrap().len(), 1);
        assert!(replace_table(&mut reader, "games", &[]).is_err());
        assert_eq!(load_games(&writer, "games").unwrap().len(), 1);
    }

    #[test]
    fn read_only_open_does_not_create_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("db.sqlite");
        assert!(open_db_read_only(&path).is_err());
        assert!(!path.exists());
        assert!(!dir.path().join("data").exists());
    }

    #[test]
    fn table_without_game_id_is_rejected() {
        let conn = memory();
        conn.execute_batch(
            r#"
            CREATE TABLE games (game_date TEXT, matchup TEXT, pts INTEGER);
            INSERT INTO games VALUES ('2025-01-01', 'GSW vs LAL', 27);
            "#,
        )
        .unwrap();
        let err = load_games(&conn, "games").unwrap_err();
        assert!(matches!(
            err,
            StoreError::MissingKeyColumn { column: "game_id", .. }
        ));
        assert!(err.to_string().contains("no game_id column"));
    }

    #[test]
    fn recent_games_are_newest_first() {
        let mut conn = memory();
        let rows = vec![
            game("A1", "2025-01-01", 27),
            game("A2", "2025-01-03", 31),
            game("A3", "2025-01-05", 18),
        ];
        replace_table(&mut conn, "games", &rows).unwrap();
        let recent = load_recent_games(&conn, "games", 2).unwrap();
        let ids = recent.iter().map(|g| g.game_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["A3", "A2"]);
    }
}
