//! Read-only queries the dashboard runs against the season table.

use rusqlite::Connection;

use crate::normalize::{GameRecord, pct};
use crate::store::{self, StoreError, table_exists, validate_table_name};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeasonSummary {
    pub games: i64,
    pub field_goals_made: i64,
    pub field_goals_attempted: i64,
    pub three_pointers_made: i64,
    pub three_pointers_attempted: i64,
    pub free_throws_made: i64,
    pub free_throws_attempted: i64,
    /// Rounded to one decimal; `None` until a game with points is stored.
    pub points_per_game: Option<f64>,
}

impl SeasonSummary {
    pub fn field_goal_pct(&self) -> f64 {
        pct(Some(self.field_goals_made), Some(self.field_goals_attempted))
    }

    pub fn three_point_pct(&self) -> f64 {
        pct(Some(self.three_pointers_made), Some(self.three_pointers_attempted))
    }

    pub fn free_throw_pct(&self) -> f64 {
        pct(Some(self.free_throws_made), Some(self.free_throws_attempted))
    }

    pub fn career_three_pointers(&self, seed: i64) -> i64 {
        seed + self.three_pointers_made
    }
}

pub fn season_summary(conn: &Connection, table: &str) -> Result<SeasonSummary, StoreError> {
    validate_table_name(table)?;
    if !table_exists(conn, table)? {
        return Ok(SeasonSummary::default());
    }
    let sql = format!(
        r#"
        SELECT
            COUNT(*),
            COALESCE(SUM(field_goals_made), 0),
            COALESCE(SUM(field_goals_attempted), 0),
            COALESCE(SUM(three_pointers_made), 0),
            COALESCE(SUM(three_pointers_attempted), 0),
            COALESCE(SUM(free_throws_made), 0),
            COALESCE(SUM(free_throws_attempted), 0),
            ROUND(AVG(points), 1)
        FROM "{table}"
        "#
    );
    let summary = conn.query_row(&sql, [], |row| {
        Ok(SeasonSummary {
            games: row.get(0)?,
            field_goals_made: row.get(1)?,
            field_goals_attempted: row.get(2)?,
            three_pointers_made: row.get(3)?,
            three_pointers_attempted: row.get(4)?,
            free_throws_made: row.get(5)?,
            free_throws_attempted: row.get(6)?,
            points_per_game: row.get(7)?,
        })
    })?;
    Ok(summary)
}

pub fn recent_games(conn: &Connection, table: &str, limit: usize) -> Result<Vec<GameRecord>, StoreError> {
    store::load_recent_games(conn, table, limit)
}
