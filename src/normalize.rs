use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fetch::RawBatch;

/// One game played by the tracked player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: String,
    pub game_date: NaiveDate,
    pub matchup: Option<String>,
    pub result: Option<GameResult>,
    pub minutes: Option<f64>,
    pub field_goals_made: Option<i64>,
    pub field_goals_attempted: Option<i64>,
    pub three_pointers_made: Option<i64>,
    pub three_pointers_attempted: Option<i64>,
    pub free_throws_made: Option<i64>,
    pub free_throws_attempted: Option<i64>,
    pub points: Option<i64>,
    pub plus_minus: Option<i64>,
    pub season: Option<String>,
    pub field_goal_pct: f64,
    pub three_point_pct: f64,
    pub free_throw_pct: f64,
}

impl GameRecord {
    /// Recomputes the three percentage columns from the counting stats.
    pub fn derive_percentages(&mut self) {
        self.field_goal_pct = pct(self.field_goals_made, self.field_goals_attempted);
        self.three_point_pct = pct(self.three_pointers_made, self.three_pointers_attempted);
        self.free_throw_pct = pct(self.free_throws_made, self.free_throws_attempted);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    #[serde(rename = "W")]
    Win,
    #[serde(rename = "L")]
    Loss,
}

impl GameResult {
    pub fn as_str(self) -> &'static str {
        match self {
            GameResult::Win => "W",
            GameResult::Loss => "L",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "W" | "WIN" => Some(GameResult::Win),
            "L" | "LOSS" => Some(GameResult::Loss),
            _ => None,
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("row {row}: missing game id")]
    MissingGameId { row: usize },

    #[error("game {game_id}: unparsable date {value:?}")]
    InvalidDate { game_id: String, value: String },

    #[error("game {game_id}: column {column} has non-numeric value {value:?}")]
    InvalidNumber {
        game_id: String,
        column: &'static str,
        value: String,
    },

    #[error("game {game_id}: unknown result {value:?}")]
    InvalidResult { game_id: String, value: String },
}

/// made / attempted, pinned to [0, 1]; no attempts (or unknown counts) is 0.0.
pub fn pct(made: Option<i64>, attempted: Option<i64>) -> f64 {
    let made = made.unwrap_or(0);
    let attempted = attempted.unwrap_or(0);
    if attempted <= 0 || made <= 0 {
        return 0.0;
    }
    (made as f64 / attempted as f64).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    GameId,
    GameDate,
    Matchup,
    Result,
    Minutes,
    Fgm,
    Fga,
    Fg3m,
    Fg3a,
    Ftm,
    Fta,
    Points,
    PlusMinus,
    Season,
}

static NULL: Value = Value::Null;

// Accepted source names per field, lower-case, first match wins.
const FIELDS: &[(Field, &str, &[&str])] = &[
    (Field::GameId, "game_id", &["game_id", "gameid"]),
    (Field::GameDate, "game_date", &["game_date", "date"]),
    (Field::Matchup, "matchup", &["matchup"]),
    (Field::Result, "result", &["wl", "result"]),
    (Field::Minutes, "minutes", &["min", "minutes"]),
    (Field::Fgm, "field_goals_made", &["fgm", "field_goals_made"]),
    (Field::Fga, "field_goals_attempted", &["fga", "field_goals_attempted"]),
    (Field::Fg3m, "three_pointers_made", &["fg3m", "three_pointers_made"]),
    (Field::Fg3a, "three_pointers_attempted", &["fg3a", "three_pointers_attempted"]),
    (Field::Ftm, "free_throws_made", &["ftm", "free_throws_made"]),
    (Field::Fta, "free_throws_attempted", &["fta", "free_throws_attempted"]),
    (Field::Points, "points", &["pts", "points"]),
    (Field::PlusMinus, "plus_minus", &["plus_minus"]),
    (Field::Season, "season", &["season", "season_id"]),
];

/// Source column index for each schema field, `None` when the batch lacks it.
struct ColumnMap {
    slots: Vec<(Field, &'static str, Option<usize>)>,
}

impl ColumnMap {
    fn reconcile(columns: &[String]) -> Self {
        let lowered = columns
            .iter()
            .map(|c| c.trim().to_ascii_lowercase())
            .collect::<Vec<_>>();

        let slots = FIELDS
            .iter()
            .map(|(field, name, aliases)| {
                let idx = aliases
                    .iter()
                    .find_map(|alias| lowered.iter().position(|c| c == alias));
                if idx.is_none() {
                    warn!(column = *name, "column missing from source; filling with null");
                }
                (*field, *name, idx)
            })
            .collect::<Vec<_>>();

        for (idx, original) in columns.iter().enumerate() {
            if !slots.iter().any(|(_, _, slot)| *slot == Some(idx)) {
                debug!(column = %original, "dropping unmapped source column");
            }
        }

        Self { slots }
    }

    fn cell<'a>(&self, row: &'a [Value], field: Field) -> (&'static str, &'a Value) {
        for (f, name, idx) in &self.slots {
            if *f == field {
                let value = idx.and_then(|i| row.get(i)).unwrap_or(&NULL);
                return (*name, value);
            }
        }
        ("", &NULL)
    }
}

pub fn normalize(batch: &RawBatch) -> Result<Vec<GameRecord>, NormalizeError> {
    let map = ColumnMap::reconcile(&batch.columns);
    let mut out = Vec::with_capacity(batch.rows.len());
    for (idx, row) in batch.rows.iter().enumerate() {
        out.push(normalize_row(&map, row, idx)?);
    }
    // Stable: duplicates inside one batch keep their arrival order.
    out.sort_by(|a, b| {
        a.game_date
            .cmp(&b.game_date)
            .then_with(|| a.game_id.cmp(&b.game_id))
    });
    Ok(out)
}

fn normalize_row(map: &ColumnMap, row: &[Value], idx: usize) -> Result<GameRecord, NormalizeError> {
    let game_id = text(map.cell(row, Field::GameId).1)
        .ok_or(NormalizeError::MissingGameId { row: idx })?;

    let date_cell = map.cell(row, Field::GameDate).1;
    let game_date = text(date_cell)
        .as_deref()
        .and_then(parse_game_date)
        .ok_or_else(|| NormalizeError::InvalidDate {
            game_id: game_id.clone(),
            value: display_cell(date_cell),
        })?;

    let result = match text(map.cell(row, Field::Result).1) {
        None => None,
        Some(raw) => Some(GameResult::parse(&raw).ok_or_else(|| {
            NormalizeError::InvalidResult {
                game_id: game_id.clone(),
                value: raw,
            }
        })?),
    };

    let int = |field: Field| -> Result<Option<i64>, NormalizeError> {
        let (column, value) = map.cell(row, field);
        int_cell(value).map_err(|_| NormalizeError::InvalidNumber {
            game_id: game_id.clone(),
            column,
            value: display_cell(value),
        })
    };

    let (minutes_col, minutes_value) = map.cell(row, Field::Minutes);
    let minutes = minutes_cell(minutes_value).map_err(|_| NormalizeError::InvalidNumber {
        game_id: game_id.clone(),
        column: minutes_col,
        value: display_cell(minutes_value),
    })?;

    let mut record = GameRecord {
        game_id: game_id.clone(),
        game_date,
        matchup: text(map.cell(row, Field::Matchup).1),
        result,
        minutes,
        field_goals_made: int(Field::Fgm)?,
        field_goals_attempted: int(Field::Fga)?,
        three_pointers_made: int(Field::Fg3m)?,
        three_pointers_attempted: int(Field::Fg3a)?,
        free_throws_made: int(Field::Ftm)?,
        free_throws_attempted: int(Field::Fta)?,
        points: int(Field::Points)?,
        plus_minus: int(Field::PlusMinus)?,
        season: text(map.cell(row, Field::Season).1),
        field_goal_pct: 0.0,
        three_point_pct: 0.0,
        free_throw_pct: 0.0,
    };
    record.derive_percentages();
    Ok(record)
}

/// Accepts ISO dates (with or without a time part), the stats API's
/// `OCT 22, 2024`, and `10/22/2024`.
pub fn parse_game_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Some(head) = s.get(..10)
        && matches!(s.as_bytes().get(10).copied(), Some(b'T' | b' '))
        && let Ok(d) = NaiveDate::parse_from_str(head, "%Y-%m-%d")
    {
        return Some(d);
    }
    for fmt in ["%b %d, %Y", "%B %d, %Y", "%m/%d/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    None
}

fn text(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() { None } else { Some(s) }
}

fn int_cell(v: &Value) -> Result<Option<i64>, ()> {
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f.fract() == 0.0 => Ok(Some(f as i64)),
                _ => Err(()),
            }
        }
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            t.parse::<i64>().map(Some).map_err(|_| ())
        }
        _ => Err(()),
    }
}

fn minutes_cell(v: &Value) -> Result<Option<f64>, ()> {
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(Some).ok_or(()),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Ok(None);
            }
            if let Some((mins, secs)) = t.split_once(':') {
                let mins = mins.trim().parse::<u32>().map_err(|_| ())?;
                let secs = secs.trim().parse::<u32>().map_err(|_| ())?;
                return Ok(Some(f64::from(mins) + f64::from(secs) / 60.0));
            }
            t.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Some)
                .ok_or(())
        }
        _ => Err(()),
    }
}

fn display_cell(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
