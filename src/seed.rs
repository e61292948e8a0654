use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("read seed file")]
    Csv(#[from] csv::Error),

    #[error("seed file has no data row")]
    Empty,

    #[error("seed value {0:?} is not an integer")]
    NotInteger(String),
}

/// Career makes before the tracked season: first column of the first data row.
pub fn read_seed(path: &Path) -> Result<i64, SeedError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;
    let record = reader.records().next().ok_or(SeedError::Empty)??;
    let raw = record.get(0).ok_or(SeedError::Empty)?;
    parse_seed_value(raw)
}

fn parse_seed_value(raw: &str) -> Result<i64, SeedError> {
    let cleaned = raw.replace(',', "");
    if let Ok(n) = cleaned.parse::<i64>() {
        return Ok(n);
    }
    // Spreadsheet exports like to write "3747.0".
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
        _ => Err(SeedError::NotInteger(raw.to_string())),
    }
}
