use std::fs;
use std::io;
use std::path::Path;

use chrono::NaiveDateTime;

pub const LAST_UPDATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_stamp(at: NaiveDateTime) -> String {
    at.format(LAST_UPDATED_FORMAT).to_string()
}

/// Overwrites the marker with a single `YYYY-MM-DD HH:MM:SS` line.
pub fn write_last_updated(path: &Path, at: NaiveDateTime) -> io::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let tmp = path.with_extension("txt.tmp");
    fs::write(&tmp, format_stamp(at))?;
    fs::rename(&tmp, path)
}

/// `None` when no run has finished yet or the marker is unreadable as a stamp.
pub fn read_last_updated(path: &Path) -> io::Result<Option<NaiveDateTime>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    Ok(NaiveDateTime::parse_from_str(raw.trim(), LAST_UPDATED_FORMAT).ok())
}
