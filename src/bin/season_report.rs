use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use shotlog::config::PipelineConfig;
use shotlog::report::{recent_games, season_summary};
use shotlog::seed::read_seed;
use shotlog::stamp::{format_stamp, read_last_updated};
use shotlog::store::open_db_read_only;

const RECENT_GAMES: usize = 10;

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let config = PipelineConfig::from_env();
    if !config.db_path.exists() {
        println!("No database at {}; run shotlog first.", config.db_path.display());
        return Ok(());
    }
    let conn = open_db_read_only(&config.db_path)
        .with_context(|| format!("open sqlite db {}", config.db_path.display()))?;

    let summary = season_summary(&conn, &config.table).context("query season summary")?;
    let seed = match read_seed(&config.seed_path) {
        Ok(seed) => seed,
        Err(err) => {
            warn!(
                path = %config.seed_path.display(),
                error = &err as &(dyn std::error::Error + 'static),
                "seed unavailable; using 0"
            );
            0
        }
    };
    let last_updated = read_last_updated(&config.last_updated_path)
        .context("read last-updated marker")?
        .map(format_stamp)
        .unwrap_or_else(|| "never".to_string());

    println!("Season {} (player {})", config.season, config.player_id);
    println!("Last updated: {last_updated}");
    println!();
    println!("Games: {}", summary.games);
    println!("3PM: {}", summary.three_pointers_made);
    println!("3P%: {:.1}%", summary.three_point_pct() * 100.0);
    match summary.points_per_game {
        Some(ppg) => println!("PPG: {ppg:.1}"),
        None => println!("PPG: n/a"),
    }
    println!("Career 3PM: {}", summary.career_three_pointers(seed));
    println!("FG%: {:.1}%", summary.field_goal_pct() * 100.0);
    println!("FT%: {:.1}%", summary.free_throw_pct() * 100.0);

    let games = recent_games(&conn, &config.table, RECENT_GAMES).context("query recent games")?;
    if games.is_empty() {
        println!();
        println!("No games stored yet.");
        return Ok(());
    }
    println!();
    println!("Recent games:");
    for g in games {
        println!(
            "  {}  {:<12} {}  3PM {}/{}  PTS {}",
            g.game_date,
            g.matchup.as_deref().unwrap_or("-"),
            g.result.map(|r| r.as_str()).unwrap_or("-"),
            opt(g.three_pointers_made),
            opt(g.three_pointers_attempted),
            opt(g.points),
        );
    }

    Ok(())
}

fn opt(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}
