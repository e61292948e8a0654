use anyhow::{Context, Result};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use shotlog::config::PipelineConfig;
use shotlog::pipeline::{self, RunOutcome};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = PipelineConfig::from_env();
    let outcome = pipeline::run(&config).with_context(|| {
        format!(
            "game log ingest failed for player {} ({})",
            config.player_id, config.season
        )
    })?;

    match outcome {
        RunOutcome::EmptyBatch => {
            println!(
                "No games found for player {} ({}). Skipping save.",
                config.player_id, config.season
            );
        }
        RunOutcome::Completed(summary) => {
            println!("Game log ingest complete");
            println!("DB: {}", config.db_path.display());
            println!("Table: {}", summary.table);
            println!("Fetched: {}", summary.fetched);
            println!(
                "New games: {}  Updated games: {}",
                summary.inserted, summary.superseded
            );
            println!("Stored games: {}", summary.stored);
            println!("Snapshot: {}", summary.csv_path.display());
            println!(
                "Last updated: {}",
                shotlog::stamp::format_stamp(summary.last_updated)
            );
        }
    }

    Ok(())
}
