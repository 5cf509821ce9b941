mod cli;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = cli::parse_args();
    let config = cardsight_config::load_config(&args.config_path)
        .with_context(|| format!("failed to load config {}", args.config_path.display()))?;

    let (start, end) = match args.mode {
        cli::RunMode::Range { start, end } => (start, end),
        cli::RunMode::All => {
            let dates = cardsight_rollup_core::available_raw_dates(&config.rollup)?;
            match (dates.first(), dates.last()) {
                (Some(first), Some(last)) => (*first, *last),
                _ => {
                    info!("no raw day files found; nothing to roll up");
                    return Ok(());
                }
            }
        }
    };

    let summary = cardsight_rollup_core::build_rollup_range(&config.rollup, start, end).await?;
    info!(
        "rollup complete: {} days written, {} days skipped",
        summary.days_written, summary.days_skipped
    );

    Ok(())
}
