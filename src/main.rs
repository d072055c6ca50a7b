// src/main.rs
use bid_pilot::config::EngineConfig;
use bid_pilot::connectors::journal::JsonlJournal;
use bid_pilot::connectors::snapshot::JsonSnapshotSource;
use bid_pilot::core::cooldown::InMemoryCooldownLedger;
use bid_pilot::core::engine::DecisionEngine;
use bid_pilot::core::runner::CampaignRunner;
use bid_pilot::types::ItemOutcome;
use chrono::Utc;
use dotenvy::dotenv;
use std::env;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::MakeWriterExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // 1. Load Configuration
    let settings = env::var("BIDPILOT_SETTINGS").unwrap_or_else(|_| "Settings".to_string());
    let config = EngineConfig::load(&settings)?;

    // 2. Logging: non-blocking daily file plus stdout
    let file_appender = tracing_appender::rolling::daily(&config.runner.log_dir, "bid_pilot.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(file_writer.and(std::io::stdout))
        .with_ansi(false)
        .init();

    println!("========================================");
    println!("       BID PILOT - v{}", env!("CARGO_PKG_VERSION"));
    println!("========================================");
    println!("Snapshot: {}", config.runner.snapshot_path);
    println!("Journal:  {}", config.runner.journal_path);
    println!("========================================");

    // 3. Initialize Components
    let source = Arc::new(JsonSnapshotSource::load(&config.runner.snapshot_path).await?);
    let sink = Arc::new(JsonlJournal::new(config.runner.journal_path.clone()));
    // placement changes from earlier runs keep their cooldown
    let ledger = Arc::new(InMemoryCooldownLedger::from_history(
        sink.cooldown_history().await?,
    )?);
    let engine = Arc::new(DecisionEngine::new(config));

    // 4. Run
    let runner = CampaignRunner::new(engine, source, sink, ledger);
    let report = runner.run(Utc::now()).await?;

    for outcome in &report.campaigns {
        match outcome {
            ItemOutcome::Applied { id, decision } => println!(
                "{id}: {} applied, {} skipped, {} errors",
                decision.applied, decision.skipped, decision.errors
            ),
            ItemOutcome::Skipped { id, reason } => println!("{id}: skipped ({reason})"),
            ItemOutcome::Error { id, message, .. } => eprintln!("{id}: FAILED ({message})"),
        }
    }
    println!(
        "Run {}: {} applied, {} skipped, {} errors",
        report.run_id, report.summary.applied, report.summary.skipped, report.summary.errors
    );

    Ok(())
}
