//! fieldlog: inspect and synchronize a local field dataset.
//!
//! Usage:
//!   fieldlog status
//!   fieldlog report --project <id>
//!   fieldlog sync --direction push

use clap::Parser;
use fieldlog::cli::{Cli, Command};
use fieldlog::config::EngineConfig;
use fieldlog::remote::{RemoteClient, StaticToken};
use fieldlog::storage::DirStore;
use fieldlog::{EngineEvent, SyncEngine};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    // A missing credentials file means offline; local operations still work.
    let token = std::fs::read_to_string(&config.credentials_path)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());

    let store = Arc::new(DirStore::new(&config.data_dir));
    let remote = Arc::new(RemoteClient::new(
        &config.remote,
        Arc::new(StaticToken(token)),
    ));
    let engine = Arc::new(SyncEngine::load(store, remote).await?);

    match args.command {
        Command::Status => {
            let doc = engine.document().await;
            let status = engine.all_projects_sync_status().await?;
            for project in &doc.projects {
                let synced = status.get(&project.id).copied().unwrap_or(false);
                let marker = if synced { "synced" } else { "out of sync" };
                println!("{}  {}  [{}]", project.id, project.name, marker);
            }
        }
        Command::Report { project } => {
            let records = engine.generate_sync_report(project.as_deref()).await?;
            if records.is_empty() {
                println!("fully synchronized");
            }
            for record in records {
                let state = match (record.is_local, record.is_drive) {
                    (true, false) => "local only",
                    (false, true) => "remote only",
                    (true, true) => "both",
                    (false, false) => "missing",
                };
                println!("{}  [{}]", record.name, state);
            }
        }
        Command::Sync { direction } => {
            let items = engine.generate_sync_report(None).await?;
            if items.is_empty() {
                println!("nothing to transfer");
                return Ok(());
            }

            let mut events = engine.subscribe();
            let printer = tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    if let EngineEvent::SyncProgress {
                        percent,
                        current,
                        failed,
                        ..
                    } = event
                    {
                        println!("{:>3}%  {}  ({} failed)", percent, current, failed);
                    }
                }
            });

            let summary = engine.run_sync_batch(items, direction.into()).await?;
            printer.abort();
            println!(
                "{}: {} transferred, {} failed",
                summary.direction, summary.succeeded, summary.failed
            );
        }
    }

    Ok(())
}
