//! # Queue Control Tool
//!
//! Operator tool for inspecting and exporting the durable sync queue.
//!
//! ## Usage
//! ```bash
//! # Per-status counts
//! cargo run -p biolink-store --bin queuectl -- --db ./queue.db counts
//!
//! # All items, one line each
//! cargo run -p biolink-store --bin queuectl -- --db ./queue.db list
//!
//! # Delimited export for spreadsheet import (comma by default)
//! cargo run -p biolink-store --bin queuectl -- --db ./queue.db export > queue.csv
//! ```

use std::env;
use std::process::ExitCode;

use biolink_core::SyncStatus;
use biolink_store::{queue_to_delimited, Store, StoreConfig};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = "./biolink-queue.db".to_string();
    let mut command = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" => {
                if i + 1 >= args.len() {
                    eprintln!("--db requires a path");
                    return ExitCode::FAILURE;
                }
                db_path = args[i + 1].clone();
                i += 2;
            }
            cmd @ ("counts" | "list" | "export") => {
                command = Some(cmd.to_string());
                i += 1;
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Usage: queuectl [--db <path>] <counts|list|export>");
                return ExitCode::FAILURE;
            }
        }
    }

    let Some(command) = command else {
        eprintln!("Usage: queuectl [--db <path>] <counts|list|export>");
        return ExitCode::FAILURE;
    };

    let store = match Store::open(StoreConfig::new(&db_path)).await {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to open store at {db_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let queue = store.queue();

    let result = match command.as_str() {
        "counts" => run_counts(&queue).await,
        "list" => run_list(&queue).await,
        "export" => run_export(&queue).await,
        _ => unreachable!(),
    };

    store.close().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("queuectl {command} failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_counts(
    queue: &biolink_store::SyncQueueRepository,
) -> biolink_store::StoreResult<()> {
    println!("total: {}", queue.count().await?);
    for status in [
        SyncStatus::Pending,
        SyncStatus::Syncing,
        SyncStatus::Synced,
        SyncStatus::Failed,
        SyncStatus::Conflict,
    ] {
        println!("{status}: {}", queue.count_by_status(status).await?);
    }
    Ok(())
}

async fn run_list(queue: &biolink_store::SyncQueueRepository) -> biolink_store::StoreResult<()> {
    for item in queue.get_all().await? {
        println!(
            "{}  {:<14} {:<9} attempts={} created={}",
            item.id,
            item.kind.to_string(),
            item.status.to_string(),
            item.attempts,
            item.created_at.to_rfc3339()
        );
    }
    Ok(())
}

async fn run_export(queue: &biolink_store::SyncQueueRepository) -> biolink_store::StoreResult<()> {
    let items = queue.get_all().await?;
    print!("{}", queue_to_delimited(&items, ','));
    Ok(())
}
