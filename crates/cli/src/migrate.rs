//! `docket migrate-circulations` -- bulk alignment run.
//!
//! Loads fixtures into the in-memory backend, runs the batch and prints
//! the report as JSON. A failed batch exits nonzero so scripted runs
//! stop.

use std::path::PathBuf;
use std::process;

use docket_core::{labels, Actor, BatchFailureMode, EngineConfig};
use docket_engine::{migrate_circulations, DynamicTaskRegistry, MigrationOptions};
use docket_store::MemoryStore;

use crate::seed;

pub(crate) async fn cmd_migrate(
    config: EngineConfig,
    seeds: Vec<PathBuf>,
    cases: Vec<String>,
    rollback: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = MemoryStore::new();
    for path in &seeds {
        seed::load_into(&store, path).await?;
    }

    let registry = DynamicTaskRegistry::standard();
    let actor = Actor {
        username: "migration".to_string(),
        role: labels::ROLE_SUPPORT.to_string(),
        service_id: None,
        groups: Vec::new(),
        token: None,
    };
    let mut options = MigrationOptions::from_config(&config);
    if !cases.is_empty() {
        options.case_ids = Some(cases);
    }
    if rollback {
        options.failure_mode = BatchFailureMode::RollbackBatch;
    }

    let report = migrate_circulations(&store, &config, &registry, &actor, &options).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.success {
        process::exit(2);
    }
    Ok(())
}
