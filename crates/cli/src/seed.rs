//! JSON fixtures for the in-memory backend.
//!
//! `docket serve` and `docket migrate-circulations` accept fixture files
//! so a deployment without a durable backend has dossiers to work on.
//! Every list is optional; each file loads in one store unit of work.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use docket_core::model::{
    Activation, Attachment, Case, Circulation, DecisionRecord, Document, Service, WorkItem,
};
use docket_store::{CaseStore, MemoryStore};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SeedFile {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub documents: Vec<Document>,
    #[serde(default)]
    pub cases: Vec<Case>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub circulations: Vec<Circulation>,
    #[serde(default)]
    pub activations: Vec<Activation>,
    #[serde(default)]
    pub work_items: Vec<WorkItem>,
    #[serde(default)]
    pub decisions: Vec<DecisionRecord>,
}

/// Parse one fixture file and insert its rows.
pub(crate) async fn load_into(
    store: &MemoryStore,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let seed: SeedFile = serde_json::from_str(&raw)
        .map_err(|e| format!("cannot parse {}: {}", path.display(), e))?;
    let case_count = seed.cases.len();

    let mut txn = store.begin().await?;
    for service in seed.services {
        store.insert_service(&mut txn, service).await?;
    }
    for document in seed.documents {
        store.insert_document(&mut txn, document).await?;
    }
    for case in seed.cases {
        store.insert_case(&mut txn, case).await?;
    }
    for attachment in seed.attachments {
        store.insert_attachment(&mut txn, attachment).await?;
    }
    for circulation in seed.circulations {
        store.insert_circulation(&mut txn, circulation).await?;
    }
    for activation in seed.activations {
        store.insert_activation(&mut txn, activation).await?;
    }
    for work_item in seed.work_items {
        store.insert_work_item(&mut txn, work_item).await?;
    }
    for decision in seed.decisions {
        store.insert_decision(&mut txn, decision).await?;
    }
    store.commit(txn).await?;

    info!(path = %path.display(), cases = case_count, "seed fixture loaded");
    Ok(())
}
