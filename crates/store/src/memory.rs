//! In-memory `CaseStore` backend.
//!
//! Backs the server binary and the test suites. Transactions clone the
//! committed world, stage mutations on the clone, and publish it wholesale
//! on commit. A single async writer lock serializes transactions, which
//! over-fulfils the per-case isolation the engine requires; readers see
//! the last committed world at all times.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use docket_core::clock;
use docket_core::model::{
    Activation, Attachment, Case, Circulation, DecisionRecord, Document, HistoryEntry, Message,
    Service, WorkItem,
};

use crate::error::StoreError;
use crate::traits::CaseStore;

/// Everything the backend holds, cloned per transaction.
#[derive(Debug, Default, Clone)]
struct World {
    cases: BTreeMap<String, Case>,
    work_items: BTreeMap<String, WorkItem>,
    circulations: BTreeMap<String, Circulation>,
    activations: BTreeMap<String, Activation>,
    messages: Vec<Message>,
    history: Vec<HistoryEntry>,
    services: BTreeMap<String, Service>,
    documents: BTreeMap<String, Document>,
    attachments: BTreeMap<String, Attachment>,
    decisions: Vec<DecisionRecord>,
    claims: BTreeMap<String, Vec<serde_json::Value>>,
    id_counters: BTreeMap<String, u64>,
    next_message_id: u64,
    next_history_id: u64,
}

/// An in-progress unit of work: a staged world plus the writer lock.
pub struct MemoryTxn {
    staged: World,
    _writer: OwnedMutexGuard<()>,
}

/// The in-memory backend.
pub struct MemoryStore {
    committed: RwLock<World>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            committed: RwLock::new(World::default()),
            writer: Arc::new(Mutex::new(())),
        }
    }

    fn world(&self) -> Result<RwLockReadGuard<'_, World>, StoreError> {
        self.committed
            .read()
            .map_err(|_| StoreError::Backend("world lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Creation order for record lists: timestamp, then id as tie-breaker.
fn by_creation<T, F: Fn(&T) -> (String, String)>(items: &mut [T], key: F) {
    items.sort_by_key(key);
}

fn insert_unique<V>(
    map: &mut BTreeMap<String, V>,
    kind: &'static str,
    id: String,
    value: V,
) -> Result<(), StoreError> {
    if map.contains_key(&id) {
        return Err(StoreError::duplicate(kind, id));
    }
    map.insert(id, value);
    Ok(())
}

fn update_existing<V>(
    map: &mut BTreeMap<String, V>,
    kind: &'static str,
    id: String,
    value: V,
) -> Result<(), StoreError> {
    if !map.contains_key(&id) {
        return Err(StoreError::not_found(kind, id));
    }
    map.insert(id, value);
    Ok(())
}

#[async_trait]
impl CaseStore for MemoryStore {
    type Txn = MemoryTxn;

    async fn begin(&self) -> Result<Self::Txn, StoreError> {
        let writer = self.writer.clone().lock_owned().await;
        let staged = self.world()?.clone();
        Ok(MemoryTxn {
            staged,
            _writer: writer,
        })
    }

    async fn commit(&self, txn: Self::Txn) -> Result<(), StoreError> {
        let mut world = self
            .committed
            .write()
            .map_err(|_| StoreError::Backend("world lock poisoned".to_string()))?;
        *world = txn.staged;
        Ok(())
    }

    async fn abort(&self, txn: Self::Txn) -> Result<(), StoreError> {
        drop(txn);
        Ok(())
    }

    async fn mint_id(&self, txn: &mut Self::Txn, kind: &str) -> Result<String, StoreError> {
        let counter = txn.staged.id_counters.entry(kind.to_string()).or_insert(0);
        *counter += 1;
        Ok(format!("{}-{}", kind, counter))
    }

    // ── Cases ────────────────────────────────────────────────────────

    async fn insert_case(&self, txn: &mut Self::Txn, case: Case) -> Result<(), StoreError> {
        insert_unique(&mut txn.staged.cases, "case", case.id.clone(), case)
    }

    async fn update_case(&self, txn: &mut Self::Txn, case: Case) -> Result<(), StoreError> {
        update_existing(&mut txn.staged.cases, "case", case.id.clone(), case)
    }

    async fn get_case_for_update(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
    ) -> Result<Case, StoreError> {
        txn.staged
            .cases
            .get(case_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("case", case_id))
    }

    async fn get_case(&self, case_id: &str) -> Result<Case, StoreError> {
        self.world()?
            .cases
            .get(case_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("case", case_id))
    }

    async fn list_cases(&self) -> Result<Vec<Case>, StoreError> {
        let mut cases: Vec<Case> = self.world()?.cases.values().cloned().collect();
        by_creation(&mut cases, |c| (c.created_at.clone(), c.id.clone()));
        Ok(cases)
    }

    async fn find_case_by_document(
        &self,
        document_family: &str,
    ) -> Result<Option<Case>, StoreError> {
        Ok(self
            .world()?
            .cases
            .values()
            .find(|c| c.document_id == document_family)
            .cloned())
    }

    // ── Work items ───────────────────────────────────────────────────

    async fn insert_work_item(
        &self,
        txn: &mut Self::Txn,
        item: WorkItem,
    ) -> Result<(), StoreError> {
        insert_unique(&mut txn.staged.work_items, "work item", item.id.clone(), item)
    }

    async fn update_work_item(
        &self,
        txn: &mut Self::Txn,
        item: WorkItem,
    ) -> Result<(), StoreError> {
        update_existing(&mut txn.staged.work_items, "work item", item.id.clone(), item)
    }

    async fn get_work_item_for_update(
        &self,
        txn: &mut Self::Txn,
        item_id: &str,
    ) -> Result<WorkItem, StoreError> {
        txn.staged
            .work_items
            .get(item_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("work item", item_id))
    }

    async fn work_items_for_case(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
    ) -> Result<Vec<WorkItem>, StoreError> {
        let mut items: Vec<WorkItem> = txn
            .staged
            .work_items
            .values()
            .filter(|w| w.case_id == case_id)
            .cloned()
            .collect();
        by_creation(&mut items, |w| (w.created_at.clone(), w.id.clone()));
        Ok(items)
    }

    async fn list_work_items(&self, case_id: &str) -> Result<Vec<WorkItem>, StoreError> {
        let mut items: Vec<WorkItem> = self
            .world()?
            .work_items
            .values()
            .filter(|w| w.case_id == case_id)
            .cloned()
            .collect();
        by_creation(&mut items, |w| (w.created_at.clone(), w.id.clone()));
        Ok(items)
    }

    // ── Circulations / activations ───────────────────────────────────

    async fn insert_circulation(
        &self,
        txn: &mut Self::Txn,
        circulation: Circulation,
    ) -> Result<(), StoreError> {
        insert_unique(
            &mut txn.staged.circulations,
            "circulation",
            circulation.id.clone(),
            circulation,
        )
    }

    async fn update_circulation(
        &self,
        txn: &mut Self::Txn,
        circulation: Circulation,
    ) -> Result<(), StoreError> {
        update_existing(
            &mut txn.staged.circulations,
            "circulation",
            circulation.id.clone(),
            circulation,
        )
    }

    async fn delete_circulation(
        &self,
        txn: &mut Self::Txn,
        circulation_id: &str,
    ) -> Result<(), StoreError> {
        txn.staged
            .circulations
            .remove(circulation_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("circulation", circulation_id))
    }

    async fn circulations_for_case(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
    ) -> Result<Vec<Circulation>, StoreError> {
        let mut rows: Vec<Circulation> = txn
            .staged
            .circulations
            .values()
            .filter(|c| c.case_id == case_id)
            .cloned()
            .collect();
        by_creation(&mut rows, |c| (c.created_at.clone(), c.id.clone()));
        Ok(rows)
    }

    async fn list_circulations(&self, case_id: &str) -> Result<Vec<Circulation>, StoreError> {
        let mut rows: Vec<Circulation> = self
            .world()?
            .circulations
            .values()
            .filter(|c| c.case_id == case_id)
            .cloned()
            .collect();
        by_creation(&mut rows, |c| (c.created_at.clone(), c.id.clone()));
        Ok(rows)
    }

    async fn insert_activation(
        &self,
        txn: &mut Self::Txn,
        activation: Activation,
    ) -> Result<(), StoreError> {
        insert_unique(
            &mut txn.staged.activations,
            "activation",
            activation.id.clone(),
            activation,
        )
    }

    async fn update_activation(
        &self,
        txn: &mut Self::Txn,
        activation: Activation,
    ) -> Result<(), StoreError> {
        update_existing(
            &mut txn.staged.activations,
            "activation",
            activation.id.clone(),
            activation,
        )
    }

    async fn get_activation_for_update(
        &self,
        txn: &mut Self::Txn,
        activation_id: &str,
    ) -> Result<Activation, StoreError> {
        txn.staged
            .activations
            .get(activation_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("activation", activation_id))
    }

    async fn activations_for_circulation(
        &self,
        txn: &mut Self::Txn,
        circulation_id: &str,
    ) -> Result<Vec<Activation>, StoreError> {
        let mut rows: Vec<Activation> = txn
            .staged
            .activations
            .values()
            .filter(|a| a.circulation_id == circulation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn activations_for_service(
        &self,
        service_id: &str,
    ) -> Result<Vec<Activation>, StoreError> {
        let mut rows: Vec<Activation> = self
            .world()?
            .activations
            .values()
            .filter(|a| a.service_id == service_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    // ── Protocol inbox ───────────────────────────────────────────────

    async fn append_message(
        &self,
        txn: &mut Self::Txn,
        receiver_id: &str,
        body: String,
    ) -> Result<Message, StoreError> {
        txn.staged.next_message_id += 1;
        let message = Message {
            id: txn.staged.next_message_id,
            receiver_id: receiver_id.to_string(),
            body,
            created_at: clock::now_rfc3339(),
        };
        txn.staged.messages.push(message.clone());
        Ok(message)
    }

    async fn next_message(
        &self,
        receiver_id: &str,
        last: Option<u64>,
    ) -> Result<Message, StoreError> {
        let world = self.world()?;
        let inbox: Vec<&Message> = world
            .messages
            .iter()
            .filter(|m| m.receiver_id == receiver_id)
            .collect();
        match last {
            None => inbox
                .first()
                .map(|m| (*m).clone())
                .ok_or_else(|| StoreError::not_found("message", receiver_id)),
            Some(last_id) => {
                let position = inbox
                    .iter()
                    .position(|m| m.id == last_id)
                    .ok_or_else(|| StoreError::not_found("message", last_id.to_string()))?;
                inbox
                    .get(position + 1)
                    .map(|m| (*m).clone())
                    .ok_or_else(|| {
                        StoreError::not_found("message", format!("after {}", last_id))
                    })
            }
        }
    }

    async fn list_messages(&self, receiver_id: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .world()?
            .messages
            .iter()
            .filter(|m| m.receiver_id == receiver_id)
            .cloned()
            .collect())
    }

    // ── Audit trail ──────────────────────────────────────────────────

    async fn append_history(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
        actor: &str,
        service_id: Option<&str>,
        text: &str,
    ) -> Result<(), StoreError> {
        txn.staged.next_history_id += 1;
        txn.staged.history.push(HistoryEntry {
            id: txn.staged.next_history_id,
            case_id: case_id.to_string(),
            actor: actor.to_string(),
            service_id: service_id.map(str::to_owned),
            created_at: clock::now_rfc3339(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn history_for_case(&self, case_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .world()?
            .history
            .iter()
            .filter(|h| h.case_id == case_id)
            .cloned()
            .collect())
    }

    // ── Directory / supporting rows ──────────────────────────────────

    async fn insert_service(
        &self,
        txn: &mut Self::Txn,
        service: Service,
    ) -> Result<(), StoreError> {
        insert_unique(&mut txn.staged.services, "service", service.id.clone(), service)
    }

    async fn get_service(&self, service_id: &str) -> Result<Service, StoreError> {
        self.world()?
            .services
            .get(service_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("service", service_id))
    }

    async fn find_service_by_name(&self, name: &str) -> Result<Option<Service>, StoreError> {
        Ok(self
            .world()?
            .services
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn insert_document(
        &self,
        txn: &mut Self::Txn,
        document: Document,
    ) -> Result<(), StoreError> {
        insert_unique(
            &mut txn.staged.documents,
            "document",
            document.id.clone(),
            document,
        )
    }

    async fn get_document(&self, document_id: &str) -> Result<Document, StoreError> {
        self.world()?
            .documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("document", document_id))
    }

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError> {
        Ok(self.world()?.documents.values().cloned().collect())
    }

    async fn insert_attachment(
        &self,
        txn: &mut Self::Txn,
        attachment: Attachment,
    ) -> Result<(), StoreError> {
        insert_unique(
            &mut txn.staged.attachments,
            "attachment",
            attachment.id.clone(),
            attachment,
        )
    }

    async fn get_attachment_for_update(
        &self,
        txn: &mut Self::Txn,
        attachment_id: &str,
    ) -> Result<Attachment, StoreError> {
        txn.staged
            .attachments
            .get(attachment_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("attachment", attachment_id))
    }

    async fn update_attachment(
        &self,
        txn: &mut Self::Txn,
        attachment: Attachment,
    ) -> Result<(), StoreError> {
        update_existing(
            &mut txn.staged.attachments,
            "attachment",
            attachment.id.clone(),
            attachment,
        )
    }

    async fn attachments_for_case(&self, case_id: &str) -> Result<Vec<Attachment>, StoreError> {
        Ok(self
            .world()?
            .attachments
            .values()
            .filter(|a| a.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn insert_decision(
        &self,
        txn: &mut Self::Txn,
        decision: DecisionRecord,
    ) -> Result<(), StoreError> {
        txn.staged.decisions.push(decision);
        Ok(())
    }

    async fn decisions_for_case(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
    ) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(txn
            .staged
            .decisions
            .iter()
            .filter(|d| d.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn list_decisions(&self, case_id: &str) -> Result<Vec<DecisionRecord>, StoreError> {
        Ok(self
            .world()?
            .decisions
            .iter()
            .filter(|d| d.case_id == case_id)
            .cloned()
            .collect())
    }

    async fn put_claim_rows(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
        rows: Vec<serde_json::Value>,
    ) -> Result<(), StoreError> {
        txn.staged.claims.insert(case_id.to_string(), rows);
        Ok(())
    }

    async fn claim_rows(&self, case_id: &str) -> Result<Vec<serde_json::Value>, StoreError> {
        Ok(self.world()?.claims.get(case_id).cloned().unwrap_or_default())
    }
}
