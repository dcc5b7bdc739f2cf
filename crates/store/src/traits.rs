use async_trait::async_trait;

use docket_core::model::{
    Activation, Attachment, Case, Circulation, DecisionRecord, Document, HistoryEntry, Message,
    Service, WorkItem,
};

use crate::error::StoreError;

/// The storage trait for workflow-engine backends.
///
/// A `CaseStore` implementation provides transactional storage for every
/// record of the engine: cases, work items, circulations, activations, the
/// protocol inbox, the audit trail and the supporting directory rows.
///
/// ## Transaction semantics
///
/// All mutating operations take `&mut Self::Txn`, a type representing an
/// in-progress unit of work. The lifecycle is:
///
/// 1. `begin()` — start a unit of work, returns a `Txn`
/// 2. Call mutating methods (and staged-view reads) with `&mut txn`
/// 3. `commit(txn)` — publish every staged mutation at once
///    OR `abort(txn)` — discard the unit of work
///
/// A `Txn` dropped without committing MUST leave committed state untouched.
/// Every workflow mutation that spans multiple records (a case transition
/// plus its work items plus a coupled message) runs inside one `Txn`;
/// partial application is never observable.
///
/// ## Read scopes
///
/// `*_for_update` reads and the list reads taking `&mut Self::Txn` observe
/// the transaction's own staged writes. Reads without a `Txn` parameter
/// observe the last committed state only.
///
/// ## Isolation assumption
///
/// The engine serializes concurrent completion attempts only as far as the
/// backend's unit-of-work isolation does. The in-memory backend holds one
/// global writer lock per transaction; SQL backends need at least
/// per-case serialization to uphold the same observable behavior.
#[async_trait]
pub trait CaseStore: Send + Sync + 'static {
    /// The unit-of-work type used by this backend. Must be `Send` to cross
    /// async task boundaries.
    type Txn: Send;

    // ── Unit-of-work lifecycle ───────────────────────────────────────

    /// Begin a new unit of work.
    async fn begin(&self) -> Result<Self::Txn, StoreError>;

    /// Commit a unit of work, publishing all staged mutations at once.
    async fn commit(&self, txn: Self::Txn) -> Result<(), StoreError>;

    /// Abort a unit of work, discarding all staged mutations.
    async fn abort(&self, txn: Self::Txn) -> Result<(), StoreError>;

    /// Mint a new row id with the given kind prefix, unique within this
    /// store. Minting is staged like any other mutation.
    async fn mint_id(&self, txn: &mut Self::Txn, kind: &str) -> Result<String, StoreError>;

    // ── Cases ────────────────────────────────────────────────────────

    async fn insert_case(&self, txn: &mut Self::Txn, case: Case) -> Result<(), StoreError>;

    /// Whole-row update. `RowNotFound` if the case does not exist.
    async fn update_case(&self, txn: &mut Self::Txn, case: Case) -> Result<(), StoreError>;

    /// Staged-view read of a case inside a unit of work.
    async fn get_case_for_update(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
    ) -> Result<Case, StoreError>;

    async fn get_case(&self, case_id: &str) -> Result<Case, StoreError>;

    async fn list_cases(&self) -> Result<Vec<Case>, StoreError>;

    /// The case whose root document belongs to the given document family,
    /// if any. Used by the remote-edit permission check.
    async fn find_case_by_document(
        &self,
        document_family: &str,
    ) -> Result<Option<Case>, StoreError>;

    // ── Work items ───────────────────────────────────────────────────

    async fn insert_work_item(&self, txn: &mut Self::Txn, item: WorkItem)
        -> Result<(), StoreError>;

    async fn update_work_item(&self, txn: &mut Self::Txn, item: WorkItem)
        -> Result<(), StoreError>;

    async fn get_work_item_for_update(
        &self,
        txn: &mut Self::Txn,
        item_id: &str,
    ) -> Result<WorkItem, StoreError>;

    /// Staged-view list of a case's work items, ordered by creation.
    async fn work_items_for_case(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
    ) -> Result<Vec<WorkItem>, StoreError>;

    /// Committed-state list of a case's work items, ordered by creation.
    async fn list_work_items(&self, case_id: &str) -> Result<Vec<WorkItem>, StoreError>;

    // ── Circulations / activations ───────────────────────────────────

    async fn insert_circulation(
        &self,
        txn: &mut Self::Txn,
        circulation: Circulation,
    ) -> Result<(), StoreError>;

    async fn update_circulation(
        &self,
        txn: &mut Self::Txn,
        circulation: Circulation,
    ) -> Result<(), StoreError>;

    /// Remove an emptied circulation row.
    async fn delete_circulation(
        &self,
        txn: &mut Self::Txn,
        circulation_id: &str,
    ) -> Result<(), StoreError>;

    /// Staged-view list of a case's circulations, ordered by creation.
    async fn circulations_for_case(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
    ) -> Result<Vec<Circulation>, StoreError>;

    /// Committed-state list of a case's circulations, ordered by creation.
    async fn list_circulations(&self, case_id: &str) -> Result<Vec<Circulation>, StoreError>;

    async fn insert_activation(
        &self,
        txn: &mut Self::Txn,
        activation: Activation,
    ) -> Result<(), StoreError>;

    async fn update_activation(
        &self,
        txn: &mut Self::Txn,
        activation: Activation,
    ) -> Result<(), StoreError>;

    async fn get_activation_for_update(
        &self,
        txn: &mut Self::Txn,
        activation_id: &str,
    ) -> Result<Activation, StoreError>;

    /// Staged-view list of a circulation's activations.
    async fn activations_for_circulation(
        &self,
        txn: &mut Self::Txn,
        circulation_id: &str,
    ) -> Result<Vec<Activation>, StoreError>;

    /// Committed-state list of every activation addressed to a service.
    async fn activations_for_service(
        &self,
        service_id: &str,
    ) -> Result<Vec<Activation>, StoreError>;

    // ── Protocol inbox ───────────────────────────────────────────────

    /// Append a message to a receiver's inbox; the store assigns the
    /// creation-ordered id and timestamp. Returns the stored message.
    async fn append_message(
        &self,
        txn: &mut Self::Txn,
        receiver_id: &str,
        body: String,
    ) -> Result<Message, StoreError>;

    /// Forward-poll a receiver's inbox.
    ///
    /// `last` absent: the receiver's oldest message. `last` present: the
    /// first message created after it. `RowNotFound` when `last` does not
    /// name a message of this receiver, or when nothing newer exists.
    async fn next_message(
        &self,
        receiver_id: &str,
        last: Option<u64>,
    ) -> Result<Message, StoreError>;

    /// All messages of a receiver in creation order.
    async fn list_messages(&self, receiver_id: &str) -> Result<Vec<Message>, StoreError>;

    // ── Audit trail ──────────────────────────────────────────────────

    async fn append_history(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
        actor: &str,
        service_id: Option<&str>,
        text: &str,
    ) -> Result<(), StoreError>;

    async fn history_for_case(&self, case_id: &str) -> Result<Vec<HistoryEntry>, StoreError>;

    // ── Directory / supporting rows ──────────────────────────────────

    async fn insert_service(&self, txn: &mut Self::Txn, service: Service)
        -> Result<(), StoreError>;

    async fn get_service(&self, service_id: &str) -> Result<Service, StoreError>;

    async fn find_service_by_name(&self, name: &str) -> Result<Option<Service>, StoreError>;

    async fn insert_document(
        &self,
        txn: &mut Self::Txn,
        document: Document,
    ) -> Result<(), StoreError>;

    async fn get_document(&self, document_id: &str) -> Result<Document, StoreError>;

    async fn list_documents(&self) -> Result<Vec<Document>, StoreError>;

    async fn insert_attachment(
        &self,
        txn: &mut Self::Txn,
        attachment: Attachment,
    ) -> Result<(), StoreError>;

    async fn get_attachment_for_update(
        &self,
        txn: &mut Self::Txn,
        attachment_id: &str,
    ) -> Result<Attachment, StoreError>;

    async fn update_attachment(
        &self,
        txn: &mut Self::Txn,
        attachment: Attachment,
    ) -> Result<(), StoreError>;

    async fn attachments_for_case(&self, case_id: &str) -> Result<Vec<Attachment>, StoreError>;

    async fn insert_decision(
        &self,
        txn: &mut Self::Txn,
        decision: DecisionRecord,
    ) -> Result<(), StoreError>;

    /// Staged-view list of a case's decision records. A ruling stages the
    /// record and fires follow-up resolution in the same unit of work.
    async fn decisions_for_case(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
    ) -> Result<Vec<DecisionRecord>, StoreError>;

    /// Committed-state list of a case's decision records.
    async fn list_decisions(&self, case_id: &str) -> Result<Vec<DecisionRecord>, StoreError>;

    /// Replace the loosely-typed claim rows of a case.
    async fn put_claim_rows(
        &self,
        txn: &mut Self::Txn,
        case_id: &str,
        rows: Vec<serde_json::Value>,
    ) -> Result<(), StoreError>;

    /// The loosely-typed claim rows of a case; empty when none were stored.
    async fn claim_rows(&self, case_id: &str) -> Result<Vec<serde_json::Value>, StoreError>;
}
