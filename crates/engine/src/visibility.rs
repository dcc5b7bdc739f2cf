//! Request-scoped visibility and mutation gating.
//!
//! Which cases and documents an actor may see is the union of three
//! sources: rows reachable through the actor's role (own applications,
//! service involvement), rows carrying the dashboard form, and the
//! actor's own not-yet-linked documents. The set is computed once per
//! request and memoized in an explicit [`RequestScope`] value; nothing
//! is cached across requests.
//!
//! Whether an actor may *change* a row is a table lookup per mutation
//! kind, optionally delegated to the legacy ACL service that still owns
//! lifecycle-state permissions for migrated dossiers. The remote check
//! is fail-closed on transport and status errors and fatal on malformed
//! payloads.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use docket_core::labels;
use docket_core::{Actor, EngineConfig, EngineError, MutationKind, MutationRule};
use docket_store::CaseStore;

// ── Legacy ACL client ────────────────────────────────────────────────

/// Outcome of a legacy ACL instance lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclOutcome {
    /// Non-success response or transport failure; deny without erroring.
    Denied,
    /// The instance's lifecycle-state id; `None` when the relationship
    /// is explicitly unset (`data: null`).
    State(Option<String>),
}

/// Blocking lookup against the legacy ACL service. Implementations run
/// under `spawn_blocking`; only payload malformation is an error.
pub trait AclClient: Send + Sync {
    fn fetch_instance_state(
        &self,
        legacy_id: &str,
        actor: &Actor,
    ) -> Result<AclOutcome, EngineError>;
}

/// `ureq`-backed [`AclClient`] against
/// `GET {base}/api/v1/instances/{id}?include=instance-state`.
pub struct HttpAclClient {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpAclClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpAclClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl AclClient for HttpAclClient {
    fn fetch_instance_state(
        &self,
        legacy_id: &str,
        actor: &Actor,
    ) -> Result<AclOutcome, EngineError> {
        let url = format!(
            "{}/api/v1/instances/{}?include=instance-state&role={}&group={}",
            self.base_url,
            legacy_id,
            actor.role,
            actor.service().unwrap_or("")
        );
        let mut request = self.agent.get(&url);
        if let Some(token) = &actor.token {
            request = request.header("Authorization", token);
        }
        let response = match request.call() {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, legacy_id, "legacy ACL lookup failed, denying");
                return Ok(AclOutcome::Denied);
            }
        };
        let body: serde_json::Value = response.into_body().read_json().map_err(|err| {
            EngineError::upstream(format!("legacy ACL returned a non-JSON body: {}", err))
        })?;
        parse_instance_state(&body).map(AclOutcome::State)
    }
}

/// `data.relationships.instance-state.data.id` out of a JSON:API body.
fn parse_instance_state(body: &serde_json::Value) -> Result<Option<String>, EngineError> {
    if let Some(error) = body.get("error") {
        return Err(EngineError::upstream(format!(
            "legacy ACL returned an error: {}",
            error
        )));
    }
    let relationship = body
        .get("data")
        .and_then(|data| data.get("relationships"))
        .and_then(|relationships| relationships.get("instance-state"))
        .ok_or_else(|| {
            EngineError::upstream("legacy ACL response missing data.relationships.instance-state")
        })?;
    match relationship.get("data") {
        None => Err(EngineError::upstream(
            "legacy ACL relationship missing its data key",
        )),
        Some(serde_json::Value::Null) => Ok(None),
        Some(data) => data
            .get("id")
            .and_then(|id| id.as_str())
            .map(|id| Some(id.to_string()))
            .ok_or_else(|| EngineError::upstream("legacy ACL relationship data missing id")),
    }
}

/// Canned-outcome [`AclClient`] that records every lookup it receives.
pub struct StaticAclClient {
    outcome: Result<AclOutcome, String>,
    calls: Mutex<Vec<String>>,
}

impl StaticAclClient {
    pub fn returning(outcome: AclOutcome) -> Self {
        StaticAclClient {
            outcome: Ok(outcome),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every lookup fails with an upstream error carrying `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        StaticAclClient {
            outcome: Err(message.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The legacy ids looked up so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

impl AclClient for StaticAclClient {
    fn fetch_instance_state(
        &self,
        legacy_id: &str,
        _actor: &Actor,
    ) -> Result<AclOutcome, EngineError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(legacy_id.to_string());
        }
        match &self.outcome {
            Ok(outcome) => Ok(outcome.clone()),
            Err(message) => Err(EngineError::upstream(message.clone())),
        }
    }
}

// ── Request scope ────────────────────────────────────────────────────

/// Per-request memo of visibility results. Created at the request edge,
/// passed through the call chain, dropped with the request.
#[derive(Default)]
pub struct RequestScope {
    visible_cases: Option<Arc<BTreeSet<String>>>,
    visible_documents: Option<Arc<BTreeSet<String>>>,
    remote_allowed: BTreeMap<(String, bool), bool>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }
}

// ── Gate ─────────────────────────────────────────────────────────────

/// Visibility and mutation gate, one per process.
pub struct VisibilityGate<S> {
    store: Arc<S>,
    config: Arc<EngineConfig>,
    acl: Arc<dyn AclClient>,
}

impl<S: CaseStore> VisibilityGate<S> {
    pub fn new(store: Arc<S>, config: Arc<EngineConfig>, acl: Arc<dyn AclClient>) -> Self {
        VisibilityGate { store, config, acl }
    }

    /// The ids of every case the actor may see. Memoized in `scope`.
    pub async fn visible_case_ids(
        &self,
        actor: &Actor,
        scope: &mut RequestScope,
    ) -> Result<Arc<BTreeSet<String>>, EngineError> {
        if let Some(ids) = &scope.visible_cases {
            return Ok(Arc::clone(ids));
        }

        let cases = self.store.list_cases().await?;
        let documents = self.store.list_documents().await?;
        let forms: BTreeMap<&str, &str> = documents
            .iter()
            .map(|d| (d.id.as_str(), d.form.as_str()))
            .collect();
        let activation_cases: BTreeSet<String> = match actor.service() {
            Some(service) => self
                .store
                .activations_for_service(service)
                .await?
                .into_iter()
                .map(|a| a.case_id)
                .collect(),
            None => BTreeSet::new(),
        };

        let mut visible = BTreeSet::new();
        for case in &cases {
            let reachable = match actor.role.as_str() {
                labels::ROLE_SUPPORT => true,
                labels::ROLE_APPLICANT => {
                    case.meta_str(labels::META_APPLICANT) == Some(actor.username.as_str())
                }
                _ => match actor.service() {
                    Some(service) => {
                        case.services.iter().any(|l| l.service_id == service)
                            || activation_cases.contains(&case.id)
                    }
                    None => false,
                },
            };
            let dashboard = forms.get(case.document_id.as_str())
                == Some(&self.config.circulation.dashboard_form.as_str());
            if reachable || dashboard {
                visible.insert(case.id.clone());
            }
        }

        let ids = Arc::new(visible);
        scope.visible_cases = Some(Arc::clone(&ids));
        Ok(ids)
    }

    pub async fn case_visible(
        &self,
        actor: &Actor,
        scope: &mut RequestScope,
        case_id: &str,
    ) -> Result<bool, EngineError> {
        Ok(self.visible_case_ids(actor, scope).await?.contains(case_id))
    }

    /// The ids of every document the actor may see: documents of visible
    /// cases, dashboard-form documents, and the actor's own unlinked
    /// documents. Memoized in `scope`.
    pub async fn visible_document_ids(
        &self,
        actor: &Actor,
        scope: &mut RequestScope,
    ) -> Result<Arc<BTreeSet<String>>, EngineError> {
        if let Some(ids) = &scope.visible_documents {
            return Ok(Arc::clone(ids));
        }

        let case_ids = self.visible_case_ids(actor, scope).await?;
        let cases = self.store.list_cases().await?;
        let documents = self.store.list_documents().await?;
        let linked: BTreeMap<&str, &str> = cases
            .iter()
            .map(|c| (c.document_id.as_str(), c.id.as_str()))
            .collect();

        let mut visible = BTreeSet::new();
        for document in &documents {
            let via_case = linked
                .get(document.family.as_str())
                .map(|case_id| case_ids.contains(*case_id))
                .unwrap_or(false);
            let dashboard = document.form == self.config.circulation.dashboard_form;
            let own_unlinked = document.created_by == actor.username
                && !linked.contains_key(document.family.as_str());
            if via_case || dashboard || own_unlinked {
                visible.insert(document.id.clone());
            }
        }

        let ids = Arc::new(visible);
        scope.visible_documents = Some(Arc::clone(&ids));
        Ok(ids)
    }

    /// Table lookup for a mutation. `Remote` rules delegate to
    /// [`has_remote_edit_permission`] via the document's family.
    ///
    /// [`has_remote_edit_permission`]: VisibilityGate::has_remote_edit_permission
    pub async fn mutation_allowed(
        &self,
        kind: MutationKind,
        actor: &Actor,
        document_id: &str,
        scope: &mut RequestScope,
    ) -> Result<bool, EngineError> {
        match self.config.permissions.rule_for(kind, &actor.role) {
            MutationRule::Allow => Ok(true),
            MutationRule::Deny => {
                debug!(?kind, role = %actor.role, "mutation denied by table");
                Ok(false)
            }
            MutationRule::Remote { only_meta } => {
                let document = self.store.get_document(document_id).await?;
                self.has_remote_edit_permission(actor, &document.family, only_meta, scope)
                    .await
            }
        }
    }

    /// Whether the legacy system still allows edits on the dossier
    /// behind `family`. Decisions are memoized per request.
    pub async fn has_remote_edit_permission(
        &self,
        actor: &Actor,
        family: &str,
        only_meta: bool,
        scope: &mut RequestScope,
    ) -> Result<bool, EngineError> {
        if let Some(allowed) = scope.remote_allowed.get(&(family.to_string(), only_meta)) {
            return Ok(*allowed);
        }
        let allowed = self.remote_edit_allowed(actor, family, only_meta).await?;
        scope
            .remote_allowed
            .insert((family.to_string(), only_meta), allowed);
        Ok(allowed)
    }

    async fn remote_edit_allowed(
        &self,
        actor: &Actor,
        family: &str,
        only_meta: bool,
    ) -> Result<bool, EngineError> {
        let Some(case) = self.store.find_case_by_document(family).await? else {
            // Not linked yet: a row still being drafted. The legacy
            // system owns nothing here, so no lookup happens.
            debug!(family, "document family unlinked, allowing edit");
            return Ok(true);
        };
        let Some(legacy_id) = case.meta_str(labels::META_LEGACY_ID).map(str::to_string) else {
            // Linked but without a legacy counterpart: mid-creation.
            // Meta edits go through, content edits wait for the link.
            return Ok(only_meta);
        };

        let acl = Arc::clone(&self.acl);
        let call_actor = actor.clone();
        let outcome =
            tokio::task::spawn_blocking(move || acl.fetch_instance_state(&legacy_id, &call_actor))
                .await
                .map_err(|err| EngineError::store(format!("acl lookup task failed: {}", err)))??;

        match outcome {
            AclOutcome::Denied => {
                warn!(case = %case.id, "legacy ACL lookup denied");
                Ok(false)
            }
            AclOutcome::State(None) => Ok(only_meta),
            AclOutcome::State(Some(state)) => {
                let permissions = &self.config.permissions;
                let allowed = permissions
                    .remote_states_for(&actor.role)
                    .iter()
                    .any(|s| s == &state)
                    || (only_meta
                        && permissions
                            .remote_states_meta_for(&actor.role)
                            .iter()
                            .any(|s| s == &state));
                if !allowed {
                    debug!(case = %case.id, state = %state, role = %actor.role, "legacy state not editable");
                }
                Ok(allowed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::clock;
    use docket_core::model::{
        Activation, ActivationState, Case, CaseStatus, Document, Meta, ServiceLink,
    };
    use docket_store::MemoryStore;

    fn applicant(username: &str) -> Actor {
        Actor {
            username: username.into(),
            role: "applicant".into(),
            service_id: None,
            groups: vec![],
            token: None,
        }
    }

    fn service_actor(service: &str) -> Actor {
        Actor {
            username: "reviewer".into(),
            role: "service".into(),
            service_id: Some(service.into()),
            groups: vec![service.into()],
            token: None,
        }
    }

    fn make_case(id: &str, document_id: &str, applicant: Option<&str>, lead: &str) -> Case {
        let mut meta = Meta::new();
        if let Some(username) = applicant {
            meta.insert(
                "applicant".to_string(),
                serde_json::Value::String(username.to_string()),
            );
        }
        Case {
            id: id.into(),
            status: CaseStatus::Running,
            workflow: "building-permit".into(),
            state: "circulation".into(),
            document_id: document_id.into(),
            meta,
            services: vec![ServiceLink {
                service_id: lead.into(),
                active: true,
            }],
            created_at: clock::now_rfc3339(),
        }
    }

    fn make_document(id: &str, family: &str, form: &str, created_by: &str) -> Document {
        Document {
            id: id.into(),
            family: family.into(),
            form: form.into(),
            created_by: created_by.into(),
        }
    }

    async fn seed_world(store: &MemoryStore) {
        let mut txn = store.begin().await.unwrap();
        store
            .insert_case(&mut txn, make_case("case-pia", "doc-pia", Some("pia"), "svc-lead"))
            .await
            .unwrap();
        store
            .insert_case(&mut txn, make_case("case-max", "doc-max", Some("max"), "svc-lead"))
            .await
            .unwrap();
        store
            .insert_case(&mut txn, make_case("case-dash", "doc-dash", None, "svc-other"))
            .await
            .unwrap();
        for document in [
            make_document("doc-pia", "doc-pia", "main-form", "pia"),
            make_document("doc-max", "doc-max", "main-form", "max"),
            make_document("doc-dash", "doc-dash", "dashboard", "admin"),
            make_document("doc-draft", "doc-draft", "main-form", "pia"),
        ] {
            store.insert_document(&mut txn, document).await.unwrap();
        }
        store
            .insert_activation(
                &mut txn,
                Activation {
                    id: "act-1".into(),
                    circulation_id: "circ-1".into(),
                    case_id: "case-max".into(),
                    service_id: "svc-fire".into(),
                    service_parent_id: "svc-lead".into(),
                    state: ActivationState::Pending,
                    deadline: None,
                    started_at: None,
                    ended_at: None,
                    work_item_id: None,
                    verdict: None,
                    notices: vec![],
                    meta: Meta::new(),
                },
            )
            .await
            .unwrap();
        store.commit(txn).await.unwrap();
    }

    fn gate_with(
        store: Arc<MemoryStore>,
        acl: Arc<dyn AclClient>,
    ) -> VisibilityGate<MemoryStore> {
        VisibilityGate::new(store, Arc::new(EngineConfig::default()), acl)
    }

    #[tokio::test]
    async fn applicant_sees_own_cases_and_dashboard() {
        let store = Arc::new(MemoryStore::new());
        seed_world(&store).await;
        let gate = gate_with(
            Arc::clone(&store),
            Arc::new(StaticAclClient::returning(AclOutcome::Denied)),
        );
        let mut scope = RequestScope::new();
        let ids = gate
            .visible_case_ids(&applicant("pia"), &mut scope)
            .await
            .unwrap();
        assert!(ids.contains("case-pia"));
        assert!(ids.contains("case-dash"));
        assert!(!ids.contains("case-max"));
    }

    #[tokio::test]
    async fn service_sees_linked_and_activated_cases() {
        let store = Arc::new(MemoryStore::new());
        seed_world(&store).await;
        let gate = gate_with(
            Arc::clone(&store),
            Arc::new(StaticAclClient::returning(AclOutcome::Denied)),
        );

        let mut scope = RequestScope::new();
        let ids = gate
            .visible_case_ids(&service_actor("svc-fire"), &mut scope)
            .await
            .unwrap();
        // Reachable through the activation only, plus the dashboard case.
        assert!(ids.contains("case-max"));
        assert!(ids.contains("case-dash"));
        assert!(!ids.contains("case-pia"));

        let mut scope = RequestScope::new();
        let ids = gate
            .visible_case_ids(&service_actor("svc-lead"), &mut scope)
            .await
            .unwrap();
        assert!(ids.contains("case-pia"));
        assert!(ids.contains("case-max"));
    }

    #[tokio::test]
    async fn support_sees_everything() {
        let store = Arc::new(MemoryStore::new());
        seed_world(&store).await;
        let gate = gate_with(
            Arc::clone(&store),
            Arc::new(StaticAclClient::returning(AclOutcome::Denied)),
        );
        let mut scope = RequestScope::new();
        let support = Actor {
            username: "ops".into(),
            role: "support".into(),
            service_id: None,
            groups: vec![],
            token: None,
        };
        let ids = gate.visible_case_ids(&support, &mut scope).await.unwrap();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn document_scope_includes_own_unlinked_rows() {
        let store = Arc::new(MemoryStore::new());
        seed_world(&store).await;
        let gate = gate_with(
            Arc::clone(&store),
            Arc::new(StaticAclClient::returning(AclOutcome::Denied)),
        );
        let mut scope = RequestScope::new();
        let ids = gate
            .visible_document_ids(&applicant("pia"), &mut scope)
            .await
            .unwrap();
        assert!(ids.contains("doc-pia"));
        assert!(ids.contains("doc-dash"));
        assert!(ids.contains("doc-draft"), "own unlinked draft is visible");
        assert!(!ids.contains("doc-max"));
    }

    #[tokio::test]
    async fn scope_memoizes_the_id_set() {
        let store = Arc::new(MemoryStore::new());
        seed_world(&store).await;
        let gate = gate_with(
            Arc::clone(&store),
            Arc::new(StaticAclClient::returning(AclOutcome::Denied)),
        );
        let mut scope = RequestScope::new();
        let actor = applicant("pia");
        let first = gate.visible_case_ids(&actor, &mut scope).await.unwrap();
        let second = gate.visible_case_ids(&actor, &mut scope).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn unlinked_family_allows_without_a_lookup() {
        let store = Arc::new(MemoryStore::new());
        seed_world(&store).await;
        let acl = Arc::new(StaticAclClient::returning(AclOutcome::Denied));
        let gate = gate_with(Arc::clone(&store), Arc::clone(&acl) as Arc<dyn AclClient>);
        let mut scope = RequestScope::new();
        let allowed = gate
            .has_remote_edit_permission(&applicant("pia"), "doc-draft", false, &mut scope)
            .await
            .unwrap();
        assert!(allowed);
        assert!(acl.calls().is_empty(), "no HTTP call for unlinked rows");
    }

    #[tokio::test]
    async fn linked_case_without_legacy_id_allows_meta_edits_only() {
        let store = Arc::new(MemoryStore::new());
        seed_world(&store).await;
        let acl = Arc::new(StaticAclClient::returning(AclOutcome::Denied));
        let gate = gate_with(Arc::clone(&store), Arc::clone(&acl) as Arc<dyn AclClient>);
        let mut scope = RequestScope::new();
        let actor = applicant("pia");
        assert!(gate
            .has_remote_edit_permission(&actor, "doc-pia", true, &mut scope)
            .await
            .unwrap());
        assert!(!gate
            .has_remote_edit_permission(&actor, "doc-pia", false, &mut scope)
            .await
            .unwrap());
        assert!(acl.calls().is_empty());
    }

    async fn seed_legacy_case(store: &MemoryStore) {
        let mut txn = store.begin().await.unwrap();
        let mut case = make_case("case-legacy", "doc-legacy", Some("pia"), "svc-lead");
        case.meta.insert(
            "legacy-id".to_string(),
            serde_json::Value::String("4711".to_string()),
        );
        store.insert_case(&mut txn, case).await.unwrap();
        store
            .insert_document(
                &mut txn,
                make_document("doc-legacy", "doc-legacy", "main-form", "pia"),
            )
            .await
            .unwrap();
        store.commit(txn).await.unwrap();
    }

    #[tokio::test]
    async fn denied_lookup_is_a_plain_false() {
        let store = Arc::new(MemoryStore::new());
        seed_legacy_case(&store).await;
        let acl = Arc::new(StaticAclClient::returning(AclOutcome::Denied));
        let gate = gate_with(Arc::clone(&store), Arc::clone(&acl) as Arc<dyn AclClient>);
        let mut scope = RequestScope::new();
        let allowed = gate
            .has_remote_edit_permission(&applicant("pia"), "doc-legacy", false, &mut scope)
            .await
            .unwrap();
        assert!(!allowed);
        assert_eq!(acl.calls(), vec!["4711"]);
    }

    #[tokio::test]
    async fn state_allow_list_decides_per_role() {
        let store = Arc::new(MemoryStore::new());
        seed_legacy_case(&store).await;
        // "1" is in the applicant allow-list, "20000" only in the
        // municipality meta list.
        let gate = gate_with(
            Arc::clone(&store),
            Arc::new(StaticAclClient::returning(AclOutcome::State(Some(
                "1".to_string(),
            )))),
        );
        let mut scope = RequestScope::new();
        assert!(gate
            .has_remote_edit_permission(&applicant("pia"), "doc-legacy", false, &mut scope)
            .await
            .unwrap());

        let gate = gate_with(
            Arc::clone(&store),
            Arc::new(StaticAclClient::returning(AclOutcome::State(Some(
                "20000".to_string(),
            )))),
        );
        let municipality = Actor {
            username: "clerk".into(),
            role: "municipality".into(),
            service_id: Some("svc-lead".into()),
            groups: vec![],
            token: None,
        };
        let mut scope = RequestScope::new();
        assert!(gate
            .has_remote_edit_permission(&municipality, "doc-legacy", true, &mut scope)
            .await
            .unwrap());
        let mut scope = RequestScope::new();
        assert!(!gate
            .has_remote_edit_permission(&municipality, "doc-legacy", false, &mut scope)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn absent_state_follows_only_meta() {
        let store = Arc::new(MemoryStore::new());
        seed_legacy_case(&store).await;
        let gate = gate_with(
            Arc::clone(&store),
            Arc::new(StaticAclClient::returning(AclOutcome::State(None))),
        );
        let mut scope = RequestScope::new();
        let actor = applicant("pia");
        assert!(gate
            .has_remote_edit_permission(&actor, "doc-legacy", true, &mut scope)
            .await
            .unwrap());
        assert!(!gate
            .has_remote_edit_permission(&actor, "doc-legacy", false, &mut scope)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn malformed_payload_surfaces_upstream_error() {
        let store = Arc::new(MemoryStore::new());
        seed_legacy_case(&store).await;
        let gate = gate_with(
            Arc::clone(&store),
            Arc::new(StaticAclClient::failing("missing data key")),
        );
        let mut scope = RequestScope::new();
        let err = gate
            .has_remote_edit_permission(&applicant("pia"), "doc-legacy", false, &mut scope)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Upstream { .. }));
    }

    #[tokio::test]
    async fn remote_decisions_memoize_per_scope() {
        let store = Arc::new(MemoryStore::new());
        seed_legacy_case(&store).await;
        let acl = Arc::new(StaticAclClient::returning(AclOutcome::State(Some(
            "1".to_string(),
        ))));
        let gate = gate_with(Arc::clone(&store), Arc::clone(&acl) as Arc<dyn AclClient>);
        let mut scope = RequestScope::new();
        let actor = applicant("pia");
        for _ in 0..3 {
            gate.has_remote_edit_permission(&actor, "doc-legacy", false, &mut scope)
                .await
                .unwrap();
        }
        assert_eq!(acl.calls().len(), 1, "one lookup per request scope");
    }

    #[tokio::test]
    async fn mutation_table_short_circuits_before_any_lookup() {
        let store = Arc::new(MemoryStore::new());
        seed_world(&store).await;
        let acl = Arc::new(StaticAclClient::returning(AclOutcome::Denied));
        let gate = gate_with(Arc::clone(&store), Arc::clone(&acl) as Arc<dyn AclClient>);
        let mut scope = RequestScope::new();

        // start-case allows applicants outright, even for unknown documents.
        assert!(gate
            .mutation_allowed(
                MutationKind::StartCase,
                &applicant("pia"),
                "doc-does-not-exist",
                &mut scope
            )
            .await
            .unwrap());
        // and denies service actors outright.
        assert!(!gate
            .mutation_allowed(
                MutationKind::StartCase,
                &service_actor("svc-fire"),
                "doc-does-not-exist",
                &mut scope
            )
            .await
            .unwrap());
        assert!(acl.calls().is_empty());
    }

    #[test]
    fn jsonapi_parsing_covers_the_shapes() {
        let ok = serde_json::json!({
            "data": {"relationships": {"instance-state": {"data": {"id": "20007"}}}}
        });
        assert_eq!(
            parse_instance_state(&ok).unwrap(),
            Some("20007".to_string())
        );

        let unset = serde_json::json!({
            "data": {"relationships": {"instance-state": {"data": null}}}
        });
        assert_eq!(parse_instance_state(&unset).unwrap(), None);

        let explicit_error = serde_json::json!({"error": "boom"});
        assert!(matches!(
            parse_instance_state(&explicit_error).unwrap_err(),
            EngineError::Upstream { .. }
        ));

        let missing = serde_json::json!({"data": {}});
        assert!(matches!(
            parse_instance_state(&missing).unwrap_err(),
            EngineError::Upstream { .. }
        ));

        let no_data_key = serde_json::json!({
            "data": {"relationships": {"instance-state": {}}}
        });
        assert!(matches!(
            parse_instance_state(&no_data_key).unwrap_err(),
            EngineError::Upstream { .. }
        ));
    }
}
