//! Record types for the workflow engine.
//!
//! Every record is a plain serde struct; timestamps are RFC 3339 strings
//! assigned by the store at mutation time. Identity is a `String` id minted
//! by the store, except [`Message`] and [`HistoryEntry`] whose ids are
//! creation-ordered integers (the message polling cursor compares them).

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Free-form metadata map carried by cases, work items and activations.
pub type Meta = BTreeMap<String, serde_json::Value>;

// ── Case ─────────────────────────────────────────────────────────────

/// Run status of a [`Case`], distinct from its lifecycle-state label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    Running,
    Suspended,
    Completed,
}

/// Link between a case and a service, with at most one active link per case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLink {
    pub service_id: String,
    pub active: bool,
}

/// One permit-application run through the engine.
///
/// `state` is the deployment-specific lifecycle-state label (review phases,
/// circulation phases, closure phases); `status` is the engine-level run
/// status. Both change independently: a rejected case is still `Running`
/// until its closing work items resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    pub status: CaseStatus,
    /// Workflow slug, e.g. `building-permit`.
    pub workflow: String,
    /// Lifecycle-state label; vocabulary comes from deployment config.
    pub state: String,
    /// Root document of the case's main form.
    pub document_id: String,
    pub meta: Meta,
    /// Responsible-service links; the active one leads the case.
    #[serde(default)]
    pub services: Vec<ServiceLink>,
    /// RFC 3339 timestamp string.
    pub created_at: String,
}

impl Case {
    /// The service currently leading the case, if any link is active.
    pub fn active_service(&self) -> Option<&str> {
        self.services
            .iter()
            .find(|l| l.active)
            .map(|l| l.service_id.as_str())
    }

    /// String-valued metadata lookup.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(|v| v.as_str())
    }
}

// ── WorkItem ─────────────────────────────────────────────────────────

/// Status of a [`WorkItem`]. Terminal once past `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkItemStatus {
    Ready,
    Completed,
    Skipped,
    Canceled,
}

/// One addressable unit of work within a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub task_id: String,
    pub status: WorkItemStatus,
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_case_id: Option<String>,
    /// Groups (service ids) the item is addressed to.
    pub addressed_groups: BTreeSet<String>,
    /// Groups allowed to control (complete/skip) the item.
    pub controlling_groups: BTreeSet<String>,
    #[serde(default)]
    pub assigned_users: Vec<String>,
    /// RFC 3339 timestamp string. None means no deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    pub meta: Meta,
    /// RFC 3339 timestamp string.
    pub created_at: String,
}

impl WorkItem {
    pub fn is_ready(&self) -> bool {
        self.status == WorkItemStatus::Ready
    }
}

// ── Circulation / Activation ─────────────────────────────────────────

/// One review round issued against a case.
///
/// `has_activity` is set once any of its activations progresses beyond
/// `Pending` or records notices; it decides whether an emptied circulation
/// is deleted or retained inert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Circulation {
    pub id: String,
    pub name: String,
    pub case_id: String,
    /// Originating (coordinating) service.
    pub service_id: String,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    #[serde(default)]
    pub has_activity: bool,
}

/// State of an [`Activation`] within its circulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationState {
    Pending,
    InReview,
    Done,
    Withdrawn,
}

impl ActivationState {
    /// An activation still counting against circulation fan-in.
    pub fn is_open(self) -> bool {
        matches!(self, ActivationState::Pending | ActivationState::InReview)
    }
}

/// Classification of a review notice recorded on an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoticeKind {
    /// The reviewing service's opinion on the application.
    Opinion,
    /// An ancillary clause to attach to the ruling.
    AncillaryClause,
}

/// One notice recorded by a reviewing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

/// One service's invitation within a circulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    pub id: String,
    pub circulation_id: String,
    pub case_id: String,
    /// The invited service.
    pub service_id: String,
    /// The coordinating service; may differ from the circulation's
    /// originating service after a responsibility reassignment.
    pub service_parent_id: String,
    pub state: ActivationState,
    /// RFC 3339 timestamp string. None means no deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Backing `activation` work item, once created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_item_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(default)]
    pub notices: Vec<Notice>,
    pub meta: Meta,
}

// ── Protocol inbox / audit trail ─────────────────────────────────────

/// One protocol envelope queued in a receiver's inbox.
///
/// Append-only and never deleted; `id` is globally creation-ordered, which
/// makes per-receiver `created_at` order strictly monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub receiver_id: String,
    /// Serialized envelope, returned verbatim to the poller.
    pub body: String,
    /// RFC 3339 timestamp string.
    pub created_at: String,
}

/// Audit trail row appended by every workflow-significant mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub case_id: String,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    pub text: String,
}

// ── Directory / supporting records ───────────────────────────────────

/// A service in the directory (authorities and reviewing agencies).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Parent authority for subordinate control services.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub disabled: bool,
}

/// A form document row; carrier for visibility scoping.
///
/// `family` is the root document id of the tree this row belongs to; root
/// documents have `family == id`. A document is "linked" when some case
/// references its family root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub family: String,
    /// Form slug, e.g. `main-form` or the dashboard form.
    pub form: String,
    pub created_by: String,
}

/// Attachment metadata row. File bytes live outside this system; the
/// engine only moves rows between visibility sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub case_id: String,
    pub name: String,
    pub sections: BTreeSet<String>,
}

/// Ruling judgement code as carried by the inter-agency protocol.
///
/// Serialized as the numeric wire code 1..=4; any other code fails
/// deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Judgement {
    Granted,
    GrantedWithConditions,
    PartiallyGranted,
    Declined,
}

impl Judgement {
    pub fn code(self) -> u8 {
        match self {
            Judgement::Granted => 1,
            Judgement::GrantedWithConditions => 2,
            Judgement::PartiallyGranted => 3,
            Judgement::Declined => 4,
        }
    }

    /// Positive outcome that advances the case instead of rejecting it.
    pub fn is_granted(self) -> bool {
        matches!(self, Judgement::Granted | Judgement::GrantedWithConditions)
    }
}

impl TryFrom<u8> for Judgement {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Judgement::Granted),
            2 => Ok(Judgement::GrantedWithConditions),
            3 => Ok(Judgement::PartiallyGranted),
            4 => Ok(Judgement::Declined),
            other => Err(format!("unknown judgement code {}", other)),
        }
    }
}

impl From<Judgement> for u8 {
    fn from(j: Judgement) -> u8 {
        j.code()
    }
}

/// Decision recorded against a case by a ruling notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: String,
    pub case_id: String,
    pub judgement: Judgement,
    /// Service that issued the ruling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_id: Option<String>,
    /// Ruling date as carried by the envelope, RFC 3339 date or datetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ruling_date: Option<String>,
    /// RFC 3339 timestamp string.
    pub created_at: String,
}
