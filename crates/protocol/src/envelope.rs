//! The inter-agency delivery envelope.
//!
//! One envelope carries a structured header plus exactly one payload; the
//! payload slots are a discriminated union rendered as nine optional
//! fields, and the header's `message_type` names the populated slot.
//! [`resolve_event`] enforces the exactly-one rule on inbound envelopes
//! and rejects the three outbound-only kinds.

use serde::{Deserialize, Serialize};

use docket_core::clock;
use docket_core::labels;
use docket_core::model::{Attachment, Case, CaseStatus, DecisionRecord, Judgement};
use docket_core::{EngineConfig, EngineError};

// ── Envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryHeader {
    pub sender_id: String,
    pub message_id: String,
    /// Name of the populated payload slot, e.g. `base_delivery`.
    pub message_type: String,
    /// RFC 3339.
    pub message_date: String,
    #[serde(default)]
    pub test_delivery: bool,
}

/// A delivery as exchanged with partner systems. Exactly one payload
/// field is populated per envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEnvelope {
    pub header: DeliveryHeader,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_delivery: Option<BaseDelivery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submit: Option<Submit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice_ruling: Option<NoticeRuling>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind_of_proceedings: Option<KindOfProceedings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskDirective>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_responsibility: Option<ChangeResponsibility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_dossier: Option<CloseDossier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accompanying_report: Option<AccompanyingReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_notification: Option<StatusNotification>,
}

impl DeliveryEnvelope {
    fn empty(header: DeliveryHeader) -> Self {
        DeliveryEnvelope {
            header,
            base_delivery: None,
            submit: None,
            notice_ruling: None,
            kind_of_proceedings: None,
            task: None,
            change_responsibility: None,
            close_dossier: None,
            accompanying_report: None,
            status_notification: None,
        }
    }

    /// The serialized form stored as a message body.
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self)
            .map_err(|e| EngineError::protocol(format!("cannot serialize envelope: {e}")))
    }
}

/// Reference to an attachment of the case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDescriptor {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// ── Payloads ─────────────────────────────────────────────────────────

/// Outbound rendering of a case for partner systems.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseDelivery {
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dossier_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicant: Option<String>,
    pub workflow: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rulings: Vec<RulingSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<DocumentDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulingSummary {
    pub judgement: Judgement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ruling_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority_id: Option<String>,
}

/// Outbound intake confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submit {
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dossier_number: Option<String>,
    pub workflow: String,
}

/// Outbound lifecycle-state notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusNotification {
    pub case_id: String,
    pub state: String,
    pub status: CaseStatus,
}

/// The ruling authority's decision on the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeRuling {
    pub case_id: String,
    pub judgement: Judgement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ruling_date: Option<String>,
    /// Attachments to move into the section shared with all participants.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<DocumentDescriptor>,
}

/// Determination of the proceedings kind; opens the circulation phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindOfProceedings {
    pub case_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<DocumentDescriptor>,
}

/// Instruction to involve a service in the review of a case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDirective {
    pub case_id: String,
    /// Directory id of the service to involve.
    pub service_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
}

/// Hand the case to a different responsible service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeResponsibility {
    pub case_id: String,
    /// Resolved against the directory by name, not id.
    pub service_name: String,
}

/// Close and archive a dossier awaiting closure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseDossier {
    pub case_id: String,
}

/// A reviewing service's report on its activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccompanyingReport {
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judgement: Option<Judgement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remarks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancillary_clauses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub documents: Vec<DocumentDescriptor>,
}

// ── Inbound resolution ───────────────────────────────────────────────

/// An inbound envelope resolved to its single payload.
#[derive(Debug)]
pub enum InboundEvent<'a> {
    NoticeRuling(&'a NoticeRuling),
    KindOfProceedings(&'a KindOfProceedings),
    Task(&'a TaskDirective),
    ChangeResponsibility(&'a ChangeResponsibility),
    CloseDossier(&'a CloseDossier),
    AccompanyingReport(&'a AccompanyingReport),
}

/// Resolve an inbound envelope to its event.
///
/// Zero or several populated payload slots make the envelope ambiguous.
/// The three kinds this system only ever sends have no inbound handler
/// and are rejected the same way an unknown kind would be.
pub fn resolve_event(envelope: &DeliveryEnvelope) -> Result<InboundEvent<'_>, EngineError> {
    let mut populated = 0usize;
    let mut inbound: Option<InboundEvent<'_>> = None;
    let mut outbound_only = "";

    if envelope.base_delivery.is_some() {
        populated += 1;
        outbound_only = "base_delivery";
    }
    if envelope.submit.is_some() {
        populated += 1;
        outbound_only = "submit";
    }
    if envelope.status_notification.is_some() {
        populated += 1;
        outbound_only = "status_notification";
    }
    if let Some(payload) = &envelope.notice_ruling {
        populated += 1;
        inbound = Some(InboundEvent::NoticeRuling(payload));
    }
    if let Some(payload) = &envelope.kind_of_proceedings {
        populated += 1;
        inbound = Some(InboundEvent::KindOfProceedings(payload));
    }
    if let Some(payload) = &envelope.task {
        populated += 1;
        inbound = Some(InboundEvent::Task(payload));
    }
    if let Some(payload) = &envelope.change_responsibility {
        populated += 1;
        inbound = Some(InboundEvent::ChangeResponsibility(payload));
    }
    if let Some(payload) = &envelope.close_dossier {
        populated += 1;
        inbound = Some(InboundEvent::CloseDossier(payload));
    }
    if let Some(payload) = &envelope.accompanying_report {
        populated += 1;
        inbound = Some(InboundEvent::AccompanyingReport(payload));
    }

    if populated != 1 {
        return Err(EngineError::protocol(format!(
            "envelope must carry exactly one payload, found {populated}"
        )));
    }
    match inbound {
        Some(event) => Ok(event),
        None => Err(EngineError::protocol(format!(
            "payload '{outbound_only}' is outbound-only and has no inbound handler"
        ))),
    }
}

// ── Outbound builders ────────────────────────────────────────────────

fn header_for(config: &EngineConfig, message_type: &str) -> DeliveryHeader {
    let now = clock::now_rfc3339();
    DeliveryHeader {
        sender_id: config.deployment.sender_id.clone(),
        message_id: format!("{}-{}", config.deployment.sender_id, now),
        message_type: message_type.to_string(),
        message_date: now,
        test_delivery: config.deployment.test_delivery,
    }
}

/// Render a case as a base delivery: the full dossier view a partner
/// system needs to take it over or review it.
pub fn base_delivery_for(
    config: &EngineConfig,
    case: &Case,
    decisions: &[DecisionRecord],
    attachments: &[Attachment],
) -> DeliveryEnvelope {
    let mut envelope = DeliveryEnvelope::empty(header_for(config, "base_delivery"));
    envelope.base_delivery = Some(BaseDelivery {
        case_id: case.id.clone(),
        dossier_number: case
            .meta_str(labels::META_DOSSIER_NUMBER)
            .map(str::to_string),
        applicant: case.meta_str(labels::META_APPLICANT).map(str::to_string),
        workflow: case.workflow.clone(),
        state: case.state.clone(),
        rulings: decisions
            .iter()
            .map(|d| RulingSummary {
                judgement: d.judgement,
                ruling_date: d.ruling_date.clone(),
                authority_id: d.authority_id.clone(),
            })
            .collect(),
        documents: attachments
            .iter()
            .map(|a| DocumentDescriptor {
                id: a.id.clone(),
                name: Some(a.name.clone()),
            })
            .collect(),
    });
    envelope
}

/// Render a case's current lifecycle state as a notification.
pub fn status_notification_for(config: &EngineConfig, case: &Case) -> DeliveryEnvelope {
    let mut envelope = DeliveryEnvelope::empty(header_for(config, "status_notification"));
    envelope.status_notification = Some(StatusNotification {
        case_id: case.id.clone(),
        state: case.state.clone(),
        status: case.status,
    });
    envelope
}

/// Render the intake confirmation for a freshly submitted case.
pub fn submit_for(config: &EngineConfig, case: &Case) -> DeliveryEnvelope {
    let mut envelope = DeliveryEnvelope::empty(header_for(config, "submit"));
    envelope.submit = Some(Submit {
        case_id: case.id.clone(),
        dossier_number: case
            .meta_str(labels::META_DOSSIER_NUMBER)
            .map(str::to_string),
        workflow: case.workflow.clone(),
    });
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_core::model::Meta;

    fn bare_envelope() -> DeliveryEnvelope {
        DeliveryEnvelope::empty(DeliveryHeader {
            sender_id: "partner".into(),
            message_id: "msg-1".into(),
            message_type: "notice_ruling".into(),
            message_date: clock::now_rfc3339(),
            test_delivery: false,
        })
    }

    fn make_case() -> Case {
        let mut meta = Meta::new();
        meta.insert(
            labels::META_DOSSIER_NUMBER.to_string(),
            serde_json::Value::String("2020-84".into()),
        );
        meta.insert(
            labels::META_APPLICANT.to_string(),
            serde_json::Value::String("pia".into()),
        );
        Case {
            id: "case-1".into(),
            status: CaseStatus::Running,
            workflow: "building-permit".into(),
            state: "SB1".into(),
            document_id: "doc-1".into(),
            meta,
            services: vec![],
            created_at: clock::now_rfc3339(),
        }
    }

    #[test]
    fn exactly_one_payload_resolves() {
        let mut envelope = bare_envelope();
        envelope.close_dossier = Some(CloseDossier {
            case_id: "case-1".into(),
        });
        match resolve_event(&envelope) {
            Ok(InboundEvent::CloseDossier(payload)) => assert_eq!(payload.case_id, "case-1"),
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[test]
    fn empty_envelope_is_ambiguous() {
        let err = resolve_event(&bare_envelope()).unwrap_err();
        assert!(err.to_string().contains("found 0"), "{err}");
    }

    #[test]
    fn two_payloads_are_ambiguous() {
        let mut envelope = bare_envelope();
        envelope.close_dossier = Some(CloseDossier {
            case_id: "case-1".into(),
        });
        envelope.task = Some(TaskDirective {
            case_id: "case-1".into(),
            service_id: "svc-23".into(),
            deadline: None,
        });
        let err = resolve_event(&envelope).unwrap_err();
        assert!(err.to_string().contains("found 2"), "{err}");
    }

    #[test]
    fn outbound_only_kinds_have_no_inbound_handler() {
        let mut envelope = bare_envelope();
        envelope.submit = Some(Submit {
            case_id: "case-1".into(),
            dossier_number: None,
            workflow: "building-permit".into(),
        });
        let err = resolve_event(&envelope).unwrap_err();
        assert!(err.to_string().contains("'submit' is outbound-only"), "{err}");
    }

    #[test]
    fn base_delivery_renders_the_dossier() {
        let config = EngineConfig::default();
        let decisions = vec![DecisionRecord {
            id: "decision-1".into(),
            case_id: "case-1".into(),
            judgement: Judgement::Granted,
            authority_id: Some("svc-lead".into()),
            ruling_date: Some("2020-04-01".into()),
            created_at: clock::now_rfc3339(),
        }];
        let attachments = vec![Attachment {
            id: "att-1".into(),
            case_id: "case-1".into(),
            name: "plan.pdf".into(),
            sections: ["shared-with-all".to_string()].into(),
        }];
        let envelope = base_delivery_for(&config, &make_case(), &decisions, &attachments);

        assert_eq!(envelope.header.message_type, "base_delivery");
        assert_eq!(envelope.header.sender_id, config.deployment.sender_id);
        let payload = envelope.base_delivery.as_ref().unwrap();
        assert_eq!(payload.dossier_number.as_deref(), Some("2020-84"));
        assert_eq!(payload.applicant.as_deref(), Some("pia"));
        assert_eq!(payload.rulings.len(), 1);
        assert_eq!(payload.documents[0].name.as_deref(), Some("plan.pdf"));
        // Exactly one slot is populated; inbound resolution still rejects
        // the kind as outbound-only.
        assert!(matches!(resolve_event(&envelope), Err(EngineError::Protocol { .. })));
    }

    #[test]
    fn status_notification_carries_state_and_status() {
        let config = EngineConfig::default();
        let mut case = make_case();
        case.status = CaseStatus::Suspended;
        let envelope = status_notification_for(&config, &case);
        let payload = envelope.status_notification.as_ref().unwrap();
        assert_eq!(payload.state, "SB1");
        assert_eq!(payload.status, CaseStatus::Suspended);
        assert!(envelope.header.test_delivery, "dev config marks test deliveries");
    }

    #[test]
    fn wire_field_names_are_stable() {
        let json = r#"{
            "header": {
                "sender_id": "kanton",
                "message_id": "m-77",
                "message_type": "accompanying_report",
                "message_date": "2020-04-01T10:00:00.000000000Z"
            },
            "accompanying_report": {
                "case_id": "case-9",
                "judgement": 1,
                "remarks": ["no objection"],
                "ancillary_clauses": ["keep the oak"]
            }
        }"#;
        let envelope: DeliveryEnvelope = serde_json::from_str(json).unwrap();
        assert!(!envelope.header.test_delivery, "flag defaults to false");
        match resolve_event(&envelope).unwrap() {
            InboundEvent::AccompanyingReport(payload) => {
                assert_eq!(payload.judgement, Some(Judgement::Granted));
                assert_eq!(payload.remarks, vec!["no objection"]);
                assert_eq!(payload.ancillary_clauses, vec!["keep the oak"]);
                assert!(payload.documents.is_empty());
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }
}
