//! docket-protocol: the inter-agency exchange surface.
//!
//! Partner systems and the dossier engine talk through discriminated
//! delivery envelopes. This crate owns that boundary:
//!
//! - [`envelope`] -- the envelope types, inbound payload resolution and
//!   the outbound builders
//! - [`send`] -- inbound handlers: permission predicate, one-unit-of-work
//!   apply, coupled Message emission
//! - [`events`] -- named internal events fired by the surrounding
//!   application
//! - [`inbox`] -- per-receiver outbound queues with cursor polling
//! - [`notify`] -- the acknowledgment dispatch seam

pub mod envelope;
pub mod events;
pub mod inbox;
pub mod notify;
pub mod send;

pub use envelope::{
    base_delivery_for, resolve_event, status_notification_for, submit_for, AccompanyingReport,
    BaseDelivery, ChangeResponsibility, CloseDossier, DeliveryEnvelope, DeliveryHeader,
    DocumentDescriptor, InboundEvent, KindOfProceedings, NoticeRuling, RulingSummary,
    StatusNotification, Submit, TaskDirective,
};
pub use events::{handle_event, EVENT_STATUS_CHANGED, EVENT_SUBMITTED, EVENT_WITHDRAWN};
pub use inbox::{deliver, next_for};
pub use notify::{Notifier, RecordingNotifier, SentNotification, TracingNotifier};
pub use send::handle_send;
