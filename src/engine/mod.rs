//! Task workflow engine: state machine, visibility, escalation projections.

pub mod escalation;
pub mod transition;
pub mod visibility;
pub mod workflow;

pub use escalation::{Escalation, EscalationReason};
pub use transition::{Edge, TRANSITIONS};
pub use workflow::TaskWorkflowEngine;
