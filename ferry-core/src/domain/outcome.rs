//! Delivery outcome domain types

use serde::{Deserialize, Serialize};

/// What the queue should do with a message once it has been processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The launcher accepted the task; delete the message
    Acknowledged { task_id: String },

    /// Transient failure; let the queue redeliver the message
    Retry { reason: String },

    /// The message can never succeed; route it to the dead-letter path
    DeadLettered { reason: String },
}

impl DeliveryOutcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, DeliveryOutcome::Acknowledged { .. })
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, DeliveryOutcome::Retry { .. })
    }

    pub fn is_dead_lettered(&self) -> bool {
        matches!(self, DeliveryOutcome::DeadLettered { .. })
    }

    /// Short label used in logs and stats
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Acknowledged { .. } => "acknowledged",
            DeliveryOutcome::Retry { .. } => "retry",
            DeliveryOutcome::DeadLettered { .. } => "dead_lettered",
        }
    }
}

impl std::fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryOutcome::Acknowledged { task_id } => write!(f, "acknowledged ({})", task_id),
            DeliveryOutcome::Retry { reason } => write!(f, "retry ({})", reason),
            DeliveryOutcome::DeadLettered { reason } => write!(f, "dead-lettered ({})", reason),
        }
    }
}
