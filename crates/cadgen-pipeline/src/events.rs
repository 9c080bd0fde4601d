//! Pipeline event types

use cadgen_ai::Provider;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which entry point started a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Generate,
    Repair,
    Pasted,
    Program,
}

/// Events emitted while a run progresses, one per stage transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A run started
    RunStart { kind: RunKind, label: String },

    /// Provider call issued
    Requesting { provider: Provider, model: String },

    /// Provider call returned
    ResponseReceived { chars: usize },

    /// Validation failed once; a code-only prompt follows
    CorrectivePrompt { reason: String },

    /// A program was extracted from the response
    Extracted { lines: usize },

    /// Auto-patch rewrote the program
    Patched { changes: Vec<String> },

    /// Program handed to the executor
    Executing,

    /// Repair attempt `attempt` of `max_attempts` started
    RepairAttempt { attempt: u32, max_attempts: u32 },

    /// A repair attempt failed and the loop continues
    AttemptFailed { attempt: u32, error: String },

    /// The run produced a finished part
    Succeeded {
        result_type: String,
        /// Mesh file to view, if one was found
        mesh: Option<PathBuf>,
        /// Text the program printed
        output: String,
        /// Repair attempt that succeeded, for repair runs
        attempt: Option<u32>,
    },

    /// The run ended without a part
    Failed { kind: String, message: String },
}

impl PipelineEvent {
    /// Check if this is a terminal event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineEvent::Succeeded { .. } | PipelineEvent::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag() {
        let event = PipelineEvent::RepairAttempt {
            attempt: 2,
            max_attempts: 3,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "repair_attempt");
        assert_eq!(json["attempt"], 2);
    }

    #[test]
    fn test_terminal_events() {
        assert!(PipelineEvent::Failed {
            kind: "busy".into(),
            message: "busy".into()
        }
        .is_terminal());
        assert!(!PipelineEvent::Executing.is_terminal());
    }
}
