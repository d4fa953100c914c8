//! Fixed marker strings the agents use to signal protocol state in plain
//! message content.

use serde::{Deserialize, Serialize};

pub const CONVERSATION_ENDS: &str = "[CONVERSATION_ENDS]";
pub const CONTINUE: &str = "[CONTINUE]";
pub const PAYMENT_SUCCEEDED: &str = "[PAYMENT_SUCCEEDED]";
pub const PAYMENT_FAILED: &str = "[PAYMENT_FAILED]";
pub const VALIDATION_APPROVED: &str = "[YES]";

/// Markers that end a conversation wherever they show up in recent history.
pub const TERMINATION_MARKERS: [&str; 2] = [CONVERSATION_ENDS, PAYMENT_SUCCEEDED];

/// Canonical form used for sentinel comparisons.
pub fn canonical(content: &str) -> &str {
    content.trim()
}

pub fn is_conversation_end(content: &str) -> bool {
    canonical(content) == CONVERSATION_ENDS
}

pub fn is_validation_approved(content: &str) -> bool {
    canonical(content) == VALIDATION_APPROVED
}

pub fn contains_termination_marker(text: &str) -> bool {
    TERMINATION_MARKERS.iter().any(|marker| text.contains(marker))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Continue,
    End,
}

impl ChatState {
    /// Reads a classifier reply. Only the bare end marker ends the chat;
    /// everything else keeps the conversation going.
    pub fn from_classifier_output(output: &str) -> Self {
        if canonical(output) == CONVERSATION_ENDS {
            Self::End
        } else {
            Self::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        contains_termination_marker, is_conversation_end, is_validation_approved, ChatState,
    };

    #[test]
    fn sentinel_comparison_ignores_surrounding_whitespace() {
        assert!(is_conversation_end("  [CONVERSATION_ENDS]\n"));
        assert!(!is_conversation_end("Thanks! [CONVERSATION_ENDS]"));
        assert!(is_validation_approved("[YES]"));
        assert!(!is_validation_approved("[YES] but shorter"));
    }

    #[test]
    fn termination_markers_are_found_anywhere() {
        assert!(contains_termination_marker("tool: [PAYMENT_SUCCEEDED] order placed"));
        assert!(contains_termination_marker("agent: [CONVERSATION_ENDS]"));
        assert!(!contains_termination_marker("agent: [PAYMENT_FAILED] card declined"));
    }

    #[test]
    fn classifier_output_maps_to_two_states() {
        assert_eq!(ChatState::from_classifier_output("[CONVERSATION_ENDS]"), ChatState::End);
        assert_eq!(ChatState::from_classifier_output("[CONTINUE]"), ChatState::Continue);
        assert_eq!(ChatState::from_classifier_output("not sure"), ChatState::Continue);
    }

    #[test]
    fn classifier_output_mentioning_end_marker_continues() {
        let output = "[CONTINUE] The order is not placed yet, so this is not [CONVERSATION_ENDS].";
        assert_eq!(ChatState::from_classifier_output(output), ChatState::Continue);
        assert_eq!(ChatState::from_classifier_output(" [CONVERSATION_ENDS]\n"), ChatState::End);
    }
}
