use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub const KIND_ANSWER: &str = "answer";
pub const KIND_FAILURE: &str = "failure";

/// One attributed utterance in the curation dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: String,
    pub utterance: String,
    pub raw_utterance: String,
    #[serde(default)]
    pub turn_kind: String,
}

impl ConversationTurn {
    pub fn new(role: impl Into<String>, utterance: impl Into<String>) -> Self {
        let utterance = utterance.into();
        Self {
            role: role.into(),
            raw_utterance: utterance.clone(),
            utterance,
            turn_kind: String::new(),
        }
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw_utterance = raw.into();
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.turn_kind = kind.into();
        self
    }

    pub fn is_failure(&self) -> bool {
        self.turn_kind == KIND_FAILURE
    }
}

pub type SharedHistory = Rc<RefCell<ConversationHistory>>;

/// Append-only log of the turns of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn shared() -> SharedHistory {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// `Role: utterance` lines, oldest first. Failed turns are left out so
    /// later prompts only see real answers.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .filter(|t| !t.is_failure())
            .map(|t| format!("{}: {}", t.role, t.utterance))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drops every turn. Only used when a new run starts.
    pub(crate) fn clear(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_defaults_to_utterance() {
        let turn = ConversationTurn::new("Expert", "hello");
        assert_eq!(turn.raw_utterance, "hello");
        assert_eq!(turn.turn_kind, "");
    }

    #[test]
    fn transcript_skips_failed_turns() {
        let mut history = ConversationHistory::default();
        history.push(ConversationTurn::new("Expert", "first").with_kind(KIND_ANSWER));
        history.push(ConversationTurn::new("Expert", "[no answer]").with_kind(KIND_FAILURE));
        history.push(ConversationTurn::new("Expert", "second").with_kind(KIND_ANSWER));

        assert_eq!(history.len(), 3);
        assert_eq!(history.transcript(), "Expert: first\nExpert: second");
    }
}
