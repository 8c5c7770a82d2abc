use serde::{Deserialize, Serialize};
use std::fmt;

/// One stage of the composer sequence. Stages run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequenceState {
    OpenMessageList,
    OpenComposer,
    PopulateFields,
    SelectCandidate,
    Submit,
    RecordCompletion,
}

impl SequenceState {
    pub const ALL: [SequenceState; 6] = [
        SequenceState::OpenMessageList,
        SequenceState::OpenComposer,
        SequenceState::PopulateFields,
        SequenceState::SelectCandidate,
        SequenceState::Submit,
        SequenceState::RecordCompletion,
    ];

    pub fn first() -> Self {
        SequenceState::OpenMessageList
    }

    /// The state entered after this one, or `None` once the sequence is done.
    pub fn next(self) -> Option<Self> {
        match self {
            SequenceState::OpenMessageList => Some(SequenceState::OpenComposer),
            SequenceState::OpenComposer => Some(SequenceState::PopulateFields),
            SequenceState::PopulateFields => Some(SequenceState::SelectCandidate),
            SequenceState::SelectCandidate => Some(SequenceState::Submit),
            SequenceState::Submit => Some(SequenceState::RecordCompletion),
            SequenceState::RecordCompletion => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SequenceState::OpenMessageList => "open-message-list",
            SequenceState::OpenComposer => "open-composer",
            SequenceState::PopulateFields => "populate-fields",
            SequenceState::SelectCandidate => "select-candidate",
            SequenceState::Submit => "submit",
            SequenceState::RecordCompletion => "record-completion",
        }
    }
}

impl fmt::Display for SequenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The message to send. Built once before the run and only borrowed by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeRequest {
    pub subject: String,
    pub body: String,
    pub recipient_display_name: String,
}

impl ComposeRequest {
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        recipient_display_name: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            recipient_display_name: recipient_display_name.into(),
        }
    }

    /// Text typed into the recipient field to seed the type-ahead: the last
    /// whitespace-separated token of the recipient's name (the surname).
    pub fn search_token(&self) -> &str {
        let trimmed = self.recipient_display_name.trim();
        trimmed.split_whitespace().last().unwrap_or(trimmed)
    }
}

/// A type-ahead suggestion row.
#[derive(Debug, Clone)]
pub struct Candidate<E> {
    pub display_name: String,
    pub row: E,
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Name of the clicked candidate row; `None` when the run submitted unmatched.
    pub selected: Option<String>,
    /// Candidate names seen during the last scan, in element order.
    pub candidates_seen: Vec<String>,
    /// Timestamp written to the flag store (epoch milliseconds).
    pub completed_at_ms: i64,
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_chain_in_order() {
        let mut chain = vec![SequenceState::first()];
        while let Some(next) = chain.last().and_then(|s| s.next()) {
            chain.push(next);
        }
        assert_eq!(chain, SequenceState::ALL.to_vec());
    }

    #[test]
    fn search_token_is_surname() {
        let req = ComposeRequest::new("s", "b", "Erik Boesen");
        assert_eq!(req.search_token(), "Boesen");

        let req = ComposeRequest::new("s", "b", "  Mary Ann  van Dyke ");
        assert_eq!(req.search_token(), "Dyke");

        let req = ComposeRequest::new("s", "b", "Prince");
        assert_eq!(req.search_token(), "Prince");
    }
}
