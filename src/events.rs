use crate::types::SequenceState;

/// Progress notifications published while a run is in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceEvent {
    StepStarted { state: SequenceState },
    CandidatesScanned { seen: Vec<String>, matched: Option<String> },
    StepFailed { state: SequenceState, message: String },
    Completed { selected: Option<String> },
}

impl SequenceEvent {
    /// One-line rendering for terminal output.
    pub fn describe(&self) -> String {
        match self {
            SequenceEvent::StepStarted { state } => format!("-> {state}"),
            SequenceEvent::CandidatesScanned { seen, matched } => match matched {
                Some(name) => format!("   matched `{name}` among {} candidate(s)", seen.len()),
                None => format!("   no exact match among {:?}", seen),
            },
            SequenceEvent::StepFailed { state, message } => {
                format!("!! {state} failed: {message}")
            }
            SequenceEvent::Completed { selected: Some(name) } => {
                format!("done, sent to `{name}`")
            }
            SequenceEvent::Completed { selected: None } => {
                "done, submitted without a selected recipient".to_string()
            }
        }
    }
}
