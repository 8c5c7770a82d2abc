//! Drives a web messaging composer through a fixed sequence of steps:
//! open the message list, open the composer, fill it in, pick the recipient
//! from the type-ahead list, submit, and record that the run happened.

pub mod compose;
pub mod config;
pub mod dom;
pub mod error;
pub mod events;
pub mod gate;
pub mod hands;
pub mod logging;
pub mod sequencer;
pub mod store;
pub mod types;

pub use compose::MessageTemplate;
pub use config::{PilotConfig, Selectors, Timing, UnmatchedPolicy};
pub use dom::{ChromeDom, Dom};
pub use error::{SequenceError, StoreError};
pub use events::SequenceEvent;
pub use gate::{CompletionGate, GateDecision};
pub use sequencer::Sequencer;
pub use store::{FlagStore, FlagValue, JsonFileStore, MemoryStore};
pub use types::{Candidate, ComposeRequest, RunReport, SequenceState};
