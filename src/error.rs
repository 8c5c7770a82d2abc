use std::time::Duration;

use thiserror::Error;

use crate::types::SequenceState;

#[derive(Error, Debug)]
pub enum SequenceError {
    #[error("{state}: no element matched `{selector}` within {waited:?}")]
    ElementNotFound {
        state: SequenceState,
        selector: String,
        waited: Duration,
    },

    #[error("no candidate named `{recipient}` (saw {seen:?})")]
    RecipientUnmatched { recipient: String, seen: Vec<String> },

    #[error("{state}: browser driver failed: {source:#}")]
    Driver {
        state: SequenceState,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("flag store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("flag store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
