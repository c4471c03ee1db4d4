//! Error types for the devtools engine.
//!
//! Only programmer errors and configuration faults surface here. Reducer
//! faults during replay never become a `DevtoolsError`; they are recorded on
//! the affected [`ComputedState`](crate::state::ComputedState) entries instead.

use thiserror::Error;

/// Errors that can occur while building lifted actions or configuring the engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DevtoolsError {
    /// An application action reported an empty type
    ///
    /// Every recorded action needs a type so it can be displayed and
    /// replayed. This is checked when a [`PerformAction`](crate::PerformAction)
    /// is constructed.
    #[error("Actions must have a non-empty type. Did you forget to set the action type?")]
    MissingActionType,

    /// The history cap is too small to hold the INIT entry plus one action
    #[error("maxAge must be at least 2 when set, got {0}")]
    InvalidMaxAge(usize),

    /// An inbound payload could not be decoded into an action
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// A value could not be serialized for export
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DevtoolsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for devtools operations.
pub type Result<T> = std::result::Result<T, DevtoolsError>;
