//! Crate-wide error type.
//!
//! Most of the failure modes documented in the specification (a dropped
//! block callback, an empty byte snapshot, a filtered prioritisation id)
//! are ordinary control flow, not `Result::Err` — they are logged and the
//! graph keeps building. `FlowtraceError` covers what is left: malformed
//! wire messages and transport I/O failures.

#[derive(Debug, thiserror::Error)]
pub enum FlowtraceError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed wire message: {0}")]
    Malformed(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, FlowtraceError>;
