//! Analysis core for a symbolic-execution trace-viewer plugin.
//!
//! Builds two control-flow graphs — a basic-block graph and a symbolic-state
//! graph — out of host-engine callbacks ([`plugin::PluginBoundary`]),
//! streams newly discovered edges to an external viewer process over a
//! length-delimited Unix-domain transport ([`transport`]), and runs a
//! background thread that turns viewer-requested state priorities into a
//! fresh searcher for the host's scheduler ([`prioritisation`]).
//!
//! The host engine itself, its guest module map, and guest memory access
//! are collaborator traits in [`collaborators`] that the embedder
//! implements; no FFI or engine implementation lives in this crate.

pub mod block_graph;
pub mod collaborators;
pub mod config;
pub mod edge_batcher;
pub mod error;
pub mod identity;
pub mod node;
pub mod plugin;
pub mod prioritisation;
pub mod state_graph;
pub mod transport;
pub mod translation_cache;

#[cfg(test)]
mod tests;

pub use config::FlowtraceConfig;
pub use error::{FlowtraceError, Result};
pub use plugin::PluginBoundary;
