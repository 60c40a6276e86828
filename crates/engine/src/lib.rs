//! Boundary to the external full-text engine (Recoll).
//!
//! The engine is a black box with two faces: a query interface that returns
//! indexed documents for a boolean/field query string, and an indexer
//! subprocess that (re)builds the on-disk index and can only be polled for
//! completion.

mod indexer;
mod recoll;

use common::Document;

pub use indexer::{write_engine_config, IndexerHandle};
pub use recoll::RecollDb;

/// Result of one engine query: the engine's own pre-retrieval estimate plus
/// the fully materialized documents.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    pub estimate: usize,
    pub docs: Vec<Document>,
}

/// Query face of the engine. Implementations must be shareable across the
/// request tasks and the rebuild task.
pub trait SearchBackend: Send + Sync {
    fn query(&self, query: &str, stemming: bool) -> Result<QueryOutcome, EngineError>;
}

#[derive(Debug)]
pub enum EngineError {
    Io(std::io::Error),
    /// The query subprocess ran but reported failure.
    QueryFailed(String),
    /// Output from the query subprocess did not parse.
    BadOutput(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Io(err) => write!(f, "engine io error: {}", err),
            EngineError::QueryFailed(msg) => write!(f, "engine query failed: {}", msg),
            EngineError::BadOutput(msg) => write!(f, "bad engine output: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err)
    }
}
