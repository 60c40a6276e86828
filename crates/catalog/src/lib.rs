//! The catalog core: projections of the engine's document set into
//! browsable trees, and the coordinator that rebuilds them in the
//! background while requests keep being served.
//!
//! One indexing pass produces one immutable [`generation::Generation`]:
//! the flat document store, the folder tree, the tag projection, the
//! untagged view and the playlist index. The [`service::Catalog`] owns the
//! current generation behind a read-write lock and swaps a freshly built
//! one in atomically.

pub mod entry;
pub mod folders;
pub mod generation;
pub mod playlists;
pub mod search;
pub mod selector;
pub mod service;
pub mod store;
pub mod tags;
pub mod untagged;
pub mod urls;

pub use entry::{Entry, EntryKind};
pub use generation::{BuildOptions, Generation};
pub use selector::{Selector, OBJID_PREFIX};
pub use service::{BrowseFlag, BrowseResult, Catalog, CatalogStatus, Phase};
pub use tags::MergePolicy;
pub use urls::MediaUrls;

use engine::EngineError;

#[derive(Debug)]
pub enum CatalogError {
    Engine(EngineError),
    Sql(rusqlite::Error),
    /// Object id not matching the id scheme, or indexing a tree slot that
    /// does not exist. A protocol error on the caller's side.
    BadObjectId(String),
    /// Search criteria that cannot be translated.
    BadSearch(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Engine(err) => write!(f, "engine error: {}", err),
            CatalogError::Sql(err) => write!(f, "tag db error: {}", err),
            CatalogError::BadObjectId(id) => write!(f, "bad object id: {}", id),
            CatalogError::BadSearch(msg) => write!(f, "bad search criteria: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<EngineError> for CatalogError {
    fn from(err: EngineError) -> Self {
        CatalogError::Engine(err)
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Sql(err)
    }
}
