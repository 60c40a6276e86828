//! Flat, index-addressed store of all documents of one generation.

use common::Document;
use engine::SearchBackend;
use tracing::info;

use crate::CatalogError;

/// The engine is asked for `mime:*`: every indexed document matches a MIME
/// clause, and the number of distinct types is small enough not to blow up
/// the query, unlike a `title:*` style wildcard.
const FETCH_ALL_QUERY: &str = "mime:*";

#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: Vec<Document>,
}

impl DocumentStore {
    pub fn fetch(backend: &dyn SearchBackend) -> Result<Self, CatalogError> {
        let outcome = backend.query(FETCH_ALL_QUERY, false)?;
        info!(
            "document store: engine estimated {}, retrieved {}",
            outcome.estimate,
            outcome.docs.len()
        );
        Ok(Self { docs: outcome.docs })
    }

    pub fn from_docs(docs: Vec<Document>) -> Self {
        Self { docs }
    }

    pub fn get(&self, idx: usize) -> Option<&Document> {
        self.docs.get(idx)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Enumerated iteration; the position is the document's identity for
    /// the lifetime of the generation.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Document)> {
        self.docs.iter().enumerate()
    }

    pub(crate) fn docs_mut(&mut self) -> &mut [Document] {
        &mut self.docs
    }
}
