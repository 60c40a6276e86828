//! The playlists section, and `.m3u` expansion for playlist documents
//! wherever they appear (here or as folder-tree nodes).
//!
//! Expansion re-reads the playlist file on every browse: playlists are
//! small, rarely hammered, and this keeps the generation free of any
//! mutable cache.

use std::fs;
use std::sync::LazyLock;

use common::{basename, dirname, DocKind, Document};
use regex::Regex;
use tracing::warn;

use crate::entry::{sort_entries, Entry, CLASS_PLAYLIST};
use crate::selector::{child_id, PlaylistSel, Selector};
use crate::folders::FolderTree;
use crate::store::DocumentStore;
use crate::urls::MediaUrls;
use crate::CatalogError;

static REMOTE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://").expect("url pattern"));

#[derive(Debug, Default)]
pub struct Playlists {
    idx: Vec<usize>,
}

impl Playlists {
    pub fn build(docs: &DocumentStore) -> Self {
        let mut idx = Vec::new();
        for (docidx, doc) in docs.iter() {
            if doc.kind() == DocKind::Playlist {
                idx.push(docidx);
            }
        }
        Self { idx }
    }

    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    pub fn root_entry(&self, pid: &str) -> Entry {
        Entry::container(
            Selector::Playlists(PlaylistSel::Root).objid(),
            pid,
            format!("{} playlists", self.idx.len()),
        )
    }

    pub fn browse_root(&self, pid: &str, docs: &DocumentStore) -> Vec<Entry> {
        let mut entries = Vec::new();
        for (pos, docidx) in self.idx.iter().enumerate() {
            let Some(doc) = docs.get(*docidx) else {
                continue;
            };
            let id = Selector::Playlists(PlaylistSel::List(pos)).objid();
            entries.push(Entry::container(id, pid, doc.display_title()).with_class(CLASS_PLAYLIST));
        }
        sort_entries(&mut entries);
        entries
    }

    pub fn browse_list(
        &self,
        pos: usize,
        pid: &str,
        folders: &FolderTree,
        docs: &DocumentStore,
        urls: &MediaUrls,
    ) -> Result<Vec<Entry>, CatalogError> {
        let docidx = self
            .idx
            .get(pos)
            .copied()
            .ok_or_else(|| CatalogError::BadObjectId(format!("playlists: no list {}", pos)))?;
        Ok(expand_playlist(docidx, pid, folders, docs, urls))
    }
}

/// Expand one playlist document into its ordered entries. Remote lines
/// become synthetic documents; local lines resolve through the folder
/// tree, and lines that resolve nowhere are skipped with a warning.
pub fn expand_playlist(
    pl_docidx: usize,
    pid: &str,
    folders: &FolderTree,
    docs: &DocumentStore,
    urls: &MediaUrls,
) -> Vec<Entry> {
    let Some(pl_doc) = docs.get(pl_docidx) else {
        warn!("playlists: dangling document index {}", pl_docidx);
        return Vec::new();
    };
    let Some(pl_path) = pl_doc.fs_path() else {
        return Vec::new();
    };
    let content = match fs::read_to_string(pl_path) {
        Ok(content) => content,
        Err(err) => {
            warn!("playlists: cannot read {}: {}", pl_path, err);
            return Vec::new();
        }
    };

    let pl_dir = dirname(pl_path);
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let id = child_id(pid, &format!("e{}", entries.len()));
        if REMOTE_URL_RE.is_match(line) {
            let doc = remote_entry_doc(line);
            if let Some(entry) = Entry::from_doc(id, pid, &doc, urls) {
                entries.push(entry);
            }
        } else {
            let target = if line.starts_with('/') {
                common::normalize_path(std::path::Path::new(line))
            } else {
                common::normalize_path(&common::join_path(pl_dir, line))
            };
            let target = target.to_string_lossy();
            match folders.doc_id_by_path(&target) {
                Some(docidx) => {
                    if let Some(doc) = docs.get(docidx) {
                        if let Some(entry) = Entry::from_doc(id, pid, doc, urls) {
                            entries.push(entry);
                        }
                    }
                }
                None => warn!("playlists: cannot resolve entry {}", target),
            }
        }
    }
    entries
}

/// Synthetic document for a remote playlist line: no filesystem backing,
/// titled by the URL basename, MIME inferred as audio.
fn remote_entry_doc(url: &str) -> Document {
    let name = basename(url);
    let mime = mime_guess::from_path(name)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::AUDIO)
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "audio/mpeg".to_string());
    Document {
        url: url.to_string(),
        mime,
        title: Some(name.to_string()),
        ..Document::default()
    }
}
