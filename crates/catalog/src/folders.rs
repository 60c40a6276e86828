//! The filesystem-shaped view: one arena of directory nodes built by
//! splitting every document path under the configured top directories.
//!
//! Node 0 is the synthetic super-root; its children are the top
//! directories themselves, keyed by their full path. All other children
//! are keyed by a single path segment. A child maps to an optional
//! directory-node index and an optional owning-document index; either may
//! be absent (placeholder directories have no document, plain files have
//! no node).

use std::collections::BTreeMap;

use common::{basename, DocKind};
use tracing::warn;

use crate::entry::{sort_entries, Entry, CLASS_PLAYLIST};
use crate::selector::{FolderSel, Selector};
use crate::store::DocumentStore;
use crate::urls::MediaUrls;
use crate::CatalogError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChildRef {
    pub dir: Option<usize>,
    pub doc: Option<usize>,
}

#[derive(Debug, Default)]
struct DirNode {
    parent: usize,
    doc: Option<usize>,
    children: BTreeMap<String, ChildRef>,
    visible: bool,
}

#[derive(Debug, Default)]
pub struct FolderTree {
    nodes: Vec<DirNode>,
    topdirs: Vec<String>,
}

impl FolderTree {
    pub fn build(docs: &DocumentStore, topdirs: &[String]) -> Self {
        let topdirs: Vec<String> = topdirs
            .iter()
            .map(|d| d.trim_end_matches('/').to_string())
            .filter(|d| !d.is_empty())
            .collect();

        let mut tree = FolderTree {
            nodes: vec![DirNode::default()],
            topdirs,
        };
        for td in tree.topdirs.clone() {
            let idx = tree.push_node(0, None);
            tree.nodes[0].children.insert(td, ChildRef { dir: Some(idx), doc: None });
        }

        for (docidx, doc) in docs.iter() {
            let Some(path) = doc.fs_path() else {
                continue;
            };
            let Some(top) = tree.matching_topdir(path) else {
                warn!("folders: no top directory matches {}", path);
                continue;
            };
            let rel = path[top.len()..].trim_matches('/');
            if rel.is_empty() {
                // The top directory itself.
                continue;
            }
            let mut segments: Vec<String> =
                rel.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
            if let Some(group) = common::non_empty(doc.content_group.as_deref()) {
                // Virtual grouping directory spliced in above the leaf.
                segments.insert(segments.len() - 1, group.to_string());
            }

            let top = top.to_string();
            let mut cur = tree.nodes[0].children[&top].dir.unwrap_or(0);
            let last = segments.len() - 1;
            for (i, seg) in segments.into_iter().enumerate() {
                if i < last {
                    cur = tree.child_dir(cur, &seg, None);
                } else {
                    match doc.kind() {
                        // Directories and playlists own a node of their
                        // own; a playlist node is a placeholder expanded at
                        // browse time.
                        DocKind::Directory | DocKind::Playlist => {
                            let node = tree.child_dir(cur, &seg, Some(docidx));
                            tree.nodes[node].doc = Some(docidx);
                            if let Some(child) = tree.nodes[cur].children.get_mut(&seg) {
                                child.doc = Some(docidx);
                            }
                        }
                        _ => {
                            // Last writer wins on the document slot.
                            let entry =
                                tree.nodes[cur].children.entry(seg).or_default();
                            entry.doc = Some(docidx);
                        }
                    }
                }
            }
        }

        tree.compute_visibility(docs);
        tree
    }

    fn push_node(&mut self, parent: usize, doc: Option<usize>) -> usize {
        self.nodes.push(DirNode {
            parent,
            doc,
            children: BTreeMap::new(),
            visible: false,
        });
        self.nodes.len() - 1
    }

    /// Get or create the directory node for `name` under `parent`.
    fn child_dir(&mut self, parent: usize, name: &str, doc: Option<usize>) -> usize {
        match self.nodes[parent].children.get(name).copied() {
            Some(ChildRef { dir: Some(dir), .. }) => dir,
            // A file may have claimed this name first; attach a node,
            // keeping the document slot.
            Some(existing) => {
                let idx = self.push_node(parent, doc);
                self.nodes[parent].children.insert(
                    name.to_string(),
                    ChildRef {
                        dir: Some(idx),
                        doc: existing.doc,
                    },
                );
                idx
            }
            None => {
                let idx = self.push_node(parent, doc);
                self.nodes[parent]
                    .children
                    .insert(name.to_string(), ChildRef { dir: Some(idx), doc });
                idx
            }
        }
    }

    /// Longest configured top directory that prefixes `path`.
    fn matching_topdir(&self, path: &str) -> Option<&str> {
        self.topdirs
            .iter()
            .filter(|td| path == td.as_str() || path.starts_with(&format!("{}/", td)))
            .max_by_key(|td| td.len())
            .map(|td| td.as_str())
    }

    /// A node is visible when it leads to at least one audio track or
    /// playlist. Children always carry a higher index than their parent,
    /// so one reverse pass settles the whole arena.
    fn compute_visibility(&mut self, docs: &DocumentStore) {
        for idx in (0..self.nodes.len()).rev() {
            let mut visible = false;
            for child in self.nodes[idx].children.values() {
                if let Some(docidx) = child.doc {
                    if let Some(doc) = docs.get(docidx) {
                        if matches!(doc.kind(), DocKind::Track | DocKind::Playlist) {
                            visible = true;
                            break;
                        }
                    }
                }
                if let Some(dir) = child.dir {
                    if dir > idx && self.nodes[dir].visible {
                        visible = true;
                        break;
                    }
                }
            }
            self.nodes[idx].visible = visible;
        }
        self.nodes[0].visible = true;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Document owning a directory node (the directory's own document or
    /// the playlist behind a placeholder node).
    pub fn node_doc(&self, idx: usize) -> Option<usize> {
        self.nodes.get(idx).and_then(|n| n.doc)
    }

    pub fn root_entry(&self, pid: &str) -> Entry {
        Entry::container(Selector::Folders(FolderSel::Root).objid(), pid, "[folders]")
    }

    pub fn browse(
        &self,
        diridx: usize,
        pid: &str,
        docs: &DocumentStore,
        urls: &MediaUrls,
    ) -> Result<Vec<Entry>, CatalogError> {
        let node = self
            .nodes
            .get(diridx)
            .ok_or_else(|| CatalogError::BadObjectId(format!("folders: no directory {}", diridx)))?;

        let mut entries = Vec::new();
        for (name, child) in &node.children {
            if let Some(dir) = child.dir {
                if !self.nodes[dir].visible {
                    continue;
                }
                let id = Selector::Folders(FolderSel::Dir(dir)).objid();
                let node_doc = self.nodes[dir].doc.and_then(|d| docs.get(d));
                let mut entry = match node_doc {
                    Some(doc) if doc.kind() == DocKind::Playlist => {
                        Entry::container(id, pid, doc.display_title()).with_class(CLASS_PLAYLIST)
                    }
                    _ => Entry::container(id, pid, basename(name)),
                };
                entry.art_uri = self.dir_art(dir, docs);
                entries.push(entry);
            } else if let Some(docidx) = child.doc {
                let Some(doc) = docs.get(docidx) else {
                    warn!("folders: dangling document index {}", docidx);
                    continue;
                };
                let id = Selector::Folders(FolderSel::Item(docidx)).objid();
                if let Some(entry) = Entry::from_doc(id, pid, doc, urls) {
                    entries.push(entry);
                }
            }
        }
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Art for a directory entry: any directly contained non-directory
    /// document that has art. No recursive search.
    fn dir_art(&self, diridx: usize, docs: &DocumentStore) -> Option<String> {
        for child in self.nodes[diridx].children.values() {
            if let Some(docidx) = child.doc {
                if let Some(doc) = docs.get(docidx) {
                    if doc.kind() != DocKind::Directory {
                        if let Some(art) = &doc.art_uri {
                            return Some(art.clone());
                        }
                    }
                }
            }
        }
        None
    }

    /// Single entry describing a directory node itself.
    pub fn meta_entry(
        &self,
        sel: FolderSel,
        pid: &str,
        docs: &DocumentStore,
        urls: &MediaUrls,
    ) -> Result<Option<Entry>, CatalogError> {
        match sel {
            FolderSel::Root => Ok(Some(self.root_entry(pid))),
            FolderSel::Dir(idx) => {
                if idx >= self.nodes.len() {
                    return Err(CatalogError::BadObjectId(format!(
                        "folders: no directory {}",
                        idx
                    )));
                }
                let title = self
                    .node_name(idx)
                    .map(|n| basename(n).to_string())
                    .unwrap_or_else(|| "/".to_string());
                Ok(Some(Entry::container(
                    Selector::Folders(FolderSel::Dir(idx)).objid(),
                    pid,
                    title,
                )))
            }
            FolderSel::Item(docidx) => {
                let doc = docs.get(docidx).ok_or_else(|| {
                    CatalogError::BadObjectId(format!("folders: no document {}", docidx))
                })?;
                Ok(Entry::from_doc(
                    Selector::Folders(FolderSel::Item(docidx)).objid(),
                    pid,
                    doc,
                    urls,
                ))
            }
            // Playlist entries are resolved by the expander, not here.
            FolderSel::PlaylistEntry(..) => Ok(None),
        }
    }

    /// Name of a node within its parent.
    fn node_name(&self, idx: usize) -> Option<&str> {
        let parent = self.nodes.get(idx)?.parent;
        self.nodes[parent]
            .children
            .iter()
            .find(|(_, c)| c.dir == Some(idx))
            .map(|(name, _)| name.as_str())
    }

    /// Reconstruct the absolute logical path of a directory node, the
    /// good old pwd. Best effort: `/` for the root and for anything that
    /// does not resolve; this feeds the search scope filter and must not
    /// fail.
    pub fn path_of(&self, diridx: usize) -> String {
        if diridx == 0 || diridx >= self.nodes.len() {
            return "/".to_string();
        }
        let mut parts: Vec<&str> = Vec::new();
        let mut cur = diridx;
        while cur != 0 {
            match self.node_name(cur) {
                Some(name) => parts.push(name),
                None => return "/".to_string(),
            }
            cur = self.nodes[cur].parent;
        }
        let mut path = String::new();
        for part in parts.iter().rev() {
            path.push_str(part);
            path.push('/');
        }
        path
    }

    /// Resolve an absolute filesystem path to its tree slot.
    pub fn stat(&self, path: &str) -> Option<(usize, ChildRef)> {
        let top = self.matching_topdir(path)?;
        let rel = path[top.len()..].trim_matches('/');
        let mut cur = self.nodes[0].children.get(top)?.dir?;
        if rel.is_empty() {
            return Some((self.nodes[cur].parent, ChildRef { dir: Some(cur), doc: None }));
        }
        let segments: Vec<&str> = rel.split('/').filter(|s| !s.is_empty()).collect();
        let last = segments.len() - 1;
        for (i, seg) in segments.iter().enumerate() {
            let child = self.nodes[cur].children.get(*seg).copied()?;
            if i == last {
                return Some((cur, child));
            }
            cur = child.dir?;
        }
        None
    }

    /// Document index for an absolute path, if the path is indexed.
    pub fn doc_id_by_path(&self, path: &str) -> Option<usize> {
        self.stat(path).and_then(|(_, child)| child.doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{Document, MIME_DIRECTORY};

    fn track(path: &str, album: &str) -> Document {
        Document {
            url: format!("file://{}", path),
            mime: "audio/flac".into(),
            album: if album.is_empty() { None } else { Some(album.into()) },
            ..Document::default()
        }
    }

    fn directory(path: &str) -> Document {
        Document {
            url: format!("file://{}", path),
            mime: MIME_DIRECTORY.into(),
            ..Document::default()
        }
    }

    fn urls() -> MediaUrls {
        MediaUrls::new("h:1", "media")
    }

    fn store(docs: Vec<Document>) -> DocumentStore {
        DocumentStore::from_docs(docs)
    }

    #[test]
    fn reconstructs_document_paths() {
        let docs = store(vec![
            directory("/music/baroque"),
            directory("/music/baroque/bach"),
            track("/music/baroque/bach/01 Aria.flac", "Goldberg"),
        ]);
        let tree = FolderTree::build(&docs, &["/music".into()]);
        let (dir, child) = tree.stat("/music/baroque/bach/01 Aria.flac").unwrap();
        assert_eq!(child.doc, Some(2));
        assert_eq!(tree.path_of(dir), "/music/baroque/bach/");
    }

    #[test]
    fn intermediate_directories_are_created_on_demand() {
        let docs = store(vec![track("/music/a/b/c/track.flac", "X")]);
        let tree = FolderTree::build(&docs, &["/music".into()]);
        assert_eq!(tree.doc_id_by_path("/music/a/b/c/track.flac"), Some(0));
        let entries = tree.browse(0, "0$madrigal$folders", &docs, &urls()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "music");
        let below = tree
            .stat("/music/a/b/c/track.flac")
            .map(|(dir, _)| dir)
            .unwrap();
        assert_eq!(tree.path_of(below), "/music/a/b/c/");
    }

    #[test]
    fn documents_outside_topdirs_are_dropped() {
        let docs = store(vec![track("/elsewhere/x.flac", "X")]);
        let tree = FolderTree::build(&docs, &["/music".into()]);
        assert!(tree.doc_id_by_path("/elsewhere/x.flac").is_none());
    }

    #[test]
    fn longest_topdir_prefix_wins() {
        let docs = store(vec![track("/music/hi-res/x.flac", "X")]);
        let tree = FolderTree::build(&docs, &["/music".into(), "/music/hi-res".into()]);
        let (dir, _) = tree.stat("/music/hi-res/x.flac").unwrap();
        // The file hangs directly under the /music/hi-res super-root.
        assert_eq!(tree.path_of(dir), "/music/hi-res/");
    }

    #[test]
    fn non_audio_directories_are_invisible() {
        let docs = store(vec![
            directory("/music/scans"),
            Document {
                url: "file:///music/scans/booklet.pdf".into(),
                mime: "application/pdf".into(),
                ..Document::default()
            },
            track("/music/live/x.flac", "X"),
        ]);
        let tree = FolderTree::build(&docs, &["/music".into()]);
        let entries = tree.browse(0, "pid", &docs, &urls()).unwrap();
        let top = tree.stat("/music").map(|(_, c)| c.dir.unwrap()).unwrap();
        let listing = tree.browse(top, "pid", &docs, &urls()).unwrap();
        assert_eq!(entries.len(), 1); // just /music itself
        let names: Vec<&str> = listing.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(names, vec!["live"]);
    }

    #[test]
    fn content_group_splices_virtual_directory() {
        let mut doc = track("/music/box/track.flac", "X");
        doc.content_group = Some("Disc One".into());
        let docs = store(vec![doc]);
        let tree = FolderTree::build(&docs, &["/music".into()]);
        // The physical path no longer resolves to the doc; the spliced one
        // does.
        assert_eq!(tree.doc_id_by_path("/music/box/Disc One/track.flac"), Some(0));
    }

    #[test]
    fn last_writer_wins_on_duplicate_leaf() {
        let docs = store(vec![
            track("/music/a/x.flac", "first"),
            track("/music/a/x.flac", "second"),
        ]);
        let tree = FolderTree::build(&docs, &["/music".into()]);
        assert_eq!(tree.doc_id_by_path("/music/a/x.flac"), Some(1));
    }

    #[test]
    fn browse_out_of_range_is_an_error() {
        let docs = store(vec![]);
        let tree = FolderTree::build(&docs, &["/music".into()]);
        assert!(tree.browse(99, "pid", &docs, &urls()).is_err());
        // path_of never raises.
        assert_eq!(tree.path_of(99), "/");
    }
}
