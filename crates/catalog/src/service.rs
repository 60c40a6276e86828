//! The catalog service: background index/rebuild lifecycle plus request
//! dispatch over the published generation.
//!
//! Lifecycle: Idle -> Indexing (external indexer subprocess runs, readers
//! keep the previous generation) -> Rebuilding (projections under
//! construction, requests get the transient placeholder) -> Idle with the
//! new generation swapped in. The write lock is held only for the pointer
//! swap; the multi-second construction happens on a private generation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use engine::{IndexerHandle, SearchBackend};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::entry::{sort_entries, Entry, EntryKind, CLASS_TRACK};
use crate::generation::{BuildOptions, Generation};
use crate::selector::{parent_id, FolderSel, PlaylistSel, Selector, TagSel, TagTerminal, OBJID_PREFIX};
use crate::{playlists, search, CatalogError};

const INDEXER_POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Indexing,
    Rebuilding,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrowseFlag {
    Children,
    Meta,
}

impl BrowseFlag {
    pub fn parse(value: &str) -> Result<Self, CatalogError> {
        match value {
            "children" => Ok(BrowseFlag::Children),
            "meta" => Ok(BrowseFlag::Meta),
            other => Err(CatalogError::BadObjectId(format!("bad browse flag {}", other))),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BrowseResult {
    pub entries: Vec<Entry>,
    /// Set when the response is the transient "Initializing..."
    /// placeholder, so the caller re-polls instead of caching it.
    pub nocache: bool,
}

#[derive(Debug, Serialize)]
pub struct CatalogStatus {
    pub phase: Phase,
    pub ready: bool,
    pub docs: usize,
    pub albums: usize,
    pub tracks: usize,
    pub playlists: usize,
}

#[derive(Clone)]
pub struct Catalog {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Box<dyn SearchBackend>,
    confdir: PathBuf,
    opts: BuildOptions,
    current: RwLock<Option<Arc<Generation>>>,
    phase: RwLock<Phase>,
}

impl Catalog {
    pub fn new(backend: Box<dyn SearchBackend>, confdir: PathBuf, opts: BuildOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                confdir,
                opts,
                current: RwLock::new(None),
                phase: RwLock::new(Phase::Idle),
            }),
        }
    }

    /// Kick off one index/rebuild cycle. A cycle already in flight makes
    /// this a no-op; returns whether a cycle was started.
    pub fn start_update(&self) -> bool {
        {
            let mut phase = self.inner.phase.write();
            if *phase != Phase::Idle {
                info!("update already running, ignoring trigger");
                return false;
            }
            *phase = Phase::Indexing;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_update_cycle(inner));
        true
    }

    pub fn update_running(&self) -> bool {
        *self.inner.phase.read() != Phase::Idle
    }

    pub fn status(&self) -> CatalogStatus {
        let phase = *self.inner.phase.read();
        let generation = self.generation();
        let (docs, albums, tracks, lists) = match &generation {
            Some(gen) => (
                gen.docs.len(),
                gen.tags.album_count().unwrap_or(0),
                gen.tags.track_count().unwrap_or(0),
                gen.playlists.len(),
            ),
            None => (0, 0, 0, 0),
        };
        CatalogStatus {
            phase,
            ready: generation.is_some() && phase != Phase::Rebuilding,
            docs,
            albums,
            tracks,
            playlists: lists,
        }
    }

    /// Swap a freshly built generation in. Write lock held for the
    /// pointer exchange only.
    pub fn publish(&self, generation: Generation) {
        *self.inner.current.write() = Some(Arc::new(generation));
    }

    fn generation(&self) -> Option<Arc<Generation>> {
        self.inner.current.read().clone()
    }

    /// Generation to serve this request from, or `None` when the request
    /// must get the placeholder: before the first generation exists and
    /// during the rebuild step.
    fn serving_generation(&self) -> Option<Arc<Generation>> {
        if *self.inner.phase.read() == Phase::Rebuilding {
            return None;
        }
        self.generation()
    }

    pub fn browse(&self, objid: &str, flag: BrowseFlag) -> Result<BrowseResult, CatalogError> {
        let Some(gen) = self.serving_generation() else {
            return Ok(self.placeholder());
        };
        let sel = Selector::decode(objid)?;
        let entries = match flag {
            BrowseFlag::Children => self.children(&gen, &sel, objid)?,
            BrowseFlag::Meta => self.meta(&gen, &sel, objid)?,
        };
        Ok(BrowseResult {
            entries,
            nocache: false,
        })
    }

    fn children(
        &self,
        gen: &Generation,
        sel: &Selector,
        objid: &str,
    ) -> Result<Vec<Entry>, CatalogError> {
        let urls = &self.inner.opts.urls;
        match sel {
            Selector::Root => {
                // Tree order: folders, playlists, tags, untagged.
                let mut entries = vec![gen.folders.root_entry(OBJID_PREFIX)];
                entries.push(gen.playlists.root_entry(OBJID_PREFIX));
                entries.extend(gen.tags.root_entries(OBJID_PREFIX, None)?);
                entries.push(gen.untagged.root_entry(OBJID_PREFIX));
                Ok(entries)
            }
            Selector::Folders(FolderSel::Root) => gen.folders.browse(0, objid, &gen.docs, urls),
            Selector::Folders(FolderSel::Dir(idx)) => {
                // A playlist node expands instead of listing directory
                // children.
                if let Some(docidx) = gen.folders.node_doc(*idx) {
                    if let Some(doc) = gen.docs.get(docidx) {
                        if doc.kind() == common::DocKind::Playlist {
                            return Ok(playlists::expand_playlist(
                                docidx,
                                objid,
                                &gen.folders,
                                &gen.docs,
                                urls,
                            ));
                        }
                    }
                }
                gen.folders.browse(*idx, objid, &gen.docs, urls)
            }
            Selector::Folders(sel @ FolderSel::Item(_)) => Ok(gen
                .folders
                .meta_entry(*sel, &parent_id(objid), &gen.docs, urls)?
                .into_iter()
                .collect()),
            Selector::Folders(FolderSel::PlaylistEntry(dir, entry)) => {
                self.folder_playlist_entry(gen, *dir, *entry, objid)
            }
            Selector::Tags(sel) => gen.tags.browse(sel, objid, &gen.docs, urls),
            Selector::Untagged(pos) => gen.untagged.browse(*pos, objid, &gen.docs, urls),
            Selector::Playlists(PlaylistSel::Root) => {
                Ok(gen.playlists.browse_root(objid, &gen.docs))
            }
            Selector::Playlists(PlaylistSel::List(pos)) => {
                gen.playlists.browse_list(*pos, objid, &gen.folders, &gen.docs, urls)
            }
            Selector::Playlists(PlaylistSel::Entry(pos, entry)) => {
                let pid = parent_id(objid);
                let expanded =
                    gen.playlists.browse_list(*pos, &pid, &gen.folders, &gen.docs, urls)?;
                Ok(expanded.into_iter().skip(*entry).take(1).collect())
            }
        }
    }

    /// One entry of a playlist document living in the folder tree.
    fn folder_playlist_entry(
        &self,
        gen: &Generation,
        dir: usize,
        entry: usize,
        objid: &str,
    ) -> Result<Vec<Entry>, CatalogError> {
        let urls = &self.inner.opts.urls;
        let docidx = gen
            .folders
            .node_doc(dir)
            .ok_or_else(|| CatalogError::BadObjectId(objid.to_string()))?;
        let pid = parent_id(objid);
        let expanded = playlists::expand_playlist(docidx, &pid, &gen.folders, &gen.docs, urls);
        Ok(expanded.into_iter().skip(entry).take(1).collect())
    }

    /// The single entry describing the object itself.
    fn meta(
        &self,
        gen: &Generation,
        sel: &Selector,
        objid: &str,
    ) -> Result<Vec<Entry>, CatalogError> {
        let urls = &self.inner.opts.urls;
        let pid = parent_id(objid);
        match sel {
            Selector::Root => Ok(vec![Entry::container(OBJID_PREFIX, "0", "madrigal")]),
            Selector::Folders(FolderSel::PlaylistEntry(dir, entry)) => {
                self.folder_playlist_entry(gen, *dir, *entry, objid)
            }
            Selector::Folders(sel) => Ok(gen
                .folders
                .meta_entry(*sel, &pid, &gen.docs, urls)?
                .into_iter()
                .collect()),
            Selector::Untagged(None) => Ok(vec![gen.untagged.root_entry(&pid)]),
            Selector::Untagged(Some(pos)) => gen.untagged.browse(Some(*pos), &pid, &gen.docs, urls),
            Selector::Playlists(PlaylistSel::Root) => Ok(vec![gen.playlists.root_entry(&pid)]),
            Selector::Tags(TagSel {
                terminal: Some(TagTerminal::Item(docidx)),
                ..
            }) => {
                let doc = gen.docs.get(*docidx).ok_or_else(|| {
                    CatalogError::BadObjectId(format!("tags: no document {}", docidx))
                })?;
                Ok(Entry::from_doc(objid, pid, doc, urls).into_iter().collect())
            }
            // Other containers: answer with a plain container entry named
            // after the last id element.
            _ => {
                let label = objid
                    .trim_end_matches('$')
                    .rsplit('$')
                    .next()
                    .unwrap_or(objid);
                Ok(vec![Entry::container(objid, pid, label)])
            }
        }
    }

    pub fn search(&self, objid: &str, criteria: &str) -> Result<BrowseResult, CatalogError> {
        let Some(gen) = self.serving_generation() else {
            return Ok(self.placeholder());
        };
        // Scope filter only applies below a folder container; everything
        // else searches the whole corpus.
        let scope = match Selector::decode(objid)? {
            Selector::Folders(FolderSel::Dir(idx)) => Some(gen.folders.path_of(idx)),
            _ => None,
        };
        let query = search::translate(criteria, scope.as_deref())?;
        info!("search: engine query <{}>", query);
        let outcome = self.inner.backend.query(&query, true)?;
        info!("search: estimate {}, got {}", outcome.estimate, outcome.docs.len());

        let urls = &self.inner.opts.urls;
        let mut entries = Vec::new();
        for doc in &outcome.docs {
            let Some(path) = doc.fs_path() else {
                continue;
            };
            // Map hits back to in-generation ids; hits that fell out of
            // the tree since the index pass are dropped.
            let Some(docidx) = gen.folders.doc_id_by_path(path) else {
                warn!("search: unresolvable hit {}", path);
                continue;
            };
            let Some(stored) = gen.docs.get(docidx) else {
                continue;
            };
            let id = Selector::Folders(FolderSel::Item(docidx)).objid();
            if let Some(entry) = Entry::from_doc(id, objid, stored, urls) {
                entries.push(entry);
            }
        }
        sort_entries(&mut entries);
        Ok(BrowseResult {
            entries,
            nocache: false,
        })
    }

    fn placeholder(&self) -> BrowseResult {
        let urls = &self.inner.opts.urls;
        let mut entry = Entry::container(OBJID_PREFIX, "0", "Initializing...");
        entry.kind = EntryKind::Item;
        entry.upnp_class = CLASS_TRACK.to_string();
        entry.searchable = false;
        entry.uri = Some(urls.placeholder());
        entry.mime = Some("audio/mpeg".to_string());
        BrowseResult {
            entries: vec![entry],
            nocache: true,
        }
    }

    #[cfg(test)]
    fn set_phase(&self, phase: Phase) {
        *self.inner.phase.write() = phase;
    }
}

/// One full cycle: run the indexer to completion (cooperative poll),
/// rebuild the projections off-thread, swap the generation in. Any
/// failure leaves the previous generation serving.
async fn run_update_cycle(inner: Arc<Inner>) {
    info!(
        "update: indexing {} for {:?}",
        inner.confdir.display(),
        inner.opts.topdirs
    );
    let started = std::time::Instant::now();
    let mut handle = match IndexerHandle::start(&inner.confdir, &inner.opts.topdirs) {
        Ok(handle) => handle,
        Err(err) => {
            warn!("update: failed to start indexer: {}", err);
            *inner.phase.write() = Phase::Idle;
            return;
        }
    };
    let status = loop {
        match handle.poll() {
            Ok(Some(status)) => break status,
            Ok(None) => tokio::time::sleep(INDEXER_POLL_INTERVAL).await,
            Err(err) => {
                warn!("update: indexer poll failed: {}", err);
                *inner.phase.write() = Phase::Idle;
                return;
            }
        }
    };
    if !status.success() {
        warn!("update: indexer exited with {}; keeping previous generation", status);
        *inner.phase.write() = Phase::Idle;
        return;
    }
    info!("update: indexing took {:.1?}", started.elapsed());

    *inner.phase.write() = Phase::Rebuilding;
    let build_inner = Arc::clone(&inner);
    let built = tokio::task::spawn_blocking(move || {
        Generation::build(build_inner.backend.as_ref(), &build_inner.opts)
    })
    .await;
    match built {
        Ok(Ok(generation)) => {
            *inner.current.write() = Some(Arc::new(generation));
            info!("update: new generation published");
        }
        Ok(Err(err)) => warn!("update: rebuild failed: {}; keeping previous generation", err),
        Err(err) => warn!("update: rebuild task failed: {}", err),
    }
    *inner.phase.write() = Phase::Idle;
}
