//! One immutable build of all derived trees from one indexing pass.

use std::collections::HashMap;
use std::path::Path;

use common::{DocKind, Document};
use engine::SearchBackend;

use crate::folders::FolderTree;
use crate::playlists::Playlists;
use crate::store::DocumentStore;
use crate::tags::{MergePolicy, TagProjection};
use crate::untagged::Untagged;
use crate::urls::MediaUrls;
use crate::CatalogError;

#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub topdirs: Vec<String>,
    pub urls: MediaUrls,
    pub merge: MergePolicy,
    /// Cover-art resolution touches the filesystem; tests building
    /// generations from synthetic documents switch it off.
    pub resolve_art: bool,
}

pub struct Generation {
    pub docs: DocumentStore,
    pub folders: FolderTree,
    pub tags: TagProjection,
    pub untagged: Untagged,
    pub playlists: Playlists,
}

impl Generation {
    /// Fetch everything from the engine and build all projections. An
    /// engine failure aborts the build; the caller keeps serving the
    /// previous generation.
    pub fn build(backend: &dyn SearchBackend, opts: &BuildOptions) -> Result<Self, CatalogError> {
        let store = DocumentStore::fetch(backend)?;
        Self::from_store(store, opts)
    }

    pub fn from_store(mut store: DocumentStore, opts: &BuildOptions) -> Result<Self, CatalogError> {
        if opts.resolve_art {
            resolve_art_uris(store.docs_mut(), &opts.urls);
        }
        let folders = FolderTree::build(&store, &opts.topdirs);
        let tags = TagProjection::build(&store, opts.merge)?;
        let untagged = Untagged::build(&store);
        let playlists = Playlists::build(&store);
        Ok(Self {
            docs: store,
            folders,
            tags,
            untagged,
            playlists,
        })
    }
}

/// Compute the cover-art URI of every document once per generation:
/// embedded picture first, then a track-adjacent image, then per-folder
/// art cached per directory since whole albums share it.
fn resolve_art_uris(docs: &mut [Document], urls: &MediaUrls) {
    let mut folder_cache: HashMap<String, Option<String>> = HashMap::new();
    for doc in docs.iter_mut() {
        let Some(path) = doc.fs_path().map(str::to_string) else {
            continue;
        };
        if let Some(kind) = doc.embedded_art {
            doc.art_uri = Some(urls.embedded_art(&path, kind));
            continue;
        }
        if doc.kind() != DocKind::Directory {
            if let Some(art) = metadata::find_adjacent_art(Path::new(&path)) {
                doc.art_uri = Some(urls.file(&art.to_string_lossy()));
                continue;
            }
        }
        let Some(folder) = doc.folder() else {
            continue;
        };
        let art = folder_cache
            .entry(folder.clone())
            .or_insert_with(|| {
                metadata::find_folder_art(Path::new(&folder))
                    .map(|p| urls.file(&p.to_string_lossy()))
            })
            .clone();
        doc.art_uri = art;
    }
}
