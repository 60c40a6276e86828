//! The row shape handed to the parent process for every browsed or
//! searched object, and the canonical listing order.

use std::cmp::Ordering;

use common::{dirname, DocKind, Document};
use serde::Serialize;

use crate::urls::MediaUrls;

pub const CLASS_CONTAINER: &str = "object.container";
pub const CLASS_ALBUM: &str = "object.container.album.musicAlbum";
pub const CLASS_PLAYLIST: &str = "object.container.playlistContainer";
pub const CLASS_TRACK: &str = "object.item.audioItem.musicTrack";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Container,
    Item,
}

#[derive(Clone, Debug, Serialize)]
pub struct Entry {
    pub id: String,
    pub parent_id: String,
    pub kind: EntryKind,
    pub title: String,
    pub upnp_class: String,
    pub searchable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conductor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub art_uri: Option<String>,
}

impl Entry {
    pub fn container(id: impl Into<String>, parent_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.into(),
            kind: EntryKind::Container,
            title: title.into(),
            upnp_class: CLASS_CONTAINER.to_string(),
            searchable: true,
            uri: None,
            mime: None,
            artist: None,
            album: None,
            genre: None,
            date: None,
            composer: None,
            conductor: None,
            comment: None,
            track_number: None,
            duration_secs: None,
            bitrate: None,
            sample_rate: None,
            channels: None,
            size_bytes: None,
            art_uri: None,
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.upnp_class = class.to_string();
        self
    }

    /// Translate a document into an entry. Non-audio documents produce
    /// nothing and simply disappear from listings.
    pub fn from_doc(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        doc: &Document,
        urls: &MediaUrls,
    ) -> Option<Self> {
        let kind = doc.kind();
        let mut entry = match kind {
            DocKind::Directory => Entry::container(id, parent_id, doc.display_title()),
            DocKind::Playlist => {
                Entry::container(id, parent_id, doc.display_title()).with_class(CLASS_PLAYLIST)
            }
            DocKind::Track => {
                let uri = match doc.fs_path() {
                    Some(path) => urls.file(path),
                    None => doc.url.clone(),
                };
                Entry {
                    id: id.into(),
                    parent_id: parent_id.into(),
                    kind: EntryKind::Item,
                    title: doc.display_title(),
                    upnp_class: CLASS_TRACK.to_string(),
                    searchable: false,
                    uri: Some(uri),
                    mime: Some(doc.mime.clone()),
                    artist: doc.artist.clone().or_else(|| doc.album_artist.clone()),
                    album: doc.album.clone(),
                    genre: doc.genre.clone(),
                    date: doc.date.clone(),
                    composer: doc.composer.clone(),
                    conductor: doc.conductor.clone(),
                    comment: doc.comment.clone(),
                    track_number: doc.track_number,
                    duration_secs: doc.duration_secs,
                    bitrate: doc.bitrate,
                    sample_rate: doc.sample_rate,
                    channels: doc.channels,
                    size_bytes: doc.size_bytes,
                    art_uri: doc.art_uri.clone(),
                }
            }
            DocKind::Other => return None,
        };
        if entry.kind == EntryKind::Container {
            entry.art_uri = doc.art_uri.clone();
        }
        Some(entry)
    }
}

/// Containers come first, sorted case-insensitively by title; items follow,
/// sorted by (album, containing directory, track number) with missing
/// values low.
pub fn cmp_entries(a: &Entry, b: &Entry) -> Ordering {
    match (a.kind, b.kind) {
        (EntryKind::Container, EntryKind::Item) => Ordering::Less,
        (EntryKind::Item, EntryKind::Container) => Ordering::Greater,
        (EntryKind::Container, EntryKind::Container) => {
            a.title.to_lowercase().cmp(&b.title.to_lowercase())
        }
        (EntryKind::Item, EntryKind::Item) => {
            let album_a = a.album.as_deref().unwrap_or("");
            let album_b = b.album.as_deref().unwrap_or("");
            album_a
                .cmp(album_b)
                .then_with(|| {
                    let dir_a = a.uri.as_deref().map(dirname).unwrap_or("");
                    let dir_b = b.uri.as_deref().map(dirname).unwrap_or("");
                    dir_a.cmp(dir_b)
                })
                .then_with(|| a.track_number.unwrap_or(0).cmp(&b.track_number.unwrap_or(0)))
        }
    }
}

pub fn sort_entries(entries: &mut [Entry]) {
    entries.sort_by(cmp_entries);
}
