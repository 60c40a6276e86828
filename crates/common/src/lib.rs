use std::path::{Path, PathBuf};

pub const MIME_DIRECTORY: &str = "inode/directory";
pub const MIME_PLAYLIST: &str = "audio/x-mpegurl";

/// Audio MIME types surfaced in the browse trees. Everything else stays in
/// the document store but never becomes a visible entry.
pub const AUDIO_MIME_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/flac",
    "application/flac",
    "audio/x-flac",
    "application/x-flac",
    "application/ogg",
    "audio/aac",
    "audio/mp4",
    "video/mp4",
    "audio/x-aiff",
    "audio/x-musepack",
    "audio/ape",
    "audio/x-wav",
    "audio/x-wavpack",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocKind {
    Track,
    Directory,
    Playlist,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddedArt {
    Jpeg,
    Png,
}

impl EmbeddedArt {
    pub fn from_field(value: &str) -> Option<Self> {
        match value.trim_start_matches('.') {
            "jpg" | "jpeg" => Some(EmbeddedArt::Jpeg),
            "png" => Some(EmbeddedArt::Png),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            EmbeddedArt::Jpeg => "jpg",
            EmbeddedArt::Png => "png",
        }
    }
}

/// One indexed filesystem object (or a synthetic stand-in created while
/// expanding a playlist). Identity is positional: the index in the document
/// store of the generation that produced it.
#[derive(Clone, Debug, Default)]
pub struct Document {
    /// `file://` URL for local objects, an absolute remote URL otherwise.
    pub url: String,
    pub mime: String,
    pub title: Option<String>,
    pub filename: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_number: Option<u32>,
    pub disc_number: Option<u32>,
    pub date: Option<String>,
    pub genre: Option<String>,
    pub composer: Option<String>,
    pub conductor: Option<String>,
    pub orchestra: Option<String>,
    /// Virtual subdirectory hint spliced into the folder tree.
    pub content_group: Option<String>,
    pub comment: Option<String>,
    pub duration_secs: Option<u32>,
    pub bitrate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub size_bytes: Option<u64>,
    pub embedded_art: Option<EmbeddedArt>,
    /// Cover-art URI, resolved once at generation-build time.
    pub art_uri: Option<String>,
}

impl Document {
    pub fn kind(&self) -> DocKind {
        if self.mime == MIME_DIRECTORY {
            DocKind::Directory
        } else if self.mime == MIME_PLAYLIST {
            DocKind::Playlist
        } else if AUDIO_MIME_TYPES.contains(&self.mime.as_str()) {
            DocKind::Track
        } else {
            DocKind::Other
        }
    }

    /// Filesystem path for local documents, `None` for remote URLs.
    pub fn fs_path(&self) -> Option<&str> {
        self.url.strip_prefix("file://")
    }

    pub fn is_remote(&self) -> bool {
        self.fs_path().is_none()
    }

    /// Containing folder: the document itself for directories, the parent
    /// directory for everything else.
    pub fn folder(&self) -> Option<String> {
        let path = self.fs_path()?;
        if self.kind() == DocKind::Directory {
            Some(path.to_string())
        } else {
            Some(dirname(path).to_string())
        }
    }

    /// Title with the fallback chain used everywhere a label is needed.
    pub fn display_title(&self) -> String {
        if let Some(title) = non_empty(self.title.as_deref()) {
            return title.to_string();
        }
        if let Some(name) = non_empty(self.filename.as_deref()) {
            return name.to_string();
        }
        basename(&self.url).to_string()
    }

    pub fn has_title(&self) -> bool {
        non_empty(self.title.as_deref()).is_some()
    }
}

pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Last path segment of a slash-separated path or URL.
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Everything up to the last slash, without a trailing slash.
pub fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/",
        Some(pos) => &trimmed[..pos],
        None => "",
    }
}

pub fn join_path(base: &str, rest: &str) -> PathBuf {
    let mut out = PathBuf::from(base);
    for part in rest.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        out.push(part);
    }
    out
}

/// Lexically normalize a path: resolve `.` and `..`, collapse repeated
/// slashes. No filesystem access.
pub fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basename_and_dirname() {
        assert_eq!(basename("/music/a/b.mp3"), "b.mp3");
        assert_eq!(basename("/music/a/"), "a");
        assert_eq!(basename("b.mp3"), "b.mp3");
        assert_eq!(dirname("/music/a/b.mp3"), "/music/a");
        assert_eq!(dirname("/top.mp3"), "/");
        assert_eq!(dirname("b.mp3"), "");
    }

    #[test]
    fn document_kind_from_mime() {
        let mut doc = Document {
            url: "file:///music/t.flac".into(),
            mime: "audio/flac".into(),
            ..Document::default()
        };
        assert_eq!(doc.kind(), DocKind::Track);
        doc.mime = MIME_DIRECTORY.into();
        assert_eq!(doc.kind(), DocKind::Directory);
        doc.mime = MIME_PLAYLIST.into();
        assert_eq!(doc.kind(), DocKind::Playlist);
        doc.mime = "text/plain".into();
        assert_eq!(doc.kind(), DocKind::Other);
    }

    #[test]
    fn display_title_fallback() {
        let doc = Document {
            url: "file:///music/dir/track01.mp3".into(),
            mime: "audio/mpeg".into(),
            ..Document::default()
        };
        assert_eq!(doc.display_title(), "track01.mp3");
        let doc = Document {
            title: Some("Aria".into()),
            ..doc
        };
        assert_eq!(doc.display_title(), "Aria");
    }

    #[test]
    fn folder_of_directory_is_itself() {
        let dir = Document {
            url: "file:///music/album".into(),
            mime: MIME_DIRECTORY.into(),
            ..Document::default()
        };
        assert_eq!(dir.folder().unwrap(), "/music/album");
        let track = Document {
            url: "file:///music/album/01.mp3".into(),
            mime: "audio/mpeg".into(),
            ..Document::default()
        };
        assert_eq!(track.folder().unwrap(), "/music/album");
    }

    #[test]
    fn normalize_strips_dot_segments() {
        assert_eq!(
            normalize_path(Path::new("/music/./a/../b/x.mp3")),
            PathBuf::from("/music/b/x.mp3")
        );
    }
}
