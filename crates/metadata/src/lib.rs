use std::fs;
use std::path::{Path, PathBuf};

use lofty::error::LoftyError;
use lofty::picture::{Picture, PictureType};
use lofty::prelude::TaggedFileExt;

/// Image names recognized as directory cover art, compared
/// case-insensitively against direct children only.
const ART_BASENAMES: &[&str] = &["cover", "folder"];
const ART_EXTENSIONS: &[&str] = &["jpg", "png"];

#[derive(Debug, Clone)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: String,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

/// Extract the embedded picture from an audio container, preferring the
/// front cover.
pub fn read_embedded_cover(path: &Path) -> Result<Option<CoverArt>, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => tag,
        None => return Ok(None),
    };
    let picture = match pick_picture(tag.pictures()) {
        Some(picture) => picture,
        None => return Ok(None),
    };
    let data = picture.data().to_vec();
    let mime = sniff_image_mime(&data).unwrap_or("application/octet-stream");
    Ok(Some(CoverArt {
        data,
        mime: mime.to_string(),
    }))
}

/// Look for `cover.jpg` / `folder.png` style art among the direct children
/// of `dir`. The scan is deliberately not recursive.
pub fn find_folder_art(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let lower = name.to_lowercase();
        for base in ART_BASENAMES {
            for ext in ART_EXTENSIONS {
                if lower == format!("{}.{}", base, ext) {
                    return Some(dir.join(name));
                }
            }
        }
    }
    None
}

/// Image sitting next to a track file: `<track stem>.jpg` or `.png`.
pub fn find_adjacent_art(audio_path: &Path) -> Option<PathBuf> {
    let stem = audio_path.with_extension("");
    for ext in ART_EXTENSIONS {
        let candidate = stem.with_extension(ext);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn pick_picture(pictures: &[Picture]) -> Option<&Picture> {
    pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
}

fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png")
    } else {
        None
    }
}
