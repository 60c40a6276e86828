//! Query client shelling out to `recollq`.
//!
//! `recollq -m` prints, for each result, the whole stored metadata array as
//! `name = value` lines, one block per document, after a header of the form
//! `N results`. That dump carries every field the audio input handler
//! stores (artist, album, tracknumber, ...), which is exactly the record
//! shape the catalog needs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use common::{Document, EmbeddedArt};
use tracing::{debug, warn};

use crate::{EngineError, QueryOutcome, SearchBackend};

pub struct RecollDb {
    confdir: PathBuf,
}

impl RecollDb {
    pub fn new(confdir: &Path) -> Self {
        Self {
            confdir: confdir.to_path_buf(),
        }
    }
}

impl SearchBackend for RecollDb {
    fn query(&self, query: &str, stemming: bool) -> Result<QueryOutcome, EngineError> {
        let mut cmd = Command::new("recollq");
        cmd.arg("-c").arg(&self.confdir);
        if !stemming {
            cmd.arg("-s").arg("");
        }
        cmd.arg("-m").arg("-n").arg("0").arg("-q").arg(query);
        debug!("recollq: {:?}", cmd);

        let output = cmd.output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::QueryFailed(format!(
                "recollq exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        parse_query_output(&text)
    }
}

/// Parse the `recollq -m` dump. Tolerant by design: lines that are not
/// `name = value` pairs (abstracts, informational chatter) are skipped.
fn parse_query_output(text: &str) -> Result<QueryOutcome, EngineError> {
    let mut outcome = QueryOutcome::default();
    let mut fields: HashMap<String, String> = HashMap::new();

    for line in text.lines() {
        let line = line.trim_end();
        if outcome.estimate == 0 && outcome.docs.is_empty() && fields.is_empty() {
            if let Some(count) = line.strip_suffix(" results") {
                if let Ok(n) = count.trim().parse() {
                    outcome.estimate = n;
                    continue;
                }
            }
        }
        let Some((name, value)) = split_field(line) else {
            continue;
        };
        // A second url line starts the next document.
        if name == "url" && fields.contains_key("url") {
            push_doc(&mut outcome.docs, std::mem::take(&mut fields));
        }
        fields.insert(name.to_string(), value.to_string());
    }
    if !fields.is_empty() {
        push_doc(&mut outcome.docs, fields);
    }
    Ok(outcome)
}

fn split_field(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(" = ")?;
    let name = name.trim();
    if name.is_empty() || name.contains(' ') {
        return None;
    }
    Some((name, value.trim()))
}

fn push_doc(docs: &mut Vec<Document>, fields: HashMap<String, String>) {
    match doc_from_fields(fields) {
        Some(doc) => docs.push(doc),
        None => warn!("dropping engine result without url/mtype"),
    }
}

/// Build a document from the engine's field names (as defined by the audio
/// input handler and the fields configuration).
fn doc_from_fields(mut fields: HashMap<String, String>) -> Option<Document> {
    let url = fields.remove("url")?;
    let mime = fields.remove("mtype")?;
    let take = |name: &str| common::non_empty(fields.get(name).map(|s| s.as_str())).map(str::to_string);

    let doc = Document {
        title: take("title"),
        filename: take("filename"),
        artist: take("artist"),
        album: take("album"),
        album_artist: take("albumartist"),
        track_number: take("tracknumber").and_then(|v| parse_number(&v)),
        disc_number: take("discnumber").and_then(|v| parse_number(&v)),
        date: take("date"),
        genre: take("genre"),
        composer: take("composer"),
        conductor: take("conductor"),
        orchestra: take("orchestra"),
        content_group: take("contentgroup"),
        comment: take("comment"),
        duration_secs: take("duration").and_then(|v| parse_number(&v)),
        bitrate: take("bitrate").and_then(|v| parse_number(&v)),
        sample_rate: take("sample_rate").and_then(|v| parse_number(&v)),
        channels: take("channels").and_then(|v| parse_number(&v)),
        size_bytes: take("fbytes").and_then(|v| v.parse().ok()),
        embedded_art: take("embdimg").and_then(|v| EmbeddedArt::from_field(&v)),
        art_uri: None,
        url,
        mime,
    };
    Some(doc)
}

/// Track and disc numbers sometimes arrive as `n/total`.
fn parse_number(value: &str) -> Option<u32> {
    value.split('/').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::DocKind;

    const SAMPLE: &str = "\
Recoll query: (mime:*)
2 results
url = file:///music/bach/01 Aria.flac
mtype = audio/flac
title = Aria
artist = Glenn Gould
album = Goldberg Variations
tracknumber = 1/32
duration = 181
embdimg = jpg
url = file:///music/bach
mtype = inode/directory
filename = bach
";

    #[test]
    fn parses_meta_dump() {
        let outcome = parse_query_output(SAMPLE).unwrap();
        assert_eq!(outcome.estimate, 2);
        assert_eq!(outcome.docs.len(), 2);

        let track = &outcome.docs[0];
        assert_eq!(track.kind(), DocKind::Track);
        assert_eq!(track.title.as_deref(), Some("Aria"));
        assert_eq!(track.track_number, Some(1));
        assert_eq!(track.duration_secs, Some(181));
        assert_eq!(track.embedded_art, Some(EmbeddedArt::Jpeg));

        let dir = &outcome.docs[1];
        assert_eq!(dir.kind(), DocKind::Directory);
        assert_eq!(dir.filename.as_deref(), Some("bach"));
    }

    #[test]
    fn skips_chatter_and_empty_fields() {
        let text = "garbage line\nurl = file:///a.mp3\nmtype = audio/mpeg\ntitle = \n";
        let outcome = parse_query_output(text).unwrap();
        assert_eq!(outcome.docs.len(), 1);
        assert!(outcome.docs[0].title.is_none());
    }

    #[test]
    fn no_results_is_empty() {
        let outcome = parse_query_output("Recoll query: (artist:x)\n0 results\n").unwrap();
        assert!(outcome.docs.is_empty());
        assert_eq!(outcome.estimate, 0);
    }

    #[test]
    fn tracknumber_with_total_parses() {
        assert_eq!(parse_number("7/12"), Some(7));
        assert_eq!(parse_number("7"), Some(7));
        assert_eq!(parse_number("x"), None);
    }
}
