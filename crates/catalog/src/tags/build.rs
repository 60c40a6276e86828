//! Schema creation and population of the in-memory tag database.
//!
//! One two-column table per tag dimension (`<name>_id`, `value`), a
//! `tracks` table with one join column per dimension, and an `albums`
//! table keyed by (title, folder, disc number). After the main pass the
//! per-disc albums that belong together are coalesced under a synthetic
//! parent record (`albalb` points at it); only records with a NULL
//! `albtdisc` ever appear in album listings.

use std::collections::HashMap;
use std::sync::LazyLock;

use common::{basename, dirname, DocKind, Document};
use regex::Regex;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::store::DocumentStore;

/// Facet dimensions: presentation name, table/field name.
pub const TAG_DIMENSIONS: &[(&str, &str)] = &[
    ("Artist", "artist"),
    ("Comment", "comment"),
    ("Composer", "composer"),
    ("Conductor", "conductor"),
    ("Date", "date"),
    ("Genre", "genre"),
    ("Group", "contentgroup"),
    ("Orchestra", "orchestra"),
];

pub fn table_for_dim(dim: &str) -> Option<&'static str> {
    TAG_DIMENSIONS
        .iter()
        .find(|(name, _)| *name == dim)
        .map(|(_, table)| *table)
}

pub fn col_id(table: &str) -> String {
    format!("{}_id", table)
}

/// Disc-number contiguity required before per-disc albums are merged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergePolicy {
    /// Consecutive run, any starting disc.
    #[default]
    Dense,
    /// Consecutive run anchored at disc 1.
    Strict,
}

impl std::str::FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dense" => Ok(MergePolicy::Dense),
            "strict" => Ok(MergePolicy::Strict),
            other => Err(format!("unknown merge policy: {}", other)),
        }
    }
}

// "Title [disc 2]", "Title (disc 2)", "Title, disc 2".
static DISC_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.*?)\s*(?:[\[(]\s*disc\s*(\d+)\s*[\])]|,\s*disc\s*(\d+))\s*$")
        .expect("disc title pattern")
});

// Folder basenames like "cd2", "CD 2", "disc02".
static DISC_FOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:cd|disc)[ _-]*0*(\d+)$").expect("disc folder pattern"));

pub(super) fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE albums (album_id INTEGER PRIMARY KEY, artist_id INT,
         albtitle TEXT, albfolder TEXT, albdate TEXT, albarturi TEXT,
         albalb INT, albtdisc INT)",
        [],
    )?;
    let mut tracks = String::from(
        "CREATE TABLE tracks (docidx INT, album_id INT, trackno INT, title TEXT",
    );
    for (_, table) in TAG_DIMENSIONS {
        conn.execute(
            &format!(
                "CREATE TABLE {} ({} INTEGER PRIMARY KEY, value TEXT)",
                table,
                col_id(table)
            ),
            [],
        )?;
        tracks.push_str(&format!(", {} INT", col_id(table)));
    }
    tracks.push(')');
    conn.execute(&tracks, [])?;
    Ok(())
}

/// Insert-if-absent into a dimension table; returns the id either way.
fn aux_insert(conn: &Connection, table: &str, value: &str) -> rusqlite::Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            &format!("SELECT {} FROM {} WHERE value = ?1", col_id(table), table),
            params![value],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        &format!("INSERT INTO {}(value) VALUES(?1)", table),
        params![value],
    )?;
    Ok(conn.last_insert_rowid())
}

fn doc_value<'a>(doc: &'a Document, table: &str) -> Option<&'a str> {
    let value = match table {
        "artist" => doc.artist.as_deref(),
        "comment" => doc.comment.as_deref(),
        "composer" => doc.composer.as_deref(),
        "conductor" => doc.conductor.as_deref(),
        "date" => doc.date.as_deref(),
        "genre" => doc.genre.as_deref(),
        "contentgroup" => doc.content_group.as_deref(),
        "orchestra" => doc.orchestra.as_deref(),
        _ => None,
    };
    common::non_empty(value)
}

/// Album title and disc number for a track. A disc marker in the album
/// title is always stripped; the number itself comes from the explicit
/// tag when present, else from the marker, else from a `cdNN`-style
/// folder basename.
fn album_title_and_disc(doc: &Document, folder: &str) -> (String, Option<i64>) {
    let raw = match common::non_empty(doc.album.as_deref()) {
        Some(album) => album.to_string(),
        None => basename(folder).to_string(),
    };
    let mut title = raw.clone();
    let mut marker_disc = None;
    if let Some(caps) = DISC_TITLE_RE.captures(&raw) {
        let number = caps.get(2).or_else(|| caps.get(3));
        if let Some(number) = number {
            if let Ok(n) = number.as_str().parse::<i64>() {
                if let Some(stem) = caps.get(1).map(|m| m.as_str().trim()) {
                    if !stem.is_empty() {
                        title = stem.to_string();
                        marker_disc = Some(n);
                    }
                }
            }
        }
    }
    let folder_disc = DISC_FOLDER_RE
        .captures(basename(folder))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<i64>().ok());

    let disc = doc
        .disc_number
        .map(|n| n as i64)
        .or(marker_disc)
        .or(folder_disc);
    (title, disc)
}

#[derive(Default)]
struct ArtistState {
    explicit: bool,
    seen: bool,
    candidate: Option<i64>,
    broken: bool,
}

pub(super) fn populate(
    conn: &Connection,
    docs: &DocumentStore,
    policy: MergePolicy,
) -> rusqlite::Result<()> {
    let mut artist_state: HashMap<i64, ArtistState> = HashMap::new();

    for (docidx, doc) in docs.iter() {
        if doc.kind() != DocKind::Track {
            continue;
        }
        let folder = doc.folder().unwrap_or_default();
        let (albtitle, disc) = album_title_and_disc(doc, &folder);

        let explicit_artist = match common::non_empty(doc.album_artist.as_deref()) {
            Some(name) => Some(aux_insert(conn, "artist", name)?),
            None => None,
        };

        let existing: Option<(i64, Option<i64>)> = conn
            .query_row(
                "SELECT album_id, artist_id FROM albums
                 WHERE albtitle = ?1 AND albfolder = ?2 AND albtdisc IS ?3",
                params![albtitle, folder, disc],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let album_id = match existing {
            Some((id, artist)) => {
                if artist.is_none() {
                    if let Some(artist_id) = explicit_artist {
                        conn.execute(
                            "UPDATE albums SET artist_id = ?1 WHERE album_id = ?2",
                            params![artist_id, id],
                        )?;
                    }
                }
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO albums (artist_id, albtitle, albfolder, albdate, albarturi, albtdisc)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![explicit_artist, albtitle, folder, doc.date, doc.art_uri, disc],
                )?;
                conn.last_insert_rowid()
            }
        };

        let mut columns = String::from("docidx, album_id, trackno, title");
        let mut placeholders = String::from("?1, ?2, ?3, ?4");
        let mut values: Vec<Value> = vec![
            Value::from(docidx as i64),
            Value::from(album_id),
            Value::from(doc.track_number.unwrap_or(0) as i64),
            Value::from(doc.title.clone().unwrap_or_default()),
        ];
        let mut track_artist = None;
        for (_, table) in TAG_DIMENSIONS {
            let Some(value) = doc_value(doc, table) else {
                continue;
            };
            let id = aux_insert(conn, table, value)?;
            if *table == "artist" {
                track_artist = Some(id);
            }
            columns.push_str(", ");
            columns.push_str(&col_id(table));
            values.push(Value::from(id));
            placeholders.push_str(&format!(", ?{}", values.len()));
        }
        conn.execute(
            &format!("INSERT INTO tracks ({}) VALUES ({})", columns, placeholders),
            rusqlite::params_from_iter(values),
        )?;

        // Uniform-artist tracking: the first disagreement between track
        // artists marks the album as not inferable, permanently.
        let state = artist_state.entry(album_id).or_default();
        if explicit_artist.is_some() {
            state.explicit = true;
        }
        if !state.explicit && !state.broken {
            if !state.seen {
                state.seen = true;
                state.candidate = track_artist;
            } else if state.candidate != track_artist {
                state.broken = true;
            }
        }
    }

    for (album_id, state) in &artist_state {
        if state.explicit || state.broken {
            continue;
        }
        if let Some(artist_id) = state.candidate {
            conn.execute(
                "UPDATE albums SET artist_id = ?1
                 WHERE album_id = ?2 AND artist_id IS NULL",
                params![artist_id, album_id],
            )?;
        }
    }

    merge_disc_albums(conn, policy)
}

struct MergeCandidate {
    album_id: i64,
    disc: i64,
}

/// Coalesce per-disc albums. Grouping key: (title, artist, parent folder)
/// so `.../Album/cd1` + `.../Album/cd2` and two disc-tagged records in one
/// folder both group. A group whose disc numbers fail the contiguity
/// policy is demoted: disc numbers cleared, albums listed standalone.
fn merge_disc_albums(conn: &Connection, policy: MergePolicy) -> rusqlite::Result<()> {
    let mut groups: HashMap<(String, Option<i64>, String), Vec<MergeCandidate>> = HashMap::new();
    {
        let mut stmt = conn.prepare(
            "SELECT album_id, albtitle, artist_id, albfolder, albtdisc
             FROM albums WHERE albtdisc IS NOT NULL AND albalb IS NULL",
        )?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let album_id: i64 = row.get(0)?;
            let title: String = row.get(1)?;
            let artist: Option<i64> = row.get(2)?;
            let folder: String = row.get(3)?;
            let disc: i64 = row.get(4)?;
            let key = (title, artist, dirname(&folder).to_string());
            groups.entry(key).or_default().push(MergeCandidate { album_id, disc });
        }
    }

    for ((title, _, _), mut group) in groups {
        group.sort_by_key(|c| c.disc);
        let ids: Vec<String> = group.iter().map(|c| c.album_id.to_string()).collect();
        let ids = ids.join(",");
        if group.len() == 1 {
            conn.execute(
                &format!("UPDATE albums SET albtdisc = NULL WHERE album_id IN ({})", ids),
                [],
            )?;
            continue;
        }
        let contiguous = group.windows(2).all(|w| w[1].disc == w[0].disc + 1)
            && (policy == MergePolicy::Dense || group[0].disc == 1);
        if contiguous {
            conn.execute(
                "INSERT INTO albums (artist_id, albtitle, albfolder, albdate, albarturi)
                 SELECT artist_id, albtitle, albfolder, albdate, albarturi
                 FROM albums WHERE album_id = ?1",
                params![group[0].album_id],
            )?;
            let parent = conn.last_insert_rowid();
            conn.execute(
                &format!("UPDATE albums SET albalb = ?1 WHERE album_id IN ({})", ids),
                params![parent],
            )?;
            debug!("merged {} discs of '{}' into album {}", group.len(), title, parent);
        } else {
            conn.execute(
                &format!("UPDATE albums SET albtdisc = NULL WHERE album_id IN ({})", ids),
                [],
            )?;
            warn!(
                "disc numbers of '{}' are not contiguous, keeping albums separate",
                title
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disc_markers_in_titles() {
        let doc = Document {
            album: Some("Live [disc 2]".into()),
            ..Document::default()
        };
        assert_eq!(album_title_and_disc(&doc, "/m/a"), ("Live".into(), Some(2)));
        let doc = Document {
            album: Some("Live (Disc 10)".into()),
            ..Document::default()
        };
        assert_eq!(album_title_and_disc(&doc, "/m/a"), ("Live".into(), Some(10)));
        let doc = Document {
            album: Some("Live, disc 3".into()),
            ..Document::default()
        };
        assert_eq!(album_title_and_disc(&doc, "/m/a"), ("Live".into(), Some(3)));
    }

    #[test]
    fn explicit_disc_tag_still_strips_marker() {
        let doc = Document {
            album: Some("Live [disc 1]".into()),
            disc_number: Some(4),
            ..Document::default()
        };
        assert_eq!(album_title_and_disc(&doc, "/m/a"), ("Live".into(), Some(4)));
    }

    #[test]
    fn disc_from_folder_basename() {
        let doc = Document {
            album: Some("Live".into()),
            ..Document::default()
        };
        assert_eq!(album_title_and_disc(&doc, "/m/live/cd2"), ("Live".into(), Some(2)));
        assert_eq!(album_title_and_disc(&doc, "/m/live/Disc 03"), ("Live".into(), Some(3)));
        assert_eq!(album_title_and_disc(&doc, "/m/live/takes"), ("Live".into(), None));
    }

    #[test]
    fn album_falls_back_to_folder_basename() {
        let doc = Document::default();
        assert_eq!(album_title_and_disc(&doc, "/m/Unsorted"), ("Unsorted".into(), None));
    }
}
