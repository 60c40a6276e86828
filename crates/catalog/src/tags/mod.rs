//! The tag projection: an in-memory relational view of the document set,
//! queried by the faceted drill-down browser.

mod build;

pub use build::{table_for_dim, MergePolicy, TAG_DIMENSIONS};

use build::col_id;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::info;

use crate::entry::{sort_entries, Entry, CLASS_ALBUM};
use crate::selector::{child_id, parent_id, TagSel, TagStep, TagTerminal};
use crate::store::DocumentStore;
use crate::urls::MediaUrls;
use crate::CatalogError;

pub struct TagProjection {
    // rusqlite connections are not Sync; queries are short and the
    // generation is read-only, so one lock around the handle is enough.
    conn: Mutex<Connection>,
}

struct AlbumRow {
    id: i64,
    title: String,
    art_uri: Option<String>,
    date: Option<String>,
    artist: Option<String>,
}

impl TagProjection {
    pub fn build(docs: &DocumentStore, policy: MergePolicy) -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        build::create_schema(&conn)?;
        build::populate(&conn, docs, policy)?;
        let projection = Self {
            conn: Mutex::new(conn),
        };
        info!(
            "tag projection: {} albums, {} tracks",
            projection.album_count()?,
            projection.track_count()?
        );
        Ok(projection)
    }

    /// Albums as listed (merged parents and standalones only).
    pub fn album_count(&self) -> Result<usize, CatalogError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM albums WHERE albtdisc IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn track_count(&self) -> Result<usize, CatalogError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Entries contributed to the root listing: album and item counts plus
    /// one container per dimension that still discriminates, optionally
    /// scoped to a filesystem subtree.
    pub fn root_entries(&self, pid: &str, scope: Option<&str>) -> Result<Vec<Entry>, CatalogError> {
        let conn = self.conn.lock();
        let scope_like = scope.map(|s| format!("{}%", s.trim_end_matches('/')));

        let albums: i64 = match &scope_like {
            Some(like) => conn.query_row(
                "SELECT COUNT(*) FROM albums WHERE albtdisc IS NULL AND albfolder LIKE ?1",
                params![like],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM albums WHERE albtdisc IS NULL",
                [],
                |row| row.get(0),
            )?,
        };
        let items: i64 = match &scope_like {
            Some(like) => conn.query_row(
                "SELECT COUNT(*) FROM tracks JOIN albums USING (album_id)
                 WHERE albfolder LIKE ?1",
                params![like],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?,
        };

        let mut entries = vec![
            Entry::container(child_id(pid, "albums"), pid, format!("{} albums", albums)),
            Entry::container(child_id(pid, "items"), pid, format!("{} items", items)),
        ];
        for (dim, table) in TAG_DIMENSIONS {
            let col = col_id(table);
            let distinct: i64 = match &scope_like {
                Some(like) => conn.query_row(
                    &format!(
                        "SELECT COUNT(DISTINCT tracks.{}) FROM tracks JOIN albums USING (album_id)
                         WHERE albfolder LIKE ?1",
                        col
                    ),
                    params![like],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    &format!("SELECT COUNT(DISTINCT {}) FROM tracks", col),
                    [],
                    |row| row.get(0),
                )?,
            };
            if distinct > 1 {
                entries.push(Entry::container(
                    child_id(pid, &format!("={}", dim)),
                    pid,
                    *dim,
                ));
            }
        }
        Ok(entries)
    }

    /// Drill-down dispatch for a decoded tag selector. `pid` is the objid
    /// being browsed; child ids extend it.
    pub fn browse(
        &self,
        sel: &TagSel,
        pid: &str,
        docs: &DocumentStore,
        urls: &MediaUrls,
    ) -> Result<Vec<Entry>, CatalogError> {
        let conn = self.conn.lock();

        // A value-less selector is only legal as the very last element.
        for (i, step) in sel.steps.iter().enumerate() {
            if step.value.is_none() && (i + 1 != sel.steps.len() || sel.terminal.is_some()) {
                return Err(CatalogError::BadObjectId(pid.to_string()));
            }
        }

        match sel.terminal {
            Some(TagTerminal::Item(docidx)) => {
                let doc = docs.get(docidx).ok_or_else(|| {
                    CatalogError::BadObjectId(format!("tags: no document {}", docidx))
                })?;
                Ok(Entry::from_doc(pid, parent_id(pid), doc, urls)
                    .into_iter()
                    .collect())
            }
            Some(TagTerminal::Albums) => {
                if sel.steps.is_empty() {
                    let rows = album_rows(&conn, "", &[])?;
                    Ok(album_entries(rows, pid))
                } else {
                    let (where_sql, values) = where_for_steps(&sel.steps, pid)?;
                    let docids = docids_for_sel(&conn, &where_sql, &values)?;
                    if docids.is_empty() {
                        return Ok(Vec::new());
                    }
                    let albids = subtree_albums(&conn, &docids)?;
                    let where_in = format!("AND album_id IN ({})", ids_csv(&albids));
                    let rows = album_rows(&conn, &where_in, &[])?;
                    Ok(album_entries(rows, pid))
                }
            }
            Some(TagTerminal::Album(album_id)) => {
                if sel.steps.is_empty() {
                    return album_track_entries(&conn, album_id, pid, docs, urls);
                }
                let (where_sql, values) = where_for_steps(&sel.steps, pid)?;
                let docids = docids_for_sel(&conn, &where_sql, &values)?;
                let comps = component_album_ids(&conn, album_id)?;
                let comps_csv = ids_csv(&comps);
                let total: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM tracks WHERE album_id IN ({})", comps_csv),
                    [],
                    |row| row.get(0),
                )?;
                let mut entries = if docids.is_empty() {
                    Vec::new()
                } else {
                    let stmt = format!(
                        "SELECT docidx FROM tracks
                         WHERE album_id IN ({}) AND docidx IN ({}) ORDER BY trackno",
                        comps_csv,
                        ids_csv(&docids)
                    );
                    track_entries(&conn, &stmt, pid, docs, urls)?
                };
                sort_entries(&mut entries);
                if total != entries.len() as i64 {
                    // Escape hatch when the current selection covers the
                    // album only partially.
                    let mut with_ca = vec![Entry::container(
                        child_id(pid, "showca"),
                        pid,
                        ">> Complete Album",
                    )];
                    with_ca.append(&mut entries);
                    entries = with_ca;
                }
                Ok(entries)
            }
            Some(TagTerminal::AlbumComplete(album_id)) => {
                album_track_entries(&conn, album_id, pid, docs, urls)
            }
            Some(TagTerminal::Items) => {
                let (where_sql, values) = where_for_steps(&sel.steps, pid)?;
                let stmt = format!("SELECT docidx FROM tracks {}", where_sql);
                let mut entries = track_entries_with(&conn, &stmt, &values, pid, docs, urls)?;
                sort_entries(&mut entries);
                Ok(entries)
            }
            None => {
                let open_dim = sel.steps.last().filter(|s| s.value.is_none());
                if let Some(step) = open_dim {
                    self.value_entries(&conn, &sel.steps[..sel.steps.len() - 1], step, pid)
                } else {
                    self.summary_entries(&conn, &sel.steps, pid, docs, urls)
                }
            }
        }
    }

    /// All remaining distinct values of the dimension opened by the last
    /// selector element.
    fn value_entries(
        &self,
        conn: &Connection,
        prior: &[TagStep],
        step: &TagStep,
        pid: &str,
    ) -> Result<Vec<Entry>, CatalogError> {
        let table = table_for_dim(&step.dim)
            .ok_or_else(|| CatalogError::BadObjectId(format!("unknown dimension {}", step.dim)))?;
        let col = col_id(table);
        let (where_sql, values) = where_for_steps(prior, pid)?;
        let conjunction = if where_sql.is_empty() { "WHERE" } else { "AND" };
        let stmt = format!(
            "SELECT {table}.{col}, {table}.value FROM tracks, {table}
             {where_sql} {conjunction} tracks.{col} = {table}.{col}
             GROUP BY tracks.{col} ORDER BY {table}.value",
            table = table,
            col = col,
            where_sql = where_sql,
            conjunction = conjunction,
        );
        let mut stmt = conn.prepare(&stmt)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(values.iter()))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let value_id: i64 = row.get(0)?;
            let value: String = row.get(1)?;
            entries.push(Entry::container(
                child_id(pid, &value_id.to_string()),
                pid,
                value,
            ));
        }
        Ok(entries)
    }

    /// Listing for a fully determined selector path: album/item counts,
    /// the dimensions that still discriminate, or the tracks themselves
    /// once nothing does.
    fn summary_entries(
        &self,
        conn: &Connection,
        steps: &[TagStep],
        pid: &str,
        docs: &DocumentStore,
        urls: &MediaUrls,
    ) -> Result<Vec<Entry>, CatalogError> {
        let (where_sql, values) = where_for_steps(steps, pid)?;
        let docids = docids_for_sel(conn, &where_sql, &values)?;
        if docids.is_empty() {
            return Ok(Vec::new());
        }
        let albids = subtree_albums(conn, &docids)?;
        let subdims = discriminating_dims(conn, &docids)?;

        let mut entries = Vec::new();
        if albids.len() > 1 {
            entries.push(Entry::container(
                child_id(pid, "albums"),
                pid,
                format!("{} albums", albids.len()),
            ));
            if !subdims.is_empty() {
                entries.push(Entry::container(
                    child_id(pid, "items"),
                    pid,
                    format!("{} items", docids.len()),
                ));
            }
        } else if albids.len() == 1 && !subdims.is_empty() {
            let album_id = albids[0];
            if album_fully_covered(conn, album_id, &docids)? {
                // The selection is exactly one whole album: present it as
                // the album rather than as an item count.
                let where_in = format!("AND album_id = {}", album_id);
                let rows = album_rows(conn, &where_in, &[])?;
                for row in rows {
                    entries.push(album_entry(row, child_id(pid, "albums"), pid));
                }
            } else {
                entries.push(Entry::container(
                    child_id(pid, "items"),
                    pid,
                    format!("{} items", docids.len()),
                ));
            }
        }

        if subdims.is_empty() {
            let stmt = format!(
                "SELECT docidx FROM tracks WHERE docidx IN ({})",
                ids_csv(&docids)
            );
            let mut tracks = track_entries(conn, &stmt, pid, docs, urls)?;
            sort_entries(&mut tracks);
            entries.append(&mut tracks);
        } else {
            for dim in subdims {
                entries.push(Entry::container(
                    child_id(pid, &format!("={}", dim)),
                    pid,
                    dim,
                ));
            }
        }
        Ok(entries)
    }
}

/// WHERE clause for the valued steps of a selector path.
fn where_for_steps(steps: &[TagStep], pid: &str) -> Result<(String, Vec<i64>), CatalogError> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    for step in steps {
        let Some(value) = step.value else {
            continue;
        };
        let table = table_for_dim(&step.dim)
            .ok_or_else(|| CatalogError::BadObjectId(format!("{}: unknown dimension", pid)))?;
        clauses.push(format!("tracks.{} = ?{}", col_id(table), values.len() + 1));
        values.push(value);
    }
    if clauses.is_empty() {
        Ok((String::new(), values))
    } else {
        Ok((format!("WHERE {}", clauses.join(" AND ")), values))
    }
}

fn docids_for_sel(
    conn: &Connection,
    where_sql: &str,
    values: &[i64],
) -> Result<Vec<i64>, CatalogError> {
    let stmt = format!("SELECT docidx FROM tracks {} ORDER BY trackno", where_sql);
    let mut stmt = conn.prepare(&stmt)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn ids_csv(ids: &[i64]) -> String {
    let parts: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    parts.join(",")
}

/// Albums touched by a track selection, mapped through merged parents.
fn subtree_albums(conn: &Connection, docids: &[i64]) -> Result<Vec<i64>, CatalogError> {
    let stmt = format!(
        "SELECT DISTINCT albums.album_id, albums.albalb FROM tracks
         JOIN albums USING (album_id) WHERE docidx IN ({})",
        ids_csv(docids)
    );
    let mut stmt = conn.prepare(&stmt)?;
    let mut rows = stmt.query([])?;
    let mut out: Vec<i64> = Vec::new();
    while let Some(row) = rows.next()? {
        let album_id: i64 = row.get(0)?;
        let parent: Option<i64> = row.get(1)?;
        let id = parent.unwrap_or(album_id);
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out.sort_unstable();
    Ok(out)
}

/// Dimensions with more than one distinct value among the selected tracks.
fn discriminating_dims(
    conn: &Connection,
    docids: &[i64],
) -> Result<Vec<&'static str>, CatalogError> {
    let csv = ids_csv(docids);
    let mut out = Vec::new();
    for (dim, table) in TAG_DIMENSIONS {
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(DISTINCT {}) FROM tracks WHERE docidx IN ({})",
                col_id(table),
                csv
            ),
            [],
            |row| row.get(0),
        )?;
        if count > 1 {
            out.push(*dim);
        }
    }
    Ok(out)
}

/// Component album ids of a possibly merged album, disc order. A plain
/// album is its own single component.
fn component_album_ids(conn: &Connection, album_id: i64) -> Result<Vec<i64>, CatalogError> {
    let mut stmt =
        conn.prepare("SELECT album_id FROM albums WHERE albalb = ?1 ORDER BY albtdisc")?;
    let rows = stmt.query_map(params![album_id], |row| row.get(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    if out.is_empty() {
        out.push(album_id);
    }
    Ok(out)
}

fn album_fully_covered(
    conn: &Connection,
    album_id: i64,
    docids: &[i64],
) -> Result<bool, CatalogError> {
    let comps = component_album_ids(conn, album_id)?;
    let comps_csv = ids_csv(&comps);
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM tracks WHERE album_id IN ({})", comps_csv),
        [],
        |row| row.get(0),
    )?;
    let covered: i64 = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM tracks WHERE album_id IN ({}) AND docidx IN ({})",
            comps_csv,
            ids_csv(docids)
        ),
        [],
        |row| row.get(0),
    )?;
    Ok(total == covered)
}

/// Listed albums (merged parents and standalones), optionally restricted
/// by an extra `AND ...` fragment.
fn album_rows(
    conn: &Connection,
    extra_where: &str,
    params_in: &[i64],
) -> Result<Vec<AlbumRow>, CatalogError> {
    let stmt = format!(
        "SELECT album_id, albtitle, albarturi, albdate, artist.value
         FROM albums LEFT JOIN artist ON artist.artist_id = albums.artist_id
         WHERE albtdisc IS NULL {} ORDER BY albtitle",
        extra_where
    );
    let mut stmt = conn.prepare(&stmt)?;
    let mut rows = stmt.query(rusqlite::params_from_iter(params_in.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(AlbumRow {
            id: row.get(0)?,
            title: row.get(1)?,
            art_uri: row.get(2)?,
            date: row.get(3)?,
            artist: row.get(4)?,
        });
    }
    Ok(out)
}

fn album_entry(row: AlbumRow, id: String, pid: &str) -> Entry {
    let mut entry = Entry::container(child_id(&id, &row.id.to_string()), pid, row.title)
        .with_class(CLASS_ALBUM);
    entry.artist = row.artist;
    entry.date = row.date;
    entry.art_uri = row.art_uri;
    entry
}

fn album_entries(rows: Vec<AlbumRow>, pid: &str) -> Vec<Entry> {
    rows.into_iter()
        .map(|row| {
            let mut entry =
                Entry::container(child_id(pid, &row.id.to_string()), pid, row.title)
                    .with_class(CLASS_ALBUM);
            entry.artist = row.artist;
            entry.date = row.date;
            entry.art_uri = row.art_uri;
            entry
        })
        .collect()
}

/// Entries for a docidx-producing statement without bound parameters.
fn track_entries(
    conn: &Connection,
    stmt: &str,
    pid: &str,
    docs: &DocumentStore,
    urls: &MediaUrls,
) -> Result<Vec<Entry>, CatalogError> {
    track_entries_with(conn, stmt, &[], pid, docs, urls)
}

fn track_entries_with(
    conn: &Connection,
    stmt: &str,
    values: &[i64],
    pid: &str,
    docs: &DocumentStore,
    urls: &MediaUrls,
) -> Result<Vec<Entry>, CatalogError> {
    let mut stmt = conn.prepare(stmt)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(values.iter()), |row| {
        row.get::<_, i64>(0)
    })?;
    let mut entries = Vec::new();
    for row in rows {
        let docidx = row? as usize;
        let Some(doc) = docs.get(docidx) else {
            continue;
        };
        let id = child_id(pid, &format!("i{}", docidx));
        if let Some(entry) = Entry::from_doc(id, pid, doc, urls) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Tracks of a (possibly merged) album: components in disc order, tracks
/// in track order, presented numbering rewritten to a single gapless run.
fn album_track_entries(
    conn: &Connection,
    album_id: i64,
    pid: &str,
    docs: &DocumentStore,
    urls: &MediaUrls,
) -> Result<Vec<Entry>, CatalogError> {
    let comps = component_album_ids(conn, album_id)?;
    let mut entries = Vec::new();
    for comp in comps {
        let stmt = format!(
            "SELECT docidx FROM tracks WHERE album_id = {} ORDER BY trackno",
            comp
        );
        let mut batch = track_entries(conn, &stmt, pid, docs, urls)?;
        entries.append(&mut batch);
    }
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.track_number = Some(i as u32 + 1);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Document;

    fn urls() -> MediaUrls {
        MediaUrls::new("h:1", "media")
    }

    fn track(path: &str, album: &str, artist: &str, trackno: u32) -> Document {
        Document {
            url: format!("file://{}", path),
            mime: "audio/flac".into(),
            title: Some(format!("t{}", trackno)),
            album: Some(album.into()),
            artist: if artist.is_empty() { None } else { Some(artist.into()) },
            track_number: Some(trackno),
            ..Document::default()
        }
    }

    fn projection(docs: Vec<Document>) -> (TagProjection, DocumentStore) {
        let store = DocumentStore::from_docs(docs);
        let tp = TagProjection::build(&store, MergePolicy::default()).unwrap();
        (tp, store)
    }

    fn dim_value_id(tp: &TagProjection, table: &str, value: &str) -> i64 {
        let conn = tp.conn.lock();
        conn.query_row(
            &format!("SELECT {}_id FROM {} WHERE value = ?1", table, table),
            params![value],
            |row| row.get(0),
        )
        .unwrap()
    }

    fn browse(
        tp: &TagProjection,
        store: &DocumentStore,
        steps: Vec<TagStep>,
        terminal: Option<TagTerminal>,
    ) -> Vec<Entry> {
        let sel = TagSel { steps, terminal };
        let pid = crate::Selector::Tags(sel.clone()).objid();
        tp.browse(&sel, &pid, store, &urls()).unwrap()
    }

    fn step(dim: &str, value: Option<i64>) -> TagStep {
        TagStep {
            dim: dim.into(),
            value,
        }
    }

    #[test]
    fn multi_disc_album_merges_into_one() {
        // Two disc-tagged records under one parent folder plus an
        // unrelated same-titled album elsewhere.
        let mut d1 = track("/m/live/cd1/01.flac", "Live [disc 1]", "", 1);
        d1.album_artist = Some("X".into());
        d1.disc_number = Some(1);
        let mut d2 = track("/m/live/cd2/01.flac", "Live [disc 2]", "", 1);
        d2.album_artist = Some("X".into());
        d2.disc_number = Some(2);
        let other = track("/m/other/01.flac", "Live", "Y", 1);
        let (tp, store) = projection(vec![d1, d2, other]);

        assert_eq!(tp.album_count().unwrap(), 2);
        let albums = browse(&tp, &store, vec![], Some(TagTerminal::Albums));
        assert_eq!(albums.len(), 2);
        assert!(albums.iter().all(|a| a.title == "Live"));

        // The merged album expands to both discs' tracks, renumbered.
        let merged = albums
            .iter()
            .find(|a| a.artist.as_deref() == Some("X"))
            .unwrap();
        let album_id: i64 = merged.id.rsplit('$').next().unwrap().parse().unwrap();
        let tracks = browse(&tp, &store, vec![], Some(TagTerminal::Album(album_id)));
        assert_eq!(tracks.len(), 2);
        let numbers: Vec<u32> = tracks.iter().filter_map(|t| t.track_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn gap_in_disc_numbers_abandons_merge() {
        let mut d1 = track("/m/live/cd1/01.flac", "Live", "X", 1);
        d1.disc_number = Some(1);
        let mut d3 = track("/m/live/cd3/01.flac", "Live", "X", 1);
        d3.disc_number = Some(3);
        let (tp, store) = projection(vec![d1, d3]);
        // Both surface standalone instead of silently vanishing.
        assert_eq!(tp.album_count().unwrap(), 2);
        let albums = browse(&tp, &store, vec![], Some(TagTerminal::Albums));
        assert_eq!(albums.len(), 2);
    }

    #[test]
    fn strict_policy_requires_disc_one() {
        let mut d2 = track("/m/live/cd2/01.flac", "Live", "X", 1);
        d2.disc_number = Some(2);
        let mut d3 = track("/m/live/cd3/01.flac", "Live", "X", 1);
        d3.disc_number = Some(3);
        let store = DocumentStore::from_docs(vec![d2, d3]);
        let tp = TagProjection::build(&store, MergePolicy::Strict).unwrap();
        assert_eq!(tp.album_count().unwrap(), 2);
        let tp = TagProjection::build(&store, MergePolicy::Dense).unwrap();
        assert_eq!(tp.album_count().unwrap(), 1);
    }

    #[test]
    fn album_artist_inferred_only_when_uniform() {
        let docs = vec![
            track("/m/a/01.flac", "A", "X", 1),
            track("/m/a/02.flac", "A", "X", 2),
            track("/m/b/01.flac", "B", "X", 1),
            track("/m/b/02.flac", "B", "Y", 2),
        ];
        let (tp, store) = projection(docs);
        let albums = browse(&tp, &store, vec![], Some(TagTerminal::Albums));
        let a = albums.iter().find(|e| e.title == "A").unwrap();
        let b = albums.iter().find(|e| e.title == "B").unwrap();
        assert_eq!(a.artist.as_deref(), Some("X"));
        assert_eq!(b.artist, None);
    }

    #[test]
    fn drilldown_lists_values_then_albums() {
        let docs = vec![
            track("/m/a/01.flac", "A", "X", 1),
            track("/m/b/01.flac", "B", "Y", 1),
        ];
        let (tp, store) = projection(docs);
        let values = browse(&tp, &store, vec![step("Artist", None)], None);
        let titles: Vec<&str> = values.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["X", "Y"]);

        let x = dim_value_id(&tp, "artist", "X");
        let albums = browse(
            &tp,
            &store,
            vec![step("Artist", Some(x))],
            Some(TagTerminal::Albums),
        );
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].title, "A");
    }

    #[test]
    fn items_count_matches_reachable_tracks() {
        // One album, artist X on three tracks, artist Y on the fourth;
        // genre varies so a dimension keeps discriminating.
        let mut docs = vec![
            track("/m/a/01.flac", "A", "X", 1),
            track("/m/a/02.flac", "A", "X", 2),
            track("/m/a/03.flac", "A", "X", 3),
            track("/m/a/04.flac", "A", "Y", 4),
        ];
        for (i, doc) in docs.iter_mut().enumerate() {
            doc.genre = Some(if i % 2 == 0 { "g1" } else { "g2" }.into());
        }
        let (tp, store) = projection(docs);
        let x = dim_value_id(&tp, "artist", "X");
        let entries = browse(&tp, &store, vec![step("Artist", Some(x))], None);
        let items = entries.iter().find(|e| e.title.ends_with(" items")).unwrap();
        assert_eq!(items.title, "3 items");

        let items_sel = browse(
            &tp,
            &store,
            vec![step("Artist", Some(x))],
            Some(TagTerminal::Items),
        );
        assert_eq!(items_sel.len(), 3);
    }

    #[test]
    fn fully_covered_single_album_shortcuts_to_album_entry() {
        let mut docs = vec![
            track("/m/a/01.flac", "A", "X", 1),
            track("/m/a/02.flac", "A", "X", 2),
        ];
        docs[0].genre = Some("g1".into());
        docs[1].genre = Some("g2".into());
        let (tp, store) = projection(docs);
        let x = dim_value_id(&tp, "artist", "X");
        let entries = browse(&tp, &store, vec![step("Artist", Some(x))], None);
        assert!(entries.iter().any(|e| e.upnp_class == CLASS_ALBUM && e.title == "A"));
        assert!(!entries.iter().any(|e| e.title.ends_with(" items")));
    }

    #[test]
    fn exhausted_dimensions_list_tracks_directly() {
        let docs = vec![
            track("/m/a/01.flac", "A", "X", 1),
            track("/m/a/02.flac", "A", "X", 2),
        ];
        let (tp, store) = projection(docs);
        let x = dim_value_id(&tp, "artist", "X");
        let entries = browse(&tp, &store, vec![step("Artist", Some(x))], None);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.kind == crate::EntryKind::Item));
    }

    #[test]
    fn partial_album_selection_offers_complete_album() {
        let docs = vec![
            track("/m/a/01.flac", "A", "X", 1),
            track("/m/a/02.flac", "A", "Y", 2),
        ];
        let (tp, store) = projection(docs);
        let x = dim_value_id(&tp, "artist", "X");
        let albums = browse(
            &tp,
            &store,
            vec![step("Artist", Some(x))],
            Some(TagTerminal::Albums),
        );
        let album_id: i64 = albums[0].id.rsplit('$').next().unwrap().parse().unwrap();
        let entries = browse(
            &tp,
            &store,
            vec![step("Artist", Some(x))],
            Some(TagTerminal::Album(album_id)),
        );
        assert_eq!(entries[0].title, ">> Complete Album");
        assert_eq!(entries.len(), 2);
        let complete = browse(
            &tp,
            &store,
            vec![step("Artist", Some(x))],
            Some(TagTerminal::AlbumComplete(album_id)),
        );
        assert_eq!(complete.len(), 2);
    }

    #[test]
    fn rebuild_from_same_documents_is_idempotent() {
        let docs = vec![
            track("/m/a/01.flac", "A", "X", 1),
            track("/m/b/01.flac", "B", "Y", 1),
        ];
        let store = DocumentStore::from_docs(docs);
        let tp1 = TagProjection::build(&store, MergePolicy::default()).unwrap();
        let tp2 = TagProjection::build(&store, MergePolicy::default()).unwrap();

        let titles = |tp: &TagProjection| -> Vec<String> {
            let sel = TagSel {
                steps: vec![],
                terminal: Some(TagTerminal::Albums),
            };
            let pid = crate::Selector::Tags(sel.clone()).objid();
            tp.browse(&sel, &pid, &store, &urls())
                .unwrap()
                .into_iter()
                .map(|e| e.title)
                .collect()
        };
        assert_eq!(titles(&tp1), titles(&tp2));
        assert_eq!(tp1.album_count().unwrap(), tp2.album_count().unwrap());
        assert_eq!(tp1.track_count().unwrap(), tp2.track_count().unwrap());
    }

    #[test]
    fn zero_match_selection_returns_empty() {
        let docs = vec![track("/m/a/01.flac", "A", "X", 1)];
        let (tp, store) = projection(docs);
        let entries = browse(
            &tp,
            &store,
            vec![step("Artist", Some(999))],
            Some(TagTerminal::Items),
        );
        assert!(entries.is_empty());
    }

    #[test]
    fn unknown_dimension_is_an_error() {
        let docs = vec![track("/m/a/01.flac", "A", "X", 1)];
        let (tp, store) = projection(docs);
        let sel = TagSel {
            steps: vec![step("Bogus", None)],
            terminal: None,
        };
        assert!(tp.browse(&sel, "pid", &store, &urls()).is_err());
    }

    #[test]
    fn root_entries_scope_to_subtree() {
        let docs = vec![
            track("/m/a/01.flac", "A", "X", 1),
            track("/m/b/01.flac", "B", "Y", 1),
        ];
        let (tp, _store) = projection(docs);
        let all = tp.root_entries("0$madrigal$", None).unwrap();
        assert_eq!(all[0].title, "2 albums");
        assert_eq!(all[1].title, "2 items");
        assert!(all.iter().any(|e| e.title == "Artist"));

        let scoped = tp.root_entries("0$madrigal$", Some("/m/a/")).unwrap();
        assert_eq!(scoped[0].title, "1 albums");
        assert_eq!(scoped[1].title, "1 items");
        // Only one artist remains below the scope: the dimension collapses.
        assert!(!scoped.iter().any(|e| e.title == "Artist"));
    }
}
