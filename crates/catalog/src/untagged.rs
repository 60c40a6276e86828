//! Tracks with no title tag, surfaced as one flat list so they are not
//! lost behind the tag facets.

use common::DocKind;

use crate::entry::Entry;
use crate::selector::Selector;
use crate::store::DocumentStore;
use crate::urls::MediaUrls;
use crate::CatalogError;

#[derive(Debug, Default)]
pub struct Untagged {
    idx: Vec<usize>,
}

impl Untagged {
    pub fn build(docs: &DocumentStore) -> Self {
        let mut idx = Vec::new();
        for (docidx, doc) in docs.iter() {
            if doc.kind() == DocKind::Track && !doc.has_title() {
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
        Entry::container(Selector::Untagged(None).objid(), pid, "[untagged]")
    }

    pub fn browse(
        &self,
        pos: Option<usize>,
        pid: &str,
        docs: &DocumentStore,
        urls: &MediaUrls,
    ) -> Result<Vec<Entry>, CatalogError> {
        match pos {
            None => {
                let mut entries = Vec::new();
                for (pos, docidx) in self.idx.iter().enumerate() {
                    let Some(doc) = docs.get(*docidx) else {
                        continue;
                    };
                    let id = Selector::Untagged(Some(pos)).objid();
                    if let Some(entry) = Entry::from_doc(id, pid, doc, urls) {
                        entries.push(entry);
                    }
                }
                entries.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
                Ok(entries)
            }
            Some(pos) => {
                let docidx = self.idx.get(pos).copied().ok_or_else(|| {
                    CatalogError::BadObjectId(format!("untagged: no entry {}", pos))
                })?;
                let doc = docs.get(docidx).ok_or_else(|| {
                    CatalogError::BadObjectId(format!("untagged: no document {}", docidx))
                })?;
                Ok(Entry::from_doc(
                    Selector::Untagged(Some(pos)).objid(),
                    pid,
                    doc,
                    urls,
                )
                .into_iter()
                .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Document;

    fn doc(path: &str, title: Option<&str>, mime: &str) -> Document {
        Document {
            url: format!("file://{}", path),
            mime: mime.into(),
            title: title.map(str::to_string),
            ..Document::default()
        }
    }

    #[test]
    fn keeps_only_titleless_tracks() {
        let store = DocumentStore::from_docs(vec![
            doc("/m/a.flac", None, "audio/flac"),
            doc("/m/b.flac", Some("Titled"), "audio/flac"),
            doc("/m/c.flac", Some("  "), "audio/flac"),
            doc("/m/dir", None, common::MIME_DIRECTORY),
            doc("/m/p.m3u", None, common::MIME_PLAYLIST),
        ]);
        let untagged = Untagged::build(&store);
        assert_eq!(untagged.len(), 2);
    }

    #[test]
    fn lists_by_filename_fallback_case_insensitively() {
        let store = DocumentStore::from_docs(vec![
            doc("/m/Zebra.flac", None, "audio/flac"),
            doc("/m/alpha.flac", None, "audio/flac"),
        ]);
        let untagged = Untagged::build(&store);
        let urls = MediaUrls::new("h:1", "media");
        let entries = untagged.browse(None, "pid", &store, &urls).unwrap();
        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["alpha.flac", "Zebra.flac"]);
    }

    #[test]
    fn out_of_range_position_is_an_error() {
        let store = DocumentStore::from_docs(vec![]);
        let untagged = Untagged::build(&store);
        let urls = MediaUrls::new("h:1", "media");
        assert!(untagged.browse(Some(0), "pid", &store, &urls).is_err());
    }
}
