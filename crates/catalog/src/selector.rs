//! Object-id codec.
//!
//! The external boundary speaks `$`-separated string ids
//! (`0$madrigal$=Artist$17$albums$2`). Internally everything operates on
//! the decoded [`Selector`] variant; ids are re-encoded only when entries
//! are emitted. Ids are only meaningful within the generation that minted
//! them.

use std::fmt;

use crate::CatalogError;

pub const OBJID_PREFIX: &str = "0$madrigal$";

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Root,
    Folders(FolderSel),
    Tags(TagSel),
    Untagged(Option<usize>),
    Playlists(PlaylistSel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderSel {
    Root,
    Dir(usize),
    Item(usize),
    /// Entry of a playlist document sitting in the folder tree.
    PlaylistEntry(usize, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistSel {
    Root,
    List(usize),
    Entry(usize, usize),
}

/// A drill-down path through the tag facets: alternating dimension /
/// chosen-value selectors plus an optional terminal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagSel {
    pub steps: Vec<TagStep>,
    pub terminal: Option<TagTerminal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagStep {
    pub dim: String,
    pub value: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagTerminal {
    Albums,
    Album(i64),
    /// The ">> Complete Album" escape hatch under a partially covered
    /// album.
    AlbumComplete(i64),
    Items,
    Item(usize),
}

impl Selector {
    pub fn decode(objid: &str) -> Result<Self, CatalogError> {
        if objid == "0" {
            return Ok(Selector::Root);
        }
        let Some(rest) = objid.strip_prefix(OBJID_PREFIX) else {
            return Err(bad(objid));
        };
        if rest.is_empty() {
            return Ok(Selector::Root);
        }
        let tokens: Vec<&str> = rest.split('$').collect();
        match tokens[0] {
            "folders" => decode_folders(objid, &tokens[1..]),
            "untagged" => decode_untagged(objid, &tokens[1..]),
            "playlists" => decode_playlists(objid, &tokens[1..]),
            "albums" => Ok(Selector::Tags(TagSel {
                steps: Vec::new(),
                terminal: Some(decode_albums_tail(objid, &tokens[1..])?),
            })),
            "items" => Ok(Selector::Tags(TagSel {
                steps: Vec::new(),
                terminal: Some(decode_items_tail(objid, &tokens[1..])?),
            })),
            t if t.starts_with('=') => decode_tag_path(objid, &tokens),
            _ => Err(bad(objid)),
        }
    }

    pub fn objid(&self) -> String {
        format!("{}", self)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Selector::Root = self {
            return write!(f, "{}", OBJID_PREFIX);
        }
        write!(f, "{}", OBJID_PREFIX.trim_end_matches('$'))?;
        match self {
            Selector::Root => unreachable!(),
            Selector::Folders(FolderSel::Root) => write!(f, "$folders"),
            Selector::Folders(FolderSel::Dir(idx)) => write!(f, "$folders$d{}", idx),
            Selector::Folders(FolderSel::Item(idx)) => write!(f, "$folders$i{}", idx),
            Selector::Folders(FolderSel::PlaylistEntry(idx, entry)) => {
                write!(f, "$folders$d{}$e{}", idx, entry)
            }
            Selector::Untagged(None) => write!(f, "$untagged"),
            Selector::Untagged(Some(idx)) => write!(f, "$untagged$u{}", idx),
            Selector::Playlists(PlaylistSel::Root) => write!(f, "$playlists"),
            Selector::Playlists(PlaylistSel::List(idx)) => write!(f, "$playlists$p{}", idx),
            Selector::Playlists(PlaylistSel::Entry(idx, entry)) => {
                write!(f, "$playlists$p{}$e{}", idx, entry)
            }
            Selector::Tags(sel) => {
                for step in &sel.steps {
                    write!(f, "$={}", step.dim)?;
                    if let Some(value) = step.value {
                        write!(f, "${}", value)?;
                    }
                }
                match sel.terminal {
                    None => Ok(()),
                    Some(TagTerminal::Albums) => write!(f, "$albums"),
                    Some(TagTerminal::Album(id)) => write!(f, "$albums${}", id),
                    Some(TagTerminal::AlbumComplete(id)) => write!(f, "$albums${}$showca", id),
                    Some(TagTerminal::Items) => write!(f, "$items"),
                    Some(TagTerminal::Item(idx)) => write!(f, "$items$i{}", idx),
                }
            }
        }
    }
}

fn bad(objid: &str) -> CatalogError {
    CatalogError::BadObjectId(objid.to_string())
}

fn decode_folders(objid: &str, tokens: &[&str]) -> Result<Selector, CatalogError> {
    match tokens {
        [] => Ok(Selector::Folders(FolderSel::Root)),
        [tok] => {
            if let Some(idx) = tagged_index(tok, 'd') {
                Ok(Selector::Folders(FolderSel::Dir(idx)))
            } else if let Some(idx) = tagged_index(tok, 'i') {
                Ok(Selector::Folders(FolderSel::Item(idx)))
            } else {
                Err(bad(objid))
            }
        }
        [tok, entry] => {
            let idx = tagged_index(tok, 'd').ok_or_else(|| bad(objid))?;
            let entry = tagged_index(entry, 'e').ok_or_else(|| bad(objid))?;
            Ok(Selector::Folders(FolderSel::PlaylistEntry(idx, entry)))
        }
        _ => Err(bad(objid)),
    }
}

fn decode_untagged(objid: &str, tokens: &[&str]) -> Result<Selector, CatalogError> {
    match tokens {
        [] => Ok(Selector::Untagged(None)),
        [tok] => tagged_index(tok, 'u')
            .map(|idx| Selector::Untagged(Some(idx)))
            .ok_or_else(|| bad(objid)),
        _ => Err(bad(objid)),
    }
}

fn decode_playlists(objid: &str, tokens: &[&str]) -> Result<Selector, CatalogError> {
    match tokens {
        [] => Ok(Selector::Playlists(PlaylistSel::Root)),
        [tok] => tagged_index(tok, 'p')
            .map(|idx| Selector::Playlists(PlaylistSel::List(idx)))
            .ok_or_else(|| bad(objid)),
        [tok, entry] => {
            let idx = tagged_index(tok, 'p').ok_or_else(|| bad(objid))?;
            let entry = tagged_index(entry, 'e').ok_or_else(|| bad(objid))?;
            Ok(Selector::Playlists(PlaylistSel::Entry(idx, entry)))
        }
        _ => Err(bad(objid)),
    }
}

fn decode_albums_tail(objid: &str, tokens: &[&str]) -> Result<TagTerminal, CatalogError> {
    match tokens {
        [] => Ok(TagTerminal::Albums),
        [id] => Ok(TagTerminal::Album(parse_i64(id).ok_or_else(|| bad(objid))?)),
        [id, "showca"] => Ok(TagTerminal::AlbumComplete(
            parse_i64(id).ok_or_else(|| bad(objid))?,
        )),
        [_, tok] | [_, "showca", tok] => {
            item_index(tok).map(TagTerminal::Item).ok_or_else(|| bad(objid))
        }
        _ => Err(bad(objid)),
    }
}

fn decode_items_tail(objid: &str, tokens: &[&str]) -> Result<TagTerminal, CatalogError> {
    match tokens {
        [] => Ok(TagTerminal::Items),
        [tok] => item_index(tok).map(TagTerminal::Item).ok_or_else(|| bad(objid)),
        _ => Err(bad(objid)),
    }
}

fn decode_tag_path(objid: &str, tokens: &[&str]) -> Result<Selector, CatalogError> {
    let mut sel = TagSel::default();
    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i];
        if let Some(dim) = tok.strip_prefix('=') {
            if dim.is_empty() {
                return Err(bad(objid));
            }
            let mut step = TagStep {
                dim: dim.to_string(),
                value: None,
            };
            if let Some(next) = tokens.get(i + 1) {
                if let Some(value) = parse_i64(next) {
                    step.value = Some(value);
                    i += 1;
                }
            }
            // A value-less selector is only meaningful in final position.
            if step.value.is_none() && i + 1 < tokens.len() {
                return Err(bad(objid));
            }
            sel.steps.push(step);
            i += 1;
        } else if tok == "albums" {
            sel.terminal = Some(decode_albums_tail(objid, &tokens[i + 1..])?);
            return Ok(Selector::Tags(sel));
        } else if tok == "items" {
            sel.terminal = Some(decode_items_tail(objid, &tokens[i + 1..])?);
            return Ok(Selector::Tags(sel));
        } else if let Some(idx) = item_index(tok) {
            // Track entry listed directly at a tag level.
            if i + 1 != tokens.len() {
                return Err(bad(objid));
            }
            sel.terminal = Some(TagTerminal::Item(idx));
            return Ok(Selector::Tags(sel));
        } else {
            return Err(bad(objid));
        }
    }
    Ok(Selector::Tags(sel))
}

/// Append one path element to an object id.
pub fn child_id(pid: &str, suffix: &str) -> String {
    if pid.ends_with('$') {
        format!("{}{}", pid, suffix)
    } else {
        format!("{}${}", pid, suffix)
    }
}

/// Object id of the container one level up.
pub fn parent_id(objid: &str) -> String {
    match objid.trim_end_matches('$').rfind('$') {
        Some(pos) => objid[..pos].to_string(),
        None => "0".to_string(),
    }
}

fn tagged_index(token: &str, tag: char) -> Option<usize> {
    let rest = token.strip_prefix(tag)?;
    rest.parse().ok()
}

/// Item tokens appear both as `i123` and, historically, `*i123`.
fn item_index(token: &str) -> Option<usize> {
    let token = token.strip_prefix('*').unwrap_or(token);
    tagged_index(token, 'i')
}

fn parse_i64(token: &str) -> Option<i64> {
    token.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(sel: Selector) {
        let id = sel.objid();
        assert_eq!(Selector::decode(&id).unwrap(), sel, "id {}", id);
    }

    #[test]
    fn decodes_root_forms() {
        assert_eq!(Selector::decode("0").unwrap(), Selector::Root);
        assert_eq!(Selector::decode("0$madrigal$").unwrap(), Selector::Root);
    }

    #[test]
    fn roundtrips_every_variant() {
        roundtrip(Selector::Root);
        roundtrip(Selector::Folders(FolderSel::Root));
        roundtrip(Selector::Folders(FolderSel::Dir(7)));
        roundtrip(Selector::Folders(FolderSel::Item(12)));
        roundtrip(Selector::Folders(FolderSel::PlaylistEntry(5, 2)));
        roundtrip(Selector::Untagged(None));
        roundtrip(Selector::Untagged(Some(3)));
        roundtrip(Selector::Playlists(PlaylistSel::Root));
        roundtrip(Selector::Playlists(PlaylistSel::List(2)));
        roundtrip(Selector::Playlists(PlaylistSel::Entry(2, 5)));
        roundtrip(Selector::Tags(TagSel {
            steps: vec![],
            terminal: Some(TagTerminal::Albums),
        }));
        roundtrip(Selector::Tags(TagSel {
            steps: vec![],
            terminal: Some(TagTerminal::AlbumComplete(4)),
        }));
        roundtrip(Selector::Tags(TagSel {
            steps: vec![TagStep {
                dim: "Artist".into(),
                value: None,
            }],
            terminal: None,
        }));
        roundtrip(Selector::Tags(TagSel {
            steps: vec![
                TagStep {
                    dim: "Artist".into(),
                    value: Some(17),
                },
                TagStep {
                    dim: "Genre".into(),
                    value: Some(3),
                },
            ],
            terminal: Some(TagTerminal::Items),
        }));
    }

    #[test]
    fn decodes_drilldown_with_album_terminal() {
        let sel = Selector::decode("0$madrigal$=Artist$17$albums$2$showca").unwrap();
        match sel {
            Selector::Tags(TagSel { steps, terminal }) => {
                assert_eq!(steps.len(), 1);
                assert_eq!(steps[0].value, Some(17));
                assert_eq!(terminal, Some(TagTerminal::AlbumComplete(2)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn accepts_starred_item_tokens() {
        let sel = Selector::decode("0$madrigal$=Genre$3$*i42").unwrap();
        match sel {
            Selector::Tags(TagSel { terminal, .. }) => {
                assert_eq!(terminal, Some(TagTerminal::Item(42)))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(Selector::decode("nonsense").is_err());
        assert!(Selector::decode("0$other$folders").is_err());
        assert!(Selector::decode("0$madrigal$folders$x3").is_err());
        assert!(Selector::decode("0$madrigal$=Artist$=Genre$1$2").is_err());
        assert!(Selector::decode("0$madrigal$bogus").is_err());
    }
}
