//! Translation of the restricted UPnP search-criteria grammar into the
//! engine's query language.
//!
//! The grammar accepted here: `and`/`or`, parenthesized sub-expressions,
//! `<field> contains "<value>"`, `<field> doesNotContain "<value>"`,
//! `<field> derivedFrom "<value>"`, `<field> exists true|false`, and the
//! lone wildcard `*`. Quoted values may contain backslash-escaped inner
//! quotes (phrases) and comma-separated word lists. Unknown field names
//! pass through unchanged rather than failing, to stay permissive against
//! client variance.
//!
//! One known trap is left visible instead of being guessed around: `or`
//! binds looser in the UPnP grammar while the engine has implicit AND and
//! explicit OR, so an unparenthesized mix of `and` and `or` does not
//! associate identically on both sides. Such input is translated as
//! written and flagged with a warning.

use tracing::warn;

use crate::CatalogError;

/// UPnP field name to engine field name.
const FIELD_MAP: &[(&str, &str)] = &[
    ("upnp:album", "album"),
    ("upnp:artist", "artist"),
    ("comment", "comment"),
    ("composer", "composer"),
    ("conductor", "conductor"),
    ("dc:date", "date"),
    ("upnp:genre", "genre"),
    ("duration", "duration"),
    ("res:bitrate", "bitrate"),
    ("res:channels", "channels"),
    ("res:mime", "mtype"),
    ("res:samplefreq", "sample_rate"),
    ("res:size", "fbytes"),
    ("dc:title", "title"),
    ("tt", "title"),
    ("upnp:originalTrackNumber", "tracknumber"),
];

#[derive(Clone, Copy, PartialEq)]
enum Oper {
    None,
    Contains,
    /// Operators the engine has no counterpart for (`derivedFrom`,
    /// `exists`, comparisons): the clause is dropped.
    Ignore,
}

/// Translate criteria and append the directory scope filter when the
/// search is rooted below a folder container.
pub fn translate(criteria: &str, scope_dir: Option<&str>) -> Result<String, CatalogError> {
    let mut query = upnp_to_engine(criteria)?;
    if let Some(dir) = scope_dir {
        if !dir.is_empty() && dir != "/" {
            query.push_str(&format!(" dir:\"{}\"", dir));
        }
    }
    Ok(query)
}

pub fn upnp_to_engine(criteria: &str) -> Result<String, CatalogError> {
    let chars: Vec<char> = criteria.chars().collect();
    let mut out: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut oper = Oper::None;
    let mut neg = false;
    // (saw `and`, saw `or`) per parenthesis level, for the mixed-operator
    // warning.
    let mut levels: Vec<(bool, bool)> = vec![(false, false)];

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c.is_whitespace() {
            continue;
        }
        match c {
            '*' => {
                let rest_blank = chars[i..].iter().all(|c| c.is_whitespace());
                if !out.is_empty() || !rest_blank {
                    return Err(CatalogError::BadSearch(
                        "* must be the whole expression".to_string(),
                    ));
                }
                return Ok("mime:*".to_string());
            }
            '(' => {
                out.push("(".to_string());
                levels.push((false, false));
            }
            ')' => {
                if let Some((saw_and, saw_or)) = levels.pop() {
                    if saw_and && saw_or {
                        warn!("search: unparenthesized and/or mix; engine precedence applies");
                    }
                }
                if levels.is_empty() {
                    levels.push((false, false));
                }
                out.push(")".to_string());
            }
            '<' | '>' | '=' => {
                oper = Oper::Ignore;
            }
            '"' => {
                let (next, tokens) = parse_quoted(&chars, i);
                i = next;
                emit_clause(&mut out, &tokens, &field, oper, neg);
                field.clear();
                oper = Oper::None;
                neg = false;
            }
            _ => {
                let (next, word) = read_word(&chars, i - 1);
                i = next;
                match word.as_str() {
                    "contains" => oper = Oper::Contains,
                    "doesNotContain" => {
                        oper = Oper::Contains;
                        neg = true;
                    }
                    "derivedFrom" | "exists" => oper = Oper::Ignore,
                    // Bare boolean literal, as in `exists true`.
                    "true" | "false" => {}
                    "and" => {
                        if let Some(level) = levels.last_mut() {
                            level.0 = true;
                        }
                    }
                    "or" => {
                        if let Some(level) = levels.last_mut() {
                            level.1 = true;
                        }
                        out.push("OR".to_string());
                    }
                    other => field = map_field(other),
                }
            }
        }
    }
    if let Some((saw_and, saw_or)) = levels.last() {
        if *saw_and && *saw_or {
            warn!("search: unparenthesized and/or mix; engine precedence applies");
        }
    }
    Ok(out.join(" "))
}

fn map_field(name: &str) -> String {
    FIELD_MAP
        .iter()
        .find(|(upnp, _)| *upnp == name)
        .map(|(_, engine)| engine.to_string())
        // Unknown fields pass through as-is.
        .unwrap_or_else(|| name.to_string())
}

/// One comparison's worth of output. `title` is broadened to also match
/// file and directory names, which the engine indexes separately.
fn emit_clause(out: &mut Vec<String>, tokens: &[String], field: &str, oper: Oper, neg: bool) {
    if oper != Oper::Contains || field.is_empty() {
        return;
    }
    let (words, phrases) = split_words_phrases(tokens);
    if words.is_empty() && phrases.is_empty() {
        return;
    }
    if neg {
        out.push("-".to_string());
    }
    let fields: &[&str] = if field == "title" {
        &["title", "filename"]
    } else {
        &[field]
    };
    if fields.len() > 1 {
        out.push("(".to_string());
    }
    for (i, f) in fields.iter().enumerate() {
        out.push("(".to_string());
        match words.len() {
            0 => {}
            1 => out.push(format!("{}:{}", f, words[0])),
            _ => {
                // Comma-separated single words become an OR list.
                out.push("(".to_string());
                for (j, w) in words.iter().enumerate() {
                    if j > 0 {
                        out.push("OR".to_string());
                    }
                    out.push(format!("{}:{}", f, w));
                }
                out.push(")".to_string());
            }
        }
        for phrase in &phrases {
            out.push(format!("{}:\"{}\"", f, phrase));
        }
        out.push(")".to_string());
        if fields.len() > 1 && i == 0 {
            out.push("OR".to_string());
        }
    }
    if fields.len() > 1 {
        out.push(")".to_string());
    }
}

/// Split the value tokens into single words (commas split further) and
/// multi-word phrases.
fn split_words_phrases(tokens: &[String]) -> (Vec<String>, Vec<String>) {
    let mut words = Vec::new();
    let mut phrases = Vec::new();
    for token in tokens {
        if token.split_whitespace().count() > 1 {
            phrases.push(token.clone());
        } else {
            for part in token.split(',') {
                let part = part.trim();
                if !part.is_empty() {
                    words.push(part.to_string());
                }
            }
        }
    }
    (words, phrases)
}

fn read_word(chars: &[char], start: usize) -> (usize, String) {
    let mut word = String::new();
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
            break;
        }
        word.push(c);
        i += 1;
    }
    (i, word)
}

/// Read a double-quoted value, `i` pointing just past the opening quote.
/// Backslash-escaped inner quotes delimit phrases; the first unescaped
/// quote ends the value. Returns the value split into word/phrase tokens.
fn parse_quoted(chars: &[char], i: usize) -> (usize, Vec<String>) {
    let mut processed = String::new();
    let mut escape = false;
    let mut j = i;
    while j < chars.len() {
        let c = chars[j];
        j += 1;
        if escape {
            if c == '"' {
                processed.push('"');
            } else {
                processed.push('\\');
                processed.push(c);
            }
            escape = false;
        } else if c == '\\' {
            escape = true;
        } else if c == '"' {
            break;
        } else {
            processed.push(c);
        }
    }
    (j, tokenize_value(&processed))
}

/// Split a value into tokens: whitespace separates words, quoted runs
/// stay together as phrases.
fn tokenize_value(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for c in value.chars() {
        match c {
            '"' => {
                if in_quote {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    in_quote = false;
                } else {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                    in_quote = true;
                }
            }
            c if c.is_whitespace() && !in_quote => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translates_anded_field_clauses_with_scope() {
        let q = translate(
            r#"(upnp:artist contains "Bach") and (dc:title contains "Mass")"#,
            Some("/music/baroque/"),
        )
        .unwrap();
        assert!(q.contains("artist:Bach"), "query: {}", q);
        assert!(q.contains("title:Mass"), "query: {}", q);
        assert!(q.contains("filename:Mass"), "query: {}", q);
        assert!(q.ends_with(r#"dir:"/music/baroque/""#), "query: {}", q);
    }

    #[test]
    fn root_scope_adds_no_filter() {
        let q = translate(r#"upnp:artist contains "Bach""#, Some("/")).unwrap();
        assert!(!q.contains("dir:"));
        let q = translate(r#"upnp:artist contains "Bach""#, None).unwrap();
        assert!(!q.contains("dir:"));
    }

    #[test]
    fn wildcard_alone_matches_everything() {
        assert_eq!(upnp_to_engine("*").unwrap(), "mime:*");
        assert_eq!(upnp_to_engine("  * ").unwrap(), "mime:*");
        assert!(upnp_to_engine(r#"* and (tt contains "x")"#).is_err());
    }

    #[test]
    fn negation_prefixes_the_clause() {
        let q = upnp_to_engine(r#"upnp:genre doesNotContain "Polka""#).unwrap();
        assert!(q.starts_with('-'), "query: {}", q);
        assert!(q.contains("genre:Polka"));
    }

    #[test]
    fn comma_list_becomes_or_of_terms() {
        let q = upnp_to_engine(r#"upnp:artist contains "bach,handel""#).unwrap();
        assert!(q.contains("artist:bach"), "query: {}", q);
        assert!(q.contains("OR"), "query: {}", q);
        assert!(q.contains("artist:handel"), "query: {}", q);
    }

    #[test]
    fn escaped_inner_quotes_become_phrases() {
        let q = upnp_to_engine(r#"upnp:album contains "goldberg \"live in leipzig\" 1981""#)
            .unwrap();
        assert!(q.contains(r#"album:"live in leipzig""#), "query: {}", q);
        assert!(q.contains("album:goldberg"), "query: {}", q);
        assert!(q.contains("album:1981"), "query: {}", q);
    }

    #[test]
    fn derived_from_and_exists_are_dropped() {
        let q =
            upnp_to_engine(r#"upnp:class derivedFrom "object.container.album""#).unwrap();
        assert_eq!(q.trim(), "");
        let q = upnp_to_engine(r#"upnp:artist exists true"#).unwrap();
        assert_eq!(q.trim(), "");
    }

    #[test]
    fn unknown_fields_pass_through() {
        let q = upnp_to_engine(r#"x:custom contains "v""#).unwrap();
        assert!(q.contains("x:custom:v"), "query: {}", q);
    }

    #[test]
    fn title_broadens_to_filename() {
        let q = upnp_to_engine(r#"dc:title contains "Mass""#).unwrap();
        assert!(q.contains("title:Mass"));
        assert!(q.contains("filename:Mass"));
        assert!(q.contains("OR"));
    }

    #[test]
    fn parentheses_carry_through() {
        let q = upnp_to_engine(
            r#"(upnp:artist contains "a") or (upnp:genre contains "b")"#,
        )
        .unwrap();
        let opens = q.matches('(').count();
        let closes = q.matches(')').count();
        assert_eq!(opens, closes);
        assert!(q.contains("OR"));
    }
}
