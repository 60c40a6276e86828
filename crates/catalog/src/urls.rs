//! URL construction for entry and cover-art URIs.
//!
//! Track URIs point back at this process: the advertised host:port plus a
//! routing prefix plus the percent-encoded filesystem path. Embedded
//! pictures reuse the track URL with an `embed=1` query flag.

use common::EmbeddedArt;

#[derive(Clone, Debug)]
pub struct MediaUrls {
    host: String,
    prefix: String,
}

impl MediaUrls {
    /// `host` is the advertised `host:port`; `prefix` the URL path prefix
    /// under which media files are served (normalized to `/prefix`).
    pub fn new(host: &str, prefix: &str) -> Self {
        let mut prefix = prefix.trim_matches('/').to_string();
        if !prefix.is_empty() {
            prefix.insert(0, '/');
        }
        Self {
            host: host.to_string(),
            prefix,
        }
    }

    pub fn file(&self, fs_path: &str) -> String {
        format!("http://{}{}{}", self.host, self.prefix, quote_path(fs_path))
    }

    pub fn embedded_art(&self, fs_path: &str, _kind: EmbeddedArt) -> String {
        format!("{}?embed=1", self.file(fs_path))
    }

    /// Target for the transient placeholder entry served while no
    /// generation exists yet.
    pub fn placeholder(&self) -> String {
        format!("http://{}/waiting", self.host)
    }
}

/// Percent-encode a filesystem path for use in a URL, keeping the slashes.
fn quote_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for (i, seg) in path.split('/').enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(&urlencoding::encode(seg));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_quotes_segments() {
        let urls = MediaUrls::new("10.0.0.5:9090", "media");
        assert_eq!(
            urls.file("/music/Café Tacvba/01 Track.flac"),
            "http://10.0.0.5:9090/media/music/Caf%C3%A9%20Tacvba/01%20Track.flac"
        );
    }

    #[test]
    fn embed_flag_is_appended() {
        let urls = MediaUrls::new("h:1", "media");
        let uri = urls.embedded_art("/m/a.mp3", common::EmbeddedArt::Jpeg);
        assert_eq!(uri, "http://h:1/media/m/a.mp3?embed=1");
    }

    #[test]
    fn prefix_is_normalized() {
        let urls = MediaUrls::new("h:1", "/media/");
        assert_eq!(urls.file("/x"), "http://h:1/media/x");
        let bare = MediaUrls::new("h:1", "");
        assert_eq!(bare.file("/x"), "http://h:1/x");
    }
}
