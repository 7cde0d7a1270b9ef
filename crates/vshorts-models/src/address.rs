//! Source addresses and their alternative forms.
//!
//! When every download strategy has failed against the primary address, the
//! orchestrator makes a last pass over equivalent addresses for the same
//! media. Platforms sometimes apply different bot checks per host.

use serde::Serialize;
use thiserror::Error;
use url::Url;

/// Errors from YouTube id extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum YoutubeIdError {
    #[error("URL is not a YouTube URL")]
    NotYoutube,

    #[error("video id has invalid format")]
    InvalidVideoId,

    #[error("video id not found in URL")]
    VideoIdNotFound,
}

/// Extract the 11-character video id from any common YouTube URL shape
/// (`watch?v=`, `youtu.be/`, `/embed/`, `/v/`, `/shorts/`, `/live/`).
pub fn extract_youtube_id(address: &str) -> Result<String, YoutubeIdError> {
    let url = Url::parse(address.trim()).map_err(|_| YoutubeIdError::NotYoutube)?;
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();

    let candidate = if host == "youtu.be" {
        url.path_segments().and_then(|mut s| s.next()).map(str::to_string)
    } else if host == "youtube.com" || host.ends_with(".youtube.com") {
        url.query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
            .or_else(|| {
                let segments: Vec<&str> = url.path_segments()?.collect();
                match segments.as_slice() {
                    ["embed" | "v" | "shorts" | "live", id, ..] => Some(id.to_string()),
                    _ => None,
                }
            })
    } else {
        return Err(YoutubeIdError::NotYoutube);
    };

    let id = candidate
        .filter(|id| !id.is_empty())
        .ok_or(YoutubeIdError::VideoIdNotFound)?;

    let valid = id.len() == 11
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(YoutubeIdError::InvalidVideoId)
    }
}

/// An equivalent address for the same remote media.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressForm {
    /// Short tag for logs and attempt records ("short_link", "mobile", ...)
    pub label: &'static str,
    pub address: String,
}

impl AddressForm {
    fn new(label: &'static str, address: impl Into<String>) -> Self {
        Self {
            label,
            address: address.into(),
        }
    }
}

/// Alternative forms of `primary`, in the order they should be tried.
///
/// Forms identical to the primary address are left out. Unparseable or
/// non-http addresses have no alternatives.
pub fn alternative_address_forms(primary: &str) -> Vec<AddressForm> {
    let primary = primary.trim();

    let forms = match extract_youtube_id(primary) {
        Ok(id) => vec![
            AddressForm::new("short_link", format!("https://youtu.be/{id}")),
            AddressForm::new("mobile", format!("https://m.youtube.com/watch?v={id}")),
            AddressForm::new("bare_domain", format!("https://youtube.com/watch?v={id}")),
        ],
        Err(_) => generic_forms(primary),
    };

    let mut out: Vec<AddressForm> = Vec::with_capacity(forms.len());
    for form in forms {
        if form.address != primary && !out.iter().any(|f| f.address == form.address) {
            out.push(form);
        }
    }
    out
}

fn generic_forms(primary: &str) -> Vec<AddressForm> {
    let Ok(url) = Url::parse(primary) else {
        return Vec::new();
    };
    if !matches!(url.scheme(), "http" | "https") {
        return Vec::new();
    }
    let Some(host) = url.host_str() else {
        return Vec::new();
    };

    let bare = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(host)
        .to_string();

    [("mobile", format!("m.{bare}")), ("bare_domain", bare)]
        .into_iter()
        .filter_map(|(label, new_host)| {
            let mut alt = url.clone();
            alt.set_host(Some(&new_host)).ok()?;
            Some(AddressForm::new(label, alt.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_youtube_id_shapes() {
        for address in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ?t=10",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://youtube.com/shorts/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ#t=5",
        ] {
            assert_eq!(extract_youtube_id(address).unwrap(), "dQw4w9WgXcQ", "{address}");
        }
    }

    #[test]
    fn test_extract_youtube_id_errors() {
        assert_eq!(
            extract_youtube_id("https://vimeo.com/123"),
            Err(YoutubeIdError::NotYoutube)
        );
        assert_eq!(
            extract_youtube_id("https://youtube.com/watch?v=short"),
            Err(YoutubeIdError::InvalidVideoId)
        );
        assert_eq!(
            extract_youtube_id("https://youtube.com/feed/trending"),
            Err(YoutubeIdError::VideoIdNotFound)
        );
        assert_eq!(extract_youtube_id("not a url"), Err(YoutubeIdError::NotYoutube));
    }

    #[test]
    fn test_youtube_alternatives_in_order() {
        let forms = alternative_address_forms("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        let labels: Vec<_> = forms.iter().map(|f| f.label).collect();
        assert_eq!(labels, vec!["short_link", "mobile", "bare_domain"]);
        assert_eq!(forms[0].address, "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn test_primary_form_is_omitted() {
        let forms = alternative_address_forms("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(forms.len(), 2);
        assert!(forms.iter().all(|f| f.label != "short_link"));
    }

    #[test]
    fn test_generic_alternatives() {
        let forms = alternative_address_forms("https://www.example.com/video/42?x=1");
        assert_eq!(
            forms,
            vec![
                AddressForm::new("mobile", "https://m.example.com/video/42?x=1"),
                AddressForm::new("bare_domain", "https://example.com/video/42?x=1"),
            ]
        );
        assert!(alternative_address_forms("file:///tmp/a.mp4").is_empty());
    }
}
