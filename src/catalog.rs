//! Catalog item stubs and the helpers that turn them into download requests.
//!
//! The search service itself is an external collaborator; only the shape of
//! its results is modeled here.

use serde::{Deserialize, Deserializer, Serialize};

use crate::download::DownloadRequest;

/// One search result from the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Catalog id; doubles as the download id.
    pub id: String,
    /// Video title.
    pub title: String,
    /// Thumbnail URL, empty when absent.
    #[serde(default)]
    pub thumbnail: String,
    /// Duration as reported by the catalog (`"12:34"` or seconds).
    #[serde(default, deserialize_with = "string_or_number")]
    pub duration: String,
    /// Uploader display name, empty when absent.
    #[serde(default)]
    pub uploader: String,
}

impl CatalogItem {
    /// Builds the download request for this item.
    ///
    /// The source reference is the item's canonical page on `domain`; the
    /// display name is the title.
    #[must_use]
    pub fn to_download_request(&self, domain: &str) -> DownloadRequest {
        DownloadRequest::new(&self.id, video_page_url(domain, &self.id), &self.title)
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchPage {
    /// Items on this page.
    #[serde(default)]
    pub items: Vec<CatalogItem>,
    /// Whether another page exists.
    #[serde(default, rename = "hasMore", alias = "has_more")]
    pub has_more: bool,
}

/// Returns the catalog site root, `https://<domain>/`.
///
/// Surrounding whitespace, a scheme prefix and trailing slashes on `domain`
/// are ignored.
#[must_use]
pub fn site_url(domain: &str) -> String {
    let host = domain.trim();
    let host = host
        .strip_prefix("https://")
        .or_else(|| host.strip_prefix("http://"))
        .unwrap_or(host)
        .trim_end_matches('/');
    format!("https://{host}/")
}

/// Returns the canonical page URL for a video: `https://<domain>/video/<id>`.
#[must_use]
pub fn video_page_url(domain: &str, id: &str) -> String {
    format!("{}video/{}", site_url(domain), id.trim())
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(u64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => String::new(),
        Some(Raw::Text(text)) => text,
        Some(Raw::Integer(seconds)) => seconds.to_string(),
        Some(Raw::Float(seconds)) => seconds.to_string(),
    })
}
