use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use tracing::{debug, warn};

/// Identifier schemes accepted by the Open Library covers API.
const COVER_KEYS: [&str; 6] = ["isbn", "olid", "id", "oclc", "lccn", "goodreads"];

#[async_trait]
pub trait CoverFetcher: Send + Sync {
    async fn fetch(&self, key: &str, value: &str) -> anyhow::Result<Bytes>;
}

#[derive(Clone)]
pub struct OpenLibraryCovers {
    http: reqwest::Client,
    base_url: String,
}

impl OpenLibraryCovers {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build covers http client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

pub fn cover_url(base_url: &str, key: &str, value: &str) -> anyhow::Result<String> {
    anyhow::ensure!(COVER_KEYS.contains(&key), "unsupported cover key {key:?}");
    anyhow::ensure!(
        !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'),
        "invalid cover value {value:?}"
    );
    // default=false makes a missing cover a 404 instead of a blank placeholder
    Ok(format!("{base_url}/b/{key}/{value}-M.jpg?default=false"))
}

#[async_trait]
impl CoverFetcher for OpenLibraryCovers {
    async fn fetch(&self, key: &str, value: &str) -> anyhow::Result<Bytes> {
        let url = cover_url(&self.base_url, key, value)?;
        let body = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?
            .bytes()
            .await
            .context("read cover body")?;
        anyhow::ensure!(!body.is_empty(), "empty cover body");
        Ok(body)
    }
}

/// Fetches a cover and inlines it as a `data:` URL. Any failure yields "".
pub async fn cover_data_url(fetcher: &dyn CoverFetcher, key: Option<&str>, value: Option<&str>) -> String {
    let (Some(key), Some(value)) = (key, value) else {
        return String::new();
    };
    match fetcher.fetch(key, value).await {
        Ok(bytes) => {
            debug!(key, value, size = bytes.len(), "cover fetched");
            format!("data:image/jpeg;base64,{}", Base64::encode_string(&bytes))
        }
        Err(e) => {
            warn!(error = %e, key, value, "cover fetch failed; storing empty cover");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[test]
    fn builds_open_library_urls() {
        assert_eq!(
            cover_url("https://covers.openlibrary.org", "isbn", "0385472579").unwrap(),
            "https://covers.openlibrary.org/b/isbn/0385472579-M.jpg?default=false"
        );
        assert!(cover_url("https://c", "olid", "OL7353617M").is_ok());
    }

    #[test]
    fn rejects_unknown_keys_and_odd_values() {
        assert!(cover_url("https://c", "title", "dune").is_err());
        assert!(cover_url("https://c", "isbn", "").is_err());
        assert!(cover_url("https://c", "isbn", "../../etc").is_err());
        assert!(cover_url("https://c", "isbn", "123?x=1").is_err());
    }

    #[tokio::test]
    async fn data_url_on_success_empty_on_failure() {
        let state = AppState::fake();
        let ok = cover_data_url(state.covers.as_ref(), Some("isbn"), Some("123")).await;
        assert_eq!(ok, "data:image/jpeg;base64,/9j/");

        let missing = cover_data_url(state.covers.as_ref(), Some("isbn"), Some("missing")).await;
        assert_eq!(missing, "");

        let none = cover_data_url(state.covers.as_ref(), None, Some("123")).await;
        assert_eq!(none, "");
    }
}
