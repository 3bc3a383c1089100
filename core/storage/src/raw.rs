//! Unauthenticated single-file reads over HTTPS.
//!
//! Repository hosts serve the current contents of a branch at a "raw" URL.
//! Reading a blob that way avoids a clone and needs no credential, which is
//! what lets a share recipient fetch a pointer knowing only the owner's name.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use nexusvault_common::{Error, Result};

/// Characters escaped inside one path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Fetches blobs relative to a raw-content base URL.
#[derive(Debug, Clone)]
pub struct RawFetcher {
    http: Client,
    base: Url,
}

impl RawFetcher {
    /// Create a fetcher for `base`, which must end in '/'.
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base)
            .map_err(|e| Error::InvalidInput(format!("Invalid raw URL {}: {}", base, e)))?;
        if !base.path().ends_with('/') {
            return Err(Error::InvalidInput(format!(
                "Raw URL must end with '/': {}",
                base
            )));
        }

        let http = Client::builder()
            .user_agent(concat!("NexusVault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, base })
    }

    /// Full URL for a repository path.
    pub fn url_for(&self, path: &str) -> Result<Url> {
        let encoded: Vec<String> = path
            .split('/')
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();
        self.base
            .join(&encoded.join("/"))
            .map_err(|e| Error::InvalidInput(format!("Invalid repository path {}: {}", path, e)))
    }

    /// Download one blob.
    ///
    /// # Errors
    /// - `Error::NotFound` on HTTP 404
    /// - `Error::Transport` for every other failure
    pub async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.url_for(path)?;
        debug!(url = %url, "Fetching raw blob");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to fetch {}: {}", path, e)))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("Object not found: {}", path)));
        }
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "Fetch of {} failed with HTTP {}",
                path, status
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| Error::Transport(format!("Failed to read {}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_nested_path() {
        let fetcher =
            RawFetcher::new("https://raw.githubusercontent.com/alice/.nexus/master/").unwrap();

        assert_eq!(
            fetcher.url_for("shared/.config/index").unwrap().as_str(),
            "https://raw.githubusercontent.com/alice/.nexus/master/shared/.config/index"
        );
    }

    #[test]
    fn test_url_for_escapes_segments() {
        let fetcher = RawFetcher::new("https://example.com/raw/").unwrap();
        assert_eq!(
            fetcher.url_for("a b/c#d").unwrap().as_str(),
            "https://example.com/raw/a%20b/c%23d"
        );
    }

    #[test]
    fn test_base_without_trailing_slash_rejected() {
        assert!(RawFetcher::new("https://example.com/raw").is_err());
        assert!(RawFetcher::new("not a url").is_err());
    }
}
