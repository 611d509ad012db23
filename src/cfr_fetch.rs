// Page fetching for the route page.
//
// The monitor needs the itinerary cards as rendered markup. The default
// fetcher does a plain HTTP GET; point `--url` at a pre-rendering proxy when
// the site only builds the cards client-side, or feed a saved page with
// `--html-file`.

use crate::cfr_models::{CFRError, Result};
use reqwest::blocking;
use std::path::PathBuf;
use std::time::Duration;

pub trait PageFetcher {
    fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpPageFetcher {
    client: blocking::Client,
}

impl HttpPageFetcher {
    const REQUEST_TIMEOUT_SECS: u64 = 45;
    const USER_AGENT: &'static str = concat!("cfr-alert/", env!("CARGO_PKG_VERSION"));

    pub fn new() -> Result<Self> {
        let client = blocking::Client::builder()
            .timeout(Duration::from_secs(Self::REQUEST_TIMEOUT_SECS))
            .user_agent(Self::USER_AGENT)
            .build()
            .map_err(|e| CFRError::Fetch(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpPageFetcher { client })
    }
}

impl PageFetcher for HttpPageFetcher {
    fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| CFRError::Fetch(format!("Failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(CFRError::Fetch(format!("Page returned error: {}", response.status())));
        }

        response
            .text()
            .map_err(|e| CFRError::Fetch(format!("Failed to read response: {}", e)))
    }
}

/// Serves a saved page from disk; the URL is ignored.
pub struct FilePageFetcher {
    path: PathBuf,
}

impl FilePageFetcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FilePageFetcher { path: path.into() }
    }
}

impl PageFetcher for FilePageFetcher {
    fn fetch(&self, _url: &str) -> Result<String> {
        std::fs::read_to_string(&self.path)
            .map_err(|e| CFRError::Fetch(format!("Failed to read {}: {}", self.path.display(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_fetcher_reads_saved_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("route.html");
        std::fs::write(&path, "<li id=\"li-itinerary-1\">Plecare la 08:00</li>").unwrap();

        let fetcher = FilePageFetcher::new(&path);
        let page = fetcher.fetch("ignored").unwrap();
        assert!(page.contains("li-itinerary-1"));
    }

    #[test]
    fn missing_file_is_a_fetch_error() {
        let fetcher = FilePageFetcher::new("/nonexistent/route.html");
        let err = fetcher.fetch("ignored").unwrap_err();
        assert!(matches!(err, CFRError::Fetch(_)));
        assert!(err.to_string().starts_with("Fetch error: Failed to read /nonexistent/route.html"));
    }
}
