//! Resource loading utilities
//!
//! This module reads documents, external DTD subsets and schemas from their
//! locations. Local files are always available; `http` and `https` URLs are
//! fetched with a blocking client when the `remote` feature is enabled.

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::Location;
use std::fs;
use url::Url;

/// Timeout for one remote fetch
#[cfg(feature = "remote")]
const FETCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Resource loader for schemas and documents
#[derive(Debug, Clone, Default)]
pub struct Loader {
    /// Resource limits
    limits: Limits,
}

impl Loader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Load a resource as bytes
    pub fn load_bytes(&self, location: &Location) -> Result<Vec<u8>> {
        match location {
            Location::Path(path) => {
                let content = fs::read(path).map_err(|e| {
                    Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
                })?;

                self.limits.check_document_size(content.len())?;
                log::trace!("loaded {} bytes from {}", content.len(), path.display());

                Ok(content)
            }
            Location::Url(url) => match url.scheme() {
                "http" | "https" => self.fetch(url),
                scheme => Err(Error::Resource(format!(
                    "cannot load '{}': unsupported scheme '{}'",
                    url, scheme
                ))),
            },
        }
    }

    #[cfg(feature = "remote")]
    fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        log::debug!("fetching {}", url);
        let client = reqwest::blocking::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("xsi-discovery/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Resource(format!("Failed to create HTTP client: {}", e)))?;
        let response = client
            .get(url.as_str())
            .send()
            .map_err(|e| Error::Resource(format!("Failed to fetch '{}': {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Resource(format!(
                "HTTP {} when fetching '{}'",
                response.status(),
                url
            )));
        }
        if let Some(length) = response.content_length() {
            self.limits.check_document_size(length as usize)?;
        }

        let content = response
            .bytes()
            .map_err(|e| Error::Resource(format!("Failed to read '{}': {}", url, e)))?;
        self.limits.check_document_size(content.len())?;
        log::trace!("loaded {} bytes from {}", content.len(), url);

        Ok(content.to_vec())
    }

    #[cfg(not(feature = "remote"))]
    fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        Err(Error::Resource(format!(
            "cannot load '{}': remote loading needs the `remote` feature",
            url
        )))
    }

    /// Load a resource as a UTF-8 string
    pub fn load(&self, location: &Location) -> Result<String> {
        let bytes = self.load_bytes(location)?;
        String::from_utf8(bytes).map_err(|e| {
            Error::Resource(format!("'{}' is not valid UTF-8: {}", location.as_str(), e))
        })
    }

    /// Load a resource named by a system identifier
    pub fn load_system_id(&self, system_id: &str) -> Result<Vec<u8>> {
        self.load_bytes(&Location::from_system_id(system_id)?)
    }
}
