//! Resource location resolution
//!
//! This module turns system identifiers (URLs or file paths) into locations,
//! and resolves relative references such as schema hints against a base URI.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use url::Url;

/// Resource location - a URL or a file path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http, https, ftp, etc.)
    Url(Url),
}

impl Location {
    /// Interpret a system identifier; `file:` URLs become paths
    pub fn from_system_id(s: &str) -> Result<Self> {
        if let Some(url) = parse_absolute(s) {
            if url.scheme() == "file" {
                let path = url.to_file_path().map_err(|_| {
                    Error::Resource(format!("'{}' is not a usable file URL", s))
                })?;
                return Ok(Location::Path(path));
            }
            return Ok(Location::Url(url));
        }
        Ok(Location::Path(PathBuf::from(s)))
    }

    /// Absolute URL form of the location
    pub fn to_url(&self) -> Result<Url> {
        match self {
            Location::Url(url) => Ok(url.clone()),
            Location::Path(path) => path_to_url(path),
        }
    }

    /// Get the location as a string
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }
}

impl From<Url> for Location {
    fn from(url: Url) -> Self {
        match url.to_file_path() {
            Ok(path) if url.scheme() == "file" => Location::Path(path),
            _ => Location::Url(url),
        }
    }
}

/// Parse `s` as an absolute URL, rejecting drive letters like `C:\x`
fn parse_absolute(s: &str) -> Option<Url> {
    Url::parse(s).ok().filter(|url| url.scheme().len() > 1)
}

fn path_to_url(path: &Path) -> Result<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&absolute)
        .map_err(|_| Error::Resource(format!("cannot express '{}' as a URL", absolute.display())))
}

/// Resolves a URI reference against a base system identifier
pub trait UriResolver {
    /// Resolve `href` against `base`, producing an absolute URL
    fn resolve(&self, href: &str, base: Option<&str>) -> Result<Url>;
}

/// RFC 3986 reference resolution through `Url::join`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUriResolver;

impl UriResolver for DefaultUriResolver {
    fn resolve(&self, href: &str, base: Option<&str>) -> Result<Url> {
        let href = href.trim();
        if let Some(url) = parse_absolute(href) {
            return Ok(url);
        }
        let base = base.ok_or_else(|| {
            Error::Resource(format!(
                "cannot resolve relative reference '{}' without a base URI",
                href
            ))
        })?;
        let base_url = Location::from_system_id(base)?.to_url()?;
        Ok(base_url.join(href)?)
    }
}
