//! Where boundary files come from.

use std::path::{Path, PathBuf};

use crate::{BoundaryError, BoundaryFile, parse_boundary_file};

/// Markup dialect of a boundary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryFormat {
    /// KML placemarks.
    Kml,
    /// `GeoJSON` feature collection.
    GeoJson,
}

impl BoundaryFormat {
    /// Picks a format from a path or URL's extension. Anything that is not
    /// `.geojson` or `.json` is treated as KML.
    #[must_use]
    pub fn from_location(location: &str) -> Self {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("geojson" | "json") => Self::GeoJson,
            _ => Self::Kml,
        }
    }
}

/// A local path or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundarySource {
    /// File on disk.
    Path(PathBuf),
    /// HTTP(S) URL.
    Url(String),
}

impl BoundarySource {
    /// Interprets `location` as a URL when it has an `http://` or
    /// `https://` scheme, and as a file path otherwise.
    #[must_use]
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            Self::Url(location.to_string())
        } else {
            Self::Path(PathBuf::from(location))
        }
    }

    /// The format implied by this source's extension.
    #[must_use]
    pub fn format(&self) -> BoundaryFormat {
        match self {
            Self::Path(path) => BoundaryFormat::from_location(&path.to_string_lossy()),
            Self::Url(url) => BoundaryFormat::from_location(url),
        }
    }
}

impl std::fmt::Display for BoundarySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Something that can produce a parsed boundary file.
#[async_trait::async_trait]
pub trait BoundaryProvider: Send + Sync {
    /// Loads and parses the boundary file.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if the file cannot be read or parsed.
    async fn load(&self) -> Result<BoundaryFile, BoundaryError>;
}

/// Reads a boundary file from disk or over HTTP.
pub struct BoundaryFetcher {
    client: reqwest::Client,
    source: BoundarySource,
}

impl BoundaryFetcher {
    /// Creates a fetcher for `source`.
    #[must_use]
    pub fn new(source: BoundarySource) -> Self {
        Self {
            client: reqwest::Client::new(),
            source,
        }
    }

    /// The configured source.
    #[must_use]
    pub const fn source(&self) -> &BoundarySource {
        &self.source
    }

    async fn read_text(&self) -> Result<String, BoundaryError> {
        match &self.source {
            BoundarySource::Path(path) => Ok(tokio::fs::read_to_string(path).await?),
            BoundarySource::Url(url) => {
                let resp = self.client.get(url).send().await?;
                if !resp.status().is_success() {
                    return Err(BoundaryError::Status {
                        url: url.clone(),
                        status: resp.status().as_u16(),
                    });
                }
                Ok(resp.text().await?)
            }
        }
    }
}

#[async_trait::async_trait]
impl BoundaryProvider for BoundaryFetcher {
    async fn load(&self) -> Result<BoundaryFile, BoundaryError> {
        log::info!("Loading boundary file from {}", self.source);
        let text = self.read_text().await?;
        parse_boundary_file(&text, self.source.format())
    }
}
