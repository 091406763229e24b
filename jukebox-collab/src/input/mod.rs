use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

mod spotify;
mod youtube;

pub use spotify::*;
pub use youtube::*;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Input did not match")]
    NoMatch,

    #[error("Input type is supported but resource was not found")]
    NotFound,

    #[error("Failed to fetch resource: {0}")]
    FetchError(String),

    #[error("Failed to parse resource: {0}")]
    ParseError(String),

    #[error("{0}")]
    Other(String),
}

/// Display metadata resolved for a track url. Resolved on demand and never
/// treated as authoritative by the queue.
#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub title: String,
    pub thumbnail: String,
}

/// Represents an external catalog that can resolve track urls
#[async_trait]
pub trait Inputable {
    /// Returns true if the given url matches the pattern of this catalog.
    /// Pure, no I/O.
    fn test(url: &str) -> bool;

    /// Fetches the display metadata for a matching url
    async fn fetch(url: &str) -> Result<Metadata, InputError>;
}

/// The seam the session engine resolves track urls through, so tests can
/// substitute the catalogs.
#[async_trait]
pub trait MetadataResolver: Send + Sync + 'static {
    async fn resolve(&self, url: &str) -> Result<Metadata, InputError>;
}

/// Resolver backed by the known external catalogs
pub struct CatalogResolver;

#[async_trait]
impl MetadataResolver for CatalogResolver {
    async fn resolve(&self, url: &str) -> Result<Metadata, InputError> {
        if YouTubeInput::test(url) {
            return YouTubeInput::fetch(url).await;
        }

        if SpotifyInput::test(url) {
            return SpotifyInput::fetch(url).await;
        }

        Err(InputError::NoMatch)
    }
}
