/// Image lookup for `[[WIKISEARCH: name]]` tags
///
/// - [`WikipediaImageLookup`]: the MediaWiki page-images API
/// - [`StaticImageLookup`]: an in-memory name to URL table

pub mod fixed;
pub mod wikipedia;

pub use fixed::StaticImageLookup;
pub use wikipedia::WikipediaImageLookup;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageLookupError {
    #[error("Image lookup request failed: {0}")]
    Request(String),

    #[error("Image lookup returned {0}")]
    Status(u16),

    #[error("Malformed image lookup response: {0}")]
    Decode(String),
}

/// Finds an image URL for a named entity
#[async_trait]
pub trait ImageLookup: Send + Sync {
    /// `Ok(None)` means the lookup worked but there is no image
    async fn find_image(&self, name: &str) -> Result<Option<String>, ImageLookupError>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}
