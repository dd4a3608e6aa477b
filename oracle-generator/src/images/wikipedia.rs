/// Wikipedia page-image lookup
///
/// Queries `action=query&prop=pageimages` for the exact title and prefers
/// the original image over the 600px thumbnail. A missing page (id `-1`) or
/// a page without an image is "not found", not an error.

use super::{ImageLookup, ImageLookupError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

pub const WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";

const THUMBNAIL_SIZE: &str = "600";

pub struct WikipediaImageLookup {
    client: Client,
    endpoint: String,
}

impl WikipediaImageLookup {
    pub fn new() -> Result<Self, ImageLookupError> {
        Self::with_endpoint(WIKIPEDIA_API_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self, ImageLookupError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("oracle/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ImageLookupError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl ImageLookup for WikipediaImageLookup {
    async fn find_image(&self, name: &str) -> Result<Option<String>, ImageLookupError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("prop", "pageimages"),
                ("format", "json"),
                ("piprop", "original|thumbnail"),
                ("titles", name),
                ("pithumbsize", THUMBNAIL_SIZE),
                ("origin", "*"),
            ])
            .send()
            .await
            .map_err(|e| ImageLookupError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageLookupError::Status(status.as_u16()));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| ImageLookupError::Decode(e.to_string()))?;

        Ok(body.image_url())
    }

    fn name(&self) -> &'static str {
        "wikipedia"
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    query: Option<Query>,
}

#[derive(Debug, Deserialize)]
struct Query {
    #[serde(default)]
    pages: HashMap<String, Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    original: Option<ImageSource>,
    thumbnail: Option<ImageSource>,
}

#[derive(Debug, Deserialize)]
struct ImageSource {
    source: String,
}

impl QueryResponse {
    fn image_url(self) -> Option<String> {
        let (page_id, page) = self.query?.pages.into_iter().next()?;
        if page_id == "-1" {
            return None;
        }
        page.original.or(page.thumbnail).map(|image| image.source)
    }
}
