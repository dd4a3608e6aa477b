/// Fixed image table
///
/// Answers lookups from a preset map and records every queried name, so
/// tests can check which lookups happened and in what order. Names can also
/// be marked as failing to exercise the error path.

use super::{ImageLookup, ImageLookupError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct StaticImageLookup {
    images: HashMap<String, String>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl StaticImageLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.images.insert(name.into(), url.into());
        self
    }

    /// Lookups for `name` return an error instead of an answer
    pub fn with_failure(mut self, name: impl Into<String>) -> Self {
        self.failing.insert(name.into());
        self
    }

    /// Names queried so far, in order
    pub async fn queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl ImageLookup for StaticImageLookup {
    async fn find_image(&self, name: &str) -> Result<Option<String>, ImageLookupError> {
        self.queries.lock().await.push(name.to_string());

        if self.failing.contains(name) {
            return Err(ImageLookupError::Request(format!("lookup for '{}' failed", name)));
        }
        Ok(self.images.get(name).cloned())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
