// Extraction client trait definition

use std::time::Duration;

use async_trait::async_trait;

use super::errors::FetchError;
use super::models::{ExtractOptions, ExtractedMedia, SearchEntry};

/// Trait for extraction client implementations
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Download one rendition of `source` (URL or video id) into `opts.output_dir`
    async fn extract(
        &self,
        source: &str,
        opts: &ExtractOptions,
    ) -> Result<ExtractedMedia, FetchError>;

    /// Search the video site and return up to `limit` entries without downloading
    async fn search(
        &self,
        query: &str,
        limit: usize,
        timeout: Duration,
    ) -> Result<Vec<SearchEntry>, FetchError>;
}
