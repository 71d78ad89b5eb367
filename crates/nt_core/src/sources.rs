use async_trait::async_trait;

use crate::types::{RawItem, SourceConfig};
use crate::Result;

/// Anything that can produce raw items for a configured source: a site
/// scraper, a feed reader, a file dump.
#[async_trait]
pub trait RawItemSource: Send + Sync {
    async fn fetch_raw_items(&self, source: &SourceConfig) -> Result<Vec<RawItem>>;
}
