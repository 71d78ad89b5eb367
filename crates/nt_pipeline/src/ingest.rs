//! Ingestion boundary: raw items from any [`RawItemSource`] become
//! unprocessed raw articles.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures::future::join_all;
use nt_core::{ContentStore, RawArticle, RawItem, RawItemSource, Result, SourceConfig};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub created: Vec<Uuid>,
    /// Items whose URL is already stored.
    pub known: usize,
    pub invalid: usize,
}

impl IngestSummary {
    fn absorb(&mut self, other: IngestSummary) {
        self.created.extend(other.created);
        self.known += other.known;
        self.invalid += other.invalid;
    }
}

pub struct Ingestor {
    store: Arc<dyn ContentStore>,
    prefix_chars: usize,
}

impl Ingestor {
    pub fn new(store: Arc<dyn ContentStore>, prefix_chars: usize) -> Self {
        Self { store, prefix_chars }
    }

    /// Stores each item as an unprocessed raw article. Items with an
    /// unparseable or already stored URL are counted and dropped.
    pub async fn ingest(&self, source: &SourceConfig, items: Vec<RawItem>) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();
        for item in items {
            let url = match item.canonical_url() {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(source = %source.id, error = %e, "Dropping item with invalid URL");
                    summary.invalid += 1;
                    continue;
                }
            };
            if self.store.find_raw_by_url(&url).await?.is_some() {
                tracing::debug!(source = %source.id, url = %url, "URL already ingested");
                summary.known += 1;
                continue;
            }

            let article = RawArticle::from_item(source, item, url, self.prefix_chars);
            self.store.insert_raw(&article).await?;
            tracing::debug!(raw_article_id = %article.id, source = %source.id, title = %article.title, "Ingested raw article");
            summary.created.push(article.id);
        }

        tracing::info!(
            source = %source.id,
            created = summary.created.len(),
            known = summary.known,
            invalid = summary.invalid,
            "📥 Ingested items"
        );
        Ok(summary)
    }

    /// Fetches every source concurrently, then stores the results source by
    /// source. A source that fails to fetch is logged and skipped.
    pub async fn collect(&self, fetcher: &dyn RawItemSource, sources: &[SourceConfig]) -> Result<IngestSummary> {
        let fetched = join_all(sources.iter().map(|source| fetcher.fetch_raw_items(source))).await;

        let mut summary = IngestSummary::default();
        for (source, items) in sources.iter().zip(fetched) {
            match items {
                Ok(items) => summary.absorb(self.ingest(source, items).await?),
                Err(e) => tracing::warn!(source = %source.id, error = %e, "Failed to fetch source"),
            }
        }
        Ok(summary)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemFile {
    BySource(HashMap<String, Vec<RawItem>>),
    Flat(Vec<RawItem>),
}

/// Raw items read from a JSON dump, either `{"<source id>": [items]}` or a
/// bare array that is served to every source.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    async fn read(&self) -> Result<ItemFile> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading items from {}", self.path.display()))?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Source ids present in the file. Empty for a bare array.
    pub async fn source_ids(&self) -> Result<Vec<String>> {
        Ok(match self.read().await? {
            ItemFile::BySource(map) => {
                let mut ids: Vec<String> = map.into_keys().collect();
                ids.sort();
                ids
            }
            ItemFile::Flat(_) => Vec::new(),
        })
    }
}

#[async_trait]
impl RawItemSource for JsonFileSource {
    async fn fetch_raw_items(&self, source: &SourceConfig) -> Result<Vec<RawItem>> {
        Ok(match self.read().await? {
            ItemFile::BySource(mut map) => map.remove(&source.id).unwrap_or_default(),
            ItemFile::Flat(items) => items,
        })
    }
}
