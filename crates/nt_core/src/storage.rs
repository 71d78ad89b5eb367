use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::{ArticleCluster, Category, ClusterAttachment, ProcessedArticle, RawArticle};
use crate::Result;

/// The shared state of the pipeline: raw articles, processed articles and
/// clusters. Every method is a single-record operation except
/// [`ContentStore::attach_to_cluster`], which must be atomic.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a newly ingested raw article
    async fn insert_raw(&self, article: &RawArticle) -> Result<()>;

    async fn get_raw(&self, id: Uuid) -> Result<Option<RawArticle>>;

    /// Resolve several raw articles, silently dropping ids that do not exist
    async fn get_raw_many(&self, ids: &[Uuid]) -> Result<Vec<RawArticle>>;

    async fn find_raw_by_url(&self, url: &str) -> Result<Option<RawArticle>>;

    /// Processed raw articles with the given fingerprint ingested at or after `since`
    async fn find_processed_by_hash(&self, hash: &str, since: DateTime<Utc>) -> Result<Vec<RawArticle>>;

    /// Processed raw articles ingested at or after `since`, newest first
    async fn recent_processed(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>>;

    /// Unprocessed raw articles, oldest ingestion first
    async fn unprocessed(&self, limit: usize) -> Result<Vec<RawArticle>>;

    /// Flip the processed flag. Returns false when the article was already processed.
    async fn mark_processed(&self, id: Uuid, skipped: bool) -> Result<bool>;

    /// Store a processed article unless one with the same id exists.
    /// Returns false when the id was already taken.
    async fn insert_processed(&self, article: &ProcessedArticle) -> Result<bool>;

    async fn get_processed(&self, id: Uuid) -> Result<Option<ProcessedArticle>>;

    /// Processed articles, most recently processed first
    async fn list_processed(&self, limit: usize) -> Result<Vec<ProcessedArticle>>;

    /// Find the cluster intersecting `matching_ids ∪ {article_id}` and add
    /// `article_id` to it, or create a new cluster seeded with all of them.
    /// Lookup and write happen as one atomic step.
    async fn attach_to_cluster(
        &self,
        article_id: Uuid,
        matching_ids: &BTreeSet<Uuid>,
        category: Category,
    ) -> Result<ClusterAttachment>;

    async fn get_cluster(&self, id: Uuid) -> Result<Option<ArticleCluster>>;

    /// Link the synthesized article to its cluster. Returns false when the
    /// cluster already has one; the existing link is kept.
    async fn set_cluster_synthesis(&self, cluster_id: Uuid, article_id: Uuid) -> Result<bool>;
}
