use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nt_core::{
    ArticleCluster, Category, ClusterAttachment, ContentStore, ProcessedArticle, RawArticle, Result,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::StorageBackend;

#[derive(Default)]
pub struct MemoryStore {
    raw: HashMap<Uuid, RawArticle>,
    processed: HashMap<Uuid, ProcessedArticle>,
    clusters: Vec<ArticleCluster>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_raw(&mut self, article: &RawArticle) -> Result<()> {
        if self.raw.contains_key(&article.id) {
            return Err(nt_core::Error::Persistence(format!(
                "raw article {} already exists",
                article.id
            )));
        }
        self.raw.insert(article.id, article.clone());
        Ok(())
    }

    pub fn recent_processed(&self, since: DateTime<Utc>, limit: usize) -> Vec<RawArticle> {
        let mut articles = self
            .raw
            .values()
            .filter(|a| a.processed && a.ingested_at >= since)
            .cloned()
            .collect::<Vec<_>>();
        articles.sort_by(|a, b| b.ingested_at.cmp(&a.ingested_at));
        articles.into_iter().take(limit).collect()
    }

    pub fn unprocessed(&self, limit: usize) -> Vec<RawArticle> {
        let mut articles = self
            .raw
            .values()
            .filter(|a| !a.processed)
            .cloned()
            .collect::<Vec<_>>();
        articles.sort_by(|a, b| a.ingested_at.cmp(&b.ingested_at));
        articles.into_iter().take(limit).collect()
    }

    pub fn mark_processed(&mut self, id: Uuid, skipped: bool) -> Result<bool> {
        let article = self
            .raw
            .get_mut(&id)
            .ok_or_else(|| nt_core::Error::not_found("raw article", id))?;
        if article.processed {
            return Ok(false);
        }
        article.processed = true;
        article.skipped = skipped;
        Ok(true)
    }

    pub fn attach_to_cluster(
        &mut self,
        article_id: Uuid,
        matching_ids: &BTreeSet<Uuid>,
        category: Category,
    ) -> ClusterAttachment {
        let now = Utc::now();
        let mut lookup = matching_ids.clone();
        lookup.insert(article_id);

        if let Some(cluster) = self.clusters.iter_mut().find(|c| c.intersects(&lookup)) {
            cluster.member_ids.insert(article_id);
            cluster.updated_at = now;
            return ClusterAttachment {
                cluster_id: cluster.id,
                created: false,
                member_count: cluster.member_ids.len(),
                synthesized_article_id: cluster.synthesized_article_id,
            };
        }

        let cluster = ArticleCluster {
            id: Uuid::new_v4(),
            member_ids: lookup,
            category,
            created_at: now,
            updated_at: now,
            synthesized_article_id: None,
        };
        let attachment = ClusterAttachment {
            cluster_id: cluster.id,
            created: true,
            member_count: cluster.member_ids.len(),
            synthesized_article_id: None,
        };
        self.clusters.push(cluster);
        attachment
    }
}

/// Process-local content store. Every operation takes the lock once, so
/// the cluster attach is atomic with respect to concurrent runs.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for InMemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn new() -> Result<Self> where Self: Sized {
        Ok(InMemoryStorage::new())
    }
}

#[async_trait]
impl ContentStore for InMemoryStorage {
    async fn insert_raw(&self, article: &RawArticle) -> Result<()> {
        let mut store = self.store.write().await;
        store.insert_raw(article)
    }

    async fn get_raw(&self, id: Uuid) -> Result<Option<RawArticle>> {
        let store = self.store.read().await;
        Ok(store.raw.get(&id).cloned())
    }

    async fn get_raw_many(&self, ids: &[Uuid]) -> Result<Vec<RawArticle>> {
        let store = self.store.read().await;
        Ok(ids.iter().filter_map(|id| store.raw.get(id).cloned()).collect())
    }

    async fn find_raw_by_url(&self, url: &str) -> Result<Option<RawArticle>> {
        let store = self.store.read().await;
        Ok(store.raw.values().find(|a| a.url == url).cloned())
    }

    async fn find_processed_by_hash(&self, hash: &str, since: DateTime<Utc>) -> Result<Vec<RawArticle>> {
        let store = self.store.read().await;
        Ok(store
            .raw
            .values()
            .filter(|a| a.processed && a.content_hash == hash && a.ingested_at >= since)
            .cloned()
            .collect())
    }

    async fn recent_processed(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<RawArticle>> {
        let store = self.store.read().await;
        Ok(store.recent_processed(since, limit))
    }

    async fn unprocessed(&self, limit: usize) -> Result<Vec<RawArticle>> {
        let store = self.store.read().await;
        Ok(store.unprocessed(limit))
    }

    async fn mark_processed(&self, id: Uuid, skipped: bool) -> Result<bool> {
        let mut store = self.store.write().await;
        store.mark_processed(id, skipped)
    }

    async fn insert_processed(&self, article: &ProcessedArticle) -> Result<bool> {
        let mut store = self.store.write().await;
        if store.processed.contains_key(&article.id) {
            return Ok(false);
        }
        store.processed.insert(article.id, article.clone());
        Ok(true)
    }

    async fn get_processed(&self, id: Uuid) -> Result<Option<ProcessedArticle>> {
        let store = self.store.read().await;
        Ok(store.processed.get(&id).cloned())
    }

    async fn list_processed(&self, limit: usize) -> Result<Vec<ProcessedArticle>> {
        let store = self.store.read().await;
        let mut articles = store.processed.values().cloned().collect::<Vec<_>>();
        articles.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(articles.into_iter().take(limit).collect())
    }

    async fn attach_to_cluster(
        &self,
        article_id: Uuid,
        matching_ids: &BTreeSet<Uuid>,
        category: Category,
    ) -> Result<ClusterAttachment> {
        let mut store = self.store.write().await;
        Ok(store.attach_to_cluster(article_id, matching_ids, category))
    }

    async fn get_cluster(&self, id: Uuid) -> Result<Option<ArticleCluster>> {
        let store = self.store.read().await;
        Ok(store.clusters.iter().find(|c| c.id == id).cloned())
    }

    async fn set_cluster_synthesis(&self, cluster_id: Uuid, article_id: Uuid) -> Result<bool> {
        let mut store = self.store.write().await;
        let cluster = store
            .clusters
            .iter_mut()
            .find(|c| c.id == cluster_id)
            .ok_or_else(|| nt_core::Error::not_found("cluster", cluster_id))?;
        if cluster.synthesized_article_id.is_some() {
            return Ok(false);
        }
        cluster.synthesized_article_id = Some(article_id);
        cluster.updated_at = Utc::now();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nt_core::{Entities, RawItem, SourceConfig, Urgency};

    fn raw(title: &str) -> RawArticle {
        let source = SourceConfig {
            id: "gabonreview".to_string(),
            name: "Gabonreview".to_string(),
            url: None,
            reliability: Default::default(),
        };
        let item = RawItem {
            title: title.to_string(),
            content: format!("{} - contenu", title),
            url: format!("https://example.com/{}", title.replace(' ', "-")),
            published_at: Utc::now(),
            image_url: None,
            author: None,
        };
        let url = item.url.clone();
        RawArticle::from_item(&source, item, url, 200)
    }

    fn processed(raw: &RawArticle) -> ProcessedArticle {
        ProcessedArticle {
            id: ProcessedArticle::id_for_raw(raw.id),
            title: raw.title.clone(),
            summary_short: raw.content.clone(),
            summary_medium: raw.content.clone(),
            summary_long: raw.content.clone(),
            categories: vec![Category::Society],
            category_confidence: 0.3,
            entities: Entities::default(),
            key_quotes: vec![],
            tags: vec![],
            source_article_ids: vec![raw.id],
            sources: vec![],
            image_url: None,
            published_at: raw.published_at,
            processed_at: Utc::now(),
            is_trending: false,
            is_breaking_news: false,
            breaking_news_level: Urgency::Normal,
            notification: None,
            synthesis: None,
        }
    }

    #[tokio::test]
    async fn test_raw_article_lifecycle() {
        let storage = InMemoryStorage::new();
        let article = raw("Test Article");
        storage.insert_raw(&article).await.unwrap();

        assert_eq!(storage.unprocessed(10).await.unwrap().len(), 1);
        assert!(storage.recent_processed(Utc::now() - Duration::hours(1), 10).await.unwrap().is_empty());

        assert!(storage.mark_processed(article.id, false).await.unwrap());
        assert!(!storage.mark_processed(article.id, false).await.unwrap());

        assert!(storage.unprocessed(10).await.unwrap().is_empty());
        let recent = storage.recent_processed(Utc::now() - Duration::hours(1), 10).await.unwrap();
        assert_eq!(recent.len(), 1);

        let by_hash = storage
            .find_processed_by_hash(&article.content_hash, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(by_hash.len(), 1);

        let by_url = storage.find_raw_by_url(&article.url).await.unwrap();
        assert_eq!(by_url.map(|a| a.id), Some(article.id));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let storage = InMemoryStorage::new();
        let article = raw("Doublon");
        storage.insert_raw(&article).await.unwrap();
        assert!(storage.insert_raw(&article).await.is_err());
    }

    #[tokio::test]
    async fn test_mark_unknown_article() {
        let storage = InMemoryStorage::new();
        let err = storage.mark_processed(Uuid::new_v4(), false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_cluster_attach_or_create() {
        let storage = InMemoryStorage::new();
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let first = storage
            .attach_to_cluster(b, &BTreeSet::from([a]), Category::Economy)
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.member_count, 2);

        let second = storage
            .attach_to_cluster(c, &BTreeSet::from([b, d]), Category::Politics)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.cluster_id, first.cluster_id);
        assert_eq!(second.member_count, 3);

        // re-attaching an existing member changes nothing
        let again = storage
            .attach_to_cluster(c, &BTreeSet::from([b]), Category::Economy)
            .await
            .unwrap();
        assert_eq!(again.member_count, 3);

        let cluster = storage.get_cluster(first.cluster_id).await.unwrap().unwrap();
        assert_eq!(cluster.category, Category::Economy);
        assert!(!cluster.member_ids.contains(&d));
    }

    #[tokio::test]
    async fn test_processed_insert_keeps_first_writer() {
        let storage = InMemoryStorage::new();
        let raw = raw("Premier arrivé");
        let mut article = processed(&raw);
        assert!(storage.insert_processed(&article).await.unwrap());

        article.title = "Second arrivé".to_string();
        assert!(!storage.insert_processed(&article).await.unwrap());

        let stored = storage.get_processed(article.id).await.unwrap().unwrap();
        assert_eq!(stored.title, "Premier arrivé");
        assert_eq!(storage.list_processed(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_set_cluster_synthesis() {
        let storage = InMemoryStorage::new();
        let attachment = storage
            .attach_to_cluster(Uuid::new_v4(), &BTreeSet::from([Uuid::new_v4()]), Category::Sport)
            .await
            .unwrap();
        let article_id = Uuid::new_v4();
        assert!(storage.set_cluster_synthesis(attachment.cluster_id, article_id).await.unwrap());
        assert!(!storage.set_cluster_synthesis(attachment.cluster_id, Uuid::new_v4()).await.unwrap());

        let cluster = storage.get_cluster(attachment.cluster_id).await.unwrap().unwrap();
        assert_eq!(cluster.synthesized_article_id, Some(article_id));

        assert!(storage.set_cluster_synthesis(Uuid::new_v4(), article_id).await.is_err());
    }
}
