use std::sync::Arc;

use chrono::Utc;
use nt_core::text::truncate_chars;
use nt_core::{
    ContentStore, ProcessedArticle, RawArticle, Result, SourceAttribution, SynthesisMetadata, Urgency,
};
use nt_inference::prompts::SynthesisSource;
use nt_inference::responses::CategoryAssessment;
use nt_inference::Classifier;
use uuid::Uuid;

use crate::clusters::ClusterManager;
use crate::config::SourceDirectory;

/// What a synthesis attempt left behind.
#[derive(Debug)]
pub enum Synthesis {
    /// Too few members, or the model produced nothing usable. The cluster
    /// stays open for the next attach.
    NotProduced,
    Created(ProcessedArticle),
    /// Another run already stored the synthesis of this cluster.
    Existing(Uuid),
}

pub struct Synthesizer {
    store: Arc<dyn ContentStore>,
    clusters: Arc<ClusterManager>,
    classifier: Classifier,
    sources: Arc<SourceDirectory>,
    threshold: usize,
    content_chars: usize,
}

impl Synthesizer {
    pub fn new(
        store: Arc<dyn ContentStore>,
        clusters: Arc<ClusterManager>,
        classifier: Classifier,
        sources: Arc<SourceDirectory>,
    ) -> Self {
        Self {
            store,
            clusters,
            classifier,
            sources,
            threshold: 3,
            content_chars: 1000,
        }
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_content_chars(mut self, content_chars: usize) -> Self {
        self.content_chars = content_chars;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Members ordered most reliable first. Ties keep the earliest report
    /// first.
    pub fn rank(&self, mut members: Vec<RawArticle>) -> Vec<RawArticle> {
        members.sort_by(|a, b| {
            self.sources
                .reliability(&b.source_id)
                .cmp(&self.sources.reliability(&a.source_id))
                .then(a.published_at.cmp(&b.published_at))
        });
        members
    }

    /// Produces and stores the synthesized article for a cluster.
    ///
    /// The article id is derived from the cluster id, so concurrent runs on
    /// one cluster store a single article; the losers get
    /// [`Synthesis::Existing`]. Store errors are returned.
    pub async fn synthesize(&self, cluster_id: Uuid, category: &CategoryAssessment) -> Result<Synthesis> {
        let members = self.clusters.members_of(cluster_id).await?;
        if members.len() < self.threshold {
            tracing::debug!(
                cluster_id = %cluster_id,
                members = members.len(),
                threshold = self.threshold,
                "Cluster below synthesis threshold"
            );
            return Ok(Synthesis::NotProduced);
        }

        let article_id = ProcessedArticle::id_for_cluster(cluster_id);
        if self.store.get_processed(article_id).await?.is_some() {
            // stored by an earlier run that may not have linked it yet
            self.store.set_cluster_synthesis(cluster_id, article_id).await?;
            return Ok(Synthesis::Existing(article_id));
        }

        let members = self.rank(members);
        let bundle: Vec<SynthesisSource> = members
            .iter()
            .map(|m| SynthesisSource {
                source: m.source_name.clone(),
                reliability: self.sources.reliability(&m.source_id),
                title: m.title.clone(),
                content: truncate_chars(&m.content, self.content_chars),
                published_at: m.published_at,
            })
            .collect();

        let draft = match self.classifier.synthesize(&bundle).await {
            Ok(draft) => draft,
            Err(e) => {
                tracing::warn!(cluster_id = %cluster_id, error = %e, "Synthesis unavailable, cluster left for a later attach");
                return Ok(Synthesis::NotProduced);
            }
        };

        let entities = match self.classifier.extract_entities(&draft.long).await {
            Ok(entities) => entities,
            Err(e) => {
                tracing::warn!(cluster_id = %cluster_id, error = %e, "Entity extraction unavailable for synthesis");
                Default::default()
            }
        };

        let published_at = members
            .iter()
            .map(|m| m.published_at)
            .min()
            .unwrap_or_else(Utc::now);
        let image_url = members.iter().find_map(|m| m.image_url.clone());
        let sources = members
            .iter()
            .map(|m| SourceAttribution {
                raw_article_id: m.id,
                source_id: m.source_id.clone(),
                name: m.source_name.clone(),
                url: m.url.clone(),
                reliability: self.sources.reliability(&m.source_id),
            })
            .collect();

        let article = ProcessedArticle {
            id: article_id,
            title: draft.title,
            summary_short: draft.short,
            summary_medium: draft.medium,
            summary_long: draft.long,
            categories: category.categories(),
            category_confidence: category.confidence,
            entities,
            key_quotes: Vec::new(),
            tags: Vec::new(),
            source_article_ids: members.iter().map(|m| m.id).collect(),
            sources,
            image_url,
            published_at,
            processed_at: Utc::now(),
            is_trending: false,
            is_breaking_news: false,
            breaking_news_level: Urgency::Normal,
            notification: None,
            synthesis: Some(SynthesisMetadata {
                cluster_id,
                article_count: members.len(),
                factual_consensus: draft.factual_consensus,
                contradictions: draft.contradictions,
                source_analysis: draft.source_analysis,
                confidence: draft.confidence,
            }),
        };

        let created = self.store.insert_processed(&article).await?;
        self.store.set_cluster_synthesis(cluster_id, article.id).await?;
        if !created {
            tracing::debug!(cluster_id = %cluster_id, article_id = %article.id, "Cluster synthesized by a concurrent run");
            return Ok(Synthesis::Existing(article.id));
        }
        tracing::info!(
            cluster_id = %cluster_id,
            article_id = %article.id,
            sources = members.len(),
            "🧬 Cluster synthesized"
        );
        Ok(Synthesis::Created(article))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nt_core::{Category, RawItem, Reliability, SourceConfig, Task};
    use nt_inference::models::DummyModel;
    use nt_storage::InMemoryStorage;

    const SYNTHESIS: &str = r#"{
        "title": "Budget 2026 : le Parlement adopte la loi de finances",
        "shortVersion": "court",
        "mediumVersion": "moyen",
        "longVersion": "long",
        "sourceAnalysis": [{"source": "L'Union", "reliability": "high", "keyFacts": ["adopté"]}],
        "factualConsensus": 0.85,
        "contradictions": [],
        "confidence": 0.8
    }"#;

    fn directory() -> Arc<SourceDirectory> {
        Arc::new(SourceDirectory::new(vec![
            SourceConfig {
                id: "union".to_string(),
                name: "L'Union".to_string(),
                url: None,
                reliability: Reliability::High,
            },
            SourceConfig {
                id: "gabonactu".to_string(),
                name: "Gabonactu".to_string(),
                url: None,
                reliability: Reliability::Medium,
            },
        ]))
    }

    fn raw(source_id: &str, hours_ago: i64, image: Option<&str>) -> RawArticle {
        let source = directory().resolve(source_id);
        let item = RawItem {
            title: format!("Budget 2026 selon {}", source.name),
            content: "x".repeat(2000),
            url: format!("https://{}.example/{}", source_id, Uuid::new_v4()),
            published_at: Utc::now() - Duration::hours(hours_ago),
            image_url: image.map(str::to_string),
            author: None,
        };
        let url = item.url.clone();
        RawArticle::from_item(&source, item, url, 200)
    }

    async fn cluster_of(store: &InMemoryStorage, members: &[RawArticle]) -> Uuid {
        for member in members {
            store.insert_raw(member).await.unwrap();
        }
        let ids: Vec<Uuid> = members[1..].iter().map(|m| m.id).collect();
        let manager = ClusterManager::new(Arc::new(store.clone()));
        manager
            .attach_or_create(members[0].id, &ids, Category::Economy)
            .await
            .unwrap()
            .cluster_id
    }

    fn synthesizer(store: &InMemoryStorage, model: Arc<DummyModel>) -> Synthesizer {
        let store: Arc<dyn ContentStore> = Arc::new(store.clone());
        let clusters = Arc::new(ClusterManager::new(store.clone()));
        Synthesizer::new(store, clusters, Classifier::new(model), directory())
    }

    fn category() -> CategoryAssessment {
        CategoryAssessment {
            main: Category::Economy,
            secondary: vec![Category::Politics],
            confidence: 0.9,
            reasoning: None,
        }
    }

    #[tokio::test]
    async fn test_synthesis_ranks_sources_and_persists() {
        let store = InMemoryStorage::new();
        let blog = raw("blog", 1, Some("https://blog.example/img.jpg"));
        let union = raw("union", 3, None);
        let actu = raw("gabonactu", 5, Some("https://gabonactu.example/img.jpg"));
        let cluster_id = cluster_of(&store, &[blog.clone(), union.clone(), actu.clone()]).await;

        let model = Arc::new(DummyModel::new().with_response(Task::Synthesize, SYNTHESIS));
        let Synthesis::Created(article) = synthesizer(&store, model.clone())
            .synthesize(cluster_id, &category())
            .await
            .unwrap()
        else {
            panic!("expected a new synthesis");
        };
        assert_eq!(article.id, ProcessedArticle::id_for_cluster(cluster_id));

        assert_eq!(article.source_article_ids, vec![union.id, actu.id, blog.id]);
        assert_eq!(article.published_at, actu.published_at);
        assert_eq!(article.image_url.as_deref(), Some("https://gabonactu.example/img.jpg"));
        assert_eq!(article.categories, vec![Category::Economy, Category::Politics]);
        assert!(!article.is_breaking_news);
        let metadata = article.synthesis.as_ref().unwrap();
        assert_eq!(metadata.article_count, 3);
        assert_eq!(metadata.factual_consensus, 0.85);

        let prompt = &model.prompts(Task::Synthesize)[0];
        assert!(prompt.find("L'Union").unwrap() < prompt.find("Gabonactu").unwrap());
        assert!(!prompt.contains(&"x".repeat(1001)));

        let cluster = store.get_cluster(cluster_id).await.unwrap().unwrap();
        assert_eq!(cluster.synthesized_article_id, Some(article.id));
        assert!(store.get_processed(article.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_small_cluster_is_not_synthesized() {
        let store = InMemoryStorage::new();
        let cluster_id = cluster_of(&store, &[raw("union", 1, None), raw("blog", 2, None)]).await;
        let model = Arc::new(DummyModel::new().with_response(Task::Synthesize, SYNTHESIS));

        let result = synthesizer(&store, model.clone()).synthesize(cluster_id, &category()).await.unwrap();
        assert!(matches!(result, Synthesis::NotProduced));
        assert_eq!(model.call_count(Task::Synthesize), 0);
    }

    #[tokio::test]
    async fn test_failed_synthesis_leaves_cluster_open() {
        let store = InMemoryStorage::new();
        let members = [raw("union", 1, None), raw("blog", 2, None), raw("gabonactu", 3, None)];
        let cluster_id = cluster_of(&store, &members).await;
        let model = Arc::new(DummyModel::new().with_response(Task::Synthesize, "{\"title\": \"incomplet\"}"));

        let result = synthesizer(&store, model).synthesize(cluster_id, &category()).await.unwrap();
        assert!(matches!(result, Synthesis::NotProduced));
        let cluster = store.get_cluster(cluster_id).await.unwrap().unwrap();
        assert!(cluster.synthesized_article_id.is_none());
        assert!(store.list_processed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_synthesis_stores_one_article() {
        let store = InMemoryStorage::new();
        let members = [raw("union", 1, None), raw("blog", 2, None), raw("gabonactu", 3, None)];
        let cluster_id = cluster_of(&store, &members).await;
        let model = Arc::new(
            DummyModel::new()
                .with_response(Task::Synthesize, SYNTHESIS)
                .with_delay(std::time::Duration::from_millis(30)),
        );
        let first = synthesizer(&store, model.clone());
        let second = synthesizer(&store, model.clone());

        let (category_a, category_b) = (category(), category());
        let (a, b) = tokio::join!(
            first.synthesize(cluster_id, &category_a),
            second.synthesize(cluster_id, &category_b)
        );
        let results = [a.unwrap(), b.unwrap()];

        let created: Vec<Uuid> = results
            .iter()
            .filter_map(|r| match r {
                Synthesis::Created(article) => Some(article.id),
                _ => None,
            })
            .collect();
        assert_eq!(created.len(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Synthesis::Existing(id) if *id == created[0])));
        assert_eq!(store.list_processed(10).await.unwrap().len(), 1);
        let cluster = store.get_cluster(cluster_id).await.unwrap().unwrap();
        assert_eq!(cluster.synthesized_article_id, Some(created[0]));

        // a later attach finds the stored article without asking the model again
        let calls = model.call_count(Task::Synthesize);
        let again = first.synthesize(cluster_id, &category()).await.unwrap();
        assert!(matches!(again, Synthesis::Existing(id) if id == created[0]));
        assert_eq!(model.call_count(Task::Synthesize), calls);
    }

    #[tokio::test]
    async fn test_unlinked_synthesis_is_relinked() {
        let store = InMemoryStorage::new();
        let members = [raw("union", 1, None), raw("blog", 2, None), raw("gabonactu", 3, None)];
        let cluster_id = cluster_of(&store, &members).await;
        let model = Arc::new(DummyModel::new().with_response(Task::Synthesize, SYNTHESIS));
        let Synthesis::Created(article) = synthesizer(&store, model.clone())
            .synthesize(cluster_id, &category())
            .await
            .unwrap()
        else {
            panic!("expected a new synthesis");
        };

        // simulate a crash between the article write and the cluster link
        let fresh = InMemoryStorage::new();
        let cluster_id = cluster_of(&fresh, &members).await;
        let mut orphan = article.clone();
        orphan.id = ProcessedArticle::id_for_cluster(cluster_id);
        fresh.insert_processed(&orphan).await.unwrap();

        let result = synthesizer(&fresh, model.clone()).synthesize(cluster_id, &category()).await.unwrap();
        assert!(matches!(result, Synthesis::Existing(id) if id == orphan.id));
        let cluster = fresh.get_cluster(cluster_id).await.unwrap().unwrap();
        assert_eq!(cluster.synthesized_article_id, Some(orphan.id));
        assert_eq!(model.call_count(Task::Synthesize), 1);
    }
}
