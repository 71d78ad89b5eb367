//! Duplicate detection: fingerprint, then title similarity, then the
//! model's judgment with a local fallback.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use nt_core::text::{title_similarity, truncate_chars};
use nt_core::{ContentStore, DetectionMethod, DuplicateVerdict, RawArticle, Recommendation, Result};
use nt_inference::prompts::ArticleDigest;
use nt_inference::responses::DuplicateJudgment;
use nt_inference::Classifier;
use uuid::Uuid;

use crate::config::DedupConfig;

/// A processed article whose title resembles the one under test.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub article: RawArticle,
    pub score: f64,
}

pub struct DuplicateDetector {
    store: Arc<dyn ContentStore>,
    classifier: Classifier,
    config: DedupConfig,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn ContentStore>, classifier: Classifier, config: DedupConfig) -> Self {
        Self {
            store,
            classifier,
            config,
        }
    }

    /// Runs the whole decision chain. Only store errors are returned; model
    /// failures degrade to the local verdict.
    pub async fn detect(&self, article: &RawArticle) -> Result<DuplicateVerdict> {
        if let Some(verdict) = self.check_hash(article).await? {
            tracing::debug!(raw_article_id = %article.id, matches = verdict.matching_ids.len(), "Fingerprint match");
            return Ok(verdict);
        }

        let candidates = self.find_candidates(article).await?;
        if candidates.is_empty() {
            tracing::debug!(raw_article_id = %article.id, "No similar titles, article is novel");
            return Ok(DuplicateVerdict::novel());
        }

        tracing::debug!(
            raw_article_id = %article.id,
            candidates = candidates.len(),
            best = candidates[0].score,
            "Asking model for duplicate judgment"
        );
        Ok(self.judge(article, &candidates).await)
    }

    pub async fn check_hash(&self, article: &RawArticle) -> Result<Option<DuplicateVerdict>> {
        let since = Utc::now() - self.config.lookback();
        let ids: Vec<Uuid> = self
            .store
            .find_processed_by_hash(&article.content_hash, since)
            .await?
            .into_iter()
            .filter(|other| other.id != article.id)
            .map(|other| other.id)
            .collect();
        Ok((!ids.is_empty()).then(|| DuplicateVerdict::exact(ids)))
    }

    /// Processed, non-skipped articles from the lookback window whose title
    /// similarity is above the threshold, best first.
    pub async fn find_candidates(&self, article: &RawArticle) -> Result<Vec<Candidate>> {
        let since = Utc::now() - self.config.lookback();
        let pool = self.store.recent_processed(since, self.config.candidate_pool).await?;

        let mut candidates: Vec<Candidate> = pool
            .into_iter()
            .filter(|other| other.id != article.id && !other.skipped)
            .filter_map(|other| {
                let score = title_similarity(&article.title, &other.title);
                (score > self.config.candidate_threshold).then_some(Candidate { article: other, score })
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(self.config.max_candidates);
        Ok(candidates)
    }

    pub async fn judge(&self, article: &RawArticle, candidates: &[Candidate]) -> DuplicateVerdict {
        let digest = self.digest(article);
        let digests: Vec<ArticleDigest> = candidates.iter().map(|c| self.digest(&c.article)).collect();

        match self.classifier.judge_duplicates(&digest, &digests).await {
            Ok(judgment) => self.from_judgment(judgment, candidates),
            Err(e) => {
                tracing::warn!(raw_article_id = %article.id, error = %e, "Duplicate judgment unavailable, using title overlap");
                self.fallback_verdict(candidates)
            }
        }
    }

    /// Local verdict from the best title overlap alone.
    pub fn fallback_verdict(&self, candidates: &[Candidate]) -> DuplicateVerdict {
        let best = candidates.iter().map(|c| c.score).fold(0.0_f64, f64::max);
        if best > self.config.fallback_merge_threshold {
            let matching_ids = candidates
                .iter()
                .filter(|c| c.score > self.config.fallback_merge_threshold)
                .map(|c| c.article.id)
                .collect();
            DuplicateVerdict {
                is_duplicate: true,
                similarity: best,
                matching_ids,
                recommendation: Recommendation::Merge,
                confidence: 0.6,
                method: DetectionMethod::Fallback,
                reasoning: Some(format!("title overlap {:.2} above merge threshold", best)),
            }
        } else {
            DuplicateVerdict {
                is_duplicate: false,
                similarity: best,
                matching_ids: Vec::new(),
                recommendation: Recommendation::Separate,
                confidence: 0.6,
                method: DetectionMethod::Fallback,
                reasoning: Some(format!("title overlap {:.2} too weak to merge", best)),
            }
        }
    }

    fn from_judgment(&self, judgment: DuplicateJudgment, candidates: &[Candidate]) -> DuplicateVerdict {
        let mut seen = HashSet::new();
        let mut matching_ids: Vec<Uuid> = judgment
            .matching_ids
            .into_iter()
            .filter(|id| candidates.iter().any(|c| c.article.id == *id))
            .filter(|id| seen.insert(*id))
            .collect();

        if matching_ids.is_empty() && judgment.recommendation != Recommendation::Separate {
            matching_ids = best_candidate_ids(candidates);
        }

        DuplicateVerdict {
            is_duplicate: judgment.is_duplicate,
            similarity: judgment.similarity,
            matching_ids,
            recommendation: judgment.recommendation,
            confidence: judgment.confidence,
            method: DetectionMethod::Semantic,
            reasoning: judgment.reasoning,
        }
    }

    fn digest(&self, article: &RawArticle) -> ArticleDigest {
        ArticleDigest {
            id: article.id,
            title: article.title.clone(),
            snippet: truncate_chars(&article.content, self.config.snippet_chars),
            source: article.source_name.clone(),
            published_at: article.published_at,
        }
    }
}

fn best_candidate_ids(candidates: &[Candidate]) -> Vec<Uuid> {
    let best = candidates.iter().map(|c| c.score).fold(0.0_f64, f64::max);
    candidates
        .iter()
        .filter(|c| c.score >= best)
        .map(|c| c.article.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_core::{RawItem, SourceConfig, Task};
    use nt_inference::models::DummyModel;
    use nt_storage::InMemoryStorage;

    fn raw(title: &str, content: &str) -> RawArticle {
        let source = SourceConfig {
            id: "gabonactu".to_string(),
            name: "Gabonactu".to_string(),
            url: None,
            reliability: Default::default(),
        };
        let item = RawItem {
            title: title.to_string(),
            content: content.to_string(),
            url: format!("https://gabonactu.com/{}", Uuid::new_v4()),
            published_at: Utc::now(),
            image_url: None,
            author: None,
        };
        let url = item.url.clone();
        RawArticle::from_item(&source, item, url, 200)
    }

    async fn stored(store: &InMemoryStorage, title: &str, content: &str) -> RawArticle {
        let article = raw(title, content);
        store.insert_raw(&article).await.unwrap();
        store.mark_processed(article.id, false).await.unwrap();
        article
    }

    fn detector(store: &InMemoryStorage, model: Arc<DummyModel>) -> DuplicateDetector {
        DuplicateDetector::new(Arc::new(store.clone()), Classifier::new(model), DedupConfig::default())
    }

    #[tokio::test]
    async fn test_fingerprint_match_is_skip() {
        let store = InMemoryStorage::new();
        let original = stored(&store, "Décès du ministre", "Le ministre est décédé hier.").await;
        let copy = raw("DECES DU MINISTRE", "le ministre est decede hier");
        let model = Arc::new(DummyModel::new());

        let verdict = detector(&store, model.clone()).detect(&copy).await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Skip);
        assert_eq!(verdict.similarity, 1.0);
        assert_eq!(verdict.confidence, 0.99);
        assert_eq!(verdict.matching_ids, vec![original.id]);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unprocessed_articles_are_not_matched() {
        let store = InMemoryStorage::new();
        let pending = raw("Décès du ministre", "Le ministre est décédé hier.");
        store.insert_raw(&pending).await.unwrap();
        let copy = raw("Décès du ministre", "Le ministre est décédé hier.");

        let verdict = detector(&store, Arc::new(DummyModel::new())).detect(&copy).await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Separate);
        assert_eq!(verdict.confidence, 0.95);
    }

    #[tokio::test]
    async fn test_candidates_are_ranked_and_capped() {
        let store = InMemoryStorage::new();
        stored(&store, "Gabon : le budget 2026 adopté par le Parlement", "a").await;
        stored(&store, "Budget 2026 du Gabon adopté par l'Assemblée", "b").await;
        stored(&store, "Les Panthères qualifiées pour la CAN", "c").await;
        let article = raw("Gabon : budget 2026 adopté, le Parlement salue", "d");

        let candidates = detector(&store, Arc::new(DummyModel::new()))
            .find_candidates(&article)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].score > candidates[1].score);
        assert!(candidates[0].article.title.contains("Parlement"));
    }

    #[tokio::test]
    async fn test_novel_article_skips_model() {
        let store = InMemoryStorage::new();
        stored(&store, "Les Panthères qualifiées pour la CAN", "c").await;
        let model = Arc::new(DummyModel::new());
        let article = raw("Budget 2026 : le gouvernement dévoile ses priorités", "d");

        let verdict = detector(&store, model.clone()).detect(&article).await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Separate);
        assert_eq!(verdict.confidence, 0.95);
        assert!(verdict.matching_ids.is_empty());
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_merges_strong_overlap() {
        let store = InMemoryStorage::new();
        let original = stored(&store, "Gabon : le budget 2026 adopté par le Parlement", "a").await;
        let article = raw("Gabon : budget 2026 adopté, le Parlement salue", "b");

        let verdict = detector(&store, Arc::new(DummyModel::new())).detect(&article).await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Merge);
        assert_eq!(verdict.method, DetectionMethod::Fallback);
        assert_eq!(verdict.confidence, 0.6);
        assert_eq!(verdict.matching_ids, vec![original.id]);
    }

    #[tokio::test]
    async fn test_fallback_separates_moderate_overlap() {
        let store = InMemoryStorage::new();
        stored(&store, "Gabon : le budget 2026 adopté par le Parlement", "a").await;
        let article = raw("Budget 2026 du Gabon adopté par l'Assemblée", "b");

        let verdict = detector(&store, Arc::new(DummyModel::new())).detect(&article).await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Separate);
        assert_eq!(verdict.confidence, 0.6);
        assert!(!verdict.is_duplicate);
    }

    #[tokio::test]
    async fn test_judgment_ids_are_restricted_to_candidates() {
        let store = InMemoryStorage::new();
        let original = stored(&store, "Gabon : le budget 2026 adopté par le Parlement", "a").await;
        let model = Arc::new(DummyModel::new().with_response(
            Task::JudgeDuplicates,
            format!(
                r#"{{"isDuplicate": true, "similarityScore": 0.8, "matchingArticleIds": ["{}"], "recommendation": "UPDATE", "confidence": 0.9}}"#,
                Uuid::new_v4()
            ),
        ));
        let article = raw("Budget 2026 du Gabon adopté par l'Assemblée", "b");

        let verdict = detector(&store, model).detect(&article).await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Update);
        assert_eq!(verdict.method, DetectionMethod::Semantic);
        assert_eq!(verdict.matching_ids, vec![original.id]);
    }

    #[tokio::test]
    async fn test_repeated_judgment_ids_are_kept_once() {
        let store = InMemoryStorage::new();
        let first = stored(&store, "Gabon : le budget 2026 adopté par le Parlement", "a").await;
        let second = stored(&store, "Budget 2026 du Gabon adopté par l'Assemblée", "b").await;
        let model = Arc::new(DummyModel::new().with_response(
            Task::JudgeDuplicates,
            format!(
                r#"{{"isDuplicate": true, "similarityScore": 0.8, "matchingArticleIds": ["{b}", "{a}", "{b}"], "recommendation": "MERGE", "confidence": 0.9}}"#,
                a = first.id,
                b = second.id
            ),
        ));
        let article = raw("Gabon : budget 2026 adopté, le Parlement salue", "c");

        let verdict = detector(&store, model).detect(&article).await.unwrap();
        assert_eq!(verdict.recommendation, Recommendation::Merge);
        assert_eq!(verdict.matching_ids, vec![second.id, first.id]);
    }
}
