use std::sync::Arc;

use chrono::{DateTime, Utc};
use nt_core::Category;
use nt_inference::responses::BreakingAssessment;
use nt_inference::Classifier;

use crate::config::KeywordGate;

/// Urgency scoring behind a keyword pre-filter. Titles without a keyword
/// never reach the model.
pub struct BreakingNewsScorer {
    classifier: Classifier,
    gate: Arc<KeywordGate>,
}

impl BreakingNewsScorer {
    pub fn new(classifier: Classifier, gate: Arc<KeywordGate>) -> Self {
        Self { classifier, gate }
    }

    pub async fn score(
        &self,
        title: &str,
        content: &str,
        category: Category,
        published_at: DateTime<Utc>,
    ) -> BreakingAssessment {
        let Some(keyword) = self.gate.matches(title) else {
            return BreakingAssessment::not_breaking();
        };
        tracing::debug!(keyword, "Title passed breaking-news gate");

        match self
            .classifier
            .score_breaking_news(title, content, category, published_at)
            .await
        {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(error = %e, "Breaking-news scoring unavailable, not breaking");
                BreakingAssessment::not_breaking()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nt_core::{Task, Urgency};
    use nt_inference::models::DummyModel;

    use crate::config::PipelineConfig;

    fn scorer(model: Arc<DummyModel>) -> BreakingNewsScorer {
        BreakingNewsScorer::new(
            Classifier::new(model),
            Arc::new(PipelineConfig::default().keyword_gate()),
        )
    }

    #[tokio::test]
    async fn test_gate_blocks_ordinary_titles() {
        let model = Arc::new(DummyModel::new().with_response(
            Task::ScoreBreakingNews,
            r#"{"isBreakingNews": true, "urgencyLevel": "CRITICAL"}"#,
        ));
        let assessment = scorer(model.clone())
            .score("Budget 2026 adopté", "contenu", Category::Economy, Utc::now())
            .await;
        assert!(!assessment.is_breaking);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_keyword_title_is_scored() {
        let model = Arc::new(DummyModel::new().with_response(
            Task::ScoreBreakingNews,
            r#"{"isBreakingNews": true, "urgencyLevel": "HIGH", "notificationTitle": "Alerte", "notificationBody": "Séisme ressenti à Libreville"}"#,
        ));
        let assessment = scorer(model.clone())
            .score("Séisme ressenti à Libreville", "contenu", Category::Society, Utc::now())
            .await;
        assert!(assessment.is_breaking);
        assert_eq!(assessment.urgency, Urgency::High);
        assert_eq!(model.call_count(Task::ScoreBreakingNews), 1);
    }

    #[tokio::test]
    async fn test_model_failure_is_not_breaking() {
        let model = Arc::new(DummyModel::new());
        let assessment = scorer(model.clone())
            .score("Incendie au marché de Mont-Bouët", "contenu", Category::Society, Utc::now())
            .await;
        assert!(!assessment.is_breaking);
        assert_eq!(assessment.urgency, Urgency::Normal);
        assert_eq!(model.call_count(Task::ScoreBreakingNews), 1);
    }
}
