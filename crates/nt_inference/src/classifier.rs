use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use nt_core::{Category, Entities, Error, InferenceModel, Result, Task};

use crate::prompts::{self, ArticleDigest, SynthesisSource};
use crate::responses::{
    decode_entities, BreakingAssessment, CategoryAssessment, DuplicateJudgment, RewriteDraft,
    SynthesisDraft,
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed front for the language model. Every method either returns a
/// validated result or an `Error::Capability`; transport errors, timeouts
/// and malformed answers all collapse into that one variant.
#[derive(Debug, Clone)]
pub struct Classifier {
    model: Arc<dyn InferenceModel>,
    timeout: Duration,
}

impl Classifier {
    pub fn new(model: Arc<dyn InferenceModel>) -> Self {
        Self {
            model,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    async fn ask(&self, task: Task, prompt: String) -> Result<String> {
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.model.complete(task, &prompt)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(answer)) => {
                tracing::debug!(%task, elapsed_ms, "Model answered");
                Ok(answer)
            }
            Ok(Err(Error::Capability(msg))) => Err(Error::Capability(msg)),
            Ok(Err(e)) => Err(Error::Capability(format!("{}: {}", task, e))),
            Err(_) => Err(Error::Capability(format!(
                "{}: timed out after {}ms",
                task,
                self.timeout.as_millis()
            ))),
        }
    }

    pub async fn categorize(&self, title: &str, content: &str, source: &str) -> Result<CategoryAssessment> {
        let answer = self.ask(Task::Categorize, prompts::categorize(title, content, source)).await?;
        CategoryAssessment::decode(&answer)
    }

    pub async fn extract_entities(&self, content: &str) -> Result<Entities> {
        let answer = self.ask(Task::ExtractEntities, prompts::extract_entities(content)).await?;
        decode_entities(&answer)
    }

    pub async fn rewrite(&self, title: &str, content: &str, source: &str, category: Category) -> Result<RewriteDraft> {
        let answer = self
            .ask(Task::Rewrite, prompts::rewrite(title, content, source, category))
            .await?;
        RewriteDraft::decode(&answer)
    }

    pub async fn judge_duplicates(
        &self,
        article: &ArticleDigest,
        candidates: &[ArticleDigest],
    ) -> Result<DuplicateJudgment> {
        let answer = self
            .ask(Task::JudgeDuplicates, prompts::judge_duplicates(article, candidates))
            .await?;
        DuplicateJudgment::decode(&answer)
    }

    pub async fn synthesize(&self, sources: &[SynthesisSource]) -> Result<SynthesisDraft> {
        let answer = self.ask(Task::Synthesize, prompts::synthesize(sources)).await?;
        SynthesisDraft::decode(&answer)
    }

    pub async fn score_breaking_news(
        &self,
        title: &str,
        content: &str,
        category: Category,
        published_at: DateTime<Utc>,
    ) -> Result<BreakingAssessment> {
        let answer = self
            .ask(
                Task::ScoreBreakingNews,
                prompts::score_breaking_news(title, content, category, published_at),
            )
            .await?;
        BreakingAssessment::decode(&answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DummyModel;

    #[tokio::test]
    async fn test_categorize_through_model() {
        let model = Arc::new(DummyModel::new().with_response(
            Task::Categorize,
            r#"{"mainCategory": "sport", "confidence": 0.9}"#,
        ));
        let classifier = Classifier::new(model.clone());
        let assessment = classifier.categorize("Panthères", "Victoire", "Gabonactu").await.unwrap();
        assert_eq!(assessment.main, Category::Sport);
        assert!(model.prompts(Task::Categorize)[0].contains("Panthères"));
    }

    #[tokio::test]
    async fn test_malformed_answer_is_capability_error() {
        let model = Arc::new(DummyModel::new().with_response(Task::ExtractEntities, "I cannot do that"));
        let classifier = Classifier::new(model);
        let err = classifier.extract_entities("texte").await.unwrap_err();
        assert!(matches!(err, Error::Capability(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_capability_error() {
        let model = Arc::new(
            DummyModel::new()
                .with_response(Task::Rewrite, r#"{"title": "t", "longVersion": "l"}"#)
                .with_delay(Duration::from_millis(200)),
        );
        let classifier = Classifier::new(model).with_timeout(Duration::from_millis(20));
        let err = classifier
            .rewrite("t", "c", "s", Category::Society)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_transport_errors_are_mapped() {
        #[derive(Debug)]
        struct Offline;

        #[async_trait::async_trait]
        impl InferenceModel for Offline {
            fn name(&self) -> &str {
                "Offline"
            }

            async fn complete(&self, _task: Task, _prompt: &str) -> Result<String> {
                Err(Error::Inference("connection refused".to_string()))
            }
        }

        let classifier = Classifier::new(Arc::new(Offline));
        let err = classifier
            .score_breaking_news("t", "c", Category::Society, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Capability(ref msg) if msg.contains("connection refused")));
    }
}
