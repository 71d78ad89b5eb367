//! Per-article pipeline driver and the sweep over unprocessed articles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use nt_core::{
    Category, ContentStore, DuplicateVerdict, Error, InferenceModel, ProcessedArticle, RawArticle,
    Recommendation, Result, SourceAttribution,
};
use nt_inference::responses::{CategoryAssessment, RewriteDraft};
use nt_inference::Classifier;
use serde::Serialize;
use uuid::Uuid;

use crate::breaking::BreakingNewsScorer;
use crate::clusters::ClusterManager;
use crate::config::{KeywordGate, PipelineConfig, SourceDirectory};
use crate::dedup::DuplicateDetector;
use crate::synthesis::{Synthesis, Synthesizer};

/// Terminal state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    NotFound,
    AlreadyProcessed,
    DuplicateSkip,
    /// Attached to a cluster still below the synthesis threshold.
    ThresholdNotMet,
    Synthesized,
    /// Threshold reached but the model produced no synthesis.
    SynthesisFailed,
    /// Attached to a cluster that already has its synthesized article.
    Merged,
    Published,
    Failed,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::NotFound | Outcome::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingReport {
    pub raw_article_id: Uuid,
    pub success: bool,
    pub outcome: Outcome,
    pub article_id: Option<Uuid>,
    pub cluster_id: Option<Uuid>,
    pub is_duplicate: bool,
    pub action: Option<Recommendation>,
    pub categories: Vec<Category>,
    pub is_breaking_news: bool,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl ProcessingReport {
    fn new(raw_article_id: Uuid) -> Self {
        Self {
            raw_article_id,
            success: false,
            outcome: Outcome::Failed,
            article_id: None,
            cluster_id: None,
            is_duplicate: false,
            action: None,
            categories: Vec::new(),
            is_breaking_news: false,
            elapsed_ms: 0,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub published: usize,
    pub merged: usize,
    pub synthesized: usize,
    pub skipped: usize,
}

impl SweepSummary {
    fn record(&mut self, report: &ProcessingReport) {
        self.attempted += 1;
        if report.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        match report.outcome {
            Outcome::Published => self.published += 1,
            Outcome::DuplicateSkip => self.skipped += 1,
            Outcome::Synthesized => {
                self.merged += 1;
                self.synthesized += 1;
            }
            Outcome::ThresholdNotMet | Outcome::SynthesisFailed | Outcome::Merged => self.merged += 1,
            Outcome::NotFound | Outcome::AlreadyProcessed | Outcome::Failed => {}
        }
    }
}

/// Drives one raw article from ingestion to a terminal outcome. Holds no
/// state between runs; everything is read back from the store.
pub struct Processor {
    store: Arc<dyn ContentStore>,
    classifier: Classifier,
    sources: Arc<SourceDirectory>,
    detector: DuplicateDetector,
    clusters: Arc<ClusterManager>,
    synthesizer: Synthesizer,
    breaking: BreakingNewsScorer,
}

impl Processor {
    pub fn new(store: Arc<dyn ContentStore>, model: Arc<dyn InferenceModel>, config: &PipelineConfig) -> Self {
        let classifier = Classifier::new(model).with_timeout(config.capability_timeout());
        let sources = Arc::new(config.source_directory());
        let gate: Arc<KeywordGate> = Arc::new(config.keyword_gate());
        let clusters = Arc::new(ClusterManager::new(store.clone()));
        let detector = DuplicateDetector::new(store.clone(), classifier.clone(), config.dedup.clone());
        let synthesizer = Synthesizer::new(store.clone(), clusters.clone(), classifier.clone(), sources.clone())
            .with_threshold(config.synthesis_threshold)
            .with_content_chars(config.synthesis_content_chars);
        let breaking = BreakingNewsScorer::new(classifier.clone(), gate);

        Self {
            store,
            classifier,
            sources,
            detector,
            clusters,
            synthesizer,
            breaking,
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn clusters(&self) -> &ClusterManager {
        &self.clusters
    }

    pub fn sources(&self) -> &SourceDirectory {
        &self.sources
    }

    /// Runs the pipeline for one raw article. Never panics or returns an
    /// error: every exit is described by the report.
    pub async fn process(&self, raw_article_id: Uuid) -> ProcessingReport {
        let started = Instant::now();
        let mut report = ProcessingReport::new(raw_article_id);

        match self.run(raw_article_id, &mut report).await {
            Ok(outcome) => {
                report.outcome = outcome;
                report.success = outcome.is_success();
                if outcome == Outcome::NotFound {
                    report.error = Some(Error::not_found("raw article", raw_article_id).to_string());
                }
            }
            Err(e) => {
                tracing::error!(raw_article_id = %raw_article_id, error = %e, "❌ Processing failed");
                report.outcome = Outcome::Failed;
                report.success = false;
                report.error = Some(e.to_string());
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            raw_article_id = %raw_article_id,
            outcome = ?report.outcome,
            article_id = ?report.article_id,
            elapsed_ms = report.elapsed_ms,
            "Processing finished"
        );
        report
    }

    async fn run(&self, id: Uuid, report: &mut ProcessingReport) -> Result<Outcome> {
        let Some(raw) = self.store.get_raw(id).await? else {
            tracing::warn!(raw_article_id = %id, "Raw article not found");
            return Ok(Outcome::NotFound);
        };
        if raw.processed {
            tracing::debug!(raw_article_id = %id, "Already processed, nothing to do");
            return Ok(Outcome::AlreadyProcessed);
        }
        tracing::debug!(raw_article_id = %id, source = %raw.source_id, title = %raw.title, "Fetched raw article");

        let verdict = self.detector.detect(&raw).await?;
        report.is_duplicate = verdict.is_duplicate;
        report.action = Some(verdict.recommendation);
        tracing::debug!(
            raw_article_id = %id,
            recommendation = %verdict.recommendation,
            method = ?verdict.method,
            similarity = verdict.similarity,
            confidence = verdict.confidence,
            "Duplicate verdict"
        );

        match verdict.recommendation {
            Recommendation::Skip => {
                if !self.mark(id, true).await? {
                    return Ok(Outcome::AlreadyProcessed);
                }
                Ok(Outcome::DuplicateSkip)
            }
            action if action.joins_cluster() => self.merge(&raw, &verdict, report).await,
            _ => self.publish(&raw, report).await,
        }
    }

    async fn merge(&self, raw: &RawArticle, verdict: &DuplicateVerdict, report: &mut ProcessingReport) -> Result<Outcome> {
        let category = self.categorize(raw).await;
        report.categories = category.categories();

        let attachment = self
            .clusters
            .attach_or_create(raw.id, &verdict.matching_ids, category.main)
            .await?;
        report.cluster_id = Some(attachment.cluster_id);

        let outcome = if attachment.member_count < self.synthesizer.threshold() {
            Outcome::ThresholdNotMet
        } else if let Some(existing) = attachment.synthesized_article_id {
            tracing::debug!(cluster_id = %attachment.cluster_id, article_id = %existing, "Cluster already synthesized");
            Outcome::Merged
        } else {
            match self.synthesizer.synthesize(attachment.cluster_id, &category).await? {
                Synthesis::Created(article) => {
                    report.article_id = Some(article.id);
                    Outcome::Synthesized
                }
                Synthesis::Existing(_) => Outcome::Merged,
                Synthesis::NotProduced => Outcome::SynthesisFailed,
            }
        };

        if !self.mark(raw.id, false).await? {
            report.article_id = None;
            return Ok(Outcome::AlreadyProcessed);
        }
        Ok(outcome)
    }

    async fn publish(&self, raw: &RawArticle, report: &mut ProcessingReport) -> Result<Outcome> {
        let category = self.categorize(raw).await;
        report.categories = category.categories();
        tracing::debug!(raw_article_id = %raw.id, category = %category.main, "Categorized");

        let entities = match self.classifier.extract_entities(&raw.content).await {
            Ok(entities) => entities,
            Err(e) => {
                tracing::warn!(raw_article_id = %raw.id, error = %e, "Entity extraction unavailable, no entities");
                Default::default()
            }
        };
        tracing::debug!(raw_article_id = %raw.id, "Entities extracted");

        let draft = match self
            .classifier
            .rewrite(&raw.title, &raw.content, &raw.source_name, category.main)
            .await
        {
            Ok(draft) => draft,
            Err(e) => {
                tracing::warn!(raw_article_id = %raw.id, error = %e, "Rewrite unavailable, passing original text through");
                RewriteDraft::passthrough(&raw.title, &raw.content)
            }
        };
        tracing::debug!(raw_article_id = %raw.id, "Rewritten");

        let breaking = self
            .breaking
            .score(&raw.title, &raw.content, category.main, raw.published_at)
            .await;
        report.is_breaking_news = breaking.is_breaking;
        tracing::debug!(raw_article_id = %raw.id, breaking = breaking.is_breaking, urgency = ?breaking.urgency, "Breaking news scored");

        let article = ProcessedArticle {
            id: ProcessedArticle::id_for_raw(raw.id),
            title: draft.title,
            summary_short: draft.short,
            summary_medium: draft.medium,
            summary_long: draft.long,
            categories: category.categories(),
            category_confidence: category.confidence,
            entities,
            key_quotes: draft.key_quotes,
            tags: draft.tags,
            source_article_ids: vec![raw.id],
            sources: vec![SourceAttribution {
                raw_article_id: raw.id,
                source_id: raw.source_id.clone(),
                name: raw.source_name.clone(),
                url: raw.url.clone(),
                reliability: self.sources.reliability(&raw.source_id),
            }],
            image_url: raw.image_url.clone(),
            published_at: raw.published_at,
            processed_at: Utc::now(),
            is_trending: false,
            is_breaking_news: breaking.is_breaking,
            breaking_news_level: breaking.urgency,
            notification: breaking.notification,
            synthesis: None,
        };

        // A concurrent run for the same raw article writes under the same id,
        // and only the run that flips the processed flag reports the article.
        if !self.store.insert_processed(&article).await? {
            tracing::debug!(raw_article_id = %raw.id, article_id = %article.id, "Article already stored");
        }
        if !self.mark(raw.id, false).await? {
            report.is_breaking_news = false;
            return Ok(Outcome::AlreadyProcessed);
        }
        report.article_id = Some(article.id);
        if article.is_breaking_news {
            tracing::info!(article_id = %article.id, urgency = ?article.breaking_news_level, "🚨 Breaking news published");
        }
        Ok(Outcome::Published)
    }

    async fn categorize(&self, raw: &RawArticle) -> CategoryAssessment {
        match self
            .classifier
            .categorize(&raw.title, &raw.content, &raw.source_name)
            .await
        {
            Ok(assessment) => assessment,
            Err(e) => {
                tracing::warn!(raw_article_id = %raw.id, error = %e, "Categorization unavailable, using default category");
                CategoryAssessment::fallback()
            }
        }
    }

    /// Flips the processed flag. False means a concurrent run got there first.
    async fn mark(&self, id: Uuid, skipped: bool) -> Result<bool> {
        let marked = self.store.mark_processed(id, skipped).await?;
        if !marked {
            tracing::info!(raw_article_id = %id, "Raw article was processed concurrently");
        }
        Ok(marked)
    }

    /// Processes up to `batch_size` unprocessed articles, oldest first,
    /// pausing `pace` between items.
    pub async fn sweep(&self, batch_size: usize, pace: Duration) -> Result<SweepSummary> {
        let pending = self.store.unprocessed(batch_size).await?;
        tracing::info!(pending = pending.len(), batch_size, "🧹 Sweeping unprocessed articles");

        let mut summary = SweepSummary::default();
        for (i, raw) in pending.iter().enumerate() {
            if i > 0 && !pace.is_zero() {
                tokio::time::sleep(pace).await;
            }
            let report = self.process(raw.id).await;
            summary.record(&report);
        }

        tracing::info!(
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            published = summary.published,
            merged = summary.merged,
            synthesized = summary.synthesized,
            skipped = summary.skipped,
            "Sweep finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success() {
        assert!(Outcome::AlreadyProcessed.is_success());
        assert!(Outcome::SynthesisFailed.is_success());
        assert!(!Outcome::NotFound.is_success());
        assert!(!Outcome::Failed.is_success());
    }

    #[test]
    fn test_sweep_summary_counts() {
        let mut summary = SweepSummary::default();
        for outcome in [Outcome::Published, Outcome::Synthesized, Outcome::DuplicateSkip, Outcome::Failed] {
            let mut report = ProcessingReport::new(Uuid::new_v4());
            report.outcome = outcome;
            report.success = outcome.is_success();
            summary.record(&report);
        }
        assert_eq!(
            summary,
            SweepSummary {
                attempted: 4,
                succeeded: 3,
                failed: 1,
                published: 1,
                merged: 1,
                synthesized: 1,
                skipped: 1,
            }
        );
    }

    #[test]
    fn test_report_serialization() {
        let mut report = ProcessingReport::new(Uuid::new_v4());
        report.outcome = Outcome::ThresholdNotMet;
        report.action = Some(Recommendation::Merge);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["outcome"], "THRESHOLD_NOT_MET");
        assert_eq!(value["action"], "MERGE");
        assert!(value["rawArticleId"].is_string());
    }
}
