use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::text;

/// One item as it was scraped from a source, before it is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub title: String,
    pub content: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl RawItem {
    /// Canonical form of the item URL, or `InvalidUrl` when it does not parse.
    pub fn canonical_url(&self) -> crate::Result<String> {
        let mut parsed = url::Url::parse(self.url.trim())
            .map_err(|e| crate::Error::InvalidUrl(format!("{}: {}", self.url, e)))?;
        parsed.set_fragment(None);
        Ok(parsed.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawArticle {
    pub id: Uuid,
    pub source_id: String,
    pub source_name: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub author: Option<String>,
    pub content_hash: String,
    pub processed: bool,
    #[serde(default)]
    pub skipped: bool,
}

impl RawArticle {
    /// Builds an unprocessed raw article from a scraped item. The content
    /// hash is computed over the title and the first `prefix_chars` of the
    /// content.
    pub fn from_item(source: &SourceConfig, item: RawItem, url: String, prefix_chars: usize) -> Self {
        let content_hash = text::fingerprint(&item.title, &item.content, prefix_chars);
        Self {
            id: Uuid::new_v4(),
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            title: item.title,
            content: item.content,
            url,
            published_at: item.published_at,
            ingested_at: Utc::now(),
            image_url: item.image_url,
            author: item.author,
            content_hash,
            processed: false,
            skipped: false,
        }
    }
}

/// Static description of a news source, loaded once from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub reliability: Reliability,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for Reliability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Reliability::High => "high",
            Reliability::Medium => "medium",
            Reliability::Low => "low",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Politics,
    Economy,
    #[default]
    Society,
    Sport,
    Culture,
    Health,
    Education,
    Technology,
    International,
    Environment,
}

/// Free-text labels the model tends to answer with, keyed by their
/// normalized form.
const CATEGORY_SYNONYMS: &[(&str, Category)] = &[
    ("politique", Category::Politics),
    ("gouvernement", Category::Politics),
    ("economie", Category::Economy),
    ("business", Category::Economy),
    ("finance", Category::Economy),
    ("finances", Category::Economy),
    ("societe", Category::Society),
    ("faits divers", Category::Society),
    ("sports", Category::Sport),
    ("football", Category::Sport),
    ("arts", Category::Culture),
    ("entertainment", Category::Culture),
    ("divertissement", Category::Culture),
    ("sante", Category::Health),
    ("education", Category::Education),
    ("tech", Category::Technology),
    ("technologie", Category::Technology),
    ("science", Category::Technology),
    ("numerique", Category::Technology),
    ("world", Category::International),
    ("monde", Category::International),
    ("afrique", Category::International),
    ("environnement", Category::Environment),
    ("climat", Category::Environment),
    ("climate", Category::Environment),
];

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Politics,
        Category::Economy,
        Category::Society,
        Category::Sport,
        Category::Culture,
        Category::Health,
        Category::Education,
        Category::Technology,
        Category::International,
        Category::Environment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "politics",
            Category::Economy => "economy",
            Category::Society => "society",
            Category::Sport => "sport",
            Category::Culture => "culture",
            Category::Health => "health",
            Category::Education => "education",
            Category::Technology => "technology",
            Category::International => "international",
            Category::Environment => "environment",
        }
    }

    /// Maps a label onto the closed category set, trying the canonical names
    /// first and the synonym table second.
    pub fn from_label(label: &str) -> Option<Category> {
        let normalized = text::normalize(label);
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .or_else(|| {
                CATEGORY_SYNONYMS
                    .iter()
                    .find(|(synonym, _)| *synonym == normalized)
                    .map(|(_, category)| *category)
            })
    }

    /// Like [`Category::from_label`] but unknown labels land in `society`.
    pub fn from_label_or_default(label: &str) -> Category {
        Self::from_label(label).unwrap_or_else(|| {
            tracing::debug!(label, "Unknown category label, using society");
            Category::Society
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    Critical,
    High,
    #[default]
    Normal,
    Low,
}

impl Urgency {
    pub fn from_label(label: &str) -> Option<Urgency> {
        match label.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Some(Urgency::Critical),
            "HIGH" => Some(Urgency::High),
            "NORMAL" => Some(Urgency::Normal),
            "LOW" => Some(Urgency::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Skip,
    Merge,
    Update,
    Separate,
}

impl Recommendation {
    pub fn from_label(label: &str) -> Option<Recommendation> {
        match label.trim().to_ascii_uppercase().as_str() {
            "SKIP" => Some(Recommendation::Skip),
            "MERGE" => Some(Recommendation::Merge),
            "UPDATE" => Some(Recommendation::Update),
            "SEPARATE" => Some(Recommendation::Separate),
            _ => None,
        }
    }

    pub fn joins_cluster(&self) -> bool {
        matches!(self, Recommendation::Merge | Recommendation::Update)
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Recommendation::Skip => "SKIP",
            Recommendation::Merge => "MERGE",
            Recommendation::Update => "UPDATE",
            Recommendation::Separate => "SEPARATE",
        };
        f.write_str(label)
    }
}

/// Which stage of the detector produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    ContentHash,
    TitleSimilarity,
    Semantic,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateVerdict {
    pub is_duplicate: bool,
    pub similarity: f64,
    pub matching_ids: Vec<Uuid>,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub method: DetectionMethod,
    pub reasoning: Option<String>,
}

impl DuplicateVerdict {
    pub fn exact(matching_ids: Vec<Uuid>) -> Self {
        Self {
            is_duplicate: true,
            similarity: 1.0,
            matching_ids,
            recommendation: Recommendation::Skip,
            confidence: 0.99,
            method: DetectionMethod::ContentHash,
            reasoning: Some("identical content fingerprint".to_string()),
        }
    }

    pub fn novel() -> Self {
        Self {
            is_duplicate: false,
            similarity: 0.0,
            matching_ids: Vec::new(),
            recommendation: Recommendation::Separate,
            confidence: 0.95,
            method: DetectionMethod::TitleSimilarity,
            reasoning: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleCluster {
    pub id: Uuid,
    pub member_ids: BTreeSet<Uuid>,
    pub category: Category,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synthesized_article_id: Option<Uuid>,
}

impl ArticleCluster {
    pub fn intersects(&self, ids: &BTreeSet<Uuid>) -> bool {
        !self.member_ids.is_disjoint(ids)
    }
}

/// What the store did on a cluster attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAttachment {
    pub cluster_id: Uuid,
    pub created: bool,
    pub member_count: usize,
    pub synthesized_article_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entities {
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttribution {
    pub raw_article_id: Uuid,
    pub source_id: String,
    pub name: String,
    pub url: String,
    pub reliability: Reliability,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceClaim {
    pub source: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contradiction {
    pub topic: String,
    pub claims: Vec<SourceClaim>,
    pub resolution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceContribution {
    pub source: String,
    pub reliability: Reliability,
    #[serde(default)]
    pub key_facts: Vec<String>,
    #[serde(default)]
    pub unique_information: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisMetadata {
    pub cluster_id: Uuid,
    pub article_count: usize,
    pub factual_consensus: f64,
    pub contradictions: Vec<Contradiction>,
    pub source_analysis: Vec<SourceContribution>,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub audience: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedArticle {
    pub id: Uuid,
    pub title: String,
    pub summary_short: String,
    pub summary_medium: String,
    pub summary_long: String,
    pub categories: Vec<Category>,
    pub category_confidence: f64,
    pub entities: Entities,
    #[serde(default)]
    pub key_quotes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source_article_ids: Vec<Uuid>,
    pub sources: Vec<SourceAttribution>,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub is_trending: bool,
    pub is_breaking_news: bool,
    pub breaking_news_level: Urgency,
    pub notification: Option<Notification>,
    pub synthesis: Option<SynthesisMetadata>,
}

impl ProcessedArticle {
    /// Id of the article published straight from one raw article. Every run
    /// for the same raw article derives the same id.
    pub fn id_for_raw(raw_article_id: Uuid) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("nt:raw/{}", raw_article_id).as_bytes())
    }

    /// Id of the synthesized article of a cluster.
    pub fn id_for_cluster(cluster_id: Uuid) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("nt:cluster/{}", cluster_id).as_bytes())
    }

    pub fn primary_category(&self) -> Category {
        self.categories.first().copied().unwrap_or_default()
    }

    pub fn is_synthesized(&self) -> bool {
        self.synthesis.is_some()
    }
}
