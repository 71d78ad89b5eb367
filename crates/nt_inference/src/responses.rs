//! Typed results of every capability, decoded from the model's raw text.
//!
//! Each decoder extracts the JSON object from the answer, deserializes it
//! into a permissive wire struct where every field has a default, then
//! validates the fields that matter. Anything that fails validation is a
//! `Capability` error so callers fall back to their local default.

use nt_core::text::truncate_chars;
use nt_core::{
    Category, Contradiction, Entities, Error, Notification, Recommendation, Reliability, Result,
    SourceClaim, SourceContribution, Task, Urgency,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

pub const SHORT_CHARS: usize = 280;
pub const MEDIUM_CHARS: usize = 800;
pub const LONG_CHARS: usize = 2400;

/// Slice out the outermost JSON object, tolerating code fences and chatter
/// around it.
pub fn extract_json(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn parse<W: DeserializeOwned>(task: Task, raw: &str) -> Result<W> {
    let json = extract_json(raw)
        .ok_or_else(|| Error::Capability(format!("{}: no JSON object in response", task)))?;
    serde_json::from_str(json)
        .map_err(|e| Error::Capability(format!("{}: malformed response: {}", task, e)))
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAssessment {
    pub main: Category,
    pub secondary: Vec<Category>,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct CategoryWire {
    main_category: Option<String>,
    secondary_categories: Vec<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
}

impl CategoryAssessment {
    pub fn fallback() -> Self {
        Self {
            main: Category::Society,
            secondary: Vec::new(),
            confidence: 0.3,
            reasoning: Some("categorization unavailable, default category".to_string()),
        }
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let wire: CategoryWire = parse(Task::Categorize, raw)?;
        let label = non_empty(wire.main_category)
            .ok_or_else(|| Error::Capability("categorize: missing mainCategory".to_string()))?;
        let main = Category::from_label_or_default(&label);

        let mut secondary = Vec::new();
        for category in wire.secondary_categories.iter().filter_map(|l| Category::from_label(l)) {
            if category != main && !secondary.contains(&category) {
                secondary.push(category);
            }
        }
        secondary.truncate(2);

        Ok(Self {
            main,
            secondary,
            confidence: clamp_unit(wire.confidence.unwrap_or(0.5)),
            reasoning: non_empty(wire.reasoning),
        })
    }

    /// Main category first, then the secondary ones.
    pub fn categories(&self) -> Vec<Category> {
        std::iter::once(self.main).chain(self.secondary.iter().copied()).collect()
    }
}

pub fn decode_entities(raw: &str) -> Result<Entities> {
    let wire: Entities = parse(Task::ExtractEntities, raw)?;
    Ok(Entities {
        people: clean_list(wire.people),
        organizations: clean_list(wire.organizations),
        locations: clean_list(wire.locations),
        keywords: clean_list(wire.keywords),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteDraft {
    pub title: String,
    pub short: String,
    pub medium: String,
    pub long: String,
    pub key_quotes: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RewriteWire {
    title: Option<String>,
    short_version: Option<String>,
    medium_version: Option<String>,
    long_version: Option<String>,
    key_quotes: Vec<String>,
    suggested_tags: Vec<String>,
}

impl RewriteDraft {
    /// The original text, cut to the three target lengths.
    pub fn passthrough(title: &str, content: &str) -> Self {
        Self {
            title: title.trim().to_string(),
            short: truncate_chars(content, SHORT_CHARS),
            medium: truncate_chars(content, MEDIUM_CHARS),
            long: truncate_chars(content, LONG_CHARS),
            key_quotes: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let wire: RewriteWire = parse(Task::Rewrite, raw)?;
        let title = non_empty(wire.title)
            .ok_or_else(|| Error::Capability("rewrite: missing title".to_string()))?;
        let long = non_empty(wire.long_version)
            .ok_or_else(|| Error::Capability("rewrite: missing longVersion".to_string()))?;
        let medium = non_empty(wire.medium_version).unwrap_or_else(|| truncate_chars(&long, MEDIUM_CHARS));
        let short = non_empty(wire.short_version).unwrap_or_else(|| truncate_chars(&medium, SHORT_CHARS));

        Ok(Self {
            title,
            short,
            medium,
            long,
            key_quotes: clean_list(wire.key_quotes),
            tags: clean_list(wire.suggested_tags),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateJudgment {
    pub is_duplicate: bool,
    pub similarity: f64,
    pub matching_ids: Vec<Uuid>,
    pub recommendation: Recommendation,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct DuplicateWire {
    is_duplicate: bool,
    similarity_score: f64,
    matching_article_ids: Vec<String>,
    recommendation: String,
    confidence: f64,
    reasoning: Option<String>,
}

impl DuplicateJudgment {
    pub fn decode(raw: &str) -> Result<Self> {
        let wire: DuplicateWire = parse(Task::JudgeDuplicates, raw)?;
        let recommendation = Recommendation::from_label(&wire.recommendation).unwrap_or_else(|| {
            tracing::warn!(
                recommendation = %wire.recommendation,
                "Unrecognized duplicate recommendation, using SEPARATE"
            );
            Recommendation::Separate
        });
        let matching_ids = wire
            .matching_article_ids
            .iter()
            .filter_map(|id| Uuid::parse_str(id.trim()).ok())
            .collect();

        Ok(Self {
            is_duplicate: wire.is_duplicate,
            similarity: clamp_unit(wire.similarity_score),
            matching_ids,
            recommendation,
            confidence: clamp_unit(wire.confidence),
            reasoning: non_empty(wire.reasoning),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisDraft {
    pub title: String,
    pub short: String,
    pub medium: String,
    pub long: String,
    pub source_analysis: Vec<SourceContribution>,
    pub factual_consensus: f64,
    pub contradictions: Vec<Contradiction>,
    pub confidence: f64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SynthesisWire {
    title: Option<String>,
    short_version: Option<String>,
    medium_version: Option<String>,
    long_version: Option<String>,
    source_analysis: Vec<SourceAnalysisWire>,
    factual_consensus: Option<f64>,
    contradictions: Vec<ContradictionWire>,
    confidence: Option<f64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct SourceAnalysisWire {
    source: String,
    reliability: Option<String>,
    key_facts: Vec<String>,
    unique_information: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct ContradictionWire {
    topic: String,
    #[serde(alias = "versions")]
    claims: Vec<SourceClaim>,
    resolution: String,
}

fn reliability_label(label: Option<&str>) -> Reliability {
    match label.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("high") => Reliability::High,
        Some("medium") => Reliability::Medium,
        _ => Reliability::Low,
    }
}

impl SynthesisDraft {
    pub fn decode(raw: &str) -> Result<Self> {
        let wire: SynthesisWire = parse(Task::Synthesize, raw)?;
        let title = non_empty(wire.title)
            .ok_or_else(|| Error::Capability("synthesize: missing title".to_string()))?;
        let long = non_empty(wire.long_version)
            .ok_or_else(|| Error::Capability("synthesize: missing longVersion".to_string()))?;
        let medium = non_empty(wire.medium_version).unwrap_or_else(|| truncate_chars(&long, MEDIUM_CHARS));
        let short = non_empty(wire.short_version).unwrap_or_else(|| truncate_chars(&medium, SHORT_CHARS));

        let source_analysis = wire
            .source_analysis
            .into_iter()
            .filter(|s| !s.source.trim().is_empty())
            .map(|s| SourceContribution {
                reliability: reliability_label(s.reliability.as_deref()),
                source: s.source.trim().to_string(),
                key_facts: clean_list(s.key_facts),
                unique_information: clean_list(s.unique_information),
            })
            .collect();

        let contradictions = wire
            .contradictions
            .into_iter()
            .filter(|c| !c.topic.trim().is_empty())
            .map(|c| Contradiction {
                topic: c.topic.trim().to_string(),
                claims: c.claims,
                resolution: c.resolution.trim().to_string(),
            })
            .collect();

        Ok(Self {
            title,
            short,
            medium,
            long,
            source_analysis,
            factual_consensus: clamp_unit(wire.factual_consensus.unwrap_or(0.5)),
            contradictions,
            confidence: clamp_unit(wire.confidence.unwrap_or(0.5)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakingAssessment {
    pub is_breaking: bool,
    pub urgency: Urgency,
    pub notification: Option<Notification>,
    pub confidence: f64,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct BreakingWire {
    is_breaking_news: bool,
    urgency_level: String,
    notification_title: Option<String>,
    notification_body: Option<String>,
    target_audience: Option<String>,
    confidence: Option<f64>,
}

impl BreakingAssessment {
    pub fn not_breaking() -> Self {
        Self {
            is_breaking: false,
            urgency: Urgency::Normal,
            notification: None,
            confidence: 0.0,
        }
    }

    pub fn decode(raw: &str) -> Result<Self> {
        let wire: BreakingWire = parse(Task::ScoreBreakingNews, raw)?;
        let urgency = Urgency::from_label(&wire.urgency_level).unwrap_or_default();
        let notification = match (non_empty(wire.notification_title), non_empty(wire.notification_body)) {
            (Some(title), Some(body)) => Some(Notification {
                title,
                body,
                audience: non_empty(wire.target_audience),
            }),
            _ => None,
        };

        Ok(Self {
            is_breaking: wire.is_breaking_news,
            urgency,
            notification,
            confidence: clamp_unit(wire.confidence.unwrap_or(0.5)),
        })
    }
}
