//! Pipeline settings. Loaded once at startup and frozen into the immutable
//! lookups the components share.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use nt_core::text::normalize;
use nt_core::{Reliability, Result, SourceConfig};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BREAKING_KEYWORDS: &[&str] = &[
    "urgent",
    "alerte",
    "breaking",
    "décès",
    "mort",
    "attentat",
    "explosion",
    "séisme",
    "incendie",
    "accident",
    "coup d'état",
    "démission",
    "évacuation",
    "flash",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DedupConfig {
    /// Characters of content folded into the fingerprint.
    pub content_prefix_chars: usize,
    pub lookback_hours: i64,
    /// Newest processed articles considered for title similarity.
    pub candidate_pool: usize,
    /// Candidates must score strictly above this.
    pub candidate_threshold: f64,
    pub max_candidates: usize,
    /// Offline verdict turns into MERGE strictly above this.
    pub fallback_merge_threshold: f64,
    pub snippet_chars: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            content_prefix_chars: 200,
            lookback_hours: 48,
            candidate_pool: 100,
            candidate_threshold: 0.5,
            max_candidates: 5,
            fallback_merge_threshold: 0.7,
            snippet_chars: 300,
        }
    }
}

impl DedupConfig {
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub dedup: DedupConfig,
    /// Cluster size at which a synthesized article is produced.
    pub synthesis_threshold: usize,
    pub synthesis_content_chars: usize,
    pub capability_timeout_secs: u64,
    pub breaking_keywords: Vec<String>,
    pub sources: Vec<SourceConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dedup: DedupConfig::default(),
            synthesis_threshold: 3,
            synthesis_content_chars: 1000,
            capability_timeout_secs: 30,
            breaking_keywords: DEFAULT_BREAKING_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            sources: default_sources(),
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    let source = |id: &str, name: &str, url: &str, reliability| SourceConfig {
        id: id.to_string(),
        name: name.to_string(),
        url: Some(url.to_string()),
        reliability,
    };
    vec![
        source("union", "L'Union", "https://www.union.sonapresse.com", Reliability::High),
        source("agp", "AGP Gabon", "https://www.agpgabon.ga", Reliability::High),
        source("gabonreview", "Gabonreview", "https://www.gabonreview.com", Reliability::Medium),
        source("gabonactu", "Gabonactu", "https://gabonactu.com", Reliability::Medium),
        source("gabonmediatime", "Gabon Media Time", "https://www.gabonmediatime.com", Reliability::Low),
    ]
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        let config = Self::from_json(&json)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            keywords = config.breaking_keywords.len(),
            "Loaded pipeline configuration"
        );
        Ok(config)
    }

    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }

    pub fn source_directory(&self) -> SourceDirectory {
        SourceDirectory::new(self.sources.clone())
    }

    pub fn keyword_gate(&self) -> KeywordGate {
        KeywordGate::new(&self.breaking_keywords)
    }
}

/// Static source table keyed by source id.
#[derive(Debug, Clone, Default)]
pub struct SourceDirectory {
    sources: HashMap<String, SourceConfig>,
}

impl SourceDirectory {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self {
            sources: sources.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.get(id)
    }

    /// Unknown sources rank lowest.
    pub fn reliability(&self, id: &str) -> Reliability {
        self.get(id).map(|s| s.reliability).unwrap_or_default()
    }

    /// The configured source, or a low-reliability placeholder named after
    /// the id.
    pub fn resolve(&self, id: &str) -> SourceConfig {
        self.get(id).cloned().unwrap_or_else(|| SourceConfig {
            id: id.to_string(),
            name: id.to_string(),
            url: None,
            reliability: Reliability::Low,
        })
    }

    pub fn all(&self) -> Vec<&SourceConfig> {
        let mut sources: Vec<_> = self.sources.values().collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Title pre-filter for breaking-news scoring. Matching ignores case and
/// accents.
#[derive(Debug, Clone, Default)]
pub struct KeywordGate {
    keywords: Vec<(String, String)>,
}

impl KeywordGate {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| (k.as_ref().to_string(), normalize(k.as_ref())))
            .filter(|(_, folded)| !folded.is_empty())
            .collect();
        Self { keywords }
    }

    /// First keyword found in the title.
    pub fn matches(&self, title: &str) -> Option<&str> {
        let folded = normalize(title);
        self.keywords
            .iter()
            .find(|(_, keyword)| folded.contains(keyword.as_str()))
            .map(|(original, _)| original.as_str())
    }
}
