//! Prompt builders, one per capability. Each prompt states the exact JSON
//! shape the matching decoder in [`crate::responses`] expects.

use chrono::{DateTime, Utc};
use nt_core::text::truncate_chars;
use nt_core::{Category, Reliability};
use serde::Serialize;
use uuid::Uuid;

const CONTENT_CHARS: usize = 4000;

/// Compact view of an article handed to the duplicate judge.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleDigest {
    pub id: Uuid,
    pub title: String,
    pub snippet: String,
    pub source: String,
    pub published_at: DateTime<Utc>,
}

/// One member of a cluster as handed to the synthesis step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisSource {
    pub source: String,
    pub reliability: Reliability,
    pub title: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
}

fn category_list() -> String {
    Category::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "[]".to_string())
}

pub fn categorize(title: &str, content: &str, source: &str) -> String {
    format!(
        "Classify this news article.\n\n\
         Source: {source}\nTitle: {title}\n\nContent:\n{content}\n\n\
         Allowed categories: {categories}.\n\
         Answer with JSON only:\n\
         {{\"mainCategory\": \"<category>\", \"secondaryCategories\": [\"<at most 2 categories>\"], \
         \"confidence\": <0..1>, \"reasoning\": \"<one sentence>\"}}",
        source = source,
        title = title,
        content = truncate_chars(content, CONTENT_CHARS),
        categories = category_list(),
    )
}

pub fn extract_entities(content: &str) -> String {
    format!(
        "Extract the named entities of this news article.\n\nContent:\n{}\n\n\
         Answer with JSON only:\n\
         {{\"people\": [], \"organizations\": [], \"locations\": [], \"keywords\": []}}",
        truncate_chars(content, CONTENT_CHARS)
    )
}

pub fn rewrite(title: &str, content: &str, source: &str, category: Category) -> String {
    format!(
        "Rewrite this {category} article from {source} for our readers, in the language of the original. \
         Keep every fact, add none.\n\nTitle: {title}\n\nContent:\n{content}\n\n\
         Answer with JSON only:\n\
         {{\"title\": \"<optimized title>\", \"shortVersion\": \"<about 280 characters>\", \
         \"mediumVersion\": \"<about 800 characters>\", \"longVersion\": \"<full rewrite>\", \
         \"keyQuotes\": [], \"suggestedTags\": []}}",
        category = category,
        source = source,
        title = title,
        content = truncate_chars(content, CONTENT_CHARS),
    )
}

pub fn judge_duplicates(article: &ArticleDigest, candidates: &[ArticleDigest]) -> String {
    format!(
        "Decide whether the new article reports the same event as any of the candidates.\n\n\
         New article:\n{article}\n\nCandidates:\n{candidates}\n\n\
         Recommendation meanings: SKIP = same story with nothing new, \
         MERGE = same event with complementary details, UPDATE = same event with newer facts, \
         SEPARATE = different event.\n\
         Answer with JSON only:\n\
         {{\"isDuplicate\": <bool>, \"similarityScore\": <0..1>, \"matchingArticleIds\": [\"<candidate id>\"], \
         \"recommendation\": \"SKIP|MERGE|UPDATE|SEPARATE\", \"confidence\": <0..1>, \"reasoning\": \"<one sentence>\"}}",
        article = to_json(article),
        candidates = to_json(&candidates),
    )
}

pub fn synthesize(sources: &[SynthesisSource]) -> String {
    format!(
        "Write one article from these {count} reports of the same event. \
         Sources are ordered from most to least reliable; when facts conflict, prefer the more reliable source \
         and record the conflict.\n\nReports:\n{reports}\n\n\
         Answer with JSON only:\n\
         {{\"title\": \"\", \"shortVersion\": \"\", \"mediumVersion\": \"\", \"longVersion\": \"\", \
         \"sourceAnalysis\": [{{\"source\": \"\", \"reliability\": \"high|medium|low\", \"keyFacts\": [], \"uniqueInformation\": []}}], \
         \"factualConsensus\": <0..1>, \
         \"contradictions\": [{{\"topic\": \"\", \"claims\": [{{\"source\": \"\", \"value\": \"\"}}], \"resolution\": \"\"}}], \
         \"confidence\": <0..1>}}",
        count = sources.len(),
        reports = to_json(&sources),
    )
}

pub fn score_breaking_news(title: &str, content: &str, category: Category, published_at: DateTime<Utc>) -> String {
    format!(
        "Assess whether this {category} article is breaking news that deserves a push notification.\n\n\
         Published: {published}\nTitle: {title}\n\nContent:\n{content}\n\n\
         Answer with JSON only:\n\
         {{\"isBreakingNews\": <bool>, \"urgencyLevel\": \"CRITICAL|HIGH|NORMAL|LOW\", \
         \"notificationTitle\": \"\", \"notificationBody\": \"\", \"targetAudience\": \"\", \"confidence\": <0..1>}}",
        category = category,
        published = published_at.to_rfc3339(),
        title = title,
        content = truncate_chars(content, 1500),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_prompt_lists_categories() {
        let prompt = categorize("Titre", "Contenu", "L'Union");
        assert!(prompt.contains("politics, economy, society"));
        assert!(prompt.contains("\"mainCategory\""));
        assert!(prompt.contains("Source: L'Union"));
    }

    #[test]
    fn test_judge_prompt_embeds_candidate_ids() {
        let digest = |title: &str| ArticleDigest {
            id: Uuid::new_v4(),
            title: title.to_string(),
            snippet: "snippet".to_string(),
            source: "Gabonactu".to_string(),
            published_at: Utc::now(),
        };
        let article = digest("Nouveau");
        let candidates = vec![digest("Ancien")];
        let prompt = judge_duplicates(&article, &candidates);
        assert!(prompt.contains(&candidates[0].id.to_string()));
        assert!(prompt.contains("\"publishedAt\""));
    }

    #[test]
    fn test_synthesis_prompt_keeps_order() {
        let source = |name: &str, reliability| SynthesisSource {
            source: name.to_string(),
            reliability,
            title: "t".to_string(),
            content: "c".to_string(),
            published_at: Utc::now(),
        };
        let prompt = synthesize(&[source("L'Union", Reliability::High), source("Blog", Reliability::Low)]);
        let first = prompt.find("L'Union").unwrap();
        let second = prompt.find("Blog").unwrap();
        assert!(first < second);
        assert!(prompt.contains("\"high\""));
    }
}
