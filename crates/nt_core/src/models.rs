use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// The capability being asked of the model. Implementations may route
/// tasks to different endpoints or settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Categorize,
    ExtractEntities,
    Rewrite,
    JudgeDuplicates,
    Synthesize,
    ScoreBreakingNews,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Task::Categorize => "categorize",
            Task::ExtractEntities => "extract_entities",
            Task::Rewrite => "rewrite",
            Task::JudgeDuplicates => "judge_duplicates",
            Task::Synthesize => "synthesize",
            Task::ScoreBreakingNews => "score_breaking_news",
        };
        f.write_str(label)
    }
}

#[async_trait]
pub trait InferenceModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Send a prompt and return the raw text answer. The answer is expected
    /// to contain a JSON object but is not validated here.
    async fn complete(&self, task: Task, prompt: &str) -> Result<String>;
}
