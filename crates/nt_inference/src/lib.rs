use std::time::Duration;

pub mod classifier;
pub mod models;
pub mod prompts;
pub mod responses;

/// Model selection and connection settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// `dummy` or `deepseek`.
    pub model: String,
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub model_url: Option<String>,
    pub timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "dummy".to_string(),
            api_key: None,
            model_name: None,
            model_url: None,
            timeout: classifier::DEFAULT_TIMEOUT,
        }
    }
}

pub mod prelude {
    pub use super::classifier::Classifier;
    pub use super::models::create_model;
    pub use super::prompts::{ArticleDigest, SynthesisSource};
    pub use super::responses::{
        BreakingAssessment, CategoryAssessment, DuplicateJudgment, RewriteDraft, SynthesisDraft,
    };
    pub use super::Config;
    pub use nt_core::{Error, Result};
}

pub use classifier::Classifier;
pub use models::create_model;
