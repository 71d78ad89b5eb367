use std::sync::Arc;

use nt_core::{Error, InferenceModel, Result};

use crate::Config;

pub mod deepseek;
pub mod dummy;

pub use deepseek::DeepSeekModel;
pub use dummy::DummyModel;

pub fn available_models() -> Vec<&'static str> {
    vec!["dummy", "deepseek"]
}

/// Build the model named by `config.model`. Without a config the offline
/// dummy model is used.
pub async fn create_model(config: Option<Config>) -> Result<Arc<dyn InferenceModel>> {
    let config = config.unwrap_or_default();
    match config.model.to_ascii_lowercase().as_str() {
        "dummy" => Ok(Arc::new(DummyModel::new())),
        "deepseek" => {
            let mut model = DeepSeekModel::new(config.api_key)?;
            if let Some(url) = config.model_url {
                model = model.with_base_url(url);
            }
            if let Some(name) = config.model_name {
                model = model.with_model_name(name);
            }
            tracing::info!(model = ?model, "Using DeepSeek inference model");
            Ok(Arc::new(model))
        }
        other => Err(Error::Inference(format!(
            "Unknown model: {}. Available models: {}",
            other,
            available_models().join(", ")
        ))),
    }
}
