use std::sync::Arc;

use nt_core::{ContentStore, InferenceModel};
use nt_pipeline::{Ingestor, PipelineConfig, Processor, SourceDirectory};

pub struct AppState {
    pub processor: Arc<Processor>,
    pub ingestor: Arc<Ingestor>,
}

impl AppState {
    pub fn new(store: Arc<dyn ContentStore>, model: Arc<dyn InferenceModel>, config: &PipelineConfig) -> Self {
        Self {
            processor: Arc::new(Processor::new(store.clone(), model, config)),
            ingestor: Arc::new(Ingestor::new(store, config.dedup.content_prefix_chars)),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        self.processor.store()
    }

    pub fn sources(&self) -> &SourceDirectory {
        self.processor.sources()
    }
}
