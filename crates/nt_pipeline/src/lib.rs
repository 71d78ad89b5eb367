pub mod breaking;
pub mod clusters;
pub mod config;
pub mod dedup;
pub mod ingest;
pub mod orchestrator;
pub mod synthesis;

pub use breaking::BreakingNewsScorer;
pub use clusters::ClusterManager;
pub use config::{DedupConfig, KeywordGate, PipelineConfig, SourceDirectory};
pub use dedup::{Candidate, DuplicateDetector};
pub use ingest::{IngestSummary, Ingestor, JsonFileSource};
pub use orchestrator::{Outcome, ProcessingReport, Processor, SweepSummary};
pub use synthesis::{Synthesis, Synthesizer};

pub mod prelude {
    pub use super::{
        IngestSummary, Ingestor, JsonFileSource, Outcome, PipelineConfig, ProcessingReport, Processor,
        SweepSummary,
    };
    pub use nt_core::{Error, Result};
}
