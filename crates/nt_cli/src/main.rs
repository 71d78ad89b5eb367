use clap::Parser;
use nt_core::{ContentStore, Result};
use nt_inference::models::available_models;
use nt_pipeline::{Ingestor, JsonFileSource, PipelineConfig, Processor};
use nt_web::AppState;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Durations written like `90s`, `1h30m`, `500ms` or `1d`. A bare number is
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
struct HumanDuration(Duration);

impl FromStr for HumanDuration {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Duration must include a number".to_string());
        }

        let mut total = Duration::ZERO;
        let mut rest = s;
        while !rest.is_empty() {
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if digits == 0 {
                return Err(format!("Expected a number at '{}'", rest));
            }
            let value: u64 = rest[..digits]
                .parse()
                .map_err(|_| format!("Invalid number in duration: {}", &rest[..digits]))?;
            rest = &rest[digits..];

            let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let unit = rest[..unit_len].trim();
            total += match unit {
                "" | "s" => Duration::from_secs(value),
                "ms" => Duration::from_millis(value),
                "m" => Duration::from_secs(value * 60),
                "h" => Duration::from_secs(value * 3600),
                "d" => Duration::from_secs(value * 86400),
                other => return Err(format!("Invalid duration unit: {}", other)),
            };
            rest = &rest[unit_len..];
        }

        Ok(HumanDuration(total))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "News article processing pipeline", long_about = None)]
pub struct Cli {
    #[arg(long, default_value = "memory", help = "Content store: memory (default) or sqlite")]
    storage: String,
    #[arg(long, help = "Database path for the sqlite store")]
    backend_url: Option<String>,
    #[arg(long, default_value = "dummy", help = "Model to use for inference. Available models: dummy (default, offline), deepseek")]
    model: String,
    #[arg(long, help = "Base URL of an OpenAI-compatible endpoint")]
    model_url: Option<String>,
    #[arg(long)]
    model_name: Option<String>,
    #[arg(long, env = "NT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long, help = "Pipeline configuration JSON file")]
    config: Option<PathBuf>,
    #[arg(long, default_value = "info", help = "Log level, overridden by RUST_LOG")]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Ingest raw items from a JSON file
    Ingest {
        file: PathBuf,
        /// Source id for files holding a bare array of items
        #[arg(long)]
        source: Option<String>,
        /// Run the pipeline on every ingested article
        #[arg(long)]
        process: bool,
    },
    /// Run the pipeline for one raw article
    Process { id: Uuid },
    /// Process the backlog of unprocessed raw articles
    Sweep {
        #[arg(long, default_value_t = 50)]
        batch_size: usize,
        /// Pause between articles (e.g. 500ms, 2s)
        #[arg(long, default_value = "2s")]
        pace: HumanDuration,
        /// Run in periodic mode with the specified interval (e.g. 1h, 30m, 1h15m30s)
        #[arg(long)]
        interval: Option<HumanDuration>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: SocketAddr,
    },
    /// Print a processed article, or the raw article with that id
    Show { id: Uuid },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let storage: Arc<dyn ContentStore> =
        nt_storage::create_storage(cli.storage.as_str(), cli.backend_url.as_deref()).await?;
    info!("💾 Storage initialized successfully (using {})", cli.storage);
    if cli.storage == "memory" && !matches!(cli.command, Commands::Serve { .. } | Commands::Ingest { process: true, .. }) {
        warn!("Memory storage starts empty and is lost on exit; use --storage sqlite to keep articles between runs");
    }

    let inference_config = nt_inference::Config {
        model: cli.model.clone(),
        api_key: cli.api_key.clone(),
        model_name: cli.model_name.clone(),
        model_url: cli.model_url.clone(),
        timeout: config.capability_timeout(),
    };
    let model = nt_inference::create_model(Some(inference_config)).await?;
    info!(
        "🧠 Inference model initialized successfully (using {}, available: {})",
        model.name(),
        available_models().join(", ")
    );

    match cli.command {
        Commands::Ingest { file, source, process } => {
            let file_source = JsonFileSource::new(&file);
            let directory = config.source_directory();
            let mut source_ids = file_source.source_ids().await?;
            if source_ids.is_empty() {
                let id = source.ok_or_else(|| {
                    nt_core::Error::External(anyhow::anyhow!(
                        "{} holds a bare array of items, pass --source <id>",
                        file.display()
                    ))
                })?;
                source_ids.push(id);
            }
            let sources: Vec<_> = source_ids.iter().map(|id| directory.resolve(id)).collect();
            for source in sources.iter().filter(|s| directory.get(&s.id).is_none()) {
                warn!(source = %source.id, "Source not configured, treating it as low reliability");
            }

            let ingestor = Ingestor::new(storage.clone(), config.dedup.content_prefix_chars);
            let summary = ingestor.collect(&file_source, &sources).await?;
            info!("📥 Ingested {} new articles from {}", summary.created.len(), file.display());

            if process {
                let processor = Processor::new(storage.clone(), model.clone(), &config);
                let mut reports = Vec::with_capacity(summary.created.len());
                for id in &summary.created {
                    reports.push(processor.process(*id).await);
                }
                print_json(&json!({ "ingest": summary, "reports": reports }))?;
            } else {
                print_json(&summary)?;
            }
        }
        Commands::Process { id } => {
            let processor = Processor::new(storage.clone(), model.clone(), &config);
            let report = processor.process(id).await;
            print_json(&report)?;
            if !report.success {
                std::process::exit(1);
            }
        }
        Commands::Sweep { batch_size, pace, interval } => {
            let processor = Processor::new(storage.clone(), model.clone(), &config);
            match interval {
                Some(interval) => {
                    info!("Running in periodic mode with {}s interval", interval.0.as_secs());
                    loop {
                        match processor.sweep(batch_size, pace.0).await {
                            Ok(summary) => print_json(&summary)?,
                            Err(e) => eprintln!("Error during sweep: {}", e),
                        }
                        info!("Waiting {}s before next sweep", interval.0.as_secs());
                        tokio::time::sleep(interval.0).await;
                    }
                }
                None => print_json(&processor.sweep(batch_size, pace.0).await?)?,
            }
        }
        Commands::Serve { addr } => {
            let state = AppState::new(storage.clone(), model.clone(), &config);
            nt_web::serve(state, addr).await?;
        }
        Commands::Show { id } => {
            if let Some(article) = storage.get_processed(id).await? {
                print_json(&article)?;
            } else if let Some(raw) = storage.get_raw(id).await? {
                print_json(&raw)?;
            } else {
                return Err(nt_core::Error::not_found("article", id));
            }
        }
    }

    Ok(())
}
