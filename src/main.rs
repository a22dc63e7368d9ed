//! FormCast - live analytics for form responses
//!
//! A CLI that loads a form and its stored responses, pushes new submissions
//! through the live aggregation pipeline, and writes the analytics report.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, unreadable data files, store failure, etc.)
//!   2 - At least one submission was rejected or failed

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod pipeline;
mod realtime;
mod report;
mod store;
mod validate;

use anyhow::{bail, Context, Result};
use cli::{Args, OutputFormat};
use config::Config;
use error::PipelineError;
use models::{Form, Response};
use pipeline::{Pipeline, PipelineConfig};
use realtime::{ChannelViewer, Hub, Viewer};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use store::MemoryStore;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load configuration before logging so it can raise verbosity
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(&args, &config);

    info!("FormCast v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .formcast.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  .formcast.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .formcast.toml")?;

    println!("✅ Created .formcast.toml with default settings.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load data, run the submissions and write the report. Returns exit code (0 or 2).
async fn run(args: Args, config: Config) -> Result<i32> {
    let Some(ref form_path) = args.form else {
        bail!("A form file is required (--form)");
    };
    let form = load_form(form_path)?;
    println!("📋 Form: {} ({} fields)", form.id, form.fields.len());

    // Seed the store
    let store = Arc::new(MemoryStore::new());
    store.insert_form(form.clone()).await;
    if let Some(ref responses_path) = args.responses {
        let responses = load_responses(responses_path, &form.id)?;
        let seeded = store.seed_responses(responses).await;
        debug!("Seeded {} responses", seeded);
    }
    println!(
        "📥 Stored responses: {}",
        store.response_count(&form.id).await
    );

    let hub = Arc::new(Hub::new());
    let pipeline = Pipeline::new(store.clone(), hub, PipelineConfig::from(&config.pipeline));

    // Live viewer printing every update it receives
    let watcher = if args.watch {
        let (viewer, mut updates) = ChannelViewer::channel(config.hub.viewer_buffer);
        let viewer_id = viewer.id();
        pipeline.subscribe(&form.id, viewer);

        let task = tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                println!("   📡 Live update: {}", report::summarize_update(&update));
            }
        });
        Some((viewer_id, task))
    } else {
        None
    };

    let mut failures = 0;
    for path in &args.submit {
        let answers = load_answers(path)?;
        match pipeline.submit(&form.id, &answers).await {
            Ok(submission) => {
                println!(
                    "✅ Accepted response {} from {} ({} live viewers updated)",
                    submission.response.id,
                    path.display(),
                    submission.fanout.delivered
                );
                if let Err(e) = submission.report {
                    println!("   ⚠️  Live analytics unavailable: {}", e);
                }
            }
            Err(PipelineError::Rejected(rejection)) => {
                failures += 1;
                eprintln!("❌ Rejected {}:", path.display());
                for issue in &rejection.errors {
                    eprintln!("   - {}: {}", issue.field_id, issue.message);
                }
            }
            Err(e) => {
                failures += 1;
                error!("Submission from {} failed: {}", path.display(), e);
                eprintln!("❌ Submission {} failed: {}", path.display(), e);
            }
        }
    }

    // Disconnect the watcher; its task ends once the queue drains.
    if let Some((viewer_id, task)) = watcher {
        pipeline.unsubscribe(&form.id, viewer_id);
        if let Err(e) = task.await {
            warn!("Live viewer task ended abnormally: {}", e);
        }
    }

    println!("\n📝 Generating report...");
    let analytics = pipeline
        .analytics(&form.id)
        .await
        .context("Failed to compute analytics")?;

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&analytics)?,
        OutputFormat::Markdown => report::generate_markdown_report(&form, &analytics),
    };

    if config.general.output == "-" {
        println!("{}", output);
    } else {
        std::fs::write(&config.general.output, &output)
            .with_context(|| format!("Failed to write report to {}", config.general.output))?;
        println!("✅ Report saved to: {}", config.general.output);
    }

    println!("\n📊 Summary:");
    println!("   Total responses: {}", analytics.total_responses);
    println!("   Submitted: {} | Failed: {}", args.submit.len() - failures, failures);

    if failures > 0 {
        return Ok(2);
    }
    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Ignoring invalid .formcast.toml: {:#}", e);
            Ok(Config::default())
        }
    }
}

/// Read a form schema.
fn load_form(path: &Path) -> Result<Form> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read form file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse form file: {}", path.display()))
}

/// Read stored responses, keeping only those that belong to `form_id`.
fn load_responses(path: &Path, form_id: &str) -> Result<Vec<Response>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read responses file: {}", path.display()))?;
    let responses: Vec<Response> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse responses file: {}", path.display()))?;

    let total = responses.len();
    let matching: Vec<Response> = responses
        .into_iter()
        .filter(|r| r.form_id == form_id)
        .collect();
    if matching.len() < total {
        warn!(
            "Skipped {} responses that belong to other forms",
            total - matching.len()
        );
    }

    Ok(matching)
}

/// Read one submission's raw answers.
fn load_answers(path: &Path) -> Result<Map<String, Value>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read submission file: {}", path.display()))?;
    let value: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse submission file: {}", path.display()))?;

    // Accept either a bare answers object or the `{"answers": {...}}` request body.
    match value {
        Value::Object(mut object) => match object.remove("answers") {
            Some(Value::Object(answers)) => Ok(answers),
            Some(other) => {
                object.insert("answers".to_string(), other);
                Ok(object)
            }
            None => Ok(object),
        },
        _ => bail!("Submission file must hold a JSON object: {}", path.display()),
    }
}
