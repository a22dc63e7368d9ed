//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// FormCast - live analytics for form responses
///
/// Loads a form schema and its stored responses, submits new responses
/// through the live pipeline, and writes the resulting analytics report.
///
/// Examples:
///   formcast --form survey.json --responses responses.json
///   formcast --form survey.json --submit answer1.json --submit answer2.json --watch
///   formcast --form survey.json --format json --output -
///   formcast --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Form schema file (JSON)
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub form: Option<PathBuf>,

    /// Stored responses to load before submitting (JSON array)
    #[arg(short, long, value_name = "FILE")]
    pub responses: Option<PathBuf>,

    /// Answers to submit through the pipeline (JSON object, repeatable)
    #[arg(short, long, value_name = "FILE")]
    pub submit: Vec<PathBuf>,

    /// Print every live update pushed to a watching viewer
    #[arg(short, long)]
    pub watch: bool,

    /// Output file for the final report (`-` for stdout)
    ///
    /// Default: from config or formcast_report.md
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .formcast.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Let submissions to the same form run concurrently
    ///
    /// Live viewers may then briefly see an older report after a newer one.
    #[arg(long)]
    pub no_serialize: bool,

    /// Updates buffered per live viewer before dropping
    #[arg(long, value_name = "COUNT", env = "FORMCAST_VIEWER_BUFFER")]
    pub viewer_buffer: Option<usize>,

    /// Generate a default .formcast.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.form {
            Some(ref form) if !form.is_file() => {
                return Err(format!("Form file does not exist: {}", form.display()));
            }
            None => return Err("A form file is required (--form)".to_string()),
            _ => {}
        }

        if let Some(ref responses) = self.responses {
            if !responses.is_file() {
                return Err(format!(
                    "Responses file does not exist: {}",
                    responses.display()
                ));
            }
        }

        if let Some(missing) = self.submit.iter().find(|p| !p.is_file()) {
            return Err(format!("Submission file does not exist: {}", missing.display()));
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.viewer_buffer == Some(0) {
            return Err("Viewer buffer must be at least 1".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
