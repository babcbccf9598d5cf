//! CLI for the UPQ upload queue.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use upq_core::config::{self, UploadConfig};

use commands::{run_check, run_config, run_send};

/// Top-level CLI for the UPQ upload queue.
#[derive(Debug, Parser)]
#[command(name = "upq")]
#[command(about = "UPQ: batch file uploads with a concurrency cap", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Validate and upload files to the configured endpoint.
    Send {
        /// Files to upload, in queue order.
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        #[command(flatten)]
        overrides: SendOverrides,

        #[command(flatten)]
        rules: RuleOverrides,

        /// How each request body is built.
        #[arg(long, value_enum, default_value_t = BodyFormat::Raw)]
        format: BodyFormat,
    },

    /// Run the file checks only; nothing is uploaded.
    Check {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        #[command(flatten)]
        rules: RuleOverrides,
    },

    /// Show the config file path and the effective configuration.
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BodyFormat {
    /// File bytes as the request body.
    Raw,
    /// A JSON object with the file's name and size.
    JsonMetadata,
}

/// Transport settings that override the config file for one run.
#[derive(Debug, Default, Args)]
pub struct SendOverrides {
    /// Upload endpoint URL.
    #[arg(long)]
    pub url: Option<String>,
    /// Maximum simultaneous uploads.
    #[arg(long, value_name = "N")]
    pub max_concurrent: Option<usize>,
    /// Content-Type header for each request.
    #[arg(long)]
    pub content_type: Option<String>,
    /// HTTP method (POST, PUT, ...).
    #[arg(long)]
    pub method: Option<String>,
}

impl SendOverrides {
    pub fn apply(&self, cfg: &mut UploadConfig) {
        if let Some(url) = &self.url {
            cfg.url = Some(url.clone());
        }
        if let Some(n) = self.max_concurrent {
            cfg.max_concurrent = n;
        }
        if let Some(ct) = &self.content_type {
            cfg.content_type = ct.clone();
        }
        if let Some(method) = &self.method {
            cfg.method = method.clone();
        }
    }
}

/// File check settings that override the config file for one run.
#[derive(Debug, Default, Args)]
pub struct RuleOverrides {
    /// Comma-separated allowed extensions, e.g. "jpg,png". Use "no-ext" for files without one.
    #[arg(long, value_name = "LIST")]
    pub extensions: Option<String>,
    /// Largest accepted file size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<u64>,
    /// Smallest accepted file size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,
}

impl RuleOverrides {
    pub fn apply(&self, cfg: &mut UploadConfig) {
        if let Some(ext) = &self.extensions {
            cfg.extensions = Some(ext.clone());
        }
        if self.max_size.is_some() {
            cfg.max_file_size = self.max_size;
        }
        if self.min_size.is_some() {
            cfg.min_file_size = self.min_size;
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let mut cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Send {
                files,
                overrides,
                rules,
                format,
            } => {
                overrides.apply(&mut cfg);
                rules.apply(&mut cfg);
                run_send(&cfg, &files, format).await?;
            }
            CliCommand::Check { files, rules } => {
                rules.apply(&mut cfg);
                run_check(&cfg, &files)?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
