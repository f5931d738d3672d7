//! CLI for the render-core job-orchestration engine.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use render_core::config::RenderConfig;
use render_core::queue::JobDb;
use std::path::PathBuf;

/// Top-level CLI for the render-core job-orchestration engine.
#[derive(Debug, Parser)]
#[command(name = "render-core")]
#[command(about = "render-core: GPU subtitle-render job orchestration", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run the Job Coordinator loop, leasing and rendering queued jobs until interrupted.
    Serve,

    /// Submit a job against the durable queue for a `serve` instance to pick up.
    Submit {
        /// Direct or object-store URL of the source video.
        #[arg(long)]
        video_url: String,
        /// URL the Callback Emitter posts lifecycle events to.
        #[arg(long)]
        callback_url: String,
        /// Job identifier. Generated (UUID v4) if omitted.
        #[arg(long)]
        job_id: Option<String>,
        /// Path to a JSON file with a `{"cues": [...]}` scenario. Defaults to an empty scenario.
        #[arg(long, value_name = "PATH")]
        scenario: Option<PathBuf>,
        #[arg(long, default_value_t = 1920)]
        width: u32,
        #[arg(long, default_value_t = 1080)]
        height: u32,
        #[arg(long, default_value_t = 30.0)]
        fps: f64,
        #[arg(long, default_value_t = 80)]
        quality: u8,
    },

    /// Show one job's status (Progress Store if reachable, else the durable queue).
    Status {
        /// Job identifier.
        job_id: String,
    },

    /// Request cancellation of a queued or in-flight job.
    Cancel {
        /// Job identifier.
        job_id: String,
    },

    /// Summarize the durable queue by status.
    QueueStatus,

    /// Configuration subcommands.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Emit a shell completion script.
    Completions {
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the fully-resolved configuration as TOML.
    Show,
}

impl CliCommand {
    pub async fn run_from_args(config: RenderConfig) -> Result<i32> {
        let cli = Cli::parse();
        tracing::debug!("loaded config: {:?}", config);

        match cli.command {
            CliCommand::Serve => {
                let db = JobDb::open_default().await.context("opening job queue")?;
                let interrupted = commands::run_serve(db, config).await?;
                Ok(if interrupted { 130 } else { 0 })
            }
            CliCommand::Submit {
                video_url,
                callback_url,
                job_id,
                scenario,
                width,
                height,
                fps,
                quality,
            } => {
                let db = JobDb::open_default().await.context("opening job queue")?;
                commands::run_submit(
                    &db,
                    job_id,
                    video_url,
                    callback_url,
                    width,
                    height,
                    fps,
                    quality,
                    scenario,
                )
                .await?;
                Ok(0)
            }
            CliCommand::Status { job_id } => {
                let db = JobDb::open_default().await.context("opening job queue")?;
                commands::run_status(&db, &config, &job_id).await?;
                Ok(0)
            }
            CliCommand::Cancel { job_id } => {
                let db = JobDb::open_default().await.context("opening job queue")?;
                commands::run_cancel(&db, &job_id).await?;
                Ok(0)
            }
            CliCommand::QueueStatus => {
                let db = JobDb::open_default().await.context("opening job queue")?;
                commands::run_queue_status(&db).await?;
                Ok(0)
            }
            CliCommand::Config { command } => {
                match command {
                    ConfigCommand::Show => commands::run_config_show(&config)?,
                }
                Ok(0)
            }
            CliCommand::Completions { shell } => {
                commands::run_completions(shell)?;
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests;
