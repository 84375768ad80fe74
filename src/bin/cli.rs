// Tatakai Offline - Offline episode downloads for the Tatakai client
// Copyright (C) 2025 Tatakai contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tatakai_offline::download::{DownloadManager, EnqueueRequest, JobStatus, ManagerDeps};
use tatakai_offline::storage::Database;
use tatakai_offline::DownloadConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tatakai-dl")]
#[command(about = "Tatakai offline downloads - desktop tool", long_about = None)]
struct Cli {
    /// Data directory holding the library and queue database (default: platform data dir)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Queue an episode and download it
    Download {
        anime_id: String,
        season: u32,
        episode: u32,
        /// M3U8 playlist or direct media URL
        url: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        poster: Option<String>,
        #[arg(long)]
        referer: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
        /// Extra request header, KEY=VALUE
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
    /// Continue queued downloads from a previous run
    Resume,
    /// Print the download queue as JSON
    Queue,
    /// Print downloaded episodes as JSON
    Library,
    /// Re-queue a failed download and run it
    Retry { id: String },
    /// Remove a job from the queue
    Cancel { id: String },
    /// Delete a downloaded episode
    Delete {
        anime_id: String,
        season: u32,
        episode: u32,
    },
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.trim().is_empty() {
        return Err("header name is empty".to_string());
    }
    Ok((key.trim().to_string(), value.trim().to_string()))
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("tatakai_offline=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tatakai_offline=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<DownloadConfig> {
    let mut config = match &cli.config {
        Some(path) => DownloadConfig::load(path)?,
        None => DownloadConfig::default(),
    };
    match &cli.root {
        Some(root) => config.root_dir = root.clone(),
        None if cli.config.is_none() => {
            if let Some(dir) = Database::get_default_path().parent() {
                config.root_dir = dir.to_path_buf();
            }
        }
        None => {}
    }
    config.validate()?;
    Ok(config)
}

async fn open_manager(config: DownloadConfig) -> Result<DownloadManager> {
    std::fs::create_dir_all(&config.root_dir)
        .with_context(|| format!("creating {}", config.root_dir.display()))?;

    let db_path = config.root_dir.join("offline.db");
    let db = Database::new(&db_path)
        .await
        .with_context(|| format!("opening {}", db_path.display()))?;

    let deps = ManagerDeps::desktop(db, &config)?;
    Ok(DownloadManager::new(deps, config).await?)
}

/// Print progress until the queue is idle; Ctrl-C cancels the active job
async fn run_until_idle(manager: &DownloadManager) -> Result<()> {
    let mut updates = manager.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = String::new();
        while let Ok(queue) = updates.recv().await {
            for job in queue.iter().filter(|j| j.status == JobStatus::Downloading) {
                let line = format!(
                    "{} {:>3}% {} {}",
                    job.id,
                    job.progress,
                    job.speed.as_deref().unwrap_or(""),
                    job.eta.as_deref().unwrap_or("")
                );
                if line != last {
                    println!("{}", line.trim_end());
                    last = line;
                }
            }
        }
    });

    loop {
        tokio::select! {
            _ = manager.wait_idle() => break,
            signal = tokio::signal::ctrl_c() => {
                signal.context("listening for Ctrl-C")?;
                match manager.cancel_active().await? {
                    Some(id) => warn!(job_id = %id, "Cancelled by user"),
                    None => break,
                }
            }
        }
    }

    printer.abort();
    Ok(())
}

fn report(queue: &[tatakai_offline::DownloadJob]) {
    for job in queue {
        match job.status {
            JobStatus::Failed => println!("{} failed: {}", job.id, job.error.as_deref().unwrap_or("unknown error")),
            status => println!("{} {}", job.id, status),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let manager = open_manager(config).await?;

    match cli.command {
        Commands::Download {
            anime_id,
            season,
            episode,
            url,
            title,
            poster,
            referer,
            user_agent,
            headers,
        } => {
            let mut request_headers: std::collections::HashMap<String, String> = headers.into_iter().collect();
            if let Some(referer) = referer {
                request_headers.insert("Referer".to_string(), referer);
            }
            if let Some(user_agent) = user_agent {
                request_headers.insert("User-Agent".to_string(), user_agent);
            }

            let id = manager
                .enqueue(EnqueueRequest {
                    anime_title: title.unwrap_or_else(|| anime_id.clone()),
                    anime_id,
                    season,
                    episode,
                    video_url: url,
                    poster,
                    headers: request_headers,
                })
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            info!(job_id = %id, "Queued");

            run_until_idle(&manager).await?;
            report(&manager.queue().await);
        }
        Commands::Resume => {
            if !manager.resume_pending().await {
                println!("Nothing to resume");
                return Ok(());
            }
            run_until_idle(&manager).await?;
            report(&manager.queue().await);
        }
        Commands::Queue => {
            println!("{}", serde_json::to_string_pretty(&manager.queue().await)?);
        }
        Commands::Library => {
            let episodes = manager.library().list().await?;
            println!("{}", serde_json::to_string_pretty(&episodes)?);
        }
        Commands::Retry { id } => {
            manager.retry(&id).await?;
            run_until_idle(&manager).await?;
            report(&manager.queue().await);
        }
        Commands::Cancel { id } => {
            if manager.job(&id).await.is_none() {
                bail!("No queued download with id {}", id);
            }
            manager.cancel(&id).await?;
            println!("Removed {}", id);
        }
        Commands::Delete {
            anime_id,
            season,
            episode,
        } => {
            manager.delete_episode(&anime_id, season, episode).await?;
            println!("Deleted {} S{}E{}", anime_id, season, episode);
        }
    }

    Ok(())
}
