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


//! Offline download queue
//!
//! # Queue Semantics
//! - Jobs are kept in insertion order and processed one at a time by a
//!   single worker task; at most one job is `downloading` at any instant
//! - Every status change is persisted (whole queue as one JSON blob) and
//!   broadcast; progress ticks are broadcast only
//! - A failed job stays visible with its error until retried or cancelled
//! - A cancelled job is removed, never marked failed
//!
//! # Restart Recovery
//! On construction the persisted queue is cleaned: completed jobs are
//! dropped and any job left `downloading` goes back to `queued` with
//! progress 0. There is no partial resume; a job always restarts from the
//! first byte or segment. Restored jobs start only on
//! [`DownloadManager::resume_pending`] or the next enqueue/retry.
//!
//! # Usage Example
//! ```no_run
//! use tatakai_offline::config::DownloadConfig;
//! use tatakai_offline::download::{DownloadManager, EnqueueRequest, ManagerDeps};
//! use tatakai_offline::storage::Database;
//!
//! # async fn example() -> tatakai_offline::Result<()> {
//! let config = DownloadConfig::with_root("/data/app");
//! let db = Database::new("/data/app/offline.db").await?;
//! let manager = DownloadManager::new(ManagerDeps::desktop(db, &config)?, config).await?;
//!
//! let mut updates = manager.subscribe();
//! manager
//!     .enqueue(EnqueueRequest {
//!         anime_id: "frieren".into(),
//!         anime_title: "Frieren".into(),
//!         season: 1,
//!         episode: 3,
//!         video_url: "https://cdn.example/frieren/3/master.m3u8".into(),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! while let Ok(queue) = updates.recv().await {
//!     if queue.iter().all(|j| !j.status.is_pending()) {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::DownloadConfig;
use crate::download::events::{QueueEvents, QueueSnapshot};
use crate::download::fetcher::{HttpFetcher, ReqwestFetcher};
use crate::download::job::{DownloadJob, DownloadSource, EnqueueRequest, JobId, JobStatus};
use crate::download::library::{OfflineEpisode, OfflineLibrary};
use crate::download::progress::ProgressUpdate;
use crate::download::session::BackgroundSessionKeeper;
use crate::download::stream::{JobStream, ProgressSink};
use crate::error::{OfflineError, Result};
use crate::platform::{
    BulkTransfer, FileSystem, ForegroundService, HeadlessPlatform, HttpBulkTransfer, KeepAwake,
    LocalFileSystem,
};
use crate::storage::{Database, KeyValueStore};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Collaborators injected into the manager
#[derive(Clone)]
pub struct ManagerDeps {
    pub store: Arc<dyn KeyValueStore>,
    pub fs: Arc<dyn FileSystem>,
    pub fetcher: Arc<dyn HttpFetcher>,
    pub transfer: Arc<dyn BulkTransfer>,
    pub keep_awake: Arc<dyn KeepAwake>,
    pub notifications: Arc<dyn ForegroundService>,
}

impl ManagerDeps {
    /// Local disk, reqwest and log-only session services
    pub fn desktop(db: Database, config: &DownloadConfig) -> Result<Self> {
        let headless = Arc::new(HeadlessPlatform);

        Ok(Self {
            store: Arc::new(db),
            fs: Arc::new(LocalFileSystem::new(config.root_dir.clone())),
            fetcher: Arc::new(ReqwestFetcher::new(
                config.request_timeout(),
                config.default_user_agent.clone(),
            )?),
            transfer: Arc::new(HttpBulkTransfer::new(
                config.request_timeout(),
                config.default_user_agent.clone(),
            )?),
            keep_awake: headless.clone(),
            notifications: headless,
        })
    }
}

/// The job currently owned by the worker
struct ActiveJob {
    id: JobId,
    /// Distinguishes this run from a later one for the same episode
    run: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    jobs: Vec<DownloadJob>,
    active: Option<ActiveJob>,
    next_run: u64,
    worker_running: bool,
}

impl QueueState {
    fn position(&self, id: &str) -> Option<usize> {
        self.jobs.iter().position(|j| j.id == id)
    }

    /// Position of the job still owned by worker run `run`
    ///
    /// `None` once the job was cancelled, even if the same episode has been
    /// queued again since.
    fn owned_position(&self, id: &str, run: u64) -> Option<usize> {
        self.active.as_ref().filter(|a| a.id == id && a.run == run)?;
        self.jobs
            .iter()
            .position(|j| j.id == id && j.status == JobStatus::Downloading)
    }

    fn has_queued(&self) -> bool {
        self.jobs.iter().any(|j| j.status == JobStatus::Queued)
    }
}

struct Inner {
    config: DownloadConfig,
    store: Arc<dyn KeyValueStore>,
    fs: Arc<dyn FileSystem>,
    fetcher: Arc<dyn HttpFetcher>,
    transfer: Arc<dyn BulkTransfer>,
    library: OfflineLibrary,
    session: BackgroundSessionKeeper,
    events: QueueEvents,
    state: Mutex<QueueState>,
    busy: watch::Sender<bool>,
}

/// Download queue service; cheap to clone, all clones share one queue
///
/// Constructing the manager restores the persisted queue but does not start
/// the worker. Jobs restored as `queued` wait until the host calls
/// [`resume_pending`](Self::resume_pending) (typically once the app is ready
/// to show the foreground notification) or until the next
/// [`enqueue`](Self::enqueue) / [`retry`](Self::retry) starts the worker.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

impl DownloadManager {
    /// Build the manager and restore the persisted queue
    ///
    /// Does not start downloading; call [`resume_pending`](Self::resume_pending).
    pub async fn new(deps: ManagerDeps, config: DownloadConfig) -> Result<Self> {
        config.validate()?;

        let library = OfflineLibrary::new(
            deps.fs.clone(),
            config.library_dir_name.clone(),
            config.max_id_len,
        );
        let session = BackgroundSessionKeeper::new(deps.keep_awake.clone(), deps.notifications.clone());
        let (busy, _) = watch::channel(false);

        let inner = Inner {
            store: deps.store,
            fs: deps.fs,
            fetcher: deps.fetcher,
            transfer: deps.transfer,
            library,
            session,
            events: QueueEvents::new(),
            state: Mutex::new(QueueState::default()),
            busy,
            config,
        };

        let jobs = inner.load_queue().await?;
        {
            let mut state = inner.state.lock().await;
            state.jobs = jobs;
            inner.persist(&state.jobs).await?;
        }

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Add an episode to the end of the queue
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<JobId> {
        if request.video_url.trim().is_empty() {
            return Err(OfflineError::InvalidUrl("empty video URL".to_string()));
        }

        let id = request.job_id();
        let mut state = self.inner.state.lock().await;

        if let Some(existing) = state.jobs.iter().find(|j| j.id == id) {
            return Err(match existing.status {
                JobStatus::Completed => OfflineError::AlreadyDownloaded(id),
                _ => OfflineError::AlreadyQueued(id),
            });
        }
        if self
            .inner
            .library
            .is_downloaded(&request.anime_id, request.season, request.episode)
            .await
        {
            return Err(OfflineError::AlreadyDownloaded(id));
        }

        let source = DownloadSource {
            url: request.video_url.clone(),
            headers: request.headers.clone(),
        };
        self.inner
            .store
            .set(&self.inner.config.source_key(&id), &serde_json::to_string(&source)?)
            .await?;

        state.jobs.push(DownloadJob::new(&request));
        self.inner.commit(&state).await?;
        info!(job_id = %id, "Download queued");

        self.kick(&mut state);
        Ok(id)
    }

    /// Remove a job, aborting it first if it is downloading
    ///
    /// Unknown ids are ignored.
    pub async fn cancel(&self, id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;

        if state.active.as_ref().is_some_and(|a| a.id == id) {
            if let Some(active) = state.active.take() {
                active.token.cancel();
                info!(job_id = %id, "Cancelling active download");
            }
        }

        let removed = match state.position(id) {
            Some(pos) => {
                state.jobs.remove(pos);
                true
            }
            None => false,
        };
        self.inner.store.remove(&self.inner.config.source_key(id)).await?;

        if removed {
            self.inner.commit(&state).await?;
            info!(job_id = %id, "Download removed");
        } else {
            debug!(job_id = %id, "Cancel for unknown job ignored");
        }
        Ok(())
    }

    /// Cancel whatever is downloading right now; returns its id
    pub async fn cancel_active(&self) -> Result<Option<JobId>> {
        let active = {
            let state = self.inner.state.lock().await;
            state.active.as_ref().map(|a| a.id.clone())
        };

        match active {
            Some(id) => {
                self.cancel(&id).await?;
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Re-queue a failed job from the beginning
    pub async fn retry(&self, id: &str) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        let pos = state
            .position(id)
            .ok_or_else(|| OfflineError::JobNotFound(id.to_string()))?;

        let job = &mut state.jobs[pos];
        if job.status != JobStatus::Failed {
            return Err(OfflineError::InvalidTransition {
                id: id.to_string(),
                from: job.status.to_string(),
                to: JobStatus::Queued.to_string(),
            });
        }
        job.transition(JobStatus::Queued)?;

        self.inner.commit(&state).await?;
        info!(job_id = %id, "Download re-queued");

        self.kick(&mut state);
        Ok(())
    }

    /// Full queue in insertion order
    pub async fn queue(&self) -> QueueSnapshot {
        self.inner.state.lock().await.jobs.clone()
    }

    /// Queued and downloading jobs
    pub async fn active(&self) -> Vec<DownloadJob> {
        let state = self.inner.state.lock().await;
        state.jobs.iter().filter(|j| j.status.is_pending()).cloned().collect()
    }

    pub async fn job(&self, id: &str) -> Option<DownloadJob> {
        let state = self.inner.state.lock().await;
        state.jobs.iter().find(|j| j.id == id).cloned()
    }

    /// Receive a queue snapshot after every change
    pub fn subscribe(&self) -> broadcast::Receiver<QueueSnapshot> {
        self.inner.events.subscribe()
    }

    /// Start the worker if restored jobs are waiting; returns whether it did
    pub async fn resume_pending(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        if !state.has_queued() {
            return false;
        }
        self.kick(&mut state);
        true
    }

    /// Resolve once the worker has stopped with nothing pending
    pub async fn wait_idle(&self) {
        let mut busy = self.inner.busy.subscribe();
        // The sender lives in `inner`, so the channel cannot close here
        let _ = busy.wait_for(|running| !*running).await;
    }

    pub fn library(&self) -> &OfflineLibrary {
        &self.inner.library
    }

    /// Delete a downloaded episode and any queue entry for it
    pub async fn delete_episode(&self, anime_id: &str, season: u32, episode: u32) -> Result<()> {
        let id = crate::download::job::episode_job_id(anime_id, season, episode);
        self.cancel(&id).await?;
        self.inner.library.delete_episode(anime_id, season, episode).await
    }

    /// Spawn the worker unless it is already running
    fn kick(&self, state: &mut QueueState) {
        if state.worker_running || !state.has_queued() {
            return;
        }

        state.worker_running = true;
        self.inner.busy.send_replace(true);

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run_worker().await });
    }
}

impl Inner {
    async fn load_queue(&self) -> Result<Vec<DownloadJob>> {
        let Some(json) = self.store.get(&self.config.queue_key).await? else {
            return Ok(Vec::new());
        };

        let jobs: Vec<DownloadJob> = match serde_json::from_str(&json) {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "Persisted queue is unreadable, starting empty");
                return Ok(Vec::new());
            }
        };

        let mut restored = Vec::with_capacity(jobs.len());
        for mut job in jobs {
            match job.status {
                JobStatus::Completed => continue,
                JobStatus::Downloading => {
                    job.transition(JobStatus::Queued)?;
                    info!(job_id = %job.id, "Interrupted download re-queued");
                }
                JobStatus::Queued | JobStatus::Failed => {}
            }
            restored.push(job);
        }

        Ok(restored)
    }

    async fn persist(&self, jobs: &[DownloadJob]) -> Result<()> {
        let json = serde_json::to_string(jobs)?;
        self.store.set(&self.config.queue_key, &json).await
    }

    /// Persist and broadcast the current queue
    async fn commit(&self, state: &QueueState) -> Result<()> {
        self.persist(&state.jobs).await?;
        self.events.emit(state.jobs.clone());
        Ok(())
    }

    /// Same as [`commit`](Self::commit) but failures only get logged
    async fn commit_logged(&self, state: &QueueState) {
        if let Err(e) = self.commit(state).await {
            error!(error = %e, "Failed to persist download queue");
        }
    }

    async fn load_source(&self, id: &str) -> Result<DownloadSource> {
        let raw = self
            .store
            .get(&self.config.source_key(id))
            .await?
            .ok_or_else(|| OfflineError::MissingSource(id.to_string()))?;

        // Older entries hold the bare URL
        Ok(serde_json::from_str(&raw).unwrap_or(DownloadSource {
            url: raw,
            headers: Default::default(),
        }))
    }

    /// Take the first queued job and mark it downloading
    async fn claim_next(&self) -> Option<(DownloadJob, u64, CancellationToken)> {
        let mut state = self.state.lock().await;
        let pos = state.jobs.iter().position(|j| j.status == JobStatus::Queued)?;

        if let Err(e) = state.jobs[pos].transition(JobStatus::Downloading) {
            error!(error = %e, "Queued job could not start");
            return None;
        }

        let job = state.jobs[pos].clone();
        let token = CancellationToken::new();
        let run = state.next_run;
        state.next_run += 1;
        state.active = Some(ActiveJob {
            id: job.id.clone(),
            run,
            token: token.clone(),
        });
        self.commit_logged(&state).await;

        Some((job, run, token))
    }

    async fn run_worker(self: Arc<Self>) {
        debug!("Download worker started");

        loop {
            let Some((job, run, token)) = self.claim_next().await else {
                self.session.release_if_idle(false).await;

                let mut state = self.state.lock().await;
                if state.has_queued() {
                    continue;
                }
                state.worker_running = false;
                self.busy.send_replace(false);
                debug!("Download worker idle");
                return;
            };

            info!(job_id = %job.id, "Download started");
            let outcome = self.process(&job, &token).await;
            let more = self.finish(&job.id, run, outcome).await;

            if more {
                tokio::time::sleep(self.config.next_job_delay()).await;
            }
        }
    }

    /// Run one job to its video file and manifest
    async fn process(&self, job: &DownloadJob, token: &CancellationToken) -> Result<()> {
        let source = self.load_source(&job.id).await?;
        let label = job.label();
        self.session.activate(&label).await;

        let paths = self.library.paths(&job.anime_id, job.season, job.episode);
        let sink = JobProgress {
            inner: self,
            job_id: &job.id,
            label: &label,
        };

        let stream = JobStream {
            fetcher: self.fetcher.as_ref(),
            transfer: self.transfer.as_ref(),
            fs: self.fs.as_ref(),
            config: &self.config,
            source: &source,
            token,
            progress: &sink,
        };
        let bytes = match stream.run(&paths.video).await {
            Ok(_) if token.is_cancelled() => Err(OfflineError::Cancelled),
            other => other,
        };
        let bytes = match bytes {
            Err(e) if e.is_cancelled() => {
                // Partial video never reaches the library
                if let Err(de) = self.fs.delete_file(&paths.video).await {
                    debug!(job_id = %job.id, error = %de, "Could not remove partial video");
                }
                return Err(e);
            }
            other => other?,
        };

        let record = OfflineEpisode {
            anime_id: job.anime_id.clone(),
            anime_title: job.anime_title.clone(),
            season: job.season,
            episode: job.episode,
            poster: job.poster.clone(),
            video_path: paths.video,
            downloaded_at: Utc::now(),
        };
        self.library.write_manifest(&record).await?;

        debug!(job_id = %job.id, bytes, "Transfer finished");
        Ok(())
    }

    /// Record a job's outcome; returns whether more jobs are queued
    ///
    /// Only touches the job if run `run` still owns it.
    async fn finish(&self, id: &str, run: u64, outcome: Result<()>) -> bool {
        let mut state = self.state.lock().await;
        let pos = state.owned_position(id, run);
        if state.active.as_ref().is_some_and(|a| a.run == run) {
            state.active = None;
        }

        let source_key = self.config.source_key(id);

        match (outcome, pos) {
            (Ok(()), Some(pos)) => {
                match state.jobs[pos].transition(JobStatus::Completed) {
                    Ok(()) => info!(job_id = %id, "Download completed"),
                    Err(e) => error!(job_id = %id, error = %e, "Completed job in unexpected state"),
                }
                self.remove_source(&source_key).await;
            }
            (Err(e), Some(pos)) if e.is_cancelled() => {
                state.jobs.remove(pos);
                self.remove_source(&source_key).await;
                info!(job_id = %id, "Download cancelled");
            }
            (Err(e), Some(pos)) => {
                warn!(job_id = %id, error = %e, "Download failed");
                if let Err(te) = state.jobs[pos].fail(e.to_string()) {
                    error!(job_id = %id, error = %te, "Failed job in unexpected state");
                }
            }
            (_, None) => {
                // Removed while running; a re-queued job with this id is left alone
                debug!(job_id = %id, "Finished job no longer owned by this run");
                self.commit_logged(&state).await;
                return state.has_queued();
            }
        }

        self.commit_logged(&state).await;
        state.has_queued()
    }

    async fn remove_source(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            warn!(key, error = %e, "Failed to remove stored source");
        }
    }
}

/// Applies transfer progress to the running job
struct JobProgress<'a> {
    inner: &'a Inner,
    job_id: &'a str,
    label: &'a str,
}

#[async_trait]
impl<'a> ProgressSink for JobProgress<'a> {
    async fn report(&self, update: ProgressUpdate) {
        let progress = {
            let mut state = self.inner.state.lock().await;
            let Some(job) = state.jobs.iter_mut().find(|j| j.id == self.job_id) else {
                return;
            };
            if job.status != JobStatus::Downloading {
                return;
            }

            if let Some(percent) = update.percent {
                job.advance(percent);
            }
            if update.speed.is_some() {
                job.speed = update.speed;
                job.eta = update.eta;
            }

            let progress = job.progress;
            self.inner.events.emit(state.jobs.clone());
            progress
        };

        self.inner.session.tick(self.label, progress).await;
    }
}
