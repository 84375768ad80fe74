//! End-to-end queue behaviour with scripted network and platform fakes
//!
//! Every test runs against an in-memory SQLite store and a temp directory;
//! nothing touches the real network.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tatakai_offline::download::fetcher::{ByteStream, HttpFetcher};
use tatakai_offline::download::{DownloadManager, EnqueueRequest, JobStatus, ManagerDeps, QueueSnapshot};
use tatakai_offline::platform::{
    BulkTransfer, DirEntry, FileSystem, ForegroundService, KeepAwake, LocalFileSystem, RequestHeaders,
    TransferProgress, TransferProgressFn,
};
use tatakai_offline::storage::{Database, KeyValueStore};
use tatakai_offline::{DownloadConfig, OfflineError, Result};
use tokio::sync::broadcast;

const PLAYLIST: &str = "https://cdn.test/a/index.m3u8";

/// Scripted HTTP origin
#[derive(Default)]
struct Origin {
    texts: HashMap<String, String>,
    blobs: HashMap<String, Vec<u8>>,
    /// Remaining forced failures per URL
    failures: Mutex<HashMap<String, usize>>,
    /// URLs whose requests stall until released
    hang: Mutex<HashSet<String>>,
    /// Streamed bodies that stop after their first chunk
    stalls: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
}

impl Origin {
    fn hls(segments: &[(&str, &[u8])]) -> Self {
        let mut origin = Origin::default();
        let mut playlist = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:4\n");
        for (name, body) in segments {
            playlist.push_str(&format!("#EXTINF:4,\n{}\n", name));
            origin.blobs.insert(format!("https://cdn.test/a/{}", name), body.to_vec());
        }
        playlist.push_str("#EXT-X-ENDLIST\n");
        origin.texts.insert(PLAYLIST.to_string(), playlist);
        origin
    }

    fn fail(&self, url: &str, times: usize) {
        self.failures.lock().unwrap().insert(url.to_string(), times);
    }

    fn hang(&self, url: &str) {
        self.hang.lock().unwrap().insert(url.to_string());
    }

    fn release(&self, url: &str) {
        self.hang.lock().unwrap().remove(url);
    }

    fn stall_after_first_chunk(&self, url: &str) {
        self.stalls.lock().unwrap().insert(url.to_string());
    }

    fn is_held(&self, url: &str) -> bool {
        self.hang.lock().unwrap().contains(url)
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    async fn respond(&self, url: &str) -> Result<()> {
        self.requests.lock().unwrap().push(url.to_string());

        while self.is_held(url) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(url) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(OfflineError::http_status(500, url))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl HttpFetcher for Origin {
    async fn get_text(&self, url: &str, _headers: &RequestHeaders) -> Result<String> {
        self.respond(url).await?;
        self.texts.get(url).cloned().ok_or_else(|| OfflineError::http_status(404, url))
    }

    async fn get_bytes(&self, url: &str, _headers: &RequestHeaders) -> Result<Bytes> {
        self.respond(url).await?;
        self.blobs
            .get(url)
            .map(|b| Bytes::from(b.clone()))
            .ok_or_else(|| OfflineError::http_status(404, url))
    }

    async fn get_stream(&self, url: &str, _headers: &RequestHeaders) -> Result<ByteStream> {
        self.respond(url).await?;
        let body = self.blobs.get(url).cloned().ok_or_else(|| OfflineError::http_status(404, url))?;
        let chunks: Vec<Result<Bytes>> = body.chunks(4).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
        let stalls = self.stalls.lock().unwrap().contains(url);
        let stream = if stalls {
            let first: Vec<Result<Bytes>> = chunks.into_iter().take(1).collect();
            futures_util::stream::iter(first)
                .chain(futures_util::stream::pending())
                .boxed()
        } else {
            futures_util::stream::iter(chunks).boxed()
        };
        Ok(ByteStream {
            content_length: Some(body.len() as u64),
            body: stream,
        })
    }
}

/// Native transfer that rejects proxied URLs and writes everything else
///
/// A held URL gets half its body written, then waits for release.
struct NativeTransfer {
    origin: Arc<Origin>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl BulkTransfer for NativeTransfer {
    async fn download_file(
        &self,
        url: &str,
        destination_uri: &str,
        _headers: &RequestHeaders,
        on_progress: TransferProgressFn,
    ) -> Result<()> {
        self.calls.lock().unwrap().push(url.to_string());
        if url.contains("proxy") {
            return Err(OfflineError::TransferFailed("rejected by native layer".to_string()));
        }

        let body = self.origin.blobs.get(url).cloned().ok_or_else(|| OfflineError::http_status(404, url))?;
        let path = url::Url::parse(destination_uri)?
            .to_file_path()
            .map_err(|_| OfflineError::TransferFailed(destination_uri.to_string()))?;
        std::fs::create_dir_all(path.parent().unwrap())?;

        if self.origin.is_held(url) {
            let half = &body[..body.len() / 2];
            std::fs::write(&path, half)?;
            on_progress(TransferProgress {
                bytes: half.len() as u64,
                content_length: Some(body.len() as u64),
            });
            while self.origin.is_held(url) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        std::fs::write(&path, &body)?;
        on_progress(TransferProgress {
            bytes: body.len() as u64,
            content_length: Some(body.len() as u64),
        });
        Ok(())
    }
}

/// Local disk whose deletes take a while
struct SlowDelete {
    inner: LocalFileSystem,
    delay: Duration,
}

#[async_trait]
impl FileSystem for SlowDelete {
    async fn mkdir_all(&self, path: &str) -> Result<()> {
        self.inner.mkdir_all(path).await
    }
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.inner.read_dir(path).await
    }
    async fn read_to_string(&self, path: &str) -> Result<String> {
        self.inner.read_to_string(path).await
    }
    async fn write_string(&self, path: &str, data: &str) -> Result<()> {
        self.inner.write_string(path, data).await
    }
    async fn create_empty(&self, path: &str) -> Result<()> {
        self.inner.create_empty(path).await
    }
    async fn append_base64(&self, path: &str, data: &str) -> Result<()> {
        self.inner.append_base64(path, data).await
    }
    async fn delete_file(&self, path: &str) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete_file(path).await
    }
    async fn exists(&self, path: &str) -> bool {
        self.inner.exists(path).await
    }
    fn resolve_uri(&self, path: &str) -> Result<String> {
        self.inner.resolve_uri(path)
    }
}

/// Records wake-lock and notification calls
#[derive(Default)]
struct Device {
    calls: Mutex<Vec<String>>,
}

impl Device {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl KeepAwake for Device {
    async fn keep_awake(&self) -> Result<()> {
        self.push("keep_awake");
        Ok(())
    }

    async fn allow_sleep(&self) -> Result<()> {
        self.push("allow_sleep");
        Ok(())
    }
}

#[async_trait]
impl ForegroundService for Device {
    async fn start(&self, _title: &str, _body: &str) -> Result<()> {
        self.push("start");
        Ok(())
    }

    async fn update(&self, title: &str, _body: &str) -> Result<()> {
        self.push(format!("update:{}", title));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.push("stop");
        Ok(())
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    root: std::path::PathBuf,
    db: Arc<Database>,
    origin: Arc<Origin>,
    transfer: Arc<NativeTransfer>,
    device: Arc<Device>,
}

impl Harness {
    async fn new(origin: Origin) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let origin = Arc::new(origin);
        Self {
            root: dir.path().to_path_buf(),
            _dir: dir,
            db: Arc::new(Database::new_in_memory().await.unwrap()),
            transfer: Arc::new(NativeTransfer {
                origin: origin.clone(),
                calls: Mutex::new(Vec::new()),
            }),
            origin,
            device: Arc::new(Device::default()),
        }
    }

    /// A fresh manager over the same store and disk, as after a restart
    async fn manager(&self) -> DownloadManager {
        self.manager_with_fs(Arc::new(LocalFileSystem::new(&self.root))).await
    }

    async fn manager_with_fs(&self, fs: Arc<dyn FileSystem>) -> DownloadManager {
        let mut config = DownloadConfig::with_root(&self.root);
        config.next_job_delay_ms = 10;

        let deps = ManagerDeps {
            store: self.db.clone(),
            fs,
            fetcher: self.origin.clone(),
            transfer: self.transfer.clone(),
            keep_awake: self.device.clone(),
            notifications: self.device.clone(),
        };
        DownloadManager::new(deps, config).await.unwrap()
    }

    fn file(&self, relative: &str) -> Vec<u8> {
        std::fs::read(self.root.join(relative)).unwrap()
    }

    fn exists(&self, relative: &str) -> bool {
        Path::new(&self.root.join(relative)).exists()
    }

    fn file_len(&self, relative: &str) -> u64 {
        std::fs::metadata(self.root.join(relative)).map(|m| m.len()).unwrap_or(0)
    }
}

fn episode(anime_id: &str, episode: u32, url: &str) -> EnqueueRequest {
    EnqueueRequest {
        anime_id: anime_id.to_string(),
        anime_title: format!("Show {}", anime_id),
        season: 1,
        episode,
        video_url: url.to_string(),
        ..Default::default()
    }
}

async fn next_snapshot(rx: &mut broadcast::Receiver<QueueSnapshot>) -> QueueSnapshot {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(snapshot)) => return snapshot,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(e)) => panic!("event channel closed: {}", e),
            Err(_) => panic!("no queue update within 5s"),
        }
    }
}

async fn wait_for_status(rx: &mut broadcast::Receiver<QueueSnapshot>, id: &str, status: JobStatus) {
    loop {
        let snapshot = next_snapshot(rx).await;
        if snapshot.iter().any(|j| j.id == id && j.status == status) {
            return;
        }
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn idle(manager: &DownloadManager) {
    tokio::time::timeout(Duration::from_secs(10), manager.wait_idle())
        .await
        .expect("queue did not go idle");
}

#[tokio::test]
async fn segment_failing_twice_fails_job_and_retry_restarts_from_first_segment() {
    let harness = Harness::new(Origin::hls(&[
        ("s1.ts", b"one-"),
        ("s2.ts", b"two-"),
        ("s3.ts", b"three"),
    ]))
    .await;
    harness.origin.fail("https://cdn.test/a/s2.ts", 2);
    let manager = harness.manager().await;

    let id = manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    assert_eq!(id, "A-S1E1");
    idle(&manager).await;

    let job = manager.job(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("2/3"), "{:?}", job.error);
    assert!(job.progress < 100);
    assert_eq!(
        harness.origin.requests(),
        vec![
            PLAYLIST,
            "https://cdn.test/a/s1.ts",
            "https://cdn.test/a/s2.ts",
            "https://cdn.test/a/s2.ts",
        ]
    );
    assert!(!harness.exists("TatakaiOffline/A/S1E1.json"));

    harness.origin.clear_requests();
    let mut rx = manager.subscribe();
    manager.retry(&id).await.unwrap();

    let requeued = next_snapshot(&mut rx).await;
    let job = requeued.iter().find(|j| j.id == id).unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.progress, 0);
    assert!(job.error.is_none());

    idle(&manager).await;

    let requests = harness.origin.requests();
    assert_eq!(requests[1], "https://cdn.test/a/s1.ts");
    let job = manager.job(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(harness.file("TatakaiOffline/A/S1E1.mp4"), b"one-two-three");
    assert!(harness.exists("TatakaiOffline/A/S1E1.json"));
    assert!(manager.library().is_downloaded("A", 1, 1).await);
}

#[tokio::test]
async fn progress_never_decreases_and_reaches_100_only_when_completed() {
    let segments: Vec<(String, Vec<u8>)> = (0..20).map(|i| (format!("s{}.ts", i), vec![i as u8; 64])).collect();
    let refs: Vec<(&str, &[u8])> = segments.iter().map(|(n, b)| (n.as_str(), b.as_slice())).collect();
    let harness = Harness::new(Origin::hls(&refs)).await;
    let manager = harness.manager().await;
    let mut rx = manager.subscribe();

    let id = manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();

    let mut last = 0u8;
    loop {
        let snapshot = next_snapshot(&mut rx).await;
        let job = snapshot.iter().find(|j| j.id == id).unwrap();
        match job.status {
            JobStatus::Downloading => {
                assert!(job.progress >= last, "progress went from {} to {}", last, job.progress);
                assert!(job.progress < 100);
                last = job.progress;
            }
            JobStatus::Completed => {
                assert_eq!(job.progress, 100);
                break;
            }
            JobStatus::Queued => assert_eq!(job.progress, 0),
            JobStatus::Failed => panic!("unexpected failure: {:?}", job.error),
        }
    }
    assert_eq!(last, 95);
}

#[tokio::test]
async fn duplicate_and_already_downloaded_are_rejected() {
    let harness = Harness::new(Origin::hls(&[("s1.ts", b"x")])).await;
    harness.origin.hang("https://cdn.test/a/s1.ts");
    let manager = harness.manager().await;

    manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    let err = manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap_err();
    assert!(matches!(err, OfflineError::AlreadyQueued(ref id) if id == "A-S1E1"));

    manager.cancel("A-S1E1").await.unwrap();
    idle(&manager).await;
    harness.origin.release("https://cdn.test/a/s1.ts");

    manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    idle(&manager).await;
    let err = manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap_err();
    assert!(matches!(err, OfflineError::AlreadyDownloaded(_)));

    // After a restart the completed job is gone but the library remembers it
    let restarted = harness.manager().await;
    assert!(restarted.queue().await.is_empty());
    let err = restarted.enqueue(episode("A", 1, PLAYLIST)).await.unwrap_err();
    assert!(matches!(err, OfflineError::AlreadyDownloaded(_)));
}

#[tokio::test]
async fn empty_playlist_fails_without_segment_requests() {
    let mut origin = Origin::default();
    origin
        .texts
        .insert(PLAYLIST.to_string(), "#EXTM3U\n#EXT-X-ENDLIST\n".to_string());
    let harness = Harness::new(origin).await;
    let manager = harness.manager().await;

    let id = manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    idle(&manager).await;

    let job = manager.job(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("No segments"));
    assert_eq!(harness.origin.requests(), vec![PLAYLIST]);
}

#[tokio::test]
async fn jobs_run_one_at_a_time_in_insertion_order() {
    let mut origin = Origin::hls(&[("s1.ts", b"x1"), ("s2.ts", b"x2")]);
    origin
        .texts
        .insert("https://cdn.test/y/index.m3u8".to_string(), "#EXTM3U\n../a/s1.ts\n".to_string());
    let harness = Harness::new(origin).await;
    let manager = harness.manager().await;
    let mut rx = manager.subscribe();

    let x = manager.enqueue(episode("X", 1, PLAYLIST)).await.unwrap();
    let y = manager.enqueue(episode("Y", 1, "https://cdn.test/y/index.m3u8")).await.unwrap();

    let mut first_downloading: Vec<String> = Vec::new();
    loop {
        let snapshot = next_snapshot(&mut rx).await;
        let downloading: Vec<&str> = snapshot
            .iter()
            .filter(|j| j.status == JobStatus::Downloading)
            .map(|j| j.id.as_str())
            .collect();
        assert!(downloading.len() <= 1, "two jobs downloading: {:?}", downloading);

        for id in downloading {
            if !first_downloading.iter().any(|seen| seen == id) {
                first_downloading.push(id.to_string());
            }
        }
        if snapshot.len() == 2 && snapshot.iter().all(|j| !j.status.is_pending()) {
            break;
        }
    }

    assert_eq!(first_downloading, vec![x.clone(), y.clone()]);
    assert_eq!(manager.job(&x).await.unwrap().status, JobStatus::Completed);
    assert_eq!(manager.job(&y).await.unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn restart_demotes_downloading_and_drops_completed() {
    let harness = Harness::new(Origin::default()).await;
    let persisted = serde_json::json!([
        {
            "id": "A-S1E1", "animeId": "A", "animeTitle": "Show A",
            "season": 1, "episode": 1, "status": "downloading", "progress": 42
        },
        {
            "id": "A-S1E2", "animeId": "A", "animeTitle": "Show A",
            "season": 1, "episode": 2, "status": "completed", "progress": 100
        },
        {
            "id": "B-S1E1", "animeId": "B", "animeTitle": "Show B",
            "season": 1, "episode": 1, "status": "failed", "progress": 30,
            "error": "Segment 3/9 failed: HTTP 500"
        }
    ]);
    harness
        .db
        .set("tatakai_mobile_downloads", &persisted.to_string())
        .await
        .unwrap();

    let manager = harness.manager().await;
    let queue = manager.queue().await;

    assert_eq!(queue.len(), 2);
    assert_eq!(queue[0].id, "A-S1E1");
    assert_eq!(queue[0].status, JobStatus::Queued);
    assert_eq!(queue[0].progress, 0);
    assert_eq!(queue[1].status, JobStatus::Failed);
    assert_eq!(queue[1].error.as_deref(), Some("Segment 3/9 failed: HTTP 500"));

    let stored = harness.db.get("tatakai_mobile_downloads").await.unwrap().unwrap();
    assert!(stored.contains("\"queued\""));
    assert!(!stored.contains("A-S1E2"));
}

#[tokio::test]
async fn cancelling_downloading_job_removes_it() {
    let harness = Harness::new(Origin::hls(&[("s1.ts", b"1"), ("s2.ts", b"2")])).await;
    harness.origin.hang("https://cdn.test/a/s2.ts");
    let manager = harness.manager().await;
    let mut rx = manager.subscribe();

    let id = manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    wait_for_status(&mut rx, &id, JobStatus::Downloading).await;

    manager.cancel(&id).await.unwrap();
    idle(&manager).await;

    assert!(manager.queue().await.is_empty());
    assert!(harness.db.get("dl_url_A-S1E1").await.unwrap().is_none());
    assert!(!harness.exists("TatakaiOffline/A/S1E1.json"));
    assert!(!harness.exists("TatakaiOffline/A/S1E1.mp4"));
    assert_eq!(harness.device.calls().last().map(String::as_str), Some("stop"));
}

#[tokio::test]
async fn cancelling_queued_job_clears_its_source() {
    let mut origin = Origin::hls(&[("s1.ts", b"1")]);
    origin.texts.insert(
        "https://cdn.test/b/index.m3u8".to_string(),
        "#EXTM3U\nhttps://cdn.test/a/s1.ts\n".to_string(),
    );
    let harness = Harness::new(origin).await;
    harness.origin.hang("https://cdn.test/a/s1.ts");
    let manager = harness.manager().await;
    let mut rx = manager.subscribe();

    let x = manager.enqueue(episode("X", 1, PLAYLIST)).await.unwrap();
    let y = manager.enqueue(episode("Y", 1, "https://cdn.test/b/index.m3u8")).await.unwrap();
    wait_for_status(&mut rx, &x, JobStatus::Downloading).await;
    assert!(harness.db.get("dl_url_Y-S1E1").await.unwrap().is_some());

    manager.cancel(&y).await.unwrap();
    assert!(manager.job(&y).await.is_none());
    assert!(harness.db.get("dl_url_Y-S1E1").await.unwrap().is_none());
    assert_eq!(manager.job(&x).await.unwrap().status, JobStatus::Downloading);

    assert_eq!(manager.cancel_active().await.unwrap(), Some(x));
    idle(&manager).await;
    assert!(manager.queue().await.is_empty());
}

#[tokio::test]
async fn direct_download_falls_back_when_native_transfer_rejects() {
    let mut origin = Origin::default();
    origin
        .blobs
        .insert("https://cdn.test/ep1.mp4".to_string(), b"direct-bytes".to_vec());
    origin
        .blobs
        .insert("https://proxy.test/stream?id=2".to_string(), b"proxied-bytes".to_vec());
    let harness = Harness::new(origin).await;
    let manager = harness.manager().await;

    manager.enqueue(episode("D", 1, "https://cdn.test/ep1.mp4")).await.unwrap();
    manager
        .enqueue(episode("D", 2, "https://proxy.test/stream?id=2"))
        .await
        .unwrap();
    idle(&manager).await;

    assert_eq!(harness.file("TatakaiOffline/D/S1E1.mp4"), b"direct-bytes");
    assert_eq!(harness.file("TatakaiOffline/D/S1E2.mp4"), b"proxied-bytes");
    assert_eq!(
        harness.origin.requests(),
        vec!["https://proxy.test/stream?id=2"],
        "only the rejected source goes through the streamed fetch"
    );

    let library = manager.library().list().await.unwrap();
    assert_eq!(library.len(), 2);
    assert!(manager.library().video_uri("D", 1, 2).await.unwrap().starts_with("file://"));
}

#[tokio::test]
async fn session_spans_consecutive_jobs_and_releases_when_idle() {
    let harness = Harness::new(Origin::hls(&[("s1.ts", b"1")])).await;
    harness.origin.hang("https://cdn.test/a/s1.ts");
    let manager = harness.manager().await;

    manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    manager.enqueue(episode("A", 2, PLAYLIST)).await.unwrap();
    harness.origin.release("https://cdn.test/a/s1.ts");
    idle(&manager).await;

    let calls = harness.device.calls();
    assert_eq!(calls.iter().filter(|c| *c == "keep_awake").count(), 1);
    assert_eq!(calls.iter().filter(|c| *c == "start").count(), 1);
    assert!(calls.iter().any(|c| c == "update:Downloading 95%"));
    assert_eq!(calls.iter().filter(|c| *c == "stop").count(), 1);
    assert_eq!(calls.last().map(String::as_str), Some("stop"));
}

#[tokio::test]
async fn delete_episode_removes_files_and_queue_entry() {
    let harness = Harness::new(Origin::hls(&[("s1.ts", b"1")])).await;
    let manager = harness.manager().await;

    manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    idle(&manager).await;
    assert!(harness.exists("TatakaiOffline/A/S1E1.mp4"));

    manager.delete_episode("A", 1, 1).await.unwrap();
    assert!(!harness.exists("TatakaiOffline/A/S1E1.mp4"));
    assert!(!harness.exists("TatakaiOffline/A/S1E1.json"));
    assert!(manager.queue().await.is_empty());

    // Deleted episodes can be downloaded again
    manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    idle(&manager).await;
    assert!(manager.library().is_downloaded("A", 1, 1).await);
}

#[tokio::test]
async fn reenqueue_after_cancel_survives_the_cancelled_run() {
    let harness = Harness::new(Origin::hls(&[("s1.ts", b"one-"), ("s2.ts", b"two")])).await;
    harness.origin.hang("https://cdn.test/a/s2.ts");
    let fs = Arc::new(SlowDelete {
        inner: LocalFileSystem::new(&harness.root),
        delay: Duration::from_millis(200),
    });
    let manager = harness.manager_with_fs(fs).await;
    let mut rx = manager.subscribe();

    let id = manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    wait_for_status(&mut rx, &id, JobStatus::Downloading).await;

    // The cancelled run is still cleaning up its partial file
    manager.cancel(&id).await.unwrap();
    let again = manager.enqueue(episode("A", 1, PLAYLIST)).await.unwrap();
    assert_eq!(again, id);
    assert_eq!(manager.job(&id).await.unwrap().status, JobStatus::Queued);

    harness.origin.release("https://cdn.test/a/s2.ts");
    idle(&manager).await;

    let job = manager.job(&id).await.expect("re-queued job kept");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(harness.file("TatakaiOffline/A/S1E1.mp4"), b"one-two");
    assert!(manager.library().is_downloaded("A", 1, 1).await);
    assert!(harness.db.get("dl_url_A-S1E1").await.unwrap().is_none());
}

#[tokio::test]
async fn cancelling_native_transfer_midway_removes_job_and_partial_file() {
    let mut origin = Origin::default();
    origin
        .blobs
        .insert("https://cdn.test/ep1.mp4".to_string(), b"0123456789abcdef".to_vec());
    let harness = Harness::new(origin).await;
    harness.origin.hang("https://cdn.test/ep1.mp4");
    let manager = harness.manager().await;
    let mut rx = manager.subscribe();

    let id = manager.enqueue(episode("D", 1, "https://cdn.test/ep1.mp4")).await.unwrap();
    wait_for_status(&mut rx, &id, JobStatus::Downloading).await;
    wait_until("partial native write", || harness.file_len("TatakaiOffline/D/S1E1.mp4") == 8).await;

    manager.cancel(&id).await.unwrap();
    idle(&manager).await;

    assert!(manager.queue().await.is_empty());
    assert!(harness.db.get("dl_url_D-S1E1").await.unwrap().is_none());
    assert!(!harness.exists("TatakaiOffline/D/S1E1.mp4"));
    assert!(!harness.exists("TatakaiOffline/D/S1E1.json"));
    assert!(harness.origin.requests().is_empty(), "no streamed fallback after cancel");
}

#[tokio::test]
async fn cancelling_streamed_fallback_midway_removes_job_and_partial_file() {
    const SOURCE: &str = "https://proxy.test/stream?id=7";
    let mut origin = Origin::default();
    origin.blobs.insert(SOURCE.to_string(), b"0123456789abcdef".to_vec());
    origin.stall_after_first_chunk(SOURCE);
    let harness = Harness::new(origin).await;
    let manager = harness.manager().await;
    let mut rx = manager.subscribe();

    let id = manager.enqueue(episode("D", 1, SOURCE)).await.unwrap();
    wait_for_status(&mut rx, &id, JobStatus::Downloading).await;
    wait_until("first streamed chunk", || harness.file_len("TatakaiOffline/D/S1E1.mp4") == 4).await;

    manager.cancel(&id).await.unwrap();
    idle(&manager).await;

    assert!(manager.queue().await.is_empty());
    assert!(harness.db.get("dl_url_D-S1E1").await.unwrap().is_none());
    assert!(!harness.exists("TatakaiOffline/D/S1E1.mp4"));
    assert!(!harness.exists("TatakaiOffline/D/S1E1.json"));
    assert_eq!(harness.origin.requests(), vec![SOURCE]);
}

#[tokio::test]
async fn restored_jobs_wait_for_resume_pending() {
    let harness = Harness::new(Origin::hls(&[("s1.ts", b"1")])).await;
    let persisted = serde_json::json!([{
        "id": "A-S1E1", "animeId": "A", "animeTitle": "Show A",
        "season": 1, "episode": 1, "status": "queued", "progress": 0
    }]);
    harness
        .db
        .set("tatakai_mobile_downloads", &persisted.to_string())
        .await
        .unwrap();
    // Legacy entry holding the bare URL
    harness.db.set("dl_url_A-S1E1", PLAYLIST).await.unwrap();

    let manager = harness.manager().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.origin.requests().is_empty());
    assert_eq!(manager.job("A-S1E1").await.unwrap().status, JobStatus::Queued);

    assert!(manager.resume_pending().await);
    idle(&manager).await;

    assert_eq!(manager.job("A-S1E1").await.unwrap().status, JobStatus::Completed);
    assert!(!manager.resume_pending().await);
}
