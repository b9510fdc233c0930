//! Download orchestration.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use futures::StreamExt;
use parking_lot::Mutex;
use strand_net::{with_retry, Fetcher, HttpClient, NetError, RetryPolicy};
use tokio::{
    io::AsyncWriteExt,
    sync::{watch, Mutex as AsyncMutex, Semaphore},
    task::JoinSet,
    time::{timeout_at, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    combine::{Combiner, ConcatCombiner},
    decrypt::{passthrough, Aes128CbcDecryptor, Decryptor, SegmentStream},
    error::{HlsError, HlsResult},
    events::{DownloadState, ProgressCallback, StateCallback, StateTracker},
    options::{segment_path, ProcessorOptions},
    parsing::parse_playlist,
    playlist::{EncryptionSpec, Playlist, Segment},
    progress::{FileProgressStore, ProgressStore},
};

const MESSAGE_CANCELLED: &str = "Cancelled by user";
const MESSAGE_STOPPED: &str = "All operations stopped";

/// Drives one HLS download: parse, key prefetch, bounded concurrent
/// segment acquisition with resume, combination, cleanup.
///
/// Collaborators and callbacks are injected with the `with_*` methods
/// before the first call to [`download`](Self::download) or
/// [`handle`](Self::handle). The control surface (`pause`, `resume`,
/// `cancel`) may be driven from any task, including from inside the
/// progress callback.
///
/// A processor drives one download lifecycle: the parsed playlist is
/// cached across calls so a paused run resumes cheaply, and cancellation
/// is permanent.
pub struct HlsProcessor {
    options: ProcessorOptions,
    fetcher: Arc<dyn Fetcher>,
    decryptor: Arc<dyn Decryptor>,
    store: Arc<dyn ProgressStore>,
    combiner: Arc<dyn Combiner>,
    on_progress: ProgressCallback,
    states: Arc<StateTracker>,
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
    cached_playlist: AsyncMutex<Option<Playlist>>,
}

/// Cloneable control surface for a processor, detached from its lifetime
/// so callbacks and UI tasks can steer the run.
#[derive(Clone)]
pub struct DownloadHandle {
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
    states: Arc<StateTracker>,
}

impl DownloadHandle {
    /// Pause segment workers at the next gate.
    pub fn pause(&self) {
        self.pause_tx.send_replace(true);
        self.states.update(DownloadState::Paused, "");
    }

    /// Release paused workers and re-arm the gate.
    pub fn resume(&self) {
        self.pause_tx.send_replace(false);
        self.states.update(DownloadState::Resumed, "");
    }

    /// Request cooperative cancellation. Workers observe the token at
    /// every suspension point; a cancel while paused unblocks the gate.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.states.update(DownloadState::Cancelled, MESSAGE_CANCELLED);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl HlsProcessor {
    /// Processor with the default collaborators: a reqwest fetcher,
    /// AES-128-CBC decryptor, file progress store in the work directory,
    /// and byte concatenation.
    pub fn new(options: ProcessorOptions) -> HlsResult<Self> {
        let fetcher = HttpClient::new(options.net.clone())
            .map_err(|e| HlsError::InvalidConfig(e.to_string()))?;
        let store = FileProgressStore::in_work_dir(&options.work_dir);
        let (pause_tx, _) = watch::channel(false);

        Ok(Self {
            fetcher: Arc::new(fetcher),
            decryptor: Arc::new(Aes128CbcDecryptor),
            store: Arc::new(store),
            combiner: Arc::new(ConcatCombiner),
            on_progress: Arc::new(|_, _| {}),
            states: Arc::new(StateTracker::new(Arc::new(|_, _| {}))),
            cancel: CancellationToken::new(),
            pause_tx,
            cached_playlist: AsyncMutex::new(None),
            options,
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = decryptor;
        self
    }

    pub fn with_progress_store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_combiner(mut self, combiner: Arc<dyn Combiner>) -> Self {
        self.combiner = combiner;
        self
    }

    pub fn with_on_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = on_progress;
        self
    }

    pub fn with_on_state(mut self, on_state: StateCallback) -> Self {
        self.states = Arc::new(StateTracker::new(on_state));
        self
    }

    /// Control surface detached from the processor's lifetime.
    pub fn handle(&self) -> DownloadHandle {
        DownloadHandle {
            cancel: self.cancel.clone(),
            pause_tx: self.pause_tx.clone(),
            states: self.states.clone(),
        }
    }

    pub fn pause(&self) {
        self.handle().pause();
    }

    pub fn resume(&self) {
        self.handle().resume();
    }

    pub fn cancel(&self) {
        self.handle().cancel();
    }

    /// Download the playlist at `url` and materialize it at the configured
    /// output path.
    ///
    /// Emits `Started` once, progress and state notifications during the
    /// run, and `Stopped` as the final notification regardless of outcome.
    /// On cancellation the persisted progress is discarded and
    /// [`HlsError::Cancelled`] is returned.
    pub async fn download(&self, url: &Url) -> HlsResult<()> {
        self.states.reset();

        let result = self.run(url).await;

        let outcome = if self.cancel.is_cancelled() {
            // Deliberate: partial progress is not retained across a cancel.
            if let Err(e) = self.store.cleanup().await {
                warn!(error = %e, "failed to clean up progress state after cancel");
            }
            self.states.update(DownloadState::Cancelled, MESSAGE_CANCELLED);
            Err(HlsError::Cancelled)
        } else {
            match result {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.states.update(DownloadState::Error, &e.to_string());
                    Err(e)
                }
            }
        };

        self.states.update(DownloadState::Stopped, MESSAGE_STOPPED);
        outcome
    }

    /// Step mode: parse the playlist (following master playlists through
    /// the configured selector) without downloading anything. The parsed
    /// playlist is cached for the lifetime of the processor.
    pub async fn playlist(&self, url: &Url) -> HlsResult<Playlist> {
        let mut cached = self.cached_playlist.lock().await;
        if let Some(playlist) = cached.as_ref() {
            return Ok(playlist.clone());
        }

        let parsed = parse_playlist(
            self.fetcher.as_ref(),
            url,
            self.options.strict_parse,
            self.options.variant_selector.as_ref(),
        )
        .await?;
        *cached = Some(parsed.clone());
        Ok(parsed)
    }

    /// Step mode: fetch the key bytes for every encryption spec in the
    /// playlist that does not have one yet. One fetch per unique spec.
    pub async fn prefetch_keys(&self, playlist: &Playlist) -> HlsResult<()> {
        let policy = self.options.net.retry_policy();
        let mut fetched: Vec<Arc<EncryptionSpec>> = Vec::new();

        for segment in &playlist.segments {
            let Some(spec) = &segment.encryption else {
                continue;
            };
            if spec.key().is_some() {
                continue;
            }
            if let Some(existing) = fetched.iter().find(|s| s.as_ref() == spec.as_ref()) {
                // Equal spec parsed as a distinct value (key rotation that
                // rotated back): reuse the already fetched key.
                if let Some(key) = existing.key() {
                    spec.set_key(key);
                }
                continue;
            }

            debug!(url = %spec.key_url(), "fetching encryption key");
            let bytes = with_retry(&policy, &self.cancel, || {
                self.fetcher.fetch_bytes(spec.key_url())
            })
            .await
            .map_err(|e| match e {
                NetError::Cancelled => HlsError::Cancelled,
                other => HlsError::KeyFetchFailed(other),
            })?;

            if bytes.len() != 16 {
                return Err(HlsError::KeyLengthInvalid(bytes.len()));
            }
            let mut key = [0u8; 16];
            key.copy_from_slice(&bytes);
            spec.set_key(key);
            fetched.push(spec.clone());
        }

        Ok(())
    }

    /// Remove every segment file of the playlist from the work directory.
    pub async fn cleanup_segment_files(&self, playlist: &Playlist) {
        for segment in &playlist.segments {
            let path = segment_path(&self.options.work_dir, segment.index);
            let _ = tokio::fs::remove_file(&path).await;
        }
    }

    async fn run(&self, url: &Url) -> HlsResult<()> {
        // Make sure a state file exists from here on, even for a fresh run.
        let initial = self.store.load().await?;
        self.store.save(&initial).await?;
        self.states.update(DownloadState::Started, "");

        let playlist = match self.playlist(url).await {
            Ok(playlist) => playlist,
            Err(e @ (HlsError::EmptyPlaylist | HlsError::Cancelled)) => return Err(e),
            Err(e) => {
                self.states
                    .update(DownloadState::Error, &format!("Failed to parse playlist: {e}"));
                return Err(e);
            }
        };

        self.prefetch_keys(&playlist).await?;

        tokio::fs::create_dir_all(&self.options.work_dir)
            .await
            .map_err(|e| HlsError::io(&self.options.work_dir, e))?;

        let done = self.store.load().await?;
        self.download_segments(&playlist, done).await?;
        self.finalize(&playlist).await
    }

    async fn download_segments(
        &self,
        playlist: &Playlist,
        done: BTreeSet<usize>,
    ) -> HlsResult<()> {
        let total = playlist.segments.len();
        let stop = self.cancel.child_token();
        let shared = Arc::new(RunShared {
            work_dir: self.options.work_dir.clone(),
            fetcher: self.fetcher.clone(),
            decryptor: self.decryptor.clone(),
            store: self.store.clone(),
            policy: self.options.net.retry_policy(),
            stop: stop.clone(),
            completed: Mutex::new(done.clone()),
            progress: AtomicUsize::new(done.len()),
            on_progress: self.on_progress.clone(),
            save_lock: AsyncMutex::new(()),
            semaphore: Semaphore::new(self.options.num_workers),
            total,
        });

        let mut workers = JoinSet::new();
        for segment in &playlist.segments {
            if done.contains(&segment.index) {
                continue;
            }
            let worker = SegmentWorker {
                segment: segment.clone(),
                pause_rx: self.pause_tx.subscribe(),
                shared: shared.clone(),
            };
            workers.spawn(worker.run());
        }
        info!(
            total,
            resumed = done.len(),
            workers = self.options.num_workers,
            "dispatching segment downloads"
        );

        // First terminal error wins; remaining workers are interrupted and
        // get the shutdown grace to wind down before being abandoned.
        let mut first_error: Option<HlsError> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            if deadline.is_none() && stop.is_cancelled() {
                deadline = Some(Instant::now() + self.options.shutdown_grace);
            }

            let next = match deadline {
                None => workers.join_next().await,
                Some(at) => match timeout_at(at, workers.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("worker pool did not stop within grace period, aborting");
                        workers.shutdown().await;
                        break;
                    }
                },
            };
            let Some(joined) = next else { break };

            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) if e.is_cancellation() => None,
                Ok(Err(e)) => Some(e),
                Err(join_error) if join_error.is_cancelled() => None,
                Err(join_error) => Some(HlsError::Interrupted(join_error.to_string())),
            };

            if let Some(e) = failure {
                if first_error.is_none() {
                    warn!(error = %e, "segment worker failed, stopping remaining workers");
                    stop.cancel();
                    first_error = Some(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if self.cancel.is_cancelled() {
            return Err(HlsError::Cancelled);
        }
        Ok(())
    }

    async fn finalize(&self, playlist: &Playlist) -> HlsResult<()> {
        let mut files = Vec::with_capacity(playlist.segments.len());
        for segment in &playlist.segments {
            let path = segment_path(&self.options.work_dir, segment.index);
            if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Err(HlsError::MissingSegment {
                    index: segment.index,
                });
            }
            files.push(path);
        }

        self.combiner
            .combine(&files, &self.options.work_dir, &self.options.output_path)
            .await?;

        if self.options.cleanup_segments {
            self.cleanup_segment_files(playlist).await;
        }

        self.store.cleanup().await?;
        self.states.update(DownloadState::Completed, "");
        Ok(())
    }
}

/// State shared by all workers of one run.
struct RunShared {
    work_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    decryptor: Arc<dyn Decryptor>,
    store: Arc<dyn ProgressStore>,
    policy: RetryPolicy,
    stop: CancellationToken,
    completed: Mutex<BTreeSet<usize>>,
    progress: AtomicUsize,
    on_progress: ProgressCallback,
    /// Serializes the on-disk progress writes.
    save_lock: AsyncMutex<()>,
    semaphore: Semaphore,
    total: usize,
}

struct SegmentWorker {
    segment: Segment,
    pause_rx: watch::Receiver<bool>,
    shared: Arc<RunShared>,
}

impl SegmentWorker {
    async fn run(mut self) -> HlsResult<()> {
        let shared = Arc::clone(&self.shared);
        let _permit = shared
            .semaphore
            .acquire()
            .await
            .map_err(|_| HlsError::Cancelled)?;

        self.wait_if_paused().await?;
        if self.shared.stop.is_cancelled() {
            return Err(HlsError::Cancelled);
        }

        let path = segment_path(&self.shared.work_dir, self.segment.index);
        let stream = self.open_segment_stream().await?;
        self.write_segment(stream, &path).await?;

        // Record completion before announcing it; a crash between the two
        // only costs a notification, never state.
        let snapshot = {
            let mut completed = self.shared.completed.lock();
            completed.insert(self.segment.index);
            completed.clone()
        };
        {
            let _guard = self.shared.save_lock.lock().await;
            self.shared.store.save(&snapshot).await?;
        }

        let done = self.shared.progress.fetch_add(1, Ordering::SeqCst) + 1;
        (self.shared.on_progress)(done, self.shared.total);
        debug!(index = self.segment.index, done, total = self.shared.total, "segment complete");

        if self.shared.stop.is_cancelled() {
            // Cancelled during I/O: the segment landed, but the run is over.
            return Err(HlsError::Cancelled);
        }
        Ok(())
    }

    /// Cooperative pause gate; a cancel while paused unblocks immediately.
    async fn wait_if_paused(&mut self) -> HlsResult<()> {
        let stop = self.shared.stop.clone();
        loop {
            if !*self.pause_rx.borrow_and_update() {
                return Ok(());
            }
            debug!(index = self.segment.index, "worker waiting at pause gate");
            tokio::select! {
                () = stop.cancelled() => return Err(HlsError::Cancelled),
                changed = self.pause_rx.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Fetch the segment and wrap it in the decryption pipeline when the
    /// playlist says so.
    async fn open_segment_stream(&self) -> HlsResult<SegmentStream> {
        if self.shared.stop.is_cancelled() {
            return Err(HlsError::Cancelled);
        }

        let raw = with_retry(&self.shared.policy, &self.shared.stop, || {
            self.shared.fetcher.fetch(&self.segment.url)
        })
        .await
        .map_err(|e| match e {
            NetError::Cancelled => HlsError::Cancelled,
            other => HlsError::SegmentFailed {
                index: self.segment.index,
                source: other,
            },
        })?;

        let Some(spec) = &self.segment.encryption else {
            return Ok(passthrough(raw, self.segment.index));
        };

        let key = spec
            .key()
            .ok_or_else(|| HlsError::KeyMissing(spec.key_url().to_string()))?;
        self.shared.decryptor.decrypt(raw, key, spec, &self.segment)
    }

    async fn write_segment(&self, mut stream: SegmentStream, path: &Path) -> HlsResult<()> {
        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| HlsError::io(path, e))?;

        loop {
            let chunk = tokio::select! {
                () = self.shared.stop.cancelled() => return Err(HlsError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| HlsError::io(path, e))?;
        }

        file.flush().await.map_err(|e| HlsError::io(path, e))?;
        Ok(())
    }
}
