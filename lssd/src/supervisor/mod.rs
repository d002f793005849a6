mod entry;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureOutcome, Recorder, thumbnail_path};
use crate::chat::{MessageRef, Notifier};
use crate::youtube::{LiveStatus, Prober};

pub use entry::{Bucket, ListedStream, LiveStream};

/// Default period between checks of the waiting queue.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    #[error("`{0}` is not live content")]
    NotLiveContent(String),
    #[error("`{0}` has already been queued")]
    AlreadyQueued(String),
    #[error("`{0}` is already being recorded")]
    AlreadyRecording(String),
    #[error("supervisor is shutting down")]
    ShuttingDown,
}

/// Where an accepted nomination ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Queued,
    Started,
}

/// What a cancel request found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CancelOutcome {
    pub dequeued: bool,
    pub interrupted: bool,
}

/// A recording inserted into the index whose start has not been posted yet.
struct Admitted {
    video_id: String,
    origin: MessageRef,
    thumbnail: Option<String>,
    announced: oneshot::Sender<()>,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub record_dir: PathBuf,
    pub poll_interval: Duration,
}

/**
    Owns the waiting and recording indices and every capture task.

    An ID lives in at most one index at a time. Each index has its own lock
    and no code path holds both at once; moves between them and cancels are
    serialized by the admission lock instead.

    Every entry carries a session number, renewed on each enqueue and each
    recording start, so work based on an older snapshot can tell that the
    entry it saw has since been replaced.
*/
pub struct Supervisor {
    waiting: Mutex<BTreeMap<String, LiveStream>>,
    recording: Mutex<BTreeMap<String, LiveStream>>,
    admission: Mutex<()>,
    workers: TaskTracker,
    shutdown: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
    closing: AtomicBool,
    sessions: AtomicU64,
    prober: Arc<dyn Prober>,
    recorder: Arc<dyn Recorder>,
    notifier: Arc<dyn Notifier>,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        prober: Arc<dyn Prober>,
        recorder: Arc<dyn Recorder>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            waiting: Mutex::new(BTreeMap::new()),
            recording: Mutex::new(BTreeMap::new()),
            admission: Mutex::new(()),
            workers: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            poller: Mutex::new(None),
            closing: AtomicBool::new(false),
            sessions: AtomicU64::new(1),
            prober,
            recorder,
            notifier,
            config,
        })
    }

    /// Root of the cancellation tree; fires when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn prober(&self) -> &Arc<dyn Prober> {
        &self.prober
    }

    // ── Commands ─────────────────────────────────────────────────────────

    /// Accept a nominated broadcast: record it now or queue it for the poller.
    pub async fn add(self: &Arc<Self>, entry: LiveStream) -> Result<AddOutcome, SupervisorError> {
        let admitted = {
            let _admission = self.admission.lock().await;

            match entry.live_status() {
                LiveStatus::NonLiveContent => {
                    return Err(SupervisorError::NotLiveContent(entry.video_id));
                }
                LiveStatus::LiveNow => {
                    // A queued copy is superseded by the live one.
                    self.waiting.lock().await.remove(&entry.video_id);
                    self.start_recording(entry).await?
                }
                _ => {
                    self.enqueue(entry).await?;
                    return Ok(AddOutcome::Queued);
                }
            }
        };

        self.announce(admitted).await;
        Ok(AddOutcome::Started)
    }

    async fn enqueue(&self, entry: LiveStream) -> Result<(), SupervisorError> {
        if self.recording.lock().await.contains_key(&entry.video_id) {
            return Err(SupervisorError::AlreadyRecording(entry.video_id));
        }

        let mut waiting = self.waiting.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(SupervisorError::ShuttingDown);
        }
        if waiting.contains_key(&entry.video_id) {
            return Err(SupervisorError::AlreadyQueued(entry.video_id));
        }

        info!(
            video_id = %entry.video_id,
            status = %entry.live_status(),
            scheduled_start = ?entry.info.scheduled_start,
            "queued for recording"
        );
        let session = self.sessions.fetch_add(1, Ordering::Relaxed);
        waiting.insert(entry.video_id.clone(), entry.into_waiting(session));
        Ok(())
    }

    /// Drop an ID from the queue and interrupt its capture, whichever applies.
    pub async fn cancel(&self, video_id: &str) -> CancelOutcome {
        // Waits out any promotion in flight, so the ID is found in one index.
        let _admission = self.admission.lock().await;

        let dequeued = self.waiting.lock().await.remove(video_id).is_some();

        let removed = self.recording.lock().await.remove(video_id);
        let interrupted = match removed {
            Some(entry) => {
                entry.cancel_recording();
                true
            }
            None => false,
        };

        info!(video_id, dequeued, interrupted, "cancel requested");
        CancelOutcome {
            dequeued,
            interrupted,
        }
    }

    /// Snapshot of both indices, waiting entries first.
    pub async fn list(&self) -> Vec<ListedStream> {
        let mut listed: Vec<ListedStream> = self
            .waiting
            .lock()
            .await
            .values()
            .map(LiveStream::listed)
            .collect();

        listed.extend(
            self.recording
                .lock()
                .await
                .values()
                .map(LiveStream::listed),
        );
        listed
    }

    /// Which index currently holds an ID.
    #[cfg(test)]
    pub async fn bucket_of(&self, video_id: &str) -> Option<Bucket> {
        if self.recording.lock().await.contains_key(video_id) {
            return Some(Bucket::Recording);
        }
        if self.waiting.lock().await.contains_key(video_id) {
            return Some(Bucket::Waiting);
        }
        None
    }

    // ── Recording ────────────────────────────────────────────────────────

    /**
        Insert into the recording index and launch the capture task.

        Runs under the admission lock. The start is posted to chat afterwards
        by `announce`, outside the lock, and the capture task holds its
        finish notice until then.
    */
    async fn start_recording(
        self: &Arc<Self>,
        entry: LiveStream,
    ) -> Result<Admitted, SupervisorError> {
        let video_id = entry.video_id.clone();
        let origin = entry.origin;
        let thumbnail = entry.info.thumbnail_url().map(str::to_string);
        let (announced_tx, announced_rx) = oneshot::channel();

        {
            let mut recording = self.recording.lock().await;

            // Checked under the lock so shutdown's barrier sees every spawn.
            if self.shutdown.is_cancelled() {
                return Err(SupervisorError::ShuttingDown);
            }
            if recording.contains_key(&video_id) {
                return Err(SupervisorError::AlreadyRecording(video_id));
            }

            let cancel = self.shutdown.child_token();
            let session = self.sessions.fetch_add(1, Ordering::Relaxed);
            recording.insert(
                video_id.clone(),
                entry.into_recording(cancel.clone(), session),
            );

            self.workers.spawn(Arc::clone(self).run_capture(
                video_id.clone(),
                origin,
                cancel,
                session,
                announced_rx,
            ));
        }

        info!(video_id = %video_id, "recording started");
        Ok(Admitted {
            video_id,
            origin,
            thumbnail,
            announced: announced_tx,
        })
    }

    async fn announce(&self, admitted: Admitted) {
        let Admitted {
            video_id,
            origin,
            thumbnail,
            announced,
        } = admitted;

        self.spawn_thumbnail_fetch(&video_id, thumbnail);
        self.say(
            origin.channel_id,
            &format!("live `{video_id}` recording was started"),
        )
        .await;
        let _ = announced.send(());
    }

    async fn run_capture(
        self: Arc<Self>,
        video_id: String,
        origin: MessageRef,
        cancel: CancellationToken,
        session: u64,
        announced: oneshot::Receiver<()>,
    ) {
        match self.recorder.record(&video_id, &cancel).await {
            Ok(CaptureOutcome::Completed) => info!(video_id = %video_id, "capture completed"),
            Ok(CaptureOutcome::Interrupted) => info!(video_id = %video_id, "capture interrupted"),
            Err(e) => error!(video_id = %video_id, error = %e, "capture failed"),
        }

        {
            let mut recording = self.recording.lock().await;
            // A cancel followed by a fresh add may have replaced the entry.
            if recording
                .get(&video_id)
                .is_some_and(|entry| entry.session() == session)
            {
                recording.remove(&video_id);
            }
        }

        // The start notice goes out before the finish notice.
        let _ = announced.await;
        self.say(
            origin.channel_id,
            &format!("live `{video_id}` recording was finished"),
        )
        .await;
    }

    fn spawn_thumbnail_fetch(&self, video_id: &str, url: Option<String>) {
        let Some(url) = url else {
            warn!(video_id, "no thumbnail image");
            return;
        };

        let prober = Arc::clone(&self.prober);
        let path = thumbnail_path(&self.config.record_dir, video_id);
        let video_id = video_id.to_string();

        tokio::spawn(async move {
            let data = match prober.fetch_thumbnail(&url).await {
                Ok(data) => data,
                Err(e) => {
                    error!(video_id = %video_id, error = %e, "failed to download thumbnail");
                    return;
                }
            };

            match tokio::fs::write(&path, data).await {
                Ok(()) => debug!(video_id = %video_id, path = %path.display(), "thumbnail saved"),
                Err(e) => {
                    error!(video_id = %video_id, error = %e, "failed to write thumbnail")
                }
            }
        });
    }

    async fn say(&self, channel_id: u64, text: &str) {
        if let Err(e) = self.notifier.say(channel_id, text).await {
            warn!(channel_id, error = %e, "failed to send chat message");
        }
    }

    // ── Poller ───────────────────────────────────────────────────────────

    /// Start the periodic check of the waiting queue.
    pub async fn start_poller(self: &Arc<Self>) {
        let handle = tokio::spawn(Arc::clone(self).run_poller());
        if let Some(previous) = self.poller.lock().await.replace(handle) {
            previous.abort();
        }
    }

    async fn run_poller(self: Arc<Self>) {
        let period = self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => break,
                        _ = self.poll_once() => {}
                    }
                }
            }
        }

        debug!("poller stopped");
    }

    /**
        One pass over the waiting queue.

        Works on a snapshot so the probe calls run without the lock; every
        mutation re-checks that the ID is still queued.
    */
    pub async fn poll_once(self: &Arc<Self>) {
        let queued: Vec<LiveStream> = self.waiting.lock().await.values().cloned().collect();
        debug!(count = queued.len(), "checking waiting queue");

        for mut entry in queued {
            if self.shutdown.is_cancelled() {
                return;
            }

            let video_id = entry.video_id.clone();
            let session = entry.session();
            if let Err(e) = entry.reload_info(self.prober.as_ref()).await {
                error!(video_id = %video_id, error = %e, "failed to reload broadcast info");
                let mut waiting = self.waiting.lock().await;
                if is_current(&waiting, &video_id, session) {
                    waiting.remove(&video_id);
                    info!(video_id = %video_id, "removed from waiting queue");
                }
                continue;
            }

            let status = entry.live_status();
            debug!(video_id = %video_id, status = %status, "broadcast checked");

            if status != LiveStatus::LiveNow {
                let mut waiting = self.waiting.lock().await;
                if let Some(queued) = waiting
                    .get_mut(&video_id)
                    .filter(|queued| queued.session() == session)
                {
                    queued.info = entry.info;
                }
                continue;
            }

            let admitted = {
                let _admission = self.admission.lock().await;
                {
                    let mut waiting = self.waiting.lock().await;
                    if !is_current(&waiting, &video_id, session) {
                        // Cancelled or re-added while probing.
                        continue;
                    }
                    waiting.remove(&video_id);
                }
                self.start_recording(entry).await
            };

            match admitted {
                Ok(admitted) => self.announce(admitted).await,
                Err(SupervisorError::AlreadyRecording(_)) => {
                    debug!(video_id = %video_id, "already recording")
                }
                Err(e) => warn!(video_id = %video_id, error = %e, "failed to start recording"),
            }
        }
    }

    // ── Shutdown ─────────────────────────────────────────────────────────

    /**
        Interrupt every capture, wait for all of them, then disconnect chat.

        Safe to call more than once; later calls wait for the same workers
        and do not close the notifier again.
    */
    pub async fn shutdown(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            self.workers.wait().await;
            return;
        }

        info!("shutting down supervisor");
        self.shutdown.cancel();

        let poller = self.poller.lock().await.take();
        if let Some(poller) = poller {
            if let Err(e) = poller.await {
                warn!(error = %e, "poller task failed");
            }
        }

        // Any start_recording that won the lock before cancellation has spawned by now.
        drop(self.recording.lock().await);
        self.workers.close();
        self.workers.wait().await;

        self.waiting.lock().await.clear();
        let leftover = std::mem::take(&mut *self.recording.lock().await);
        if !leftover.is_empty() {
            warn!(count = leftover.len(), "recording index not empty after shutdown");
        }

        self.notifier.close().await;
        info!("supervisor stopped");
    }
}

/// Whether the queued entry for an ID is still the one a snapshot saw.
fn is_current(waiting: &BTreeMap<String, LiveStream>, video_id: &str, session: u64) -> bool {
    waiting
        .get(video_id)
        .is_some_and(|queued| queued.session() == session)
}
