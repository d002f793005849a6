use tokio_util::sync::CancellationToken;

use crate::chat::MessageRef;
use crate::youtube::{BroadcastInfo, LiveStatus, ProbeError, Prober};

/// Supervisor index an entry currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Waiting,
    Recording,
}

/// A nominated broadcast tracked by the supervisor.
#[derive(Debug, Clone)]
pub struct LiveStream {
    pub video_id: String,
    pub info: BroadcastInfo,
    /// Message the broadcast was nominated from; replies go to its channel.
    pub origin: MessageRef,
    bucket: Bucket,
    /// Present only while recording.
    cancel: Option<CancellationToken>,
    session: u64,
}

impl LiveStream {
    pub fn new(video_id: impl Into<String>, info: BroadcastInfo, origin: MessageRef) -> Self {
        Self {
            video_id: video_id.into(),
            info,
            origin,
            bucket: Bucket::Waiting,
            cancel: None,
            session: 0,
        }
    }

    pub fn live_status(&self) -> LiveStatus {
        self.info.live_status()
    }

    /// Re-probe the broadcast and replace the stored snapshot.
    pub async fn reload_info(&mut self, prober: &dyn Prober) -> Result<(), ProbeError> {
        self.info = prober.probe(&self.video_id).await?;
        Ok(())
    }

    /// Fire the recording's cancellation, if any.
    pub fn cancel_recording(&self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }

    pub(super) fn session(&self) -> u64 {
        self.session
    }

    pub(super) fn into_waiting(mut self, session: u64) -> Self {
        self.bucket = Bucket::Waiting;
        self.cancel = None;
        self.session = session;
        self
    }

    pub(super) fn into_recording(mut self, cancel: CancellationToken, session: u64) -> Self {
        self.bucket = Bucket::Recording;
        self.cancel = Some(cancel);
        self.session = session;
        self
    }

    pub(super) fn listed(&self) -> ListedStream {
        ListedStream {
            video_id: self.video_id.clone(),
            title: self.info.title.clone(),
            bucket: self.bucket,
        }
    }
}

/// One line of the `list` snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedStream {
    pub video_id: String,
    pub title: String,
    pub bucket: Bucket,
}
