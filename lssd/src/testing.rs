//! In-memory stand-ins for the platform, the capture tools and the chat service.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureError, CaptureOutcome, Recorder};
use crate::chat::{MessageRef, Notifier};
use crate::youtube::info::Thumbnail;
use crate::youtube::{BroadcastInfo, LiveStatus, ProbeError, Prober};

pub const CHANNEL: u64 = 42;

/// Broadcast snapshot whose flags derive the given status.
pub fn broadcast(video_id: &str, status: LiveStatus) -> BroadcastInfo {
    let (is_live_content, is_upcoming, is_live) = match status {
        LiveStatus::NonLiveContent => (false, false, false),
        LiveStatus::Upcoming => (true, true, false),
        LiveStatus::LiveNow => (true, false, true),
        LiveStatus::Ended | LiveStatus::Unknown => (true, false, false),
    };

    BroadcastInfo {
        video_id: video_id.to_string(),
        title: format!("title of {video_id}"),
        thumbnails: vec![Thumbnail {
            url: format!("https://img.test/{video_id}.jpg"),
            width: 120,
            height: 90,
        }],
        is_live_content,
        is_upcoming,
        is_live,
        ..Default::default()
    }
}

pub async fn eventually(what: &str, mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

/// Prober answering from a table; unknown IDs fail like an unavailable video.
#[derive(Default)]
pub struct FakeProber {
    statuses: Mutex<HashMap<String, LiveStatus>>,
    probes: AtomicUsize,
    gate: RwLock<()>,
}

impl FakeProber {
    pub fn set(&self, video_id: &str, status: LiveStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(video_id.to_string(), status);
    }

    pub fn fail(&self, video_id: &str) {
        self.statuses.lock().unwrap().remove(video_id);
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Park every probe after it is counted until the guard drops.
    pub async fn hold(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }
}

#[async_trait]
impl Prober for FakeProber {
    async fn probe(&self, video_id: &str) -> Result<BroadcastInfo, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        drop(self.gate.read().await);
        let status = self.statuses.lock().unwrap().get(video_id).copied();
        match status {
            Some(status) => Ok(broadcast(video_id, status)),
            None => Err(ProbeError::Platform("video unavailable".to_string())),
        }
    }

    async fn fetch_thumbnail(&self, _url: &str) -> Result<Vec<u8>, ProbeError> {
        Ok(vec![0xFF, 0xD8])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Say(u64, String),
    React(MessageRef, String),
    Close,
}

/// Notifier that records every outbound call in order.
#[derive(Default)]
pub struct FakeNotifier {
    events: Mutex<Vec<Event>>,
}

impl FakeNotifier {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn said(&self, text: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Say(_, t) if t == text))
            .count()
    }

    pub fn reactions(&self) -> Vec<(MessageRef, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::React(message, emoji) => Some((message, emoji)),
                _ => None,
            })
            .collect()
    }

    pub async fn wait_for(&self, text: &str, count: usize) {
        eventually(text, || self.said(text) >= count).await;
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn say(&self, channel_id: u64, text: &str) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(Event::Say(channel_id, text.to_string()));
        Ok(())
    }

    async fn react(&self, message: MessageRef, emoji: &str) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(Event::React(message, emoji.to_string()));
        Ok(())
    }

    async fn close(&self) {
        self.events.lock().unwrap().push(Event::Close);
    }
}

/// Recorder that runs until cancelled or until `finish` fires.
#[derive(Default)]
pub struct FakeRecorder {
    active: AtomicUsize,
    pub finish: CancellationToken,
    started: Mutex<Vec<String>>,
}

impl FakeRecorder {
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn wait_active(&self, count: usize) {
        eventually("recorder activity", || self.active() == count).await;
    }
}

#[async_trait]
impl Recorder for FakeRecorder {
    async fn record(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError> {
        self.started.lock().unwrap().push(video_id.to_string());
        self.active.fetch_add(1, Ordering::SeqCst);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => CaptureOutcome::Interrupted,
            _ = self.finish.cancelled() => CaptureOutcome::Completed,
        };
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(outcome)
    }
}
