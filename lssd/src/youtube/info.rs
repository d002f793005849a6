use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Live state of a broadcast, derived from the player response flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveStatus {
    NonLiveContent,
    Upcoming,
    LiveNow,
    Ended,
    Unknown,
}

impl fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LiveStatus::NonLiveContent => "non-live content",
            LiveStatus::Upcoming => "upcoming",
            LiveStatus::LiveNow => "live now",
            LiveStatus::Ended => "ended",
            LiveStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A thumbnail reference as listed by the platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Playability block of the player response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Playability {
    /// `OK`, `LIVE_STREAM_OFFLINE`, `ERROR`, ...
    pub status: String,
    pub reason: Option<String>,
}

impl Playability {
    pub fn is_error(&self) -> bool {
        self.status == "ERROR"
    }
}

/// Snapshot of a broadcast at one probe time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastInfo {
    pub video_id: String,
    pub title: String,
    pub channel_id: String,
    pub author: String,
    /// Thumbnails in platform order. Index 0 is the one saved next to a capture.
    pub thumbnails: Vec<Thumbnail>,
    pub is_live_content: bool,
    pub is_upcoming: bool,
    pub is_live: bool,
    pub playability: Playability,
    /// `isLiveNow` from the broadcast details; informational only.
    pub is_live_now: bool,
    pub scheduled_start: Option<DateTime<Utc>>,
    pub scheduled_end: Option<DateTime<Utc>>,
    pub length_seconds: Option<u64>,
}

impl BroadcastInfo {
    /// Parse the embedded `player_response` JSON document.
    pub fn from_player_response(json: &str) -> Result<Self, serde_json::Error> {
        let raw: PlayerResponse = serde_json::from_str(json)?;
        Ok(raw.into())
    }

    pub fn live_status(&self) -> LiveStatus {
        if !self.is_live_content {
            return LiveStatus::NonLiveContent;
        }
        match (self.is_upcoming, self.is_live) {
            (true, _) => LiveStatus::Upcoming,
            (false, true) => LiveStatus::LiveNow,
            (false, false) => LiveStatus::Ended,
        }
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.thumbnails
            .first()
            .map(|t| t.url.as_str())
            .filter(|url| !url.is_empty())
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PlayerResponse {
    playability_status: RawPlayability,
    video_details: RawVideoDetails,
    microformat: RawMicroformat,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlayability {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawVideoDetails {
    video_id: String,
    title: String,
    channel_id: String,
    author: String,
    thumbnail: ThumbnailList,
    is_live_content: bool,
    is_upcoming: bool,
    is_live: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ThumbnailList {
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMicroformat {
    player_microformat_renderer: RawMicroformatRenderer,
    live_broadcast_details: Option<RawBroadcastDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMicroformatRenderer {
    length_seconds: Option<String>,
    live_broadcast_details: Option<RawBroadcastDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawBroadcastDetails {
    is_live_now: bool,
    start_timestamp: Option<String>,
    end_timestamp: Option<String>,
}

impl From<PlayerResponse> for BroadcastInfo {
    fn from(raw: PlayerResponse) -> Self {
        let details = raw.video_details;
        let renderer = raw.microformat.player_microformat_renderer;
        // Older responses carry the details beside the renderer, newer ones inside it.
        let broadcast = raw
            .microformat
            .live_broadcast_details
            .or(renderer.live_broadcast_details)
            .unwrap_or_default();

        Self {
            video_id: details.video_id,
            title: details.title,
            channel_id: details.channel_id,
            author: details.author,
            thumbnails: details.thumbnail.thumbnails,
            is_live_content: details.is_live_content,
            is_upcoming: details.is_upcoming,
            is_live: details.is_live,
            playability: Playability {
                status: raw.playability_status.status,
                reason: raw.playability_status.reason,
            },
            is_live_now: broadcast.is_live_now,
            scheduled_start: broadcast.start_timestamp.as_deref().and_then(parse_timestamp),
            scheduled_end: broadcast.end_timestamp.as_deref().and_then(parse_timestamp),
            length_seconds: renderer.length_seconds.and_then(|s| s.trim().parse().ok()),
        }
    }
}

/// Parse an RFC 3339 timestamp or a second-precision epoch string.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let secs = trimmed.parse::<i64>().ok()?;
        return Utc.timestamp_opt(secs, 0).single();
    }

    None
}
