use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::info::BroadcastInfo;

/// Platform host serving the legacy video-info endpoint.
pub const DEFAULT_BASE_URL: &str = "https://youtube.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("platform error: {0}")]
    Platform(String),
    #[error("thumbnail error: {0}")]
    Thumbnail(String),
}

/// Source of broadcast metadata and thumbnails.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Fetch the current state of a broadcast.
    async fn probe(&self, video_id: &str) -> Result<BroadcastInfo, ProbeError>;

    /// Download a thumbnail image.
    async fn fetch_thumbnail(&self, url: &str) -> Result<Vec<u8>, ProbeError>;
}

/// Form fields returned by `get_video_info`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VideoInfoForm {
    status: Option<String>,
    reason: Option<String>,
    player_response: Option<String>,
}

/// Prober backed by the platform's HTTP endpoints.
pub struct HttpProber {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProber {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn video_info_url(&self, video_id: &str) -> String {
        format!(
            "{}/get_video_info?video_id={video_id}&eurl=https://youtube.googleapis.com/v/{video_id}",
            self.base_url
        )
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, video_id: &str) -> Result<BroadcastInfo, ProbeError> {
        let body = self
            .client
            .get(self.video_info_url(video_id))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_video_info(&body)
    }

    async fn fetch_thumbnail(&self, url: &str) -> Result<Vec<u8>, ProbeError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(ProbeError::Thumbnail(format!(
                "failed to request thumbnail: HTTP {}",
                response.status()
            )));
        }

        let data = response.bytes().await?;
        Ok(data.to_vec())
    }
}

/// Decode a form-encoded `get_video_info` body into a broadcast snapshot.
fn parse_video_info(body: &str) -> Result<BroadcastInfo, ProbeError> {
    let form: VideoInfoForm =
        serde_urlencoded::from_str(body).map_err(|e| ProbeError::Decode(e.to_string()))?;

    if form.status.as_deref() != Some("ok") {
        return Err(ProbeError::Platform(format!(
            "failed to get player_response: {}",
            form.reason.unwrap_or_default()
        )));
    }

    let player_response = form
        .player_response
        .ok_or_else(|| ProbeError::Decode("missing player_response".to_string()))?;

    let info = BroadcastInfo::from_player_response(&player_response)
        .map_err(|e| ProbeError::Decode(e.to_string()))?;

    if info.playability.is_error() {
        return Err(ProbeError::Platform(format!(
            "failed to get video info: {}",
            info.playability.reason.clone().unwrap_or_default()
        )));
    }

    Ok(info)
}
