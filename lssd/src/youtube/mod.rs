pub mod info;
pub mod probe;
pub mod video_id;

pub use info::{BroadcastInfo, LiveStatus};
pub use probe::{HttpProber, ProbeError, Prober};
pub use video_id::extract_video_id;

/// Watch page URL handed to the stream-puller.
pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}
