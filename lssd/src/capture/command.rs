use std::fmt;
use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::youtube::watch_url;

/// Container written by a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    /// Raw MPEG-TS written directly by the stream-puller.
    Ts,
    /// Stream-puller piped into the muxer, remuxed to MP4 without re-encoding.
    Mp4,
}

impl RecordFormat {
    /// Only the exact string `mp4` selects MP4 output.
    pub fn from_setting(value: &str) -> Self {
        if value == "mp4" {
            RecordFormat::Mp4
        } else {
            RecordFormat::Ts
        }
    }
}

impl fmt::Display for RecordFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordFormat::Ts => f.write_str("ts"),
            RecordFormat::Mp4 => f.write_str("mp4"),
        }
    }
}

/// Where the stream-puller writes its media payload.
#[derive(Debug, Clone, Copy)]
pub enum PullerOutput<'a> {
    File(&'a Path),
    Stdout,
}

/// External programs used for a capture, resolved through `PATH` when not absolute.
#[derive(Debug, Clone)]
pub struct CaptureTools {
    pub streamlink: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Default for CaptureTools {
    fn default() -> Self {
        Self {
            streamlink: PathBuf::from("streamlink"),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

impl CaptureTools {
    pub fn puller_name(&self) -> String {
        self.streamlink.display().to_string()
    }

    pub fn muxer_name(&self) -> String {
        self.ffmpeg.display().to_string()
    }

    /// Build the stream-puller invocation for a broadcast.
    pub fn puller_command(&self, video_id: &str, output: PullerOutput<'_>) -> Command {
        let mut cmd = Command::new(&self.streamlink);
        cmd.arg("--loglevel").arg("info").arg("--hls-live-restart");

        match output {
            PullerOutput::File(path) => {
                cmd.arg("-o").arg(path);
            }
            PullerOutput::Stdout => {
                cmd.arg("-O");
            }
        }

        cmd.arg(watch_url(video_id)).arg("best");
        cmd.kill_on_drop(true);
        cmd
    }

    /// Build the muxer invocation reading the stream from stdin.
    pub fn muxer_command(&self, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-i").arg("-").arg("-c").arg("copy").arg(output);
        cmd.kill_on_drop(true);
        cmd
    }
}

/// File names produced by one capture, all derived from the broadcast ID.
#[derive(Debug, Clone)]
pub struct RecordPaths {
    dir: PathBuf,
    stem: String,
}

impl RecordPaths {
    pub fn new(dir: &Path, video_id: &str) -> Self {
        Self {
            dir: dir.to_path_buf(),
            stem: format!("{video_id}.ts"),
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.stem, suffix))
    }

    /// `{id}.ts`
    pub fn ts_media(&self) -> PathBuf {
        self.with_suffix("")
    }

    /// `{id}.ts.log`
    pub fn ts_log(&self) -> PathBuf {
        self.with_suffix(".log")
    }

    /// `{id}.ts.mp4`
    pub fn mp4_media(&self) -> PathBuf {
        self.with_suffix(".mp4")
    }

    /// `{id}.ts.0.log`
    pub fn puller_log(&self) -> PathBuf {
        self.with_suffix(".0.log")
    }

    /// `{id}.ts.1.log`
    pub fn muxer_log(&self) -> PathBuf {
        self.with_suffix(".1.log")
    }
}

/// `{id}.jpg` next to the capture.
pub fn thumbnail_path(dir: &Path, video_id: &str) -> PathBuf {
    dir.join(format!("{video_id}.jpg"))
}
