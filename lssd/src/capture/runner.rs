use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::command::{CaptureTools, PullerOutput, RecordFormat, RecordPaths};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to create log file {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with {status}")]
    ChildFailure { program: String, status: ExitStatus },
    #[error("failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// How a capture ended when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// The children exited on their own with success.
    Completed,
    /// The cancellation fired and the children were interrupted.
    Interrupted,
}

/// Runs one capture of a broadcast until it ends or `cancel` fires.
#[async_trait]
pub trait Recorder: Send + Sync {
    async fn record(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError>;
}

/// Capture runner driving the external stream-puller and muxer.
pub struct CaptureRunner {
    record_dir: PathBuf,
    format: RecordFormat,
    tools: CaptureTools,
}

impl CaptureRunner {
    pub fn new(record_dir: PathBuf, format: RecordFormat, tools: CaptureTools) -> Self {
        Self {
            record_dir,
            format,
            tools,
        }
    }

    /// Single-process capture: the stream-puller writes `{id}.ts` itself.
    pub async fn record_ts(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError> {
        let paths = RecordPaths::new(&self.record_dir, video_id);
        let log_path = paths.ts_log();
        let log = create_log(&log_path).await?;
        let log_err = log.try_clone().map_err(|source| CaptureError::Log {
            path: log_path.clone(),
            source,
        })?;

        let program = self.tools.puller_name();
        let mut cmd = self
            .tools
            .puller_command(video_id, PullerOutput::File(&paths.ts_media()));
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        let child = spawn(&mut cmd, &program)?;
        drop(cmd);

        let scope = cancel.child_token();
        let _release = scope.clone().drop_guard();

        info!(video_id, "capture started (ts)");
        let status = supervise(child, &program, &scope).await?;

        conclude(&scope, &[(program, status)])
    }

    /// Two-process capture: stream-puller stdout piped into the muxer writing `{id}.ts.mp4`.
    pub async fn record_mp4(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError> {
        let paths = RecordPaths::new(&self.record_dir, video_id);
        let puller_log = create_log(&paths.puller_log()).await?;
        let muxer_log_path = paths.muxer_log();
        let muxer_log = create_log(&muxer_log_path).await?;
        let muxer_log_err = muxer_log.try_clone().map_err(|source| CaptureError::Log {
            path: muxer_log_path.clone(),
            source,
        })?;

        let puller_name = self.tools.puller_name();
        let muxer_name = self.tools.muxer_name();

        let mut puller_cmd = self.tools.puller_command(video_id, PullerOutput::Stdout);
        puller_cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::from(puller_log));
        let mut puller = spawn(&mut puller_cmd, &puller_name)?;
        drop(puller_cmd);

        let pipe = match puller.stdout.take() {
            Some(stdout) => TryInto::<Stdio>::try_into(stdout),
            None => Err(io::Error::other("stream-puller stdout was not captured")),
        };
        let pipe = match pipe {
            Ok(pipe) => pipe,
            Err(source) => {
                terminate(&mut puller, &puller_name).await;
                return Err(CaptureError::Launch {
                    program: muxer_name,
                    source,
                });
            }
        };

        let mut muxer_cmd = self.tools.muxer_command(&paths.mp4_media());
        muxer_cmd
            .stdin(pipe)
            .stdout(Stdio::from(muxer_log))
            .stderr(Stdio::from(muxer_log_err));
        let muxer = match spawn(&mut muxer_cmd, &muxer_name) {
            Ok(child) => child,
            Err(e) => {
                terminate(&mut puller, &puller_name).await;
                return Err(e);
            }
        };
        // Drops the parent's handle on the read end of the pipe.
        drop(muxer_cmd);

        let scope = cancel.child_token();
        let _release = scope.clone().drop_guard();

        info!(video_id, "capture started (mp4)");
        let (puller_status, muxer_status) = tokio::join!(
            supervise(puller, &puller_name, &scope),
            supervise(muxer, &muxer_name, &scope),
        );

        conclude(
            &scope,
            &[(puller_name, puller_status?), (muxer_name, muxer_status?)],
        )
    }
}

#[async_trait]
impl Recorder for CaptureRunner {
    async fn record(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CaptureOutcome, CaptureError> {
        match self.format {
            RecordFormat::Ts => self.record_ts(video_id, cancel).await,
            RecordFormat::Mp4 => self.record_mp4(video_id, cancel).await,
        }
    }
}

async fn create_log(path: &Path) -> Result<std::fs::File, CaptureError> {
    let file = tokio::fs::File::create(path)
        .await
        .map_err(|source| CaptureError::Log {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(file.into_std().await)
}

fn spawn(cmd: &mut Command, program: &str) -> Result<Child, CaptureError> {
    cmd.spawn().map_err(|source| CaptureError::Launch {
        program: program.to_string(),
        source,
    })
}

/// Wait for a child, interrupting it if `cancel` fires first.
///
/// The interrupt is only sent while the child is still unreaped.
async fn supervise(
    mut child: Child,
    program: &str,
    cancel: &CancellationToken,
) -> Result<ExitStatus, CaptureError> {
    let status = tokio::select! {
        biased;
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            interrupt(&mut child, program);
            child.wait().await
        }
    };

    status.map_err(|source| CaptureError::Wait {
        program: program.to_string(),
        source,
    })
}

/// Deliver SIGINT so the tools can flush and close their outputs.
#[cfg(unix)]
fn interrupt(child: &mut Child, program: &str) {
    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };

    // SAFETY: kill(2) has no memory-safety preconditions; `pid` belongs to an
    // unreaped child of this process so it cannot have been recycled.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    if rc != 0 {
        warn!(
            program,
            pid,
            error = %io::Error::last_os_error(),
            "failed to interrupt child"
        );
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child, program: &str) {
    if let Err(e) = child.start_kill() {
        warn!(program, error = %e, "failed to stop child");
    }
}

/// Forcefully stop a child that can no longer do useful work, and reap it.
async fn terminate(child: &mut Child, program: &str) {
    if let Err(e) = child.start_kill() {
        warn!(program, error = %e, "failed to kill child");
    }
    if let Err(e) = child.wait().await {
        warn!(program, error = %e, "failed to reap child");
    }
}

fn conclude(
    scope: &CancellationToken,
    statuses: &[(String, ExitStatus)],
) -> Result<CaptureOutcome, CaptureError> {
    if scope.is_cancelled() {
        return Ok(CaptureOutcome::Interrupted);
    }

    match statuses.iter().find(|(_, status)| !status.success()) {
        Some((program, status)) => Err(CaptureError::ChildFailure {
            program: program.clone(),
            status: *status,
        }),
        None => Ok(CaptureOutcome::Completed),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    use super::*;

    const VIDEO_ID: &str = "dQw4w9WgXcQ";

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    struct Fixture {
        _tools_dir: tempfile::TempDir,
        record_dir: tempfile::TempDir,
        tools: CaptureTools,
    }

    fn fixture(puller: &str, muxer: &str) -> Fixture {
        let tools_dir = tempfile::tempdir().unwrap();
        let record_dir = tempfile::tempdir().unwrap();
        let tools = CaptureTools {
            streamlink: write_script(tools_dir.path(), "streamlink", puller),
            ffmpeg: write_script(tools_dir.path(), "ffmpeg", muxer),
        };
        Fixture {
            _tools_dir: tools_dir,
            record_dir,
            tools,
        }
    }

    impl Fixture {
        fn runner(&self, format: RecordFormat) -> CaptureRunner {
            CaptureRunner::new(
                self.record_dir.path().to_path_buf(),
                format,
                self.tools.clone(),
            )
        }

        fn read(&self, name: &str) -> String {
            std::fs::read_to_string(self.record_dir.path().join(name)).unwrap()
        }
    }

    #[tokio::test]
    async fn test_ts_capture_writes_log_with_arguments() {
        let fx = fixture(r#"echo "$@""#, "exit 0");
        let cancel = CancellationToken::new();

        let outcome = fx
            .runner(RecordFormat::Ts)
            .record(VIDEO_ID, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Completed);
        let log = fx.read("dQw4w9WgXcQ.ts.log");
        let expected = format!(
            "--loglevel info --hls-live-restart -o {}/dQw4w9WgXcQ.ts https://www.youtube.com/watch?v=dQw4w9WgXcQ best",
            fx.record_dir.path().display()
        );
        assert_eq!(log.trim(), expected);
    }

    #[tokio::test]
    async fn test_ts_capture_reports_child_failure() {
        let fx = fixture("echo oops >&2; exit 3", "exit 0");
        let cancel = CancellationToken::new();

        let err = fx
            .runner(RecordFormat::Ts)
            .record_ts(VIDEO_ID, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::ChildFailure { ref status, .. } if status.code() == Some(3)));
        assert_eq!(fx.read("dQw4w9WgXcQ.ts.log").trim(), "oops");
    }

    #[tokio::test]
    async fn test_ts_capture_interrupted_by_cancel() {
        let fx = fixture("exec sleep 30", "exit 0");
        let runner = fx.runner(RecordFormat::Ts);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(10), runner.record_ts(VIDEO_ID, &cancel))
            .await
            .expect("capture should stop after cancellation")
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Interrupted);
    }

    #[tokio::test]
    async fn test_subordinate_scope_does_not_cancel_parent() {
        let fx = fixture("exit 0", "exit 0");
        let cancel = CancellationToken::new();

        fx.runner(RecordFormat::Ts)
            .record_ts(VIDEO_ID, &cancel)
            .await
            .unwrap();

        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_mp4_capture_pipes_puller_into_muxer() {
        let fx = fixture("echo payload; echo progress >&2", "exec cat");
        let cancel = CancellationToken::new();

        let outcome = fx
            .runner(RecordFormat::Mp4)
            .record(VIDEO_ID, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Completed);
        assert_eq!(fx.read("dQw4w9WgXcQ.ts.1.log"), "payload\n");
        assert_eq!(fx.read("dQw4w9WgXcQ.ts.0.log"), "progress\n");
    }

    #[tokio::test]
    async fn test_mp4_capture_interrupts_both_children() {
        let fx = fixture("exec sleep 30", "exec sleep 30");
        let runner = fx.runner(RecordFormat::Mp4);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(10), runner.record_mp4(VIDEO_ID, &cancel))
            .await
            .expect("both children should stop after cancellation")
            .unwrap();

        assert_eq!(outcome, CaptureOutcome::Interrupted);
    }

    #[tokio::test]
    async fn test_mp4_muxer_launch_failure_stops_puller() {
        let mut fx = fixture("exec sleep 30", "exit 0");
        fx.tools.ffmpeg = fx.record_dir.path().join("missing-ffmpeg");
        let cancel = CancellationToken::new();

        let err = tokio::time::timeout(
            Duration::from_secs(10),
            fx.runner(RecordFormat::Mp4).record_mp4(VIDEO_ID, &cancel),
        )
        .await
        .expect("puller should be terminated when the muxer cannot start")
        .unwrap_err();

        assert!(matches!(err, CaptureError::Launch { ref program, .. } if program.ends_with("missing-ffmpeg")));
    }

    #[tokio::test]
    async fn test_puller_launch_failure() {
        let mut fx = fixture("exit 0", "exit 0");
        fx.tools.streamlink = fx.record_dir.path().join("missing-streamlink");
        let cancel = CancellationToken::new();

        let err = fx
            .runner(RecordFormat::Ts)
            .record_ts(VIDEO_ID, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::Launch { .. }));
    }

    #[tokio::test]
    async fn test_log_creation_failure() {
        let fx = fixture("exit 0", "exit 0");
        let runner = CaptureRunner::new(
            fx.record_dir.path().join("does/not/exist"),
            RecordFormat::Mp4,
            fx.tools.clone(),
        );
        let cancel = CancellationToken::new();

        let err = runner.record(VIDEO_ID, &cancel).await.unwrap_err();

        assert!(matches!(err, CaptureError::Log { .. }));
    }
}
