use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::capture::{CaptureRunner, CaptureTools, RecordFormat};
use crate::chat::{CommandHandler, DiscordGateway, DiscordNotifier};
use crate::supervisor::{DEFAULT_POLL_INTERVAL, Supervisor, SupervisorConfig};
use crate::youtube::HttpProber;
use crate::youtube::probe::DEFAULT_BASE_URL;

const GATEWAY_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
pub struct ServeCommand {
    /// Directory recordings, logs and thumbnails are written to
    #[arg(long, env = "RECORD_DIR")]
    pub record_dir: PathBuf,

    /// Discord bot token
    #[arg(long, env = "DISCORD_BOT_TOKEN", hide_env_values = true)]
    pub discord_bot_token: String,

    /// Output container; only "mp4" selects the remux pipeline
    #[arg(long, env = "RECORD_FORMAT", default_value = "ts")]
    pub record_format: String,

    /// File browser port
    #[arg(short, long, env = "LSSD_PORT", default_value = "8080")]
    pub port: u16,

    /// Seconds between checks of queued broadcasts
    #[arg(long, env = "LSSD_POLL_INTERVAL", default_value = "10")]
    pub poll_interval: u64,

    /// Stream-puller program
    #[arg(long, env = "LSSD_STREAMLINK", default_value = "streamlink")]
    pub streamlink: PathBuf,

    /// Muxer program used for MP4 output
    #[arg(long, env = "LSSD_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,
}

impl ServeCommand {
    pub async fn run(self) -> Result<()> {
        tokio::fs::create_dir_all(&self.record_dir)
            .await
            .with_context(|| format!("failed to create {}", self.record_dir.display()))?;

        let format = RecordFormat::from_setting(&self.record_format);
        info!(record_dir = %self.record_dir.display(), %format, "starting lssd");

        // Core state
        let prober = Arc::new(HttpProber::new(DEFAULT_BASE_URL)?);
        let recorder = Arc::new(CaptureRunner::new(
            self.record_dir.clone(),
            format,
            CaptureTools {
                streamlink: self.streamlink,
                ffmpeg: self.ffmpeg,
            },
        ));
        let notifier = Arc::new(DiscordNotifier::new(&self.discord_bot_token));
        let poll_interval = match self.poll_interval {
            0 => DEFAULT_POLL_INTERVAL,
            secs => Duration::from_secs(secs),
        };
        let supervisor = Supervisor::new(
            SupervisorConfig {
                record_dir: self.record_dir.clone(),
                poll_interval,
            },
            prober,
            recorder,
            notifier.clone(),
        );

        // Chat gateway
        let commands = Arc::new(CommandHandler::new(
            Arc::clone(&supervisor),
            notifier.clone(),
        ));
        let gateway = DiscordGateway::connect(&self.discord_bot_token, commands, &notifier).await?;
        let mut gateway = tokio::spawn(gateway.run());

        supervisor.start_poller().await;

        // File browser
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let server = {
            let record_dir = self.record_dir.clone();
            let shutdown = supervisor.shutdown_token();
            tokio::spawn(async move {
                if let Err(e) = crate::server::run_server(addr, record_dir, shutdown).await {
                    error!(error = %e, "file browser failed");
                }
            })
        };

        info!("lssd has started");

        let failure = tokio::select! {
            received = shutdown_signal() => match received {
                Ok(name) => {
                    info!(signal = name, "signal received");
                    None
                }
                Err(e) => Some(e.context("failed to listen for signals")),
            },
            joined = &mut gateway => Some(gateway_failure(joined)),
        };

        if let Some(e) = &failure {
            error!(error = %e, "shutting down after failure");
        }

        supervisor.shutdown().await;

        if failure.is_none() {
            match tokio::time::timeout(GATEWAY_CLOSE_TIMEOUT, gateway).await {
                Ok(Ok(Ok(()))) => {}
                Ok(joined) => warn!(error = %gateway_failure(joined), "discord gateway closed with error"),
                Err(_) => warn!("discord gateway did not close in time"),
            }
        }

        if let Err(e) = server.await {
            warn!(error = %e, "file browser task failed");
        }

        info!("lssd stopped");
        failure.map_or(Ok(()), Err)
    }
}

fn gateway_failure(joined: Result<Result<()>, JoinError>) -> anyhow::Error {
    match joined {
        Ok(Ok(())) => anyhow!("discord gateway closed unexpectedly"),
        Ok(Err(e)) => e,
        Err(e) => anyhow::Error::new(e).context("discord gateway task failed"),
    }
}

/// Wait for SIGINT or SIGTERM and return the signal's name.
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT")
            }
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("Ctrl+C")
    }
}
