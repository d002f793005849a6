use anyhow::{Result, bail};
use clap::Parser;

use crate::youtube::probe::DEFAULT_BASE_URL;
use crate::youtube::{HttpProber, Prober, extract_video_id};

#[derive(Parser, Debug)]
pub struct ProbeCommand {
    /// Watch URL, short link or bare broadcast ID
    pub target: String,

    /// Platform base URL
    #[arg(long, default_value = DEFAULT_BASE_URL, hide = true)]
    pub base_url: String,
}

impl ProbeCommand {
    pub async fn run(self) -> Result<()> {
        let video_id = extract_video_id(&self.target);
        if video_id.is_empty() {
            bail!("invalid live url: {}", self.target);
        }

        let prober = HttpProber::new(self.base_url)?;
        let info = prober.probe(&video_id).await?;

        println!("Broadcast: {}", info.video_id);
        println!("  Title:    {}", info.title);
        println!("  Author:   {} ({})", info.author, info.channel_id);
        println!("  Status:   {}", info.live_status());
        if info.is_live_now {
            println!("  On air:   yes");
        }

        if let Some(start) = info.scheduled_start {
            println!("  Starts:   {}", start.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if let Some(end) = info.scheduled_end {
            println!("  Ended:    {}", end.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if let Some(length) = info.length_seconds {
            println!("  Length:   {length}s");
        }

        if info.thumbnails.is_empty() {
            println!("  Thumb:    (none)");
        }
        for thumbnail in &info.thumbnails {
            println!(
                "  Thumb:    {} ({}x{})",
                thumbnail.url, thumbnail.width, thumbnail.height
            );
        }

        Ok(())
    }
}
