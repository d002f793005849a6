use anyhow::Result;
use clap::Parser;

mod capture;
mod chat;
mod cli;
mod server;
mod supervisor;
#[cfg(test)]
mod testing;
mod youtube;

#[tokio::main]
async fn main() -> Result<()> {
    cli::Args::parse().run().await
}
