use anyhow::Result;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};

mod probe;
mod serve;

pub use probe::ProbeCommand;
pub use serve::ServeCommand;

#[derive(Parser, Debug)]
#[command(name = "lssd")]
#[command(about = "Live stream recorder driven by chat commands")]
pub struct Args {
    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "LSSD_LOG", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the recorder, chat bot and file browser (default)
    Serve(ServeCommand),
    /// Fetch and print the current state of one broadcast
    Probe(ProbeCommand),
}

impl Args {
    pub async fn run(self) -> Result<()> {
        init_tracing(&self.log_level);

        let command = match self.command {
            Some(command) => command,
            None => serve_from_env(ServeCommand::command())?,
        };

        match command {
            Command::Serve(cmd) => cmd.run().await,
            Command::Probe(cmd) => cmd.run().await,
        }
    }
}

/// Without a subcommand the serve settings come from the environment.
fn serve_from_env(command: clap::Command) -> Result<Command> {
    let matches = command.try_get_matches_from(["lssd"])?;
    Ok(Command::Serve(ServeCommand::from_arg_matches(&matches)?))
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lssd={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
