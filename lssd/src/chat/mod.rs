pub mod command;
pub mod discord;
pub mod handler;

use anyhow::Result;
use async_trait::async_trait;

pub use command::{ChatCommand, format_list};
pub use discord::{DiscordGateway, DiscordNotifier};
pub use handler::CommandHandler;

/// Reaction added to a command message once it has been handled.
pub const ACK_EMOJI: &str = "🆗";

/// Coordinates of the chat message a broadcast was nominated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

impl MessageRef {
    pub fn new(channel_id: u64, message_id: u64) -> Self {
        Self {
            channel_id,
            message_id,
        }
    }
}

/// Outbound side of the chat service.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a text message to a channel.
    async fn say(&self, channel_id: u64, text: &str) -> Result<()>;

    /// Add a reaction to a message.
    async fn react(&self, message: MessageRef, emoji: &str) -> Result<()>;

    /// Disconnect from the chat service.
    async fn close(&self);
}
