use std::sync::{Arc, OnceLock};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serenity::all::{
    ChannelId, Client, Context, EventHandler, GatewayIntents, Http, Message, MessageId,
    ReactionType, Ready, ShardManager,
};
use tracing::{debug, info};

use super::{CommandHandler, MessageRef, Notifier};

/// Gateway events the bot listens to: guild messages and reactions.
fn intents() -> GatewayIntents {
    GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
        | GatewayIntents::MESSAGE_CONTENT
}

/// Discord REST client used for replies and reactions.
pub struct DiscordNotifier {
    http: Arc<Http>,
    shards: OnceLock<Arc<ShardManager>>,
}

impl DiscordNotifier {
    pub fn new(token: &str) -> Self {
        Self {
            http: Arc::new(Http::new(token)),
            shards: OnceLock::new(),
        }
    }

    fn attach(&self, shards: Arc<ShardManager>) {
        let _ = self.shards.set(shards);
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn say(&self, channel_id: u64, text: &str) -> Result<()> {
        ChannelId::new(channel_id)
            .say(self.http.as_ref(), text)
            .await
            .with_context(|| format!("failed to send message to channel {channel_id}"))?;
        Ok(())
    }

    async fn react(&self, message: MessageRef, emoji: &str) -> Result<()> {
        self.http
            .create_reaction(
                ChannelId::new(message.channel_id),
                MessageId::new(message.message_id),
                &ReactionType::Unicode(emoji.to_string()),
            )
            .await
            .with_context(|| format!("failed to react to message {}", message.message_id))?;
        Ok(())
    }

    async fn close(&self) {
        if let Some(shards) = self.shards.get() {
            info!("closing discord gateway");
            shards.shutdown_all().await;
        }
    }
}

struct GatewayEvents {
    commands: Arc<CommandHandler>,
}

#[async_trait]
impl EventHandler for GatewayEvents {
    async fn message(&self, ctx: Context, msg: Message) {
        let own_id = ctx.cache.current_user().id;
        if msg.author.id == own_id {
            return;
        }

        debug!(channel_id = msg.channel_id.get(), content = %msg.content, "message received");
        let origin = MessageRef::new(msg.channel_id.get(), msg.id.get());
        self.commands.handle(origin, &msg.content).await;
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "connected to discord");
    }
}

/// Connected gateway client dispatching messages to a [`CommandHandler`].
pub struct DiscordGateway {
    client: Client,
}

impl DiscordGateway {
    pub async fn connect(
        token: &str,
        commands: Arc<CommandHandler>,
        notifier: &DiscordNotifier,
    ) -> Result<Self> {
        let client = Client::builder(token, intents())
            .event_handler(GatewayEvents { commands })
            .await
            .context("failed to create discord client")?;

        notifier.attach(client.shard_manager.clone());
        Ok(Self { client })
    }

    /// Run the gateway until its shards are shut down.
    pub async fn run(mut self) -> Result<()> {
        self.client
            .start()
            .await
            .context("discord gateway failed")
    }
}
