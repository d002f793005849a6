use std::sync::Arc;

use tracing::{error, info, warn};

use super::{ACK_EMOJI, ChatCommand, MessageRef, Notifier, format_list};
use crate::supervisor::{LiveStream, Supervisor, SupervisorError};
use crate::youtube::extract_video_id;

/// Turns chat commands into supervisor calls and replies.
pub struct CommandHandler {
    supervisor: Arc<Supervisor>,
    notifier: Arc<dyn Notifier>,
}

impl CommandHandler {
    pub fn new(supervisor: Arc<Supervisor>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            supervisor,
            notifier,
        }
    }

    /// Handle one incoming message; anything that is not a command is ignored.
    pub async fn handle(&self, origin: MessageRef, content: &str) {
        let Some(command) = ChatCommand::parse(content) else {
            return;
        };

        match command {
            ChatCommand::Add(argument) => self.add(origin, &argument).await,
            ChatCommand::Cancel(argument) => self.cancel(origin, &argument).await,
            ChatCommand::List => self.list(origin).await,
        }
    }

    async fn add(&self, origin: MessageRef, argument: &str) {
        let Some(video_id) = self.video_id_or_reply(origin, argument).await else {
            return;
        };

        let info = match self.supervisor.prober().probe(&video_id).await {
            Ok(info) => info,
            Err(e) => {
                error!(video_id = %video_id, error = %e, "failed to probe broadcast");
                return;
            }
        };

        match self
            .supervisor
            .add(LiveStream::new(video_id.clone(), info, origin))
            .await
        {
            Ok(_) => self.acknowledge(origin).await,
            Err(SupervisorError::ShuttingDown) => {
                info!(video_id = %video_id, "ignored add during shutdown")
            }
            Err(e) => {
                info!(video_id = %video_id, reason = %e, "add rejected");
                self.reply(origin, &e.to_string()).await;
            }
        }
    }

    async fn cancel(&self, origin: MessageRef, argument: &str) {
        let Some(video_id) = self.video_id_or_reply(origin, argument).await else {
            return;
        };

        self.supervisor.cancel(&video_id).await;
        self.acknowledge(origin).await;
    }

    async fn list(&self, origin: MessageRef) {
        let streams = self.supervisor.list().await;
        self.reply(origin, &format_list(&streams)).await;
    }

    async fn video_id_or_reply(&self, origin: MessageRef, argument: &str) -> Option<String> {
        let video_id = extract_video_id(argument);
        if video_id.is_empty() {
            info!(argument, "invalid live url");
            self.reply(origin, &format!("invalid live url: {argument}"))
                .await;
            return None;
        }
        Some(video_id)
    }

    async fn reply(&self, origin: MessageRef, text: &str) {
        if let Err(e) = self.notifier.say(origin.channel_id, text).await {
            warn!(channel_id = origin.channel_id, error = %e, "failed to send reply");
        }
    }

    async fn acknowledge(&self, origin: MessageRef) {
        if let Err(e) = self.notifier.react(origin, ACK_EMOJI).await {
            warn!(message_id = origin.message_id, error = %e, "failed to add reaction");
        }
    }
}
