//! Telegram long-polling adapter
//!
//! Receives messages with `getUpdates`, spawns one task per message and
//! replies to the original message through a [`TelegramReplySink`].

use crate::config::BotSection;
use crate::error::{sanitize_error_message, RelayError, RelayResult};
use crate::lifecycle_span;
use crate::observability::health::HealthServer;
use crate::observability::metrics::{current_timestamp, metrics};
use crate::protocol::messages::{IncomingMessage, SenderName};
use crate::relay::MessageProcessor;
use crate::transport::ReplySink;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, ChatAction, ChatId, Message, MessageId, ReplyParameters, UpdateKind,
};
use teloxide::{ApiError, RequestError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Reply capability bound to one Telegram message
#[derive(Clone)]
pub struct TelegramReplySink {
    bot: Bot,
    chat_id: ChatId,
    message_id: MessageId,
}

impl TelegramReplySink {
    pub fn new(bot: Bot, chat_id: ChatId, message_id: MessageId) -> Self {
        Self {
            bot,
            chat_id,
            message_id,
        }
    }
}

#[async_trait::async_trait]
impl ReplySink for TelegramReplySink {
    type Error = RequestError;

    async fn signal_typing(&self) -> Result<(), Self::Error> {
        self.bot
            .send_chat_action(self.chat_id, ChatAction::Typing)
            .await
            .map(|_| ())
    }

    async fn send_reply(&self, text: &str) -> Result<(), Self::Error> {
        self.bot
            .send_message(self.chat_id, text)
            .reply_parameters(reply_parameters(self.message_id))
            .await
            .map(|_| ())
    }
}

/// Reply to the original message, or send plainly if it has since been deleted
fn reply_parameters(message_id: MessageId) -> ReplyParameters {
    ReplyParameters::new(message_id).allow_sending_without_reply()
}

/// Convert a Telegram message into the relay's inbound form
///
/// Bot commands (text starting with `/`) are not relayed and yield `None`.
pub fn incoming_from_message(msg: &Message) -> Option<IncomingMessage> {
    let text = msg.text();
    if text.is_some_and(|t| t.starts_with('/')) {
        return None;
    }

    let sender = msg
        .from
        .as_ref()
        .map(|user| SenderName::new(user.first_name.clone(), user.last_name.clone()));

    Some(IncomingMessage {
        text: text.map(str::to_string),
        sender,
    })
}

/// Long-polling Telegram front end for the relay
pub struct TelegramAdapter {
    bot: Bot,
    processor: Arc<MessageProcessor>,
    poll_timeout_secs: u32,
    health: Option<Arc<HealthServer>>,
}

impl TelegramAdapter {
    pub fn new(
        token: &SecretString,
        processor: Arc<MessageProcessor>,
        config: &BotSection,
    ) -> RelayResult<Self> {
        // HTTP timeout must outlast the long-poll timeout
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
            .build()
            .map_err(|e| RelayError::transport(format!("Failed to build HTTP client: {e}")))?;
        let bot = Bot::with_client(token.expose_secret(), client);

        Ok(Self {
            bot,
            processor,
            poll_timeout_secs: config.poll_timeout_secs,
            health: None,
        })
    }

    pub fn with_health(mut self, health: Arc<HealthServer>) -> Self {
        self.health = Some(health);
        self
    }

    /// Verify the token and clear any webhook so polling works
    pub async fn connect(&self) -> RelayResult<()> {
        let me = self.bot.get_me().await.map_err(request_error)?;
        self.bot
            .delete_webhook()
            .send()
            .await
            .map_err(request_error)?;

        info!(username = ?me.username, "Telegram bot connected (webhook cleared)");
        Ok(())
    }

    /// Poll for updates until `cancel` fires
    ///
    /// In-flight message tasks are given a short grace period on shutdown.
    pub async fn run(self, cancel: CancellationToken) -> RelayResult<()> {
        let span = lifecycle_span!(component = "telegram");
        self.connect().instrument(span.clone()).await?;
        self.set_connected(true);

        let mut tasks = JoinSet::new();
        let mut offset: i32 = 0;

        let result = async {
            info!("Starting Telegram polling loop");
            loop {
                while let Some(joined) = tasks.try_join_next() {
                    log_task_result(joined);
                }

                let request = self
                    .bot
                    .get_updates()
                    .offset(offset)
                    .timeout(self.poll_timeout_secs)
                    .allowed_updates(vec![AllowedUpdate::Message]);

                let updates = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Telegram polling stopped");
                        return Ok::<(), RelayError>(());
                    }
                    result = request.send() => result,
                };

                match updates {
                    Ok(updates) => {
                        debug!(count = updates.len(), "Got Telegram updates");
                        for update in updates {
                            offset = update.id.as_offset();
                            match update.kind {
                                UpdateKind::Message(msg) => self.dispatch(&mut tasks, msg),
                                other => debug!("Ignoring non-message update: {other:?}"),
                            }
                        }
                    }
                    Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                        error!("Another bot instance is already polling with this token");
                        return Err(RelayError::transport(
                            "Telegram polling terminated by another getUpdates request",
                        ));
                    }
                    Err(e) => {
                        warn!(
                            error = %sanitize_error_message(&e.to_string()),
                            "Telegram getUpdates failed"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(()),
                            _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => {}
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;

        self.set_connected(false);
        drain(tasks).await;
        result
    }

    fn dispatch(&self, tasks: &mut JoinSet<()>, msg: Message) {
        let Some(incoming) = incoming_from_message(&msg) else {
            debug!(chat_id = msg.chat.id.0, "Skipping bot command");
            return;
        };

        let sink = TelegramReplySink::new(self.bot.clone(), msg.chat.id, msg.id);
        let processor = Arc::clone(&self.processor);
        let health = self.health.clone();
        let chat_id = msg.chat.id.0;

        tasks.spawn(async move {
            if let Err(e) = processor.handle(&incoming, &sink).await {
                warn!(chat_id, error = %e, "Message handling failed");
            }
            if let Some(health) = health {
                health.set_last_message_handled(current_timestamp());
            }
        });
    }

    fn set_connected(&self, connected: bool) {
        metrics().set_telegram_connected(connected);
        if let Some(health) = &self.health {
            health.set_telegram_connected(connected);
        }
    }
}

fn request_error(e: RequestError) -> RelayError {
    RelayError::transport(format!(
        "Telegram request failed: {}",
        sanitize_error_message(&e.to_string())
    ))
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("Message task panicked");
        } else {
            debug!(error = %e, "Message task aborted");
        }
    }
}

async fn drain(mut tasks: JoinSet<()>) {
    if tasks.is_empty() {
        return;
    }
    info!(in_flight = tasks.len(), "Waiting for in-flight messages");
    let waited = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while let Some(joined) = tasks.join_next().await {
            log_task_result(joined);
        }
    })
    .await;
    if waited.is_err() {
        warn!(remaining = tasks.len(), "Aborting unfinished message tasks");
        tasks.abort_all();
    }
}
