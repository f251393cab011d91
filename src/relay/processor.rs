//! Message processor
//!
//! Runs one inbound message through filter → generate → map → reply. A
//! processor is shared by every message task; it holds no per-message state.

use crate::config::RelayConfig;
use crate::error::{sanitize_error_message, RelayError, RelayResult};
use crate::llm::provider::{
    FatalFailure, GenerationClient, GenerationError, GenerationOutcome, GenerationRequest,
};
use crate::message_span;
use crate::observability::metrics::metrics;
use crate::processing::filter::{FilterDecision, PromptBuilder};
use crate::processing::reply::{Disposition, ReplyMapper};
use crate::processing::retry::{RetryInvoker, RetryPolicy, RetryTimer};
use crate::protocol::messages::{IncomingMessage, ReplyDecision};
use crate::transport::{ReplyOnce, ReplySink};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

const TYPING_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether the generation client came up at startup
///
/// Decided once; a failed client stays unavailable for the process lifetime.
enum ClientState {
    Ready(RetryInvoker),
    Unavailable(String),
}

pub struct MessageProcessor {
    prompts: PromptBuilder,
    client: ClientState,
    mapper: ReplyMapper,
}

impl MessageProcessor {
    /// Build a processor from configuration and the outcome of client setup
    pub fn new(
        config: &RelayConfig,
        client: Result<Arc<dyn GenerationClient>, GenerationError>,
        timer: Arc<dyn RetryTimer>,
    ) -> Self {
        let client = match client {
            Ok(client) => {
                info!(client = client.name(), "Generation client ready");
                metrics().set_client_available(true);
                ClientState::Ready(RetryInvoker::new(
                    client,
                    timer,
                    RetryPolicy::from(&config.retry),
                ))
            }
            Err(e) => {
                let reason = sanitize_error_message(&e.to_string());
                error!(
                    error = %reason,
                    "Generation client failed to initialize; every marked message will get the unavailable notice"
                );
                metrics().set_client_available(false);
                ClientState::Unavailable(reason)
            }
        };

        Self {
            prompts: PromptBuilder::from_config(config),
            client,
            mapper: ReplyMapper::new(config.notices.clone()),
        }
    }

    pub fn is_client_available(&self) -> bool {
        matches!(self.client, ClientState::Ready(_))
    }

    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// Apply the marker filter
    pub fn screen(&self, message: &IncomingMessage) -> FilterDecision {
        self.prompts.evaluate(message)
    }

    /// Produce a disposition for an accepted request
    pub async fn resolve(&self, request: &GenerationRequest) -> Disposition {
        match &self.client {
            ClientState::Unavailable(reason) => {
                debug!(reason = %reason, "Generation client unavailable, skipping call");
                Disposition::ClientUnavailable
            }
            ClientState::Ready(invoker) => Disposition::Generated(invoker.invoke(request).await),
        }
    }

    /// Decide the reply for a message without delivering it
    pub async fn decide(&self, message: &IncomingMessage) -> ReplyDecision {
        let disposition = match self.screen(message) {
            FilterDecision::Ignore(_) => Disposition::Filtered,
            FilterDecision::Accept(request) => self.resolve(&request).await,
        };
        self.mapper.map(&disposition)
    }

    /// Handle one message end to end, replying through `sink` at most once
    ///
    /// Returns the decision that was delivered. An error means the reply
    /// could not be sent; nothing is retried.
    pub async fn handle<S>(
        &self,
        message: &IncomingMessage,
        sink: &S,
    ) -> RelayResult<ReplyDecision>
    where
        S: ReplySink + ?Sized,
    {
        let message_id = Uuid::new_v4();
        let span = message_span!(message_id = %message_id);

        async move {
            metrics().message_received();

            let request = match self.screen(message) {
                FilterDecision::Ignore(reason) => {
                    debug!(reason = reason.as_str(), "Message ignored");
                    metrics().message_ignored();
                    return Ok(ReplyDecision::Silent);
                }
                FilterDecision::Accept(request) => request,
            };

            metrics().processing_started();
            let started = Instant::now();
            let once = ReplyOnce::new(sink);

            let result = AssertUnwindSafe(self.process_accepted(message, &request, &once))
                .catch_unwind()
                .await;

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(panic) => {
                    error!(
                        panic = %panic_message(panic.as_ref()),
                        text = message.text.as_deref().unwrap_or_default(),
                        "Message processing panicked"
                    );
                    metrics().generation_failed("panic");
                    let decision = self.mapper.map(&Disposition::Generated(
                        GenerationOutcome::FatalFailure(FatalFailure::Immediate(
                            GenerationError::Uncategorized("panic".to_string()),
                        )),
                    ));
                    self.deliver(&once, decision).await
                }
            };

            metrics().processing_finished(started.elapsed());
            outcome
        }
        .instrument(span)
        .await
    }

    async fn process_accepted<S>(
        &self,
        message: &IncomingMessage,
        request: &GenerationRequest,
        once: &ReplyOnce<'_, S>,
    ) -> RelayResult<ReplyDecision>
    where
        S: ReplySink + ?Sized,
    {
        let typing = async {
            match tokio::time::timeout(TYPING_TIMEOUT, once.sink().signal_typing()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Typing indicator failed"),
                Err(_) => debug!("Typing indicator timed out"),
            }
        };

        // Typing runs alongside generation and never delays the first call
        let ((), disposition) = tokio::join!(typing, self.resolve(request));
        if let Some(classification) = failure_classification(&disposition) {
            error!(
                classification,
                text = message.text.as_deref().unwrap_or_default(),
                "Failed to produce an answer"
            );
        }

        let decision = self.mapper.map(&disposition);
        self.deliver(once, decision).await
    }

    async fn deliver<S>(
        &self,
        once: &ReplyOnce<'_, S>,
        decision: ReplyDecision,
    ) -> RelayResult<ReplyDecision>
    where
        S: ReplySink + ?Sized,
    {
        let text = match decision {
            ReplyDecision::Silent => {
                metrics().silent_outcome();
                return Ok(ReplyDecision::Silent);
            }
            ReplyDecision::Reply(text) => text,
        };

        match once.send(&text).await {
            Ok(true) => {
                metrics().reply_sent();
                debug!(reply_length = text.len(), "Reply sent");
            }
            Ok(false) => debug!("Reply already sent for this message, dropping"),
            Err(e) => {
                let detail = sanitize_error_message(&e.to_string());
                metrics().reply_failed();
                error!(error = %detail, "Failed to send reply");
                return Err(RelayError::transport(format!(
                    "Failed to send reply: {detail}"
                )));
            }
        }

        Ok(ReplyDecision::Reply(text))
    }
}

fn failure_classification(disposition: &Disposition) -> Option<&'static str> {
    match disposition {
        Disposition::Filtered => None,
        Disposition::ClientUnavailable => Some("client_unavailable"),
        Disposition::Generated(outcome) => match outcome {
            GenerationOutcome::Success(_) => None,
            GenerationOutcome::RetryableFailure(e) => Some(e.classification()),
            GenerationOutcome::FatalFailure(failure) => match failure {
                FatalFailure::Exhausted { .. } => Some("exhausted"),
                FatalFailure::Immediate(e) => Some(e.classification()),
                FatalFailure::Cancelled => None,
            },
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
