//! Bounded retry around a single generation request
//!
//! The invoker is a small state machine:
//!
//! ```text
//! Attempting(n) --success--------------------------> Succeeded
//! Attempting(n) --transient, n < max--> Waiting(n) --> Attempting(n + 1)
//! Attempting(n) --transient, n = max--------------> Failed(Exhausted)
//! Attempting(n) --anything else-------------------> Failed(Immediate)
//! Waiting(n)    --cancelled-----------------------> Failed(Cancelled)
//! ```
//!
//! Waiting goes through a [`RetryTimer`] so the scheduling model stays behind
//! one suspend-for-duration primitive that shutdown can interrupt.

use crate::config::RetrySection;
use crate::llm::provider::{
    FatalFailure, GenerationClient, GenerationError, GenerationOutcome, GenerationRequest,
};
use crate::observability::metrics::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The wait between attempts was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Suspend-for-duration primitive used between attempts
#[async_trait]
pub trait RetryTimer: Send + Sync {
    async fn wait(&self, delay: Duration) -> Result<(), Cancelled>;
}

/// Tokio sleep that aborts when the shutdown token fires
#[derive(Debug, Clone, Default)]
pub struct TokioRetryTimer {
    cancel: CancellationToken,
}

impl TokioRetryTimer {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

#[async_trait]
impl RetryTimer for TokioRetryTimer {
    async fn wait(&self, delay: Duration) -> Result<(), Cancelled> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Retry limits, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySection::default())
    }
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        Self::new(section.max_attempts, section.retry_delay())
    }
}

/// States of the retry loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    Attempting { attempt: u32 },
    Waiting { attempt: u32 },
    Succeeded(String),
    Failed(FatalFailure),
}

impl RetryState {
    /// Transition after an attempt completed (pure function)
    pub fn after_attempt(attempt: u32, max_attempts: u32, outcome: GenerationOutcome) -> Self {
        match outcome {
            GenerationOutcome::Success(text) => Self::Succeeded(text),
            GenerationOutcome::RetryableFailure(_) if attempt < max_attempts => {
                Self::Waiting { attempt }
            }
            GenerationOutcome::RetryableFailure(_) => Self::Failed(FatalFailure::Exhausted {
                attempts: attempt,
            }),
            GenerationOutcome::FatalFailure(failure) => Self::Failed(failure),
        }
    }
}

/// Executes a request with the bounded-retry policy
#[derive(Clone)]
pub struct RetryInvoker {
    client: Arc<dyn GenerationClient>,
    timer: Arc<dyn RetryTimer>,
    policy: RetryPolicy,
}

impl RetryInvoker {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        timer: Arc<dyn RetryTimer>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            timer,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run the loop to completion
    ///
    /// Returns either `Success` or `FatalFailure`; never `RetryableFailure`.
    /// The client is called at most `max_attempts` times.
    pub async fn invoke(&self, request: &GenerationRequest) -> GenerationOutcome {
        let mut state = RetryState::Attempting { attempt: 1 };

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    metrics().generation_attempted();
                    let result = self.client.generate(request).await;
                    if let Err(ref e) = result {
                        self.record_failure(attempt, e);
                    }
                    RetryState::after_attempt(attempt, self.policy.max_attempts, result.into())
                }
                RetryState::Waiting { attempt } => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        delay_secs = self.policy.retry_delay.as_secs_f64(),
                        client = self.client.name(),
                        "Generation service unavailable, retrying after delay"
                    );
                    metrics().generation_retried();
                    match self.timer.wait(self.policy.retry_delay).await {
                        Ok(()) => RetryState::Attempting {
                            attempt: attempt + 1,
                        },
                        Err(Cancelled) => {
                            debug!(attempt, "Retry wait cancelled");
                            RetryState::Failed(FatalFailure::Cancelled)
                        }
                    }
                }
                RetryState::Succeeded(text) => {
                    metrics().generation_succeeded();
                    return GenerationOutcome::Success(text);
                }
                RetryState::Failed(failure) => {
                    if let FatalFailure::Exhausted { attempts } = failure {
                        warn!(attempts, "Generation retries exhausted");
                        metrics().generation_failed("exhausted");
                    }
                    return GenerationOutcome::FatalFailure(failure);
                }
            };
        }
    }

    fn record_failure(&self, attempt: u32, error: &GenerationError) {
        debug!(
            attempt,
            classification = error.classification(),
            "Generation attempt failed"
        );
        metrics().generation_failed(error.classification());
    }
}
