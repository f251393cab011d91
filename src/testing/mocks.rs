//! Mock implementations for testing
//!
//! Provides a scripted generation client, a recording reply sink and a
//! recording retry timer so the pipeline can be exercised without Telegram,
//! Gemini or real sleeps.

use crate::error::RelayError;
use crate::llm::provider::{GenerationClient, GenerationError, GenerationRequest};
use crate::processing::retry::{Cancelled, RetryTimer};
use crate::transport::ReplySink;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type ScriptedResult = Result<String, GenerationError>;

/// Generation client that replays a fixed script of results
///
/// Results are consumed in order; once the script runs dry the last entry
/// repeats forever.
#[derive(Debug)]
pub struct ScriptedGenerationClient {
    script: Mutex<VecDeque<ScriptedResult>>,
    last: Mutex<Option<ScriptedResult>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedGenerationClient {
    pub fn new(script: Vec<ScriptedResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    pub fn always_ok(text: impl Into<String>) -> Self {
        Self::new(vec![Ok(text.into())])
    }

    pub fn always_err(error: GenerationError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Delay every call by `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_result(&self) -> ScriptedResult {
        let mut script = match self.script.lock() {
            Ok(script) => script,
            Err(_) => return Err(GenerationError::Uncategorized("poisoned script".to_string())),
        };
        let mut last = match self.last.lock() {
            Ok(last) => last,
            Err(_) => return Err(GenerationError::Uncategorized("poisoned script".to_string())),
        };

        if let Some(result) = script.pop_front() {
            *last = Some(result.clone());
            return result;
        }

        last.clone()
            .unwrap_or_else(|| Ok("Mock response".to_string()))
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerationClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.next_result()
    }
}

/// Retry timer that records requested delays and returns immediately
#[derive(Debug, Default)]
pub struct RecordingRetryTimer {
    delays: Mutex<Vec<Duration>>,
    cancelled: bool,
}

impl RecordingRetryTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timer whose every wait reports cancellation
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Default::default()
        }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RetryTimer for RecordingRetryTimer {
    async fn wait(&self, delay: Duration) -> Result<(), Cancelled> {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push(delay);
        }
        if self.cancelled {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Reply sink that records everything sent through it
#[derive(Debug, Default)]
pub struct RecordingReplySink {
    replies: Mutex<Vec<String>>,
    typing_signals: AtomicUsize,
    fail_replies: bool,
    fail_typing: bool,
    typing_latency: Duration,
}

impl RecordingReplySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink whose `send_reply` always fails
    pub fn failing() -> Self {
        Self {
            fail_replies: true,
            ..Default::default()
        }
    }

    /// Sink whose typing indicator always fails
    pub fn with_failing_typing() -> Self {
        Self {
            fail_typing: true,
            ..Default::default()
        }
    }

    /// Sink whose typing indicator takes `latency` to complete
    pub fn with_typing_latency(latency: Duration) -> Self {
        Self {
            typing_latency: latency,
            ..Default::default()
        }
    }

    pub fn replies(&self) -> Vec<String> {
        self.replies.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn typing_signals(&self) -> usize {
        self.typing_signals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplySink for RecordingReplySink {
    type Error = RelayError;

    async fn signal_typing(&self) -> Result<(), Self::Error> {
        self.typing_signals.fetch_add(1, Ordering::SeqCst);
        if !self.typing_latency.is_zero() {
            tokio::time::sleep(self.typing_latency).await;
        }
        if self.fail_typing {
            return Err(RelayError::transport("Mock typing failure"));
        }
        Ok(())
    }

    async fn send_reply(&self, text: &str) -> Result<(), Self::Error> {
        if self.fail_replies {
            return Err(RelayError::transport("Mock send failure"));
        }
        if let Ok(mut replies) = self.replies.lock() {
            replies.push(text.to_string());
        }
        Ok(())
    }
}
