//! Transport layer for chat delivery
//!
//! This module provides the reply capability the message processor calls
//! into, plus the Telegram implementation.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod telegram;

/// Reply capability for one inbound message
///
/// Each sink is bound to a single message's origin; the processor sends at
/// most one reply through it.
#[async_trait::async_trait]
pub trait ReplySink: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Show a typing/working indicator (best effort)
    async fn signal_typing(&self) -> Result<(), Self::Error>;

    /// Send reply text to the message's origin
    async fn send_reply(&self, text: &str) -> Result<(), Self::Error>;
}

/// Guard enforcing at-most-once delivery through a [`ReplySink`]
pub struct ReplyOnce<'a, S: ReplySink + ?Sized> {
    sink: &'a S,
    sent: AtomicBool,
}

impl<'a, S: ReplySink + ?Sized> ReplyOnce<'a, S> {
    pub fn new(sink: &'a S) -> Self {
        Self {
            sink,
            sent: AtomicBool::new(false),
        }
    }

    pub fn sink(&self) -> &'a S {
        self.sink
    }

    /// Whether a send has been attempted
    pub fn has_sent(&self) -> bool {
        self.sent.load(Ordering::SeqCst)
    }

    /// Send `text` unless something was already sent
    ///
    /// Returns `Ok(false)` without touching the sink on a second call. The
    /// flag is set before the send so a failed or interrupted send still
    /// counts.
    pub async fn send(&self, text: &str) -> Result<bool, S::Error> {
        if self.sent.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        self.sink.send_reply(text).await?;
        Ok(true)
    }
}

/// Type alias for the Telegram transport
pub type TelegramTransport = telegram::TelegramAdapter;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::RecordingReplySink;

    #[tokio::test]
    async fn test_reply_once_sends_single_reply() {
        let sink = RecordingReplySink::new();
        let once = ReplyOnce::new(&sink);

        assert!(once.send("first").await.unwrap());
        assert!(!once.send("second").await.unwrap());
        assert!(once.has_sent());
        assert_eq!(sink.replies(), vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_send_still_counts() {
        let sink = RecordingReplySink::failing();
        let once = ReplyOnce::new(&sink);

        assert!(once.send("first").await.is_err());
        assert!(!once.send("second").await.unwrap());
        assert!(sink.replies().is_empty());
    }
}
