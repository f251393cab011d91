//! Request-processing pipeline stages
//!
//! filter → build request → invoke with retry → map to reply. Each stage
//! lives in its own module and is usable on its own; the message processor
//! wires them together.

pub mod filter;
pub mod reply;
pub mod retry;

pub use filter::{FilterDecision, IgnoreReason, PromptBuilder};
pub use reply::{Disposition, ReplyMapper};
pub use retry::{Cancelled, RetryInvoker, RetryPolicy, RetryState, RetryTimer, TokioRetryTimer};
