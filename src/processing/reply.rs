//! Outcome-to-reply mapping
//!
//! A total, side-effect-free function from how a message ended up to what the
//! user sees. Upstream error text never appears in a reply; only the
//! configured notices and successful generations do.

use crate::config::NoticesSection;
use crate::llm::provider::{FatalFailure, GenerationError, GenerationOutcome};
use crate::protocol::messages::ReplyDecision;

/// How processing of one message ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Dropped by the marker filter
    Filtered,
    /// The generation client failed to initialize at startup
    ClientUnavailable,
    /// The retry loop ran and produced this outcome
    Generated(GenerationOutcome),
}

/// Maps dispositions to reply decisions using the configured notices
#[derive(Debug, Clone, Default)]
pub struct ReplyMapper {
    notices: NoticesSection,
}

impl ReplyMapper {
    pub fn new(notices: NoticesSection) -> Self {
        Self { notices }
    }

    pub fn map(&self, disposition: &Disposition) -> ReplyDecision {
        let notices = &self.notices;
        let notice = |text: &String| ReplyDecision::Reply(text.clone());

        match disposition {
            Disposition::Filtered => ReplyDecision::Silent,
            Disposition::ClientUnavailable => notice(&notices.service_unavailable),
            Disposition::Generated(outcome) => match outcome {
                GenerationOutcome::Success(text) => ReplyDecision::Reply(text.clone()),
                // The invoker never returns this; treated like exhaustion
                GenerationOutcome::RetryableFailure(_) => notice(&notices.overloaded),
                GenerationOutcome::FatalFailure(failure) => match failure {
                    FatalFailure::Exhausted { .. } => notice(&notices.overloaded),
                    FatalFailure::Cancelled => ReplyDecision::Silent,
                    FatalFailure::Immediate(error) => match error {
                        GenerationError::Api { .. } => notice(&notices.api_error),
                        GenerationError::Uncategorized(_) => notice(&notices.generic_error),
                        GenerationError::NotConfigured(_) => {
                            notice(&notices.service_unavailable)
                        }
                        GenerationError::Unavailable(_) => notice(&notices.overloaded),
                    },
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::ApiErrorKind;

    fn mapper() -> ReplyMapper {
        ReplyMapper::new(NoticesSection {
            service_unavailable: "unavailable".to_string(),
            overloaded: "overloaded".to_string(),
            api_error: "api".to_string(),
            generic_error: "generic".to_string(),
        })
    }

    fn reply(text: &str) -> ReplyDecision {
        ReplyDecision::Reply(text.to_string())
    }

    #[test]
    fn test_filtered_is_silent() {
        assert_eq!(mapper().map(&Disposition::Filtered), ReplyDecision::Silent);
    }

    #[test]
    fn test_client_unavailable_notice() {
        assert_eq!(
            mapper().map(&Disposition::ClientUnavailable),
            reply("unavailable")
        );
    }

    #[test]
    fn test_success_text_is_verbatim() {
        let text = "  **Fine, thanks\n with <tags> & spaces  ";
        let outcome = GenerationOutcome::Success(text.to_string());
        assert_eq!(mapper().map(&Disposition::Generated(outcome)), reply(text));
    }

    #[test]
    fn test_exhausted_maps_to_overloaded() {
        let outcome = GenerationOutcome::FatalFailure(FatalFailure::Exhausted { attempts: 3 });
        assert_eq!(
            mapper().map(&Disposition::Generated(outcome)),
            reply("overloaded")
        );
    }

    #[test]
    fn test_categorized_api_error_notice() {
        let outcome = GenerationOutcome::FatalFailure(FatalFailure::Immediate(
            GenerationError::api(ApiErrorKind::InvalidArgument, "secret detail"),
        ));
        let decision = mapper().map(&Disposition::Generated(outcome));
        assert_eq!(decision, reply("api"));
        assert!(!decision.text().unwrap_or_default().contains("secret detail"));
    }

    #[test]
    fn test_uncategorized_generic_notice() {
        let outcome = GenerationOutcome::FatalFailure(FatalFailure::Immediate(
            GenerationError::Uncategorized("connection reset".to_string()),
        ));
        assert_eq!(
            mapper().map(&Disposition::Generated(outcome)),
            reply("generic")
        );
    }

    #[test]
    fn test_cancelled_is_silent() {
        let outcome = GenerationOutcome::FatalFailure(FatalFailure::Cancelled);
        assert_eq!(
            mapper().map(&Disposition::Generated(outcome)),
            ReplyDecision::Silent
        );
    }

    #[test]
    fn test_stray_retryable_maps_to_overloaded() {
        let outcome =
            GenerationOutcome::RetryableFailure(GenerationError::Unavailable("x".to_string()));
        assert_eq!(
            mapper().map(&Disposition::Generated(outcome)),
            reply("overloaded")
        );
    }

    #[test]
    fn test_default_notices_are_non_empty() {
        let mapper = ReplyMapper::default();
        for disposition in [
            Disposition::ClientUnavailable,
            Disposition::Generated(GenerationOutcome::FatalFailure(FatalFailure::Exhausted {
                attempts: 1,
            })),
        ] {
            let decision = mapper.map(&disposition);
            assert!(!decision.text().unwrap_or_default().is_empty());
        }
    }
}
