//! Message processor behavior tests
//!
//! End-to-end scenarios through filter, retry, mapping and reply delivery,
//! using a scripted generation client and a recording reply sink.


use dotrelay::llm::provider::{ApiErrorKind, GenerationClient, GenerationError};
use dotrelay::processing::TokioRetryTimer;
use dotrelay::protocol::{IncomingMessage, ReplyDecision, SenderName};
use dotrelay::relay::MessageProcessor;
use dotrelay::testing::mocks::{RecordingReplySink, RecordingRetryTimer, ScriptedGenerationClient};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn unavailable() -> GenerationError {
    GenerationError::Unavailable("The model is overloaded".to_string())
}

fn processor(
    client: Arc<ScriptedGenerationClient>,
    timer: Arc<RecordingRetryTimer>,
) -> MessageProcessor {
    let client: Arc<dyn GenerationClient> = client;
    MessageProcessor::new(&test_helpers::test_config(), Ok(client), timer)
}

#[tokio::test]
async fn test_unmarked_message_gets_no_call_and_no_reply() {
    let client = Arc::new(ScriptedGenerationClient::always_ok("unused"));
    let processor = processor(client.clone(), Arc::new(RecordingRetryTimer::new()));
    let sink = RecordingReplySink::new();

    let decision = processor
        .handle(&test_helpers::marked_from("Alice", "Hello there"), &sink)
        .await
        .unwrap();

    assert_eq!(decision, ReplyDecision::Silent);
    assert_eq!(client.call_count(), 0);
    assert!(sink.replies().is_empty());
    assert_eq!(sink.typing_signals(), 0);
}

#[tokio::test]
async fn test_marked_message_includes_sender_name_and_returns_answer_verbatim() {
    let client = Arc::new(ScriptedGenerationClient::always_ok("Fine, thanks"));
    let processor = processor(client.clone(), Arc::new(RecordingRetryTimer::new()));
    let sink = RecordingReplySink::new();

    processor
        .handle(&test_helpers::marked_from("Aida", ".How are you?"), &sink)
        .await
        .unwrap();

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].prompt_text.contains("Aida"));
    assert!(requests[0].prompt_text.contains("How are you?"));
    assert!(!requests[0].prompt_text.contains(".How"));
    assert_eq!(requests[0].system_instruction, "Answer briefly.");
    assert_eq!(sink.replies(), vec!["Fine, thanks".to_string()]);
}

#[tokio::test]
async fn test_two_transient_failures_then_success() {
    let client = Arc::new(ScriptedGenerationClient::new(vec![
        Err(unavailable()),
        Err(unavailable()),
        Ok("third time lucky".to_string()),
    ]));
    let timer = Arc::new(RecordingRetryTimer::new());
    let processor = processor(client.clone(), timer.clone());
    let sink = RecordingReplySink::new();

    processor
        .handle(&IncomingMessage::new(".test"), &sink)
        .await
        .unwrap();

    assert_eq!(client.call_count(), 3);
    assert_eq!(timer.delays().len(), 2);
    assert_eq!(sink.replies(), vec!["third time lucky".to_string()]);
}

#[tokio::test]
async fn test_persistent_unavailability_yields_overloaded_notice() {
    let client = Arc::new(ScriptedGenerationClient::always_err(unavailable()));
    let timer = Arc::new(RecordingRetryTimer::new());
    let processor = processor(client.clone(), timer.clone());
    let sink = RecordingReplySink::new();

    processor
        .handle(&IncomingMessage::new(".test"), &sink)
        .await
        .unwrap();

    let config = test_helpers::test_config();
    assert_eq!(client.call_count(), 3);
    assert_eq!(timer.delays(), vec![config.retry.retry_delay(); 2]);
    assert_eq!(sink.replies(), vec![config.notices.overloaded]);
}

#[tokio::test]
async fn test_client_unavailable_at_startup_short_circuits() {
    let config = test_helpers::test_config();
    let processor = MessageProcessor::new(
        &config,
        Err(GenerationError::NotConfigured("no api key".to_string())),
        Arc::new(RecordingRetryTimer::new()),
    );

    for text in [".first", ".second"] {
        let sink = RecordingReplySink::new();
        processor
            .handle(&IncomingMessage::new(text), &sink)
            .await
            .unwrap();
        assert_eq!(sink.replies(), vec![config.notices.service_unavailable.clone()]);
    }
}

#[tokio::test]
async fn test_non_transient_error_is_not_retried() {
    let client = Arc::new(ScriptedGenerationClient::always_err(GenerationError::api(
        ApiErrorKind::InvalidArgument,
        "Request contains an invalid argument",
    )));
    let timer = Arc::new(RecordingRetryTimer::new());
    let processor = processor(client.clone(), timer.clone());
    let sink = RecordingReplySink::new();

    processor
        .handle(&IncomingMessage::new(".test"), &sink)
        .await
        .unwrap();

    assert_eq!(client.call_count(), 1);
    assert!(timer.delays().is_empty());
    assert_eq!(
        sink.replies(),
        vec![test_helpers::test_config().notices.api_error]
    );
}

#[tokio::test]
async fn test_uncategorized_error_yields_generic_notice() {
    let client = Arc::new(ScriptedGenerationClient::always_err(
        GenerationError::Uncategorized("connection reset by peer".to_string()),
    ));
    let processor = processor(client.clone(), Arc::new(RecordingRetryTimer::new()));
    let sink = RecordingReplySink::new();

    processor
        .handle(&IncomingMessage::new(".test"), &sink)
        .await
        .unwrap();

    assert_eq!(client.call_count(), 1);
    let replies = sink.replies();
    assert_eq!(replies, vec![test_helpers::test_config().notices.generic_error]);
    assert!(!replies[0].contains("connection reset"));
}

#[tokio::test]
async fn test_identical_outcomes_across_runs() {
    let message = IncomingMessage::new(".What is 2+2?")
        .with_sender(SenderName::new("Bob", Some("Stone".to_string())));

    let mut decisions = Vec::new();
    for _ in 0..2 {
        let client = Arc::new(ScriptedGenerationClient::new(vec![
            Err(unavailable()),
            Ok("4".to_string()),
        ]));
        let processor = processor(client.clone(), Arc::new(RecordingRetryTimer::new()));
        decisions.push((processor.decide(&message).await, client.requests()));
    }

    assert_eq!(decisions[0], decisions[1]);
    assert_eq!(decisions[0].0, ReplyDecision::Reply("4".to_string()));
}

#[tokio::test]
async fn test_marker_only_message_is_forwarded_by_default() {
    let client = Arc::new(ScriptedGenerationClient::always_ok("?"));
    let processor = processor(client.clone(), Arc::new(RecordingRetryTimer::new()));
    let sink = RecordingReplySink::new();

    processor
        .handle(&IncomingMessage::new("."), &sink)
        .await
        .unwrap();

    assert_eq!(client.call_count(), 1);
    assert_eq!(client.requests()[0].prompt_text, "Their question: ");
}

#[tokio::test]
async fn test_marker_only_message_ignored_when_disabled() {
    let mut config = test_helpers::test_config();
    config.filter.allow_empty_prompt = false;
    let client = Arc::new(ScriptedGenerationClient::always_ok("?"));
    let processor = MessageProcessor::new(
        &config,
        Ok(client.clone() as Arc<dyn GenerationClient>),
        Arc::new(RecordingRetryTimer::new()),
    );
    let sink = RecordingReplySink::new();

    let decision = processor
        .handle(&IncomingMessage::new(".   "), &sink)
        .await
        .unwrap();

    assert!(decision.is_silent());
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_concurrent_messages_are_independent() {
    let client = Arc::new(
        ScriptedGenerationClient::always_ok("shared answer").with_latency(Duration::from_millis(20)),
    );
    let processor = Arc::new(processor(client.clone(), Arc::new(RecordingRetryTimer::new())));

    let mut handles = Vec::new();
    for i in 0..5 {
        let processor = processor.clone();
        handles.push(tokio::spawn(async move {
            let sink = RecordingReplySink::new();
            let message = IncomingMessage::new(format!(".question {i}"));
            processor.handle(&message, &sink).await.unwrap();
            sink.replies()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), vec!["shared answer".to_string()]);
    }
    assert_eq!(client.call_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_retry_wait_is_silent() {
    let client = Arc::new(ScriptedGenerationClient::always_err(unavailable()));
    let cancel = CancellationToken::new();
    let config = test_helpers::test_config();
    let processor = MessageProcessor::new(
        &config,
        Ok(client.clone() as Arc<dyn GenerationClient>),
        Arc::new(TokioRetryTimer::new(cancel.clone())),
    );
    let sink = RecordingReplySink::new();

    let message = IncomingMessage::new(".test");
    let handle = processor.handle(&message, &sink);
    let canceller = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    };
    let (decision, ()) = tokio::join!(handle, canceller);

    assert!(decision.unwrap().is_silent());
    assert_eq!(client.call_count(), 1);
    assert!(sink.replies().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_typing_indicator_runs_alongside_generation() {
    let client = Arc::new(
        ScriptedGenerationClient::always_ok("answer").with_latency(Duration::from_secs(3)),
    );
    let processor = processor(client.clone(), Arc::new(RecordingRetryTimer::new()));
    let sink = RecordingReplySink::with_typing_latency(Duration::from_secs(3));

    let started = tokio::time::Instant::now();
    let message = IncomingMessage::new(".test");
    processor.handle(&message, &sink).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(sink.typing_signals(), 1);
    assert_eq!(sink.replies(), vec!["answer".to_string()]);
}
