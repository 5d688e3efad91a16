//! Pipeline behavior tests: retry driver, backoff, response
//! extraction and display formatting. These run fast and touch no
//! network; delivery attempts are simulated operations handed to
//! the retry driver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use gemini_relay::retry::{Attempt, RetryPolicy, run_with_backoff};
use gemini_relay::error::Error;
use gemini_relay::providers::gemini::{
  GenerateContentRequest, GenerateContentResponse,
  RequestContent, RequestPart, Tool, GoogleSearch,
  WireGenerationConfig, classify_failure_status, extract_reply,
};
use gemini_relay::{
  render_outcome, GeneratedReply, Source,
  CONNECT_ERROR_TEXT, NO_REPLY_TEXT,
};

fn fast_policy() -> RetryPolicy
{   // 1ms initial backoff keeps the waits out of test runtime
    RetryPolicy::new(3, 2.0, 1)
}

// ===== Retry Driver =====

#[tokio::test]
async fn test_success_on_first_attempt_runs_once()
{   let calls = AtomicUsize::new(0);
    let calls_ref = &calls;

    let result = run_with_backoff(
      &fast_policy()
    , move |_attempt| async move {
        calls_ref.fetch_add(1, Ordering::SeqCst);
        Attempt::Success("hola")
      }
    ).await;

    assert_eq!(result, Ok("hola"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_two_server_errors_then_success_runs_three_times()
{   let calls = AtomicUsize::new(0);
    let calls_ref = &calls;

    let result = run_with_backoff(
      &fast_policy()
    , move |_attempt| async move {
        let n = calls_ref.fetch_add(1, Ordering::SeqCst);
        if n < 2
        {   Attempt::Retryable(Error::ServerError(503))
        } else
        {   Attempt::Success("recovered")
        }
      }
    ).await;

    assert_eq!(result, Ok("recovered"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhaustion_runs_exactly_three_times()
{   let calls = AtomicUsize::new(0);
    let calls_ref = &calls;

    let result: Result<(), Error> = run_with_backoff(
      &fast_policy()
    , move |_attempt| async move {
        calls_ref.fetch_add(1, Ordering::SeqCst);
        Attempt::Retryable(Error::ServerError(500))
      }
    ).await;

    assert_eq!(result, Err(Error::ServerError(500)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhaustion_renders_fixed_connect_error()
{   let reply: gemini_relay::GenerateReply
      = Err(Error::ServerError(502));
    assert_eq!(render_outcome(&reply), CONNECT_ERROR_TEXT);
    assert!(!render_outcome(&reply).is_empty());
}

#[tokio::test]
async fn test_classify_server_errors_retryable()
{   let policy = fast_policy();
    assert!(matches!(
      classify_failure_status(&policy, 500, String::new()),
      Attempt::Retryable(Error::ServerError(500))
    ));
    assert!(matches!(
      classify_failure_status(&policy, 503, String::new()),
      Attempt::Retryable(Error::ServerError(503))
    ));
}

#[tokio::test]
async fn test_classify_client_errors_terminal_by_default()
{   let policy = fast_policy();
    assert!(matches!(
      classify_failure_status(
        &policy, 404, "not found".to_string()
      ),
      Attempt::Terminal(Error::ApiError { status: 404, .. })
    ));
    // 499 sits just under the server-error boundary
    assert!(matches!(
      classify_failure_status(&policy, 499, String::new()),
      Attempt::Terminal(Error::ApiError { status: 499, .. })
    ));
}

#[tokio::test]
async fn test_classify_client_errors_retryable_in_legacy_mode()
{   let policy = fast_policy().retrying_client_errors();
    assert!(matches!(
      classify_failure_status(
        &policy, 404, "not found".to_string()
      ),
      Attempt::Retryable(Error::ApiError { status: 404, .. })
    ));
    // 5xx stays retryable either way
    assert!(matches!(
      classify_failure_status(&policy, 500, String::new()),
      Attempt::Retryable(Error::ServerError(500))
    ));
}

#[tokio::test]
async fn test_terminal_error_stops_immediately()
{   let policy = fast_policy();
    let policy_ref = &policy;
    let calls = AtomicUsize::new(0);
    let calls_ref = &calls;

    let result: Result<GenerateContentResponse, Error>
      = run_with_backoff(
          &policy
        , move |_attempt| async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            classify_failure_status(
              policy_ref, 404, "not found".to_string()
            )
          }
        ).await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_error_retried_in_legacy_mode()
{   // The original conflated 4xx with 5xx in its catch handler;
    // the legacy policy mode reproduces that: a 404 goes around
    // the loop to exhaustion instead of failing fast.
    let policy = fast_policy().retrying_client_errors();
    let policy_ref = &policy;
    let calls = AtomicUsize::new(0);
    let calls_ref = &calls;

    let result: Result<GenerateContentResponse, Error>
      = run_with_backoff(
          &policy
        , move |_attempt| async move {
            calls_ref.fetch_add(1, Ordering::SeqCst);
            classify_failure_status(
              policy_ref, 404, "not found".to_string()
            )
          }
        ).await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(render_outcome(&result.map(|_| GeneratedReply
    {   text: String::new()
      , sources: vec![]
    })), CONNECT_ERROR_TEXT);
}

#[tokio::test]
async fn test_backoff_doubles_from_initial()
{   let policy = RetryPolicy::default();
    assert_eq!(
      policy.backoff_for_attempt(0).as_millis(), 1000
    );
    assert_eq!(
      policy.backoff_for_attempt(1).as_millis(), 2000
    );
    assert_eq!(
      policy.backoff_for_attempt(2).as_millis(), 4000
    );
}

#[tokio::test]
async fn test_driver_sleeps_between_retries()
{   // 10ms initial, doubling: expects at least 10 + 20 = 30ms of
    // backoff across two failures before the third attempt
    let policy = RetryPolicy::new(3, 2.0, 10);
    let calls = AtomicUsize::new(0);
    let calls_ref = &calls;

    let started = Instant::now();
    let result = run_with_backoff(
      &policy
    , move |_attempt| async move {
        let n = calls_ref.fetch_add(1, Ordering::SeqCst);
        if n < 2
        {   Attempt::Retryable(Error::HttpError(
              "connection refused".to_string()
            ))
        } else
        {   Attempt::Success(())
        }
      }
    ).await;

    assert_eq!(result, Ok(()));
    assert!(
      started.elapsed().as_millis() >= 30,
      "backoff waits were skipped"
    );
}

#[tokio::test]
async fn test_error_retryability_classes()
{   assert!(Error::ServerError(503).is_retryable());
    assert!(Error::HttpError("dns".to_string()).is_retryable());
    assert!(Error::Timeout.is_retryable());
    assert!(Error::ParseError("bad json".to_string())
      .is_retryable());
    let not_found = Error::ApiError
    {   status: 404
      , body: "not found".to_string()
    };
    assert!(!not_found.is_retryable());
    assert!(!Error::MissingApiKey.is_retryable());
}

#[tokio::test]
async fn test_zero_attempt_policy_errors()
{   let policy = RetryPolicy::new(0, 2.0, 1);
    let result: Result<(), Error> = run_with_backoff(
      &policy
    , move |_attempt| async move {
        Attempt::Success(())
      }
    ).await;
    assert!(result.is_err());
}

// ===== Response Extraction =====

fn parse_envelope(json: &str) -> GenerateContentResponse
{   serde_json::from_str(json)
      .expect("envelope should deserialize")
}

#[tokio::test]
async fn test_extracts_text_and_complete_sources_only()
{   // Two attributions, one lacking a title: exactly one source
    // line must survive
    let envelope = parse_envelope(r#"{
      "candidates": [{
        "content": { "parts": [{ "text": "La fusión nuclear une núcleos ligeros." }] },
        "groundingMetadata": {
          "groundingAttributions": [
            { "web": { "uri": "https://example.org/fusion", "title": "Fusión nuclear" } },
            { "web": { "uri": "https://example.org/untitled" } }
          ]
        }
      }]
    }"#);

    let reply = extract_reply(envelope);
    assert_eq!(
      reply.text,
      "La fusión nuclear une núcleos ligeros."
    );
    assert_eq!(reply.sources, vec![
      Source
      {   uri: "https://example.org/fusion".to_string()
        , title: "Fusión nuclear".to_string()
      }
    ]);

    let display = reply.to_display_string();
    assert!(display.contains(
      "1. Fusión nuclear (https://example.org/fusion)"
    ));
    assert!(!display.contains("2. "));
}

#[tokio::test]
async fn test_display_format_with_sources()
{   let reply = GeneratedReply
    {   text: "Respuesta".to_string()
      , sources: vec![
          Source
          {   uri: "https://a.example".to_string()
            , title: "A".to_string()
          }
        , Source
          {   uri: "https://b.example".to_string()
            , title: "B".to_string()
          }
        ]
    };

    assert_eq!(
      reply.to_display_string(),
      "Respuesta\n\n---\nFuentes de Google Search:\n\
       1. A (https://a.example)\n\
       2. B (https://b.example)\n"
    );
}

#[tokio::test]
async fn test_missing_parts_degrades_to_placeholder()
{   let envelope = parse_envelope(r#"{
      "candidates": [{
        "content": {},
        "groundingMetadata": {
          "groundingAttributions": [
            { "web": { "uri": "https://example.org", "title": "T" } }
          ]
        }
      }]
    }"#);

    let reply = extract_reply(envelope);
    assert_eq!(reply.text, NO_REPLY_TEXT);
    // No sources section without usable text
    assert!(reply.sources.is_empty());
    assert_eq!(reply.to_display_string(), NO_REPLY_TEXT);
}

#[tokio::test]
async fn test_empty_candidates_degrades_to_placeholder()
{   let envelope = parse_envelope(r#"{ "candidates": [] }"#);
    let reply = extract_reply(envelope);
    assert_eq!(reply.text, NO_REPLY_TEXT);
    assert!(reply.sources.is_empty());
}

#[tokio::test]
async fn test_empty_text_degrades_to_placeholder()
{   let envelope = parse_envelope(r#"{
      "candidates": [{
        "content": { "parts": [{ "text": "" }] }
      }]
    }"#);
    let reply = extract_reply(envelope);
    assert_eq!(reply.text, NO_REPLY_TEXT);
}

#[tokio::test]
async fn test_render_outcome_never_empty()
{   let ok: gemini_relay::GenerateReply = Ok(GeneratedReply
    {   text: NO_REPLY_TEXT.to_string()
      , sources: vec![]
    });
    let err: gemini_relay::GenerateReply
      = Err(Error::Timeout);
    assert!(!render_outcome(&ok).is_empty());
    assert!(!render_outcome(&err).is_empty());
}

// ===== Request Wire Format =====

#[tokio::test]
async fn test_request_payload_wire_shape()
{   let request = GenerateContentRequest
    {   contents: vec![
          RequestContent
          {   parts: vec![
                RequestPart
                {   text: "¿Qué es la fusión nuclear?"
                      .to_string()
                }
              ]
          }
        ]
      , tools: Some(vec![
          Tool
          {   google_search: GoogleSearch {}
          }
        ])
      , generation_config: Some(WireGenerationConfig
        {   temperature: Some(0.7)
          , max_output_tokens: Some(1024)
        })
    };

    let value = serde_json::to_value(&request)
      .expect("request should serialize");

    assert_eq!(
      value["contents"][0]["parts"][0]["text"],
      "¿Qué es la fusión nuclear?"
    );
    assert!(value["tools"][0]["googleSearch"].is_object());
    assert_eq!(
      value["generationConfig"]["maxOutputTokens"], 1024
    );
}

#[tokio::test]
async fn test_request_payload_omits_optional_fields()
{   let request = GenerateContentRequest
    {   contents: vec![
          RequestContent
          {   parts: vec![
                RequestPart
                {   text: "hola".to_string()
                }
              ]
          }
        ]
      , tools: None
      , generation_config: None
    };

    let value = serde_json::to_value(&request)
      .expect("request should serialize");
    assert!(value.get("tools").is_none());
    assert!(value.get("generationConfig").is_none());
}
