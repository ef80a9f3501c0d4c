use std::collections::VecDeque;
use std::sync::Mutex;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::post;
use tokio::sync::Notify;

use super::*;
use crate::llm::config::CompletionConfig;
use crate::llm::{ApiMessage, CompletionClient, CompletionError};
use crate::state::chat::{MessageStatus, SEED_GREETING, Sender};

// =========================================================================
// MockCompletion
// =========================================================================

#[derive(Default)]
struct MockCompletion {
    responses: Mutex<VecDeque<Result<CompletionReply, CompletionError>>>,
    calls: Mutex<Vec<Vec<ApiMessage>>>,
    gate: Option<Gate>,
}

/// Lets a test hold a completion call open: `started` fires once the call
/// is waiting, the call returns after `release` is notified.
#[derive(Default)]
struct Gate {
    started: Notify,
    release: Notify,
}

impl MockCompletion {
    fn replying(responses: Vec<Result<CompletionReply, CompletionError>>) -> Arc<Self> {
        Arc::new(Self { responses: Mutex::new(responses.into()), ..Self::default() })
    }

    fn gated(responses: Vec<Result<CompletionReply, CompletionError>>) -> Arc<Self> {
        Arc::new(Self { responses: Mutex::new(responses.into()), gate: Some(Gate::default()), ..Self::default() })
    }

    fn gate(&self) -> &Gate {
        self.gate.as_ref().unwrap()
    }

    fn calls(&self) -> Vec<Vec<ApiMessage>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Completion for MockCompletion {
    async fn complete(&self, messages: &[ApiMessage]) -> Result<CompletionReply, CompletionError> {
        self.calls.lock().unwrap().push(messages.to_vec());
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(CompletionReply::Content("ok".into())))
    }
}

fn content(text: &str) -> Result<CompletionReply, CompletionError> {
    Ok(CompletionReply::Content(text.into()))
}

fn session_with(mock: &Arc<MockCompletion>) -> ConversationSession {
    ConversationSession::new(mock.clone())
}

fn assert_no_pending(session: &ConversationSession) {
    assert!(session.messages().iter().all(|m| m.status == MessageStatus::Settled));
}

// =========================================================================
// Seed
// =========================================================================

#[test]
fn fresh_session_has_only_the_greeting() {
    let session = session_with(&MockCompletion::replying(vec![]));
    let messages = session.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].sender, Sender::Assistant);
    assert_eq!(messages[0].text, SEED_GREETING);
    assert!(!session.is_request_in_flight());
}

#[tokio::test]
async fn greeting_is_never_sent_upstream() {
    let mock = MockCompletion::replying(vec![content("hello there")]);
    let session = session_with(&mock);
    session.submit("hi").await;
    assert_eq!(mock.calls(), vec![vec![ApiMessage::user("hi")]]);
}

// =========================================================================
// Successful exchange
// =========================================================================

#[tokio::test]
async fn submit_appends_user_then_assistant() {
    let mock = MockCompletion::replying(vec![content("Let's plan a workout.")]);
    let session = session_with(&mock);

    let outcome = session.submit("I want to get fit").await;

    assert_eq!(outcome, SubmitOutcome::Replied);
    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1].sender, Sender::User);
    assert_eq!(messages[1].text, "I want to get fit");
    assert_eq!(messages[2].sender, Sender::Assistant);
    assert_eq!(messages[2].text, "Let's plan a workout.");
    assert!(!session.is_request_in_flight());
    assert_no_pending(&session);
}

#[tokio::test]
async fn user_text_is_kept_as_typed() {
    let mock = MockCompletion::replying(vec![]);
    let session = session_with(&mock);
    session.submit("  padded  ").await;
    assert_eq!(session.messages()[1].text, "  padded  ");
    assert_eq!(mock.calls()[0], vec![ApiMessage::user("  padded  ")]);
}

#[tokio::test]
async fn payload_carries_prior_turns_in_order() {
    let mock = MockCompletion::replying(vec![content("hello"), content("great")]);
    let session = session_with(&mock);

    session.submit("hi").await;
    session.submit("how are you").await;

    let calls = mock.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[1],
        vec![ApiMessage::user("hi"), ApiMessage::assistant("hello"), ApiMessage::user("how are you")]
    );
}

#[tokio::test]
async fn ids_stay_strictly_increasing_across_exchanges() {
    let mock = MockCompletion::replying(vec![content("a"), content("b")]);
    let session = session_with(&mock);
    session.submit("one").await;
    session.submit("two").await;

    let ids: Vec<u64> = session.messages().iter().map(|m| m.id).collect();
    assert_eq!(ids.len(), 5);
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids not increasing: {ids:?}");
}

#[tokio::test]
async fn submit_clears_the_draft() {
    let mock = MockCompletion::replying(vec![]);
    let session = session_with(&mock);
    session.set_draft("stretching tips");

    let outcome = session.submit_draft().await;

    assert_eq!(outcome, SubmitOutcome::Replied);
    assert_eq!(session.draft(), "");
    assert_eq!(session.messages()[1].text, "stretching tips");
}

// =========================================================================
// Input guards
// =========================================================================

#[tokio::test]
async fn empty_and_blank_input_are_noops() {
    let mock = MockCompletion::replying(vec![]);
    let session = session_with(&mock);

    assert_eq!(session.submit("").await, SubmitOutcome::Rejected(RejectReason::EmptyInput));
    assert_eq!(session.submit("   ").await, SubmitOutcome::Rejected(RejectReason::EmptyInput));
    assert_eq!(session.submit("\n\t").await, SubmitOutcome::Rejected(RejectReason::EmptyInput));

    assert_eq!(session.messages().len(), 1);
    assert!(mock.calls().is_empty());
    assert!(!session.is_request_in_flight());
}

#[tokio::test]
async fn blank_draft_is_kept_when_rejected() {
    let session = session_with(&MockCompletion::replying(vec![]));
    session.set_draft("   ");
    assert_eq!(session.submit_draft().await, SubmitOutcome::Rejected(RejectReason::EmptyInput));
    assert_eq!(session.draft(), "   ");
}

#[tokio::test]
async fn submit_while_in_flight_is_rejected() {
    let mock = MockCompletion::gated(vec![content("first reply")]);
    let session = session_with(&mock);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.submit("first").await }
    });
    mock.gate().started.notified().await;

    assert!(session.is_request_in_flight());
    let before = session.messages();
    assert_eq!(before.len(), 3);
    assert!(before[2].is_pending());

    let second = session.submit("second").await;
    assert_eq!(second, SubmitOutcome::Rejected(RejectReason::RequestInFlight));
    assert_eq!(session.messages(), before);
    assert!(session.is_request_in_flight());

    mock.gate().release.notify_one();
    assert_eq!(task.await.unwrap(), SubmitOutcome::Replied);
    assert_eq!(mock.calls().len(), 1);
    assert_eq!(session.messages().len(), 3);
    assert_eq!(session.messages()[2].text, "first reply");
    assert_no_pending(&session);
}

// =========================================================================
// Failure paths
// =========================================================================

#[tokio::test]
async fn transport_failure_appends_fallback() {
    let mock = MockCompletion::replying(vec![Err(CompletionError::ApiRequest("connection refused".into()))]);
    let session = session_with(&mock);

    assert_eq!(session.submit("hello").await, SubmitOutcome::Fallback);

    let messages = session.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].text, FALLBACK_REPLY);
    assert_eq!(messages[2].sender, Sender::Assistant);
    assert!(!session.is_request_in_flight());
    assert_no_pending(&session);
}

#[tokio::test]
async fn parse_failure_appends_fallback() {
    let mock = MockCompletion::replying(vec![Err(CompletionError::ApiParse("expected value".into()))]);
    let session = session_with(&mock);
    assert_eq!(session.submit("hello").await, SubmitOutcome::Fallback);
    assert_eq!(session.messages().last().unwrap().text, FALLBACK_REPLY);
}

#[tokio::test]
async fn missing_content_appends_apology() {
    let mock = MockCompletion::replying(vec![Ok(CompletionReply::MissingContent)]);
    let session = session_with(&mock);

    assert_eq!(session.submit("hello").await, SubmitOutcome::SoftFailure);
    assert_eq!(session.messages().last().unwrap().text, MISSING_CONTENT_REPLY);
    assert!(!session.is_request_in_flight());
}

#[tokio::test]
async fn session_recovers_after_failure() {
    let mock = MockCompletion::replying(vec![
        Err(CompletionError::ApiResponse { status: 502, body: String::new() }),
        content("back online"),
    ]);
    let session = session_with(&mock);

    session.submit("first").await;
    assert_eq!(session.submit("second").await, SubmitOutcome::Replied);

    assert_eq!(session.messages().len(), 5);
    // The fallback turn is part of the history sent next time.
    assert_eq!(
        mock.calls()[1],
        vec![ApiMessage::user("first"), ApiMessage::assistant(FALLBACK_REPLY), ApiMessage::user("second")]
    );
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn reply_after_dispose_is_discarded() {
    let mock = MockCompletion::gated(vec![content("too late")]);
    let session = session_with(&mock);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.submit("hello").await }
    });
    mock.gate().started.notified().await;
    let before = session.messages();

    session.dispose();
    mock.gate().release.notify_one();

    assert_eq!(task.await.unwrap(), SubmitOutcome::Discarded);
    assert_eq!(session.messages(), before);
    assert!(session.messages().iter().all(|m| m.text != "too late"));
}

#[tokio::test]
async fn submit_after_dispose_is_rejected() {
    let mock = MockCompletion::replying(vec![]);
    let session = session_with(&mock);
    session.dispose();
    assert!(session.is_disposed());
    assert_eq!(session.submit("hello").await, SubmitOutcome::Rejected(RejectReason::Disposed));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn aborted_submission_clears_in_flight() {
    let mock = MockCompletion::gated(vec![]);
    let session = session_with(&mock);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.submit("hello").await }
    });
    mock.gate().started.notified().await;
    assert!(session.is_request_in_flight());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(!session.is_request_in_flight());
    assert_no_pending(&session);
    assert_eq!(session.messages().len(), 2);
}

// =========================================================================
// Presentation flags
// =========================================================================

#[test]
fn theme_and_menu_toggles_do_not_touch_the_log() {
    let session = session_with(&MockCompletion::replying(vec![]));
    assert_eq!(session.toggle_theme(), Theme::Wellness);
    assert!(session.toggle_menu());
    session.close_menu();
    assert_eq!(session.ui(), UiState { theme: Theme::Wellness, menu_open: false });
    assert_eq!(session.messages().len(), 1);
}

// =========================================================================
// End to end against a local HTTP service
// =========================================================================

async fn session_against(router: Router) -> ConversationSession {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    let config = CompletionConfig { base_url: format!("http://{addr}"), ..CompletionConfig::default() };
    ConversationSession::new(Arc::new(CompletionClient::from_config(&config, None).unwrap()))
}

#[tokio::test]
async fn http_500_produces_fallback_message() {
    let session =
        session_against(Router::new().route("/chat/completion", post(|| async { StatusCode::INTERNAL_SERVER_ERROR })))
            .await;

    assert_eq!(session.submit("hello").await, SubmitOutcome::Fallback);
    assert_eq!(session.messages().last().unwrap().text, FALLBACK_REPLY);
    assert!(!session.is_request_in_flight());
}

#[tokio::test]
async fn http_200_empty_object_produces_apology() {
    let session = session_against(
        Router::new().route("/chat/completion", post(|| async { axum::Json(serde_json::json!({})) })),
    )
    .await;

    assert_eq!(session.submit("hello").await, SubmitOutcome::SoftFailure);
    assert_eq!(session.messages().last().unwrap().text, MISSING_CONTENT_REPLY);
}

#[tokio::test]
async fn http_200_with_content_is_appended() {
    let session = session_against(Router::new().route(
        "/chat/completion",
        post(|| async { axum::Json(serde_json::json!({ "content": "Hydrate and rest." })) }),
    ))
    .await;

    assert_eq!(session.submit("tips?").await, SubmitOutcome::Replied);
    assert_eq!(session.messages().last().unwrap().text, "Hydrate and rest.");
}
