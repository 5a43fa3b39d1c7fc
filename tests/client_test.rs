//! Chat session against a mocked relay, plus the fallback path.

use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use vaidya::config::{ClientConfig, ClientMode};
use vaidya::constants::{EMERGENCY_HELPLINE, RELAY_CHAT_PATH};
use vaidya::conversation::{CancellationPolicy, ConversationUpdate, NoticeKind, Outcome, Phase};
use vaidya::fallback::fallback_reply;
use vaidya::language::Language;
use vaidya::types::{Message, Role};
use vaidya::client::ChatSession;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn live_session(server: &MockServer, language: Language, policy: CancellationPolicy) -> ChatSession {
    let mode = ClientConfig::new(server.uri(), "publishable-key").validate();
    assert!(matches!(mode, ClientMode::Live { .. }));
    ChatSession::new(mode, reqwest::Client::new(), language, policy)
}

fn sse(deltas: &[&str]) -> String {
    let mut body = String::new();
    for d in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": d}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn streamed_deltas_build_the_assistant_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RELAY_CHAT_PATH))
        .and(header("authorization", "Bearer publishable-key"))
        .and(body_partial_json(json!({"language": "english"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse(&["He", "llo"]), "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = live_session(&server, Language::English, CancellationPolicy::default());
    let outcome = session.send("hi there", &CancellationToken::new()).await;

    assert_eq!(outcome, Some(Outcome::Success));
    let messages = session.conversation().messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1], Message::user("hi there"));
    assert_eq!(messages[2], Message::assistant("Hello"));
}

#[tokio::test]
async fn conversation_is_sent_in_order_with_the_greeting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RELAY_CHAT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse(&["ok"]), "text/event-stream"))
        .mount(&server)
        .await;

    let mut session = live_session(&server, Language::Tamil, CancellationPolicy::default());
    session.send("first", &CancellationToken::new()).await;
    session.send("second", &CancellationToken::new()).await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(body["language"], "tamil");
    let roles: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["assistant", "user", "assistant", "user"]);
    assert_eq!(body["messages"][0]["content"], Language::Tamil.greeting());
    assert_eq!(body["messages"][3]["content"], "second");
}

#[tokio::test]
async fn rate_limit_surfaces_a_notice_without_an_empty_bubble() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RELAY_CHAT_PATH))
        .respond_with(
            ResponseTemplate::new(429).set_body_json(json!({"error": "Rate limit exceeded. Please try again later."})),
        )
        .mount(&server)
        .await;

    let mut session = live_session(&server, Language::English, CancellationPolicy::default());
    let outcome = session.send("hello", &CancellationToken::new()).await;

    match outcome {
        Some(Outcome::Failed(notice)) => {
            assert_eq!(notice.kind, NoticeKind::RateLimited);
            assert_eq!(notice.message, "Rate limit exceeded. Please try again later.");
        }
        other => panic!("expected rate-limit failure, got {:?}", other),
    }
    let last = session.conversation().messages().last().unwrap();
    assert_eq!(last, &Message::user("hello"));
}

#[tokio::test]
async fn other_relay_failures_use_the_relay_message_or_a_default() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(RELAY_CHAT_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("not json"))
        .mount(&server)
        .await;

    let mut session = live_session(&server, Language::English, CancellationPolicy::default());
    match session.send("hello", &CancellationToken::new()).await {
        Some(Outcome::Failed(notice)) => {
            assert_eq!(notice.kind, NoticeKind::RelayFailure);
            assert_eq!(notice.message, "Failed to get response");
        }
        other => panic!("expected relay failure, got {:?}", other),
    }
}

#[tokio::test]
async fn quota_exhaustion_has_its_own_notice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({"error": "credits"})))
        .mount(&server)
        .await;

    let mut session = live_session(&server, Language::English, CancellationPolicy::default());
    match session.send("hello", &CancellationToken::new()).await {
        Some(Outcome::Failed(notice)) => assert_eq!(notice.kind, NoticeKind::QuotaExhausted),
        other => panic!("expected quota failure, got {:?}", other),
    }
}

#[tokio::test]
async fn cancelling_before_the_response_leaves_only_the_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse(&["late"]), "text/event-stream")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut session = live_session(&server, Language::English, CancellationPolicy::KeepPartial);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    match session.send("hello", &cancel).await {
        Some(Outcome::Failed(notice)) => assert_eq!(notice.kind, NoticeKind::Cancelled),
        other => panic!("expected cancellation, got {:?}", other),
    }
    let messages = session.conversation().messages();
    assert_eq!(messages.last().unwrap().role, Role::User);
    assert!(!session.conversation().phase().is_in_flight());
}

#[tokio::test]
async fn unconfigured_client_replies_from_the_fallback() {
    let mode = ClientConfig::new("https://your-project.supabase.co", "your-key").validate();
    assert!(matches!(mode, ClientMode::Fallback { .. }));

    let mut session = ChatSession::new(
        mode,
        reqwest::Client::new(),
        Language::Hindi,
        CancellationPolicy::default(),
    )
    .with_fallback_delay(Duration::from_millis(10));
    assert!(!session.is_live());
    assert!(session.fallback_reason().unwrap().contains("VAIDYA_RELAY_URL"));
    let mut updates = session.subscribe();

    let outcome = session.send("सिरदर्द", &CancellationToken::new()).await;
    assert_eq!(outcome, Some(Outcome::Success));
    assert_eq!(session.conversation().phase(), &Phase::Settled(Outcome::Success));

    let reply = session.conversation().messages().last().unwrap();
    assert_eq!(reply, &Message::assistant(fallback_reply(Language::Hindi)));
    assert!(reply.content.contains(EMERGENCY_HELPLINE));

    // never streams: no Streaming phase is published
    let mut phases = Vec::new();
    while let Ok(update) = updates.try_recv() {
        if let vaidya::conversation::ConversationUpdate::PhaseChanged(phase) = update {
            phases.push(phase);
        }
    }
    assert_eq!(phases, vec![Phase::Sending, Phase::Settled(Outcome::Success)]);
}

#[tokio::test]
async fn blank_input_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = live_session(&server, Language::English, CancellationPolicy::default());
    assert_eq!(session.send("   ", &CancellationToken::new()).await, None);
    assert_eq!(session.conversation().messages().len(), 1);
}

const FIRST_DELTA: &str = "data: {\"choices\":[{\"delta\":{\"content\":\"Rest\"}}]}\n\n";

/// Reads one request, headers plus a `content-length` body.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }
}

/// Relay that answers with a chunked event stream holding one delta, then
/// either holds the connection open or drops it mid-body.
async fn one_delta_relay(drop_connection: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n";
        socket.write_all(head.as_bytes()).await.unwrap();
        let chunk = format!("{:x}\r\n{}\r\n", FIRST_DELTA.len(), FIRST_DELTA);
        socket.write_all(chunk.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
        if !drop_connection {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    });
    format!("http://{}", addr)
}

/// Cancels `token` once the first delta has reached the conversation.
fn cancel_after_first_delta(session: &ChatSession, token: &CancellationToken) {
    let mut updates = session.subscribe();
    let trigger = token.clone();
    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            if matches!(update, ConversationUpdate::PendingGrew { .. }) {
                trigger.cancel();
                return;
            }
        }
    });
}

async fn send_with_cancel_mid_stream(policy: CancellationPolicy) -> ChatSession {
    let base_url = one_delta_relay(false).await;
    let mode = ClientConfig::new(base_url, "publishable-key").validate();
    let mut session = ChatSession::new(mode, reqwest::Client::new(), Language::English, policy);

    let cancel = CancellationToken::new();
    cancel_after_first_delta(&session, &cancel);
    let outcome = tokio::time::timeout(Duration::from_secs(10), session.send("hello", &cancel))
        .await
        .expect("turn should settle after cancellation");
    match outcome {
        Some(Outcome::Failed(notice)) => assert_eq!(notice.kind, NoticeKind::Cancelled),
        other => panic!("expected cancellation, got {:?}", other),
    }
    assert!(!session.conversation().phase().is_in_flight());
    session
}

#[tokio::test]
async fn cancelling_mid_stream_keeps_the_partial_reply() {
    let session = send_with_cancel_mid_stream(CancellationPolicy::KeepPartial).await;
    let messages = session.conversation().messages();
    assert_eq!(messages.last().unwrap(), &Message::assistant("Rest"));
    assert_eq!(messages[messages.len() - 2], Message::user("hello"));
}

#[tokio::test]
async fn cancelling_mid_stream_can_discard_the_partial_reply() {
    let session = send_with_cancel_mid_stream(CancellationPolicy::DiscardPartial).await;
    let messages = session.conversation().messages();
    assert_eq!(messages.last().unwrap(), &Message::user("hello"));
}

#[tokio::test]
async fn connection_dropped_mid_stream_is_a_transport_failure() {
    let base_url = one_delta_relay(true).await;
    let mode = ClientConfig::new(base_url, "publishable-key").validate();
    let mut session = ChatSession::new(
        mode,
        reqwest::Client::new(),
        Language::English,
        CancellationPolicy::default(),
    );

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        session.send("hello", &CancellationToken::new()),
    )
    .await
    .expect("turn should settle when the connection drops");
    match outcome {
        Some(Outcome::Failed(notice)) => assert_eq!(notice.kind, NoticeKind::Transport),
        other => panic!("expected transport failure, got {:?}", other),
    }
    assert!(!session.conversation().phase().is_in_flight());
}
