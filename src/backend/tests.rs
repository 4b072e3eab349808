use super::*;
use crate::core::message::ChatTurn;
use crate::core::session::Session;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Captured request: (request line, JSON body)
type Captured = (String, serde_json::Value);

/// Accepts a single HTTP request and answers with `status` and `body`.
async fn one_shot_server(status: u16, body: &'static str) -> (String, oneshot::Receiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
        }

        let request_line = head.lines().next().unwrap_or_default().to_string();
        let json = serde_json::from_slice(&buf[header_end..header_end + content_length])
            .unwrap_or(serde_json::Value::Null);
        let _ = tx.send((request_line, json));

        let response = format!(
            "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.ok();
    });

    (format!("http://{addr}"), rx)
}

#[test]
fn test_chat_request_sends_explicit_null() {
    let req = ChatRequest {
        message: "Hello",
        session_id: None,
    };
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["message"], "Hello");
    assert!(json.get("session_id").unwrap().is_null());
}

#[test]
fn test_chat_response_optional_session_id() {
    let resp: ChatResponse = serde_json::from_str(r#"{"response":"Hi there"}"#).unwrap();
    let reply: ChatReply = resp.into();
    assert_eq!(reply.reply, "Hi there");
    assert!(reply.session_id.is_none());

    let resp: ChatResponse = serde_json::from_str(
        r#"{"response":"Hi","session_id":"abc123","user_name":null}"#,
    )
    .unwrap();
    assert_eq!(ChatReply::from(resp).session_id.as_deref(), Some("abc123"));
}

#[test]
fn test_chat_response_empty_session_id_is_absent() {
    let resp: ChatResponse =
        serde_json::from_str(r#"{"response":"Hi","session_id":""}"#).unwrap();
    assert!(ChatReply::from(resp).session_id.is_none());
}

#[test]
fn test_chat_response_requires_reply_text() {
    let parsed = serde_json::from_str::<ChatResponse>(r#"{"error":"Message is required"}"#);
    assert!(parsed.is_err());
}

#[test]
fn test_urls() {
    let backend = HttpBackend::new("http://localhost:5000/", None).unwrap();
    assert_eq!(
        backend.chat_url().unwrap().as_str(),
        "http://localhost:5000/api/chat"
    );
    assert_eq!(
        backend.save_log_url("1712345678901").unwrap().as_str(),
        "http://localhost:5000/api/save_log/1712345678901"
    );
    assert_eq!(
        backend.save_log_url("a/b c").unwrap().as_str(),
        "http://localhost:5000/api/save_log/a%2Fb%20c"
    );
    assert!(backend.save_log_url("").is_err());
}

#[test]
fn test_urls_with_prefix() {
    let backend = HttpBackend::new("http://gateway.local/bot", None).unwrap();
    assert_eq!(
        backend.chat_url().unwrap().as_str(),
        "http://gateway.local/bot/api/chat"
    );
}

#[test]
fn test_invalid_base_url() {
    assert!(matches!(
        HttpBackend::new("not a url", None),
        Err(BackendError::Http(_))
    ));
}

#[tokio::test]
async fn test_send_round_trip() {
    let (base, rx) = one_shot_server(200, r#"{"response":"Hello!","session_id":"srv-1"}"#).await;
    let backend = HttpBackend::new(&base, Some(std::time::Duration::from_secs(5))).unwrap();

    let reply = backend.send("Hi", None).await.unwrap();
    assert_eq!(reply.reply, "Hello!");
    assert_eq!(reply.session_id.as_deref(), Some("srv-1"));

    let (line, body) = rx.await.unwrap();
    assert!(line.starts_with("POST /api/chat "));
    assert_eq!(body["message"], "Hi");
    assert!(body["session_id"].is_null());
}

#[tokio::test]
async fn test_send_non_2xx_is_api_error() {
    let (base, _rx) = one_shot_server(500, r#"{"error":"boom"}"#).await;
    let backend = HttpBackend::new(&base, None).unwrap();

    match backend.send("Hi", Some("abc")).await {
        Err(BackendError::Api { status, message }) => {
            assert_eq!(status, 500);
            assert!(message.contains("boom"));
        }
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_malformed_body() {
    let (base, _rx) = one_shot_server(200, r#"{"reply":"wrong field"}"#).await;
    let backend = HttpBackend::new(&base, None).unwrap();
    assert!(matches!(
        backend.send("Hi", None).await,
        Err(BackendError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_send_connection_refused() {
    // Bind and drop to get a port nothing listens on
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let backend = HttpBackend::new(&format!("http://{addr}"), None).unwrap();
    assert!(matches!(
        backend.send("Hi", None).await,
        Err(BackendError::Http(_))
    ));
}

#[tokio::test]
async fn test_persist_posts_session_log() {
    let (base, rx) = one_shot_server(200, r#"{"message":"Log saved"}"#).await;
    let backend = HttpBackend::new(&base, None).unwrap();

    let mut session = Session::new();
    session.push(ChatTurn::user("ok bye now"));
    session.push(ChatTurn::bot("Goodbye!"));
    let log = session.snapshot();

    backend.persist(session.id(), &log).await.unwrap();

    let (line, body) = rx.await.unwrap();
    assert!(line.starts_with(&format!("POST /api/save_log/{} ", session.id())));
    assert_eq!(body["messageCount"], 2);
    assert_eq!(body["sessionId"], session.id());
    assert_eq!(body["messages"][1]["text"], "Goodbye!");
}

#[tokio::test]
async fn test_persist_404_is_error() {
    let (base, _rx) = one_shot_server(404, r#"{"error":"No session or chat log found"}"#).await;
    let backend = HttpBackend::new(&base, None).unwrap();
    let log = Session::new().snapshot();
    assert!(matches!(
        backend.persist(&log.session_id, &log).await,
        Err(BackendError::Api { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_file_persister_writes_json() {
    let tmp = tempfile::tempdir().unwrap();
    let persister = FileLogPersister::new(tmp.path().join("logs"));

    let mut session = Session::new();
    session.push(ChatTurn::user("Hello"));
    let log = session.snapshot();

    persister.persist(session.id(), &log).await.unwrap();

    let path = tmp.path().join("logs").join(format!("{}.json", session.id()));
    let written: SessionLog =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(written, log);
}

#[tokio::test]
async fn test_file_persister_rejects_traversal() {
    let tmp = tempfile::tempdir().unwrap();
    let persister = FileLogPersister::new(tmp.path());
    let log = Session::new().snapshot();

    for bad in ["", ".", "..", "../escape", "a\\b"] {
        assert!(matches!(
            persister.persist(bad, &log).await,
            Err(BackendError::InvalidSessionId(_))
        ));
    }
}

#[test]
fn test_create_backend_file_sink() {
    let tmp = tempfile::tempdir().unwrap();
    let config = AppConfig {
        working_dir: tmp.path().to_path_buf(),
        log_sink: LogSink::File,
        ..Default::default()
    };
    assert!(create_backend(&config).is_ok());
}
