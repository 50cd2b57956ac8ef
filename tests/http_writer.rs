//! Integration tests for HttpWriter.
//!
//! Uses wiremock for HTTP mocking. Tests cover the outbound request shape,
//! envelope interpretation for 200 and non-200 statuses, malformed bodies,
//! transport failures, timeouts and concurrent use.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use waysense_writer::{HttpWriter, TransportSettings, Writer, WriterConfig, WriterError};
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-key";
const API_SECRET: &str = "test-secret";

fn create_test_writer(mock_server: &MockServer, timeout: &str) -> HttpWriter {
    HttpWriter::with_settings(
        format!("{}/v1/points", mock_server.uri()),
        API_KEY,
        API_SECRET,
        timeout,
        false,
    )
    .expect("failed to create writer")
}

#[tokio::test]
async fn test_write_success() {
    let mock_server = MockServer::start().await;
    let payload = b"temperature,sensor=a value=21.5".to_vec();

    Mock::given(method("POST"))
        .and(path("/v1/points"))
        .and(header("x-waysense-api-key", API_KEY))
        .and(header("x-waysense-api-secret", API_SECRET))
        .and(body_bytes(payload.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":0,"result":"ok"}"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    let writer = create_test_writer(&mock_server, "5s");
    let written = writer.write(&payload).await.expect("write failed");

    assert_eq!(written, 0);
}

#[tokio::test]
async fn test_write_sends_no_content_type() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":0,"result":"ok"}"#))
        .mount(&mock_server)
        .await;

    let writer = create_test_writer(&mock_server, "5s");
    writer.write(b"raw bytes").await.expect("write failed");

    let requests = mock_server
        .received_requests()
        .await
        .expect("request recording enabled");
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("content-type").is_none());
    assert_eq!(requests[0].body, b"raw bytes".to_vec());
}

#[tokio::test]
async fn test_write_application_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(500).set_body_string(r#"{"code":5,"result":"server error"}"#),
        )
        .mount(&mock_server)
        .await;

    let writer = create_test_writer(&mock_server, "5s");
    let err = writer.write(b"payload").await.unwrap_err();

    match &err {
        WriterError::Application { code, result } => {
            assert_eq!(*code, 5);
            assert_eq!(result, "server error");
        }
        other => panic!("expected Application error, got {:?}", other),
    }

    let message = err.to_string();
    assert!(message.contains("server error"));
    assert!(message.contains('5'));
}

#[tokio::test]
async fn test_write_application_error_uses_envelope_not_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401).set_body_string(r#"{"code":1001,"result":"bad credentials"}"#),
        )
        .mount(&mock_server)
        .await;

    let writer = create_test_writer(&mock_server, "5s");
    let err = writer.write(b"payload").await.unwrap_err();

    assert_eq!(err.to_string(), "bad credentials with code:1001");
    assert!(!err.to_string().contains("401"));
}

#[tokio::test]
async fn test_write_non_json_success_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let writer = create_test_writer(&mock_server, "5s");
    let err = writer.write(b"payload").await.unwrap_err();

    match &err {
        WriterError::ResponseFormat { status, body } => {
            assert_eq!(*status, StatusCode::OK);
            assert_eq!(body, "not json");
        }
        other => panic!("expected ResponseFormat error, got {:?}", other),
    }
    assert_eq!(err.to_string(), "Bad code:200 response: not json");
}

#[tokio::test]
async fn test_write_non_json_error_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&mock_server)
        .await;

    let writer = create_test_writer(&mock_server, "5s");
    let err = writer.write(b"payload").await.unwrap_err();

    assert!(matches!(
        err,
        WriterError::ResponseFormat { status, .. } if status == StatusCode::BAD_GATEWAY
    ));
    assert!(err.to_string().contains("<html>Bad Gateway</html>"));
}

#[tokio::test]
async fn test_write_empty_body_is_format_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let writer = create_test_writer(&mock_server, "5s");
    let err = writer.write(b"payload").await.unwrap_err();

    assert!(matches!(err, WriterError::ResponseFormat { .. }));
}

/// Serve one connection: consume the request, answer with `response`, hang up.
async fn serve_raw_once(response: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.ends_with(b"payload") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = socket.write_all(response).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{}/v1/points", addr)
}

#[tokio::test]
async fn test_write_truncated_body_is_format_error() {
    let url = serve_raw_once(
        b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\n\r\n{\"code\":5,",
    )
    .await;

    let writer = HttpWriter::with_settings(url, API_KEY, API_SECRET, "5s", false)
        .expect("failed to create writer");
    let err = writer.write(b"payload").await.unwrap_err();

    match &err {
        WriterError::ResponseFormat { status, body } => {
            assert_eq!(*status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, r#"{"code":5,"#);
        }
        other => panic!("expected ResponseFormat error, got {:?}", other),
    }
    assert!(!err.is_transport());
    assert_eq!(err.to_string(), r#"Bad code:500 response: {"code":5,"#);
}

#[tokio::test]
async fn test_write_with_custom_transport_settings() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("x-waysense-api-key", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":0,"result":"ok"}"#))
        .expect(2)
        .mount(&mock_server)
        .await;

    let transport = TransportSettings {
        dial_timeout: Duration::from_secs(2),
        tls_handshake_timeout: Duration::from_secs(1),
        tcp_keepalive: Duration::from_secs(15),
        idle_timeout: Some(Duration::from_secs(30)),
    };
    let config = WriterConfig::new(format!("{}/v1/points", mock_server.uri()))
        .with_credentials(API_KEY, API_SECRET)
        .with_transport(transport.clone());
    assert_eq!(config.transport, transport);
    assert_eq!(config.transport.connect_timeout(), Duration::from_secs(3));

    let writer = HttpWriter::new(&config).expect("failed to create writer");
    assert_eq!(writer.write(b"first").await.expect("write failed"), 0);
    assert_eq!(writer.write(b"second").await.expect("write failed"), 0);
}

#[tokio::test]
async fn test_write_connection_refused() {
    // Grab a free port and release it so nothing is listening there.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("local addr").port()
    };

    let writer = HttpWriter::with_settings(
        format!("http://127.0.0.1:{}/v1/points", port),
        API_KEY,
        API_SECRET,
        "2s",
        false,
    )
    .expect("failed to create writer");

    let err = writer.write(b"payload").await.unwrap_err();

    assert!(err.is_transport(), "expected Transport error, got {:?}", err);
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn test_write_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"code":0,"result":"ok"}"#)
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let writer = create_test_writer(&mock_server, "100ms");
    let err = writer.write(b"payload").await.unwrap_err();

    assert!(err.is_transport());
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_set_write_timeout_has_no_effect() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(503).set_body_string(r#"{"code":9,"result":"maintenance"}"#),
        )
        .mount(&mock_server)
        .await;

    let writer = create_test_writer(&mock_server, "5s");
    let before = writer.write(b"payload").await.unwrap_err().to_string();

    for millis in [0, 1, 10, 60_000] {
        writer
            .set_write_timeout(Duration::from_millis(millis))
            .expect("set_write_timeout never fails");
    }

    let after = writer.write(b"payload").await.unwrap_err().to_string();
    assert_eq!(before, after);
    assert_eq!(writer.request_timeout(), Duration::from_secs(5));
}

#[tokio::test]
async fn test_write_through_trait_object() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":0,"result":"ok"}"#))
        .mount(&mock_server)
        .await;

    let config = WriterConfig::new(format!("{}/v1/points", mock_server.uri()))
        .with_credentials(API_KEY, API_SECRET);
    let writer: Box<dyn Writer> = Box::new(HttpWriter::new(&config).expect("writer"));

    assert_eq!(writer.write(b"payload").await.expect("write failed"), 0);
    assert!(writer.close().is_ok());
}

#[tokio::test]
async fn test_concurrent_writes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"code":0,"result":"ok"}"#))
        .expect(8)
        .mount(&mock_server)
        .await;

    let writer = Arc::new(create_test_writer(&mock_server, "5s"));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let writer = Arc::clone(&writer);
            tokio::spawn(async move {
                let payload = format!("point-{}", i);
                writer.write(payload.as_bytes()).await
            })
        })
        .collect();

    for handle in handles {
        let written = handle.await.expect("task panicked").expect("write failed");
        assert_eq!(written, 0);
    }
}
