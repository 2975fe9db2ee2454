use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chat_api::{
    ChatApiClient, ChatApiConfig, ChatApiError, ChatMessage, ChatRequest, ChatStreamEvent,
    RetryPolicy,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

fn allow_local_integration() -> bool {
    std::env::var("CHAT_API_ALLOW_LOCAL_INTEGRATION")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false)
}

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
enum ScriptedResponse {
    Respond {
        status: u16,
        content_type: &'static str,
        chunks: Vec<ResponseChunk>,
    },
    Reset,
}

struct ScriptedServer {
    base_url: String,
    request_count: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(scripts: Vec<ScriptedResponse>) -> Self {
        let scripts = Arc::new(scripts);
        let request_count = Arc::new(AtomicUsize::new(0));
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener
            .local_addr()
            .expect("resolved local listener address");
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn({
            let scripts = Arc::clone(&scripts);
            let request_count = Arc::clone(&request_count);

            async move {
                loop {
                    let (socket, _) = match listener.accept().await {
                        Ok(pair) => pair,
                        Err(_) => break,
                    };
                    let scripts = Arc::clone(&scripts);
                    let request_count = Arc::clone(&request_count);
                    tokio::spawn(async move {
                        serve_one(socket, scripts, request_count).await;
                    });
                }
            }
        });

        Self {
            base_url,
            request_count,
            handle,
        }
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        self.handle.abort();
    }
}

fn response_sse(status: u16, frames: &[&str]) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "text/event-stream",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: sse_frames(frames),
        }],
    }
}

fn response_json(status: u16, body: &str) -> ScriptedResponse {
    ScriptedResponse::Respond {
        status,
        content_type: "application/json",
        chunks: vec![ResponseChunk {
            delay_ms: 0,
            bytes: body.as_bytes().to_vec(),
        }],
    }
}

fn sse_frames(frames: &[&str]) -> Vec<u8> {
    let mut body = String::new();

    for frame in frames {
        body.push_str("data: ");
        body.push_str(frame);
        body.push_str("\n\n");
    }

    body.into_bytes()
}

fn request() -> ChatRequest {
    ChatRequest::new("gpt-test", vec![ChatMessage::new("user", "hi")])
}

fn client_for(server: &ScriptedServer) -> ChatApiClient {
    let config = ChatApiConfig::new("tok")
        .with_base_url(&server.base_url)
        .with_retry(RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(20),
        });
    ChatApiClient::new(config).expect("client")
}

#[tokio::test]
async fn stream_integration_successful_completion() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[
            r##"{"choices":[{"delta":{"content":"hello"}}]}"##,
            r##"{"choices":[{"delta":{},"finish_reason":"stop"}]}"##,
            "[DONE]",
        ],
    )])
    .await;

    let events = client_for(&server)
        .stream(&request())
        .await
        .expect("stream should succeed");

    assert_eq!(
        events,
        vec![
            ChatStreamEvent::TextDelta {
                delta: "hello".to_string()
            },
            ChatStreamEvent::Finished {
                reason: "stop".to_string()
            },
        ]
    );

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_in_band_error_fails_stream() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_sse(
        200,
        &[r##"{"error":{"code":"server_error","message":"bad"}}"##],
    )])
    .await;

    let error = client_for(&server)
        .stream(&request())
        .await
        .expect_err("stream should fail");

    assert!(matches!(error, ChatApiError::StreamFailed { ref message, .. } if message == "bad"));

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_retryable_then_success() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        response_json(503, r##"{"error":{"message":"overloaded"}}"##),
        response_sse(200, &[r##"{"choices":[{"delta":{"content":"ok"}}]}"##, "[DONE]"]),
    ])
    .await;

    let events = timeout(Duration::from_secs(5), client_for(&server).stream(&request()))
        .await
        .expect("retry path should be bounded")
        .expect("stream should eventually succeed");

    assert_eq!(events.len(), 1);
    assert_eq!(server.request_count(), 2);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_unauthorized_is_not_retried() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![response_json(
        401,
        r##"{"error":{"message":"Incorrect API key provided"}}"##,
    )])
    .await;

    let error = client_for(&server)
        .stream(&request())
        .await
        .expect_err("stream should fail");

    assert!(matches!(error, ChatApiError::Status(code, _) if code.as_u16() == 401));
    assert_eq!(server.request_count(), 1);

    server.shutdown();
}

#[tokio::test]
async fn stream_integration_delayed_chunks_arrive_in_order() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![ScriptedResponse::Respond {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: sse_frames(&[r##"{"choices":[{"delta":{"content":"one "}}]}"##]),
            },
            ResponseChunk {
                delay_ms: 100,
                bytes: sse_frames(&[r##"{"choices":[{"delta":{"content":"two"}}]}"##, "[DONE]"]),
            },
        ],
    }])
    .await;

    let client = client_for(&server);
    let mut stream = client.open_stream(&request()).await.expect("stream opens");
    let mut text = String::new();
    while let Some(event) = stream.next_event().await {
        if let ChatStreamEvent::TextDelta { delta } = event.expect("event") {
            text.push_str(&delta);
        }
    }

    assert_eq!(text, "one two");
    server.shutdown();
}

#[tokio::test]
async fn stream_integration_connection_reset_then_retry_exhausted() {
    if !allow_local_integration() {
        return;
    }

    let server = ScriptedServer::new(vec![
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
        ScriptedResponse::Reset,
    ])
    .await;

    let result = timeout(Duration::from_secs(5), client_for(&server).stream(&request()))
        .await
        .expect("retry path should resolve")
        .expect_err("connection reset should surface as failure");

    assert!(matches!(
        result,
        ChatApiError::RetryExhausted { status: None, .. }
    ));
    assert!(server.request_count() >= 4);

    server.shutdown();
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Error",
    }
}

async fn serve_one(
    mut socket: TcpStream,
    scripts: Arc<Vec<ScriptedResponse>>,
    request_count: Arc<AtomicUsize>,
) {
    if read_request_headers(&mut socket).await.is_err() {
        return;
    }

    let index = request_count.fetch_add(1, Ordering::AcqRel);
    let response = scripts
        .get(index)
        .cloned()
        .unwrap_or_else(|| response_json(500, r##"{"error":"unexpected request"}"##));

    match response {
        ScriptedResponse::Reset => {}
        ScriptedResponse::Respond {
            status,
            content_type,
            chunks,
        } => {
            let headers = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                status_reason(status),
                content_type,
            );

            if socket.write_all(headers.as_bytes()).await.is_err() {
                return;
            }

            for chunk in chunks {
                if chunk.delay_ms > 0 {
                    sleep(Duration::from_millis(chunk.delay_ms)).await;
                }
                let prefix = format!("{:X}\r\n", chunk.bytes.len());
                if socket.write_all(prefix.as_bytes()).await.is_err() {
                    return;
                }
                if socket.write_all(&chunk.bytes).await.is_err() {
                    return;
                }
                if socket.write_all(b"\r\n").await.is_err() {
                    return;
                }
            }

            let _ = socket.write_all(b"0\r\n\r\n").await;
            let _ = socket.shutdown().await;
        }
    }
}

async fn read_request_headers(socket: &mut TcpStream) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buffer = [0_u8; 2048];

    loop {
        let n = socket.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buffer[..n]);
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            return Ok(());
        }
    }
}
