//! Mock completion backend that streams cumulative text, one chunk per token.

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::config::MockBackendConfig;
use crate::models::CompletionRequest;

/// Word emitted for every generated token
const TOKEN_WORD: &str = "tok";

/// Mock backend server for benchmarking
pub struct MockBackend {
    config: MockBackendConfig,
    shutdown_tx: Option<oneshot::Sender<()>>,
    port: u16,
}

impl MockBackend {
    /// Create a new mock backend with the given configuration
    pub fn new(config: MockBackendConfig) -> Self {
        Self {
            config,
            shutdown_tx: None,
            port: 0,
        }
    }

    /// Start the mock backend and return the actual port
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("127.0.0.1:{}", self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        self.port = port;

        let config = Arc::new(self.config.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let app = Router::new()
            .route("/v1/completions", post(handle_completion))
            .with_state(config);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, as registered with the dispatcher
    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.address())
    }

    /// Stop the mock backend
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle POST /v1/completions
async fn handle_completion(
    State(config): State<Arc<MockBackendConfig>>,
    Json(request): Json<CompletionRequest>,
) -> Response {
    // Simulate random errors
    if config.error_rate > 0.0 && rand::thread_rng().gen::<f64>() < config.error_rate {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Simulated error").into_response();
    }

    let stream = generate_stream(config, request.max_tokens);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        Body::from_stream(stream),
    )
        .into_response()
}

/// One chunk per requested token, each holding all text generated so far
fn generate_stream(
    config: Arc<MockBackendConfig>,
    max_tokens: u32,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> {
    async_stream::stream! {
        let first = tokio::time::Duration::from_millis(config.first_token_latency_ms);
        let per_token = tokio::time::Duration::from_millis(config.token_latency_ms);
        let mut text = String::new();

        for i in 0..max_tokens {
            tokio::time::sleep(if i == 0 { first } else { per_token }).await;

            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(TOKEN_WORD);

            yield Ok(cumulative_chunk(&text));
        }
    }
}

/// `{"text": ["<text>"]}` terminated by a NUL byte
fn cumulative_chunk(text: &str) -> Bytes {
    let json = serde_json::to_vec(&serde_json::json!({ "text": [text] })).unwrap_or_default();

    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.put_slice(&json);
    buf.put_u8(0);
    buf.freeze()
}
