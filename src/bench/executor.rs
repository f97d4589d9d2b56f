//! Per-request client: resolve a backend through the dispatcher, then stream
//! the completion from it and time every chunk.

use futures::StreamExt;
use reqwest::{header, redirect, Client, Url};
use std::time::{Duration, Instant};

use super::config::BenchmarkConfig;
use super::dataset::SyntheticRequest;
use super::recorder::LatencySample;
use crate::error::{Result, RouterError};
use crate::models::CompletionRequest;

/// Executes benchmark requests against a redirecting dispatcher
#[derive(Clone)]
pub struct RequestExecutor {
    client: Client,
    forward_url: String,
    model: String,
    temperature: f64,
    top_p: f64,
    backoff: Duration,
}

impl RequestExecutor {
    pub fn new(config: &BenchmarkConfig) -> Result<Self> {
        // Redirects are followed by hand so the resolve step can be timed apart
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(500)
            .build()?;

        Ok(Self {
            client,
            forward_url: config.forward_url(),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            backoff: Duration::from_millis(config.resolve_backoff_ms),
        })
    }

    /// Completion body sent both to the dispatcher and to the backend
    pub fn payload(&self, request: &SyntheticRequest) -> CompletionRequest {
        CompletionRequest {
            temperature: self.temperature,
            top_p: self.top_p,
            ..CompletionRequest::benchmark(request.prompt.clone(), request.output_len, &self.model)
        }
    }

    /// Resolve, then stream. Any error means the request is dropped.
    pub async fn execute(&self, request: &SyntheticRequest) -> Result<LatencySample> {
        let payload = self.payload(request);

        let backend_url = self.resolve(&payload).await?;
        tracing::debug!(request = request.index, "Redirect URL: {}", backend_url);

        let timing = self.stream(&backend_url, &payload).await?;

        Ok(LatencySample {
            input_len: request.input_len,
            output_len: request.output_len,
            latency: timing.total,
            token_latencies: timing.token_latencies,
            time_to_first_token: timing.time_to_first_token,
        })
    }

    /// POST to the dispatcher until it answers with a redirect.
    ///
    /// Non-redirect answers are retried forever after a fixed backoff; only a
    /// transport failure ends the loop with an error.
    pub async fn resolve(&self, payload: &CompletionRequest) -> Result<Url> {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            let response = self
                .client
                .post(&self.forward_url)
                .json(payload)
                .send()
                .await?;

            let status = response.status();
            if status.is_redirection() {
                let target = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| response.url().join(location).ok());
                if let Some(url) = target {
                    return Ok(url);
                }
            }

            tracing::warn!(
                status = %status,
                attempt,
                "Did not get backend URL from load balancer. Trying again."
            );
            tokio::time::sleep(self.backoff).await;
        }
    }

    /// Stream the completion and time each chunk boundary.
    ///
    /// Each chunk carries the whole response so far, so chunk arrival times are
    /// the only per-token signal; their contents are not accumulated.
    pub async fn stream(&self, backend_url: &Url, payload: &CompletionRequest) -> Result<StreamTiming> {
        let start = Instant::now();

        let response = self
            .client
            .post(backend_url.clone())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RouterError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let mut stream = response.bytes_stream();
        let mut previous = start;
        let mut time_to_first_token = None;
        let mut token_latencies = Vec::new();

        while let Some(chunk) = stream.next().await {
            if chunk?.is_empty() {
                continue;
            }
            let now = Instant::now();
            let gap = now.duration_since(previous);
            if time_to_first_token.is_none() {
                time_to_first_token = Some(gap);
            } else {
                token_latencies.push(gap);
            }
            previous = now;
        }

        let time_to_first_token = time_to_first_token.ok_or_else(|| {
            RouterError::Protocol("backend closed the stream without sending a chunk".to_string())
        })?;

        Ok(StreamTiming {
            total: start.elapsed(),
            time_to_first_token,
            token_latencies,
        })
    }
}

/// Chunk timing of one streamed completion
#[derive(Debug, Clone, PartialEq)]
pub struct StreamTiming {
    pub total: Duration,
    pub time_to_first_token: Duration,
    pub token_latencies: Vec<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::dataset::{RequestLengths, SyntheticRequest};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn executor_for(dispatch_url: String) -> RequestExecutor {
        let config = BenchmarkConfig {
            dispatch_url,
            resolve_backoff_ms: 10,
            timeout_secs: 10,
            ..Default::default()
        };
        RequestExecutor::new(&config).unwrap()
    }

    fn request() -> SyntheticRequest {
        SyntheticRequest::new(
            0,
            RequestLengths {
                input_len: 4,
                output_len: 3,
            },
        )
    }

    #[test]
    fn test_payload_carries_generation_parameters() {
        let config = BenchmarkConfig {
            temperature: 0.7,
            top_p: 0.9,
            model: "test-model".to_string(),
            ..Default::default()
        };
        let executor = RequestExecutor::new(&config).unwrap();
        let payload = executor.payload(&request());

        assert_eq!(payload.prompt, "hi hi hi hi ");
        assert_eq!(payload.max_tokens, 3);
        assert_eq!(payload.temperature, 0.7);
        assert_eq!(payload.top_p, 0.9);
        assert_eq!(payload.model, "test-model");
        assert!(payload.ignore_eos);
        assert!(payload.stream);
    }

    #[tokio::test]
    async fn test_execute_follows_redirect_to_backend() {
        let mut server = mockito::Server::new_async().await;
        let backend_url = format!("{}/v1/completions", server.url());

        let dispatch = server
            .mock("POST", "/forward")
            .with_status(307)
            .with_header("location", &backend_url)
            .create_async()
            .await;
        let backend = server
            .mock("POST", "/v1/completions")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"max_tokens": 3, "stream": true}),
            ))
            .with_status(200)
            .with_body("{\"text\": [\"hi hi hi hi tok tok tok\"]}\0")
            .create_async()
            .await;

        let sample = executor_for(server.url())
            .execute(&request())
            .await
            .unwrap();

        assert_eq!(sample.input_len, 4);
        assert_eq!(sample.output_len, 3);
        assert!(sample.latency >= sample.time_to_first_token);
        dispatch.assert_async().await;
        backend.assert_async().await;
    }

    #[tokio::test]
    async fn test_relative_location_is_resolved_against_dispatcher() {
        let mut server = mockito::Server::new_async().await;
        let _dispatch = server
            .mock("POST", "/forward")
            .with_status(302)
            .with_header("location", "/v1/completions")
            .create_async()
            .await;

        let executor = executor_for(server.url());
        let url = executor.resolve(&executor.payload(&request())).await.unwrap();
        assert_eq!(url.as_str(), format!("{}/v1/completions", server.url()));
    }

    #[tokio::test]
    async fn test_backend_error_status_drops_request() {
        let mut server = mockito::Server::new_async().await;
        let backend_url = format!("{}/v1/completions", server.url());
        let _dispatch = server
            .mock("POST", "/forward")
            .with_status(307)
            .with_header("location", &backend_url)
            .create_async()
            .await;
        let _backend = server
            .mock("POST", "/v1/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let err = executor_for(server.url())
            .execute(&request())
            .await
            .unwrap_err();
        match err {
            RouterError::Backend { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected backend error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_is_protocol_error() {
        let mut server = mockito::Server::new_async().await;
        let backend_url = format!("{}/v1/completions", server.url());
        let _dispatch = server
            .mock("POST", "/forward")
            .with_status(307)
            .with_header("location", &backend_url)
            .create_async()
            .await;
        let _backend = server
            .mock("POST", "/v1/completions")
            .with_status(200)
            .create_async()
            .await;

        let err = executor_for(server.url())
            .execute(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Protocol(_)));
    }

    /// Dispatcher that answers 503 to the first `refusals` requests, then redirects
    async fn flaky_dispatcher(refusals: usize) -> (String, Arc<AtomicUsize>) {
        use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Router};

        async fn forward(
            State((calls, refusals)): State<(Arc<AtomicUsize>, usize)>,
        ) -> impl IntoResponse {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if call < refusals {
                StatusCode::SERVICE_UNAVAILABLE.into_response()
            } else {
                (
                    StatusCode::TEMPORARY_REDIRECT,
                    [(header::LOCATION, "http://10.1.2.3:8000/v1/completions")],
                )
                    .into_response()
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/forward", post(forward))
            .with_state((calls.clone(), refusals));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        (url, calls)
    }

    #[tokio::test]
    async fn test_resolve_retries_until_redirect() {
        let (url, calls) = flaky_dispatcher(3).await;
        let executor = executor_for(url);

        let target = executor.resolve(&executor.payload(&request())).await.unwrap();
        assert_eq!(target.as_str(), "http://10.1.2.3:8000/v1/completions");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_resolve_never_gives_up_on_refusals() {
        let (url, calls) = flaky_dispatcher(usize::MAX).await;
        let executor = executor_for(url);
        let payload = executor.payload(&request());

        let outcome =
            tokio::time::timeout(Duration::from_millis(300), executor.resolve(&payload)).await;
        // Still retrying when the deadline hits, not failed
        assert!(outcome.is_err());
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_unreachable_dispatcher_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = executor_for(format!("http://127.0.0.1:{}", port))
            .execute(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Transport(_)));
    }
}
