//! # HTTP Engine Adapter
//!
//! Runs a request against an external engine service. The service answers
//! `POST /v1/run` with a newline-delimited JSON body of items tagged by
//! `kind`: any number of `event` items followed by one `result` or `error`.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EngineError, EngineOutput, EngineRequest, ReasoningEngine};
use crate::config::{ConfigurationError, EngineConfig};
use crate::constants::error_types;
use crate::events::StreamEvent;

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EngineStreamItem {
    Event {
        event: StreamEvent,
    },
    Result {
        #[serde(default)]
        payload: Value,
    },
    Error {
        message: String,
        #[serde(default)]
        error_type: Option<String>,
    },
}

impl EngineStreamItem {
    fn into_error(message: String, error_type: Option<String>) -> EngineError {
        match error_type.as_deref() {
            Some(error_types::INVALID_INPUT) => EngineError::InvalidInput(message),
            _ => EngineError::Failed(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: Client,
    run_url: Url,
    max_line_bytes: usize,
}

impl HttpEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigurationError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ConfigurationError::invalid_value("engine.base_url", &config.base_url, e.to_string())
        })?;
        let run_url = base_url.join("/v1/run").map_err(|e| {
            ConfigurationError::invalid_value("engine.base_url", &config.base_url, e.to_string())
        })?;

        // No overall request timeout: runs are bounded by the activity's execution limit
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .user_agent(format!("taskrelay-worker/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigurationError::load_failed("engine http client", e.to_string()))?;

        info!(run_url = %run_url, "Created HTTP engine adapter");
        Ok(Self {
            client,
            run_url,
            max_line_bytes: config.max_line_bytes.max(1),
        })
    }

    async fn stream_run(
        &self,
        request: &EngineRequest,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<EngineOutput, EngineError> {
        let response = self
            .client
            .post(self.run_url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| EngineError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(match status.as_u16() {
                400 | 422 => EngineError::InvalidInput(body),
                _ if status.is_server_error() => {
                    EngineError::Transport(format!("HTTP {status}: {body}"))
                }
                _ => EngineError::Failed(format!("HTTP {status}: {body}")),
            });
        }

        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
                self.check_line_length(newline)?;
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                if let Some(outcome) = Self::handle_line(&line, events).await? {
                    return Ok(outcome);
                }
            }
            // what remains is a partial line
            self.check_line_length(buffer.len())?;

            match body.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Err(EngineError::Transport(e.to_string())),
                None => break,
            }
        }

        // final line without a trailing newline
        if let Some(outcome) = Self::handle_line(&buffer, events).await? {
            return Ok(outcome);
        }
        Err(EngineError::Transport(
            "engine stream ended without a result".to_string(),
        ))
    }

    fn check_line_length(&self, length: usize) -> Result<(), EngineError> {
        if length > self.max_line_bytes {
            return Err(EngineError::Transport(format!(
                "engine stream line exceeds {} bytes",
                self.max_line_bytes
            )));
        }
        Ok(())
    }

    async fn handle_line(
        line: &[u8],
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<Option<EngineOutput>, EngineError> {
        let line = line.trim_ascii();
        if line.is_empty() {
            return Ok(None);
        }
        let item: EngineStreamItem = serde_json::from_slice(line)
            .map_err(|e| EngineError::Transport(format!("malformed engine item: {e}")))?;

        match item {
            EngineStreamItem::Event { event } => {
                if events.send(event).await.is_err() {
                    debug!("Event receiver closed, dropping engine event");
                }
                Ok(None)
            }
            EngineStreamItem::Result { payload } => Ok(Some(EngineOutput { payload })),
            EngineStreamItem::Error {
                message,
                error_type,
            } => Err(EngineStreamItem::into_error(message, error_type)),
        }
    }
}

#[async_trait]
impl ReasoningEngine for HttpEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn run(
        &self,
        request: EngineRequest,
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<EngineOutput, EngineError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(workflow_id = %request.workflow_id, "Engine run cancelled, aborting request");
                Err(EngineError::Cancelled)
            }
            outcome = self.stream_run(&request, &events) => outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StreamEventType;
    use axum::routing::post;
    use axum::Router;
    use serde_json::json;
    use tokio::net::TcpListener;
    use uuid::Uuid;

    async fn spawn_engine(body: &'static str, status: u16) -> String {
        let app = Router::new().route(
            "/v1/run",
            post(move || async move {
                (
                    axum::http::StatusCode::from_u16(status).unwrap(),
                    body.to_string(),
                )
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request() -> EngineRequest {
        EngineRequest {
            workflow_id: Uuid::new_v4(),
            attempt: 1,
            task_payload: json!({"query": "count rows"}),
            continuation_id: None,
            session_id: Some("s1".to_string()),
        }
    }

    fn engine(base_url: String) -> HttpEngine {
        HttpEngine::new(&EngineConfig {
            base_url,
            ..EngineConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_streams_events_then_result() {
        let body = concat!(
            r#"{"kind":"event","event":{"type":"progress","data":{"message":"planning"}}}"#,
            "\n",
            r#"{"kind":"event","event":{"type":"artifact","data":{"sql":"SELECT count(*) FROM t"}}}"#,
            "\n",
            r#"{"kind":"result","payload":{"rows":[[42]]}}"#
        );
        let engine = engine(spawn_engine(body, 200).await);
        let (tx, mut rx) = mpsc::channel(8);

        let output = engine
            .run(request(), tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.payload, json!({"rows": [[42]]}));

        assert_eq!(rx.recv().await.unwrap().event_type, StreamEventType::Progress);
        assert_eq!(rx.recv().await.unwrap().event_type, StreamEventType::Artifact);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_error_item_maps_to_engine_error() {
        let body = "{\"kind\":\"error\",\"message\":\"unknown table\",\"error_type\":\"InvalidInput\"}\n";
        let engine = engine(spawn_engine(body, 200).await);
        let (tx, _rx) = mpsc::channel(8);

        let err = engine
            .run(request(), tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::InvalidInput("unknown table".to_string()));
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let engine = engine(spawn_engine("overloaded", 503).await);
        let (tx, _rx) = mpsc::channel(8);
        let err = engine
            .run(request(), tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unterminated_line_is_capped() {
        let body = r#"{"kind":"event","event":{"type":"progress","data":{"message":"never ends"}}}"#;
        let engine = HttpEngine::new(&EngineConfig {
            base_url: spawn_engine(body, 200).await,
            max_line_bytes: 32,
            ..EngineConfig::default()
        })
        .unwrap();
        let (tx, _rx) = mpsc::channel(8);

        let err = engine
            .run(request(), tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Transport("engine stream line exceeds 32 bytes".to_string())
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_response() {
        let engine = engine("http://127.0.0.1:9".to_string());
        let (tx, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine.run(request(), tx, cancel).await.unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
    }
}
