use crate::state::AppState;
use axum::{
    extract::State,
    http::{self, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use courier::backend::get_backend;
use courier::envelope::Envelope;
use courier::protocol::{self, ChatCompletionRequest, ChatCompletionResponse};
use futures::{Stream, StreamExt};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Optional header carrying the orchestration thread id
pub const THREAD_ID_HEADER: &str = "x-ibm-thread-id";

// Custom SSE response type streaming envelope frames to the client
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> axum::response::Response {
        let stream = self;
        let body = axum::body::Body::from_stream(stream);

        http::Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .body(body)
            .unwrap()
    }
}

/// Header then extra_body, defaulting to an empty correlation id
fn resolve_thread_id(headers: &HeaderMap, request: &ChatCompletionRequest) -> String {
    let mut thread_id = headers
        .get(THREAD_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_string();
    if let Some(extra_body) = &request.extra_body {
        if let Some(id) = &extra_body.thread_id {
            thread_id = id.clone();
        }
    }
    thread_id
}

async fn completions_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<axum::response::Response, StatusCode> {
    // Any bearer token or api key is accepted; the fronting orchestrator is trusted
    let _credentials = headers
        .get(http::header::AUTHORIZATION)
        .or_else(|| headers.get("x-api-key"));

    let thread_id = resolve_thread_id(&headers, &request);
    tracing::info!(thread_id = %thread_id, stream = request.stream, "chat completion request");

    let mut backend_config = state.backend_config.clone();
    if let Some(model) = &request.model {
        backend_config = backend_config.with_model(model);
    }
    let backend = get_backend(backend_config).map_err(|e| {
        tracing::error!("Failed to build backend: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let messages = protocol::to_messages(&request.messages);

    if !request.stream {
        let reply = backend.reply_sync(&messages).await.map_err(|e| {
            tracing::error!("Upstream call failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        let response = ChatCompletionResponse::completion(backend.model(), &reply.text());
        return Ok(Json(response).into_response());
    }

    let model = backend.model().to_string();

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);

    // Spawn task to handle streaming
    tokio::spawn(async move {
        let mut events = match backend.reply_stream(&messages).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Failed to start reply stream: {}", e);
                let _ = tx.send(format!("Error: {}\n", e)).await;
                return;
            }
        };

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if let Some(frame) = Envelope::from_event(event, &thread_id, &model) {
                        if tx.send(frame.encode()).await.is_err() {
                            // client went away
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Error in upstream stream: {}", e);
                    let _ = tx.send(format!("Error: {}\n", e)).await;
                    break;
                }
            }
        }
    });

    Ok(SseResponse::new(stream).into_response())
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat/completions", post(completions_handler))
        .with_state(state)
}
