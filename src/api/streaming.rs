//! Server-Sent Events (SSE) relay for streamed generations.
//!
//! Upstream [`StreamEvent`]s are pulled one at a time and re-emitted as SSE
//! frames: `data: {"delta": ...}` per chunk, then exactly one terminal
//! `event: done` or `event: error` frame.

use crate::api::disconnect::DisconnectStream;
use crate::api::models::{GenerationResult, StreamChunk};
use crate::core::error_types::{SSE_EVENT_DONE, SSE_EVENT_ERROR};
use crate::core::metrics::{record_token_usage, try_get_metrics};
use crate::core::{AppError, StreamCancelHandle};
use crate::services::{ChunkStream, StreamEvent};
use crate::transformer::{format_sse_data, format_sse_event};
use axum::body::Body;
use bytes::Bytes;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::convert::Infallible;
use std::time::Instant;

struct RelayState {
    upstream: ChunkStream,
    cancel: StreamCancelHandle,
    model: String,
    start_time: Instant,
    first_chunk_time: Option<Instant>,
    finished: bool,
}

enum Pulled {
    Cancelled,
    Next(Option<crate::core::Result<StreamEvent>>),
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize SSE payload");
        "{}".to_string()
    })
}

fn done_frame(result: &GenerationResult) -> Bytes {
    Bytes::from(format_sse_event(Some(SSE_EVENT_DONE), &to_json(result)))
}

fn error_frame(error: &AppError) -> Bytes {
    Bytes::from(format_sse_event(
        Some(SSE_EVENT_ERROR),
        &to_json(&error.to_body()),
    ))
}

fn delta_frame(delta: String) -> Bytes {
    Bytes::from(format_sse_data(&to_json(&StreamChunk { delta })))
}

/// Turn an upstream chunk stream into SSE frames.
///
/// The next upstream event is only requested when the body asks for the next
/// frame, and each pull races the cancellation signal.
pub fn relay_stream(
    upstream: ChunkStream,
    cancel: StreamCancelHandle,
    model: String,
) -> BoxStream<'static, Result<Bytes, Infallible>> {
    let state = RelayState {
        upstream,
        cancel,
        model,
        start_time: Instant::now(),
        first_chunk_time: None,
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let pulled = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => Pulled::Cancelled,
            next = state.upstream.next() => Pulled::Next(next),
        };

        let frame = match pulled {
            Pulled::Cancelled => {
                tracing::debug!(model = %state.model, "Relay stopped after cancellation");
                return None;
            }
            Pulled::Next(Some(Ok(StreamEvent::Delta(delta)))) => {
                if state.first_chunk_time.is_none() {
                    let now = Instant::now();
                    state.first_chunk_time = Some(now);
                    if let Some(metrics) = try_get_metrics() {
                        metrics
                            .ttft
                            .with_label_values(&[&state.model])
                            .observe(now.duration_since(state.start_time).as_secs_f64());
                    }
                }
                delta_frame(delta)
            }
            Pulled::Next(Some(Ok(StreamEvent::Done(result)))) => {
                if let Some(usage) = result.usage {
                    record_token_usage(
                        &result.model,
                        usage.prompt_tokens as u64,
                        usage.completion_tokens as u64,
                        usage.total_tokens as u64,
                    );
                }
                tracing::debug!(
                    model = %state.model,
                    duration = state.start_time.elapsed().as_secs_f64(),
                    finish_reason = ?result.finish_reason,
                    "Stream completed"
                );
                state.finished = true;
                state.cancel.mark_completed();
                done_frame(&result)
            }
            Pulled::Next(Some(Err(error))) => {
                error.record();
                state.finished = true;
                state.cancel.mark_completed();
                error_frame(&error)
            }
            Pulled::Next(None) => {
                let error = AppError::UpstreamMalformedResponse(
                    "Upstream stream ended without a terminal event".to_string(),
                );
                error.record();
                state.finished = true;
                state.cancel.mark_completed();
                error_frame(&error)
            }
        };

        Some((Ok(frame), state))
    })
    .boxed()
}

/// Build the SSE response for a relay, cancelling `cancel` if the caller
/// drops the body before the terminal frame.
pub fn sse_response(
    frames: BoxStream<'static, Result<Bytes, Infallible>>,
    cancel: StreamCancelHandle,
) -> Response {
    let body = Body::from_stream(DisconnectStream::new(frames, cancel));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::FinishReason;
    use pretty_assertions::assert_eq;

    fn result(text: &str) -> GenerationResult {
        GenerationResult {
            text: text.to_string(),
            model: "m".to_string(),
            finish_reason: Some(FinishReason::Stop),
            usage: None,
        }
    }

    async fn collect_frames(upstream: ChunkStream, cancel: StreamCancelHandle) -> Vec<String> {
        relay_stream(upstream, cancel, "m".to_string())
            .map(|frame| String::from_utf8(frame.unwrap().to_vec()).unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_relay_deltas_then_done() {
        let upstream: ChunkStream = futures::stream::iter(vec![
            Ok(StreamEvent::Delta("HEL".into())),
            Ok(StreamEvent::Delta("LO".into())),
            Ok(StreamEvent::Done(result("HELLO"))),
        ])
        .boxed();
        let cancel = StreamCancelHandle::new();

        let frames = collect_frames(upstream, cancel.clone()).await;

        assert_eq!(
            frames,
            vec![
                "data: {\"delta\":\"HEL\"}\n\n".to_string(),
                "data: {\"delta\":\"LO\"}\n\n".to_string(),
                "event: done\ndata: {\"text\":\"HELLO\",\"model\":\"m\",\"finish_reason\":\"stop\"}\n\n"
                    .to_string(),
            ]
        );
        assert!(cancel.is_completed());
    }

    #[tokio::test]
    async fn test_relay_stops_pulling_after_done() {
        let upstream: ChunkStream = futures::stream::iter(vec![
            Ok(StreamEvent::Done(result(""))),
            Ok(StreamEvent::Delta("late".into())),
        ])
        .boxed();

        let frames = collect_frames(upstream, StreamCancelHandle::new()).await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].starts_with("event: done\n"));
    }

    #[tokio::test]
    async fn test_relay_error_mid_stream() {
        let upstream: ChunkStream = futures::stream::iter(vec![
            Ok(StreamEvent::Delta("partial".into())),
            Err(AppError::UpstreamRateLimit("quota".into())),
        ])
        .boxed();

        let frames = collect_frames(upstream, StreamCancelHandle::new()).await;
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[1],
            "event: error\ndata: {\"error_kind\":\"UpstreamRateLimitError\",\"message\":\"quota\"}\n\n"
        );
    }

    #[tokio::test]
    async fn test_relay_missing_terminal_event() {
        let upstream: ChunkStream =
            futures::stream::iter(vec![Ok(StreamEvent::Delta("x".into()))]).boxed();

        let frames = collect_frames(upstream, StreamCancelHandle::new()).await;
        assert_eq!(frames.len(), 2);
        assert!(frames[1].starts_with("event: error\n"));
        assert!(frames[1].contains("UpstreamMalformedResponseError"));
    }

    #[tokio::test]
    async fn test_relay_cancelled_stops() {
        let upstream: ChunkStream = futures::stream::pending().boxed();
        let cancel = StreamCancelHandle::new();
        cancel.cancel();

        let frames = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            collect_frames(upstream, cancel),
        )
        .await
        .expect("relay did not stop after cancellation");
        assert!(frames.is_empty());
    }

    #[test]
    fn test_sse_response_headers() {
        let frames = futures::stream::empty().boxed();
        let response = sse_response(frames, StreamCancelHandle::new());

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::CONNECTION], "keep-alive");
        assert_eq!(headers["x-accel-buffering"], "no");
    }
}
