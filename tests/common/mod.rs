//! Shared helpers for the integration tests.
//!
//! `ScriptedClient` stands in for the upstream provider so the HTTP surface
//! can be exercised without network access.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use futures::StreamExt;
use gemini_gateway::{
    api::models::{ConversationTurn, GenerationResult},
    build_router,
    core::{AppConfig, AppError, Result, StreamCancelHandle},
    services::{ChunkStream, GenerationInput, GenerationOptions, ModelClient, StreamEvent},
    AppState,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// How the double answers a call.
#[derive(Clone)]
pub enum Script {
    /// Answer with this text; streams split it into `chunk_size` character deltas
    Reply { text: String, chunk_size: usize },
    /// Fail every call with a credential rejection
    AuthFailure,
    /// Stream the first delta of `text`, then fail with a rate limit
    FailMidStream { text: String },
    /// Stream ticks forever until cancelled
    Endless,
}

#[derive(Clone)]
pub struct ScriptedClient {
    script: Script,
    pub calls: Arc<AtomicUsize>,
    pub cancelled: Arc<AtomicBool>,
    pub cancel_notify: Arc<Notify>,
    pub last_options: Arc<Mutex<Option<GenerationOptions>>>,
}

impl ScriptedClient {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicBool::new(false)),
            cancel_notify: Arc::new(Notify::new()),
            last_options: Arc::new(Mutex::new(None)),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(Script::Reply {
            text: text.to_string(),
            chunk_size: 3,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self, options: &GenerationOptions) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().unwrap() = Some(options.clone());
    }

    fn result(text: &str, options: &GenerationOptions) -> GenerationResult {
        GenerationResult {
            text: text.to_string(),
            model: options.model.clone(),
            finish_reason: None,
            usage: None,
        }
    }

    fn reply(&self, options: &GenerationOptions) -> Result<GenerationResult> {
        match &self.script {
            Script::Reply { text, .. } | Script::FailMidStream { text } => {
                Ok(Self::result(text, options))
            }
            Script::AuthFailure => Err(AppError::UpstreamAuth("API key not valid".to_string())),
            Script::Endless => Ok(Self::result("", options)),
        }
    }
}

fn split_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[async_trait]
impl ModelClient for ScriptedClient {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate_once(
        &self,
        _prompt: &str,
        _system_instruction: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        self.record_call(options);
        self.reply(options)
    }

    async fn generate_chat(
        &self,
        _turns: &[ConversationTurn],
        options: &GenerationOptions,
    ) -> Result<GenerationResult> {
        self.record_call(options);
        self.reply(options)
    }

    async fn generate_stream(
        &self,
        _input: GenerationInput,
        options: GenerationOptions,
        cancel: StreamCancelHandle,
    ) -> Result<ChunkStream> {
        self.record_call(&options);

        match self.script.clone() {
            Script::Reply { text, chunk_size } => {
                let mut events: Vec<Result<StreamEvent>> = split_chars(&text, chunk_size)
                    .into_iter()
                    .map(|delta| Ok(StreamEvent::Delta(delta)))
                    .collect();
                events.push(Ok(StreamEvent::Done(Self::result(&text, &options))));
                Ok(futures::stream::iter(events).boxed())
            }
            Script::AuthFailure => Err(AppError::UpstreamAuth("API key not valid".to_string())),
            Script::FailMidStream { text } => {
                let first = split_chars(&text, 3).into_iter().next().unwrap_or_default();
                let events: Vec<Result<StreamEvent>> = vec![
                    Ok(StreamEvent::Delta(first)),
                    Err(AppError::UpstreamRateLimit("quota exhausted".to_string())),
                ];
                Ok(futures::stream::iter(events).boxed())
            }
            Script::Endless => {
                // The relay drops this stream on disconnect, so the signal is
                // observed from a separate task.
                let cancelled = self.cancelled.clone();
                let notify = self.cancel_notify.clone();
                let watcher = cancel.clone();
                tokio::spawn(async move {
                    watcher.cancelled().await;
                    cancelled.store(true, Ordering::SeqCst);
                    notify.notify_one();
                });

                let stream = async_stream::stream! {
                    let mut tick = 0u64;
                    loop {
                        let stopped = tokio::select! {
                            _ = cancel.cancelled() => true,
                            _ = tokio::time::sleep(Duration::from_millis(10)) => false,
                        };
                        if stopped {
                            break;
                        }
                        tick += 1;
                        yield Ok::<_, AppError>(StreamEvent::Delta(format!("tick{} ", tick)));
                    }
                };
                Ok(stream.boxed())
            }
        }
    }
}

/// Build the full router around a scripted client.
pub fn create_test_app(client: ScriptedClient) -> Router {
    let state = AppState::new(AppConfig::new("test-key"), Arc::new(client));
    build_router(state)
}

pub fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub async fn body_bytes(body: Body) -> Vec<u8> {
    let mut stream = body.into_data_stream();
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

pub async fn body_json(body: Body) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(body).await).unwrap()
}

/// Split an SSE body into `(event, data)` pairs; `event` is `None` for plain data frames.
pub fn parse_sse_frames(body: &str) -> Vec<(Option<String>, String)> {
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event: ") {
                    event = Some(name.to_string());
                } else if let Some(value) = line.strip_prefix("data: ") {
                    data.push(value);
                }
            }
            (event, data.join("\n"))
        })
        .collect()
}
