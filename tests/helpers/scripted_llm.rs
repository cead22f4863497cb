// ABOUTME: Scripted generation service double for pipeline and route tests
// ABOUTME: Replays queued stream and title scripts and reports when a stream is dropped

use async_stream::stream;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threadline::errors::AppError;
use threadline::llm::{ChatRequest, ChatResponse, ChatStream, LlmProvider, StreamChunk, TokenUsage};
use tokio::sync::Notify;

/// How one streaming call behaves
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Emit these deltas, then finish
    Reply(Vec<&'static str>),
    /// Fail before any delta
    FailOpen,
    /// Emit these deltas, then fail
    FailAfter(Vec<&'static str>),
    /// Emit these deltas, then never finish
    Hang(Vec<&'static str>),
}

/// How one title call behaves
#[derive(Debug, Clone)]
pub enum TitleScript {
    /// Return this text
    Reply(&'static str),
    /// Return an upstream error
    Fail,
    /// Wait, then return this text
    Delayed(Duration, &'static str),
}

#[derive(Default)]
struct Scripts {
    streams: VecDeque<StreamScript>,
    titles: VecDeque<TitleScript>,
}

/// Generation double driven by queued scripts
///
/// Unscripted stream calls reply `"Hello" " there."`; unscripted title calls
/// reply `"Friendly Greeting"`.
#[derive(Clone, Default)]
pub struct ScriptedLlm {
    scripts: Arc<Mutex<Scripts>>,
    stream_requests: Arc<Mutex<Vec<ChatRequest>>>,
    title_calls: Arc<AtomicUsize>,
    stream_dropped: Arc<AtomicBool>,
    dropped_notify: Arc<Notify>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_stream(&self, script: StreamScript) -> &Self {
        self.scripts.lock().unwrap().streams.push_back(script);
        self
    }

    pub fn push_title(&self, script: TitleScript) -> &Self {
        self.scripts.lock().unwrap().titles.push_back(script);
        self
    }

    pub fn title_calls(&self) -> usize {
        self.title_calls.load(Ordering::SeqCst)
    }

    pub fn stream_requests(&self) -> Vec<ChatRequest> {
        self.stream_requests.lock().unwrap().clone()
    }

    pub fn stream_was_dropped(&self) -> bool {
        self.stream_dropped.load(Ordering::SeqCst)
    }

    /// Wait until a scripted stream has been dropped
    pub async fn wait_for_stream_drop(&self, timeout: Duration) -> bool {
        let notified = self.dropped_notify.notified();
        if self.stream_was_dropped() {
            return true;
        }
        tokio::time::timeout(timeout, notified).await.is_ok() || self.stream_was_dropped()
    }
}

/// Flags the owning double when the stream holding it is dropped
struct DropSignal {
    dropped: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Drop for DropSignal {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, AppError> {
        self.title_calls.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().unwrap().titles.pop_front();
        let text = match script {
            None => "Friendly Greeting",
            Some(TitleScript::Reply(text)) => text,
            Some(TitleScript::Fail) => {
                return Err(AppError::upstream_generation("scripted title failure"))
            }
            Some(TitleScript::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                text
            }
        };
        Ok(ChatResponse {
            content: text.to_owned(),
            model: request.model.clone().unwrap_or_default(),
            usage: None,
        })
    }

    async fn complete_stream(&self, request: &ChatRequest) -> Result<ChatStream, AppError> {
        self.stream_requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .streams
            .pop_front()
            .unwrap_or_else(|| StreamScript::Reply(vec!["Hello", " there."]));

        if matches!(script, StreamScript::FailOpen) {
            return Err(AppError::upstream_generation("scripted open failure"));
        }
        let guard = DropSignal {
            dropped: self.stream_dropped.clone(),
            notify: self.dropped_notify.clone(),
        };

        let stream: ChatStream = match script {
            StreamScript::FailOpen => unreachable!(),
            StreamScript::Reply(deltas) => Box::pin(stream! {
                let _guard = guard;
                let completion_tokens = deltas.len() as u32;
                for delta in deltas {
                    yield Ok::<_, AppError>(StreamChunk::text(delta));
                }
                yield Ok(StreamChunk {
                    usage: Some(TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens,
                        total_tokens: 10 + completion_tokens,
                    }),
                    ..StreamChunk::done("stop")
                });
            }),
            StreamScript::FailAfter(deltas) => Box::pin(stream! {
                let _guard = guard;
                for delta in deltas {
                    yield Ok::<_, AppError>(StreamChunk::text(delta));
                }
                yield Err(AppError::upstream_generation("scripted mid-stream failure"));
            }),
            StreamScript::Hang(deltas) => Box::pin(stream! {
                let _guard = guard;
                for delta in deltas {
                    yield Ok::<_, AppError>(StreamChunk::text(delta));
                }
                std::future::pending::<()>().await;
            }),
        };
        Ok(stream)
    }

    async fn health_check(&self) -> Result<bool, AppError> {
        Ok(true)
    }
}
