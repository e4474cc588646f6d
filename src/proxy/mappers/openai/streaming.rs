// 流式桥接 - Bedrock 事件序列转 OpenAI SSE
//
// 惰性逐事件消费，严格按到达顺序转发，不缓冲整个流。终止事件之后
// 追加 usage chunk 与 [DONE] 哨兵。流一旦开始，任何失败都是终止性的，
// 不会回到重试引擎。

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::{
    ChatStreamChunk, StreamChoice, StreamDelta, TextChunkChoice, TextCompletionChunk, Usage,
};
use crate::proxy::error::ProxyError;
use crate::proxy::mappers::claude::models::{
    map_stop_reason, ClaudeStreamEvent, ContentDelta,
};
use crate::proxy::tokens::TokenCounter;

/// 客户端断连信号，生产者在处理每个事件前检查
///
/// 置位后桥接停止消费后端事件，避免无界地拖完整个后端流。
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// 输出 chunk 的形态：chat 端点用 delta，legacy 端点用 text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    Chat,
    TextCompletion,
}

/// 流式转换的请求级上下文
pub struct StreamOptions {
    pub model: String,
    pub format: StreamFormat,
    /// 非思考模型收到思考增量时直接丢弃
    pub surface_thinking: bool,
    pub prompt_tokens: u32,
    pub counter: TokenCounter,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>;

/// 响应体被丢弃（客户端断连）时置位取消标志
struct CancelOnDrop {
    cancel: CancelHandle,
    inner: SseStream,
}

impl Stream for CancelOnDrop {
    type Item = Result<Bytes, ProxyError>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn sse_frame<T: Serialize>(payload: &T) -> Bytes {
    Bytes::from(format!(
        "data: {}\n\n",
        serde_json::to_string(payload).unwrap_or_default()
    ))
}

struct ChunkBuilder {
    id: String,
    created: i64,
    model: String,
    format: StreamFormat,
}

impl ChunkBuilder {
    fn new(opts: &StreamOptions) -> Self {
        let prefix = match opts.format {
            StreamFormat::Chat => "chatcmpl",
            StreamFormat::TextCompletion => "cmpl",
        };
        Self {
            id: format!("{}-{}", prefix, Uuid::new_v4().simple()),
            created: Utc::now().timestamp(),
            model: opts.model.clone(),
            format: opts.format,
        }
    }

    fn content(&self, text: &str) -> Bytes {
        match self.format {
            StreamFormat::Chat => self.chat_chunk(
                StreamDelta {
                    content: Some(text.to_string()),
                    thinking: None,
                },
                None,
            ),
            StreamFormat::TextCompletion => self.text_chunk(text, None),
        }
    }

    fn thinking(&self, text: &str) -> Bytes {
        // legacy 端点没有 delta 字段，思考内容同样走 text
        match self.format {
            StreamFormat::Chat => self.chat_chunk(
                StreamDelta {
                    content: None,
                    thinking: Some(text.to_string()),
                },
                None,
            ),
            StreamFormat::TextCompletion => self.text_chunk(text, None),
        }
    }

    fn terminal(&self, finish_reason: &str) -> Bytes {
        match self.format {
            StreamFormat::Chat => {
                self.chat_chunk(StreamDelta::default(), Some(finish_reason.to_string()))
            }
            StreamFormat::TextCompletion => self.text_chunk("", Some(finish_reason.to_string())),
        }
    }

    fn usage(&self, usage: Usage) -> Bytes {
        match self.format {
            StreamFormat::Chat => sse_frame(&ChatStreamChunk {
                id: self.id.clone(),
                object: "chat.completion.chunk".to_string(),
                created: self.created,
                model: self.model.clone(),
                choices: vec![],
                usage: Some(usage),
            }),
            StreamFormat::TextCompletion => sse_frame(&TextCompletionChunk {
                id: self.id.clone(),
                object: "text_completion".to_string(),
                created: self.created,
                model: self.model.clone(),
                choices: vec![],
                usage: Some(usage),
            }),
        }
    }

    fn chat_chunk(&self, delta: StreamDelta, finish_reason: Option<String>) -> Bytes {
        sse_frame(&ChatStreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        })
    }

    fn text_chunk(&self, text: &str, finish_reason: Option<String>) -> Bytes {
        sse_frame(&TextCompletionChunk {
            id: self.id.clone(),
            object: "text_completion".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![TextChunkChoice {
                text: text.to_string(),
                index: 0,
                finish_reason,
            }],
            usage: None,
        })
    }
}

/// 把后端事件流转换为 OpenAI SSE 字节流
pub fn create_sse_stream(
    mut events: Pin<Box<dyn Stream<Item = Result<ClaudeStreamEvent, ProxyError>> + Send>>,
    opts: StreamOptions,
    cancel: CancelHandle,
) -> SseStream {
    let builder = ChunkBuilder::new(&opts);
    let guard = cancel.clone();

    let stream = async_stream::stream! {
        // 增量计数：累计已发出的文本，流结束时合成 usage
        let mut completion_text = String::new();
        let mut thinking_text = String::new();
        let mut finished = false;

        while let Some(item) = events.next().await {
            if cancel.is_cancelled() {
                info!("client disconnected, stopping backend stream consumption");
                return;
            }

            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!("backend stream error after {} emitted chars: {}", completion_text.len(), e);
                    yield Err(ProxyError::StreamInterrupted(e.to_string()));
                    return;
                }
            };

            match event {
                ClaudeStreamEvent::ContentBlockDelta {
                    delta: ContentDelta::Text { text },
                } => {
                    if !text.is_empty() {
                        completion_text.push_str(&text);
                        yield Ok(builder.content(&text));
                    }
                }
                ClaudeStreamEvent::ContentBlockDelta {
                    delta: ContentDelta::Unknown,
                } => {
                    // 未识别的增量类型（签名等）：跳过，不中断流
                }
                ClaudeStreamEvent::ContentBlockDelta {
                    delta: ContentDelta::Thinking { thinking },
                } => {
                    if !opts.surface_thinking {
                        // 非思考模型不应收到思考增量，目标 schema 没有对应字段
                        debug!("dropping thinking delta for non-thinking model {}", opts.model);
                        continue;
                    }
                    if !thinking.is_empty() {
                        thinking_text.push_str(&thinking);
                        yield Ok(builder.thinking(&thinking));
                    }
                }
                ClaudeStreamEvent::MessageDelta { delta } => {
                    if let Some(stop_reason) = delta.stop_reason {
                        let finish_reason = map_stop_reason(&stop_reason);
                        yield Ok(builder.terminal(finish_reason));

                        let completion_tokens = opts.counter.count(&completion_text);
                        let thinking_tokens = if thinking_text.is_empty() {
                            None
                        } else {
                            Some(opts.counter.count(&thinking_text))
                        };
                        yield Ok(builder.usage(Usage {
                            prompt_tokens: opts.prompt_tokens,
                            completion_tokens,
                            total_tokens: opts.prompt_tokens
                                + completion_tokens
                                + thinking_tokens.unwrap_or(0),
                            thinking_tokens,
                        }));

                        yield Ok(Bytes::from("data: [DONE]\n\n"));
                        finished = true;
                        break;
                    }
                }
                ClaudeStreamEvent::MessageStop => {
                    if !finished {
                        // 缺少 message_delta 的旧格式流：以 stop 收尾
                        yield Ok(builder.terminal("stop"));
                        let completion_tokens = opts.counter.count(&completion_text);
                        yield Ok(builder.usage(Usage {
                            prompt_tokens: opts.prompt_tokens,
                            completion_tokens,
                            total_tokens: opts.prompt_tokens + completion_tokens,
                            thinking_tokens: None,
                        }));
                        yield Ok(Bytes::from("data: [DONE]\n\n"));
                        finished = true;
                    }
                    break;
                }
                ClaudeStreamEvent::MessageStart
                | ClaudeStreamEvent::ContentBlockStart
                | ClaudeStreamEvent::ContentBlockStop
                | ClaudeStreamEvent::Unknown => {}
            }
        }

        if !finished && !cancel.is_cancelled() {
            // 后端流在终止事件前结束：记录，不再发送任何字节
            warn!("backend stream ended without a terminal event");
        }
    };

    Box::pin(CancelOnDrop {
        cancel: guard,
        inner: Box::pin(stream),
    })
}
