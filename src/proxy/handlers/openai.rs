// OpenAI 兼容端点处理器
//
// 请求内严格顺序执行：校验 → 转换 → 调用（可重试）→ 转换响应或流式转发。
// 重试引擎只管到首包为止，流开始后的失败不再重试。

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use tracing::{debug, error, info};

use crate::proxy::error::ProxyError;
use crate::proxy::log_store::LogRecord;
use crate::proxy::mappers::claude::request::{build_claude_request, wrap_prompt};
use crate::proxy::mappers::openai::models::{ChatMessage, ChatRequest, ModelEntry, Usage};
use crate::proxy::mappers::openai::response::{to_chat_response, to_text_completion_response};
use crate::proxy::mappers::openai::streaming::{
    create_sse_stream, CancelHandle, StreamFormat, StreamOptions,
};
use crate::proxy::validate::{filter_messages, resolve_params};
use crate::state::AppState;

/// 端点形态：chat 使用 messages/delta，legacy 使用 prompt/text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Chat,
    Completions,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Endpoint::Chat => "/v1/chat/completions",
            Endpoint::Completions => "/v1/completions",
        }
    }

    fn stream_format(self) -> StreamFormat {
        match self {
            Endpoint::Chat => StreamFormat::Chat,
            Endpoint::Completions => StreamFormat::TextCompletion,
        }
    }
}

pub async fn handle_chat_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    relay(state, req, Endpoint::Chat).await
}

pub async fn handle_completions(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    relay(state, req, Endpoint::Completions).await
}

pub async fn handle_list_models(State(state): State<Arc<AppState>>) -> Response {
    let created = Utc::now().timestamp();
    let data: Vec<ModelEntry> = state
        .registry
        .client_ids()
        .into_iter()
        .map(|id| ModelEntry {
            id: id.to_string(),
            object: "model".to_string(),
            created,
            owned_by: "anthropic".to_string(),
        })
        .collect();
    Json(serde_json::json!({ "object": "list", "data": data })).into_response()
}

async fn relay(state: Arc<AppState>, req: ChatRequest, endpoint: Endpoint) -> Response {
    let started = Instant::now();
    let model = req.model.clone();
    let stream = req.stream;

    match relay_inner(&state, req, endpoint, started).await {
        Ok(response) => response,
        Err(e) => {
            error!("{} failed for model {}: {}", endpoint.path(), model, e);
            state.log_store.record(LogRecord {
                endpoint: endpoint.path().to_string(),
                model,
                stream,
                prompt_tokens: 0,
                completion_tokens: 0,
                latency_ms: started.elapsed().as_millis() as u32,
                status_code: e.http_status().as_u16(),
                error: Some(e.to_string()),
            });
            e.into_response()
        }
    }
}

async fn relay_inner(
    state: &AppState,
    req: ChatRequest,
    endpoint: Endpoint,
    started: Instant,
) -> Result<Response, ProxyError> {
    let profile = state.registry.resolve(&req.model)?;

    // chat 要求 messages，legacy 要求非空 prompt 并包装为单条 user 消息
    let messages: Vec<ChatMessage> = match endpoint {
        Endpoint::Chat => {
            let messages = req
                .messages
                .as_deref()
                .ok_or_else(|| ProxyError::InvalidParameter("messages is required".to_string()))?;
            filter_messages(messages)?
        }
        Endpoint::Completions => {
            let prompt = req.prompt.as_deref().unwrap_or("");
            if prompt.trim().is_empty() {
                return Err(ProxyError::InvalidParameter(
                    "prompt cannot be empty".to_string(),
                ));
            }
            wrap_prompt(prompt)
        }
    };

    let prompt_tokens = state
        .counter
        .count_prompt(messages.iter().map(|m| m.content.as_str()));

    let params = resolve_params(&req, profile, prompt_tokens)?;
    let surface_thinking = params.thinking_budget.is_some();

    let stop_sequences: Vec<String> = req.stop.clone().map(|s| s.into_vec()).unwrap_or_default();
    let claude_req = build_claude_request(
        &messages,
        &params,
        &stop_sequences,
        req.enable_extended_output,
    );

    if state.debug {
        // 调试日志截断长内容，避免刷屏
        let body = serde_json::to_string(&claude_req).unwrap_or_default();
        let truncated: String = body.chars().take(2000).collect();
        debug!("{} -> {}: {}", endpoint.path(), profile.bedrock_model_id, truncated);
    }

    if req.stream {
        // 重试只覆盖初始连接；首个 chunk 之后整个流单程转发
        let events = state
            .retry
            .execute(|| state.backend.invoke_stream(profile.bedrock_model_id, &claude_req))
            .await?;

        info!(
            "streaming {} via {} (thinking: {})",
            req.model, profile.bedrock_model_id, surface_thinking
        );

        state.log_store.record(LogRecord {
            endpoint: endpoint.path().to_string(),
            model: req.model.clone(),
            stream: true,
            prompt_tokens,
            completion_tokens: 0,
            latency_ms: started.elapsed().as_millis() as u32,
            status_code: 200,
            error: None,
        });

        let sse = create_sse_stream(
            events,
            StreamOptions {
                model: req.model.clone(),
                format: endpoint.stream_format(),
                surface_thinking,
                prompt_tokens,
                counter: state.counter,
            },
            CancelHandle::new(),
        );

        let response = Response::builder()
            .header("Content-Type", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .header("Connection", "keep-alive")
            .body(Body::from_stream(sse))
            .map_err(|e| ProxyError::StreamInterrupted(e.to_string()))?;
        return Ok(response);
    }

    let claude_resp = state
        .retry
        .execute(|| state.backend.invoke(profile.bedrock_model_id, &claude_req))
        .await?;

    let (response, usage) = match endpoint {
        Endpoint::Chat => {
            let out = to_chat_response(
                &claude_resp,
                &req.model,
                &state.counter,
                prompt_tokens,
                surface_thinking,
            );
            let usage = out.usage.clone();
            (Json(out).into_response(), usage)
        }
        Endpoint::Completions => {
            let out = to_text_completion_response(
                &claude_resp,
                &req.model,
                &state.counter,
                prompt_tokens,
                surface_thinking,
            );
            let usage = out.usage.clone();
            (Json(out).into_response(), usage)
        }
    };

    record_success(state, endpoint, &req.model, false, &usage, started);
    Ok(response)
}

fn record_success(
    state: &AppState,
    endpoint: Endpoint,
    model: &str,
    stream: bool,
    usage: &Usage,
    started: Instant,
) {
    state.log_store.record(LogRecord {
        endpoint: endpoint.path().to_string(),
        model: model.to_string(),
        stream,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        latency_ms: started.elapsed().as_millis() as u32,
        status_code: 200,
        error: None,
    });
}
