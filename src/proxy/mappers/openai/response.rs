// Bedrock → OpenAI 响应转换（非流式路径）

use chrono::Utc;
use uuid::Uuid;

use super::models::{
    ChatChoice, ChatMessage, ChatResponse, TextChoice, TextCompletionResponse, Usage,
};
use crate::proxy::mappers::claude::models::{map_stop_reason, ClaudeResponse, ContentBlock};
use crate::proxy::tokens::TokenCounter;

/// 从响应内容块中提取回答文本与思考轨迹
fn extract_content(response: &ClaudeResponse) -> (String, String) {
    let mut text = String::new();
    let mut thinking = String::new();
    for block in &response.content {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::Thinking { thinking: t } => {
                if !thinking.is_empty() {
                    thinking.push(' ');
                }
                thinking.push_str(t);
            }
            ContentBlock::Unknown => {}
        }
    }
    (text, thinking)
}

/// 本地合成 usage：Bedrock 的用量口径与 OpenAI 不同，一律用本地估算
fn synthesize_usage(
    counter: &TokenCounter,
    prompt_tokens: u32,
    completion: &str,
    thinking: &str,
) -> Usage {
    let completion_tokens = counter.count(completion);
    let thinking_tokens = if thinking.is_empty() {
        None
    } else {
        Some(counter.count(thinking))
    };
    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens + thinking_tokens.unwrap_or(0),
        thinking_tokens,
    }
}

/// Bedrock 完整响应 → chat.completion
///
/// `surface_thinking` 为 false 时（非思考模型）丢弃思考块，目标 schema
/// 没有对应字段。
pub fn to_chat_response(
    response: &ClaudeResponse,
    model: &str,
    counter: &TokenCounter,
    prompt_tokens: u32,
    surface_thinking: bool,
) -> ChatResponse {
    let (content, mut thinking) = extract_content(response);
    if !surface_thinking {
        thinking.clear();
    }
    let finish_reason = map_stop_reason(response.stop_reason.as_deref().unwrap_or("end_turn"));
    let usage = synthesize_usage(counter, prompt_tokens, &content, &thinking);

    ChatResponse {
        id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
        object: "chat.completion".to_string(),
        created: Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content,
            },
            thinking: if thinking.is_empty() {
                None
            } else {
                Some(thinking)
            },
            finish_reason: finish_reason.to_string(),
        }],
        usage,
    }
}

/// Bedrock 完整响应 → legacy text_completion
pub fn to_text_completion_response(
    response: &ClaudeResponse,
    model: &str,
    counter: &TokenCounter,
    prompt_tokens: u32,
    surface_thinking: bool,
) -> TextCompletionResponse {
    let (content, mut thinking) = extract_content(response);
    if !surface_thinking {
        thinking.clear();
    }
    let finish_reason = map_stop_reason(response.stop_reason.as_deref().unwrap_or("end_turn"));
    let usage = synthesize_usage(counter, prompt_tokens, &content, &thinking);

    TextCompletionResponse {
        id: format!("cmpl-{}", Uuid::new_v4().simple()),
        object: "text_completion".to_string(),
        created: Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![TextChoice {
            text: content,
            index: 0,
            thinking: if thinking.is_empty() {
                None
            } else {
                Some(thinking)
            },
            finish_reason: finish_reason.to_string(),
        }],
        usage,
    }
}
