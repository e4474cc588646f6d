// OpenAI → Bedrock Anthropic 请求转换
//
// 纯函数：同样的输入总是产出结构相同的请求体，不修改入参。

use super::models::{
    ClaudeMessage, ClaudeRequest, ThinkingConfig, ANTHROPIC_VERSION, EXTENDED_OUTPUT_BETA,
};
use crate::proxy::mappers::openai::models::ChatMessage;
use crate::proxy::validate::ResolvedParams;

/// 需要 anthropic_beta 超长输出标记的 max_tokens 阈值
const EXTENDED_OUTPUT_THRESHOLD: u32 = 64_000;

/// 构建 Bedrock 请求体
///
/// 角色只做直接改名（此处两边词表一致，原样透传），顺序保持不变，
/// 不合并相邻同角色消息。空 stop 列表不发送。
pub fn build_claude_request(
    messages: &[ChatMessage],
    params: &ResolvedParams,
    stop_sequences: &[String],
    extended_output: bool,
) -> ClaudeRequest {
    let messages = messages
        .iter()
        .map(|msg| ClaudeMessage {
            role: msg.role.clone(),
            content: msg.content.clone(),
        })
        .collect();

    let thinking = params.thinking_budget.map(ThinkingConfig::enabled);

    let anthropic_beta = if extended_output && params.max_tokens > EXTENDED_OUTPUT_THRESHOLD {
        Some(vec![EXTENDED_OUTPUT_BETA])
    } else {
        None
    };

    ClaudeRequest {
        anthropic_version: ANTHROPIC_VERSION,
        max_tokens: params.max_tokens,
        temperature: params.temperature,
        top_p: params.top_p,
        messages,
        stop_sequences: if stop_sequences.is_empty() {
            None
        } else {
            Some(stop_sequences.to_vec())
        },
        thinking,
        anthropic_beta,
    }
}

/// legacy /v1/completions：prompt 包装为单条 user 消息
pub fn wrap_prompt(prompt: &str) -> Vec<ChatMessage> {
    vec![ChatMessage {
        role: "user".to_string(),
        content: prompt.to_string(),
    }]
}
