// Bedrock Anthropic 数据模型 - 请求体、完整响应与流式事件

use serde::{Deserialize, Serialize};

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const EXTENDED_OUTPUT_BETA: &str = "output-128k-2025-02-19";

/// 发往 Bedrock invokeModel 的请求体，每个请求独立构建，不复用
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClaudeRequest {
    pub anthropic_version: &'static str,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    pub messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_beta: Option<Vec<&'static str>>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: String,
}

/// 思考模式指令
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub budget_tokens: u32,
}

impl ThinkingConfig {
    pub fn enabled(budget_tokens: u32) -> Self {
        Self {
            kind: "enabled",
            budget_tokens,
        }
    }
}

/// Bedrock 完整（非流式）响应
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClaudeResponse {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// 响应内容块：回答文本与思考轨迹分块下发
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(other)]
    Unknown,
}

/// 流式事件序列，按到达顺序处理，content_block_delta 之外的事件大多只做状态推进
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart,
    #[serde(rename = "content_block_start")]
    ContentBlockStart,
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: ContentDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop,
    #[serde(rename = "message_delta")]
    MessageDelta { delta: MessageDeltaBody },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ContentDelta {
    /// 回答文本增量
    #[serde(rename = "text_delta")]
    Text { text: String },
    /// 思考轨迹增量
    #[serde(rename = "thinking_delta")]
    Thinking { thinking: String },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// 后端 stop reason 映射到 OpenAI finish_reason 词表
///
/// 未识别的值回落到 "stop"。
pub fn map_stop_reason(stop_reason: &str) -> &'static str {
    match stop_reason {
        "end_turn" | "stop_sequence" => "stop",
        "max_tokens" => "length",
        "content_filtered" => "content_filter",
        _ => "stop",
    }
}
