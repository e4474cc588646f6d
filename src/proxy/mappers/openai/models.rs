// OpenAI 数据模型

use serde::{Deserialize, Serialize};

fn default_model() -> String {
    "claude-3-7-sonnet".to_string()
}

/// 客户端请求体，兼容 /v1/chat/completions 与 /v1/completions
///
/// 两个端点共用同一结构：chat 端点要求 messages，legacy 端点要求 prompt。
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub messages: Option<Vec<ChatMessage>>,
    /// legacy 补全形式，包装为单条 user 消息
    #[serde(default)]
    pub prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub stop: Option<StopSequences>,
    /// 显式开关：thinking 变体模型上传 false 可禁用思考模式
    #[serde(default)]
    pub thinking: Option<bool>,
    /// 思考预算覆盖值
    #[serde(default)]
    pub max_thinking_tokens: Option<u32>,
    /// Claude 3.7 超长输出模式 (128K beta)
    #[serde(default)]
    pub enable_extended_output: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// stop 参数兼容单字符串与数组两种写法
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopSequences::One(s) => vec![s],
            StopSequences::Many(v) => v,
        }
    }
}

/// 非流式 chat 响应
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub finish_reason: String,
}

/// 非流式 legacy 补全响应
#[derive(Debug, Clone, Serialize)]
pub struct TextCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextChoice {
    pub text: String,
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_tokens: Option<u32>,
}

/// 流式增量 chunk
#[derive(Debug, Clone, Serialize)]
pub struct ChatStreamChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<StreamChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamChoice {
    pub index: u32,
    pub delta: StreamDelta,
    pub finish_reason: Option<String>,
}

/// 增量内容：思考内容与回答内容分字段下发，客户端可选择忽略
#[derive(Debug, Clone, Serialize, Default)]
pub struct StreamDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// legacy 补全端点的流式 chunk（choices[0].text 形式）
#[derive(Debug, Clone, Serialize)]
pub struct TextCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<TextChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextChunkChoice {
    pub text: String,
    pub index: u32,
    pub finish_reason: Option<String>,
}

/// /v1/models 列表条目
#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}
