// 模型注册表 - 客户端模型 ID 到 Bedrock 调用目标的静态映射
//
// 启动时构建一次，之后只读共享，不需要锁。

use std::collections::HashMap;

use super::error::ProxyError;

/// 注册表条目：客户端可见模型及其后端能力
#[derive(Debug, Clone)]
pub struct ModelProfile {
    /// 客户端可见 ID（精确匹配，大小写敏感）
    pub client_id: &'static str,
    /// Bedrock invokeModel 使用的模型 ID
    pub bedrock_model_id: &'static str,
    /// 最大上下文 token 数
    pub max_context_tokens: u32,
    /// 是否支持思考模式
    pub supports_thinking: bool,
    /// 思考模式的默认 token 预算
    pub default_thinking_budget: u32,
}

/// 模型注册表
pub struct ModelRegistry {
    profiles: HashMap<&'static str, ModelProfile>,
}

impl ModelRegistry {
    /// 按精确客户端 ID 查找，不做模糊匹配
    pub fn resolve(&self, client_model_id: &str) -> Result<&ModelProfile, ProxyError> {
        self.profiles
            .get(client_model_id)
            .ok_or_else(|| ProxyError::UnknownModel(client_model_id.to_string()))
    }

    /// 所有客户端可见模型 ID（/v1/models 用）
    pub fn client_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<&'static str> = self.profiles.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let entries = [
            ModelProfile {
                client_id: "claude-3-7-sonnet",
                bedrock_model_id: "us.anthropic.claude-3-7-sonnet-20250219-v1:0",
                max_context_tokens: 200_000,
                supports_thinking: false,
                default_thinking_budget: 0,
            },
            // 思考模式变体：后端模型相同，仅能力标记不同
            ModelProfile {
                client_id: "claude-3-7-sonnet-thinking",
                bedrock_model_id: "us.anthropic.claude-3-7-sonnet-20250219-v1:0",
                max_context_tokens: 200_000,
                supports_thinking: true,
                default_thinking_budget: 4000,
            },
            ModelProfile {
                client_id: "claude-3-opus",
                bedrock_model_id: "anthropic.claude-3-opus-20240229-v1:0",
                max_context_tokens: 200_000,
                supports_thinking: false,
                default_thinking_budget: 0,
            },
            ModelProfile {
                client_id: "claude-3-5-sonnet",
                bedrock_model_id: "anthropic.claude-3-5-sonnet-20240620-v1:0",
                max_context_tokens: 200_000,
                supports_thinking: false,
                default_thinking_budget: 0,
            },
            ModelProfile {
                client_id: "claude-3-sonnet",
                bedrock_model_id: "anthropic.claude-3-sonnet-20240229-v1:0",
                max_context_tokens: 200_000,
                supports_thinking: false,
                default_thinking_budget: 0,
            },
            ModelProfile {
                client_id: "claude-3-haiku",
                bedrock_model_id: "anthropic.claude-3-haiku-20240307-v1:0",
                max_context_tokens: 200_000,
                supports_thinking: false,
                default_thinking_budget: 0,
            },
            ModelProfile {
                client_id: "claude-2",
                bedrock_model_id: "anthropic.claude-v2:1",
                max_context_tokens: 100_000,
                supports_thinking: false,
                default_thinking_budget: 0,
            },
            ModelProfile {
                client_id: "claude-instant",
                bedrock_model_id: "anthropic.claude-instant-v1",
                max_context_tokens: 100_000,
                supports_thinking: false,
                default_thinking_budget: 0,
            },
        ];

        let mut profiles = HashMap::new();
        for profile in entries {
            profiles.insert(profile.client_id, profile);
        }
        Self { profiles }
    }
}
