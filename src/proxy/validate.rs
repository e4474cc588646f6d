// 参数校验 - 将客户端生成参数规范化为后端可接受的取值
//
// 策略：能钳制就钳制，只有非法（非有限数、无法容纳 prompt）才拒绝，
// 以兼容按 OpenAI 宽松边界调参的客户端。

use tracing::warn;

use super::error::ProxyError;
use super::mappers::openai::models::{ChatMessage, ChatRequest};
use super::registry::ModelProfile;

/// 未指定 max_tokens 时的默认输出上限
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
/// Claude 3.7 支持的最大输出 tokens
pub const MAX_OUTPUT_TOKENS: u32 = 128_000;
/// Bedrock 要求的思考预算下限
pub const MIN_THINKING_BUDGET: u32 = 1024;
/// 思考模式下为最终回答保留的最小 token 余量
pub const MIN_ANSWER_TOKENS: u32 = 1024;

/// 校验后的生成参数
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParams {
    pub max_tokens: u32,
    pub temperature: f32,
    /// 思考模式下必须移除 top_p（Bedrock 限制）
    pub top_p: Option<f32>,
    /// Some 表示注入思考指令
    pub thinking_budget: Option<u32>,
}

/// 校验并解析生成参数
///
/// `prompt_tokens` 为本地估算的 prompt token 数，用于限制输出不超过
/// 模型上下文窗口的剩余空间。
pub fn resolve_params(
    req: &ChatRequest,
    profile: &ModelProfile,
    prompt_tokens: u32,
) -> Result<ResolvedParams, ProxyError> {
    let mut max_tokens = match req.max_tokens {
        Some(0) => {
            return Err(ProxyError::InvalidParameter(
                "max_tokens must be a positive integer".to_string(),
            ))
        }
        Some(v) => v,
        None => DEFAULT_MAX_TOKENS,
    };

    if max_tokens > MAX_OUTPUT_TOKENS {
        warn!(
            "requested max_tokens {} exceeds output limit {}, clamping",
            max_tokens, MAX_OUTPUT_TOKENS
        );
        max_tokens = MAX_OUTPUT_TOKENS;
    }

    // 输出不能挤占上下文窗口中 prompt 已占用的部分
    if prompt_tokens >= profile.max_context_tokens {
        return Err(ProxyError::InvalidParameter(format!(
            "prompt ({} tokens) exceeds the {} token context window of {}",
            prompt_tokens, profile.max_context_tokens, profile.client_id
        )));
    }
    let context_remaining = profile.max_context_tokens - prompt_tokens;
    if max_tokens > context_remaining {
        warn!(
            "max_tokens {} exceeds remaining context {}, clamping",
            max_tokens, context_remaining
        );
        max_tokens = context_remaining;
    }

    let temperature = clamp_unit("temperature", req.temperature, 1.0)?;
    let top_p = clamp_unit("top_p", req.top_p, 1.0)?;

    // thinking 变体默认启用，客户端可显式传 thinking=false 关闭
    let thinking_enabled = profile.supports_thinking && req.thinking != Some(false);

    if !thinking_enabled {
        return Ok(ResolvedParams {
            max_tokens,
            temperature,
            top_p: Some(top_p),
            thinking_budget: None,
        });
    }

    let mut budget = req
        .max_thinking_tokens
        .unwrap_or(profile.default_thinking_budget)
        .max(MIN_THINKING_BUDGET);

    // 预算上限：输出上限减去回答余量，保证预算始终严格低于 max_tokens
    let budget_ceiling = MAX_OUTPUT_TOKENS - MIN_ANSWER_TOKENS;
    if budget > budget_ceiling {
        warn!(
            "thinking budget {} exceeds ceiling {}, clamping",
            budget, budget_ceiling
        );
        budget = budget_ceiling;
    }

    // 预算加回答余量放不下时，抬高 max_tokens 而不是截断思考
    let required = budget + MIN_ANSWER_TOKENS;
    if max_tokens < required {
        warn!(
            "max_tokens {} cannot hold thinking budget {} plus answer allowance, raising to {}",
            max_tokens, budget, required
        );
        max_tokens = required.min(MAX_OUTPUT_TOKENS);
    }

    Ok(ResolvedParams {
        max_tokens,
        temperature,
        // 思考模式下不能设置 top_p 参数
        top_p: None,
        thinking_budget: Some(budget),
    })
}

fn clamp_unit(name: &str, value: Option<f32>, default: f32) -> Result<f32, ProxyError> {
    let v = value.unwrap_or(default);
    if !v.is_finite() {
        return Err(ProxyError::InvalidParameter(format!(
            "{} must be a finite number",
            name
        )));
    }
    if !(0.0..=1.0).contains(&v) {
        warn!("{} {} outside [0, 1], clamping", name, v);
        return Ok(v.clamp(0.0, 1.0));
    }
    Ok(v)
}

/// 过滤空消息：内容为空的消息丢弃，末尾的 assistant 消息除外
/// （客户端用它做预填充）。过滤后必须至少保留一条 user 消息。
pub fn filter_messages(messages: &[ChatMessage]) -> Result<Vec<ChatMessage>, ProxyError> {
    let last_index = messages.len().saturating_sub(1);
    let filtered: Vec<ChatMessage> = messages
        .iter()
        .enumerate()
        .filter(|(i, msg)| {
            !msg.content.trim().is_empty() || (*i == last_index && msg.role == "assistant")
        })
        .map(|(_, msg)| msg.clone())
        .collect();

    if !filtered.iter().any(|m| m.role == "user") {
        return Err(ProxyError::InvalidParameter(
            "at least one user message with content is required".to_string(),
        ));
    }
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::registry::ModelRegistry;

    fn request(max_tokens: Option<u32>) -> ChatRequest {
        serde_json::from_value(serde_json::json!({
            "model": "claude-3-7-sonnet",
            "messages": [{"role": "user", "content": "Hi"}],
            "max_tokens": max_tokens,
        }))
        .unwrap()
    }

    #[test]
    fn test_unset_max_tokens_defaults() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet").unwrap();
        let params = resolve_params(&request(None), profile, 10).unwrap();
        assert_eq!(params.max_tokens, DEFAULT_MAX_TOKENS);
        assert!(params.max_tokens <= profile.max_context_tokens);
        assert!(params.thinking_budget.is_none());
    }

    #[test]
    fn test_explicit_max_tokens_unchanged_without_thinking() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet").unwrap();
        let params = resolve_params(&request(Some(1000)), profile, 10).unwrap();
        assert_eq!(params.max_tokens, 1000);
        assert!(params.thinking_budget.is_none());
        assert_eq!(params.top_p, Some(1.0));
    }

    #[test]
    fn test_zero_max_tokens_rejected() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet").unwrap();
        assert!(matches!(
            resolve_params(&request(Some(0)), profile, 10),
            Err(ProxyError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_output_ceiling_clamped() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet").unwrap();
        let params = resolve_params(&request(Some(500_000)), profile, 10).unwrap();
        assert_eq!(params.max_tokens, MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn test_small_max_tokens_raised_for_thinking() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet-thinking").unwrap();
        let mut req = request(Some(50));
        req.model = "claude-3-7-sonnet-thinking".to_string();
        let params = resolve_params(&req, profile, 10).unwrap();
        let budget = params.thinking_budget.unwrap();
        // 不失败，抬高 max_tokens，且预算严格小于 max_tokens
        assert_eq!(params.max_tokens, budget + MIN_ANSWER_TOKENS);
        assert!(budget < params.max_tokens);
        assert!(params.top_p.is_none());
    }

    #[test]
    fn test_thinking_budget_strictly_below_max_tokens() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet-thinking").unwrap();
        for max in [50, 1000, 4096, 20_000, 128_000] {
            let mut req = request(Some(max));
            req.model = "claude-3-7-sonnet-thinking".to_string();
            let params = resolve_params(&req, profile, 10).unwrap();
            assert!(params.thinking_budget.unwrap() < params.max_tokens);
        }
    }

    #[test]
    fn test_oversized_thinking_budget_clamped() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet-thinking").unwrap();
        let mut req = request(Some(4096));
        req.model = "claude-3-7-sonnet-thinking".to_string();
        req.max_thinking_tokens = Some(u32::MAX);
        let params = resolve_params(&req, profile, 10).unwrap();
        let budget = params.thinking_budget.unwrap();
        assert_eq!(budget, MAX_OUTPUT_TOKENS - MIN_ANSWER_TOKENS);
        assert!(budget < params.max_tokens);
        assert!(params.max_tokens <= MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn test_thinking_opt_out() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet-thinking").unwrap();
        let mut req = request(Some(2000));
        req.thinking = Some(false);
        let params = resolve_params(&req, profile, 10).unwrap();
        assert!(params.thinking_budget.is_none());
        assert_eq!(params.max_tokens, 2000);
    }

    #[test]
    fn test_sampling_params_clamped_not_rejected() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet").unwrap();
        let mut req = request(Some(100));
        req.temperature = Some(2.0);
        req.top_p = Some(-0.5);
        let params = resolve_params(&req, profile, 10).unwrap();
        assert_eq!(params.temperature, 1.0);
        assert_eq!(params.top_p, Some(0.0));

        req.temperature = Some(f32::NAN);
        assert!(matches!(
            resolve_params(&req, profile, 10),
            Err(ProxyError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_prompt_overflow_rejected() {
        let registry = ModelRegistry::default();
        let profile = registry.resolve("claude-3-7-sonnet").unwrap();
        assert!(matches!(
            resolve_params(&request(None), profile, profile.max_context_tokens),
            Err(ProxyError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_filter_messages_drops_empty_keeps_trailing_assistant() {
        let messages = vec![
            ChatMessage {
                role: "user".into(),
                content: "Hi".into(),
            },
            ChatMessage {
                role: "user".into(),
                content: "   ".into(),
            },
            ChatMessage {
                role: "assistant".into(),
                content: "".into(),
            },
        ];
        let filtered = filter_messages(&messages).unwrap();
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[1].role, "assistant");
    }

    #[test]
    fn test_filter_messages_requires_user() {
        let messages = vec![ChatMessage {
            role: "assistant".into(),
            content: "hello".into(),
        }];
        assert!(filter_messages(&messages).is_err());
    }
}
