// 协议转换器：OpenAI 兼容表面 ⇄ Bedrock Anthropic 协议

pub mod claude;
pub mod openai;
