// Token 计量 - 本地 tokenizer 估算用量
//
// Bedrock 与 OpenAI 的用量口径不同，usage 字段一律由本地估算合成。
// 估算值与后端内部计数存在偏差，属于接受的近似而非缺陷。

use once_cell::sync::Lazy;
use tiktoken_rs::CoreBPE;

static CL100K: Lazy<CoreBPE> =
    Lazy::new(|| tiktoken_rs::cl100k_base().expect("failed to load cl100k_base encoder"));
static O200K: Lazy<CoreBPE> =
    Lazy::new(|| tiktoken_rs::o200k_base().expect("failed to load o200k_base encoder"));

/// 可切换的 tokenizer 方案
///
/// 默认 cl100k_base，与客户端生态的成本估算工具保持一致。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerScheme {
    #[default]
    Cl100kBase,
    O200kBase,
}

/// Token 计数器，每次调用无状态
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter {
    scheme: TokenizerScheme,
}

impl TokenCounter {
    pub fn new(scheme: TokenizerScheme) -> Self {
        Self { scheme }
    }

    /// 估算一段文本的 token 数
    pub fn count(&self, text: &str) -> u32 {
        if text.is_empty() {
            return 0;
        }
        let bpe: &CoreBPE = match self.scheme {
            TokenizerScheme::Cl100kBase => &CL100K,
            TokenizerScheme::O200kBase => &O200K,
        };
        bpe.encode_ordinary(text).len() as u32
    }

    /// 估算 prompt token：消息内容以空格拼接后计数
    pub fn count_prompt(&self, contents: impl IntoIterator<Item = impl AsRef<str>>) -> u32 {
        let joined = contents
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.count(&joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_is_deterministic() {
        let counter = TokenCounter::default();
        let a = counter.count("Hello, how are you today?");
        let b = counter.count("Hello, how are you today?");
        assert_eq!(a, b);
        assert!(a > 0);
    }

    #[test]
    fn test_empty_text_counts_zero() {
        let counter = TokenCounter::default();
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_count_prompt_joins_messages() {
        let counter = TokenCounter::default();
        let joined = counter.count_prompt(["Hello", "world"]);
        assert_eq!(joined, counter.count("Hello world"));
    }
}
