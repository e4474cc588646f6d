use std::sync::Arc;

use crate::proxy::log_store::LogStore;
use crate::proxy::registry::ModelRegistry;
use crate::proxy::retry::RetryPolicy;
use crate::proxy::tokens::TokenCounter;
use crate::proxy::upstream::ClaudeBackend;

/// Web 应用状态
///
/// 注册表与重试策略启动后只读，请求之间没有共享可变状态。
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub backend: Arc<dyn ClaudeBackend>,
    pub retry: RetryPolicy,
    pub counter: TokenCounter,
    pub log_store: Arc<LogStore>,
    /// 调试模式：输出截断后的请求/响应详情
    pub debug: bool,
}

impl AppState {
    pub fn new(backend: Arc<dyn ClaudeBackend>, debug: bool) -> Self {
        Self {
            registry: Arc::new(ModelRegistry::default()),
            backend,
            retry: RetryPolicy::default(),
            counter: TokenCounter::default(),
            log_store: Arc::new(LogStore::default()),
            debug,
        }
    }
}
