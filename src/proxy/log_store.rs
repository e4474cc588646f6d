//! 代理请求日志
//! 使用内存环形缓冲区存储最近的请求记录

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// 单条请求记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyLogEntry {
    pub id: u64,
    pub timestamp: i64,
    pub endpoint: String,
    pub model: String,
    pub stream: bool,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: u32,
    pub status_code: u16,
    pub error: Option<String>,
}

/// 日志存储（环形缓冲区）
pub struct LogStore {
    logs: RwLock<VecDeque<ProxyLogEntry>>,
    max_size: usize,
    next_id: AtomicU64,
}

/// 待写入的记录字段，record 时补上 id 与时间戳
pub struct LogRecord {
    pub endpoint: String,
    pub model: String,
    pub stream: bool,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: u32,
    pub status_code: u16,
    pub error: Option<String>,
}

impl LogStore {
    pub fn new(max_size: usize) -> Self {
        Self {
            logs: RwLock::new(VecDeque::with_capacity(max_size)),
            max_size,
            next_id: AtomicU64::new(1),
        }
    }

    /// 记录一条日志
    pub fn record(&self, record: LogRecord) {
        let entry = ProxyLogEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: chrono::Utc::now().timestamp(),
            endpoint: record.endpoint,
            model: record.model,
            stream: record.stream,
            prompt_tokens: record.prompt_tokens,
            completion_tokens: record.completion_tokens,
            latency_ms: record.latency_ms,
            status_code: record.status_code,
            error: record.error,
        };

        let mut logs = self.logs.write().unwrap();

        // 超过容量时移除最旧的
        if logs.len() >= self.max_size {
            logs.pop_front();
        }

        logs.push_back(entry);
    }

    /// 获取日志（最新的在前，支持分页）
    pub fn get_logs(&self, limit: usize, offset: usize) -> Vec<ProxyLogEntry> {
        let logs = self.logs.read().unwrap();
        logs.iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.logs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut logs = self.logs.write().unwrap();
        logs.clear();
    }
}

impl Default for LogStore {
    fn default() -> Self {
        Self::new(1000) // 默认保留 1000 条
    }
}
