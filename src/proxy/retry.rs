// 重试引擎 - 指数退避 + 随机抖动
//
// 只包裹连接/首包阶段的后端调用。流一旦产出首个 chunk，后续失败
// 不再进入此引擎，避免给客户端重复或不一致的部分内容。

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use super::error::ProxyError;

/// 重试策略，进程级常量，启动后只读
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大重试次数（总尝试次数 = max_retries + 1）
    pub max_retries: u32,
    /// 基础延迟
    pub base_delay: Duration,
    /// 延迟上限
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// 第 attempt 次失败后的退避时长（指数退避 + 0~1s 均匀抖动，封顶 max_delay）
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let jitter = Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..1.0));
        (exp + jitter).min(self.max_delay)
    }

    /// 执行一次后端调用，按分类决定是否重试
    ///
    /// 可重试错误（限流、瞬时故障）退避后重试；致命错误立即带原分类
    /// 返回；重试耗尽统一呈现为 UpstreamThrottled。
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, ProxyError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProxyError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    attempt += 1;
                    warn!(
                        "retryable upstream error ({}), waiting {:.2}s before attempt {}/{}",
                        e,
                        delay.as_secs_f64(),
                        attempt + 1,
                        self.max_retries + 1
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    error!("upstream retries exhausted after {} attempts: {}", attempt + 1, e);
                    return Err(ProxyError::UpstreamThrottled(format!(
                        "retries exhausted after {} attempts: {}",
                        attempt + 1,
                        e
                    )));
                }
                Err(e) => {
                    error!("fatal upstream error, not retrying: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_n_retryable_failures() {
        let policy = fast_policy();
        let attempts = Arc::new(AtomicU32::new(0));
        let n = 3u32;

        let counter = attempts.clone();
        let result = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    let attempt = counter.fetch_add(1, Ordering::SeqCst);
                    if attempt < n {
                        Err(ProxyError::UpstreamThrottled("rate exceeded".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), n + 1);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_throttled_with_exact_attempts() {
        let policy = fast_policy();
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result: Result<(), _> = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProxyError::UpstreamThrottled("rate exceeded".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(ProxyError::UpstreamThrottled(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), policy.max_retries + 1);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let policy = fast_policy();
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result: Result<(), _> = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ProxyError::UpstreamFatal {
                        status: 403,
                        message: "denied".into(),
                    })
                }
            })
            .await;

        match result {
            Err(ProxyError::UpstreamFatal { status, .. }) => assert_eq!(status, 403),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_also_retried() {
        let policy = fast_policy();
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let result = policy
            .execute(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ProxyError::UpstreamTransient("503".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_backoff_capped_at_max_delay() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };
        for attempt in 0..10 {
            assert!(policy.backoff_delay(attempt) <= policy.max_delay);
        }
    }
}
