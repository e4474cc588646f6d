// 错误分类模块 - 代理核心的统一错误类型
//
// 重试引擎只依赖 is_retryable() 的分类结果，HTTP 层只依赖 IntoResponse。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// 代理错误分类
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// 客户端请求了注册表中不存在的模型
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// 生成参数非法（缺失、越界且不可钳制）
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// 后端限流（可重试，重试耗尽后对外呈现此分类）
    #[error("upstream throttled: {0}")]
    UpstreamThrottled(String),

    /// 瞬时故障：网络中断、超时、5xx（可重试）
    #[error("upstream transient error: {0}")]
    UpstreamTransient(String),

    /// 后端明确拒绝请求（不可重试），保留原始状态码
    #[error("upstream error {status}: {message}")]
    UpstreamFatal { status: u16, message: String },

    /// 流式传输中断（客户端断连或后端流异常结束），不重试
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl ProxyError {
    /// 重试引擎的决策表：只有限流与瞬时故障可重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProxyError::UpstreamThrottled(_) | ProxyError::UpstreamTransient(_)
        )
    }

    /// 对外 JSON 错误体中的 type 字段
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::UnknownModel(_) | ProxyError::InvalidParameter(_) => {
                "invalid_request_error"
            }
            ProxyError::UpstreamThrottled(_) => "rate_limit_error",
            ProxyError::UpstreamTransient(_)
            | ProxyError::UpstreamFatal { .. }
            | ProxyError::StreamInterrupted(_) => "upstream_error",
        }
    }

    /// 对外 HTTP 状态码
    pub fn http_status(&self) -> StatusCode {
        match self {
            ProxyError::UnknownModel(_) => StatusCode::NOT_FOUND,
            ProxyError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            ProxyError::UpstreamThrottled(_) => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::UpstreamTransient(_) => StatusCode::BAD_GATEWAY,
            ProxyError::UpstreamFatal { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ProxyError::StreamInterrupted(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body = json!({
            "error": {
                "type": self.error_type(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}

/// 将 reqwest 传输层错误归入分类（连接/超时可重试，其余视为致命）
pub fn classify_transport_error(error: &reqwest::Error) -> ProxyError {
    if error.is_timeout() {
        ProxyError::UpstreamTransient(format!("request timeout: {}", error))
    } else if error.is_connect() {
        ProxyError::UpstreamTransient(format!("connection failed: {}", error))
    } else if error.is_body() || error.is_decode() {
        ProxyError::StreamInterrupted(format!("transmission interrupted: {}", error))
    } else {
        ProxyError::UpstreamFatal {
            status: 502,
            message: error.to_string(),
        }
    }
}

/// 根据后端 HTTP 状态码与响应体分类错误
///
/// 429 与 Bedrock 的 ThrottlingException 视为限流；5xx 视为瞬时故障软避让；
/// 其余 4xx 为致命错误，直接透传状态码。
pub fn classify_upstream_status(status: u16, body: &str) -> ProxyError {
    if status == 429 || body.contains("ThrottlingException") {
        return ProxyError::UpstreamThrottled(format!("HTTP {}: {}", status, body));
    }
    if status >= 500 {
        return ProxyError::UpstreamTransient(format!("HTTP {}: {}", status, body));
    }
    ProxyError::UpstreamFatal {
        status,
        message: body.to_string(),
    }
}
