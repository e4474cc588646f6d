// 上游客户端 - Bedrock Claude 调用
//
// handlers 与测试只依赖 ClaudeBackend trait；具体实现基于 reqwest，
// 流式响应用 SSE 事件流解析为类型化事件。

use std::pin::Pin;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::proxy::config::UpstreamConfig;
use crate::proxy::error::{classify_transport_error, classify_upstream_status, ProxyError};
use crate::proxy::mappers::claude::models::{ClaudeRequest, ClaudeResponse, ClaudeStreamEvent};

pub type ClaudeEventStream =
    Pin<Box<dyn Stream<Item = Result<ClaudeStreamEvent, ProxyError>> + Send>>;

/// 后端调用抽象：一次性完整响应，或类型化事件流
#[async_trait]
pub trait ClaudeBackend: Send + Sync {
    async fn invoke(
        &self,
        model_id: &str,
        request: &ClaudeRequest,
    ) -> Result<ClaudeResponse, ProxyError>;

    async fn invoke_stream(
        &self,
        model_id: &str,
        request: &ClaudeRequest,
    ) -> Result<ClaudeEventStream, ProxyError>;
}

/// reqwest 实现
pub struct UpstreamClient {
    http: reqwest::Client,
    endpoint: String,
    auth_token: String,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.endpoint_url(),
            auth_token: config.auth_token.clone(),
        }
    }

    fn invoke_url(&self, model_id: &str, streaming: bool) -> String {
        let action = if streaming {
            "invoke-with-response-stream"
        } else {
            "invoke"
        };
        format!("{}/model/{}/{}", self.endpoint, model_id, action)
    }

    async fn post(
        &self,
        url: &str,
        request: &ClaudeRequest,
    ) -> Result<reqwest::Response, ProxyError> {
        debug!("invoking upstream: {}", url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.auth_token)
            .json(request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_upstream_status(status.as_u16(), &body));
        }
        Ok(response)
    }
}

#[async_trait]
impl ClaudeBackend for UpstreamClient {
    async fn invoke(
        &self,
        model_id: &str,
        request: &ClaudeRequest,
    ) -> Result<ClaudeResponse, ProxyError> {
        let url = self.invoke_url(model_id, false);
        let response = self.post(&url, request).await?;
        response
            .json::<ClaudeResponse>()
            .await
            .map_err(|e| ProxyError::UpstreamFatal {
                status: 502,
                message: format!("malformed upstream response: {}", e),
            })
    }

    async fn invoke_stream(
        &self,
        model_id: &str,
        request: &ClaudeRequest,
    ) -> Result<ClaudeEventStream, ProxyError> {
        let url = self.invoke_url(model_id, true);
        let response = self.post(&url, request).await?;

        let events = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| async move {
                match item {
                    Ok(event) => {
                        if event.data.is_empty() {
                            return None;
                        }
                        match serde_json::from_str::<ClaudeStreamEvent>(&event.data) {
                            Ok(parsed) => Some(Ok(parsed)),
                            Err(e) => {
                                // 无法识别的事件载荷：跳过，不中断整个流
                                warn!("skipping unparseable stream event: {}", e);
                                None
                            }
                        }
                    }
                    Err(e) => Some(Err(ProxyError::StreamInterrupted(e.to_string()))),
                }
            });

        Ok(Box::pin(events))
    }
}
