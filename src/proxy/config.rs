// 代理配置

/// 上游 Bedrock 连接配置
///
/// 凭证在进程外解析，这里只持有一个不透明的 bearer token，
/// 核心代码不接触任何凭证材料。
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub region: String,
    /// 覆盖默认端点（测试或私有网关用）
    pub endpoint: Option<String>,
    pub auth_token: String,
}

impl UpstreamConfig {
    pub fn endpoint_url(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
    }
}
