// 代理核心模块

pub mod config;
pub mod error;
pub mod handlers; // API 端点处理器
pub mod log_store; // 请求日志存储
pub mod mappers; // 协议转换器
pub mod registry;
pub mod retry;
pub mod tokens;
pub mod upstream; // 上游客户端
pub mod validate;
