use bedrock_claude_proxy::api::{build_routes, common};
use bedrock_claude_proxy::proxy::config::UpstreamConfig;
use bedrock_claude_proxy::proxy::handlers;
use bedrock_claude_proxy::proxy::upstream::UpstreamClient;
use bedrock_claude_proxy::state::AppState;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// AWS region hosting the Bedrock runtime
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// Override the Bedrock endpoint URL (testing or private gateways)
    #[arg(long, env = "BEDROCK_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer token for Bedrock API key authentication
    #[arg(long, env = "AWS_BEARER_TOKEN_BEDROCK", hide_env_values = true)]
    auth_token: String,

    /// Log verbose request/response details
    #[arg(long, env = "DEBUG_MODE", default_value_t = false)]
    debug: bool,

    /// Directory for rolling log files (stdout only when unset)
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
    );

    // 文件日志的 guard 要活到进程结束，否则缓冲不落盘
    let _guard = match &args.log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "proxy.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    };

    let upstream_config = UpstreamConfig {
        region: args.region.clone(),
        endpoint: args.endpoint.clone(),
        auth_token: args.auth_token.clone(),
    };
    let backend = Arc::new(UpstreamClient::new(&upstream_config));
    let app_state = Arc::new(AppState::new(backend, args.debug));

    tracing::info!(
        "proxying {} models to {}",
        app_state.registry.len(),
        upstream_config.endpoint_url()
    );

    let cors = CorsLayer::permissive();

    use axum::routing::{get, post};
    use axum::Router;

    let api_routes = build_routes(app_state.clone());

    let proxy_routes = Router::new()
        .route(
            "/v1/chat/completions",
            post(handlers::openai::handle_chat_completions),
        )
        .route(
            "/v1/completions",
            post(handlers::openai::handle_completions),
        )
        .route("/v1/models", get(handlers::openai::handle_list_models))
        .with_state(app_state.clone());

    let app = Router::new()
        .merge(api_routes)
        .merge(proxy_routes)
        .layer(cors)
        .layer(axum::middleware::from_fn(common::request_logger));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
