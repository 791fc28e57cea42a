//! HTTP Server - REST 与 WebSocket 路由

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use canopy_config::ServerConfig;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::websocket;

/// 创建路由
pub fn create_router(state: Arc<AppState>, server: &ServerConfig) -> Router {
    let router = Router::new()
        // 健康检查
        .route("/health", get(handlers::health_handler))
        // 模型目录
        .route("/api/llms", get(handlers::list_llms))
        // 图片暂存
        .route(
            "/api/upload-image",
            post(handlers::upload_image).layer(DefaultBodyLimit::max(server.max_upload_bytes)),
        )
        .route("/api/images/:id", get(handlers::get_image))
        // WebSocket
        .route("/ws/query/:client_id", get(websocket::ws_query_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if server.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Serve on an already-bound listener until `shutdown` fires
///
/// Also runs the staged-image sweeper for the lifetime of the server.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let config = state.config.snapshot().await;
    let state = Arc::new(state);

    let sweeper = state.images.spawn_sweeper(
        Duration::from_secs(config.staging.sweep_interval_secs),
        shutdown.child_token(),
    );

    let app = create_router(state, &config.server);
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await?;

    shutdown.cancel();
    if let Some(sweeper) = sweeper {
        let _ = sweeper.await;
    }
    Ok(())
}

/// 运行 HTTP 服务器, stops on Ctrl-C
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let server = state.config.snapshot().await.server;
    let addr: SocketAddr = format!("{}:{}", server.host, server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address: {}", e))?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Canopy server listening on http://{}", addr);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal.cancel();
        }
    });

    serve(listener, state, shutdown).await?;
    tracing::info!("Canopy server stopped");
    Ok(())
}
