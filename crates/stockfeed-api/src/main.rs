//! 실시간 시세 WebSocket 중계 서버 진입점.
//!
//! KIS(또는 모의) 시세를 받아 `/ws/stock`에 연결된 모든 클라이언트에게 전달합니다.

use std::net::SocketAddr;
use std::time::Duration;

use stockfeed_api::{
    create_router, select_quote_source, setup_metrics_recorder, start_aggregator,
    start_quote_feed, AppState,
};
use stockfeed_core::{init_logging, AppConfig, LogConfig};
use stockfeed_exchange::kis::KisConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load_default()?;
    init_logging(&LogConfig::from_env(&config.logging))?;

    info!("Starting stockfeed relay server...");

    // Prometheus 메트릭 레코더 설정
    let metrics_handle = match setup_metrics_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics recorder initialized");
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
            None
        }
    };

    let addr: SocketAddr = config.server.bind_addr().parse().map_err(|e| {
        error!(
            host = %config.server.host,
            port = config.server.port,
            error = %e,
            "소켓 주소 설정이 유효하지 않습니다. STOCKFEED__SERVER__HOST, STOCKFEED__SERVER__PORT를 확인하세요."
        );
        e
    })?;

    let state = AppState::with_capacity(config.relay.outbound_queue_capacity);
    info!(
        version = %state.version,
        outbound_queue_capacity = config.relay.outbound_queue_capacity,
        "Application state initialized"
    );

    // 전역 종료 토큰 (백그라운드 태스크에 종료 전파)
    let shutdown_token = CancellationToken::new();

    // 시세 소스 선택 (KIS 또는 Mock)
    let selected = select_quote_source(&config.feed, KisConfig::from_env()).await?;
    let oauth = selected.oauth.clone();

    let (event_tx, event_rx) = mpsc::channel(config.feed.channel_capacity.max(1));
    let aggregator_handle = start_aggregator(
        state.registry.clone(),
        state.feed.clone(),
        event_rx,
        shutdown_token.clone(),
    );
    let feed_handle = start_quote_feed(
        selected,
        config.feed.clone(),
        state.feed.clone(),
        event_tx,
        shutdown_token.clone(),
    );

    let app = create_router(state, &config.server, metrics_handle);

    info!(%addr, "Relay server listening");
    info!("WebSocket available at ws://{}{}", addr, config.server.ws_path);
    info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    // 정리 작업에 최대 10초 대기
    let cleanup = tokio::time::timeout(Duration::from_secs(10), async {
        let _ = feed_handle.await;
        let _ = aggregator_handle.await;

        if let Some(oauth) = oauth {
            if let Err(e) = oauth.revoke_token().await {
                warn!(error = %e, "KIS 토큰 폐기 실패");
            }
        }
    })
    .await;

    if cleanup.is_err() {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");

    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
        _ = shutdown_token.cancelled() => {}
    }

    // 모든 백그라운드 태스크에 종료 시그널 전파
    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
