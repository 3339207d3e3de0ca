//! HTTP 라우트.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크
//! - `/metrics` - Prometheus 메트릭
//! - `/ws/stock` - 시세 WebSocket (경로 설정 가능)

pub mod health;

use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use stockfeed_core::ServerConfig;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::AppState;
use crate::websocket::websocket_router;

pub use health::{health_check, health_router, FeedHealth, HealthResponse};

/// CORS 레이어 생성.
///
/// `cors_origins`가 비어 있으면 개발 모드로 간주하여 모든 origin을 허용합니다.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        warn!("CORS origins not set, allowing any origin (development mode)");
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|s| s.trim().parse().ok())
            .collect();

        if parsed.is_empty() {
            warn!("CORS origins contain no valid origin, allowing any");
            AllowOrigin::any()
        } else {
            info!("CORS configured with {} allowed origins", parsed.len());
            AllowOrigin::list(parsed)
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// 전체 라우터 생성.
///
/// `metrics_handle`이 없으면 `/metrics`를 노출하지 않습니다.
pub fn create_router(
    state: AppState,
    config: &ServerConfig,
    metrics_handle: Option<PrometheusHandle>,
) -> Router {
    let mut router = Router::new()
        .merge(health_router())
        .merge(websocket_router(&config.ws_path))
        .with_state(state);

    if let Some(handle) = metrics_handle {
        let metrics_router = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(handle);
        router = router.merge(metrics_router);
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(cors_layer(&config.cors_origins))
}
