//! 헬스 체크 endpoint.
//!
//! 로드밸런서나 오케스트레이션 시스템(Kubernetes 등)에서 사용됩니다.

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 연결된 프론트엔드 세션 수
    pub connections: usize,

    /// 상류 시세 소스 상태
    pub feed: FeedHealth,
}

/// 상류 시세 소스 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct FeedHealth {
    /// 소스 이름 ("kis" | "mock")
    pub source: String,

    /// 연결 여부
    pub connected: bool,
}

/// 헬스 체크.
///
/// 상류 시세가 끊겨 있어도 서버는 응답하므로 `degraded`로 보고합니다.
/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let connected = state.feed.is_connected();

    Json(HealthResponse {
        status: if connected { "healthy" } else { "degraded" }.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        connections: state.registry.len().await,
        feed: FeedHealth {
            source: state.feed.source(),
            connected,
        },
    })
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
