//! 실시간 시세 WebSocket 중계 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 프론트엔드 WebSocket 세션 레지스트리와 fan-out
//! - 상류 시세 이벤트 → 프론트엔드 JSON 변환
//! - KIS 실시간 시세 또는 모의 시세 소스 선택
//! - 헬스 체크 엔드포인트
//! - Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: HTTP 엔드포인트와 라우터
//! - [`websocket`]: 세션 레지스트리, WebSocket 엔드포인트, 어그리게이터
//! - [`feed`]: 상류 시세 소스 선택 및 실행
//! - [`metrics`]: Prometheus 메트릭 수집

pub mod feed;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod websocket;

pub use feed::{select_quote_source, start_quote_feed, SelectedFeed};
pub use metrics::setup_metrics_recorder;
pub use routes::create_router;
pub use state::{AppState, FeedStatus};
pub use websocket::{
    start_aggregator, BroadcastReport, Connection, ConnectionId, ConnectionState,
    DeliveryError, DeliveryFailure, MockQuoteSimulator, OutboundQueue, QuoteAggregator,
    SessionRegistry, SharedSessionRegistry,
};
