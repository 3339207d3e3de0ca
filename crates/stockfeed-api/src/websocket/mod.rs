//! 실시간 시세 중계를 위한 WebSocket 서버.
//!
//! # 구성
//!
//! - [`registry`]: 열린 연결 멤버십과 fan-out
//! - [`handler`]: `/ws/stock` 업그레이드 엔드포인트
//! - [`aggregator`]: 상류 이벤트 → `QuoteMessage` 변환 및 브로드캐스트
//! - [`simulator`]: KIS 없이 쓰는 모의 시세 소스
//!
//! # 메시지 형식
//!
//! 서버 → 클라이언트 단방향이며, 시세 갱신마다 JSON 하나를 보냅니다.
//!
//! ```json
//! {"symbol":"005930","askPrices":[84500,84600,84700,84800],"bidPrices":[84400,84300,84200,84100],
//!  "askQtys":[1200,800,950,3000],"bidQtys":[1500,2100,900,400],"stckPrpr":84500,"prdyVrss":-200,
//!  "prdyCtrt":-0.23,"stckLwpr":84000,"stckHgpr":85000,"timestamp":"2025-09-24T15:00:00"}
//! ```

pub mod aggregator;
pub mod handler;
pub mod registry;
pub mod simulator;

pub use aggregator::{start_aggregator, QuoteAggregator, QuoteSnapshot};
pub use handler::{websocket_handler, websocket_router};
pub use registry::{
    create_session_registry, BroadcastReport, Connection, ConnectionId, ConnectionState,
    DeliveryError, DeliveryFailure, OutboundQueue, SessionRegistry, SharedSessionRegistry,
    DEFAULT_OUTBOUND_CAPACITY,
};
pub use simulator::{krx_tick_size, MockQuoteSimulator};
