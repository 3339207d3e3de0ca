//! 한국투자증권 (KIS) 실시간 시세 연동.
//!
//! 중계 서버가 상류 시세를 받기까지의 흐름:
//!
//! 1. [`KisOAuth`]가 앱키로 접근 토큰을 확인하고 WebSocket 접속키를 발급받습니다.
//! 2. [`KisQuoteFeed`]가 종목마다 체결가(`H0STCNT0`)와 호가(`H0STASP0`)를 구독합니다.
//! 3. [`realtime`]이 `|`, `^`로 구분된 프레임을 `RealtimeEvent`로 바꿉니다.
//!
//! ```rust,ignore
//! let config = KisConfig::from_env().ok_or("KIS 인증 정보 없음")?;
//! let oauth = KisOAuth::new(config)?;
//! let mut feed = KisQuoteFeed::new(oauth, vec!["005930".to_string()]);
//! feed.run(event_tx, shutdown).await?;
//! ```
//!
//! 공식 API 문서: <https://apiportal.koreainvestment.com/>

pub mod auth;
pub mod config;
pub mod realtime;
pub mod websocket;

pub use auth::{KisOAuth, TokenState};
pub use config::{KisAccountType, KisConfig, KisEndpoints};
pub use realtime::{ControlMessage, KisFrame};
pub use websocket::KisQuoteFeed;

/// KIS 거래 ID (tr_id) 상수 모음.
pub mod tr_id {
    /// 국내 주식 실시간 체결가
    pub const WS_KR_TRADE: &str = "H0STCNT0";
    /// 국내 주식 실시간 호가
    pub const WS_KR_ORDERBOOK: &str = "H0STASP0";
    /// 서버 keep-alive 제어 메시지
    pub const PINGPONG: &str = "PINGPONG";
}
