//! KIS 연동 에러 타입.
//!
//! 재연결 루프는 [`ExchangeError::is_retryable`]로 계속할지 결정하고,
//! 요청 한도 초과일 때는 [`ExchangeError::backoff_hint`]만큼 더 기다립니다.

use std::time::Duration;

use thiserror::Error;

/// 요청 한도 초과 시 최소 대기 시간 (초).
const RATE_LIMIT_BACKOFF_SECS: u64 = 60;

/// KIS 인증 및 실시간 시세 에러.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// TCP/HTTP 전송 실패
    #[error("Network error: {0}")]
    Network(String),

    /// 상류 WebSocket 세션이 끊김
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// 앱키/시크릿 또는 토큰 거부
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 요청 한도 초과 (EGW00133, HTTP 429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// KIS 응답 본문의 에러 (`rt_cd != 0`)
    #[error("KIS API error {code}: {message}")]
    ApiError { code: i32, message: String },

    /// 응답/프레임 해석 실패
    #[error("Parse error: {0}")]
    Parse(String),

    /// WebSocket 프로토콜 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// HTTP 요청 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 인증 정보 누락, 구독 종목 없음 등
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExchangeError {
    /// 재연결로 회복될 수 있는 에러인지 확인.
    ///
    /// 인증 실패와 설정 오류는 다시 시도해도 같은 결과가 나오므로 제외합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network(_)
                | ExchangeError::Disconnected(_)
                | ExchangeError::RateLimited
                | ExchangeError::Timeout(_)
                | ExchangeError::WebSocket(_)
        )
    }

    /// 기본 재연결 대기보다 길게 기다려야 하는 경우의 대기 시간.
    pub fn backoff_hint(&self) -> Option<Duration> {
        match self {
            ExchangeError::RateLimited => Some(Duration::from_secs(RATE_LIMIT_BACKOFF_SECS)),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        match err.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => return ExchangeError::Unauthorized(err.to_string()),
            Some(429) => return ExchangeError::RateLimited,
            _ => {}
        }

        if err.is_timeout() {
            ExchangeError::Timeout(err.to_string())
        } else if err.is_decode() {
            ExchangeError::Parse(err.to_string())
        } else {
            ExchangeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        ExchangeError::Parse(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ExchangeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                ExchangeError::Disconnected(err.to_string())
            }
            WsError::Io(e) => ExchangeError::Network(e.to_string()),
            other => ExchangeError::WebSocket(other.to_string()),
        }
    }
}

/// KIS 연동 작업의 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
