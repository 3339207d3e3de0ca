//! 증권사 연동 및 실시간 시세 수신.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - KIS OAuth 인증 (접근 토큰, WebSocket 접속키)
//! - KIS 실시간 WebSocket 시세 소스
//! - 시세 중계에 필요한 협력자 trait

pub mod error;
pub mod event;
pub mod kis;
pub mod traits;

pub use error::*;
pub use event::*;
pub use traits::*;
