//! # Stockfeed Core
//!
//! 실시간 시세 중계 서버 전반에서 사용하는 기본 타입을 제공합니다:
//! - 프론트엔드 JSON 계약 ([`QuoteMessage`])
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod logging;
pub mod quote;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use quote::*;
