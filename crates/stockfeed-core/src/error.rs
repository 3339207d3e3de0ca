//! 공통 에러 타입.

use thiserror::Error;

/// 코어 크레이트 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 로드 실패
    #[error("설정 에러: {0}")]
    Config(#[from] config::ConfigError),

    /// 직렬화/역직렬화 실패
    #[error("직렬화 에러: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 로깅 초기화 실패
    #[error("로깅 초기화 에러: {0}")]
    Logging(String),
}

/// 코어 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;
