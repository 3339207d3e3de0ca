//! tracing 기반 로깅 초기화.
//!
//! 출력 형식:
//! - **pretty**: 개발용 사람이 읽기 쉬운 형식
//! - **json**: 운영환경/로그 집계용 JSON 형식
//! - **compact**: 한 줄 형식

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::{CoreError, CoreResult};

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// 색상이 포함된 사람이 읽기 쉬운 형식
    #[default]
    Pretty,
    /// JSON 형식
    Json,
    /// 간결한 한 줄 형식
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 로그 레벨 필터 (예: "info", "stockfeed_api=debug")
    pub level: String,
    /// 출력 형식
    pub format: LogFormat,
    /// 파일명과 줄 번호 포함 여부
    pub with_file: bool,
    /// 대상(모듈 경로) 포함 여부
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from(&LoggingConfig::default())
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(section: &LoggingConfig) -> Self {
        Self {
            level: section.level.clone(),
            format: section.format,
            with_file: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// 설정 파일 값에 `RUST_LOG`, `LOG_FORMAT` 환경 변수를 덮어씁니다.
    pub fn from_env(section: &LoggingConfig) -> Self {
        let mut config = Self::from(section);

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.level = level;
        }
        if let Some(format) = std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.format = format;
        }

        config
    }

    /// 로그 형식을 설정합니다.
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

/// 주어진 설정으로 전역 subscriber를 설치합니다.
///
/// 이미 설치되어 있으면 `CoreError::Logging`을 반환합니다.
pub fn init_logging(config: &LogConfig) -> CoreResult<()> {
    let env_filter =
        EnvFilter::try_new(&config.level).map_err(|e| CoreError::Logging(e.to_string()))?;

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_target(config.with_target)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_target(config.with_target)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_file(config.with_file)
            .with_line_number(config.with_file)
            .with_target(config.with_target)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()
        .map_err(|e| CoreError::Logging(e.to_string()))?;

    tracing::info!(
        format = ?config.format,
        level = %config.level,
        "Logging initialized"
    );

    Ok(())
}
