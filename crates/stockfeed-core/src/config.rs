//! 설정 관리.
//!
//! 기본값 → `config/default.toml` (선택) → `STOCKFEED__` 환경 변수 순서로 덮어씁니다.
//!
//! ```text
//! STOCKFEED__SERVER__PORT=8080
//! STOCKFEED__FEED__SOURCE=mock
//! STOCKFEED__FEED__SYMBOLS=005930,000660
//! ```

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreResult;
use crate::logging::LogFormat;

/// 기본 설정 파일 경로.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 브로드캐스트 설정
    pub relay: RelayConfig,
    /// 시세 소스 설정
    pub feed: FeedConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// WebSocket 업그레이드 경로
    pub ws_path: String,
    /// 허용할 CORS origin 목록 (비어 있으면 모두 허용)
    #[serde(deserialize_with = "string_list")]
    pub cors_origins: Vec<String>,
    /// HTTP 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ws_path: "/ws/stock".to_string(),
            cors_origins: Vec::new(),
            request_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// `host:port` 형식의 바인딩 주소.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 브로드캐스트 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayConfig {
    /// 연결당 송신 대기열 크기. 가득 차면 해당 연결을 끊습니다.
    pub outbound_queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
        }
    }
}

/// 시세 소스 종류.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    /// KIS 인증 정보가 있으면 KIS, 없으면 모의 데이터
    #[default]
    Auto,
    /// 한국투자증권 실시간 시세
    Kis,
    /// 모의 시세
    Mock,
}

/// 시세 소스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// 시세 소스
    pub source: FeedSource,
    /// 구독할 종목코드 목록
    #[serde(deserialize_with = "string_list")]
    pub symbols: Vec<String>,
    /// 모의 시세 생성 간격 (밀리초)
    pub mock_interval_ms: u64,
    /// 수집 채널 버퍼 크기
    pub channel_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            source: FeedSource::Auto,
            symbols: vec!["005930".to_string(), "000660".to_string()],
            mock_interval_ms: 1000,
            channel_capacity: 1000,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨 필터
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "stockfeed_api=info,stockfeed_exchange=info,tower_http=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// 배열 또는 쉼표로 구분된 문자열을 목록으로 읽습니다.
///
/// 환경 변수 값은 항상 문자열로 남겨 두므로 `005930` 같은 종목코드의 앞자리 0이 보존됩니다.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringList {
        List(Vec<String>),
        Csv(String),
    }

    Ok(match StringList::deserialize(deserializer)? {
        StringList::List(items) => items,
        StringList::Csv(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    })
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        Self::load_with_env(path, environment())
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> CoreResult<Self> {
        Self::load(DEFAULT_CONFIG_PATH)
    }

    fn load_with_env<P: AsRef<Path>>(path: P, env: config::Environment) -> CoreResult<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(env)
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

// 값은 문자열 그대로 전달하고 숫자/불리언 변환은 역직렬화 단계에 맡김
fn environment() -> config::Environment {
    config::Environment::with_prefix("STOCKFEED").separator("__")
}
