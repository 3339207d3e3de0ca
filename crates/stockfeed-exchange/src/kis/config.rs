//! KIS 접속 설정.
//!
//! 실시간 시세에는 앱키와 앱시크릿만 필요합니다. 계좌 유형은 어느 서버(실전/모의)에
//! 접속할지와 어떤 환경 변수에서 키를 읽을지만 결정합니다.
//!
//! ```text
//! KIS_DEFAULT_ACCOUNT=paper
//! KIS_PAPER_APP_KEY=...
//! KIS_PAPER_APP_SECRET=...
//! KIS_WS_URL=ws://127.0.0.1:31000   # 선택
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 기본 HTTP 타임아웃 (초).
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// 서버 주소 묶음.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KisEndpoints {
    /// OAuth REST 기본 URL
    pub rest: &'static str,
    /// 실시간 WebSocket URL
    pub websocket: &'static str,
}

const REAL_ENDPOINTS: KisEndpoints = KisEndpoints {
    rest: "https://openapi.koreainvestment.com:9443",
    websocket: "ws://ops.koreainvestment.com:21000",
};

const PAPER_ENDPOINTS: KisEndpoints = KisEndpoints {
    rest: "https://openapivts.koreainvestment.com:29443",
    websocket: "ws://ops.koreainvestment.com:31000",
};

/// KIS 계좌 유형.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KisAccountType {
    /// 모의투자
    #[default]
    Paper,
    /// 실전투자 일반
    RealGeneral,
    /// 실전투자 ISA
    RealIsa,
}

impl KisAccountType {
    /// 모의투자 서버 사용 여부.
    pub fn is_paper(self) -> bool {
        self == KisAccountType::Paper
    }

    /// 접속할 서버 주소.
    pub fn endpoints(self) -> KisEndpoints {
        if self.is_paper() {
            PAPER_ENDPOINTS
        } else {
            REAL_ENDPOINTS
        }
    }

    fn env_prefix(self) -> &'static str {
        match self {
            KisAccountType::Paper => "KIS_PAPER",
            KisAccountType::RealGeneral => "KIS_REAL_GENERAL",
            KisAccountType::RealIsa => "KIS_REAL_ISA",
        }
    }
}

impl FromStr for KisAccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paper" | "mock" => Ok(KisAccountType::Paper),
            "real_general" | "general" | "real" => Ok(KisAccountType::RealGeneral),
            "real_isa" | "isa" => Ok(KisAccountType::RealIsa),
            other => Err(format!("Unknown KIS account type: {}", other)),
        }
    }
}

/// KIS 인증 및 접속 설정.
#[derive(Clone)]
pub struct KisConfig {
    pub app_key: String,
    pub app_secret: String,
    pub account_type: KisAccountType,
    /// OAuth 요청 타임아웃 (초)
    pub timeout_secs: u64,
    rest_url: Option<String>,
    websocket_url: Option<String>,
}

// 앱시크릿은 로그에 남기지 않음
impl fmt::Debug for KisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KisConfig")
            .field("app_key", &mask(&self.app_key))
            .field("app_secret", &"***")
            .field("account_type", &self.account_type)
            .field("rest_url", &self.rest_base_url())
            .field("websocket_url", &self.websocket_url())
            .finish()
    }
}

fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{}***", visible)
}

impl KisConfig {
    pub fn new(
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
        account_type: KisAccountType,
    ) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            account_type,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            rest_url: None,
            websocket_url: None,
        }
    }

    /// REST 기본 URL 재정의 (테스트/프록시용).
    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = Some(url.into());
        self
    }

    /// WebSocket URL 재정의.
    pub fn with_websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    /// 프로세스 환경 변수에서 설정 생성.
    ///
    /// `KIS_DEFAULT_ACCOUNT`(기본 paper)가 가리키는 계좌의 키가 없으면 `None`.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 생성.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_type: KisAccountType = lookup("KIS_DEFAULT_ACCOUNT")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let prefix = account_type.env_prefix();

        let app_key = lookup(&format!("{}_APP_KEY", prefix)).filter(|s| !s.is_empty())?;
        let app_secret = lookup(&format!("{}_APP_SECRET", prefix)).filter(|s| !s.is_empty())?;

        let mut config = Self::new(app_key, app_secret, account_type);
        config.websocket_url = lookup("KIS_WS_URL").filter(|s| !s.is_empty());
        Some(config)
    }

    pub fn rest_base_url(&self) -> &str {
        self.rest_url
            .as_deref()
            .unwrap_or(self.account_type.endpoints().rest)
    }

    pub fn websocket_url(&self) -> &str {
        self.websocket_url
            .as_deref()
            .unwrap_or(self.account_type.endpoints().websocket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_to_paper_server() {
        let config = KisConfig::new("test_key", "test_secret", KisAccountType::Paper);

        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.websocket_url(), "ws://ops.koreainvestment.com:31000");
        assert_eq!(
            config.rest_base_url(),
            "https://openapivts.koreainvestment.com:29443"
        );
    }

    #[test]
    fn test_real_accounts_share_real_server() {
        assert_eq!(KisAccountType::RealGeneral.endpoints(), REAL_ENDPOINTS);
        assert_eq!(KisAccountType::RealIsa.endpoints(), REAL_ENDPOINTS);
        assert!(!KisAccountType::RealIsa.is_paper());
    }

    #[test]
    fn test_account_type_parsing() {
        assert_eq!("paper".parse::<KisAccountType>(), Ok(KisAccountType::Paper));
        assert_eq!(" REAL ".parse::<KisAccountType>(), Ok(KisAccountType::RealGeneral));
        assert_eq!("isa".parse::<KisAccountType>(), Ok(KisAccountType::RealIsa));
        assert!("invalid".parse::<KisAccountType>().is_err());
    }

    #[test]
    fn test_from_lookup_selects_account_prefix() {
        let config = KisConfig::from_lookup(lookup(&[
            ("KIS_DEFAULT_ACCOUNT", "real_general"),
            ("KIS_PAPER_APP_KEY", "paper-key"),
            ("KIS_PAPER_APP_SECRET", "paper-secret"),
            ("KIS_REAL_GENERAL_APP_KEY", "real-key"),
            ("KIS_REAL_GENERAL_APP_SECRET", "real-secret"),
            ("KIS_WS_URL", "ws://127.0.0.1:4321"),
        ]))
        .unwrap();

        assert_eq!(config.app_key, "real-key");
        assert_eq!(config.account_type, KisAccountType::RealGeneral);
        assert_eq!(config.websocket_url(), "ws://127.0.0.1:4321");
        assert_eq!(config.rest_base_url(), REAL_ENDPOINTS.rest);
    }

    #[test]
    fn test_unknown_default_account_falls_back_to_paper() {
        let config = KisConfig::from_lookup(lookup(&[
            ("KIS_DEFAULT_ACCOUNT", "margin"),
            ("KIS_PAPER_APP_KEY", "paper-key"),
            ("KIS_PAPER_APP_SECRET", "paper-secret"),
        ]))
        .unwrap();

        assert_eq!(config.account_type, KisAccountType::Paper);
        assert_eq!(config.app_key, "paper-key");
        assert_eq!(config.websocket_url(), PAPER_ENDPOINTS.websocket);
    }

    #[test]
    fn test_from_lookup_requires_both_keys() {
        assert!(KisConfig::from_lookup(lookup(&[("KIS_PAPER_APP_KEY", "k")])).is_none());
        assert!(KisConfig::from_lookup(lookup(&[
            ("KIS_PAPER_APP_KEY", ""),
            ("KIS_PAPER_APP_SECRET", "s"),
        ]))
        .is_none());
    }

    #[test]
    fn test_debug_hides_secret() {
        let config = KisConfig::new("abcdefgh", "super-secret", KisAccountType::Paper)
            .with_rest_url("http://127.0.0.1:1234");
        let debug = format!("{:?}", config);

        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("abcdefgh"));
        assert!(debug.contains("http://127.0.0.1:1234"));
    }
}
