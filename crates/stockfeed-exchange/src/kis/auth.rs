//! KIS OAuth 2.0 인증.
//!
//! 시세 중계에 필요한 세 가지 요청만 다룹니다.
//!
//! | 요청 | 경로 | 캐시 |
//! |------|------|------|
//! | 접근 토큰 | `POST /oauth2/tokenP` | 만료 1시간 전까지 |
//! | 토큰 폐기 | `POST /oauth2/revokeP` | 캐시 비움 |
//! | WebSocket 접속키 | `POST /oauth2/Approval` | 재연결 전까지 |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::config::KisConfig;
use crate::error::{ExchangeError, ExchangeResult};
use crate::traits::{ApprovalKeyProvider, TokenProvider};

/// 토큰 갱신 임계값 (남은 시간이 이 값보다 적으면 갱신).
const TOKEN_REFRESH_THRESHOLD_HOURS: i64 = 1;

/// AppKey/AppSecret 최소 길이.
const MIN_CREDENTIAL_LEN: usize = 20;

#[derive(Serialize)]
struct ClientCredentials<'a> {
    grant_type: &'static str,
    appkey: &'a str,
    appsecret: &'a str,
}

// Approval 요청만 시크릿 필드 이름이 다름
#[derive(Serialize)]
struct ApprovalRequest<'a> {
    grant_type: &'static str,
    appkey: &'a str,
    secretkey: &'a str,
}

#[derive(Serialize)]
struct RevokeRequest<'a> {
    appkey: &'a str,
    appsecret: &'a str,
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
    /// "YYYY-MM-DD HH:MM:SS" (KST)
    #[serde(default)]
    access_token_token_expired: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApprovalResponse {
    approval_key: String,
}

#[derive(Debug, Deserialize)]
struct RevokeResponse {
    #[serde(default)]
    message: Option<String>,
}

/// 일반 API 에러 본문 (`rt_cd`, `msg_cd`, `msg1`).
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    msg_cd: String,
    msg1: String,
}

/// OAuth 에러 본문.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error_code: String,
    error_description: String,
}

/// 발급받은 접근 토큰.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenState {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    fn from_response(resp: TokenResponse) -> Self {
        let expires_at = resp
            .access_token_token_expired
            .as_deref()
            .and_then(parse_kis_datetime)
            .unwrap_or_else(|| Utc::now() + Duration::seconds(resp.expires_in));

        Self {
            access_token: resp.access_token,
            token_type: resp.token_type,
            expires_at,
        }
    }

    /// 만료되었거나 1시간 안에 만료되는지 확인.
    pub fn is_expired_or_expiring(&self) -> bool {
        self.expires_at <= Utc::now() + Duration::hours(TOKEN_REFRESH_THRESHOLD_HOURS)
    }

    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }

    /// `Authorization` 헤더 값.
    pub fn auth_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// KIS OAuth 인증 관리자.
///
/// 토큰과 WebSocket 접속키를 캐시하며, 복제본끼리 캐시를 공유합니다.
#[derive(Clone)]
pub struct KisOAuth {
    config: KisConfig,
    client: Client,
    token: Arc<RwLock<Option<TokenState>>>,
    approval_key: Arc<RwLock<Option<String>>>,
}

impl KisOAuth {
    /// 새로운 OAuth 관리자 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::Network`를 반환합니다.
    pub fn new(config: KisConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::Network(format!("HTTP client 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            client,
            token: Arc::new(RwLock::new(None)),
            approval_key: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &KisConfig {
        &self.config
    }

    /// 잘못 설정된 키로 KIS 서버를 두드리지 않도록 길이만 먼저 확인합니다.
    fn validate_credentials(&self) -> ExchangeResult<()> {
        for (name, value) in [
            ("AppKey", &self.config.app_key),
            ("AppSecret", &self.config.app_secret),
        ] {
            if value.len() < MIN_CREDENTIAL_LEN {
                error!(field = name, length = value.len(), "KIS 인증 정보 형식 오류");
                return Err(ExchangeError::Unauthorized(format!(
                    "KIS {} 설정이 올바르지 않습니다. 한국투자증권에서 발급받은 값을 설정하세요.",
                    name
                )));
            }
        }
        Ok(())
    }

    /// JSON 본문으로 POST하고 성공 응답을 `T`로 해석합니다.
    async fn post_json<B, T>(&self, path: &str, body: &B) -> ExchangeResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.rest_base_url(), path);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!(path, %status, body = %text, "KIS OAuth 요청 실패");
            return Err(classify_error_body(status.as_u16(), &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| ExchangeError::Parse(format!("{} 응답 해석 실패: {}", path, e)))
    }

    /// 유효한 접근 토큰 반환, 필요시 갱신.
    pub async fn get_token(&self) -> ExchangeResult<TokenState> {
        if let Some(token) = self.token.read().await.as_ref() {
            if !token.is_expired_or_expiring() {
                debug!(expires_at = %token.expires_at, "Using cached KIS token");
                return Ok(token.clone());
            }
            warn!(expires_at = %token.expires_at, "KIS token expiring soon, refreshing");
        }

        self.refresh_token().await
    }

    /// 접근 토큰 강제 갱신.
    pub async fn refresh_token(&self) -> ExchangeResult<TokenState> {
        self.validate_credentials()?;
        info!("Requesting new KIS access token");

        let response: TokenResponse = self
            .post_json(
                "/oauth2/tokenP",
                &ClientCredentials {
                    grant_type: "client_credentials",
                    appkey: &self.config.app_key,
                    appsecret: &self.config.app_secret,
                },
            )
            .await?;

        let token = TokenState::from_response(response);
        *self.token.write().await = Some(token.clone());

        info!(expires_at = %token.expires_at, "KIS access token obtained");
        Ok(token)
    }

    /// 현재 접근 토큰 폐기. 캐시된 토큰이 없으면 요청하지 않습니다.
    ///
    /// 서버 응답과 관계없이 로컬 캐시는 비웁니다.
    pub async fn revoke_token(&self) -> ExchangeResult<()> {
        let Some(token) = self.token.write().await.take() else {
            return Ok(());
        };

        let response: RevokeResponse = self
            .post_json(
                "/oauth2/revokeP",
                &RevokeRequest {
                    appkey: &self.config.app_key,
                    appsecret: &self.config.app_secret,
                    token: &token.access_token,
                },
            )
            .await?;

        info!(message = ?response.message, "KIS access token revoked");
        Ok(())
    }

    /// WebSocket 접속키 반환. 캐시된 키가 있으면 그대로 사용합니다.
    pub async fn get_websocket_key(&self) -> ExchangeResult<String> {
        if let Some(key) = self.approval_key.read().await.as_ref() {
            return Ok(key.clone());
        }

        self.validate_credentials()?;
        info!("Requesting WebSocket approval key");

        let response: ApprovalResponse = self
            .post_json(
                "/oauth2/Approval",
                &ApprovalRequest {
                    grant_type: "client_credentials",
                    appkey: &self.config.app_key,
                    secretkey: &self.config.app_secret,
                },
            )
            .await?;

        *self.approval_key.write().await = Some(response.approval_key.clone());
        info!("WebSocket approval key obtained");

        Ok(response.approval_key)
    }

    /// 캐시된 접속키 삭제. 다음 연결 시 새로 발급받습니다.
    pub async fn clear_websocket_key(&self) {
        *self.approval_key.write().await = None;
    }

    pub async fn has_valid_token(&self) -> bool {
        self.token
            .read()
            .await
            .as_ref()
            .is_some_and(TokenState::is_valid)
    }
}

#[async_trait]
impl TokenProvider for KisOAuth {
    async fn access_token(&self) -> ExchangeResult<TokenState> {
        self.get_token().await
    }
}

#[async_trait]
impl ApprovalKeyProvider for KisOAuth {
    async fn approval_key(&self) -> ExchangeResult<String> {
        self.get_websocket_key().await
    }

    async fn invalidate_approval_key(&self) {
        self.clear_websocket_key().await;
    }
}

/// 실패 응답 본문을 에러로 분류.
///
/// - HTTP 429, `EGW00133` → `RateLimited`
/// - OAuth 에러 본문 → `Unauthorized`
/// - 일반 API 에러 본문 → `ApiError` (`msg_cd`의 숫자 부분이 코드)
fn classify_error_body(status: u16, body: &str) -> ExchangeError {
    if status == 429 {
        return ExchangeError::RateLimited;
    }

    if let Ok(oauth) = serde_json::from_str::<OAuthErrorBody>(body) {
        let message = match oauth.error_code.as_str() {
            "EGW00133" => return ExchangeError::RateLimited,
            "EGW00103" => "유효하지 않은 AppKey입니다.".to_string(),
            "EGW00102" => "AppKey가 만료되었습니다. 새 AppKey를 발급받으세요.".to_string(),
            "EGW00101" => "AppSecret이 일치하지 않습니다.".to_string(),
            code => format!("{} ({})", oauth.error_description, code),
        };
        return ExchangeError::Unauthorized(message);
    }

    if let Ok(api) = serde_json::from_str::<ApiErrorBody>(body) {
        let code = api
            .msg_cd
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .unwrap_or(-1);
        return ExchangeError::ApiError {
            code,
            message: api.msg1,
        };
    }

    // 게이트웨이/프록시 장애 페이지는 일시적인 네트워크 장애로 취급
    if status >= 500 {
        return ExchangeError::Network(format!("KIS server error {}: {}", status, body.trim()));
    }

    ExchangeError::ApiError {
        code: i32::from(status),
        message: body.to_string(),
    }
}

/// KIS 날짜시간 형식 파싱 ("YYYY-MM-DD HH:MM:SS", KST).
fn parse_kis_datetime(s: &str) -> Option<DateTime<Utc>> {
    use chrono::{NaiveDateTime, TimeZone};
    use chrono_tz::Asia::Seoul;

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").ok()?;
    let kst = Seoul.from_local_datetime(&naive).single()?;
    Some(kst.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kis::config::KisAccountType;
    use chrono::Timelike;

    #[test]
    fn test_token_state_expiry() {
        let token = TokenState {
            access_token: "test".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + Duration::hours(24),
        };

        assert!(token.is_valid());
        assert!(!token.is_expired_or_expiring());
    }

    #[test]
    fn test_token_state_expiring() {
        let token = TokenState {
            access_token: "test".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + Duration::minutes(30),
        };

        assert!(token.is_valid());
        assert!(token.is_expired_or_expiring());
    }

    #[test]
    fn test_token_auth_header() {
        let token = TokenState {
            access_token: "abc123".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + Duration::hours(24),
        };

        assert_eq!(token.auth_header(), "Bearer abc123");
    }

    #[test]
    fn test_parse_kis_datetime() {
        let dt = parse_kis_datetime("2026-01-28 15:30:00").unwrap();
        // KST 15:30 = UTC 06:30
        assert_eq!(dt.hour(), 6);
        assert_eq!(dt.minute(), 30);
        assert!(parse_kis_datetime("2026/01/28").is_none());
    }

    #[test]
    fn test_classify_error_body() {
        let oauth = r#"{"error_code":"EGW00103","error_description":"invalid"}"#;
        assert!(matches!(
            classify_error_body(403, oauth),
            ExchangeError::Unauthorized(_)
        ));

        let api = r#"{"rt_cd":"1","msg_cd":"EGW00201","msg1":"초당 거래건수를 초과하였습니다."}"#;
        match classify_error_body(500, api) {
            ExchangeError::ApiError { code, message } => {
                assert_eq!(code, 201);
                assert!(message.contains("초과"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert!(matches!(
            classify_error_body(429, "slow down"),
            ExchangeError::RateLimited
        ));
        assert!(matches!(
            classify_error_body(400, "bad request"),
            ExchangeError::ApiError { code: 400, .. }
        ));
    }

    #[test]
    fn test_unparsed_server_error_is_retryable() {
        let err = classify_error_body(502, "<html>Bad Gateway</html>");
        assert!(matches!(err, ExchangeError::Network(_)));
        assert!(err.is_retryable());

        assert!(classify_error_body(503, "").is_retryable());
    }

    #[tokio::test]
    async fn test_short_credentials_rejected_without_network() {
        let config = KisConfig::new("short", "short", KisAccountType::Paper)
            .with_rest_url("http://127.0.0.1:9");
        let oauth = KisOAuth::new(config).unwrap();

        assert!(matches!(
            oauth.get_token().await,
            Err(ExchangeError::Unauthorized(_))
        ));
        assert!(matches!(
            oauth.get_websocket_key().await,
            Err(ExchangeError::Unauthorized(_))
        ));
        assert!(!oauth.has_valid_token().await);
    }
}
