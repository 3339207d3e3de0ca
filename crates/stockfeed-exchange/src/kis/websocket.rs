//! KIS 국내 주식 실시간 시세 WebSocket 클라이언트.
//!
//! 한국투자증권 WebSocket API를 통해 국내 주식의 실시간 체결가와 호가를 수신하고
//! `RealtimeEvent`로 변환해 채널로 전달합니다.
//!
//! # 지원 채널
//!
//! - `H0STCNT0`: 실시간 체결가
//! - `H0STASP0`: 실시간 호가
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use stockfeed_exchange::kis::{KisConfig, KisOAuth, KisQuoteFeed};
//!
//! let oauth = KisOAuth::new(KisConfig::from_env().ok_or("KIS 인증 정보 없음")?)?;
//! let mut feed = KisQuoteFeed::new(oauth, vec!["005930".to_string()]);
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(1000);
//! tokio::spawn(async move { feed.run(tx, shutdown).await });
//! while let Some(event) = rx.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::auth::KisOAuth;
use super::realtime::{classify_frame, decode_records, kst_today, subscribe_message, KisFrame};
use super::tr_id;
use crate::error::{ExchangeError, ExchangeResult};
use crate::event::RealtimeEvent;
use crate::traits::{ApprovalKeyProvider, QuoteSource};

/// 재연결 최대 시도 횟수.
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// 재연결 대기 시간 (초).
const RECONNECT_DELAY_SECS: u64 = 5;

/// Ping 간격 (초).
const PING_INTERVAL_SECS: u64 = 30;

/// 세션 종료 사유.
enum SessionEnd {
    /// 종료 토큰 취소 또는 수신측 채널 닫힘
    Stopped,
    /// 연결 끊김 (재연결 대상)
    Lost(ExchangeError),
}

/// KIS 국내 주식 실시간 시세 소스.
pub struct KisQuoteFeed {
    approval: Arc<dyn ApprovalKeyProvider>,
    websocket_url: String,
    symbols: Vec<String>,
    reconnect_delay: Duration,
    ping_interval: Duration,
}

impl KisQuoteFeed {
    /// OAuth 관리자의 설정으로 시세 소스 생성.
    pub fn new(oauth: KisOAuth, symbols: Vec<String>) -> Self {
        let websocket_url = oauth.config().websocket_url().to_string();
        Self::with_provider(Arc::new(oauth), websocket_url, symbols)
    }

    /// 임의의 접속키 제공자로 시세 소스 생성.
    pub fn with_provider(
        approval: Arc<dyn ApprovalKeyProvider>,
        websocket_url: impl Into<String>,
        symbols: Vec<String>,
    ) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if !unique.contains(&symbol) {
                unique.push(symbol);
            }
        }

        Self {
            approval,
            websocket_url: websocket_url.into(),
            symbols: unique,
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
            ping_interval: Duration::from_secs(PING_INTERVAL_SECS),
        }
    }

    /// 재연결 대기 시간 변경.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// 구독 종목 목록.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// 연결 한 번의 수명 동안 메시지를 수신합니다.
    ///
    /// 구독 요청까지 성공하면 `established`를 true로 설정합니다.
    async fn run_session(
        &self,
        tx: &mpsc::Sender<RealtimeEvent>,
        shutdown: &CancellationToken,
        established: &mut bool,
    ) -> SessionEnd {
        let approval_key = match self.approval.approval_key().await {
            Ok(key) => key,
            Err(e) => return SessionEnd::Lost(e),
        };

        info!(url = %self.websocket_url, "KIS KR WebSocket 연결 중");

        let ws_stream = tokio::select! {
            _ = shutdown.cancelled() => return SessionEnd::Stopped,
            result = connect_async(self.websocket_url.as_str()) => match result {
                Ok((stream, _)) => stream,
                Err(e) => {
                    return SessionEnd::Lost(ExchangeError::Network(format!(
                        "WebSocket 연결 실패: {}",
                        e
                    )))
                }
            },
        };

        let (mut write, mut read) = ws_stream.split();

        for symbol in &self.symbols {
            for channel in [tr_id::WS_KR_TRADE, tr_id::WS_KR_ORDERBOOK] {
                let msg = match subscribe_message(&approval_key, channel, symbol, true) {
                    Ok(msg) => msg,
                    Err(e) => return SessionEnd::Lost(e),
                };
                if let Err(e) = write.send(Message::Text(msg)).await {
                    return SessionEnd::Lost(e.into());
                }
                debug!(symbol = %symbol, tr_id = channel, "구독 요청 전송");
            }
        }

        *established = true;
        info!(symbols = self.symbols.len(), "KIS KR WebSocket 연결 성공");

        if tx.send(RealtimeEvent::ConnectionStatus(true)).await.is_err() {
            return SessionEnd::Stopped;
        }

        let mut ping_interval = interval(self.ping_interval);
        // 첫 tick은 즉시 발생
        ping_interval.tick().await;

        let lost = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Stopped;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match classify_frame(&text) {
                                Some(KisFrame::PingPong(raw)) => {
                                    debug!("PINGPONG 수신, 그대로 응답");
                                    if let Err(e) = write.send(Message::Text(raw)).await {
                                        break ExchangeError::from(e);
                                    }
                                }
                                Some(KisFrame::Control(control)) if control.is_error() => {
                                    warn!(
                                        tr_id = %control.tr_id,
                                        tr_key = ?control.tr_key,
                                        msg = ?control.msg,
                                        "KIS 구독 요청 실패"
                                    );
                                }
                                Some(KisFrame::Control(control)) => {
                                    debug!(tr_id = %control.tr_id, msg = ?control.msg, "KIS 제어 메시지");
                                }
                                Some(KisFrame::Data { tr_id, records }) => {
                                    for event in decode_records(&tr_id, &records, kst_today()) {
                                        if tx.send(event).await.is_err() {
                                            debug!("이벤트 수신측 종료");
                                            return SessionEnd::Stopped;
                                        }
                                    }
                                }
                                None => debug!(text = %text, "해석할 수 없는 프레임"),
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            debug!("Ping 수신, Pong 응답");
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("서버에서 연결 종료 요청");
                            break ExchangeError::Disconnected("server closed".to_string());
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket 수신 에러");
                            break ExchangeError::from(e);
                        }
                        None => {
                            warn!("WebSocket 스트림 종료");
                            break ExchangeError::Disconnected("stream ended".to_string());
                        }
                        _ => {}
                    }
                }
                _ = ping_interval.tick() => {
                    debug!("Ping 전송");
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        error!(error = %e, "Ping 전송 실패");
                        break ExchangeError::from(e);
                    }
                }
            }
        };

        let _ = tx.send(RealtimeEvent::ConnectionStatus(false)).await;
        SessionEnd::Lost(lost)
    }
}

#[async_trait]
impl QuoteSource for KisQuoteFeed {
    fn name(&self) -> &str {
        "kis"
    }

    async fn run(
        &mut self,
        tx: mpsc::Sender<RealtimeEvent>,
        shutdown: CancellationToken,
    ) -> ExchangeResult<()> {
        if self.symbols.is_empty() {
            return Err(ExchangeError::Config("구독할 종목이 없습니다".to_string()));
        }

        let mut reconnect_attempts = 0;

        loop {
            let mut established = false;
            let err = match self.run_session(&tx, &shutdown, &mut established).await {
                SessionEnd::Stopped => {
                    info!("KIS KR WebSocket 연결 종료");
                    return Ok(());
                }
                SessionEnd::Lost(e) => e,
            };

            if !err.is_retryable() {
                error!(error = %err, "복구할 수 없는 KIS WebSocket 에러");
                let _ = tx.send(RealtimeEvent::Error(err.to_string())).await;
                return Err(err);
            }

            if established {
                reconnect_attempts = 0;
            }
            reconnect_attempts += 1;

            if reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
                error!(attempts = MAX_RECONNECT_ATTEMPTS, "최대 재연결 시도 횟수 초과");
                let _ = tx
                    .send(RealtimeEvent::Error(format!(
                        "최대 재연결 시도 횟수 초과: {}",
                        err
                    )))
                    .await;
                return Err(err);
            }

            let delay = err.backoff_hint().unwrap_or(self.reconnect_delay);
            warn!(
                error = %err,
                delay_ms = delay.as_millis() as u64,
                attempt = reconnect_attempts,
                max = MAX_RECONNECT_ATTEMPTS,
                "재연결 대기"
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }

            // 접속키 재발급
            self.approval.invalidate_approval_key().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticKey {
        issued: AtomicUsize,
        invalidated: AtomicUsize,
    }

    #[async_trait]
    impl ApprovalKeyProvider for StaticKey {
        async fn approval_key(&self) -> ExchangeResult<String> {
            self.issued.fetch_add(1, Ordering::SeqCst);
            Ok("approval".to_string())
        }

        async fn invalidate_approval_key(&self) {
            self.invalidated.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_symbols_deduplicated() {
        let provider = Arc::new(StaticKey {
            issued: AtomicUsize::new(0),
            invalidated: AtomicUsize::new(0),
        });
        let feed = KisQuoteFeed::with_provider(
            provider,
            "ws://127.0.0.1:1",
            vec!["005930".into(), "000660".into(), "005930".into()],
        );
        assert_eq!(feed.symbols(), ["005930".to_string(), "000660".to_string()]);
        assert_eq!(feed.name(), "kis");
    }

    #[tokio::test]
    async fn test_gives_up_after_max_reconnects() {
        let provider = Arc::new(StaticKey {
            issued: AtomicUsize::new(0),
            invalidated: AtomicUsize::new(0),
        });
        // 닫힌 포트로 연결 시도
        let mut feed = KisQuoteFeed::with_provider(
            provider.clone(),
            "ws://127.0.0.1:1",
            vec!["005930".into()],
        )
        .with_reconnect_delay(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel(16);
        let result = feed.run(tx, CancellationToken::new()).await;

        assert!(result.is_err());
        assert_eq!(
            provider.issued.load(Ordering::SeqCst),
            (MAX_RECONNECT_ATTEMPTS + 1) as usize
        );
        assert_eq!(
            provider.invalidated.load(Ordering::SeqCst),
            MAX_RECONNECT_ATTEMPTS as usize
        );
        assert!(matches!(rx.recv().await, Some(RealtimeEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_empty_symbols_is_config_error() {
        let provider = Arc::new(StaticKey {
            issued: AtomicUsize::new(0),
            invalidated: AtomicUsize::new(0),
        });
        let mut feed = KisQuoteFeed::with_provider(provider, "ws://127.0.0.1:1", vec![]);
        let (tx, _rx) = mpsc::channel(1);

        assert!(matches!(
            feed.run(tx, CancellationToken::new()).await,
            Err(ExchangeError::Config(_))
        ));
    }
}
