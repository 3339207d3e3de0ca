//! 상류 시세 소스 선택 및 실행.
//!
//! - `mock`: 항상 모의 시뮬레이터
//! - `kis`: KIS 인증 정보가 없거나 토큰 발급에 실패하면 시작하지 않음
//! - `auto`: KIS를 시도하고, 안 되면 모의 시뮬레이터로 대체

use std::sync::Arc;
use std::time::Duration;

use stockfeed_core::{FeedConfig, FeedSource};
use stockfeed_exchange::kis::{KisConfig, KisOAuth, KisQuoteFeed};
use stockfeed_exchange::{
    ExchangeError, ExchangeResult, QuoteSource, RealtimeEvent, TokenProvider,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::state::FeedStatus;
use crate::websocket::MockQuoteSimulator;

/// 선택된 시세 소스.
pub struct SelectedFeed {
    /// 실행할 소스
    pub source: Box<dyn QuoteSource>,
    /// KIS 사용 시 OAuth 관리자 (종료 시 토큰 폐기용)
    pub oauth: Option<KisOAuth>,
    /// 소스가 실패하면 모의 시뮬레이터로 대체할지 여부
    pub fallback_to_mock: bool,
}

impl SelectedFeed {
    fn mock(config: &FeedConfig, fallback_to_mock: bool) -> Self {
        Self {
            source: Box::new(mock_simulator(config)),
            oauth: None,
            fallback_to_mock,
        }
    }

    /// 소스 이름.
    pub fn name(&self) -> &str {
        self.source.name()
    }
}

fn mock_simulator(config: &FeedConfig) -> MockQuoteSimulator {
    MockQuoteSimulator::new(&config.symbols, Duration::from_millis(config.mock_interval_ms))
}

/// 접근 토큰을 한 번 발급받아 인증 정보를 검증합니다.
pub async fn verify_credentials(provider: &dyn TokenProvider) -> ExchangeResult<()> {
    let token = provider.access_token().await?;
    info!(expires_at = %token.expires_at, "KIS 인증 정보 확인 완료");
    Ok(())
}

/// 설정에 따라 시세 소스 선택.
///
/// # Errors
///
/// `kis` 모드에서 인증 정보가 없거나 검증에 실패하면 에러를 반환합니다.
pub async fn select_quote_source(
    config: &FeedConfig,
    kis_config: Option<KisConfig>,
) -> ExchangeResult<SelectedFeed> {
    match config.source {
        FeedSource::Mock => {
            info!("Mock quote source selected");
            Ok(SelectedFeed::mock(config, false))
        }
        FeedSource::Kis => {
            let kis_config = kis_config.ok_or_else(|| {
                ExchangeError::Config(
                    "feed.source=kis 이지만 KIS 인증 정보(KIS_*_APP_KEY/APP_SECRET)가 없습니다"
                        .to_string(),
                )
            })?;
            kis_feed(config, kis_config, false).await
        }
        FeedSource::Auto => {
            let Some(kis_config) = kis_config else {
                warn!("KIS not configured, falling back to mock quote source");
                return Ok(SelectedFeed::mock(config, false));
            };

            match kis_feed(config, kis_config, true).await {
                Ok(selected) => Ok(selected),
                Err(e) => {
                    warn!(error = %e, "KIS credential check failed, falling back to mock");
                    Ok(SelectedFeed::mock(config, false))
                }
            }
        }
    }
}

async fn kis_feed(
    config: &FeedConfig,
    kis_config: KisConfig,
    fallback_to_mock: bool,
) -> ExchangeResult<SelectedFeed> {
    let oauth = KisOAuth::new(kis_config)?;
    verify_credentials(&oauth).await?;

    info!(
        symbols = config.symbols.len(),
        url = %oauth.config().websocket_url(),
        "KIS realtime quote source selected"
    );

    Ok(SelectedFeed {
        source: Box::new(KisQuoteFeed::new(oauth.clone(), config.symbols.clone())),
        oauth: Some(oauth),
        fallback_to_mock,
    })
}

/// 시세 소스를 백그라운드 태스크로 시작.
///
/// 소스가 에러로 끝나고 대체가 허용되어 있으면 모의 시뮬레이터로 이어서 실행합니다.
pub fn start_quote_feed(
    selected: SelectedFeed,
    config: FeedConfig,
    status: Arc<FeedStatus>,
    tx: mpsc::Sender<RealtimeEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let SelectedFeed {
        mut source,
        fallback_to_mock,
        ..
    } = selected;

    tokio::spawn(async move {
        status.set_source(source.name());
        info!(source = %source.name(), "Quote source started");

        let result = source.run(tx.clone(), shutdown.clone()).await;
        status.set_connected(false);

        match result {
            Ok(()) => {
                info!(source = %source.name(), "Quote source stopped");
                return;
            }
            Err(e) => error!(source = %source.name(), error = %e, "Quote source failed"),
        }

        if !fallback_to_mock || shutdown.is_cancelled() {
            return;
        }

        warn!("Falling back to mock quote source");
        let mut simulator = mock_simulator(&config);
        status.set_source(simulator.name());
        if let Err(e) = simulator.run(tx, shutdown).await {
            error!(error = %e, "Mock quote source failed");
        }
        status.set_connected(false);
    })
}
