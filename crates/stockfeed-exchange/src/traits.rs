//! 시세 중계에 필요한 외부 협력자 trait 정의.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ExchangeResult;
use crate::event::RealtimeEvent;
use crate::kis::TokenState;

/// 증권사 REST API용 접근 토큰 제공자.
///
/// 호출 시점에 유효한 토큰을 반환하며, 필요하면 갱신합니다.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// 유효한 접근 토큰 반환.
    async fn access_token(&self) -> ExchangeResult<TokenState>;
}

/// 실시간 WebSocket 접속키 제공자.
#[async_trait]
pub trait ApprovalKeyProvider: Send + Sync {
    /// 캐시된 접속키 반환, 없으면 새로 발급.
    async fn approval_key(&self) -> ExchangeResult<String>;

    /// 캐시된 접속키 폐기. 재연결 전에 호출합니다.
    async fn invalidate_approval_key(&self);
}

/// 원시 시세 이벤트를 밀어 넣는 상류 시세 소스.
#[async_trait]
pub trait QuoteSource: Send {
    /// 소스 이름 (로그/헬스 체크용).
    fn name(&self) -> &str;

    /// 종료 토큰이 취소되거나 복구 불가능한 에러가 날 때까지 이벤트를 전송합니다.
    async fn run(
        &mut self,
        tx: mpsc::Sender<RealtimeEvent>,
        shutdown: CancellationToken,
    ) -> ExchangeResult<()>;
}
