//! 프론트엔드 WebSocket 세션 레지스트리.
//!
//! 열린 연결의 멤버십 집합을 관리하고, 시세 메시지를 모든 멤버에게 fan-out 합니다.
//!
//! - 브로드캐스트는 멤버십 스냅샷을 뜬 뒤 락을 놓고 전달합니다.
//!   전달 중에도 등록/해제가 자유롭게 일어날 수 있습니다.
//! - 전달은 연결별 bounded 큐에 대한 `try_send`이므로 브로드캐스터를 막지 않습니다.
//! - 큐가 가득 찬 느린 클라이언트는 연결을 끊습니다.
//! - 전달 실패는 호출자에게 전파되지 않고, 실패한 연결만 해제됩니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics::{record_delivery_failure, record_quote_broadcast, set_websocket_connections};

/// 연결별 아웃바운드 큐 기본 용량.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// 연결 식별자. 재접속하면 새 식별자가 발급됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// 새 식별자 생성.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// 연결 상태. `Connecting → Open → Closed` 순서로만 바뀝니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 핸드셰이크 완료, 아직 미등록
    Connecting,
    /// 브로드캐스트 대상
    Open,
    /// 종료됨 (되돌릴 수 없음)
    Closed,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Connecting => 0,
            ConnectionState::Open => 1,
            ConnectionState::Closed => 2,
        }
    }
}

/// 연결 상태 셀. `Connection`과 `OutboundQueue`가 공유합니다.
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(ConnectionState::Connecting.as_u8()))
    }

    fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// `Connecting → Open` 전이. 이미 `Open`이면 true, `Closed`면 false.
    fn open(&self) -> bool {
        match self.0.compare_exchange(
            ConnectionState::Connecting.as_u8(),
            ConnectionState::Open.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(current) => ConnectionState::from_u8(current) == ConnectionState::Open,
        }
    }

    fn close(&self) {
        self.0
            .store(ConnectionState::Closed.as_u8(), Ordering::Release);
    }
}

/// 전달 실패 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// 아웃바운드 큐가 가득 참 (느린 클라이언트)
    #[error("outbound queue full")]
    Overflow,
    /// 연결이 닫혔거나 writer가 사라짐
    #[error("connection closed")]
    Closed,
}

impl DeliveryError {
    /// 메트릭 라벨.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryError::Overflow => "overflow",
            DeliveryError::Closed => "closed",
        }
    }
}

/// 연결 하나에 대한 전달 실패 기록.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub connection_id: ConnectionId,
    pub error: DeliveryError,
}

/// 브로드캐스트 결과.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// 큐에 넣는 데 성공한 연결 수
    pub delivered: usize,
    /// 실패해서 해제된 연결
    pub dropped: Vec<DeliveryFailure>,
}

impl BroadcastReport {
    /// 해제된 연결 ID 목록.
    pub fn dropped_ids(&self) -> Vec<ConnectionId> {
        self.dropped.iter().map(|f| f.connection_id).collect()
    }
}

/// 등록 가능한 클라이언트 연결 핸들.
///
/// 레지스트리가 멤버로 소유하며, 브로드캐스트 스냅샷을 위해 복제됩니다.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    state: Arc<StateCell>,
    sender: mpsc::Sender<Arc<str>>,
}

impl Connection {
    /// `capacity` 크기의 아웃바운드 큐를 가진 새 연결 생성.
    ///
    /// 반환된 `OutboundQueue`는 소켓 writer 태스크가 소비합니다.
    pub fn open(capacity: usize) -> (Connection, OutboundQueue) {
        let id = ConnectionId::new();
        let state = Arc::new(StateCell::new());
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        (
            Connection {
                id,
                state: state.clone(),
                sender,
            },
            OutboundQueue {
                id,
                state,
                receiver,
            },
        )
    }

    /// 연결 ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 현재 상태.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// 큐에 메시지를 넣습니다. 절대 대기하지 않습니다.
    fn try_deliver(&self, payload: &Arc<str>) -> Result<(), DeliveryError> {
        if self.state.get() != ConnectionState::Open {
            return Err(DeliveryError::Closed);
        }

        self.sender
            .try_send(Arc::clone(payload))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Overflow,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }
}

/// 연결의 아웃바운드 큐 수신측.
#[derive(Debug)]
pub struct OutboundQueue {
    id: ConnectionId,
    state: Arc<StateCell>,
    receiver: mpsc::Receiver<Arc<str>>,
}

impl OutboundQueue {
    /// 연결 ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 연결 상태.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// 다음 메시지를 FIFO 순서로 꺼냅니다.
    ///
    /// 연결이 `Closed`가 되었거나 모든 송신측이 사라지면 `None`.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        if self.state.get() == ConnectionState::Closed {
            return None;
        }
        let payload = self.receiver.recv().await?;
        if self.state.get() == ConnectionState::Closed {
            return None;
        }
        Some(payload)
    }
}

/// 열린 프론트엔드 연결의 멤버십 집합.
///
/// `Arc`로 공유해서 WebSocket 엔드포인트와 시세 수집 태스크가 함께 사용합니다.
/// 모든 연산은 외부 락 없이 동시에 호출할 수 있습니다.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, Connection>>,
    outbound_capacity: usize,
}

impl SessionRegistry {
    /// 새 레지스트리 생성.
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            outbound_capacity: outbound_capacity.max(1),
        }
    }

    /// 이 레지스트리의 큐 용량으로 새 연결 생성.
    pub fn open_connection(&self) -> (Connection, OutboundQueue) {
        Connection::open(self.outbound_capacity)
    }

    /// 연결 등록.
    ///
    /// 이미 등록된 연결이면 아무것도 바뀌지 않습니다. `Closed` 연결은 등록되지 않고 false.
    /// 반환값은 호출 후 브로드캐스트 대상인지 여부입니다.
    pub async fn register(&self, connection: Connection) -> bool {
        let mut sessions = self.sessions.write().await;

        if !connection.state.open() {
            debug!(connection_id = %connection.id, "Closed 연결 등록 무시");
            return false;
        }

        let id = connection.id;
        if sessions.contains_key(&id) {
            return true;
        }

        sessions.insert(id, connection);
        set_websocket_connections(sessions.len());
        info!(connection_id = %id, total = sessions.len(), "세션 등록");
        true
    }

    /// 연결 해제. 해제되었으면 true, 멤버가 아니었으면 false.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut sessions = self.sessions.write().await;

        match sessions.remove(&id) {
            Some(connection) => {
                connection.state.close();
                set_websocket_connections(sessions.len());
                info!(connection_id = %id, total = sessions.len(), "세션 해제");
                true
            }
            None => false,
        }
    }

    /// 현재 멤버 전원에게 메시지 전달.
    ///
    /// 에러를 반환하지 않습니다. 실패한 연결은 해제하고 결과에 기록합니다.
    pub async fn broadcast(&self, payload: Arc<str>) -> BroadcastReport {
        let targets: Vec<Connection> = {
            let sessions = self.sessions.read().await;
            sessions.values().cloned().collect()
        };

        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let mut report = BroadcastReport::default();
        for connection in &targets {
            match connection.try_deliver(&payload) {
                Ok(()) => report.delivered += 1,
                Err(error) => report.dropped.push(DeliveryFailure {
                    connection_id: connection.id,
                    error,
                }),
            }
        }
        drop(targets);

        for failure in &report.dropped {
            match failure.error {
                DeliveryError::Overflow => warn!(
                    connection_id = %failure.connection_id,
                    capacity = self.outbound_capacity,
                    "아웃바운드 큐 초과, 연결 종료"
                ),
                DeliveryError::Closed => debug!(
                    connection_id = %failure.connection_id,
                    "닫힌 연결 정리"
                ),
            }
            record_delivery_failure(failure.error.label());
            self.unregister(failure.connection_id).await;
        }

        record_quote_broadcast(report.delivered);
        report
    }

    /// 멤버 수.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// 멤버가 없는지 확인.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// 멤버 여부.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// 멤버 ID 목록 (순서 없음).
    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.sessions.read().await.keys().copied().collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}

/// 공유 레지스트리 타입.
pub type SharedSessionRegistry = Arc<SessionRegistry>;

/// 공유 레지스트리 생성.
pub fn create_session_registry(outbound_capacity: usize) -> SharedSessionRegistry {
    Arc::new(SessionRegistry::new(outbound_capacity))
}
