//! 모든 핸들러에서 공유되는 애플리케이션 상태.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::websocket::{create_session_registry, SharedSessionRegistry};

/// 상류 시세 소스 상태.
///
/// 시세 수집 태스크가 갱신하고 `/health`가 읽습니다.
#[derive(Debug, Default)]
pub struct FeedStatus {
    source: RwLock<String>,
    connected: AtomicBool,
}

impl FeedStatus {
    /// 현재 소스 이름 ("kis" | "mock" 등).
    pub fn source(&self) -> String {
        self.source
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// 소스 이름 변경 (폴백 시).
    pub fn set_source(&self, name: &str) {
        match self.source.write() {
            Ok(mut source) => *source = name.to_string(),
            Err(poisoned) => *poisoned.into_inner() = name.to_string(),
        }
    }

    /// 상류 연결 여부.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// 상류 연결 상태 갱신.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 핸들러에 주입됩니다.
#[derive(Clone)]
pub struct AppState {
    /// 프론트엔드 세션 레지스트리
    pub registry: SharedSessionRegistry,

    /// 상류 시세 소스 상태
    pub feed: Arc<FeedStatus>,

    /// 서버 버전
    pub version: String,

    /// 서버 시작 시각
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// 새로운 상태 생성.
    pub fn new(registry: SharedSessionRegistry) -> Self {
        Self {
            registry,
            feed: Arc::new(FeedStatus::default()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    /// 주어진 큐 용량의 레지스트리로 상태 생성.
    pub fn with_capacity(outbound_capacity: usize) -> Self {
        Self::new(create_session_registry(outbound_capacity))
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
