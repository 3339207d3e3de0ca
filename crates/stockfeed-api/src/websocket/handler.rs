//! WebSocket 연결 handler.
//!
//! 시세 구독용 Axum WebSocket 엔드포인트. 클라이언트는 별도 메시지 없이
//! 연결만 하면 모든 종목의 시세를 받습니다.

use axum::{
    extract::{
        ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// WebSocket 업그레이드 핸들러.
///
/// # 엔드포인트
///
/// `GET /ws/stock` (경로는 설정 가능)
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let registry = state.registry.clone();
    let (connection, mut queue) = registry.open_connection();
    let connection_id = connection.id();

    if !registry.register(connection).await {
        warn!(%connection_id, "세션 등록 실패");
        return;
    }
    info!(%connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    // 아웃바운드 큐 → 소켓
    let mut send_task = tokio::spawn(async move {
        while let Some(payload) = queue.recv().await {
            if sender
                .send(Message::Text(Utf8Bytes::from(&*payload)))
                .await
                .is_err()
            {
                break;
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    // 클라이언트 메시지는 무시하고 종료만 감지
    let mut receive_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!(%connection_id, "Close message received");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%connection_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    // 하나의 태스크가 종료되면 다른 것도 종료
    tokio::select! {
        _ = &mut send_task => {
            debug!(%connection_id, "Send task ended");
            receive_task.abort();
        }
        _ = &mut receive_task => {
            debug!(%connection_id, "Receive task ended");
            send_task.abort();
        }
    }

    registry.unregister(connection_id).await;
    info!(%connection_id, "WebSocket disconnected");
}

/// WebSocket 라우터 생성.
pub fn websocket_router(path: &str) -> Router<AppState> {
    Router::new().route(path, get(websocket_handler))
}
