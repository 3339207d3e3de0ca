//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! 중계 서버 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.
//! 레코더가 설치되지 않았으면 모든 기록 함수는 아무 일도 하지 않습니다.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설정하고 핸들을 반환합니다.
///
/// # 반환값
///
/// `/metrics` 엔드포인트에서 메트릭을 렌더링하기 위한 `PrometheusHandle`
///
/// # Errors
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

// ============================================================================
// WebSocket 세션 메트릭
// ============================================================================

/// WebSocket 연결 수 설정.
pub fn set_websocket_connections(count: usize) {
    gauge!("websocket_connections_active").set(count as f64);
}

// ============================================================================
// 시세 중계 메트릭
// ============================================================================

/// 브로드캐스트 1회와 성공한 전달 수 기록.
pub fn record_quote_broadcast(delivered: usize) {
    counter!("quote_broadcasts_total").increment(1);
    counter!("quote_deliveries_total").increment(delivered as u64);
}

/// 전달 실패 카운터 증가.
pub fn record_delivery_failure(reason: &'static str) {
    counter!("quote_delivery_failures_total", "reason" => reason).increment(1);
}

/// 상류 이벤트 카운터 증가.
pub fn record_upstream_event(kind: &'static str) {
    counter!("upstream_events_total", "kind" => kind).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_without_recorder_are_noops() {
        set_websocket_connections(3);
        record_quote_broadcast(3);
        record_delivery_failure("overflow");
        record_upstream_event("trade");
    }
}
