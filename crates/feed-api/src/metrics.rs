//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! WebSocket 연결 수, 브로드캐스트/폴링 카운터를 수집하고
//! `/metrics` 엔드포인트로 노출합니다.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설정하고 핸들을 반환합니다.
///
/// # 패닉
///
/// 레코더가 이미 설치되어 있으면 패닉합니다.
pub fn setup_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Prometheus 레코더 설치 실패")
}

// ============================================================================
// WebSocket 메트릭
// ============================================================================

/// WebSocket 연결 수 증가.
pub fn increment_websocket_connections() {
    gauge!("websocket_connections_active").increment(1.0);
}

/// WebSocket 연결 수 감소.
pub fn decrement_websocket_connections() {
    gauge!("websocket_connections_active").decrement(1.0);
}

// ============================================================================
// 브로드캐스트 메트릭
// ============================================================================

/// 메시지 전달 카운터 증가.
pub fn record_publish(kind: &str, delivered: usize) {
    counter!("broadcast_messages_total", "kind" => kind.to_string())
        .increment(delivered as u64);
}

/// 연결 전달 실패 카운터 증가.
pub fn record_delivery_failure() {
    counter!("broadcast_delivery_failures_total").increment(1);
}

// ============================================================================
// 폴링 메트릭
// ============================================================================

/// 폴링 조회 결과 기록.
pub fn record_poll_fetch(success: bool) {
    let status = if success { "ok" } else { "error" };
    counter!("poll_fetches_total", "status" => status.to_string()).increment(1);
}
