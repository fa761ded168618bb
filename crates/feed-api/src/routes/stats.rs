//! 브로드캐스트 서브시스템 통계 endpoint.
//!
//! 레지스트리/브리지/폴러의 현재 상태를 동적으로 반영합니다.
//! 고정된 토픽 목록이 아니라 실제 구독 상태를 그대로 보여줍니다.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use feed_exchange::{BridgeState, PushFeed};

use crate::state::AppState;

/// 통계 응답.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// 활성 연결 수
    pub active_connections: usize,

    /// 토픽별 구독자 수
    pub topics: HashMap<String, usize>,

    /// 브리지 연결 상태 (모의 모드에서는 None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bridge_state: Option<BridgeState>,

    /// 업스트림 푸시 구독 중인 종목
    pub push_active: Vec<String>,

    /// 폴링 추적 중인 종목
    pub poll_tracked: Vec<String>,

    /// 하트비트 모니터 실행 여부
    pub heartbeat_running: bool,

    /// 시세 캐시 엔트리 수
    pub cache_entries: usize,
}

/// 통계 조회.
///
/// GET /api/v1/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let (bridge_state, push_active) = match &state.bridge {
        Some(bridge) => (
            Some(bridge.state().await),
            bridge.active_instruments().await,
        ),
        None => (None, Vec::new()),
    };

    Json(StatsResponse {
        active_connections: state.registry.connection_count().await,
        topics: state.registry.topic_counts().await,
        bridge_state,
        push_active,
        poll_tracked: state.poller.tracked().await,
        heartbeat_running: state.heartbeat.is_running(),
        cache_entries: state.cache.len().await,
    })
}

/// 통계 라우터 생성.
pub fn stats_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_stats))
}
