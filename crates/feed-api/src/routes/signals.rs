//! 시그널 배치 주입 endpoint.
//!
//! 패턴 스캐닝 엔진(이 시스템 범위 밖)이 완성된 시그널 배치를
//! 카테고리 토픽으로 흘려보내는 주입 지점입니다. 시그널의 산출
//! 방식은 알지 못하며 전달만 담당합니다.

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use feed_core::{SignalRecord, SignalSnapshot};

use crate::state::AppState;

/// 시그널 주입 응답.
#[derive(Debug, Serialize)]
pub struct PublishSignalsResponse {
    /// 배치에 포함된 시그널 수
    pub count: usize,
    /// 전달된 구독자 수
    pub delivered: usize,
}

/// 시그널 배치 주입.
///
/// POST /api/v1/signals/{category}
pub async fn publish_signals(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Json(records): Json<Vec<SignalRecord>>,
) -> Json<PublishSignalsResponse> {
    let batch = SignalSnapshot::new(records);
    let count = batch.count;

    let delivered = state.signals.publish(&category, batch).await;

    info!(category = %category, count, delivered, "Signal batch published");

    Json(PublishSignalsResponse { count, delivered })
}

/// 시그널 라우터 생성.
pub fn signals_router() -> Router<Arc<AppState>> {
    Router::new().route("/{category}", post(publish_signals))
}
