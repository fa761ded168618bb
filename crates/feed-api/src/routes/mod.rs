//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)
//! - `/api/v1/stats` - 브로드캐스트 서브시스템 통계
//! - `/api/v1/signals/{category}` - 시그널 배치 주입

pub mod health;
pub mod signals;
pub mod stats;

pub use health::{health_router, ComponentStatus, HealthResponse};
pub use signals::{signals_router, PublishSignalsResponse};
pub use stats::{stats_router, StatsResponse};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/api/v1/stats", stats_router())
        .nest("/api/v1/signals", signals_router())
}
