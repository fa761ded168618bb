//! 실시간 시세 배포 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 실시간 업데이트를 위한 WebSocket 게이트웨이
//! - 연결/구독 레지스트리와 토픽 팬아웃 브로드캐스터
//! - 하트비트 기반 생존 감지
//! - 폴링 폴백 워커와 수요 코디네이터
//! - 통계/헬스 체크 엔드포인트
//! - Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`routes`]: REST API 엔드포인트
//! - [`websocket`]: 실시간 WebSocket 서버
//! - [`services`]: 수요 코디네이터, 폴링 워커
//! - [`metrics`]: Prometheus 메트릭 수집

pub mod metrics;
pub mod routes;
pub mod services;
pub mod state;
pub mod websocket;

pub use metrics::setup_metrics_recorder;
pub use routes::create_api_router;
pub use services::{DemandCommand, DemandCoordinator, PollingWorker};
pub use state::AppState;
pub use websocket::{
    create_registry, drop_connection, run_heartbeat_loop, websocket_router, ClientMessage,
    ConnectionRegistry, HeartbeatMonitor, PriceBroadcaster, ServerMessage, SignalBroadcaster,
    Topic, WsError, WsState,
};
