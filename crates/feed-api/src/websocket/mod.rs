//! 실시간 WebSocket 서버.
//!
//! - [`messages`]: 클라이언트-서버 메시지 정의
//! - [`topic`]: 구독 토픽 모델
//! - [`registry`]: 연결/구독 레지스트리
//! - [`broadcast`]: 토픽 팬아웃 브로드캐스터
//! - [`heartbeat`]: 생존 감지 및 제거
//! - [`handler`]: Axum WebSocket 엔드포인트
//! - [`aggregator`]: 업스트림 피드 이벤트 소비자

pub mod aggregator;
pub mod broadcast;
pub mod handler;
pub mod heartbeat;
pub mod messages;
pub mod registry;
pub mod topic;

pub use aggregator::start_aggregator;
pub use broadcast::{Broadcaster, PriceBroadcaster, SignalBroadcaster};
pub use handler::{websocket_router, WsState};
pub use heartbeat::{run_heartbeat_loop, HeartbeatMonitor};
pub use messages::{ClientMessage, PriceData, ServerMessage, WsError};
pub use registry::{
    create_registry, ConnectionId, ConnectionRegistry, SharedConnectionRegistry,
    SubscribeOutcome, UnsubscribeOutcome,
};
pub use topic::Topic;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::metrics::decrement_websocket_connections;
use crate::services::demand::DemandCommand;

/// 연결 정리 공통 경로.
///
/// 레지스트리 제거, 생존 기록 삭제, 메트릭 감소, 마지막 구독자였던
/// 종목의 수요 해제를 한 번에 처리합니다. 명시적 disconnect, 전달 실패,
/// 하트비트 타임아웃 모두 이 경로를 사용하며, 중복 호출은 no-op입니다.
pub async fn drop_connection(
    registry: &ConnectionRegistry,
    heartbeat: &HeartbeatMonitor,
    demand_tx: &mpsc::Sender<DemandCommand>,
    connection_id: &str,
    reason: &str,
) {
    let Some(emptied) = registry.unregister(connection_id).await else {
        return;
    };

    heartbeat.forget(connection_id).await;
    decrement_websocket_connections();
    info!(connection_id = %connection_id, reason, "WebSocket disconnected");

    for topic in emptied {
        if let Topic::Price(code) = topic {
            if demand_tx
                .send(DemandCommand::InstrumentDown(code))
                .await
                .is_err()
            {
                warn!("수요 채널 닫힘 - 수요 해제 유실");
            }
        }
    }
}
