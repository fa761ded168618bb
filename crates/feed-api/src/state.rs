//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! 전역 싱글톤 대신 구성 요소를 시작 시 한 번 생성하여 명시적으로
//! 주입합니다. Arc로 래핑되어 여러 요청 간에 안전하게 공유됩니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use feed_data::SharedPriceCache;
use feed_exchange::PushFeed;

use crate::services::demand::DemandCommand;
use crate::services::poller::PollingWorker;
use crate::websocket::{HeartbeatMonitor, SharedConnectionRegistry, SignalBroadcaster};

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 REST 핸들러에 주입됩니다.
pub struct AppState {
    /// 연결 레지스트리
    pub registry: SharedConnectionRegistry,

    /// 시세 캐시
    pub cache: SharedPriceCache,

    /// 하트비트 모니터
    pub heartbeat: Arc<HeartbeatMonitor>,

    /// 폴링 폴백 워커
    pub poller: Arc<PollingWorker>,

    /// 업스트림 푸시 브리지 (모의 모드에서는 None)
    pub bridge: Option<Arc<dyn PushFeed>>,

    /// 시그널 브로드캐스터 (외부 시그널 생산자의 주입 지점)
    pub signals: Arc<SignalBroadcaster>,

    /// 수요 코디네이터 명령 채널
    pub demand_tx: mpsc::Sender<DemandCommand>,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: DateTime<Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 새로운 AppState 생성.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: SharedConnectionRegistry,
        cache: SharedPriceCache,
        heartbeat: Arc<HeartbeatMonitor>,
        poller: Arc<PollingWorker>,
        bridge: Option<Arc<dyn PushFeed>>,
        signals: Arc<SignalBroadcaster>,
        demand_tx: mpsc::Sender<DemandCommand>,
    ) -> Self {
        Self {
            registry,
            cache,
            heartbeat,
            poller,
            bridge,
            signals,
            demand_tx,
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 서버 업타임 (초).
    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
