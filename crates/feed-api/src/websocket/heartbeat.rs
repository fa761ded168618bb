//! 연결 하트비트 모니터.
//!
//! 연결별 마지막 pong 시각을 추적하고, 주기적으로 ping을 보내며,
//! 타임아웃을 넘긴 연결을 제거합니다. 브로드캐스트 경로와 독립적인
//! 태스크로 돌기 때문에 느린 브로드캐스터가 생존 감지를 막지 못합니다.
//!
//! 하트비트 타임아웃은 정리 없이 사라진 클라이언트의 자원을 회수하는
//! 유일한 수단입니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use feed_core::HeartbeatConfig;

use super::messages::ServerMessage;
use super::registry::{ConnectionId, SharedConnectionRegistry};
use crate::services::demand::DemandCommand;

/// 하트비트 모니터.
pub struct HeartbeatMonitor {
    /// 연결별 마지막 pong 시각
    liveness: RwLock<HashMap<ConnectionId, DateTime<Utc>>>,
    /// 모니터 루프 실행 중 여부
    running: AtomicBool,
}

impl HeartbeatMonitor {
    /// 새로운 모니터 생성.
    pub fn new() -> Self {
        Self {
            liveness: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// 연결 등록 시 생존 기록 생성.
    pub async fn on_connect(&self, connection_id: &str) {
        let mut liveness = self.liveness.write().await;
        liveness.insert(connection_id.to_string(), Utc::now());
    }

    /// pong 수신 기록.
    pub async fn record_pong(&self, connection_id: &str) {
        let mut liveness = self.liveness.write().await;
        if let Some(last) = liveness.get_mut(connection_id) {
            *last = Utc::now();
        }
    }

    /// 연결 해제 시 생존 기록 삭제. 멱등.
    pub async fn forget(&self, connection_id: &str) {
        let mut liveness = self.liveness.write().await;
        liveness.remove(connection_id);
    }

    /// 타임아웃을 넘긴 연결 목록 반환.
    ///
    /// 제거는 호출자의 몫입니다.
    pub async fn sweep_inactive(&self, timeout: Duration) -> Vec<ConnectionId> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::seconds(90));

        let liveness = self.liveness.read().await;
        liveness
            .iter()
            .filter(|(_, last)| **last < cutoff)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// 추적 중인 연결 수.
    pub async fn tracked_count(&self) -> usize {
        self.liveness.read().await.len()
    }

    /// 모니터 루프 실행 중 여부.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn set_running(&self, value: bool) {
        self.running.store(value, Ordering::Relaxed);
    }
}

impl Default for HeartbeatMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// 하트비트 루프 실행.
///
/// 주기마다 모든 연결에 ping을 보내고, 타임아웃을 넘긴 연결을
/// 제거합니다. 취소될 때까지 실행됩니다.
pub async fn run_heartbeat_loop(
    monitor: Arc<HeartbeatMonitor>,
    registry: SharedConnectionRegistry,
    demand_tx: mpsc::Sender<DemandCommand>,
    config: HeartbeatConfig,
    cancel: CancellationToken,
) {
    monitor.set_running(true);
    info!(
        ping_interval_secs = config.ping_interval_secs,
        timeout_secs = config.timeout_secs,
        "Heartbeat monitor started"
    );

    let mut ticker = interval(config.ping_interval());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                ping_all(&monitor, &registry, &demand_tx).await;

                let stale = monitor.sweep_inactive(config.timeout()).await;
                for connection_id in stale {
                    warn!(connection_id = %connection_id, "하트비트 타임아웃 - 연결 제거");
                    super::drop_connection(
                        &registry,
                        &monitor,
                        &demand_tx,
                        &connection_id,
                        "heartbeat timeout",
                    )
                    .await;
                }
            }
        }
    }

    monitor.set_running(false);
    info!("Heartbeat monitor stopped");
}

/// 모든 연결에 생존 프로브 전송.
///
/// 전송 자체가 실패한 연결은 즉시 제거합니다.
async fn ping_all(
    monitor: &HeartbeatMonitor,
    registry: &SharedConnectionRegistry,
    demand_tx: &mpsc::Sender<DemandCommand>,
) {
    let senders = registry.all_senders().await;
    let mut failed = Vec::new();

    for (connection_id, sender) in senders {
        if sender.try_send(ServerMessage::Ping).is_err() {
            failed.push(connection_id);
        }
    }

    for connection_id in failed {
        debug!(connection_id = %connection_id, "Ping 전송 실패 - 연결 제거");
        super::drop_connection(registry, monitor, demand_tx, &connection_id, "ping failure").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_pong_updates_liveness() {
        let monitor = HeartbeatMonitor::new();

        monitor.on_connect("c1").await;
        assert_eq!(monitor.tracked_count().await, 1);

        // 즉시 스윕하면 아무도 걸리지 않음
        assert!(monitor.sweep_inactive(Duration::from_secs(60)).await.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_finds_stale_connection() {
        let monitor = HeartbeatMonitor::new();

        monitor.on_connect("c1").await;
        monitor.on_connect("c2").await;

        // c1의 기록을 과거로 조작
        {
            let mut liveness = monitor.liveness.write().await;
            liveness.insert("c1".to_string(), Utc::now() - chrono::Duration::seconds(120));
        }

        let stale = monitor.sweep_inactive(Duration::from_secs(60)).await;
        assert_eq!(stale, vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn test_pong_rescues_connection() {
        let monitor = HeartbeatMonitor::new();

        monitor.on_connect("c1").await;
        {
            let mut liveness = monitor.liveness.write().await;
            liveness.insert("c1".to_string(), Utc::now() - chrono::Duration::seconds(120));
        }

        monitor.record_pong("c1").await;
        assert!(monitor.sweep_inactive(Duration::from_secs(60)).await.is_empty());
    }

    #[tokio::test]
    async fn test_forget_idempotent() {
        let monitor = HeartbeatMonitor::new();

        monitor.on_connect("c1").await;
        monitor.forget("c1").await;
        monitor.forget("c1").await;

        assert_eq!(monitor.tracked_count().await, 0);
    }

    #[tokio::test]
    async fn test_record_pong_for_unknown_connection_is_noop() {
        let monitor = HeartbeatMonitor::new();

        monitor.record_pong("ghost").await;
        assert_eq!(monitor.tracked_count().await, 0);
    }
}
