//! 토픽 기반 팬아웃 브로드캐스터.
//!
//! 토픽의 구독자 집합을 조회하여 각 연결의 송신 버퍼에 메시지를
//! 넣습니다. 개별 연결의 전송 실패(버퍼 가득 참, 연결 종료)는 해당
//! 연결의 암묵적 disconnect로 처리되며, 나머지 구독자에게의 전달을
//! 중단시키지 않습니다.
//!
//! `publish`는 생산자(브리지/폴링 워커) 관점에서 fire-and-forget입니다.
//! 수신 속도가 느린 클라이언트는 버퍼가 가득 차는 순간 끊어집니다.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use feed_core::{PriceSnapshot, SignalSnapshot};

use super::heartbeat::HeartbeatMonitor;
use super::messages::ServerMessage;
use super::registry::SharedConnectionRegistry;
use super::topic::Topic;
use crate::metrics::{record_delivery_failure, record_publish};
use crate::services::demand::DemandCommand;

/// 팬아웃 브로드캐스터.
///
/// Price/Signal 브로드캐스터가 공유하는 전달 경로입니다.
pub struct Broadcaster {
    registry: SharedConnectionRegistry,
    heartbeat: Arc<HeartbeatMonitor>,
    demand_tx: mpsc::Sender<DemandCommand>,
}

impl Broadcaster {
    /// 새로운 브로드캐스터 생성.
    pub fn new(
        registry: SharedConnectionRegistry,
        heartbeat: Arc<HeartbeatMonitor>,
        demand_tx: mpsc::Sender<DemandCommand>,
    ) -> Self {
        Self {
            registry,
            heartbeat,
            demand_tx,
        }
    }

    /// 토픽 구독자 전원에게 메시지 전달.
    ///
    /// # Returns
    ///
    /// 전달에 성공한 구독자 수.
    pub async fn publish(&self, topic: &Topic, message: ServerMessage) -> usize {
        let subscribers = self.registry.subscribers_of(topic).await;
        if subscribers.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut failed = Vec::new();

        for (connection_id, sender) in subscribers {
            match sender.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %connection_id,
                        topic = %topic,
                        "송신 버퍼 가득 참 - 느린 클라이언트 제거"
                    );
                    failed.push(connection_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection_id = %connection_id, topic = %topic, "송신 채널 닫힘");
                    failed.push(connection_id);
                }
            }
        }

        // 전달 실패는 해당 연결만의 암묵적 disconnect
        for connection_id in failed {
            record_delivery_failure();
            super::drop_connection(
                &self.registry,
                &self.heartbeat,
                &self.demand_tx,
                &connection_id,
                "delivery failure",
            )
            .await;
        }

        delivered
    }
}

/// 시세 브로드캐스터.
pub struct PriceBroadcaster {
    inner: Broadcaster,
}

impl PriceBroadcaster {
    /// 새로운 시세 브로드캐스터 생성.
    pub fn new(
        registry: SharedConnectionRegistry,
        heartbeat: Arc<HeartbeatMonitor>,
        demand_tx: mpsc::Sender<DemandCommand>,
    ) -> Self {
        Self {
            inner: Broadcaster::new(registry, heartbeat, demand_tx),
        }
    }

    /// 시세 스냅샷을 해당 종목 토픽으로 전달.
    pub async fn publish(&self, snapshot: &PriceSnapshot) -> usize {
        let topic = Topic::Price(snapshot.ticker.clone());
        let delivered = self
            .inner
            .publish(&topic, ServerMessage::price_update(snapshot))
            .await;

        if delivered > 0 {
            record_publish("price", delivered);
            debug!(ticker = %snapshot.ticker, delivered, "Price broadcast");
        }
        delivered
    }
}

/// 시그널 브로드캐스터.
pub struct SignalBroadcaster {
    inner: Broadcaster,
}

impl SignalBroadcaster {
    /// 새로운 시그널 브로드캐스터 생성.
    pub fn new(
        registry: SharedConnectionRegistry,
        heartbeat: Arc<HeartbeatMonitor>,
        demand_tx: mpsc::Sender<DemandCommand>,
    ) -> Self {
        Self {
            inner: Broadcaster::new(registry, heartbeat, demand_tx),
        }
    }

    /// 시그널 배치를 카테고리 토픽으로 전달.
    pub async fn publish(&self, category: &str, batch: SignalSnapshot) -> usize {
        let topic = Topic::Signal(category.to_string());
        let delivered = self
            .inner
            .publish(&topic, ServerMessage::SignalUpdate { data: batch })
            .await;

        if delivered > 0 {
            record_publish("signal", delivered);
            debug!(category = %category, delivered, "Signal broadcast");
        }
        delivered
    }
}
