//! 업스트림 피드 이벤트 소비자.
//!
//! 브리지가 생산한 [`FeedEvent`]를 수신하여 캐시를 갱신하고
//! 브로드캐스터로 전달합니다. 브리지 연결 상태 변화는 수요
//! 코디네이터의 폴백 전환과 `market:status` 토픽 브로드캐스트로
//! 이어집니다.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use feed_data::SharedPriceCache;
use feed_exchange::FeedEvent;

use super::broadcast::{Broadcaster, PriceBroadcaster};
use super::messages::ServerMessage;
use super::topic::Topic;
use crate::services::demand::DemandCommand;

/// 피드 이벤트 어그리게이터.
pub struct FeedAggregator {
    cache: SharedPriceCache,
    prices: Arc<PriceBroadcaster>,
    status: Broadcaster,
    demand_tx: mpsc::Sender<DemandCommand>,
}

impl FeedAggregator {
    /// 새로운 어그리게이터 생성.
    pub fn new(
        cache: SharedPriceCache,
        prices: Arc<PriceBroadcaster>,
        status: Broadcaster,
        demand_tx: mpsc::Sender<DemandCommand>,
    ) -> Self {
        Self {
            cache,
            prices,
            status,
            demand_tx,
        }
    }

    /// 어그리게이터 실행.
    ///
    /// 이벤트 채널이 닫히거나 취소될 때까지 블로킹됩니다.
    pub async fn run(self, mut rx: mpsc::Receiver<FeedEvent>, cancel: CancellationToken) {
        info!("Feed aggregator started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("피드 이벤트 채널 종료");
                            break;
                        }
                    }
                }
            }
        }

        info!("Feed aggregator stopped");
    }

    async fn handle_event(&self, event: FeedEvent) {
        match event {
            FeedEvent::Price(snapshot) => {
                // 푸시 경로도 캐시를 갱신해 웜 스타트와 폴백 전환을 돕는다
                self.cache.insert(snapshot.clone()).await;
                self.prices.publish(&snapshot).await;
            }
            FeedEvent::Connected => {
                info!("업스트림 피드 연결됨 - 푸시 경로 복귀");
                if self.demand_tx.send(DemandCommand::BridgeUp).await.is_err() {
                    warn!("수요 채널 닫힘");
                }
                self.broadcast_status("streaming").await;
            }
            FeedEvent::Disconnected => {
                warn!("업스트림 피드 연결 끊김 - 폴링 폴백 전환");
                if self.demand_tx.send(DemandCommand::BridgeDown).await.is_err() {
                    warn!("수요 채널 닫힘");
                }
                self.broadcast_status("disconnected").await;
            }
            FeedEvent::Error(msg) => {
                error!("업스트림 피드 에러: {}", msg);
            }
        }
    }

    async fn broadcast_status(&self, state: &str) {
        self.status
            .publish(
                &Topic::MarketStatus,
                ServerMessage::MarketStatus {
                    state: state.to_string(),
                    timestamp: Utc::now().timestamp_millis(),
                },
            )
            .await;
    }
}

/// 백그라운드에서 어그리게이터 실행.
pub fn start_aggregator(
    aggregator: FeedAggregator,
    rx: mpsc::Receiver<FeedEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        aggregator.run(rx, cancel).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::heartbeat::HeartbeatMonitor;
    use crate::websocket::registry::create_registry;
    use feed_core::PriceSnapshot;
    use feed_data::PriceCache;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn aggregator_fixture() -> (
        FeedAggregator,
        SharedPriceCache,
        crate::websocket::registry::SharedConnectionRegistry,
        mpsc::Receiver<DemandCommand>,
    ) {
        let registry = create_registry();
        let heartbeat = Arc::new(HeartbeatMonitor::new());
        let cache: SharedPriceCache = Arc::new(PriceCache::new(Duration::from_secs(60)));
        let (demand_tx, demand_rx) = mpsc::channel(64);

        let prices = Arc::new(PriceBroadcaster::new(
            registry.clone(),
            heartbeat.clone(),
            demand_tx.clone(),
        ));
        let status = Broadcaster::new(registry.clone(), heartbeat, demand_tx.clone());

        let aggregator = FeedAggregator::new(cache.clone(), prices, status, demand_tx);
        (aggregator, cache, registry, demand_rx)
    }

    #[tokio::test]
    async fn test_price_event_updates_cache_and_broadcasts() {
        let (aggregator, cache, registry, _demand_rx) = aggregator_fixture();

        let (tx, mut rx) = mpsc::channel(16);
        let id = registry.register(tx).await;
        registry.subscribe(&id, Topic::Price("005930".to_string())).await;

        let snapshot = PriceSnapshot::new("005930", dec!(70000), dec!(500), dec!(0.72), 1000);
        aggregator.handle_event(FeedEvent::Price(snapshot)).await;

        assert!(cache.get("005930").await.is_some());
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::PriceUpdate { ticker, .. } if ticker == "005930"
        ));
    }

    #[tokio::test]
    async fn test_disconnect_event_triggers_bridge_down() {
        let (aggregator, _cache, registry, mut demand_rx) = aggregator_fixture();

        let (tx, mut rx) = mpsc::channel(16);
        let id = registry.register(tx).await;
        registry.subscribe(&id, Topic::MarketStatus).await;

        aggregator.handle_event(FeedEvent::Disconnected).await;

        assert!(matches!(demand_rx.try_recv().unwrap(), DemandCommand::BridgeDown));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::MarketStatus { state, .. } if state == "disconnected"
        ));
    }

    #[tokio::test]
    async fn test_connect_event_triggers_bridge_up() {
        let (aggregator, _cache, _registry, mut demand_rx) = aggregator_fixture();

        aggregator.handle_event(FeedEvent::Connected).await;

        assert!(matches!(demand_rx.try_recv().unwrap(), DemandCommand::BridgeUp));
    }
}
