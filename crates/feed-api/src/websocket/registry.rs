//! 연결 레지스트리.
//!
//! 살아있는 클라이언트 연결과 토픽-구독자 매핑을 소유합니다.
//!
//! # 동시성
//!
//! 연결 맵과 토픽 맵은 하나의 `RwLock` 아래에 묶여 있어, 브로드캐스트의
//! 구독자 조회가 항상 완결된 상태를 관찰합니다 (절반만 갱신된 구독자
//! 집합을 보는 일이 없습니다).
//!
//! # 소유권
//!
//! 연결의 송신 핸들은 레지스트리만 강하게 소유합니다. 다른 컴포넌트는
//! 연결 식별자만 주고받습니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::messages::ServerMessage;
use super::topic::Topic;

/// 연결 식별자.
pub type ConnectionId = String;

/// 구독 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOutcome {
    /// 간선이 새로 추가되었는지 (중복 구독이면 false)
    pub added: bool,
    /// 이 토픽의 첫 구독자인지 — 수요 추적 시작 신호
    pub first_subscriber: bool,
}

/// 구독 해제 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsubscribeOutcome {
    /// 간선이 실제로 제거되었는지
    pub removed: bool,
    /// 이 토픽의 마지막 구독자였는지 — 수요 추적 중지 신호
    pub last_subscriber: bool,
}

/// 연결 핸들.
struct ConnectionHandle {
    sender: mpsc::Sender<ServerMessage>,
    topics: HashSet<Topic>,
    connected_at: DateTime<Utc>,
}

/// 레지스트리 내부 상태.
///
/// 두 맵은 항상 같은 락 아래에서 함께 갱신됩니다.
struct RegistryInner {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    topics: HashMap<Topic, HashSet<ConnectionId>>,
}

/// 연결 레지스트리.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    /// 새로운 레지스트리 생성.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                connections: HashMap::new(),
                topics: HashMap::new(),
            }),
        }
    }

    /// 연결 등록. 실패하지 않습니다.
    ///
    /// # Returns
    ///
    /// 새로 발급된 연결 식별자.
    pub async fn register(&self, sender: mpsc::Sender<ServerMessage>) -> ConnectionId {
        let connection_id = uuid::Uuid::new_v4().to_string();

        let mut inner = self.inner.write().await;
        inner.connections.insert(
            connection_id.clone(),
            ConnectionHandle {
                sender,
                topics: HashSet::new(),
                connected_at: Utc::now(),
            },
        );

        debug!(connection_id = %connection_id, "Connection registered");
        connection_id
    }

    /// 연결 제거. 멱등.
    ///
    /// 모든 토픽 구독자 집합에서 연결을 제거합니다.
    ///
    /// # Returns
    ///
    /// 연결이 존재했다면 이 제거로 구독자가 0이 된 토픽 목록,
    /// 이미 제거된 연결이면 `None`.
    pub async fn unregister(&self, connection_id: &str) -> Option<Vec<Topic>> {
        let mut inner = self.inner.write().await;

        let handle = inner.connections.remove(connection_id)?;

        let mut emptied = Vec::new();
        for topic in handle.topics {
            if let Some(subscribers) = inner.topics.get_mut(&topic) {
                subscribers.remove(connection_id);
                if subscribers.is_empty() {
                    // 빈 구독자 집합의 토픽은 즉시 수거
                    inner.topics.remove(&topic);
                    emptied.push(topic);
                }
            }
        }

        debug!(connection_id, emptied = emptied.len(), "Connection unregistered");
        Some(emptied)
    }

    /// 구독 간선 추가.
    ///
    /// 알 수 없는 연결이면 조용히 무시합니다 (연결 해제와의 경합).
    pub async fn subscribe(&self, connection_id: &str, topic: Topic) -> SubscribeOutcome {
        let mut inner = self.inner.write().await;

        let Some(handle) = inner.connections.get_mut(connection_id) else {
            warn!(connection_id, topic = %topic, "Subscribe for unknown connection ignored");
            return SubscribeOutcome {
                added: false,
                first_subscriber: false,
            };
        };

        let added = handle.topics.insert(topic.clone());
        if !added {
            // 중복 구독은 상태 변화 없음
            return SubscribeOutcome {
                added: false,
                first_subscriber: false,
            };
        }

        let subscribers = inner.topics.entry(topic).or_default();
        let first_subscriber = subscribers.is_empty();
        subscribers.insert(connection_id.to_string());

        SubscribeOutcome {
            added,
            first_subscriber,
        }
    }

    /// 구독 간선 제거.
    pub async fn unsubscribe(&self, connection_id: &str, topic: &Topic) -> UnsubscribeOutcome {
        let mut inner = self.inner.write().await;

        let Some(handle) = inner.connections.get_mut(connection_id) else {
            return UnsubscribeOutcome {
                removed: false,
                last_subscriber: false,
            };
        };

        let removed = handle.topics.remove(topic);
        if !removed {
            return UnsubscribeOutcome {
                removed: false,
                last_subscriber: false,
            };
        }

        let mut last_subscriber = false;
        if let Some(subscribers) = inner.topics.get_mut(topic) {
            subscribers.remove(connection_id);
            if subscribers.is_empty() {
                inner.topics.remove(topic);
                last_subscriber = true;
            }
        }

        UnsubscribeOutcome {
            removed,
            last_subscriber,
        }
    }

    /// 토픽 구독자 수.
    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        let inner = self.inner.read().await;
        inner.topics.get(topic).map(|s| s.len()).unwrap_or(0)
    }

    /// 브로드캐스트용 구독자 스냅샷.
    ///
    /// (연결 식별자, 송신 핸들) 쌍의 일관된 스냅샷을 반환합니다.
    pub async fn subscribers_of(
        &self,
        topic: &Topic,
    ) -> Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> {
        let inner = self.inner.read().await;

        let Some(subscribers) = inner.topics.get(topic) else {
            return Vec::new();
        };

        subscribers
            .iter()
            .filter_map(|id| {
                inner
                    .connections
                    .get(id)
                    .map(|handle| (id.clone(), handle.sender.clone()))
            })
            .collect()
    }

    /// 특정 연결에 메시지 전송.
    ///
    /// # Returns
    ///
    /// 전송 큐에 넣었으면 `true`. 알 수 없는 연결이거나 버퍼가 가득 차면 `false`.
    pub async fn send_to(&self, connection_id: &str, message: ServerMessage) -> bool {
        let sender = {
            let inner = self.inner.read().await;
            inner
                .connections
                .get(connection_id)
                .map(|handle| handle.sender.clone())
        };

        match sender {
            Some(sender) => sender.try_send(message).is_ok(),
            None => false,
        }
    }

    /// 모든 연결의 송신 핸들 스냅샷 (하트비트 ping용).
    pub async fn all_senders(&self) -> Vec<(ConnectionId, mpsc::Sender<ServerMessage>)> {
        let inner = self.inner.read().await;
        inner
            .connections
            .iter()
            .map(|(id, handle)| (id.clone(), handle.sender.clone()))
            .collect()
    }

    /// 활성 연결 수.
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }

    /// 토픽별 구독자 수 스냅샷 (통계용).
    pub async fn topic_counts(&self) -> HashMap<String, usize> {
        let inner = self.inner.read().await;
        inner
            .topics
            .iter()
            .map(|(topic, subscribers)| (topic.name(), subscribers.len()))
            .collect()
    }

    /// 연결 유지 시간 조회.
    pub async fn connected_at(&self, connection_id: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.read().await;
        inner.connections.get(connection_id).map(|h| h.connected_at)
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 공유 가능한 레지스트리 타입.
pub type SharedConnectionRegistry = Arc<ConnectionRegistry>;

/// 새로운 공유 레지스트리 생성.
pub fn create_registry() -> SharedConnectionRegistry {
    Arc::new(ConnectionRegistry::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price_topic(code: &str) -> Topic {
        Topic::Price(code.to_string())
    }

    async fn register(registry: &ConnectionRegistry) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        (registry.register(tx).await, rx)
    }

    #[tokio::test]
    async fn test_register_and_count() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.connection_count().await, 0);

        let (_id, _rx) = register(&registry).await;
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_subscribe_first_and_duplicate() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = register(&registry).await;

        let outcome = registry.subscribe(&id, price_topic("005930")).await;
        assert!(outcome.added);
        assert!(outcome.first_subscriber);

        // 멱등: 중복 구독은 상태를 바꾸지 않음
        let outcome = registry.subscribe(&id, price_topic("005930")).await;
        assert!(!outcome.added);
        assert!(!outcome.first_subscriber);

        assert_eq!(registry.subscriber_count(&price_topic("005930")).await, 1);
    }

    #[tokio::test]
    async fn test_second_subscriber_not_first() {
        let registry = ConnectionRegistry::new();
        let (id1, _rx1) = register(&registry).await;
        let (id2, _rx2) = register(&registry).await;

        assert!(registry.subscribe(&id1, price_topic("005930")).await.first_subscriber);
        assert!(!registry.subscribe(&id2, price_topic("005930")).await.first_subscriber);

        assert_eq!(registry.subscriber_count(&price_topic("005930")).await, 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_last_subscriber() {
        let registry = ConnectionRegistry::new();
        let (id1, _rx1) = register(&registry).await;
        let (id2, _rx2) = register(&registry).await;

        registry.subscribe(&id1, price_topic("005930")).await;
        registry.subscribe(&id2, price_topic("005930")).await;

        let outcome = registry.unsubscribe(&id1, &price_topic("005930")).await;
        assert!(outcome.removed);
        assert!(!outcome.last_subscriber);

        let outcome = registry.unsubscribe(&id2, &price_topic("005930")).await;
        assert!(outcome.removed);
        assert!(outcome.last_subscriber);

        // 멱등: 두 번째 해제는 no-op
        let outcome = registry.unsubscribe(&id2, &price_topic("005930")).await;
        assert!(!outcome.removed);
        assert!(!outcome.last_subscriber);

        assert_eq!(registry.subscriber_count(&price_topic("005930")).await, 0);
    }

    #[tokio::test]
    async fn test_unregister_cleans_all_topics() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = register(&registry).await;

        registry.subscribe(&id, price_topic("005930")).await;
        registry.subscribe(&id, price_topic("000660")).await;
        registry.subscribe(&id, Topic::Signal("momentum".to_string())).await;

        let emptied = registry.unregister(&id).await.unwrap();
        assert_eq!(emptied.len(), 3);

        // 구독 흔적이 남지 않음
        assert_eq!(registry.subscriber_count(&price_topic("005930")).await, 0);
        assert_eq!(registry.subscriber_count(&price_topic("000660")).await, 0);
        assert!(registry.topic_counts().await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_idempotent() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = register(&registry).await;

        assert!(registry.unregister(&id).await.is_some());
        assert!(registry.unregister(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_unregister_keeps_other_subscribers() {
        let registry = ConnectionRegistry::new();
        let (id1, _rx1) = register(&registry).await;
        let (id2, _rx2) = register(&registry).await;

        registry.subscribe(&id1, price_topic("005930")).await;
        registry.subscribe(&id2, price_topic("005930")).await;

        let emptied = registry.unregister(&id1).await.unwrap();
        assert!(emptied.is_empty());
        assert_eq!(registry.subscriber_count(&price_topic("005930")).await, 1);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_connection_is_noop() {
        let registry = ConnectionRegistry::new();

        let outcome = registry.subscribe("no-such-id", price_topic("005930")).await;
        assert!(!outcome.added);
        assert_eq!(registry.subscriber_count(&price_topic("005930")).await, 0);
    }

    #[tokio::test]
    async fn test_subscribers_of_snapshot() {
        let registry = ConnectionRegistry::new();
        let (id1, _rx1) = register(&registry).await;
        let (_id2, _rx2) = register(&registry).await;

        registry.subscribe(&id1, price_topic("005930")).await;

        let subscribers = registry.subscribers_of(&price_topic("005930")).await;
        assert_eq!(subscribers.len(), 1);
        assert_eq!(subscribers[0].0, id1);

        assert!(registry.subscribers_of(&price_topic("000660")).await.is_empty());
    }

    #[tokio::test]
    async fn test_send_to() {
        let registry = ConnectionRegistry::new();
        let (id, mut rx) = register(&registry).await;

        assert!(registry.send_to(&id, ServerMessage::Pong).await);
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Pong));

        assert!(!registry.send_to("no-such-id", ServerMessage::Pong).await);
    }
}
