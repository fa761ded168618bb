//! 단기 TTL 시세 캐시.
//!
//! 종목코드 → 마지막 시세 스냅샷을 TTL과 함께 보관합니다.
//! 푸시 경로와 폴링 경로가 같은 종목을 동시에 갱신할 수 있으며,
//! 두 경로 모두 "마지막으로 알려진 값" 의미론이므로 나중에 쓴 값이
//! 이기는 것으로 충분합니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use feed_core::PriceSnapshot;

/// 캐시 엔트리.
#[derive(Debug, Clone)]
struct CacheEntry {
    snapshot: PriceSnapshot,
    inserted_at: Instant,
}

/// 단기 TTL 시세 캐시.
///
/// TTL이 지난 엔트리는 조회 시 무시되고 주기적인 정리로 제거됩니다.
pub struct PriceCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl PriceCache {
    /// 주어진 TTL로 캐시 생성.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// 신선한 스냅샷 조회.
    ///
    /// TTL이 지난 엔트리는 없는 것으로 취급합니다.
    pub async fn get(&self, code: &str) -> Option<PriceSnapshot> {
        let entries = self.entries.read().await;
        entries.get(code).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(entry.snapshot.clone())
            } else {
                None
            }
        })
    }

    /// 스냅샷 저장 (last-write-wins).
    pub async fn insert(&self, snapshot: PriceSnapshot) {
        let mut entries = self.entries.write().await;
        entries.insert(
            snapshot.ticker.clone(),
            CacheEntry {
                snapshot,
                inserted_at: Instant::now(),
            },
        );
    }

    /// 만료된 엔트리 제거.
    ///
    /// 제거된 엔트리 수를 반환합니다.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        let removed = before - entries.len();

        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Price cache purged");
        }
        removed
    }

    /// 현재 엔트리 수 (만료 포함).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// 캐시가 비어 있는지 확인.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 설정된 TTL 반환.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// 공유 가능한 시세 캐시 타입.
pub type SharedPriceCache = Arc<PriceCache>;
