//! 폴링 폴백 워커.
//!
//! 실시간 수신이 불가능한 종목(파생상품 등)과 업스트림 장애 구간의
//! 종목을 고정 주기로 풀 소스에서 조회하여 브로드캐스트합니다.
//! 브리지 상태와 무관하게 동작하므로 장애 시 저하 모드 경로이자
//! 비지원 종목의 정상 경로입니다.
//!
//! 한 종목의 조회 실패는 로그만 남기고 같은 틱의 나머지 종목 조회를
//! 막지 않습니다. 종목별 조회에는 명시적 타임아웃이 걸려 있어 하나가
//! 멈춰도 틱 전체가 멈추지 않습니다.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use feed_core::PollingConfig;
use feed_data::SharedPriceCache;
use feed_exchange::SnapshotSource;

use crate::metrics::record_poll_fetch;
use crate::websocket::PriceBroadcaster;

/// 폴링 폴백 워커.
pub struct PollingWorker {
    tracked: RwLock<HashSet<String>>,
    source: Arc<dyn SnapshotSource>,
    cache: SharedPriceCache,
    prices: Arc<PriceBroadcaster>,
    config: PollingConfig,
}

impl PollingWorker {
    /// 새로운 폴링 워커 생성.
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        cache: SharedPriceCache,
        prices: Arc<PriceBroadcaster>,
        config: PollingConfig,
    ) -> Self {
        Self {
            tracked: RwLock::new(HashSet::new()),
            source,
            cache,
            prices,
            config,
        }
    }

    /// 종목 추적 시작. 멱등.
    pub async fn track(&self, code: &str) {
        let inserted = self.tracked.write().await.insert(code.to_string());
        if inserted {
            debug!(ticker = %code, "폴링 추적 시작");
        }
    }

    /// 종목 추적 중지. 멱등.
    pub async fn untrack(&self, code: &str) {
        let removed = self.tracked.write().await.remove(code);
        if removed {
            debug!(ticker = %code, "폴링 추적 중지");
        }
    }

    /// 추적 중인지 확인.
    pub async fn is_tracked(&self, code: &str) -> bool {
        self.tracked.read().await.contains(code)
    }

    /// 추적 중인 종목 목록.
    pub async fn tracked(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.tracked.read().await.iter().cloned().collect();
        codes.sort();
        codes
    }

    /// 폴링 루프 실행.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.interval_secs,
            fetch_timeout_secs = self.config.fetch_timeout_secs,
            "Polling worker started"
        );

        let mut ticker = interval(self.config.interval());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        info!("Polling worker stopped");
    }

    /// 한 틱 수행: 추적 중인 모든 종목 조회 후 브로드캐스트.
    pub async fn poll_once(&self) {
        let codes: Vec<String> = self.tracked.read().await.iter().cloned().collect();
        if codes.is_empty() {
            return;
        }

        for code in codes {
            // 캐시가 신선하면 업스트림 호출 생략
            if let Some(snapshot) = self.cache.get(&code).await {
                self.prices.publish(&snapshot).await;
                continue;
            }

            match timeout(self.config.fetch_timeout(), self.source.fetch_snapshot(&code)).await {
                Ok(Ok(snapshot)) => {
                    record_poll_fetch(true);
                    self.cache.insert(snapshot.clone()).await;
                    self.prices.publish(&snapshot).await;
                }
                Ok(Err(e)) => {
                    // 한 종목의 실패가 배치를 막지 않음
                    record_poll_fetch(false);
                    warn!(ticker = %code, error = %e, "폴링 조회 실패 - 다음 틱에 재시도");
                }
                Err(_) => {
                    record_poll_fetch(false);
                    warn!(
                        ticker = %code,
                        timeout_secs = self.config.fetch_timeout_secs,
                        "폴링 조회 타임아웃 - 다음 틱에 재시도"
                    );
                }
            }
        }
    }
}
