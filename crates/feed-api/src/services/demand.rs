//! 종목 수요 코디네이터.
//!
//! 종목별 수요(첫 구독자 등장 / 마지막 구독자 이탈)와 브리지 연결
//! 상태 변화를 받아, 각 종목을 푸시 경로 또는 폴링 경로에 배정합니다.
//!
//! 명령 채널을 소비하는 단일 태스크로 동작하므로 경로 테이블에 대한
//! 쓰기는 항상 직렬화됩니다.
//!
//! # 경로 결정
//!
//! - 실시간 수신 가능 + 브리지 존재 → 푸시. 브리지가 끊겨 있으면
//!   의도만 기록되고, 복구될 때까지 폴링이 병행됩니다.
//! - 그 외 (파생상품, 브리지 없음) → 폴링.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use feed_exchange::PushFeed;

use super::poller::PollingWorker;

/// 수요 코디네이터 명령.
#[derive(Debug)]
pub enum DemandCommand {
    /// 종목의 첫 구독자 등장
    InstrumentUp(String),
    /// 종목의 마지막 구독자 이탈
    InstrumentDown(String),
    /// 브리지 스트리밍 시작 (구독 재전송 완료)
    BridgeUp,
    /// 브리지 연결 끊김
    BridgeDown,
}

/// 종목별 전달 경로.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryRoute {
    /// 업스트림 푸시. 브리지 장애 동안에는 폴링이 병행됨.
    Push { fallback_polling: bool },
    /// 폴링 전용
    Poll,
}

/// 수요 코디네이터.
pub struct DemandCoordinator {
    bridge: Option<Arc<dyn PushFeed>>,
    poller: Arc<PollingWorker>,
    routes: RwLock<HashMap<String, DeliveryRoute>>,
}

impl DemandCoordinator {
    /// 새로운 코디네이터 생성.
    ///
    /// `bridge`가 `None`이면 (모의 모드 등) 모든 종목이 폴링 경로를
    /// 사용합니다.
    pub fn new(bridge: Option<Arc<dyn PushFeed>>, poller: Arc<PollingWorker>) -> Self {
        Self {
            bridge,
            poller,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// 명령 루프 실행.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<DemandCommand>, cancel: CancellationToken) {
        info!(bridge = self.bridge.is_some(), "Demand coordinator started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd).await,
                        None => break,
                    }
                }
            }
        }

        info!("Demand coordinator stopped");
    }

    /// 단일 명령 처리.
    pub async fn handle(&self, cmd: DemandCommand) {
        match cmd {
            DemandCommand::InstrumentUp(code) => self.instrument_up(code).await,
            DemandCommand::InstrumentDown(code) => self.instrument_down(code).await,
            DemandCommand::BridgeUp => self.bridge_up().await,
            DemandCommand::BridgeDown => self.bridge_down().await,
        }
    }

    async fn instrument_up(&self, code: String) {
        if let Some(bridge) = &self.bridge {
            match bridge.ensure_subscribed(&code).await {
                Ok(true) => {
                    // 브리지가 끊겨 있으면 복구될 때까지 폴링 병행
                    let degraded = !bridge.state().await.is_streaming();
                    if degraded {
                        self.poller.track(&code).await;
                    }

                    debug!(ticker = %code, degraded, "수요 등록 - 푸시 경로");
                    self.routes.write().await.insert(
                        code,
                        DeliveryRoute::Push {
                            fallback_polling: degraded,
                        },
                    );
                    return;
                }
                Ok(false) => {
                    debug!(ticker = %code, "실시간 미지원 - 폴링 경로");
                }
                Err(e) => {
                    // 핸들러 검증을 통과한 코드라 정상적으로는 오지 않음
                    warn!(ticker = %code, error = %e, "푸시 구독 실패 - 폴링 경로 사용");
                }
            }
        }

        self.poller.track(&code).await;
        self.routes.write().await.insert(code, DeliveryRoute::Poll);
    }

    async fn instrument_down(&self, code: String) {
        let route = self.routes.write().await.remove(&code);

        match route {
            Some(DeliveryRoute::Push { fallback_polling }) => {
                if let Some(bridge) = &self.bridge {
                    bridge.ensure_unsubscribed(&code).await;
                }
                if fallback_polling {
                    self.poller.untrack(&code).await;
                }
                debug!(ticker = %code, "수요 해제 - 푸시 추적 중지");
            }
            Some(DeliveryRoute::Poll) => {
                self.poller.untrack(&code).await;
                debug!(ticker = %code, "수요 해제 - 폴링 추적 중지");
            }
            None => {
                debug!(ticker = %code, "수요 해제 - 추적 중이지 않음");
            }
        }
    }

    /// 브리지 장애: 푸시 경로 종목 전체에 폴링 병행 시작.
    async fn bridge_down(&self) {
        let mut routes = self.routes.write().await;
        let mut switched = 0;

        for (code, route) in routes.iter_mut() {
            if let DeliveryRoute::Push { fallback_polling } = route {
                if !*fallback_polling {
                    self.poller.track(code).await;
                    *route = DeliveryRoute::Push {
                        fallback_polling: true,
                    };
                    switched += 1;
                }
            }
        }

        if switched > 0 {
            warn!(instruments = switched, "브리지 장애 - 폴링 폴백 시작");
        }
    }

    /// 브리지 복구: 푸시 경로 종목의 폴백 폴링 중지.
    ///
    /// 업스트림 구독 자체는 브리지의 재전송이 복원합니다.
    async fn bridge_up(&self) {
        let mut routes = self.routes.write().await;
        let mut switched = 0;

        for (code, route) in routes.iter_mut() {
            if let DeliveryRoute::Push { fallback_polling } = route {
                if *fallback_polling {
                    self.poller.untrack(code).await;
                    *route = DeliveryRoute::Push {
                        fallback_polling: false,
                    };
                    switched += 1;
                }
            }
        }

        if switched > 0 {
            info!(instruments = switched, "브리지 복구 - 폴링 폴백 중지");
        }
    }

    /// 현재 경로 테이블 크기 (통계용).
    pub async fn tracked_instruments(&self) -> usize {
        self.routes.read().await.len()
    }
}

/// 수요 명령 채널 생성.
pub fn demand_channel(capacity: usize) -> (mpsc::Sender<DemandCommand>, mpsc::Receiver<DemandCommand>) {
    mpsc::channel(capacity)
}
