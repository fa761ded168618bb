//! 피드 경계 trait 정의.

use async_trait::async_trait;
use feed_core::PriceSnapshot;

use crate::ExchangeError;

/// 거래소 작업을 위한 Result 타입.
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// 업스트림 브리지 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// 연결 없음
    Disconnected,
    /// 연결 시도 중
    Connecting,
    /// 인증 완료, 스트림 시작 전
    Authenticated,
    /// 이벤트 수신 중
    Streaming,
}

impl BridgeState {
    /// 이벤트를 수신 중인 상태인지 확인.
    pub fn is_streaming(&self) -> bool {
        matches!(self, BridgeState::Streaming)
    }
}

/// 피드 스트림 이벤트.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// 시세 업데이트
    Price(PriceSnapshot),
    /// 업스트림 연결됨 (구독 재전송 완료 후)
    Connected,
    /// 업스트림 연결 끊김
    Disconnected,
    /// 에러 발생
    Error(String),
}

/// 푸시 기반 업스트림 피드.
///
/// 업스트림 푸시 연결 하나를 소유하고 종목 단위 구독을 관리합니다.
#[async_trait]
pub trait PushFeed: Send + Sync {
    /// 종목의 업스트림 구독을 보장합니다.
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: 구독됨 (이미 구독 중이었거나 새로 요청됨)
    /// - `Ok(false)`: 실시간 수신 불가 종목 — 호출자는 폴링을 사용해야 함
    ///
    /// 연결이 끊긴 동안에도 구독 의도는 기록되며, 재연결 시 재전송됩니다.
    async fn ensure_subscribed(&self, code: &str) -> ExchangeResult<bool>;

    /// 종목의 업스트림 구독을 해제합니다. 멱등.
    async fn ensure_unsubscribed(&self, code: &str);

    /// 현재 연결 상태.
    async fn state(&self) -> BridgeState;

    /// 현재 구독 중인 종목 목록.
    async fn active_instruments(&self) -> Vec<String>;
}

/// 풀 기반 스냅샷 데이터 소스.
///
/// 폴링 폴백 워커가 사용하는 요청/응답 시세 조회 경계입니다.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// 종목의 현재 시세 스냅샷 조회.
    async fn fetch_snapshot(&self, code: &str) -> ExchangeResult<PriceSnapshot>;
}
