//! # Feed Exchange
//!
//! 외부 시세 제공자 커넥터를 제공합니다.
//!
//! - [`connector::kis`]: 한국투자증권 (KIS) 실시간 WebSocket 브리지 및
//!   REST 시세 조회 클라이언트
//! - [`simulated`]: 개발/테스트용 모의 시세 소스
//! - [`backoff`]: 재연결 백오프 정책
//! - [`traits`]: 푸시 피드 / 풀 소스 경계 trait

pub mod backoff;
pub mod connector;
pub mod error;
pub mod simulated;
pub mod traits;

pub use backoff::{ReconnectConfig, ReconnectPolicy};
pub use error::ExchangeError;
pub use simulated::SimulatedSource;
pub use traits::{BridgeState, ExchangeResult, FeedEvent, PushFeed, SnapshotSource};
