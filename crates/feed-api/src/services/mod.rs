//! 백그라운드 서비스.
//!
//! - [`demand`]: 종목 수요 코디네이터 (푸시/폴링 경로 결정)
//! - [`poller`]: 폴링 폴백 워커

pub mod demand;
pub mod poller;

pub use demand::{DemandCommand, DemandCoordinator};
pub use poller::PollingWorker;
