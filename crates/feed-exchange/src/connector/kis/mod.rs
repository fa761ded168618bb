//! 한국투자증권 (KIS) 커넥터.
//!
//! - [`config`]: 환경/인증 설정
//! - [`auth`]: OAuth 토큰 및 WebSocket 접속키 발급
//! - [`quote`]: REST 시세 조회 (폴링 폴백용 풀 소스)
//! - [`realtime`]: 실시간 WebSocket 브리지

pub mod auth;
pub mod config;
pub mod quote;
pub mod realtime;

pub use auth::KisAuth;
pub use config::{KisConfig, KisEnvironment};
pub use quote::KisQuoteClient;
pub use realtime::KisFeedBridge;

/// KIS API 거래 ID (tr_id) 상수.
pub mod tr_id {
    /// 주식현재가 시세 조회
    pub const KR_PRICE: &str = "FHKST01010100";

    /// 실시간 체결가 (WebSocket)
    pub const WS_KR_TRADE: &str = "H0STCNT0";
}
