//! # Feed Data
//!
//! 단기 TTL 시세 스냅샷 캐시를 제공합니다.
//!
//! 폴링 폴백 경로의 중복 조회 방지와 웜 스타트 응답에 사용됩니다.

pub mod cache;

pub use cache::{PriceCache, SharedPriceCache};
