//! 구독 토픽.
//!
//! 클라이언트가 구독하는 채널 이름을 닫힌 enum으로 모델링합니다.
//!
//! # 형식
//!
//! - `price:{종목코드}` - 특정 종목의 시세
//! - `signal:{카테고리}` - 카테고리별 시그널 스트림
//! - `market:status` - 시장/브리지 상태 (예약 토픽, 코드 파싱 없음)

use std::fmt;

use feed_core::{FeedError, FeedResult};

/// 구독 토픽.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// 특정 종목의 시세 피드
    Price(String),
    /// 카테고리별 시그널 스트림
    Signal(String),
    /// 시장 상태 (예약 이름)
    MarketStatus,
}

impl Topic {
    /// 토픽 이름에서 파싱.
    ///
    /// # Errors
    ///
    /// 형식이 맞지 않는 이름은 [`FeedError::InvalidInput`]으로 거부됩니다.
    pub fn from_name(name: &str) -> FeedResult<Self> {
        if name == "market:status" {
            return Ok(Topic::MarketStatus);
        }

        if let Some(code) = name.strip_prefix("price:") {
            if code.is_empty() {
                return Err(FeedError::InvalidInput(format!("종목코드 누락: {}", name)));
            }
            return Ok(Topic::Price(code.to_string()));
        }

        if let Some(category) = name.strip_prefix("signal:") {
            if category.is_empty() {
                return Err(FeedError::InvalidInput(format!("카테고리 누락: {}", name)));
            }
            return Ok(Topic::Signal(category.to_string()));
        }

        Err(FeedError::InvalidInput(format!("알 수 없는 토픽: {}", name)))
    }

    /// 토픽이 종목 시세 피드라면 종목코드 반환.
    pub fn instrument_code(&self) -> Option<&str> {
        match self {
            Topic::Price(code) => Some(code),
            _ => None,
        }
    }

    /// 토픽 이름 반환.
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Price(code) => write!(f, "price:{}", code),
            Topic::Signal(category) => write!(f, "signal:{}", category),
            Topic::MarketStatus => write!(f, "market:status"),
        }
    }
}
