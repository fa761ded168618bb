//! 개발/테스트용 모의 시세 소스.
//!
//! 실제 거래소 자격증명 없이 서버를 구동할 때 사용하는 랜덤 워크
//! 시세 생성기입니다. [`SnapshotSource`]를 구현하므로 폴링 폴백 워커에
//! 그대로 꽂을 수 있습니다.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;

use feed_core::PriceSnapshot;

use crate::traits::{ExchangeResult, SnapshotSource};

/// 종목별 시뮬레이션 상태.
#[derive(Debug, Clone)]
struct SymbolPrice {
    base_price: Decimal,
    current_price: Decimal,
    acc_volume: i64,
}

/// 모의 시세 소스.
///
/// 조회할 때마다 ±0.5% 범위의 랜덤 워크로 가격을 움직입니다.
/// 알려지지 않은 종목은 기본 시작가로 시드됩니다.
pub struct SimulatedSource {
    prices: RwLock<HashMap<String, SymbolPrice>>,
}

impl SimulatedSource {
    /// 주요 종목이 시드된 시뮬레이터 생성.
    pub fn new() -> Self {
        let mut prices = HashMap::new();

        // 국내 주요 종목
        prices.insert("005930".to_string(), seed(dec!(70000))); // 삼성전자
        prices.insert("000660".to_string(), seed(dec!(178000))); // SK하이닉스
        prices.insert("035720".to_string(), seed(dec!(42500))); // 카카오
        prices.insert("035420".to_string(), seed(dec!(185000))); // 네이버

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// 다음 시세 생성.
    async fn next_price(&self, code: &str) -> PriceSnapshot {
        let mut prices = self.prices.write().await;
        let entry = prices
            .entry(code.to_string())
            .or_insert_with(|| seed(dec!(10000)));

        // ±0.5% 랜덤 워크
        let step_bps: i64 = rand::thread_rng().gen_range(-50..=50);
        let step = entry.current_price * Decimal::new(step_bps, 4);
        entry.current_price += step;
        entry.acc_volume += rand::thread_rng().gen_range(100..=10_000);

        let change = entry.current_price - entry.base_price;
        let change_rate = if entry.base_price.is_zero() {
            Decimal::ZERO
        } else {
            (change / entry.base_price * dec!(100)).round_dp(2)
        };

        PriceSnapshot::new(code, entry.current_price, change, change_rate, entry.acc_volume)
    }
}

fn seed(base: Decimal) -> SymbolPrice {
    SymbolPrice {
        base_price: base,
        current_price: base,
        acc_volume: 0,
    }
}

impl Default for SimulatedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotSource for SimulatedSource {
    async fn fetch_snapshot(&self, code: &str) -> ExchangeResult<PriceSnapshot> {
        Ok(self.next_price(code).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_known_symbol_starts_near_seed() {
        let source = SimulatedSource::new();

        let snapshot = source.fetch_snapshot("005930").await.unwrap();
        assert_eq!(snapshot.ticker, "005930");
        // 첫 스텝은 ±0.5% 이내
        assert!(snapshot.price > dec!(69000));
        assert!(snapshot.price < dec!(71000));
    }

    #[tokio::test]
    async fn test_unknown_symbol_gets_seeded() {
        let source = SimulatedSource::new();

        let snapshot = source.fetch_snapshot("0015N0").await.unwrap();
        assert_eq!(snapshot.ticker, "0015N0");
        assert!(snapshot.price > Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_volume_accumulates() {
        let source = SimulatedSource::new();

        let first = source.fetch_snapshot("005930").await.unwrap();
        let second = source.fetch_snapshot("005930").await.unwrap();
        assert!(second.volume > first.volume);
    }
}
