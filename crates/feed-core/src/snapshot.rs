//! 시세 및 시그널 스냅샷 타입.
//!
//! 푸시 브리지와 폴링 워커가 공통으로 생산하는 불변 값 객체입니다.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 종목 시세 스냅샷.
///
/// 마지막으로 알려진 시세 상태를 나타냅니다. 푸시 이벤트와 폴링 결과
/// 양쪽에서 생성되며, 타임스탬프 기준 최신값이 이깁니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// 종목코드
    pub ticker: String,
    /// 현재가
    pub price: Decimal,
    /// 전일대비
    pub change: Decimal,
    /// 등락률 (%)
    pub change_rate: Decimal,
    /// 누적거래량
    pub volume: i64,
    /// 생성 시각 (epoch millis)
    pub timestamp: i64,
}

impl PriceSnapshot {
    /// 현재 시각으로 스냅샷 생성.
    pub fn new(
        ticker: impl Into<String>,
        price: Decimal,
        change: Decimal,
        change_rate: Decimal,
        volume: i64,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            price,
            change,
            change_rate,
            volume,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// 개별 시그널 레코드.
///
/// 시그널 산출 로직은 이 시스템 범위 밖이며, 전달받은 페이로드를
/// 그대로 실어 나릅니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    /// 종목코드
    pub ticker: String,
    /// 시그널 종류 (예: "golden_cross", "volume_spike")
    pub kind: String,
    /// 점수 등 추가 데이터
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// 시그널 배치 스냅샷.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSnapshot {
    /// 시그널 목록
    pub signals: Vec<SignalRecord>,
    /// 시그널 수
    pub count: usize,
    /// 생성 시각 (epoch millis)
    pub timestamp: i64,
}

impl SignalSnapshot {
    /// 시그널 목록에서 배치 생성.
    pub fn new(signals: Vec<SignalRecord>) -> Self {
        let count = signals.len();
        Self {
            signals,
            count,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_snapshot_new() {
        let snap = PriceSnapshot::new("005930", dec!(70000), dec!(500), dec!(0.72), 1000);
        assert_eq!(snap.ticker, "005930");
        assert_eq!(snap.price, dec!(70000));
        assert!(snap.timestamp > 0);
    }

    #[test]
    fn test_signal_snapshot_count() {
        let snapshot = SignalSnapshot::new(vec![
            SignalRecord {
                ticker: "005930".to_string(),
                kind: "golden_cross".to_string(),
                data: None,
            },
            SignalRecord {
                ticker: "000660".to_string(),
                kind: "volume_spike".to_string(),
                data: Some(serde_json::json!({"score": 0.8})),
            },
        ]);

        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.signals.len(), 2);
    }
}
