//! WebSocket 메시지 타입.
//!
//! 클라이언트-서버 간 교환되는 메시지 정의.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use feed_core::{PriceSnapshot, SignalSnapshot};

/// WebSocket 에러.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("잘못된 메시지 형식: {0}")]
    InvalidMessage(String),
    #[error("직렬화 실패: {0}")]
    SerializationError(#[from] serde_json::Error),
}

// ==================== 클라이언트 → 서버 메시지 ====================

/// 클라이언트에서 서버로 보내는 메시지.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 토픽 구독
    Subscribe {
        /// 구독할 토픽 (예: "price:005930")
        topic: String,
    },
    /// 토픽 구독 해제
    Unsubscribe {
        /// 구독 해제할 토픽
        topic: String,
    },
    /// 핑 (연결 유지)
    Ping,
}

impl ClientMessage {
    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> Result<Self, WsError> {
        serde_json::from_str(json).map_err(|e| WsError::InvalidMessage(e.to_string()))
    }
}

// ==================== 서버 → 클라이언트 메시지 ====================

/// 서버에서 클라이언트로 보내는 메시지.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 연결 확인
    Connected {
        /// 연결 식별자
        client_id: String,
    },
    /// 구독 확인
    Subscribed {
        /// 구독된 토픽
        topic: String,
    },
    /// 구독 해제 확인
    Unsubscribed {
        /// 구독 해제된 토픽
        topic: String,
    },
    /// 퐁 응답
    Pong,
    /// 하트비트 프로브.
    ///
    /// 송신 태스크에서 프로토콜 레벨 Ping 프레임으로 변환됩니다.
    Ping,
    /// 에러
    Error {
        /// 에러 코드
        code: String,
        /// 에러 메시지
        message: String,
    },
    /// 시세 업데이트
    PriceUpdate {
        /// 종목코드
        ticker: String,
        /// 시세 데이터
        data: PriceData,
        /// 생성 시각 (epoch millis)
        timestamp: i64,
    },
    /// 시그널 업데이트
    SignalUpdate {
        /// 시그널 배치
        data: SignalSnapshot,
    },
    /// 시장 상태 (브리지 연결 상태 변경)
    MarketStatus {
        /// 상태 문자열
        state: String,
        /// 생성 시각 (epoch millis)
        timestamp: i64,
    },
}

/// 시세 데이터 본문.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceData {
    /// 현재가
    pub price: Decimal,
    /// 전일대비
    pub change: Decimal,
    /// 등락률 (%)
    pub change_rate: Decimal,
    /// 누적거래량
    pub volume: i64,
}

impl ServerMessage {
    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self).map_err(WsError::from)
    }

    /// 에러 메시지 생성 헬퍼.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 시세 스냅샷에서 업데이트 메시지 생성.
    pub fn price_update(snapshot: &PriceSnapshot) -> Self {
        ServerMessage::PriceUpdate {
            ticker: snapshot.ticker.clone(),
            data: PriceData {
                price: snapshot.price,
                change: snapshot.change,
                change_rate: snapshot.change_rate,
                volume: snapshot.volume,
            },
            timestamp: snapshot.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_client_message_subscribe() {
        let json = r#"{"type": "subscribe", "topic": "price:005930"}"#;
        let msg = ClientMessage::from_json(json).unwrap();

        match msg {
            ClientMessage::Subscribe { topic } => assert_eq!(topic, "price:005930"),
            _ => panic!("Expected Subscribe message"),
        }
    }

    #[test]
    fn test_client_message_ping() {
        let json = r#"{"type": "ping"}"#;
        let msg = ClientMessage::from_json(json).unwrap();

        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_client_message_rejects_unknown_type() {
        let json = r#"{"type": "order", "symbol": "005930"}"#;
        assert!(ClientMessage::from_json(json).is_err());
    }

    #[test]
    fn test_price_update_wire_shape() {
        let snapshot =
            PriceSnapshot::new("005930", dec!(70000), dec!(500), dec!(0.72), 12345678);
        let json = ServerMessage::price_update(&snapshot).to_json().unwrap();

        assert!(json.contains(r#""type":"price_update""#));
        assert!(json.contains(r#""ticker":"005930""#));
        assert!(json.contains(r#""price":"70000""#));
        assert!(json.contains(r#""change_rate":"0.72""#));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_signal_update_wire_shape() {
        let snapshot = SignalSnapshot::new(vec![feed_core::SignalRecord {
            ticker: "005930".to_string(),
            kind: "golden_cross".to_string(),
            data: None,
        }]);

        let json = ServerMessage::SignalUpdate { data: snapshot }.to_json().unwrap();

        assert!(json.contains(r#""type":"signal_update""#));
        assert!(json.contains(r#""count":1"#));
        assert!(json.contains("signals"));
    }

    #[test]
    fn test_server_error_message() {
        let msg = ServerMessage::error("INVALID_TOPIC", "Unknown topic");
        let json = msg.to_json().unwrap();

        assert!(json.contains("error"));
        assert!(json.contains("INVALID_TOPIC"));
    }

    #[test]
    fn test_connected_message() {
        let msg = ServerMessage::Connected {
            client_id: "abc-123".to_string(),
        };
        let json = msg.to_json().unwrap();

        assert!(json.contains(r#""type":"connected""#));
        assert!(json.contains("abc-123"));
    }
}
