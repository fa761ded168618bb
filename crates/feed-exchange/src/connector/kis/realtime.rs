//! KIS 실시간 시세 WebSocket 브리지.
//!
//! 업스트림 푸시 연결 하나를 소유하고, 종목 단위 수요에 따라 업스트림
//! 구독을 관리하며, 수신한 푸시 이벤트를 내부 피드 이벤트로 변환합니다.
//!
//! # 연결 상태 기계
//!
//! `Disconnected -> Connecting -> Authenticated -> Streaming`
//!
//! 전송 에러가 발생하면 `Streaming -> Connecting`으로 돌아가며, 지수
//! 백오프로 재연결합니다. 업스트림은 연결 간 구독 상태를 기억하지
//! 않으므로 `Streaming` 진입 시마다 `active_instruments` 전체를 정확히
//! 한 번 재전송합니다.
//!
//! # 이벤트 수용 규칙
//!
//! `active_instruments`에 없는 종목의 푸시 이벤트는 경고와 함께
//! 버려집니다. 구독 해제 직후 도착하는 늦은 이벤트는 정상 경로이며,
//! 캐시에도 반영하지 않습니다.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use feed_core::{classify_with_overrides, ClassifierOverrides, PriceSnapshot};

use super::auth::KisAuth;
use super::tr_id;
use crate::backoff::{ReconnectConfig, ReconnectPolicy};
use crate::traits::{BridgeState, ExchangeResult, FeedEvent, PushFeed};
use crate::ExchangeError;

/// Ping 간격 (초).
const PING_INTERVAL_SECS: u64 = 30;

/// 구독 명령 채널 크기.
const CMD_CHANNEL_SIZE: usize = 64;

/// 피드 이벤트 채널 크기.
const EVENT_CHANNEL_SIZE: usize = 1024;

/// 연결 태스크로 전달되는 구독 명령.
#[derive(Debug)]
enum BridgeCommand {
    Subscribe(String),
    Unsubscribe(String),
}

/// WebSocket 구독 요청 메시지.
#[derive(Debug, Serialize)]
struct WsSubscribeRequest {
    header: WsHeader,
    body: WsBody,
}

#[derive(Debug, Serialize)]
struct WsHeader {
    approval_key: String,
    custtype: String,
    tr_type: String, // "1": 구독 등록, "2": 구독 해제
    #[serde(rename = "content-type")]
    content_type: String,
}

#[derive(Debug, Serialize)]
struct WsBody {
    input: WsInput,
}

#[derive(Debug, Serialize)]
struct WsInput {
    tr_id: String,
    tr_key: String, // 종목코드
}

/// KIS 실시간 시세 브리지.
pub struct KisFeedBridge {
    auth: Arc<KisAuth>,
    overrides: ClassifierOverrides,
    reconnect: ReconnectConfig,
    active: RwLock<HashSet<String>>,
    state: RwLock<BridgeState>,
    cmd_tx: mpsc::Sender<BridgeCommand>,
    cmd_rx: Mutex<Option<mpsc::Receiver<BridgeCommand>>>,
    event_tx: mpsc::Sender<FeedEvent>,
}

impl KisFeedBridge {
    /// 새로운 브리지 생성.
    ///
    /// # Returns
    ///
    /// 브리지와 피드 이벤트 수신 채널.
    pub fn new(
        auth: Arc<KisAuth>,
        overrides: ClassifierOverrides,
        reconnect: ReconnectConfig,
    ) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_SIZE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

        let bridge = Self {
            auth,
            overrides,
            reconnect,
            active: RwLock::new(HashSet::new()),
            state: RwLock::new(BridgeState::Disconnected),
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            event_tx,
        };

        (bridge, event_rx)
    }

    /// 연결 루프 실행.
    ///
    /// 취소될 때까지 재연결을 반복합니다. 별도 태스크에서 실행해야 합니다.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut cmd_rx = match self.cmd_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                error!("KIS bridge run() called twice");
                return;
            }
        };

        let mut policy = ReconnectPolicy::new(self.reconnect.clone());

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(BridgeState::Connecting).await;

            match self.session(&mut cmd_rx, &cancel, &mut policy).await {
                Ok(()) => {
                    info!("KIS WebSocket 연결 종료");
                    break;
                }
                Err(e) => {
                    let was_streaming = self.state().await.is_streaming();
                    self.set_state(BridgeState::Disconnected).await;

                    if was_streaming {
                        let _ = self.event_tx.send(FeedEvent::Disconnected).await;
                    }

                    // 접속키는 연결마다 재발급 필요
                    self.auth.clear_websocket_key().await;

                    let delay = policy.next_delay();
                    warn!(
                        error = %e,
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis() as u64,
                        "KIS WebSocket 재연결 대기"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(BridgeState::Disconnected).await;
    }

    /// 단일 연결 세션.
    ///
    /// 정상 종료(취소)면 `Ok`, 전송 에러면 `Err`를 반환해 재연결을 트리거합니다.
    async fn session(
        &self,
        cmd_rx: &mut mpsc::Receiver<BridgeCommand>,
        cancel: &CancellationToken,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), ExchangeError> {
        // WebSocket 접속키 발급
        let approval_key = self.auth.get_websocket_key().await?;
        self.set_state(BridgeState::Authenticated).await;

        let ws_url = self.auth.config().websocket_url().to_string();
        info!("KIS WebSocket 연결 중: {}", ws_url);

        let (ws_stream, _) = connect_async(&ws_url)
            .await
            .map_err(|e| ExchangeError::WebSocket(format!("WebSocket 연결 실패: {}", e)))?;

        let (mut write, mut read) = ws_stream.split();

        // 단절 구간에 쌓인 명령은 버린다 - 재전송은 active 집합 기준
        while cmd_rx.try_recv().is_ok() {}

        // Streaming 전환을 먼저 알려, 이 시점 이후의 ensure_subscribed는
        // 명령 채널을 타게 한다 (중복 구독 프레임은 무해)
        self.set_state(BridgeState::Streaming).await;

        // 기존 구독 재전송 — Streaming 진입마다 정확히 한 번
        let codes: Vec<String> = self.active.read().await.iter().cloned().collect();
        for code in &codes {
            let frame = create_subscribe_message(&approval_key, tr_id::WS_KR_TRADE, code, true);
            write
                .send(Message::Text(frame))
                .await
                .map_err(|e| ExchangeError::WebSocket(e.to_string()))?;
            debug!(ticker = %code, "구독 재전송");
        }

        policy.reset();
        let _ = self.event_tx.send(FeedEvent::Connected).await;

        info!(resubscribed = codes.len(), "KIS WebSocket 연결 성공");

        let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                // WebSocket 메시지 수신
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_message(&text).await;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = write.send(Message::Pong(data)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            warn!("서버에서 연결 종료 요청");
                            return Err(ExchangeError::Disconnected("server close".to_string()));
                        }
                        Some(Err(e)) => {
                            error!("WebSocket 수신 에러: {}", e);
                            return Err(ExchangeError::WebSocket(e.to_string()));
                        }
                        None => {
                            warn!("WebSocket 스트림 종료");
                            return Err(ExchangeError::Disconnected("stream ended".to_string()));
                        }
                        _ => {}
                    }
                }
                // 동적 구독/해제 명령
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(BridgeCommand::Subscribe(code)) => {
                            let frame = create_subscribe_message(
                                &approval_key, tr_id::WS_KR_TRADE, &code, true,
                            );
                            write
                                .send(Message::Text(frame))
                                .await
                                .map_err(|e| ExchangeError::WebSocket(e.to_string()))?;
                            debug!(ticker = %code, "업스트림 구독 요청 전송");
                        }
                        Some(BridgeCommand::Unsubscribe(code)) => {
                            let frame = create_subscribe_message(
                                &approval_key, tr_id::WS_KR_TRADE, &code, false,
                            );
                            write
                                .send(Message::Text(frame))
                                .await
                                .map_err(|e| ExchangeError::WebSocket(e.to_string()))?;
                            debug!(ticker = %code, "업스트림 구독 해제 전송");
                        }
                        None => return Ok(()),
                    }
                }
                // 연결 유지 Ping
                _ = ping_interval.tick() => {
                    write
                        .send(Message::Ping(vec![]))
                        .await
                        .map_err(|e| ExchangeError::WebSocket(e.to_string()))?;
                }
            }
        }
    }

    /// 수신 메시지 처리.
    ///
    /// KIS WebSocket 메시지는 `|` 구분자로 분리됩니다.
    /// 형식: `0|H0STCNT0|001|005930^...`
    async fn handle_message(&self, text: &str) {
        let parts: Vec<&str> = text.split('|').collect();

        if parts.len() < 4 {
            // JSON 응답 (구독 확인 등)
            debug!("JSON 응답: {}", text);
            return;
        }

        let tr = parts[1];
        let data = parts[3];

        match tr {
            "H0STCNT0" => {
                let Some(snapshot) = parse_price_data(data) else {
                    return;
                };

                // active 집합 소속이 이벤트 수용의 전제 조건
                if !self.active.read().await.contains(&snapshot.ticker) {
                    warn!(
                        ticker = %snapshot.ticker,
                        "구독하지 않은 종목의 푸시 이벤트 수신, 무시"
                    );
                    return;
                }

                let _ = self.event_tx.send(FeedEvent::Price(snapshot)).await;
            }
            _ => {
                debug!("알 수 없는 tr_id: {}", tr);
            }
        }
    }

    async fn set_state(&self, new: BridgeState) {
        let mut state = self.state.write().await;
        if *state != new {
            debug!(from = ?*state, to = ?new, "브리지 상태 전환");
            *state = new;
        }
    }
}

#[async_trait::async_trait]
impl PushFeed for KisFeedBridge {
    async fn ensure_subscribed(&self, code: &str) -> ExchangeResult<bool> {
        let classification = classify_with_overrides(code, &self.overrides)?;
        if !classification.push_capable {
            return Ok(false);
        }

        // 멱등: 이미 구독 중이면 업스트림에 다시 요청하지 않음
        let inserted = self.active.write().await.insert(code.to_string());
        if !inserted {
            return Ok(true);
        }

        // 연결 중이면 즉시 전송. 끊겨 있으면 의도만 기록하고
        // 재연결 시 재전송이 이를 처리한다.
        if self.state().await.is_streaming() {
            if let Err(e) = self.cmd_tx.try_send(BridgeCommand::Subscribe(code.to_string())) {
                warn!(ticker = %code, error = %e, "구독 명령 전달 실패");
            }
        }

        Ok(true)
    }

    async fn ensure_unsubscribed(&self, code: &str) {
        let removed = self.active.write().await.remove(code);
        if removed && self.state().await.is_streaming() {
            if let Err(e) = self.cmd_tx.try_send(BridgeCommand::Unsubscribe(code.to_string())) {
                warn!(ticker = %code, error = %e, "구독 해제 명령 전달 실패");
            }
        }
    }

    async fn state(&self) -> BridgeState {
        *self.state.read().await
    }

    async fn active_instruments(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.active.read().await.iter().cloned().collect();
        codes.sort();
        codes
    }
}

/// 구독 메시지 생성.
fn create_subscribe_message(approval_key: &str, tr: &str, symbol: &str, subscribe: bool) -> String {
    let request = WsSubscribeRequest {
        header: WsHeader {
            approval_key: approval_key.to_string(),
            custtype: "P".to_string(), // P: 개인
            tr_type: if subscribe { "1" } else { "2" }.to_string(),
            content_type: "utf-8".to_string(),
        },
        body: WsBody {
            input: WsInput {
                tr_id: tr.to_string(),
                tr_key: symbol.to_string(),
            },
        },
    };

    serde_json::to_string(&request).unwrap_or_default()
}

/// 체결 데이터 파싱.
///
/// 데이터 형식: `종목코드^체결시간^체결가^부호^전일대비^등락률^...^체결량^누적거래량^...`
fn parse_price_data(data: &str) -> Option<PriceSnapshot> {
    let fields: Vec<&str> = data.split('^').collect();

    if fields.len() < 14 {
        warn!("체결 데이터 필드 부족: {}", fields.len());
        return None;
    }

    Some(PriceSnapshot::new(
        fields[0],
        fields[2].parse().unwrap_or_default(),
        fields[4].parse().unwrap_or_default(),
        fields[5].parse().unwrap_or_default(),
        fields[13].parse().unwrap_or(0),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::kis::config::{KisConfig, KisEnvironment};
    use rust_decimal_macros::dec;

    fn create_bridge() -> (KisFeedBridge, mpsc::Receiver<FeedEvent>) {
        let config = KisConfig::new(
            "test_app_key".to_string(),
            "test_app_secret".to_string(),
            KisEnvironment::Paper,
        );
        let auth = Arc::new(KisAuth::new(config).unwrap());
        KisFeedBridge::new(auth, ClassifierOverrides::default(), ReconnectConfig::default())
    }

    #[test]
    fn test_parse_price_data() {
        let data = "005930^093000^70000^2^500^0.72^0^0^0^0^0^0^1000^50000000^0^0^0^0^0^0";

        let snapshot = parse_price_data(data).unwrap();
        assert_eq!(snapshot.ticker, "005930");
        assert_eq!(snapshot.price, dec!(70000));
        assert_eq!(snapshot.change, dec!(500));
        assert_eq!(snapshot.change_rate, dec!(0.72));
        assert_eq!(snapshot.volume, 50000000);
    }

    #[test]
    fn test_subscribe_message_format() {
        let msg = create_subscribe_message("test_key", "H0STCNT0", "005930", true);

        assert!(msg.contains("approval_key"));
        assert!(msg.contains("H0STCNT0"));
        assert!(msg.contains("005930"));
        assert!(msg.contains("\"tr_type\":\"1\""));
    }

    #[test]
    fn test_unsubscribe_message_format() {
        let msg = create_subscribe_message("test_key", "H0STCNT0", "005930", false);

        assert!(msg.contains("\"tr_type\":\"2\""));
    }

    #[tokio::test]
    async fn test_initial_state_disconnected() {
        let (bridge, _rx) = create_bridge();
        assert_eq!(bridge.state().await, BridgeState::Disconnected);
    }

    #[tokio::test]
    async fn test_ensure_subscribed_derivative_returns_false() {
        let (bridge, _rx) = create_bridge();

        // ELW 코드는 실시간 미지원 — 업스트림에 연락하지 않고 false
        let result = bridge.ensure_subscribed("0015N0").await.unwrap();
        assert!(!result);
        assert!(bridge.active_instruments().await.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_subscribed_rejects_invalid_code() {
        let (bridge, _rx) = create_bridge();

        let result = bridge.ensure_subscribed("0152301010").await;
        assert!(matches!(result, Err(ExchangeError::NotSupported(_))));
    }

    #[tokio::test]
    async fn test_ensure_subscribed_idempotent() {
        let (bridge, _rx) = create_bridge();

        assert!(bridge.ensure_subscribed("005930").await.unwrap());
        assert!(bridge.ensure_subscribed("005930").await.unwrap());

        assert_eq!(bridge.active_instruments().await, vec!["005930".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_subscribed_records_intent_while_disconnected() {
        let (bridge, _rx) = create_bridge();

        // 연결이 없어도 의도는 기록됨 (재연결 시 재전송 대상)
        assert!(bridge.ensure_subscribed("005930").await.unwrap());
        assert_eq!(bridge.state().await, BridgeState::Disconnected);
        assert_eq!(bridge.active_instruments().await, vec!["005930".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_unsubscribed_idempotent() {
        let (bridge, _rx) = create_bridge();

        bridge.ensure_subscribed("005930").await.unwrap();
        bridge.ensure_unsubscribed("005930").await;
        bridge.ensure_unsubscribed("005930").await;

        assert!(bridge.active_instruments().await.is_empty());
    }

    #[tokio::test]
    async fn test_event_for_inactive_code_dropped() {
        let (bridge, mut rx) = create_bridge();

        bridge
            .handle_message("0|H0STCNT0|001|005930^093000^70000^2^500^0.72^0^0^0^0^0^0^1000^50000000")
            .await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_event_for_active_code_forwarded() {
        let (bridge, mut rx) = create_bridge();

        bridge.ensure_subscribed("005930").await.unwrap();
        bridge
            .handle_message("0|H0STCNT0|001|005930^093000^70000^2^500^0.72^0^0^0^0^0^0^1000^50000000")
            .await;

        match rx.try_recv().unwrap() {
            FeedEvent::Price(snapshot) => {
                assert_eq!(snapshot.ticker, "005930");
                assert_eq!(snapshot.price, dec!(70000));
            }
            other => panic!("Expected price event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_json_control_message_ignored() {
        let (bridge, mut rx) = create_bridge();

        bridge
            .handle_message(r#"{"header":{"tr_id":"H0STCNT0"},"body":{"msg1":"SUBSCRIBE SUCCESS"}}"#)
            .await;

        assert!(rx.try_recv().is_err());
    }
}
