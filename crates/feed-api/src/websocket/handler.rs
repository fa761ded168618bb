//! WebSocket 연결 handler.
//!
//! Axum WebSocket 엔드포인트 및 제어 메시지 처리.
//!
//! 연결마다 수신 태스크와 송신 태스크가 분리되어 있으며, 송신은
//! 연결별 유한 버퍼를 거칩니다. 버퍼를 채우는 느린 클라이언트는
//! 브로드캐스터가 제거합니다.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use feed_core::{classify_with_overrides, ClassifierOverrides};

use super::messages::{ClientMessage, ServerMessage};
use super::registry::SharedConnectionRegistry;
use super::topic::Topic;
use crate::metrics::increment_websocket_connections;
use crate::services::demand::DemandCommand;
use crate::websocket::heartbeat::HeartbeatMonitor;

/// WebSocket 상태.
#[derive(Clone)]
pub struct WsState {
    /// 연결 레지스트리
    pub registry: SharedConnectionRegistry,
    /// 하트비트 모니터
    pub heartbeat: Arc<HeartbeatMonitor>,
    /// 수요 코디네이터 명령 채널
    pub demand_tx: mpsc::Sender<DemandCommand>,
    /// 종목 분류 강제 테이블
    pub overrides: Arc<ClassifierOverrides>,
    /// 연결당 송신 버퍼 크기
    pub send_buffer: usize,
}

impl WsState {
    /// 새로운 WebSocket 상태 생성.
    pub fn new(
        registry: SharedConnectionRegistry,
        heartbeat: Arc<HeartbeatMonitor>,
        demand_tx: mpsc::Sender<DemandCommand>,
        overrides: Arc<ClassifierOverrides>,
        send_buffer: usize,
    ) -> Self {
        Self {
            registry,
            heartbeat,
            demand_tx,
            overrides,
            send_buffer,
        }
    }
}

/// WebSocket 업그레이드 핸들러.
///
/// # 엔드포인트
///
/// `GET /ws`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(ws_state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state))
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: WsState) {
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(state.send_buffer);

    let connection_id = state.registry.register(out_tx.clone()).await;
    state.heartbeat.on_connect(&connection_id).await;
    increment_websocket_connections();
    info!(connection_id = %connection_id, "WebSocket connected");

    // 연결 확인 메시지
    let _ = out_tx.try_send(ServerMessage::Connected {
        client_id: connection_id.clone(),
    });

    let (mut sender, mut receiver) = socket.split();

    // 송신 태스크: 연결별 버퍼를 소켓으로 비움
    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let frame = match &msg {
                // 하트비트 프로브는 프로토콜 레벨 Ping 프레임
                ServerMessage::Ping => Message::Ping(Vec::new().into()),
                other => match other.to_json() {
                    Ok(json) => Message::Text(json.into()),
                    Err(e) => {
                        warn!("메시지 직렬화 실패: {}", e);
                        continue;
                    }
                },
            };

            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // 수신 태스크: 클라이언트 제어 메시지 처리
    let connection_id_clone = connection_id.clone();
    let state_clone = state.clone();
    let receive_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_client_message(&connection_id_clone, msg, &state_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    // 하나의 태스크가 종료되면 다른 것도 종료
    tokio::select! {
        _ = send_task => {
            debug!(connection_id = %connection_id, "Send task ended");
        }
        _ = receive_task => {
            debug!(connection_id = %connection_id, "Receive task ended");
        }
    }

    // 연결 정리 (브로드캐스터가 먼저 제거했다면 no-op)
    super::drop_connection(
        &state.registry,
        &state.heartbeat,
        &state.demand_tx,
        &connection_id,
        "socket closed",
    )
    .await;
}

/// 클라이언트 메시지 처리.
///
/// # Returns
///
/// `true`면 연결 유지, `false`면 연결 종료
async fn handle_client_message(connection_id: &str, msg: Message, state: &WsState) -> bool {
    match msg {
        Message::Text(text) => match ClientMessage::from_json(&text) {
            Ok(client_msg) => process_client_message(connection_id, client_msg, state).await,
            Err(e) => {
                warn!(connection_id = %connection_id, "Invalid message: {}", e);
                state
                    .registry
                    .send_to(
                        connection_id,
                        ServerMessage::error("INVALID_MESSAGE", e.to_string()),
                    )
                    .await;
                true // 연결은 유지
            }
        },
        Message::Binary(_) => {
            warn!("Binary messages not supported");
            true
        }
        Message::Ping(_) => true,
        Message::Pong(_) => {
            state.heartbeat.record_pong(connection_id).await;
            true
        }
        Message::Close(_) => {
            debug!(connection_id = %connection_id, "Close message received");
            false
        }
    }
}

/// 파싱된 클라이언트 메시지 처리.
async fn process_client_message(connection_id: &str, msg: ClientMessage, state: &WsState) -> bool {
    match msg {
        ClientMessage::Subscribe { topic } => {
            handle_subscribe(connection_id, &topic, state).await;
            true
        }

        ClientMessage::Unsubscribe { topic } => {
            handle_unsubscribe(connection_id, &topic, state).await;
            true
        }

        ClientMessage::Ping => {
            // JSON ping도 생존 신호로 취급
            state.heartbeat.record_pong(connection_id).await;
            state.registry.send_to(connection_id, ServerMessage::Pong).await;
            true
        }
    }
}

/// 구독 요청 처리.
async fn handle_subscribe(connection_id: &str, topic_name: &str, state: &WsState) {
    let topic = match Topic::from_name(topic_name) {
        Ok(topic) => topic,
        Err(e) => {
            state
                .registry
                .send_to(connection_id, ServerMessage::error("INVALID_TOPIC", e.to_string()))
                .await;
            return;
        }
    };

    // 종목 시세 토픽은 구독 전에 코드 형태를 검증
    if let Some(code) = topic.instrument_code() {
        if let Err(e) = classify_with_overrides(code, &state.overrides) {
            state
                .registry
                .send_to(
                    connection_id,
                    ServerMessage::error("UNSUPPORTED_INSTRUMENT", e.to_string()),
                )
                .await;
            return;
        }
    }

    let outcome = state.registry.subscribe(connection_id, topic.clone()).await;
    debug!(connection_id = %connection_id, topic = %topic, ?outcome, "Subscribe");

    // 첫 구독자면 수요 추적 시작 (푸시 또는 폴링)
    if outcome.first_subscriber {
        if let Some(code) = topic.instrument_code() {
            if state
                .demand_tx
                .send(DemandCommand::InstrumentUp(code.to_string()))
                .await
                .is_err()
            {
                warn!("수요 채널 닫힘 - 수요 등록 유실");
            }
        }
    }

    state
        .registry
        .send_to(
            connection_id,
            ServerMessage::Subscribed {
                topic: topic.name(),
            },
        )
        .await;
}

/// 구독 해제 요청 처리.
async fn handle_unsubscribe(connection_id: &str, topic_name: &str, state: &WsState) {
    let topic = match Topic::from_name(topic_name) {
        Ok(topic) => topic,
        Err(e) => {
            state
                .registry
                .send_to(connection_id, ServerMessage::error("INVALID_TOPIC", e.to_string()))
                .await;
            return;
        }
    };

    let outcome = state.registry.unsubscribe(connection_id, &topic).await;
    debug!(connection_id = %connection_id, topic = %topic, ?outcome, "Unsubscribe");

    // 마지막 구독자였으면 수요 추적 중지
    if outcome.last_subscriber {
        if let Some(code) = topic.instrument_code() {
            if state
                .demand_tx
                .send(DemandCommand::InstrumentDown(code.to_string()))
                .await
                .is_err()
            {
                warn!("수요 채널 닫힘 - 수요 해제 유실");
            }
        }
    }

    state
        .registry
        .send_to(
            connection_id,
            ServerMessage::Unsubscribed {
                topic: topic.name(),
            },
        )
        .await;
}

/// WebSocket 라우터 생성.
pub fn websocket_router(ws_state: WsState) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .with_state(ws_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::registry::create_registry;

    fn test_state() -> (WsState, mpsc::Receiver<DemandCommand>) {
        let (demand_tx, demand_rx) = mpsc::channel(64);
        let state = WsState::new(
            create_registry(),
            Arc::new(HeartbeatMonitor::new()),
            demand_tx,
            Arc::new(ClassifierOverrides::default()),
            16,
        );
        (state, demand_rx)
    }

    async fn connect(state: &WsState) -> (String, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let id = state.registry.register(tx).await;
        state.heartbeat.on_connect(&id).await;
        (id, rx)
    }

    #[tokio::test]
    async fn test_subscribe_flow_with_demand() {
        let (state, mut demand_rx) = test_state();
        let (id, mut rx) = connect(&state).await;

        handle_subscribe(&id, "price:005930", &state).await;

        // 첫 구독자 → 수요 등록
        assert!(matches!(
            demand_rx.try_recv().unwrap(),
            DemandCommand::InstrumentUp(code) if code == "005930"
        ));

        // 요청한 연결에만 ack 전달
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Subscribed { topic } if topic == "price:005930"
        ));
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_no_duplicate_demand() {
        let (state, mut demand_rx) = test_state();
        let (id, _rx) = connect(&state).await;

        handle_subscribe(&id, "price:005930", &state).await;
        handle_subscribe(&id, "price:005930", &state).await;

        assert!(demand_rx.try_recv().is_ok());
        assert!(demand_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_rejects_unsupported_code() {
        let (state, mut demand_rx) = test_state();
        let (id, mut rx) = connect(&state).await;

        // 10자리 장외 코드는 거부
        handle_subscribe(&id, "price:0152301010", &state).await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Error { code, .. } if code == "UNSUPPORTED_INSTRUMENT"
        ));
        assert!(demand_rx.try_recv().is_err());
        assert_eq!(
            state
                .registry
                .subscriber_count(&Topic::Price("0152301010".to_string()))
                .await,
            0
        );
    }

    #[tokio::test]
    async fn test_subscribe_rejects_malformed_topic() {
        let (state, _demand_rx) = test_state();
        let (id, mut rx) = connect(&state).await;

        handle_subscribe(&id, "orders", &state).await;

        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Error { code, .. } if code == "INVALID_TOPIC"
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_demand() {
        let (state, mut demand_rx) = test_state();
        let (id, mut rx) = connect(&state).await;

        handle_subscribe(&id, "price:005930", &state).await;
        let _ = demand_rx.try_recv();
        let _ = rx.try_recv();

        handle_unsubscribe(&id, "price:005930", &state).await;

        assert!(matches!(
            demand_rx.try_recv().unwrap(),
            DemandCommand::InstrumentDown(code) if code == "005930"
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ServerMessage::Unsubscribed { topic } if topic == "price:005930"
        ));
    }

    #[tokio::test]
    async fn test_json_ping_answers_pong() {
        let (state, _demand_rx) = test_state();
        let (id, mut rx) = connect(&state).await;

        let keep_alive = process_client_message(&id, ClientMessage::Ping, &state).await;
        assert!(keep_alive);
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::Pong));
    }
}
