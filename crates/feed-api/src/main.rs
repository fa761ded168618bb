//! 시세 배포 서버.
//!
//! Axum 기반 WebSocket/REST 서버를 시작합니다.
//! 실시간 구독 게이트웨이, 폴링 폴백, 하트비트, 통계 엔드포인트를
//! 제공합니다.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use feed_api::services::demand::{demand_channel, DemandCoordinator};
use feed_api::services::poller::PollingWorker;
use feed_api::state::AppState;
use feed_api::websocket::aggregator::{start_aggregator, FeedAggregator};
use feed_api::websocket::{
    create_registry, run_heartbeat_loop, websocket_router, Broadcaster, HeartbeatMonitor,
    PriceBroadcaster, SignalBroadcaster, WsState,
};
use feed_api::{create_api_router, setup_metrics_recorder};
use feed_core::{
    init_logging, AppConfig, ClassifierConfig, ClassifierOverrides, LogConfig, LogFormat,
};
use feed_data::PriceCache;
use feed_exchange::connector::kis::{KisAuth, KisConfig, KisFeedBridge, KisQuoteClient};
use feed_exchange::{PushFeed, ReconnectConfig, SimulatedSource, SnapshotSource};

/// 수요 명령 채널 크기.
const DEMAND_CHANNEL_SIZE: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = match AppConfig::load_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("설정 로드 실패, 기본값 사용: {}", e);
            AppConfig::default()
        }
    };

    let log_format = config
        .logging
        .format
        .parse::<LogFormat>()
        .unwrap_or_default();
    if let Err(e) = init_logging(LogConfig::new(&config.logging.level).with_format(log_format)) {
        eprintln!("로깅 초기화 실패: {}", e);
    }

    let prometheus_handle = setup_metrics_recorder();

    // 종목 분류 강제 테이블: 설정 파일 + 환경변수 병합
    let mut classifier_config = config.classifier.clone();
    if let Ok(csv) = std::env::var("FEED_DERIVATIVE_CODES") {
        classifier_config
            .derivative_codes
            .extend(ClassifierConfig::from_csv(&csv).derivative_codes);
    }
    let overrides = ClassifierOverrides::from_config(&classifier_config);

    let cancel = CancellationToken::new();

    // ===== 핵심 구성 요소 (전역 상태 없이 명시적 주입) =====
    let registry = create_registry();
    let heartbeat = Arc::new(HeartbeatMonitor::new());
    let cache = Arc::new(PriceCache::new(config.cache.price_ttl()));
    let (demand_tx, demand_rx) = demand_channel(DEMAND_CHANNEL_SIZE);

    let prices = Arc::new(PriceBroadcaster::new(
        registry.clone(),
        heartbeat.clone(),
        demand_tx.clone(),
    ));
    let signals = Arc::new(SignalBroadcaster::new(
        registry.clone(),
        heartbeat.clone(),
        demand_tx.clone(),
    ));

    // ===== 업스트림 연결 (실거래소 또는 모의) =====
    let (source, bridge): (Arc<dyn SnapshotSource>, Option<Arc<dyn PushFeed>>) =
        start_market_data_source(
            &overrides,
            cache.clone(),
            prices.clone(),
            registry.clone(),
            heartbeat.clone(),
            demand_tx.clone(),
            cancel.clone(),
        );

    let poller = Arc::new(PollingWorker::new(
        source,
        cache.clone(),
        prices.clone(),
        config.polling.clone(),
    ));

    // ===== 백그라운드 태스크 =====
    let coordinator = Arc::new(DemandCoordinator::new(bridge.clone(), poller.clone()));
    tokio::spawn(coordinator.run(demand_rx, cancel.clone()));

    tokio::spawn(poller.clone().run(cancel.clone()));

    tokio::spawn(run_heartbeat_loop(
        heartbeat.clone(),
        registry.clone(),
        demand_tx.clone(),
        config.heartbeat.clone(),
        cancel.clone(),
    ));

    // 캐시 정리 태스크
    {
        let cache = cache.clone();
        let purge_interval = config.cache.purge_interval();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(purge_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => { cache.purge_expired().await; }
                }
            }
        });
    }

    // ===== 라우터 =====
    let app_state = Arc::new(AppState::new(
        registry.clone(),
        cache,
        heartbeat.clone(),
        poller,
        bridge,
        signals,
        demand_tx.clone(),
    ));

    let ws_state = WsState::new(
        registry,
        heartbeat,
        demand_tx,
        Arc::new(overrides),
        config.server.send_buffer,
    );

    let app = Router::new()
        .nest("/ws", websocket_router(ws_state))
        .merge(create_api_router().with_state(app_state))
        .route(
            "/metrics",
            get(move || async move { prometheus_handle.render() }),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Feed server listening on {}", addr);

    // Ctrl-C → 전체 태스크 취소
    let shutdown_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            shutdown_cancel.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Feed server stopped");
    Ok(())
}

/// 시장 데이터 소스 구성.
///
/// KIS 설정이 있고 `FEED_USE_REAL_EXCHANGE=true`면 실제 업스트림
/// (푸시 브리지 + REST 풀 소스)을 사용하고, 그렇지 않으면 모의
/// 시세 소스를 사용합니다 (브리지 없음, 전 종목 폴링).
fn start_market_data_source(
    overrides: &ClassifierOverrides,
    cache: feed_data::SharedPriceCache,
    prices: Arc<PriceBroadcaster>,
    registry: feed_api::websocket::SharedConnectionRegistry,
    heartbeat: Arc<HeartbeatMonitor>,
    demand_tx: mpsc::Sender<feed_api::DemandCommand>,
    cancel: CancellationToken,
) -> (Arc<dyn SnapshotSource>, Option<Arc<dyn PushFeed>>) {
    let use_real_exchange = std::env::var("FEED_USE_REAL_EXCHANGE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    if !use_real_exchange {
        info!("모의 시세 소스 사용 (FEED_USE_REAL_EXCHANGE=false)");
        return (Arc::new(SimulatedSource::new()), None);
    }

    let Some(kis_config) = KisConfig::from_env() else {
        warn!("FEED_USE_REAL_EXCHANGE=true지만 KIS 설정 없음, 모의 소스로 대체");
        return (Arc::new(SimulatedSource::new()), None);
    };

    info!(environment = ?kis_config.environment, "KIS API configuration loaded");

    let auth = match KisAuth::new(kis_config) {
        Ok(auth) => Arc::new(auth),
        Err(e) => {
            error!(error = %e, "KIS 인증 초기화 실패, 모의 소스로 대체");
            return (Arc::new(SimulatedSource::new()), None);
        }
    };

    let quote_client = match KisQuoteClient::new(auth.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "KIS 시세 클라이언트 초기화 실패, 모의 소스로 대체");
            return (Arc::new(SimulatedSource::new()), None);
        }
    };

    let (bridge, event_rx) =
        KisFeedBridge::new(auth, overrides.clone(), ReconnectConfig::default());
    let bridge = Arc::new(bridge);

    // 브리지 연결 루프
    {
        let bridge = bridge.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            bridge.run(cancel).await;
        });
    }

    // 피드 이벤트 어그리게이터
    let status = Broadcaster::new(registry, heartbeat, demand_tx.clone());
    let aggregator = FeedAggregator::new(cache, prices, status, demand_tx);
    start_aggregator(aggregator, event_rx, cancel);

    info!("KIS 실시간 브리지 시작됨");
    (quote_client, Some(bridge))
}
