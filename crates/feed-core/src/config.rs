//! 설정 관리.
//!
//! 이 모듈은 애플리케이션 설정을 정의하고 관리합니다.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
    /// 하트비트 설정
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// 폴링 폴백 설정
    #[serde(default)]
    pub polling: PollingConfig,
    /// 시세 캐시 설정
    #[serde(default)]
    pub cache: CacheConfig,
    /// 종목 분류 설정
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 연결당 송신 버퍼 크기 (메시지 수)
    ///
    /// 버퍼가 가득 찬 느린 클라이언트는 연결이 끊깁니다.
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,
}

fn default_send_buffer() -> usize {
    256
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            send_buffer: default_send_buffer(),
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 하트비트 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HeartbeatConfig {
    /// Ping 전송 간격 (초)
    pub ping_interval_secs: u64,
    /// 마지막 pong 이후 이 시간이 지나면 연결 제거 (초)
    pub timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            timeout_secs: 90,
        }
    }
}

impl HeartbeatConfig {
    /// Ping 간격을 Duration으로 반환.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// 타임아웃을 Duration으로 반환.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 폴링 폴백 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    /// 폴링 주기 (초)
    pub interval_secs: u64,
    /// 종목당 조회 타임아웃 (초)
    pub fetch_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            fetch_timeout_secs: 3,
        }
    }
}

impl PollingConfig {
    /// 폴링 주기를 Duration으로 반환.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// 조회 타임아웃을 Duration으로 반환.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// 시세 캐시 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// 시세 스냅샷 TTL (초)
    pub price_ttl_secs: u64,
    /// 만료 엔트리 정리 주기 (초)
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            price_ttl_secs: 3,
            purge_interval_secs: 60,
        }
    }
}

impl CacheConfig {
    /// TTL을 Duration으로 반환.
    pub fn price_ttl(&self) -> Duration {
        Duration::from_secs(self.price_ttl_secs)
    }

    /// 정리 주기를 Duration으로 반환.
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

/// 종목 분류 설정.
///
/// 숫자로만 구성된 파생상품 코드는 코드 형태만으로는 일반 주식과 구분할 수
/// 없으므로, 강제로 파생상품(폴링 전용)으로 분류할 코드 목록을 설정으로
/// 받습니다.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// 파생상품으로 강제 분류할 종목코드 목록
    #[serde(default)]
    pub derivative_codes: Vec<String>,
}

impl ClassifierConfig {
    /// 쉼표로 구분된 환경변수 값에서 생성.
    pub fn from_csv(csv: &str) -> Self {
        Self {
            derivative_codes: csv
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            // 기본값으로 시작
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("FEED")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> Result<Self, config::ConfigError> {
        Self::load("config/default.toml")
    }
}
