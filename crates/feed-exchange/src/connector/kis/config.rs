//! 한국투자증권 (KIS) API 설정.
//!
//! KIS API는 app_key와 app_secret을 사용한 OAuth 2.0 인증이 필요합니다.

use serde::{Deserialize, Serialize};

/// KIS API 환경 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KisEnvironment {
    /// 실전투자
    Real,
    /// 모의투자
    Paper,
}

impl KisEnvironment {
    /// 이 환경의 REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &str {
        match self {
            KisEnvironment::Real => "https://openapi.koreainvestment.com:9443",
            KisEnvironment::Paper => "https://openapivts.koreainvestment.com:29443",
        }
    }

    /// 이 환경의 WebSocket URL 반환.
    pub fn websocket_url(&self) -> &str {
        match self {
            KisEnvironment::Real => "ws://ops.koreainvestment.com:21000",
            KisEnvironment::Paper => "ws://ops.koreainvestment.com:31000",
        }
    }

    /// 문자열에서 파싱.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "real" => Some(KisEnvironment::Real),
            "paper" | "mock" | "test" => Some(KisEnvironment::Paper),
            _ => None,
        }
    }
}

impl Default for KisEnvironment {
    fn default() -> Self {
        KisEnvironment::Paper
    }
}

/// KIS API 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KisConfig {
    /// 앱키
    pub app_key: String,
    /// 앱시크릿
    pub app_secret: String,
    /// 환경 (실전/모의)
    pub environment: KisEnvironment,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// REST URL 오버라이드 (테스트용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_url_override: Option<String>,
    /// WebSocket URL 오버라이드 (테스트용)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url_override: Option<String>,
}

impl KisConfig {
    /// 새로운 KIS 설정 생성.
    pub fn new(app_key: String, app_secret: String, environment: KisEnvironment) -> Self {
        Self {
            app_key,
            app_secret,
            environment,
            timeout_secs: 30,
            rest_url_override: None,
            ws_url_override: None,
        }
    }

    /// 환경 변수에서 설정 로드.
    ///
    /// # 환경변수
    ///
    /// - `KIS_APP_KEY`: 앱 키
    /// - `KIS_APP_SECRET`: 앱 시크릿
    /// - `KIS_ENVIRONMENT`: "real" | "paper" (기본값: paper)
    ///
    /// 키/시크릿이 없으면 `None`을 반환합니다.
    pub fn from_env() -> Option<Self> {
        let app_key = std::env::var("KIS_APP_KEY").ok()?;
        let app_secret = std::env::var("KIS_APP_SECRET").ok()?;

        if app_key.is_empty() || app_secret.is_empty() {
            return None;
        }

        let environment = std::env::var("KIS_ENVIRONMENT")
            .ok()
            .and_then(|s| KisEnvironment::parse(&s))
            .unwrap_or_default();

        Some(Self::new(app_key, app_secret, environment))
    }

    /// REST API 기본 URL.
    pub fn rest_base_url(&self) -> &str {
        self.rest_url_override
            .as_deref()
            .unwrap_or_else(|| self.environment.rest_base_url())
    }

    /// WebSocket URL.
    pub fn websocket_url(&self) -> &str {
        self.ws_url_override
            .as_deref()
            .unwrap_or_else(|| self.environment.websocket_url())
    }

    /// REST URL 오버라이드 설정 (테스트용).
    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url_override = Some(url.into());
        self
    }

    /// WebSocket URL 오버라이드 설정 (테스트용).
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url_override = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_urls() {
        assert!(KisEnvironment::Real.rest_base_url().contains("9443"));
        assert!(KisEnvironment::Paper.rest_base_url().contains("29443"));
        assert!(KisEnvironment::Real.websocket_url().starts_with("ws://"));
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(KisEnvironment::parse("real"), Some(KisEnvironment::Real));
        assert_eq!(KisEnvironment::parse("PAPER"), Some(KisEnvironment::Paper));
        assert_eq!(KisEnvironment::parse("unknown"), None);
    }

    #[test]
    fn test_url_override() {
        let config = KisConfig::new("key".into(), "secret".into(), KisEnvironment::Paper)
            .with_rest_url("http://localhost:8080");

        assert_eq!(config.rest_base_url(), "http://localhost:8080");
        assert!(config.websocket_url().contains("31000"));
    }
}
