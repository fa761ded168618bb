//! KIS OAuth 인증.
//!
//! - 접근 토큰 (POST /oauth2/tokenP) — REST 시세 조회에 사용
//! - WebSocket 접속 키 (POST /oauth2/Approval) — 실시간 구독에 사용
//!
//! 토큰은 만료 5분 전까지 캐시되어 재사용됩니다. KIS는 토큰 발급에
//! 분당 한도가 있으므로 매 요청마다 재발급하면 안 됩니다.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{error, info};

use super::config::KisConfig;
use crate::ExchangeError;

/// 만료 임박 판정 여유 시간 (초).
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 300;

/// 토큰 발급 응답.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: i64,
}

/// WebSocket 접속키 발급 응답.
#[derive(Debug, Deserialize)]
struct ApprovalResponse {
    approval_key: String,
}

/// 발급된 토큰 상태.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenState {
    /// 접근 토큰
    pub access_token: String,
    /// 토큰 유형 (일반적으로 "Bearer")
    pub token_type: String,
    /// 만료 시각
    pub expires_at: DateTime<Utc>,
}

impl TokenState {
    /// 만료되었거나 임박했는지 확인.
    pub fn is_expired_or_expiring(&self) -> bool {
        Utc::now() + chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) >= self.expires_at
    }

    /// Authorization 헤더 값 생성.
    pub fn auth_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

/// KIS OAuth 관리자.
pub struct KisAuth {
    config: KisConfig,
    client: reqwest::Client,
    token: RwLock<Option<TokenState>>,
    websocket_key: RwLock<Option<String>>,
}

impl KisAuth {
    /// 새로운 인증 관리자 생성.
    pub fn new(config: KisConfig) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        Ok(Self {
            config,
            client,
            token: RwLock::new(None),
            websocket_key: RwLock::new(None),
        })
    }

    /// 유효한 접근 토큰 반환 (필요 시 재발급).
    pub async fn get_token(&self) -> Result<TokenState, ExchangeError> {
        {
            let token = self.token.read().await;
            if let Some(state) = token.as_ref() {
                if !state.is_expired_or_expiring() {
                    return Ok(state.clone());
                }
            }
        }

        self.refresh_token().await
    }

    /// 접근 토큰 재발급.
    pub async fn refresh_token(&self) -> Result<TokenState, ExchangeError> {
        if self.config.app_key.is_empty() || self.config.app_secret.is_empty() {
            return Err(ExchangeError::Unauthorized(
                "KIS_APP_KEY / KIS_APP_SECRET 환경변수가 설정되지 않았습니다".to_string(),
            ));
        }

        info!(
            "Requesting new KIS access token... (AppKey: {}...)",
            self.config.app_key.chars().take(8).collect::<String>()
        );

        let url = format!("{}/oauth2/tokenP", self.config.rest_base_url());

        #[derive(Serialize)]
        struct TokenRequest {
            grant_type: String,
            appkey: String,
            appsecret: String,
        }

        let request_body = TokenRequest {
            grant_type: "client_credentials".to_string(),
            appkey: self.config.app_key.clone(),
            appsecret: self.config.app_secret.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("Token request failed: {} - {}", status, body);
            return Err(ExchangeError::Unauthorized(format!(
                "토큰 발급 실패 ({}): {}",
                status, body
            )));
        }

        let token_resp: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ExchangeError::ParseError(format!("Failed to parse token response: {}", e)))?;

        let state = TokenState {
            access_token: token_resp.access_token,
            token_type: token_resp.token_type,
            expires_at: Utc::now() + chrono::Duration::seconds(token_resp.expires_in),
        };

        {
            let mut token = self.token.write().await;
            *token = Some(state.clone());
        }

        info!(expires_at = %state.expires_at, "KIS access token obtained");
        Ok(state)
    }

    /// WebSocket 접속키 반환 (캐시 우선).
    pub async fn get_websocket_key(&self) -> Result<String, ExchangeError> {
        {
            let key = self.websocket_key.read().await;
            if let Some(key) = key.as_ref() {
                return Ok(key.clone());
            }
        }

        info!("Requesting WebSocket approval key...");

        let url = format!("{}/oauth2/Approval", self.config.rest_base_url());

        #[derive(Serialize)]
        struct ApprovalRequest {
            grant_type: String,
            appkey: String,
            secretkey: String,
        }

        let request_body = ApprovalRequest {
            grant_type: "client_credentials".to_string(),
            appkey: self.config.app_key.clone(),
            secretkey: self.config.app_secret.clone(),
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("WebSocket approval failed: {} - {}", status, body);
            return Err(ExchangeError::Unauthorized(format!(
                "WebSocket 접속키 발급 실패 ({}): {}",
                status, body
            )));
        }

        let approval_resp: ApprovalResponse = serde_json::from_str(&body).map_err(|e| {
            ExchangeError::ParseError(format!("Failed to parse approval response: {}", e))
        })?;

        {
            let mut key_guard = self.websocket_key.write().await;
            *key_guard = Some(approval_resp.approval_key.clone());
        }

        info!("WebSocket approval key obtained");
        Ok(approval_resp.approval_key)
    }

    /// 캐시된 WebSocket 접속키 초기화 (재연결 시 재발급 필요).
    pub async fn clear_websocket_key(&self) {
        let mut key = self.websocket_key.write().await;
        *key = None;
    }

    /// REST 요청용 공통 헤더 생성.
    pub async fn build_headers(
        &self,
        tr_id: &str,
    ) -> Result<reqwest::header::HeaderMap, ExchangeError> {
        let token = self.get_token().await?;

        let mut headers = reqwest::header::HeaderMap::new();

        // 상수 문자열은 컴파일 타임에 검증되므로 unwrap() 안전
        headers.insert(
            "Content-Type",
            "application/json; charset=utf-8".parse().unwrap(),
        );

        headers.insert(
            "authorization",
            token.auth_header().parse().map_err(|_| {
                ExchangeError::ParseError("authorization 헤더에 유효하지 않은 문자 포함".to_string())
            })?,
        );
        headers.insert(
            "appkey",
            self.config.app_key.parse().map_err(|_| {
                ExchangeError::ParseError("app_key에 유효하지 않은 문자 포함".to_string())
            })?,
        );
        headers.insert(
            "appsecret",
            self.config.app_secret.parse().map_err(|_| {
                ExchangeError::ParseError("app_secret에 유효하지 않은 문자 포함".to_string())
            })?,
        );
        headers.insert(
            "tr_id",
            tr_id.parse().map_err(|_| {
                ExchangeError::ParseError(format!("tr_id에 유효하지 않은 문자 포함: {}", tr_id))
            })?,
        );

        Ok(headers)
    }

    /// 설정 반환.
    pub fn config(&self) -> &KisConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::kis::config::KisEnvironment;

    fn test_config(base_url: &str) -> KisConfig {
        KisConfig::new("test_app_key".into(), "test_app_secret".into(), KisEnvironment::Paper)
            .with_rest_url(base_url)
    }

    #[test]
    fn test_token_expiry_margin() {
        let fresh = TokenState {
            access_token: "t".into(),
            token_type: "Bearer".into(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
        };
        assert!(!fresh.is_expired_or_expiring());

        let expiring = TokenState {
            access_token: "t".into(),
            token_type: "Bearer".into(),
            expires_at: Utc::now() + chrono::Duration::seconds(60),
        };
        assert!(expiring.is_expired_or_expiring());
    }

    #[test]
    fn test_auth_header_format() {
        let token = TokenState {
            access_token: "abc123".into(),
            token_type: "Bearer".into(),
            expires_at: Utc::now(),
        };
        assert_eq!(token.auth_header(), "Bearer abc123");
    }

    #[tokio::test]
    async fn test_get_websocket_key_caches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/Approval")
            .with_status(200)
            .with_body(r#"{"approval_key":"key-123"}"#)
            .expect(1)
            .create_async()
            .await;

        let auth = KisAuth::new(test_config(&server.url())).unwrap();

        let key1 = auth.get_websocket_key().await.unwrap();
        let key2 = auth.get_websocket_key().await.unwrap();

        assert_eq!(key1, "key-123");
        assert_eq!(key2, "key-123");
        // 두 번째 호출은 캐시 사용
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_clear_websocket_key_forces_reissue() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/Approval")
            .with_status(200)
            .with_body(r#"{"approval_key":"key-123"}"#)
            .expect(2)
            .create_async()
            .await;

        let auth = KisAuth::new(test_config(&server.url())).unwrap();

        auth.get_websocket_key().await.unwrap();
        auth.clear_websocket_key().await;
        auth.get_websocket_key().await.unwrap();

        mock.assert_async().await;
    }
}
