//! KIS REST 시세 조회 클라이언트.
//!
//! 폴링 폴백 경로의 풀 데이터 소스입니다. 실시간 미지원 종목(ELW 등)과
//! 업스트림 장애 구간의 시세는 이 클라이언트로 조회합니다.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, error};

use feed_core::PriceSnapshot;

use super::auth::KisAuth;
use super::tr_id;
use crate::traits::{ExchangeResult, SnapshotSource};
use crate::ExchangeError;

/// KIS 현재가 응답.
#[derive(Debug, Deserialize)]
struct KisPriceResponse {
    rt_cd: String,
    #[serde(default)]
    msg_cd: String,
    #[serde(default)]
    msg1: String,
    output: Option<KisPriceOutput>,
}

/// 현재가 응답 본문.
#[derive(Debug, Deserialize)]
struct KisPriceOutput {
    /// 주식 현재가
    #[serde(rename = "stck_prpr")]
    price: String,
    /// 전일 대비
    #[serde(rename = "prdy_vrss")]
    change: String,
    /// 전일 대비율
    #[serde(rename = "prdy_ctrt")]
    change_rate: String,
    /// 누적 거래량
    #[serde(rename = "acml_vol")]
    volume: String,
}

/// KIS REST 시세 조회 클라이언트.
pub struct KisQuoteClient {
    auth: Arc<KisAuth>,
    client: reqwest::Client,
}

impl KisQuoteClient {
    /// 새로운 시세 조회 클라이언트 생성.
    pub fn new(auth: Arc<KisAuth>) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(auth.config().timeout_secs))
            .build()
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        Ok(Self { auth, client })
    }

    /// 주식현재가 시세 조회.
    ///
    /// # 인자
    /// * `stock_code` - 종목코드 (예: "005930" 삼성전자)
    pub async fn get_price(&self, stock_code: &str) -> Result<PriceSnapshot, ExchangeError> {
        let url = format!(
            "{}/uapi/domestic-stock/v1/quotations/inquire-price",
            self.auth.config().rest_base_url()
        );

        let headers = self.auth.build_headers(tr_id::KR_PRICE).await?;

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(&[("FID_COND_MRKT_DIV_CODE", "J"), ("FID_INPUT_ISCD", stock_code)])
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::NetworkError(e.to_string()))?;

        if !status.is_success() {
            error!("KR price inquiry failed: {} - {}", status, body);
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message: body,
            });
        }

        debug!(ticker = %stock_code, "KR price response received");

        let resp: KisPriceResponse = serde_json::from_str(&body).map_err(|e| {
            ExchangeError::ParseError(format!("Failed to parse price response: {}", e))
        })?;

        if resp.rt_cd != "0" {
            return Err(ExchangeError::ApiError {
                code: resp.msg_cd.parse().unwrap_or(-1),
                message: resp.msg1,
            });
        }

        let output = resp
            .output
            .ok_or_else(|| ExchangeError::ParseError("응답에 output 필드 없음".to_string()))?;

        Ok(PriceSnapshot::new(
            stock_code,
            parse_decimal(&output.price)?,
            parse_decimal(&output.change)?,
            parse_decimal(&output.change_rate)?,
            output.volume.parse().unwrap_or(0),
        ))
    }
}

/// KIS 숫자 문자열 파싱.
fn parse_decimal(s: &str) -> Result<Decimal, ExchangeError> {
    s.parse()
        .map_err(|_| ExchangeError::ParseError(format!("숫자 파싱 실패: {}", s)))
}

#[async_trait]
impl SnapshotSource for KisQuoteClient {
    async fn fetch_snapshot(&self, code: &str) -> ExchangeResult<PriceSnapshot> {
        self.get_price(code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::kis::config::{KisConfig, KisEnvironment};
    use rust_decimal_macros::dec;

    fn test_client(base_url: &str) -> KisQuoteClient {
        let config =
            KisConfig::new("test_app_key".into(), "test_app_secret".into(), KisEnvironment::Paper)
                .with_rest_url(base_url);
        KisQuoteClient::new(Arc::new(KisAuth::new(config).unwrap())).unwrap()
    }

    async fn token_mock(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(
                r#"{"access_token":"tok","token_type":"Bearer","expires_in":86400}"#,
            )
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_get_price_parses_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let _price = server
            .mock("GET", "/uapi/domestic-stock/v1/quotations/inquire-price")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("FID_COND_MRKT_DIV_CODE".into(), "J".into()),
                mockito::Matcher::UrlEncoded("FID_INPUT_ISCD".into(), "005930".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"rt_cd":"0","msg_cd":"","msg1":"","output":{"stck_prpr":"70000","prdy_vrss":"500","prdy_ctrt":"0.72","acml_vol":"12345678"}}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let snapshot = client.fetch_snapshot("005930").await.unwrap();

        assert_eq!(snapshot.ticker, "005930");
        assert_eq!(snapshot.price, dec!(70000));
        assert_eq!(snapshot.change, dec!(500));
        assert_eq!(snapshot.change_rate, dec!(0.72));
        assert_eq!(snapshot.volume, 12345678);
    }

    #[tokio::test]
    async fn test_get_price_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _token = token_mock(&mut server).await;
        let _price = server
            .mock("GET", "/uapi/domestic-stock/v1/quotations/inquire-price")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"rt_cd":"1","msg_cd":"40100000","msg1":"조회할 자료가 없습니다","output":null}"#)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let result = client.fetch_snapshot("999999").await;

        assert!(matches!(result, Err(ExchangeError::ApiError { .. })));
    }
}
