//! 시세 배포 시스템의 에러 타입.
//!
//! 이 모듈은 시스템 전반에서 사용되는 에러 타입을 정의합니다.

use thiserror::Error;

/// 핵심 피드 에러.
#[derive(Debug, Error)]
pub enum FeedError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 업스트림 피드 에러
    #[error("업스트림 에러: {0}")]
    Upstream(String),

    /// 구독 에러
    #[error("구독 에러: {0}")]
    Subscription(String),

    /// 네트워크 에러
    #[error("네트워크 에러: {0}")]
    Network(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 요청 한도 초과
    #[error("요청 한도 초과: {0}")]
    RateLimit(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 피드 작업을 위한 Result 타입.
pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// 재시도 가능한 에러인지 확인합니다.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::Network(_) | FeedError::RateLimit(_) | FeedError::Upstream(_))
    }

    /// 클라이언트에게 그대로 전달해도 되는 요청 에러인지 확인합니다.
    pub fn is_client_error(&self) -> bool {
        matches!(self, FeedError::InvalidInput(_) | FeedError::NotFound(_))
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let network_err = FeedError::Network("timeout".to_string());
        assert!(network_err.is_retryable());

        let input_err = FeedError::InvalidInput("bad code".to_string());
        assert!(!input_err.is_retryable());
    }

    #[test]
    fn test_error_client_facing() {
        let input_err = FeedError::InvalidInput("bad code".to_string());
        assert!(input_err.is_client_error());

        let internal_err = FeedError::Internal("oops".to_string());
        assert!(!internal_err.is_client_error());
    }
}
