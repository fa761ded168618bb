//! 종목코드 분류.
//!
//! 종목코드의 형태로 카테고리와 실시간(push) 수신 가능 여부를 판정합니다.
//!
//! # 분류 규칙
//!
//! - 6자리 숫자 (예: "005930") → 표준 주식, 실시간 수신 가능
//! - 6자리이지만 영문자 포함 (예: "0015N0") → ELW 등 파생상품, 폴링 전용
//! - 그 외 길이 (예: 10자리 장외 코드) → 미지원, 구독 거부
//!
//! 숫자로만 구성된 파생상품 코드는 형태만으로 구분할 수 없으므로
//! [`ClassifierOverrides`]를 통해 설정에서 강제 분류할 수 있습니다.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::error::{FeedError, FeedResult};

/// 종목코드 길이 (국내 표준).
const CODE_LEN: usize = 6;

/// 종목 카테고리.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentCategory {
    /// 표준 주식 (6자리 숫자)
    Equity,
    /// ELW 등 파생상품 (실시간 미지원)
    Derivative,
}

/// 종목코드 분류 결과.
///
/// 세션 중 종목의 카테고리가 바뀌는 일은 없으므로 불변 값으로 취급하며,
/// 호출 측에서 자유롭게 캐시해도 됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentClassification {
    /// 카테고리
    pub category: InstrumentCategory,
    /// 실시간(push) 수신 가능 여부
    pub push_capable: bool,
}

impl InstrumentClassification {
    /// 표준 주식 분류.
    pub fn equity() -> Self {
        Self {
            category: InstrumentCategory::Equity,
            push_capable: true,
        }
    }

    /// 파생상품 분류.
    pub fn derivative() -> Self {
        Self {
            category: InstrumentCategory::Derivative,
            push_capable: false,
        }
    }
}

/// 설정 기반 강제 분류 테이블.
///
/// 숫자로만 구성된 파생상품 코드를 폴링 전용으로 강제 분류합니다.
/// 코드 형태 휴리스틱보다 먼저 조회됩니다.
#[derive(Debug, Clone, Default)]
pub struct ClassifierOverrides {
    derivative_codes: HashSet<String>,
}

impl ClassifierOverrides {
    /// 설정에서 생성.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            derivative_codes: config.derivative_codes.iter().cloned().collect(),
        }
    }

    /// 강제 파생상품 분류 대상인지 확인.
    pub fn is_forced_derivative(&self, code: &str) -> bool {
        self.derivative_codes.contains(code)
    }
}

/// 종목코드를 분류합니다.
///
/// 순수 함수이며 부수 효과가 없습니다.
///
/// # Errors
///
/// 6자리가 아닌 코드와 영숫자 이외의 문자가 포함된 코드는
/// [`FeedError::InvalidInput`]으로 거부됩니다.
///
/// # 예제
///
/// ```
/// use feed_core::instrument::{classify, InstrumentCategory};
///
/// let samsung = classify("005930").unwrap();
/// assert_eq!(samsung.category, InstrumentCategory::Equity);
/// assert!(samsung.push_capable);
///
/// let elw = classify("0015N0").unwrap();
/// assert_eq!(elw.category, InstrumentCategory::Derivative);
/// assert!(!elw.push_capable);
///
/// assert!(classify("0152301010").is_err());
/// ```
pub fn classify(code: &str) -> FeedResult<InstrumentClassification> {
    if code.len() != CODE_LEN {
        return Err(FeedError::InvalidInput(format!(
            "지원하지 않는 종목코드 형식: {} ({}자리)",
            code,
            code.len()
        )));
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FeedError::InvalidInput(format!(
            "종목코드에 허용되지 않는 문자 포함: {}",
            code
        )));
    }

    if code.chars().all(|c| c.is_ascii_digit()) {
        Ok(InstrumentClassification::equity())
    } else {
        // 영문자가 섞인 6자리 코드는 ELW 등 파생상품
        Ok(InstrumentClassification::derivative())
    }
}

/// 강제 분류 테이블을 반영하여 종목코드를 분류합니다.
pub fn classify_with_overrides(
    code: &str,
    overrides: &ClassifierOverrides,
) -> FeedResult<InstrumentClassification> {
    if code.len() == CODE_LEN && overrides.is_forced_derivative(code) {
        return Ok(InstrumentClassification::derivative());
    }
    classify(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_classify_equity() {
        let result = classify("005930").unwrap();
        assert_eq!(result.category, InstrumentCategory::Equity);
        assert!(result.push_capable);

        let result = classify("000660").unwrap();
        assert_eq!(result.category, InstrumentCategory::Equity);
    }

    #[test]
    fn test_classify_derivative() {
        let result = classify("0015N0").unwrap();
        assert_eq!(result.category, InstrumentCategory::Derivative);
        assert!(!result.push_capable);
    }

    #[test]
    fn test_classify_rejects_wrong_length() {
        // 10자리 장외 코드
        assert!(classify("0152301010").is_err());
        assert!(classify("00593").is_err());
        assert!(classify("").is_err());
    }

    #[test]
    fn test_classify_rejects_non_alphanumeric() {
        assert!(classify("00-930").is_err());
        assert!(classify("00 930").is_err());
    }

    #[test]
    fn test_forced_derivative_override() {
        let config = ClassifierConfig::from_csv("580001");
        let overrides = ClassifierOverrides::from_config(&config);

        // 숫자로만 구성됐지만 강제 분류 대상
        let result = classify_with_overrides("580001", &overrides).unwrap();
        assert_eq!(result.category, InstrumentCategory::Derivative);
        assert!(!result.push_capable);

        // 테이블에 없는 코드는 기본 규칙
        let result = classify_with_overrides("005930", &overrides).unwrap();
        assert_eq!(result.category, InstrumentCategory::Equity);
    }

    proptest! {
        /// 6자리 숫자 코드는 항상 실시간 수신 가능한 주식으로 분류된다.
        #[test]
        fn prop_numeric_six_digit_is_equity(code in "[0-9]{6}") {
            let result = classify(&code).unwrap();
            prop_assert_eq!(result.category, InstrumentCategory::Equity);
            prop_assert!(result.push_capable);
        }

        /// 영문자가 하나라도 포함된 6자리 코드는 폴링 전용 파생상품이다.
        #[test]
        fn prop_six_char_with_letter_is_derivative(
            code in "[0-9A-Z]{6}"
        ) {
            prop_assume!(code.chars().any(|c| c.is_ascii_alphabetic()));
            let result = classify(&code).unwrap();
            prop_assert_eq!(result.category, InstrumentCategory::Derivative);
            prop_assert!(!result.push_capable);
        }

        /// 6자리가 아닌 코드는 항상 거부된다.
        #[test]
        fn prop_wrong_length_rejected(code in "[0-9A-Z]{1,12}") {
            prop_assume!(code.len() != 6);
            prop_assert!(classify(&code).is_err());
        }
    }
}
