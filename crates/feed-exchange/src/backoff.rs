//! 재연결 백오프 정책.
//!
//! 지수 증가 + 지터, 상한이 있는 재연결 대기 시간을 계산합니다.

use std::time::Duration;

use rand::Rng;

/// 재연결 백오프 설정.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// 첫 재연결 시도 전 대기 시간
    pub initial_delay: Duration,
    /// 재연결 시도 간 최대 대기 시간
    pub max_delay: Duration,
    /// 지수 배율 (2.0이면 시도마다 두 배)
    pub multiplier: f64,
    /// 지터 비율 (0.1 = ±10%)
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

/// 지수 백오프 재연결 정책.
///
/// 시도 횟수 제한은 두지 않습니다. 업스트림이 복구될 때까지 상한
/// 간격으로 계속 재시도하며, 연결에 성공하면 [`reset`](Self::reset)으로
/// 초기화합니다.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// 새 재연결 정책 생성.
    pub fn new(config: ReconnectConfig) -> Self {
        let initial_delay = config.initial_delay;
        Self {
            config,
            current_delay: initial_delay,
            attempt_count: 0,
        }
    }

    /// 다음 대기 시간 반환 (지수 증가 + 지터 적용).
    pub fn next_delay(&mut self) -> Duration {
        self.attempt_count += 1;

        let delay = self.apply_jitter(self.current_delay);

        // 다음 시도를 위해 증가, 상한 적용
        let next = self.current_delay.as_secs_f64() * self.config.multiplier;
        self.current_delay = Duration::from_secs_f64(next.min(self.config.max_delay.as_secs_f64()));

        delay.min(self.config.max_delay)
    }

    /// 연결 성공 후 초기화.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempt_count = 0;
    }

    /// 현재까지의 시도 횟수.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }

        let jitter_range = delay.as_secs_f64() * self.config.jitter_factor;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }
}
