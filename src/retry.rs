//! セッションストア呼び出しのタイムアウトと有限回リトライ。

use std::future::Future;
use std::time::Duration;

use serde::Deserialize;

use crate::error::SessionError;

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    1_000
}

/// RetryConfig はストア呼び出しのリトライ方針。`max_attempts = 1` はリトライなし。
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// `attempt` 回目（0 始まり）の失敗後に待つ時間。指数バックオフで上限あり。
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let base = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let capped = base.min(self.max_delay_ms);
        let delay_ms = if self.jitter && capped > 0 {
            let range = capped / 10;
            capped - range + rand::random::<u64>() % (range * 2 + 1)
        } else {
            capped
        };
        Duration::from_millis(delay_ms)
    }
}

/// 1 回ごとにタイムアウトを掛けて操作を実行し、失敗したら方針に従ってリトライする。
///
/// 呼び出し元の Future が破棄された時点で実行中の操作も破棄される。
pub async fn with_timeout_and_retry<F, Fut, T>(
    config: &RetryConfig,
    timeout: Duration,
    mut operation: F,
) -> Result<T, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    let attempts = config.max_attempts.max(1);
    let mut last_error = SessionError::Timeout;
    for attempt in 0..attempts {
        let result = match tokio::time::timeout(timeout, operation()).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout),
        };
        match result {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(
                    "セッションストア呼び出し失敗 {}/{}: {}",
                    attempt + 1,
                    attempts,
                    e
                );
                last_error = e;
                if attempt + 1 < attempts {
                    tokio::time::sleep(config.compute_delay(attempt)).await;
                }
            }
        }
    }
    Err(last_error)
}
