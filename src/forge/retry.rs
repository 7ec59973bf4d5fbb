use std::time::Duration;

use crate::error::ControlPlaneError;

/// Cross-cutting retry behaviour for outbound forge calls, expressed as a
/// small policy object rather than a language-level annotation (spec §9,
/// "decorator-based retry"). `classify` is a pure function over an HTTP
/// status code and an optional `Retry-After` header, so it is unit-testable
/// without ever making a request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    Ok,
    RetryAfter(Duration),
    Backoff,
    Fail,
}

impl RetryPolicy {
    /// Classifies a forge HTTP response by status code.
    ///
    /// - 2xx: `Ok`.
    /// - 403: `RetryAfter` (honouring the header when present) or `Backoff`
    ///   when the header is absent.
    /// - 500/502/503/504: `Backoff`.
    /// - anything else: `Fail` (non-retriable).
    pub fn classify(status: u16, retry_after_header: Option<u64>) -> Classification {
        match status {
            200..=299 => Classification::Ok,
            403 => match retry_after_header {
                Some(secs) => Classification::RetryAfter(Duration::from_secs(secs)),
                None => Classification::Backoff,
            },
            500 | 502 | 503 | 504 => Classification::Backoff,
            _ => Classification::Fail,
        }
    }

    /// Exponential delay for a given (1-indexed) attempt: `backoff^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.base_backoff.powi(attempt as i32))
    }

    /// Maps a terminal non-2xx outcome into the appropriate typed error.
    ///
    /// `classify` above distinguishes 403/5xx (retry) from other 4xx (fail
    /// outright), but once retries are exhausted every terminal outcome —
    /// rate-limited, server error, or non-retriable client error — surfaces
    /// the same way: `ForgeClientError` (spec §7).
    pub fn terminal_error(status: u16, body: String) -> ControlPlaneError {
        ControlPlaneError::ForgeClientError { status, body }
    }
}
