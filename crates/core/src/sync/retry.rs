//! Retry classification, backoff and cycle metrics for the sync coordinator.

use serde::{Deserialize, Serialize};

/// Retry policy classification for gateway failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Outcome of one sync cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleStatus {
    /// Every push and pull succeeded.
    Ok,
    /// Pulls succeeded but some records could not be pushed.
    Partial,
    /// The backend could not be listed; local data is served as-is.
    Failed,
    /// Skipped because connectivity is unavailable.
    Offline,
}

/// Lightweight cycle metrics emitted by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCycleMetrics {
    pub pushed_count: usize,
    pub pulled_count: usize,
    pub failed_count: usize,
    pub duration_ms: i64,
    pub status: SyncCycleStatus,
}

/// Maps a backend status onto the retry policy. 404/410 land in
/// `Permanent`; a delete treats them as "already gone" before this applies.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 | 500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// Seconds the coordinator waits after `consecutive_failures` failed cycles:
/// 5s doubled per failure, at most 2^8 times.
pub fn backoff_seconds(consecutive_failures: i32) -> i64 {
    const BASE_DELAY_SECS: i64 = 5;
    const MAX_DOUBLINGS: u32 = 8;

    let doublings = consecutive_failures.max(0).unsigned_abs().min(MAX_DOUBLINGS);
    BASE_DELAY_SECS << doublings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_records_are_not_retried_as_transient() {
        assert_eq!(classify_http_status(404), SyncRetryClass::Permanent);
        assert_eq!(classify_http_status(410), SyncRetryClass::Permanent);
        assert_eq!(classify_http_status(422), SyncRetryClass::Permanent);
    }

    #[test]
    fn contention_and_outages_are_retryable() {
        for status in [408, 409, 423, 425, 429, 500, 503, 599] {
            assert_eq!(classify_http_status(status), SyncRetryClass::Retryable, "{status}");
        }
        assert_eq!(classify_http_status(403), SyncRetryClass::ReauthRequired);
    }

    #[test]
    fn first_failed_cycle_waits_ten_seconds() {
        // The coordinator bumps the failure count before asking for a delay.
        assert_eq!(backoff_seconds(1), 10);
        assert_eq!(backoff_seconds(3), 40);
        assert_eq!(backoff_seconds(8), 1_280);
        assert_eq!(backoff_seconds(50), 1_280);
        assert_eq!(backoff_seconds(-2), 5);
    }

    #[test]
    fn cycle_status_serializes_snake_case() {
        let json = serde_json::to_string(&SyncCycleStatus::Partial).expect("serialize status");
        assert_eq!(json, "\"partial\"");
    }
}
