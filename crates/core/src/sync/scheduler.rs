//! Scheduler constants for the background sync loop.

/// Foreground sync cadence in seconds.
pub const SYNC_FOREGROUND_INTERVAL_SECS: u64 = 45;

/// Maximum jitter (seconds) added to periodic cycle intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 5;

/// Delay before the next cycle when unsynced records are waiting.
pub const SYNC_PENDING_WORK_DELAY_MS: u64 = 2_000;

/// Delay before the next cycle after the backend asked for re-authentication.
pub const SYNC_REAUTH_RETRY_SECS: i64 = 30;

/// How many times a push is re-run immediately when a newer local edit
/// landed while it was in flight.
pub const SYNC_MAX_PUSH_PASSES: usize = 3;
