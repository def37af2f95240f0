/// Wire event names (magic strings layer)
pub mod event_names {
    pub const NOTIFICATION: &str = "notification";
    pub const UNREAD_COUNT: &str = "unread_count";
    pub const CHANNEL_ERROR: &str = "channel_error";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Error-report context for everything originating in this crate
pub const REALTIME_CONTEXT: &str = "realtime";

/// Default handshake timeout (milliseconds)
pub const DEFAULT_HANDSHAKE_TIMEOUT: u64 = 15_000;

/// Default heartbeat interval (milliseconds); 0 disables the probe
pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 25_000;

/// Reconnection backoff bounds (milliseconds)
pub const DEFAULT_BACKOFF_FLOOR: u64 = 1_000;
pub const DEFAULT_BACKOFF_CEILING: u64 = 10_000;

/// Fraction of the base delay added as random jitter
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.3;

/// Duplicate error-report suppression window (milliseconds)
pub const DEFAULT_REPORT_COOLDOWN: u64 = 5_000;
