use std::time::Duration;

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Per-connection tuning shared by every session of a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// How often a liveness probe is queued on each connection.
    pub keepalive_interval: Duration,
    /// Upper bound on a single socket write and on waiting for queue room.
    pub send_timeout: Duration,
    /// Frames a connection may have queued before broadcasts to it drop.
    pub outbound_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.keepalive_interval, Duration::from_secs(1));
        assert!(config.send_timeout > config.keepalive_interval);
        assert!(config.outbound_capacity > 0);
    }
}
