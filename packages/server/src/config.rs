//! Hub configuration.

use std::time::Duration;

use clap::ValueEnum;
use thiserror::Error;

/// What the registry does with a member whose outbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OverflowPolicy {
    /// Skip this one message for that member and log a warning
    #[default]
    Drop,
    /// Evict the slow member; its socket is closed
    Evict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("history limit must be between 1 and {max}, got {got}", max = HubConfig::MAX_HISTORY_LIMIT)]
    HistoryLimitOutOfRange { got: usize },

    #[error("outbound capacity must be at least 1")]
    ZeroOutboundCapacity,

    #[error("ping interval ({ping:?}) must be shorter than the read timeout ({read:?})")]
    PingNotBeforeReadTimeout { ping: Duration, read: Duration },
}

/// Tunables of the connection hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Frames each connection can have queued before fan-out starts dropping
    pub outbound_capacity: usize,
    /// A connection that sends no pong for this long is dropped
    pub read_timeout: Duration,
    /// Interval between liveness pings; shorter than `read_timeout`
    pub ping_interval: Duration,
    /// Upper bound on a single socket write
    pub write_timeout: Duration,
    /// Messages delivered in the `history` event after a join
    pub history_limit: usize,
    /// Largest inbound frame accepted, in bytes
    pub max_message_size: usize,
    pub overflow_policy: OverflowPolicy,
}

impl HubConfig {
    pub const MAX_HISTORY_LIMIT: usize = 100;

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.history_limit == 0 || self.history_limit > Self::MAX_HISTORY_LIMIT {
            return Err(ConfigError::HistoryLimitOutOfRange {
                got: self.history_limit,
            });
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::ZeroOutboundCapacity);
        }
        if self.ping_interval >= self.read_timeout {
            return Err(ConfigError::PingNotBeforeReadTimeout {
                ping: self.ping_interval,
                read: self.read_timeout,
            });
        }
        Ok(self)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 256,
            read_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(54),
            write_timeout: Duration::from_secs(10),
            history_limit: 50,
            max_message_size: 512 * 1024,
            overflow_policy: OverflowPolicy::Drop,
        }
    }
}
