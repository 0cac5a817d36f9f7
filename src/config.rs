use std::time::Duration;

/// Window sizes and timer knobs for a [`crate::connection::ConnectionState`].
/// Built once at construction and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Total bytes the sender may have outstanding (unacked + unsent) at once.
    pub send_window: u32,
    /// Total bytes the receiver may buffer ahead of delivery to the application.
    pub recv_window: u32,
    /// Elapsed time, per segment, before it is considered lost and resent.
    pub rt_timeout: Duration,
    /// Number of retransmits tolerated before the connection is torn down.
    pub max_retransmits: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            send_window: 64 * 1024,
            recv_window: 64 * 1024,
            rt_timeout: Duration::from_millis(300),
            max_retransmits: 5,
        }
    }
}
