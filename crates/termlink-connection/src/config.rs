use std::time::Duration;

use termlink_transport::{StreamOptions, DEFAULT_CONTROL_PORT};

/// Connection behavior and timing.
///
/// The settle intervals give the terminal time to set up its side of the
/// connection. Their values were found empirically; nothing in the protocol
/// depends on their exact length.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// TCP port of the terminal's remote interface.
    pub port: u16,
    /// Socket options for the TCP stream.
    pub stream: StreamOptions,
    /// Pause between starting the receiver and sending the registration frame.
    pub registration_settle: Duration,
    /// Pause after the registration frame before the connection is handed out.
    pub post_registration_settle: Duration,
    /// How long `disconnect` waits for the terminal to acknowledge the unregister request.
    pub unregister_timeout: Duration,
    /// Timeout used by waits that do not pass one. `None` waits forever.
    pub default_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_CONTROL_PORT,
            stream: StreamOptions::default(),
            registration_settle: Duration::from_millis(400),
            post_registration_settle: Duration::from_millis(800),
            unregister_timeout: Duration::from_secs(2),
            default_timeout: None,
        }
    }
}

impl ConnectionConfig {
    /// Override the control port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override both settle intervals.
    pub fn with_settle(mut self, registration: Duration, post_registration: Duration) -> Self {
        self.registration_settle = registration;
        self.post_registration_settle = post_registration;
        self
    }

    /// Override the default wait timeout.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_terminal_expectations() {
        let config = ConnectionConfig::default();
        assert_eq!(config.port, 260);
        assert_eq!(config.registration_settle, Duration::from_millis(400));
        assert_eq!(config.post_registration_settle, Duration::from_millis(800));
        assert!(config.default_timeout.is_none());
        assert!(config.stream.nodelay);
    }

    #[test]
    fn builders_override_fields() {
        let config = ConnectionConfig::default()
            .with_port(4000)
            .with_settle(Duration::ZERO, Duration::from_millis(5))
            .with_default_timeout(Some(Duration::from_secs(3)));

        assert_eq!(config.port, 4000);
        assert_eq!(config.registration_settle, Duration::ZERO);
        assert_eq!(config.post_registration_settle, Duration::from_millis(5));
        assert_eq!(config.default_timeout, Some(Duration::from_secs(3)));
    }
}
