use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub client: ClientSettings,
    pub log: LogSettings,
}

/// Tuning for the MQTT session opened by `MqttConn::dial`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    pub keep_alive_secs: u64,
    /// Capacity of the rumqttc request channel.
    pub request_capacity: usize,
    pub connect_timeout_ms: u64,
    /// Grace period handed to the session on close.
    pub disconnect_grace_ms: u64,
    /// Pause between event loop polls after a connection error.
    pub reconnect_delay_ms: u64,
}

impl ClientSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn disconnect_grace(&self) -> Duration {
        Duration::from_millis(self.disconnect_grace_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub client: Option<PartialClientSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub keep_alive_secs: Option<u64>,
    pub request_capacity: Option<usize>,
    pub connect_timeout_ms: Option<u64>,
    pub disconnect_grace_ms: Option<u64>,
    pub reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            keep_alive_secs: 30,
            request_capacity: 64,
            connect_timeout_ms: 10_000,
            disconnect_grace_ms: 100,
            reconnect_delay_ms: 1_000,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client: ClientSettings::default(),
            log: LogSettings::default(),
        }
    }
}

impl PartialSettings {
    /// Overlays the values present here on top of `defaults`.
    pub fn merge(self, defaults: Settings) -> Settings {
        let client = self.client;
        let log = self.log;
        let dc = defaults.client;

        Settings {
            client: ClientSettings {
                keep_alive_secs: client
                    .as_ref()
                    .and_then(|c| c.keep_alive_secs)
                    .unwrap_or(dc.keep_alive_secs),
                request_capacity: client
                    .as_ref()
                    .and_then(|c| c.request_capacity)
                    .unwrap_or(dc.request_capacity),
                connect_timeout_ms: client
                    .as_ref()
                    .and_then(|c| c.connect_timeout_ms)
                    .unwrap_or(dc.connect_timeout_ms),
                disconnect_grace_ms: client
                    .as_ref()
                    .and_then(|c| c.disconnect_grace_ms)
                    .unwrap_or(dc.disconnect_grace_ms),
                reconnect_delay_ms: client
                    .as_ref()
                    .and_then(|c| c.reconnect_delay_ms)
                    .unwrap_or(dc.reconnect_delay_ms),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(defaults.log.level),
            },
        }
    }
}
