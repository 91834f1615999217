//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup by `main.rs` (defaults, then the optional TOML
//! file, then CLI flags and environment variables) and then handed to the
//! runtime.  Nothing in this module reads the environment or the file system.

use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use device_bridge_core::{Device, QosLevel};
use thiserror::Error;

/// Port used when a broker URL does not name one.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Errors in configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The broker URL could not be split into host and port.
    #[error("invalid broker URL '{url}': {reason}")]
    InvalidBrokerUrl { url: String, reason: String },

    /// The broker URL uses a scheme the bridge cannot speak.
    #[error("unsupported broker URL scheme '{0}' (expected tcp:// or mqtt://)")]
    UnsupportedScheme(String),

    /// The connection timeout is shorter than one second.
    #[error("connection timeout must be at least 1s (got {0:?})")]
    InvalidConnectionTimeout(Duration),

    /// The keep-alive does not fit the MQTT CONNECT header.
    ///
    /// MQTT carries it as whole seconds in 16 bits; zero disables it.
    #[error("keep-alive must be 0 or between 1s and 65535s (got {0:?})")]
    InvalidKeepAlive(Duration),
}

/// Host and port of the MQTT broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    /// Parses `tcp://host:port`, `mqtt://host:port` or a bare `host[:port]`.
    ///
    /// IPv6 literals must be bracketed (`tcp://[::1]:1883`).  When the port is
    /// omitted, [`DEFAULT_MQTT_PORT`] is used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedScheme`] for any other scheme and
    /// [`ConfigError::InvalidBrokerUrl`] when the host is empty or the port is
    /// not a number.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidBrokerUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let rest = match url.split_once("://") {
            Some(("tcp" | "mqtt", rest)) => rest,
            Some((scheme, _)) => return Err(ConfigError::UnsupportedScheme(scheme.to_string())),
            None => url,
        };
        let rest = rest.trim_end_matches('/');

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 literal"))?;
            let port = match tail {
                "" => None,
                _ => Some(
                    tail.strip_prefix(':')
                        .ok_or_else(|| invalid("expected ':' after IPv6 literal"))?,
                ),
            };
            (host, port)
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let port = match port {
            Some(p) => p.parse::<u16>().map_err(|_| invalid("port is not a number"))?,
            None => DEFAULT_MQTT_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

/// Broker connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    /// Broker URL, e.g. `tcp://broker.local:1883`.
    pub broker_url: String,

    /// Base client identifier.
    ///
    /// The identifier actually sent to the broker is suffixed with the start
    /// time (see [`MqttSettings::unique_client_id`]) so that a restarted
    /// bridge does not collide with its own stale session.
    pub client_id: String,

    /// MQTT keep-alive interval.
    pub keep_alive: Duration,

    /// Upper bound on establishing one connection (TCP + CONNACK).
    pub connection_timeout: Duration,

    /// Default QoS for the subscription and for outbound commands.
    pub qos: QosLevel,

    /// Ask the broker to discard session state on connect.
    pub clean_session: bool,

    /// Keep polling the connection after a failure.
    ///
    /// When `false`, the first connection failure or loss ends the bridge's
    /// broker session for the lifetime of the process.
    pub automatic_reconnect: bool,

    /// Pause between a connection failure and the next attempt.
    pub reconnect_delay: Duration,
}

impl MqttSettings {
    /// Parses [`MqttSettings::broker_url`].
    ///
    /// # Errors
    ///
    /// See [`BrokerAddress::parse`].
    pub fn broker_address(&self) -> Result<BrokerAddress, ConfigError> {
        BrokerAddress::parse(&self.broker_url)
    }

    /// Checks the values the MQTT client cannot represent.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidConnectionTimeout`] for a timeout under one
    ///   second.
    /// - [`ConfigError::InvalidKeepAlive`] for a non-zero keep-alive under one
    ///   second or above `u16::MAX` seconds.
    /// - Anything [`MqttSettings::broker_address`] returns.
    pub fn validate(&self) -> Result<BrokerAddress, ConfigError> {
        if self.connection_timeout < Duration::from_secs(1) {
            return Err(ConfigError::InvalidConnectionTimeout(
                self.connection_timeout,
            ));
        }
        let keep_alive_ok = self.keep_alive.is_zero()
            || (self.keep_alive >= Duration::from_secs(1)
                && self.keep_alive <= Duration::from_secs(u64::from(u16::MAX)));
        if !keep_alive_ok {
            return Err(ConfigError::InvalidKeepAlive(self.keep_alive));
        }
        self.broker_address()
    }

    /// Connection timeout in whole seconds, rounded up.
    pub fn connection_timeout_secs(&self) -> u64 {
        let secs = self.connection_timeout.as_secs();
        if self.connection_timeout.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    /// Returns `"{client_id}-{unix_millis}"`.
    pub fn unique_client_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        format!("{}-{millis}", self.client_id)
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            broker_url: format!("tcp://127.0.0.1:{DEFAULT_MQTT_PORT}"),
            client_id: "device-bridge".to_string(),
            keep_alive: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
            qos: QosLevel::AtLeastOnce,
            clean_session: true,
            automatic_reconnect: true,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// Realtime WebSocket hub settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeSettings {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8765)),
        }
    }
}

/// All runtime configuration for the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub mqtt: MqttSettings,
    pub realtime: RealtimeSettings,

    /// Upper bound on a single store or broadcast call during dispatch.
    ///
    /// `None` waits indefinitely, which lets one hung store call stall every
    /// message behind it.
    pub dispatch_timeout: Option<Duration>,

    /// Devices used to seed the in-memory device store.
    pub devices: Vec<Device>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings::default(),
            realtime: RealtimeSettings::default(),
            dispatch_timeout: Some(Duration::from_secs(10)),
            devices: Vec::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tcp_url_with_port() {
        let addr = BrokerAddress::parse("tcp://broker.local:1884").unwrap();
        assert_eq!(addr.host, "broker.local");
        assert_eq!(addr.port, 1884);
    }

    #[test]
    fn test_parse_mqtt_url_without_port_uses_default() {
        let addr = BrokerAddress::parse("mqtt://broker.local").unwrap();
        assert_eq!(addr.port, DEFAULT_MQTT_PORT);
    }

    #[test]
    fn test_parse_bare_host_port() {
        let addr = BrokerAddress::parse("10.0.0.5:1883").unwrap();
        assert_eq!(addr.host, "10.0.0.5");
        assert_eq!(addr.port, 1883);
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let addr = BrokerAddress::parse("tcp://[::1]:2883/").unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 2883);
    }

    #[test]
    fn test_parse_rejects_tls_scheme() {
        assert_eq!(
            BrokerAddress::parse("ssl://broker.local:8883"),
            Err(ConfigError::UnsupportedScheme("ssl".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        assert!(matches!(
            BrokerAddress::parse("tcp://broker.local:mqtt"),
            Err(ConfigError::InvalidBrokerUrl { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_missing_host() {
        assert!(matches!(
            BrokerAddress::parse("tcp://:1883"),
            Err(ConfigError::InvalidBrokerUrl { .. })
        ));
    }

    #[test]
    fn test_unique_client_id_is_suffixed() {
        let settings = MqttSettings {
            client_id: "bridge".to_string(),
            ..MqttSettings::default()
        };

        let id = settings.unique_client_id();

        let suffix = id.strip_prefix("bridge-").expect("base id must be kept");
        assert!(suffix.parse::<u128>().is_ok(), "suffix must be a timestamp");
    }

    #[test]
    fn test_validate_rejects_zero_connection_timeout() {
        let settings = MqttSettings {
            connection_timeout: Duration::ZERO,
            ..MqttSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigError::InvalidConnectionTimeout(Duration::ZERO))
        );
    }

    #[test]
    fn test_validate_rejects_keep_alive_beyond_u16_seconds() {
        let too_long = Duration::from_secs(u64::from(u16::MAX) + 1);
        let settings = MqttSettings {
            keep_alive: too_long,
            ..MqttSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(ConfigError::InvalidKeepAlive(too_long))
        );
    }

    #[test]
    fn test_validate_accepts_disabled_and_maximal_keep_alive() {
        for keep_alive in [Duration::ZERO, Duration::from_secs(u64::from(u16::MAX))] {
            let settings = MqttSettings {
                keep_alive,
                ..MqttSettings::default()
            };
            assert!(settings.validate().is_ok(), "{keep_alive:?}");
        }
    }

    #[test]
    fn test_validate_rejects_sub_second_keep_alive() {
        let settings = MqttSettings {
            keep_alive: Duration::from_millis(500),
            ..MqttSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidKeepAlive(_))
        ));
    }

    #[test]
    fn test_connection_timeout_rounds_up_to_whole_seconds() {
        let settings = MqttSettings {
            connection_timeout: Duration::from_millis(1500),
            ..MqttSettings::default()
        };
        assert_eq!(settings.connection_timeout_secs(), 2);
        assert_eq!(MqttSettings::default().connection_timeout_secs(), 30);
    }

    #[test]
    fn test_default_settings() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.mqtt.broker_address().unwrap().port, 1883);
        assert_eq!(cfg.mqtt.qos, QosLevel::AtLeastOnce);
        assert!(cfg.mqtt.automatic_reconnect);
        assert!(cfg.mqtt.clean_session);
        assert_eq!(cfg.realtime.bind_addr.port(), 8765);
        assert_eq!(cfg.dispatch_timeout, Some(Duration::from_secs(10)));
    }
}
