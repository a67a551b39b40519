//! Broker address parsing.
//!
//! Addresses are read as URLs. A bare `host:port` is treated as `mqtt://`;
//! `mqtts://` and `ssl://` force TLS on, `mqtt://` and `tcp://` leave it to
//! the `--mqtt-use-tls` flag.

use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::net::IpAddr;
use url::{Host, Url};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl MqttEndpoint {
    pub fn parse(addr: &str, tls_override: bool) -> Result<Self> {
        let trimmed = addr.trim();
        let url = if trimmed.contains("://") {
            Url::parse(trimmed)
        } else {
            Url::parse(&format!("mqtt://{}", trimmed))
        }
        .with_context(|| format!("invalid MQTT address: {}", addr))?;

        let use_tls = match url.scheme() {
            "mqtt" | "tcp" => tls_override,
            "mqtts" | "ssl" => true,
            other => bail!("unsupported MQTT scheme: {}", other),
        };
        if !matches!(url.path(), "" | "/") {
            bail!("unexpected path in MQTT address: {}", addr);
        }

        let host = match url.host() {
            Some(Host::Ipv6(ip)) => ip.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Domain(name)) if !name.is_empty() => name.to_string(),
            _ => bail!("missing MQTT host in {}", addr),
        };
        let port = url
            .port()
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;

        Ok(Self {
            host,
            port,
            use_tls,
        })
    }

    pub fn is_loopback(&self) -> bool {
        self.host.eq_ignore_ascii_case("localhost")
            || self
                .host
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false)
    }

    /// Refuse non-loopback brokers unless explicitly allowed.
    pub fn require_loopback(&self) -> Result<()> {
        if self.is_loopback() {
            return Ok(());
        }
        Err(anyhow!(
            "MQTT broker must be loopback for security: {} (use --allow-remote-mqtt to override)",
            self
        ))
    }
}

impl fmt::Display for MqttEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.use_tls { "mqtts" } else { "mqtt" };
        if self.host.contains(':') {
            write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
        } else {
            write!(f, "{}://{}:{}", scheme, self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port() {
        let ep = MqttEndpoint::parse("127.0.0.1:1883", false).unwrap();
        assert_eq!(
            ep,
            MqttEndpoint {
                host: "127.0.0.1".to_string(),
                port: 1883,
                use_tls: false,
            }
        );
        assert!(MqttEndpoint::parse("127.0.0.1:8883", true).unwrap().use_tls);
    }

    #[test]
    fn schemes_select_tls() {
        let ep = MqttEndpoint::parse("mqtts://broker.example.com:8883", false).unwrap();
        assert_eq!((ep.host.as_str(), ep.port, ep.use_tls), ("broker.example.com", 8883, true));

        assert!(MqttEndpoint::parse("ssl://broker:8883", false).unwrap().use_tls);
        assert!(!MqttEndpoint::parse("tcp://broker:1883", false).unwrap().use_tls);
        assert!(MqttEndpoint::parse("ws://broker:80", false).is_err());
    }

    #[test]
    fn bracketed_ipv6() {
        let ep = MqttEndpoint::parse("[::1]:1883", false).unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 1883);
        assert_eq!(ep.to_string(), "mqtt://[::1]:1883");
    }

    #[test]
    fn rejects_incomplete_addresses() {
        for addr in [
            "broker.local",
            "broker.local:notaport",
            ":1883",
            "mqtt://broker:1883/topic",
        ] {
            assert!(MqttEndpoint::parse(addr, false).is_err(), "{addr}");
        }
    }

    #[test]
    fn loopback_hosts_are_accepted() {
        for addr in ["127.0.0.1:1883", "localhost:1883", "LOCALHOST:1883", "[::1]:1883", "127.0.0.2:1883"] {
            let ep = MqttEndpoint::parse(addr, false).unwrap();
            assert!(ep.require_loopback().is_ok(), "{addr}");
        }
    }

    #[test]
    fn remote_hosts_are_rejected() {
        let ep = MqttEndpoint::parse("192.168.1.10:1883", false).unwrap();
        let err = ep.require_loopback().unwrap_err();
        assert!(err.to_string().contains("--allow-remote-mqtt"));
        assert!(err.to_string().contains("mqtt://192.168.1.10:1883"));
        assert!(!MqttEndpoint::parse("broker.lan:1883", false).unwrap().is_loopback());
    }
}
