//! Transports that deliver one formatted syslog message to a fixed target.
//!
//! Every sender follows the same lifecycle: [`SyslogSender::connect`] sets up
//! the transport, [`SyslogSender::send_message`] connects on first use and then
//! hands the message to the transport, and [`SyslogSender::disconnect`] releases
//! whatever the transport holds. Disconnecting a sender that never connected,
//! or disconnecting twice, does nothing.

use std::{
    fmt,
    future::Future,
    io,
    net::{IpAddr, SocketAddr},
};

use clap::ValueEnum;

use crate::error::SendError;

pub mod tcp;
pub mod udp;

pub use tcp::TcpSender;
pub use udp::UdpSender;

/// Well-known syslog port, used when a target names no port of its own.
pub const DEFAULT_SYSLOG_PORT: u16 = 514;

pub trait SyslogSender: Send {
    fn target(&self) -> &Target;

    fn is_connected(&self) -> bool;

    /// Sets up the transport. Calling it on a connected sender is a no-op.
    fn connect(&mut self) -> impl Future<Output = Result<(), SendError>> + Send;

    /// Puts one message on the wire, adding transport framing if the
    /// transport needs any. The sender must be connected.
    fn send_transport(&mut self, message: &str) -> impl Future<Output = Result<(), SendError>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;

    /// Sends an already formatted message, connecting first if necessary.
    fn send_message(&mut self, message: &str) -> impl Future<Output = Result<(), SendError>> + Send {
        async move {
            if !self.is_connected() {
                self.connect().await?;
            }
            self.send_transport(message).await
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// One datagram per message, fire and forget.
    #[default]
    Udp,
    /// Newline-framed messages over a stream that reconnects on demand.
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => f.write_str("udp"),
            Transport::Tcp => f.write_str("tcp"),
        }
    }
}

/// Host and port a sender delivers to.
///
/// Accepts `host`, `host:port`, `1.2.3.4:port`, `[v6]:port`, `[v6]` and a bare
/// IPv6 address. The port defaults to [`DEFAULT_SYSLOG_PORT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    host: String,
    port: u16,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(target: &str) -> Result<Self, SendError> {
        let trimmed = target.trim();
        let invalid = |reason: &str| SendError::InvalidTarget {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("empty target"));
        }
        if let Ok(addr) = trimmed.parse::<SocketAddr>() {
            return Ok(Self::new(addr.ip().to_string(), addr.port()));
        }
        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return Ok(Self::new(ip.to_string(), DEFAULT_SYSLOG_PORT));
        }
        if let Some(inner) = trimmed.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            return match inner.parse::<IpAddr>() {
                Ok(ip) => Ok(Self::new(ip.to_string(), DEFAULT_SYSLOG_PORT)),
                Err(_) => Err(invalid("bracketed host is not an IPv6 address")),
            };
        }

        match trimmed.rsplit_once(':') {
            Some((host, port)) => {
                if host.is_empty() {
                    return Err(invalid("missing host"));
                }
                let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(trimmed, DEFAULT_SYSLOG_PORT)),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves the host and returns the first address found.
    pub async fn resolve(&self) -> Result<SocketAddr, SendError> {
        let unresolvable = |source: io::Error| SendError::UnresolvableTarget {
            target: self.to_string(),
            source,
        };

        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(unresolvable)?
            .next()
            .ok_or_else(|| unresolvable(io::Error::new(io::ErrorKind::NotFound, "no addresses found")))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn not_connected(target: &Target) -> SendError {
    SendError::transport(
        &target.to_string(),
        io::Error::new(io::ErrorKind::NotConnected, "sender is not connected"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_target_forms() {
        for (input, host, port) in [
            ("loghost", "loghost", 514),
            ("loghost:1514", "loghost", 1514),
            ("10.0.0.1", "10.0.0.1", 514),
            ("10.0.0.1:10514", "10.0.0.1", 10514),
            ("::1", "::1", 514),
            ("[::1]", "::1", 514),
            ("[::1]:6514", "::1", 6514),
            ("  padded.example  ", "padded.example", 514),
        ] {
            let target = Target::parse(input).expect("target should parse");
            assert_eq!(target.host(), host, "host of {input:?}");
            assert_eq!(target.port(), port, "port of {input:?}");
        }
    }

    #[test]
    fn rejects_malformed_targets() {
        for input in ["", "   ", "host:", "host:99999", ":514", "[nope]", "a:b:c"] {
            assert!(
                matches!(Target::parse(input), Err(SendError::InvalidTarget { .. })),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_brackets_ipv6_hosts() {
        assert_eq!(Target::new("::1", 514).to_string(), "[::1]:514");
        assert_eq!(Target::new("loghost", 514).to_string(), "loghost:514");
    }

    #[tokio::test]
    async fn resolves_literal_addresses() {
        let addr = Target::new("127.0.0.1", 514).resolve().await.unwrap();
        assert_eq!(addr, "127.0.0.1:514".parse().unwrap());
    }
}
