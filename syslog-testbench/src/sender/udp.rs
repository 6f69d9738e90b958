use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::debug;

use super::{SyslogSender, Target, not_connected};
use crate::error::SendError;

/// Sends each message as a single datagram.
///
/// The target is resolved once, on connect, and the address is reused for
/// every message after that. A long-running sender will keep sending to the
/// old address if the target's DNS record changes; call
/// [`UdpSender::refresh_target`] to pick up a new one.
///
/// Delivery is best effort: no confirmation, no retry, and no handling of
/// messages too large for one datagram beyond reporting the send error.
#[derive(Debug)]
pub struct UdpSender {
    target: Target,
    socket: Option<UdpSocket>,
    addr: Option<SocketAddr>,
}

impl UdpSender {
    pub fn new(target: &str) -> Result<Self, SendError> {
        Ok(Self::with_target(Target::parse(target)?))
    }

    pub fn with_target(target: Target) -> Self {
        Self {
            target,
            socket: None,
            addr: None,
        }
    }

    /// The address datagrams currently go to, once connected.
    pub fn resolved_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Resolves the target again and sends to the new address from now on.
    /// Connects the sender if it was not connected yet.
    pub async fn refresh_target(&mut self) -> Result<SocketAddr, SendError> {
        let addr = self.target.resolve().await?;
        let family_changed = self.addr.is_some_and(|old| old.is_ipv4() != addr.is_ipv4());

        if self.socket.is_none() || family_changed {
            self.socket = Some(bind_local(&self.target, addr).await?);
        }
        if self.addr != Some(addr) {
            debug!(target = %self.target, ?addr, "udp target address refreshed");
        }
        self.addr = Some(addr);

        Ok(addr)
    }
}

impl SyslogSender for UdpSender {
    fn target(&self) -> &Target {
        &self.target
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn connect(&mut self) -> Result<(), SendError> {
        if self.is_connected() {
            return Ok(());
        }
        let addr = self.refresh_target().await?;
        debug!(target = %self.target, ?addr, "udp sender ready");
        Ok(())
    }

    async fn send_transport(&mut self, message: &str) -> Result<(), SendError> {
        let (Some(socket), Some(addr)) = (&self.socket, self.addr) else {
            return Err(not_connected(&self.target));
        };

        socket
            .send_to(message.as_bytes(), addr)
            .await
            .map_err(|err| SendError::transport(&self.target.to_string(), err))?;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.socket = None;
        self.addr = None;
    }
}

async fn bind_local(target: &Target, remote: SocketAddr) -> Result<UdpSocket, SendError> {
    let local = if remote.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    UdpSocket::bind(local)
        .await
        .map_err(|err| SendError::transport(&target.to_string(), err))
}
