use tokio::{io::AsyncWriteExt, net::TcpStream};
use tracing::{debug, warn};

use super::{SyslogSender, Target, not_connected};
use crate::error::SendError;

/// Sends newline-framed messages over a TCP stream.
///
/// A failed write drops the stream and leaves the sender disconnected, so the
/// next [`SyslogSender::send_message`] opens a fresh connection.
#[derive(Debug)]
pub struct TcpSender {
    target: Target,
    stream: Option<TcpStream>,
}

impl TcpSender {
    pub fn new(target: &str) -> Result<Self, SendError> {
        Ok(Self::with_target(Target::parse(target)?))
    }

    pub fn with_target(target: Target) -> Self {
        Self {
            target,
            stream: None,
        }
    }
}

impl SyslogSender for TcpSender {
    fn target(&self) -> &Target {
        &self.target
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn connect(&mut self) -> Result<(), SendError> {
        if self.is_connected() {
            return Ok(());
        }

        let addr = self.target.resolve().await?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|err| SendError::transport(&self.target.to_string(), err))?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!(target = %self.target, error = %err, "failed to set TCP_NODELAY");
        }

        debug!(target = %self.target, ?addr, "tcp sender connected");
        self.stream = Some(stream);
        Ok(())
    }

    async fn send_transport(&mut self, message: &str) -> Result<(), SendError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(not_connected(&self.target));
        };

        let result = stream.write_all(&frame(message)).await;
        if let Err(err) = result {
            self.stream = None;
            return Err(SendError::transport(&self.target.to_string(), err));
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.shutdown().await {
                debug!(target = %self.target, error = %err, "tcp shutdown failed");
            }
        }
    }
}

// Line framing: exactly one trailing LF per message.
fn frame(message: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(message.len() + 1);
    encoded.extend_from_slice(message.as_bytes());
    if !message.ends_with('\n') {
        encoded.push(b'\n');
    }
    encoded
}
