//! Receivers for the lines the server reads off the wire.
//!
//! A consumer is called once per received line, synchronously, on the task of
//! the session that read it. Lines of one connection arrive in the order they
//! were sent; lines of different connections may interleave arbitrarily.
//!
//! Errors returned by a consumer are logged by the session, which then goes
//! on reading. A misbehaving consumer therefore never closes a connection.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::{error::ConsumerError, message::Message};

pub trait MessageConsumer: Send + Sync + 'static {
    fn consume(&self, line: &str) -> Result<(), ConsumerError>;
}

impl<F> MessageConsumer for F
where
    F: Fn(&str) -> Result<(), ConsumerError> + Send + Sync + 'static,
{
    fn consume(&self, line: &str) -> Result<(), ConsumerError> {
        self(line)
    }
}

/// Writes every line to stdout together with its parsed PRI.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrintConsumer;

impl MessageConsumer for PrintConsumer {
    fn consume(&self, line: &str) -> Result<(), ConsumerError> {
        let message = Message::parse(line)?;
        println!(
            "line received pri={} facility={} severity={} '{}'",
            message.pri(),
            message.facility(),
            message.severity(),
            message.body()
        );
        Ok(())
    }
}

/// Counts lines and bytes without keeping them.
#[derive(Debug, Default)]
pub struct CountingConsumer {
    lines: AtomicU64,
    bytes: AtomicU64,
}

impl CountingConsumer {
    pub const fn new() -> Self {
        Self {
            lines: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl MessageConsumer for CountingConsumer {
    fn consume(&self, line: &str) -> Result<(), ConsumerError> {
        self.lines.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(line.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

/// Forwards lines into an unbounded channel, for callers that want to await
/// them elsewhere.
#[derive(Debug, Clone)]
pub struct ChannelConsumer {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelConsumer {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageConsumer for ChannelConsumer {
    fn consume(&self, line: &str) -> Result<(), ConsumerError> {
        self.tx
            .send(line.to_string())
            .map_err(|_| ConsumerError::new("receiver dropped"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_consumer_tracks_lines_and_bytes() {
        let counter = CountingConsumer::new();
        counter.consume("<13>abc").unwrap();
        counter.consume("").unwrap();
        assert_eq!(counter.lines(), 2);
        assert_eq!(counter.bytes(), 7);
    }

    #[test]
    fn print_consumer_rejects_empty_lines() {
        assert!(PrintConsumer.consume("").is_err());
        assert!(PrintConsumer.consume("<13>fine").is_ok());
    }

    #[tokio::test]
    async fn channel_consumer_forwards_in_order() {
        let (consumer, mut rx) = ChannelConsumer::new();
        consumer.consume("first").unwrap();
        consumer.consume("second").unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("first"));
        assert_eq!(rx.recv().await.as_deref(), Some("second"));

        drop(rx);
        assert!(consumer.consume("lost").is_err());
    }

    #[test]
    fn closures_are_consumers() {
        let reject = |line: &str| -> Result<(), ConsumerError> {
            if line.starts_with('<') {
                Ok(())
            } else {
                Err(ConsumerError::new("no pri"))
            }
        };
        assert!(reject.consume("<1>x").is_ok());
        assert_eq!(reject.consume("x").unwrap_err().to_string(), "no pri");
    }
}
