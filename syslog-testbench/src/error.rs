//! Error types shared across the testbench.
//!
//! Every fault is local to the unit that raised it: a parse error belongs to
//! one line, a consumer error to one line of one session, and a send error to
//! one sender instance. Nothing here is meant to take the process down.

use std::io;

/// A raw line could not be turned into a [`Message`](crate::message::Message).
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MessageError {
    /// There is nothing to parse.
    #[error("empty message")]
    Empty,

    /// Strict parsing only: the PRI digits are not followed by `>`.
    #[error("PRI token is missing its closing '>' at byte {position}")]
    MissingDelimiter { position: usize },
}

/// A sender could not deliver a message to its target.
///
/// All variants are terminal for the sender instance that produced them; the
/// caller decides whether to retry with a fresh sender or give up.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The target string could not be split into host and port.
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    /// Name resolution failed or produced no address.
    #[error("failed to resolve target '{target}': {source}")]
    UnresolvableTarget {
        target: String,
        #[source]
        source: io::Error,
    },

    /// The transport failed while connecting or writing.
    #[error("transport failure towards '{target}': {source}")]
    TransportFailure {
        target: String,
        #[source]
        source: io::Error,
    },
}

impl SendError {
    pub(crate) fn transport(target: &str, source: io::Error) -> Self {
        Self::TransportFailure {
            target: target.to_string(),
            source,
        }
    }
}

/// Raised by a [`MessageConsumer`](crate::consumer::MessageConsumer).
///
/// Sessions log these and keep reading; they never close a connection.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ConsumerError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConsumerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<MessageError> for ConsumerError {
    fn from(err: MessageError) -> Self {
        Self::with_source("unparseable line", err)
    }
}

/// A traffic generator stopped before sending all of its messages.
#[derive(Debug, thiserror::Error)]
#[error("generator {generator} aborted after {sent} messages: {source}")]
pub struct GeneratorError {
    pub generator: String,
    pub sent: u64,
    #[source]
    pub source: SendError,
}
