use std::{
    borrow::Cow,
    future::Future,
    io,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use anyhow::{Context, Result};
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    net::{TcpListener, TcpStream, UdpSocket},
    select,
    sync::{OwnedSemaphorePermit, Semaphore},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info, trace, warn};

use crate::{consumer::MessageConsumer, message::Message};

pub const DEFAULT_LISTEN_PORT: u16 = 10514;

/// Longest TCP line a session accepts, line ending excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

// Largest payload a UDP datagram can carry.
const MAX_DATAGRAM_SIZE: usize = 65_535;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address for the TCP listener; the UDP socket, if enabled, binds the same port.
    pub listen: SocketAddr,
    /// Also accept syslog over UDP. Each line of a datagram is delivered on
    /// its own; an empty datagram delivers one empty line, like a bare `\n`
    /// on a TCP session.
    pub udp: bool,
    /// Admission limit for concurrent TCP sessions. `None` accepts without bound.
    pub max_sessions: Option<usize>,
    /// A TCP peer sending a longer line has its session closed.
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_LISTEN_PORT)),
            udp: false,
            max_sessions: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

/// Accepts syslog connections and hands every received line to a consumer.
///
/// Each accepted connection becomes its own task that reads newline-delimited
/// text until the peer closes the stream. Sessions share nothing but the
/// consumer, so a slow or broken peer only ever stalls its own session.
///
/// Without `max_sessions` there is no admission control: one task per
/// connection, however many connect. That is fine for a bench tool and is the
/// capacity ceiling to keep in mind when pointing real traffic at it. Memory
/// per session is bounded by the line length limit.
pub struct LineServer {
    listener: TcpListener,
    udp: Option<UdpSocket>,
    limit: Option<Arc<Semaphore>>,
    context: SessionContext,
    sessions: TaskTracker,
}

/// Stops a running [`LineServer`] from another task.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
}

impl ServerHandle {
    /// Stops accepting, including a pending accept. Open TCP sessions are left
    /// alone and keep delivering lines until their peers close the stream.
    pub fn terminate(&self) {
        self.shutdown.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl LineServer {
    pub fn new(listener: TcpListener, consumer: Arc<dyn MessageConsumer>) -> Self {
        Self {
            listener,
            udp: None,
            limit: None,
            context: SessionContext {
                consumer,
                shutdown: CancellationToken::new(),
                max_line_length: DEFAULT_MAX_LINE_LENGTH,
            },
            sessions: TaskTracker::new(),
        }
    }

    pub async fn bind(config: &ServerConfig, consumer: Arc<dyn MessageConsumer>) -> Result<Self> {
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind tcp listener on {}", config.listen))?;
        let mut server = Self::new(listener, consumer).with_max_line_length(config.max_line_length);

        if config.udp {
            let addr = server.local_addr()?;
            let socket = UdpSocket::bind(addr)
                .await
                .with_context(|| format!("failed to bind udp socket on {addr}"))?;
            server = server.with_udp(socket);
        }
        if let Some(max) = config.max_sessions {
            server = server.with_max_sessions(max);
        }

        Ok(server)
    }

    pub fn with_udp(mut self, socket: UdpSocket) -> Self {
        self.udp = Some(socket);
        self
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.limit = Some(Arc::new(Semaphore::new(max.clamp(1, Semaphore::MAX_PERMITS))));
        self
    }

    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.context.max_line_length = max.max(1);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn udp_addr(&self) -> Option<io::Result<SocketAddr>> {
        self.udp.as_ref().map(UdpSocket::local_addr)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.context.shutdown.clone(),
        }
    }

    /// Serves until [`ServerHandle::terminate`] is called, then waits until
    /// every open session has reached end of stream.
    pub async fn run(self) -> Result<()> {
        let LineServer {
            listener,
            udp,
            limit,
            context,
            sessions,
        } = self;

        if let Some(socket) = udp {
            sessions.spawn(receive_datagrams(socket, context.clone()));
        }

        loop {
            let permit = match &limit {
                Some(limit) => select! {
                    _ = context.shutdown.cancelled() => break,
                    permit = Arc::clone(limit).acquire_owned() => Some(permit?),
                },
                None => None,
            };

            select! {
                _ = context.shutdown.cancelled() => break,
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &context, &sessions, permit);
                }
            }
        }

        info!("server stopped accepting connections");
        drop(listener);

        sessions.close();
        sessions.wait().await;
        debug!("all sessions finished");

        Ok(())
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.handle();
        tokio::spawn(async move {
            shutdown.await;
            handle.terminate();
        });
        self.run().await
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

#[derive(Clone)]
struct SessionContext {
    consumer: Arc<dyn MessageConsumer>,
    shutdown: CancellationToken,
    max_line_length: usize,
}

impl SessionContext {
    fn deliver(&self, line: &str, peer: SocketAddr) {
        trace!(
            peer = %peer,
            pri = ?Message::parse(line).map(|message| message.pri()).ok(),
            "line received"
        );
        if let Err(err) = self.consumer.consume(line) {
            warn!(peer = %peer, error = %err, "consumer failed to process line");
        }
    }
}

fn handle_accept_result(
    result: io::Result<(TcpStream, SocketAddr)>,
    context: &SessionContext,
    sessions: &TaskTracker,
    permit: Option<OwnedSemaphorePermit>,
) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, context, sessions, permit),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(
    stream: TcpStream,
    peer: SocketAddr,
    context: &SessionContext,
    sessions: &TaskTracker,
    permit: Option<OwnedSemaphorePermit>,
) {
    info!(peer = %peer, "new connection");
    let context = context.clone();
    sessions.spawn(async move {
        let _permit = permit;
        match run_session(stream, peer, &context).await {
            Ok(lines) => info!(peer = %peer, lines, "end of session"),
            Err(err) => warn!(peer = %peer, error = ?err, "session closed with error"),
        }
    });
}

async fn run_session(stream: TcpStream, peer: SocketAddr, context: &SessionContext) -> io::Result<u64> {
    let mut reader = BufReader::new(stream);
    let mut buffer = Vec::new();
    let mut lines = 0;
    // One extra byte for the '\n' and one more to notice an overlong line.
    let read_limit = (context.max_line_length as u64).saturating_add(2);

    loop {
        buffer.clear();
        let bytes = (&mut reader)
            .take(read_limit)
            .read_until(b'\n', &mut buffer)
            .await?;
        if bytes == 0 {
            break;
        }
        if line_too_long(&buffer, context.max_line_length) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes", context.max_line_length),
            ));
        }

        let line = decode_line(&buffer);
        context.deliver(&line, peer);
        lines += 1;
    }

    Ok(lines)
}

async fn receive_datagrams(socket: UdpSocket, context: SessionContext) {
    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, peer) = select! {
            _ = context.shutdown.cancelled() => break,
            received = socket.recv_from(&mut buffer) => match received {
                Ok(received) => received,
                Err(err) => {
                    warn!(error = ?err, "failed to receive datagram");
                    continue;
                }
            },
        };

        let payload = String::from_utf8_lossy(&buffer[..len]);
        for line in datagram_lines(&payload) {
            context.deliver(line, peer);
        }
    }
}

fn datagram_lines(payload: &str) -> impl Iterator<Item = &str> {
    let empty = payload.is_empty().then_some("");
    payload.lines().chain(empty)
}

fn line_too_long(buffer: &[u8], max: usize) -> bool {
    let line = buffer.strip_suffix(b"\n").unwrap_or(buffer);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    line.len() > max
}

/// Strips one trailing `\n` or `\r\n`. Invalid UTF-8 is replaced, not rejected.
fn decode_line(raw: &[u8]) -> Cow<'_, str> {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_line_strips_one_line_ending() {
        assert_eq!(decode_line(b"<13>hi\n"), "<13>hi");
        assert_eq!(decode_line(b"<13>hi\r\n"), "<13>hi");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"\n"), "");
        assert_eq!(decode_line(b"two\n\n"), "two\n");
    }

    #[test]
    fn decode_line_replaces_invalid_utf8() {
        assert_eq!(decode_line(b"bad \xff byte\n"), "bad \u{fffd} byte");
    }

    #[test]
    fn default_config_listens_on_loopback() {
        let config = ServerConfig::default();
        assert_eq!(config.listen.to_string(), "127.0.0.1:10514");
        assert!(!config.udp);
        assert!(config.max_sessions.is_none());
        assert_eq!(config.max_line_length, DEFAULT_MAX_LINE_LENGTH);
    }

    #[test]
    fn datagram_lines_match_tcp_framing() {
        assert_eq!(datagram_lines("").collect::<Vec<_>>(), vec![""]);
        assert_eq!(datagram_lines("\n").collect::<Vec<_>>(), vec![""]);
        assert_eq!(datagram_lines("<13>one").collect::<Vec<_>>(), vec!["<13>one"]);
        assert_eq!(
            datagram_lines("<13>a\r\n\n<13>b\n").collect::<Vec<_>>(),
            vec!["<13>a", "", "<13>b"]
        );
    }

    #[test]
    fn line_length_ignores_line_ending() {
        assert!(!line_too_long(b"1234\r\n", 4));
        assert!(!line_too_long(b"1234\n", 4));
        assert!(!line_too_long(b"1234", 4));
        assert!(line_too_long(b"12345\n", 4));
        assert!(line_too_long(b"123456", 4));
    }

    #[tokio::test]
    async fn huge_session_limit_is_clamped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = LineServer::new(listener, Arc::new(crate::consumer::CountingConsumer::new()))
            .with_max_sessions(usize::MAX);
        let limit = server.limit.as_ref().expect("limit configured");
        assert_eq!(limit.available_permits(), Semaphore::MAX_PERMITS);
    }

    #[tokio::test]
    async fn handle_reports_termination() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = LineServer::new(listener, Arc::new(crate::consumer::CountingConsumer::new()));
        let handle = server.handle();
        assert!(!handle.is_terminated());
        handle.terminate();
        assert!(handle.is_terminated());
        server.run().await.unwrap();
    }
}
