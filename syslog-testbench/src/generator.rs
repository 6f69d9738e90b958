use std::time::{Duration, Instant};

use futures::future::join_all;
use nanoid::nanoid;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{info, warn};

use crate::{
    error::GeneratorError,
    sender::{SyslogSender, TcpSender, Transport, UdpSender},
};

/// Pause between two sends; short enough to be "as fast as possible" while
/// still yielding to the scheduler.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(1);

const PROGRESS_INTERVAL: u64 = 1000;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub target: String,
    /// Template each message starts with; sequence number and generator id are appended.
    pub message: String,
    /// Messages per worker.
    pub count: u64,
    pub workers: usize,
    pub transport: Transport,
    pub delay: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            target: "127.0.0.1".to_string(),
            message: "<5>syslog-testbench: test message".to_string(),
            count: 1000,
            workers: 1,
            transport: Transport::Udp,
            delay: DEFAULT_SEND_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub generator: String,
    pub sent: u64,
    pub elapsed: Duration,
}

/// Sends a fixed number of messages through one sender, one after another.
///
/// Every message is the template followed by its sequence number and the
/// generator's id, so receivers can tell workers apart and spot gaps. The
/// first send failure ends the run; messages already sent stay sent.
#[derive(Debug, Clone)]
pub struct TrafficGenerator {
    id: String,
    target: String,
    message: String,
    count: u64,
    transport: Transport,
    delay: Duration,
}

impl TrafficGenerator {
    pub fn new(target: impl Into<String>, message: impl Into<String>, count: u64) -> Self {
        Self {
            id: nanoid!(10),
            target: target.into(),
            message: message.into(),
            count,
            transport: Transport::default(),
            delay: DEFAULT_SEND_DELAY,
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(config.target.clone(), config.message.clone(), config.count)
            .with_transport(config.transport)
            .with_delay(config.delay)
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn format_message(&self, seq: u64) -> String {
        format!("{} {} {}", self.message, seq, self.id)
    }

    /// Runs with a sender for the configured transport.
    pub async fn run(self) -> Result<GenerationReport, GeneratorError> {
        let sender = match self.transport {
            Transport::Udp => UdpSender::new(&self.target).map(TransportSender::Udp),
            Transport::Tcp => TcpSender::new(&self.target).map(TransportSender::Tcp),
        };

        match sender {
            Ok(TransportSender::Udp(sender)) => self.run_with(sender).await,
            Ok(TransportSender::Tcp(sender)) => self.run_with(sender).await,
            Err(source) => {
                warn!(generator = %self.id, error = %source, "traffic generator could not start");
                Err(GeneratorError {
                    generator: self.id,
                    sent: 0,
                    source,
                })
            }
        }
    }

    pub async fn run_with<S: SyslogSender>(self, mut sender: S) -> Result<GenerationReport, GeneratorError> {
        info!(
            generator = %self.id,
            target = %sender.target(),
            count = self.count,
            "traffic generator started"
        );
        let started = Instant::now();
        let mut sent = 0;

        for seq in 0..self.count {
            if let Err(source) = sender.send_message(&self.format_message(seq)).await {
                sender.disconnect().await;
                warn!(generator = %self.id, sent, error = %source, "traffic generator aborted");
                return Err(GeneratorError {
                    generator: self.id,
                    sent,
                    source,
                });
            }
            sent += 1;

            if seq % PROGRESS_INTERVAL == 0 {
                info!(generator = %self.id, seq, "sent message");
            }
            if self.delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                sleep(self.delay).await;
            }
        }

        sender.disconnect().await;
        let elapsed = started.elapsed();
        info!(generator = %self.id, sent, ?elapsed, "traffic generator finished");

        Ok(GenerationReport {
            generator: self.id,
            sent,
            elapsed,
        })
    }

    pub fn spawn(self) -> JoinHandle<Result<GenerationReport, GeneratorError>> {
        tokio::spawn(self.run())
    }
}

enum TransportSender {
    Udp(UdpSender),
    Tcp(TcpSender),
}

/// Starts `config.workers` generators side by side, each with its own sender,
/// and waits for all of them.
pub async fn run_load(
    config: &GeneratorConfig,
) -> Result<Vec<Result<GenerationReport, GeneratorError>>, tokio::task::JoinError> {
    let handles = (0..config.workers.max(1))
        .map(|_| TrafficGenerator::from_config(config).spawn())
        .collect::<Vec<_>>();

    join_all(handles).await.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        io,
        net::{Ipv4Addr, UdpSocket as StdUdpSocket},
    };

    use tokio::{net::UdpSocket, time::timeout};

    use super::*;
    use crate::{error::SendError, sender::Target};

    /// Accepts a fixed number of messages, then fails every send.
    struct FlakySender {
        target: Target,
        connected: bool,
        budget: usize,
        delivered: Vec<String>,
    }

    impl SyslogSender for FlakySender {
        fn target(&self) -> &Target {
            &self.target
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn connect(&mut self) -> Result<(), SendError> {
            self.connected = true;
            Ok(())
        }

        async fn send_transport(&mut self, message: &str) -> Result<(), SendError> {
            if self.delivered.len() == self.budget {
                return Err(SendError::transport(
                    "flaky",
                    io::Error::new(io::ErrorKind::BrokenPipe, "gone"),
                ));
            }
            self.delivered.push(message.to_string());
            Ok(())
        }

        async fn disconnect(&mut self) {
            self.connected = false;
        }
    }

    #[test]
    fn messages_carry_sequence_and_identity() {
        let generator = TrafficGenerator::new("127.0.0.1", "<5>tmpl", 3);
        let id = generator.id().to_string();
        assert_eq!(generator.format_message(0), format!("<5>tmpl 0 {id}"));
        assert_eq!(generator.format_message(42), format!("<5>tmpl 42 {id}"));
    }

    #[test]
    fn generators_get_distinct_ids() {
        let ids: HashSet<String> = (0..50)
            .map(|_| TrafficGenerator::new("h", "m", 1).id().to_string())
            .collect();
        assert_eq!(ids.len(), 50);
    }

    #[tokio::test]
    async fn delivers_count_messages_in_order() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = receiver.local_addr().unwrap();
        let generator = TrafficGenerator::new(addr.to_string(), "<13>load", 5);
        let id = generator.id().to_string();

        let report = generator.run().await.unwrap();
        assert_eq!(report.sent, 5);
        assert_eq!(report.generator, id);

        let mut buf = [0u8; 512];
        for seq in 0..5 {
            let (len, _) = timeout(Duration::from_secs(1), receiver.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                std::str::from_utf8(&buf[..len]).unwrap(),
                format!("<13>load {seq} {id}")
            );
        }
    }

    #[tokio::test]
    async fn aborts_on_first_send_failure() {
        let sender = FlakySender {
            target: Target::new("flaky", 514),
            connected: false,
            budget: 3,
            delivered: Vec::new(),
        };
        let err = TrafficGenerator::new("flaky", "<13>x", 10)
            .with_delay(Duration::ZERO)
            .run_with(sender)
            .await
            .unwrap_err();
        assert_eq!(err.sent, 3);
        assert!(matches!(err.source, SendError::TransportFailure { .. }));
    }

    #[tokio::test]
    async fn invalid_target_fails_before_sending() {
        let err = TrafficGenerator::new("host:notaport", "<13>x", 10)
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.sent, 0);
        assert!(matches!(err.source, SendError::InvalidTarget { .. }));
    }

    #[tokio::test]
    async fn udp_to_a_closed_port_does_not_hang() {
        // Grab a free port and release it so nothing listens there.
        let port = StdUdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let generator = TrafficGenerator::new(format!("127.0.0.1:{port}"), "<13>void", 1000);
        let report = timeout(Duration::from_secs(30), generator.run())
            .await
            .expect("generator should not hang")
            .expect("udp sends should not fail");
        assert_eq!(report.sent, 1000);
    }

    #[tokio::test]
    async fn run_load_spawns_one_generator_per_worker() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = GeneratorConfig {
            target: receiver.local_addr().unwrap().to_string(),
            count: 4,
            workers: 3,
            delay: Duration::ZERO,
            ..Default::default()
        };

        let outcomes = run_load(&config).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        let ids: HashSet<String> = outcomes
            .into_iter()
            .map(|outcome| {
                let report = outcome.unwrap();
                assert_eq!(report.sent, 4);
                report.generator
            })
            .collect();
        assert_eq!(ids.len(), 3);
    }
}
