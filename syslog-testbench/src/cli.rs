use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{
    generator::GeneratorConfig,
    sender::Transport,
    server::{DEFAULT_LISTEN_PORT, DEFAULT_MAX_LINE_LENGTH, ServerConfig},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a syslog receiver that hands every received line to a consumer.
    Serve(ServeArgs),
    /// Send generated syslog traffic to a target.
    Generate(GenerateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, default_value_t = SocketAddr::from(([127, 0, 0, 1], DEFAULT_LISTEN_PORT)))]
    pub listen: SocketAddr,

    /// Also receive syslog datagrams on the same port.
    #[arg(long)]
    pub udp: bool,

    /// Maximum number of concurrent TCP sessions (unbounded when omitted).
    #[arg(long)]
    pub max_sessions: Option<usize>,

    /// Longest TCP line accepted; longer lines close the session.
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,

    /// What to do with received lines.
    #[arg(long, value_enum, default_value_t = ConsumerKind::Print)]
    pub consumer: ConsumerKind,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen: self.listen,
            udp: self.udp,
            max_sessions: self.max_sessions,
            max_line_length: self.max_line_length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConsumerKind {
    /// Print each line with its parsed PRI.
    Print,
    /// Only count lines; totals are logged on shutdown.
    Count,
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    /// Host to send to, optionally with `:port` (defaults to 514).
    #[arg(long, default_value = "127.0.0.1")]
    pub target: String,

    /// Message template; each message gets a sequence number and generator id appended.
    #[arg(long, default_value = "<5>syslog-testbench: test message")]
    pub message: String,

    /// Number of messages each worker sends.
    #[arg(long, default_value_t = 1000)]
    pub count: u64,

    /// Number of generators running side by side.
    #[arg(long, default_value_t = 1)]
    pub workers: usize,

    #[arg(long, value_enum, default_value_t = Transport::Udp)]
    pub transport: Transport,

    /// Pause between two sends of one worker, in milliseconds.
    #[arg(long, default_value_t = 1)]
    pub delay_ms: u64,
}

impl GenerateArgs {
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            target: self.target.clone(),
            message: self.message.clone(),
            count: self.count,
            workers: self.workers,
            transport: self.transport,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}
