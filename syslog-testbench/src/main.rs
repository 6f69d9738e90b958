use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use syslog_testbench::{
    cli::{Cli, Command, ConsumerKind, GenerateArgs, ServeArgs},
    consumer::{CountingConsumer, MessageConsumer, PrintConsumer},
    generator,
    server::LineServer,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args).await?,
        Command::Generate(args) => generate(args).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    let counter = Arc::new(CountingConsumer::new());
    let consumer: Arc<dyn MessageConsumer> = match args.consumer {
        ConsumerKind::Print => Arc::new(PrintConsumer),
        ConsumerKind::Count => counter.clone(),
    };

    let server = LineServer::bind(&args.server_config(), consumer).await?;
    let addr = server.local_addr()?;
    info!("server listening on {}", addr);

    if let Err(err) = server.run_until_ctrl_c().await {
        warn!("server exited with error: {err:?}");
        return Err(err);
    }

    if args.consumer == ConsumerKind::Count {
        info!(lines = counter.lines(), bytes = counter.bytes(), "received totals");
    }
    Ok(())
}

async fn generate(args: GenerateArgs) -> Result<()> {
    let config = args.generator_config();
    let outcomes = generator::run_load(&config).await?;

    let mut failed = 0;
    for outcome in outcomes {
        match outcome {
            Ok(report) => info!(
                generator = %report.generator,
                sent = report.sent,
                elapsed = ?report.elapsed,
                "worker done"
            ),
            Err(err) => {
                warn!("{err}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} workers failed", config.workers.max(1));
    }
    Ok(())
}
