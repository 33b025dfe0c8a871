use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result, bail};
use settlement_bank::application::worker::BankHandle;
use settlement_bank::config::{DEFAULT_LISTEN_ADDR, ServerConfig};
use settlement_bank::domain::identity::SystemClock;
use settlement_bank::domain::ledger::verify_chain;
use settlement_bank::interfaces::dispatcher::Dispatcher;
use settlement_bank::interfaces::tcp::client::BankClient;
use settlement_bank::interfaces::tcp::server::BankServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "BANK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "BANK_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the bank settlement server
    Serve(ServeArgs),
    /// Fetch the ledger from a running bank, print it and verify its hash chain
    Chain(ChainArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "BANK_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    listen: SocketAddr,

    /// Timeout for each socket read or write, in milliseconds
    #[arg(long, env = "BANK_IO_TIMEOUT_MS", default_value_t = 5_000)]
    io_timeout_ms: u64,

    /// Timeout for executing a request, in milliseconds
    #[arg(long, env = "BANK_REQUEST_TIMEOUT_MS", default_value_t = 10_000)]
    request_timeout_ms: u64,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "BANK_MAX_FRAME_BYTES", default_value_t = 1024 * 1024)]
    max_frame_bytes: usize,

    /// Mutating requests that may wait for the settlement worker
    #[arg(long, env = "BANK_QUEUE_CAPACITY", default_value_t = 1024)]
    queue_capacity: usize,
}

impl From<ServeArgs> for ServerConfig {
    fn from(args: ServeArgs) -> Self {
        Self {
            listen_addr: args.listen,
            io_timeout: Duration::from_millis(args.io_timeout_ms),
            request_timeout: Duration::from_millis(args.request_timeout_ms),
            max_frame_bytes: args.max_frame_bytes,
            queue_capacity: args.queue_capacity,
        }
    }
}

#[derive(Args)]
struct ChainArgs {
    /// Address of the bank
    #[arg(long, env = "BANK_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    bank: SocketAddr,

    /// Timeout for connecting and for each read or write, in milliseconds
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    match cli.command {
        Command::Serve(args) => serve(args.into()).await,
        Command::Chain(args) => chain(args).await,
    }
}

async fn serve(config: ServerConfig) -> Result<()> {
    config.validate().into_diagnostic()?;

    let (bank, worker) = BankHandle::in_memory(Arc::new(SystemClock), config.queue_capacity);
    let server = BankServer::bind(config, Dispatcher::new(bank))
        .await
        .into_diagnostic()?;
    server.run().await.into_diagnostic()?;

    // The server owned the last handle; the worker exits once it drains.
    worker.await.into_diagnostic()?;
    info!("bank stopped");
    Ok(())
}

async fn chain(args: ChainArgs) -> Result<()> {
    let client = BankClient::new(args.bank, Duration::from_millis(args.timeout_ms));
    let blocks = client.fetch_chain().await.into_diagnostic()?;

    for (i, block) in blocks.iter().enumerate() {
        println!("\n--- Block {i} ---");
        println!("tx_id: {}", block.tx_id);
        println!("mmid: {}", block.mmid);
        println!("merchant_id: {}", block.merchant_id);
        println!("amount: {}", block.amount);
        println!("timestamp: {}", block.timestamp.to_rfc3339());
        println!("prev_hash: {}", block.prev_hash);
        println!("hash: {}", block.hash);
    }

    let verification = verify_chain(&blocks);
    if !verification.is_valid() {
        bail!(
            "ledger failed verification: {}",
            verification.error_message.unwrap_or_default()
        );
    }
    println!("\n{} blocks, chain verified", verification.total_blocks);
    Ok(())
}
