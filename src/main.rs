//! Stream Queue - operator binary
//!
//! Enqueue, inspect and recover tasks from the command line. Connection
//! settings come from `--config`, then `STREAM_QUEUE_*` variables, then
//! flags, later sources winning.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use tracing::{error, warn};

use stream_queue::pending::{DEFAULT_MIN_IDLE, DEFAULT_PER_PAGE};
use stream_queue::{
    ClaimOutcome, ClaimStrategy, Fields, PendingDrainProcessor, QueueClient, QueueError,
    QueueOptions, RestoreStrategy,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const DEFAULT_LEASE_TTL_MS: u64 = 60_000;

#[derive(Parser)]
#[command(name = "stream-queue", version, about = "Stream queue operator tool")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// JSON file with stream/server/maxLength/group/consumer
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    stream: Option<String>,
    /// host:port[:auth]
    #[arg(long, global = true)]
    server: Option<String>,
    #[arg(long, global = true)]
    group: Option<String>,
    #[arg(long, global = true)]
    consumer: Option<String>,
    #[arg(long, global = true)]
    max_length: Option<u64>,
}

impl ConnectionArgs {
    fn options(&self) -> CliResult<QueueOptions> {
        let base = match &self.config {
            Some(path) => QueueOptions::from_file(path)?,
            None => QueueOptions::new(),
        };

        Ok(base.merge(QueueOptions::from_env()?).merge(QueueOptions {
            stream: self.stream.clone(),
            server: self.server.clone(),
            max_length: self.max_length,
            group: self.group.clone(),
            consumer: self.consumer.clone(),
        }))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Append a task and print its id
    Enqueue {
        /// Task field as key=value, repeatable
        #[arg(short, long = "field", value_parser = parse_field, required = true)]
        fields: Vec<(String, String)>,
    },
    /// Show the group's pending summary
    Pending {
        /// Also list pending records
        #[arg(long)]
        list: bool,
        /// Only records owned by this consumer
        #[arg(long)]
        owner: Option<String>,
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: usize,
    },
    /// Re-enqueue tasks pending longer than --idle-ms
    Restore {
        #[arg(long, default_value_t = DEFAULT_MIN_IDLE.as_millis() as u64)]
        idle_ms: u64,
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: usize,
        /// Repeat every N ms until Ctrl+C
        #[arg(long)]
        every_ms: Option<u64>,
        #[arg(long, default_value_t = DEFAULT_LEASE_TTL_MS)]
        lease_ttl_ms: u64,
    },
    /// Move tasks pending longer than --idle-ms to --new-consumer
    Claim {
        #[arg(long, default_value_t = DEFAULT_MIN_IDLE.as_millis() as u64)]
        idle_ms: u64,
        #[arg(long)]
        new_consumer: Option<String>,
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: usize,
    },
    /// Print and remove the consumer's pending history as JSON lines
    Drain {
        #[arg(long, default_value_t = 1)]
        batch: usize,
        #[arg(long, default_value_t = DEFAULT_LEASE_TTL_MS)]
        lease_ttl_ms: u64,
    },
    /// Delete the stream and all its groups
    Destroy,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn main() -> ExitCode {
    stream_queue::logging::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<ExitCode> {
    let client = QueueClient::from_options(cli.connection.options()?)?;

    match cli.command {
        Commands::Enqueue { fields } => {
            let fields: Fields = fields.into_iter().collect();
            println!("{}", client.enqueue(&fields)?);
        }

        Commands::Pending {
            list,
            owner,
            per_page,
        } => {
            let scanner = client.pending();
            println!("{}", serde_json::to_string(&scanner.summary()?)?);
            if list {
                for record in scanner.records(per_page, owner.as_deref()) {
                    println!("{}", serde_json::to_string(&record?)?);
                }
            }
        }

        Commands::Restore {
            idle_ms,
            per_page,
            every_ms,
            lease_ttl_ms,
        } => {
            let leases = client.store().leases();
            let strategy = RestoreStrategy::new(&client)
                .min_idle(Duration::from_millis(idle_ms))
                .per_page(per_page);
            let ttl = Duration::from_millis(lease_ttl_ms);

            let Some(every_ms) = every_ms else {
                let report = strategy.run_leased(&leases, ttl)?;
                println!("{}", serde_json::to_string(&report)?);
                return Ok(ExitCode::SUCCESS);
            };

            let running = Arc::new(AtomicBool::new(true));
            let flag = Arc::clone(&running);
            ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;

            while running.load(Ordering::SeqCst) {
                match strategy.run_leased(&leases, ttl) {
                    Ok(report) => println!("{}", serde_json::to_string(&report)?),
                    Err(QueueError::LeaseHeld { key }) => {
                        warn!(key = %key, "another restore is running, skipping round")
                    }
                    Err(e) => return Err(e.into()),
                }
                sleep_while(&running, Duration::from_millis(every_ms));
            }
        }

        Commands::Claim {
            idle_ms,
            new_consumer,
            per_page,
        } => {
            let mut strategy = ClaimStrategy::new(&client)
                .min_idle(Duration::from_millis(idle_ms))
                .per_page(per_page);
            if let Some(target) = new_consumer {
                strategy = strategy.new_consumer(target);
            }

            let outcome = strategy.run()?;
            println!("{}", serde_json::to_string(&outcome)?);
            if let ClaimOutcome::NotAttempted { .. } = outcome {
                return Ok(ExitCode::from(2));
            }
        }

        Commands::Drain {
            batch,
            lease_ttl_ms,
        } => {
            let leases = client.store().leases();
            PendingDrainProcessor::new(&client).batch(batch).run_leased(
                &leases,
                Duration::from_millis(lease_ttl_ms),
                |entry| serde_json::to_string(entry).map(|line| println!("{}", line)),
            )?;
        }

        Commands::Destroy => client.destroy_stream()?,
    }

    Ok(ExitCode::SUCCESS)
}

/// Sleep up to `total`, waking early once `running` is cleared
fn sleep_while(running: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}
