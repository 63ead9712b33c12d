// streampay: command line front end of the stream payment engine.
//
// Opens the stream database, talks to the payment backend over HTTP and
// drives streams through the engine. Every command first recovers streams
// left "running" by an earlier process.

mod config;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};

use config::{AppConfig, CONFIG_FILE};
use streampay_client::HttpPaymentClient;
use streampay_core::{EventReceiver, EventSink, StreamController};
use streampay_db::SqliteStreamStore;
use streampay_types::{StreamEvent, StreamPayment, StreamRecord, StreamStatus, StreamStore};

type Engine = StreamController<SqliteStreamStore, HttpPaymentClient>;

#[derive(Parser, Debug)]
#[command(name = "streampay", about = "Pay a counterparty in parts over time")]
struct Cli {
    /// Path to the JSON config file.
    #[arg(long, env = "STREAMPAY_CONFIG", default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Log tick-level detail.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Quote and store a new stream (paused).
    Create {
        /// Counterparty receiving the parts.
        #[arg(long)]
        counterparty: String,
        /// Amount of each part.
        #[arg(long)]
        price: u64,
        /// Milliseconds between parts.
        #[arg(long)]
        delay: u64,
        /// Number of parts.
        #[arg(long)]
        parts: u32,
        #[arg(long, default_value = "")]
        name: String,
        /// Start streaming right away.
        #[arg(long)]
        start: bool,
    },
    /// List stored streams, newest first.
    List,
    /// List the settled parts of a stream.
    Parts { id: String },
    /// Stream until finished, paused by an error, or interrupted.
    Run { id: String },
    /// End a stream without paying its remaining parts.
    Cancel { id: String },
    /// Reset streams left running by a crashed process.
    Recover,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = AppConfig::load_from(&cli.config)?;
    let store = SqliteStreamStore::open(&config.database_path)?;
    let client = HttpPaymentClient::new(&config.backend_url, config.request_timeout())?;
    let (events, rx) = EventSink::channel();
    let engine = StreamController::new(store, client, config.engine.clone(), events);

    let recovered = engine.recover()?;
    info!(
        "{} active stream(s) in {} (backend {})",
        recovered,
        config.database_path,
        engine.client().base_url()
    );

    match cli.command {
        Command::Create {
            counterparty,
            price,
            delay,
            parts,
            name,
            start,
        } => {
            let draft = engine
                .prepare(&counterparty, price, delay, parts, &name)
                .await?;
            println!(
                "{} parts of {} to {} every {} ms ({} total), fee {} per part",
                draft.total_parts,
                draft.price,
                draft.counterparty_id,
                draft.delay,
                draft.total_amount(),
                draft.fee
            );
            let stream = engine.commit()?;
            println!("{}", stream.id);
            if start {
                run(&engine, rx, &stream.id).await?;
            }
        }
        Command::List => {
            for record in engine.store().list_streams()? {
                println!("{}", format_record(&record));
            }
        }
        Command::Parts { id } => {
            for part in engine.parts(&id)? {
                println!("{}", part.payment_hash);
            }
        }
        Command::Run { id } => run(&engine, rx, &id).await?,
        Command::Cancel { id } => {
            let Some(stream) = engine.stream(&id) else {
                bail!("no active stream {}", id);
            };
            engine.cancel(&stream.id);
            println!(
                "cancelled {} after {}/{} parts, {} left unpaid",
                id,
                stream.parts_paid,
                stream.total_parts,
                stream.remaining_parts()
            );
        }
        Command::Recover => println!("{} active stream(s)", recovered),
    }

    Ok(())
}

/// Start `id` and print its events as JSON lines until it stops.
async fn run(engine: &Engine, mut rx: EventReceiver, id: &str) -> Result<()> {
    let Some(stream) = engine.stream(id) else {
        bail!("no active stream {}", id);
    };
    if stream.status.is_terminal() {
        bail!("stream {} has already finished", id);
    }

    engine.start(id);
    let outcome = watch(&mut rx, id, tokio::signal::ctrl_c()).await;
    engine.shutdown();

    if let Some(stream) = engine.stream(id) {
        print_summary(&stream);
    }
    outcome
}

/// Print events of `id` until it finishes, fails or `interrupt` resolves.
async fn watch<F>(rx: &mut EventReceiver, id: &str, interrupt: F) -> Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    return Ok(());
                };
                if event.stream_id() != id {
                    continue;
                }
                println!("{}", serde_json::to_string(&event).context("Failed to encode event")?);
                match event {
                    StreamEvent::StatusChanged { status: StreamStatus::Finished, .. } => {
                        return Ok(());
                    }
                    StreamEvent::Error { message, .. } => bail!("stream paused: {}", message),
                    _ => {}
                }
            }
            signal = &mut interrupt => {
                if let Err(e) = signal {
                    warn!("failed to listen for ctrl-c: {}", e);
                }
                info!("interrupted, pausing stream {}", id);
                return Ok(());
            }
        }
    }
}

fn print_summary(stream: &StreamPayment) {
    println!(
        "{} {}: {}/{} parts paid",
        stream.id, stream.status, stream.parts_paid, stream.total_parts
    );
}

fn format_record(record: &StreamRecord) -> String {
    let created = chrono::DateTime::from_timestamp_millis(record.created_at)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| record.created_at.to_string());
    format!(
        "{}  {:<7}  {}/{}  {} x {} -> {}  {}  {}",
        record.id,
        record.status,
        record.parts_paid,
        record.total_parts,
        record.total_parts,
        record.price,
        record.counterparty_id,
        created,
        record.name
    )
}
