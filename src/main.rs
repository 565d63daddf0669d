use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use deario_images::config;
use deario_images::event::Trigger;
use deario_images::imaging::RustCodec;
use deario_images::process::{Deadline, ProcessConfig, handle_upload};
use deario_images::storage::FsStore;
use deario_images::{output, sweep};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "deario-images")]
#[command(about = "Resize and re-encode Deario diary image uploads in place")]
#[command(long_about = "\
Resize and re-encode Deario diary image uploads in place

Every image under the diary prefix is turned upright, shrunk to at most
800px wide and re-encoded under a 600 KiB budget, then written back over
itself tagged resized=true. Tagged objects are never processed again.

Triggers:

  on-upload   One object-created event (or audit-log entry) as JSON
  sweep       Every image uploaded the day before --date (default: today, UTC)

Store layout (--store):

  storage/
  └── <container>/
      ├── diary/2024-05-01/u1/20240501/1.jpg
      └── .meta/diary/2024-05-01/u1/20240501/1.jpg.json

Logging is controlled with RUST_LOG (default: info).

Run 'deario-images gen-config' to generate a documented deario.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Root directory of the blob store
    #[arg(long, default_value = "storage", global = true)]
    store: PathBuf,

    /// Config file (default: ./deario.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process the object named by one trigger payload
    OnUpload {
        /// JSON payload file, or `-` for stdin
        #[arg(long, default_value = "-")]
        event: String,
    },
    /// Process every image uploaded on the previous day
    Sweep {
        /// Run as if today were this date (YYYY-MM-DD, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Container (bucket) to sweep
        #[arg(long)]
        container: String,
    },
    /// Print a stock deario.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::OnUpload { event } => {
            let config = config::load_config(&std::env::current_dir()?, cli.config.as_deref())?;
            let payload = read_payload(&event)?;
            let trigger = Trigger::from_json(&payload)?;
            let store = FsStore::new(&cli.store);
            let deadline = Deadline::after(config.trigger.timeout());

            let outcome = handle_upload(
                &store,
                &RustCodec::new(),
                &trigger,
                &ProcessConfig::from_pipeline_config(&config),
                &deadline,
            );
            let path = trigger.target().ok().map(|o| o.path);
            output::print_outcome(path.as_deref(), &outcome);
        }
        Command::Sweep { date, container } => {
            let config = config::load_config(&std::env::current_dir()?, cli.config.as_deref())?;
            let today = date.unwrap_or_else(|| Utc::now().date_naive());
            let store = FsStore::new(&cli.store).with_page_size(config.sweep.page_size);

            let report = sweep::run_sweep(&store, &RustCodec::new(), &container, today, &config)?;
            output::print_sweep_report(&report);
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr so stdout carries only the run summary.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_payload(source: &str) -> std::io::Result<String> {
    if source == "-" {
        let mut payload = String::new();
        std::io::stdin().read_to_string(&mut payload)?;
        Ok(payload)
    } else {
        std::fs::read_to_string(source)
    }
}
