//! export_events - read the violation log and print it

use anyhow::Result;
use clap::Parser;

use helmet_sentinel::{EventLogStore, JsonFileEventLog};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the violation log.
    #[arg(long, default_value = "violations.json", env = "SENTINEL_LOG_PATH")]
    log_path: String,
    /// Emit raw JSON instead of one line per entry.
    #[arg(long)]
    json: bool,
    /// Print at most this many entries, newest last.
    #[arg(long)]
    limit: Option<usize>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut store = JsonFileEventLog::open(&args.log_path)?;
    let mut entries = store.read_all()?;
    if let Some(limit) = args.limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!(
            "{}  {:?}  plate={}  conf={:.2}  crop={}",
            entry.timestamp, entry.violation_type, entry.plate_text, entry.confidence,
            entry.image_path
        );
    }
    if entries.is_empty() {
        println!("no violations logged in {}", args.log_path);
    }
    Ok(())
}
