use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use libreelcast::config::{expand_path, resolve_config_path};
use libreelcast::logging::{LogFormat, LoggingConfig};
use libreelcast::{Config, Creator, Ledger, LedgerStore};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "reel-history")]
#[command(version, about = "Inspect the repost ledger")]
#[command(long_about = r#"List the reels already reposted, per creator.

EXAMPLES:
    # Everything in the ledger named by the config
    reel-history

    # One creator
    reel-history --creator gamezy.meme

    # A ledger file directly, as JSON lines
    reel-history --ledger ~/.local/share/reelcast/progress.json --format jsonl

    # Make a reel eligible for reposting again
    reel-history forget gamezy.meme C9xYz

NOTES:
    Stop reel-send before running `forget`. A running daemon holds the ledger
    in memory and rewrites the whole file on its next commit, which would
    bring the forgotten item back.

OUTPUT FORMATS:
    text  - "<creator> <position> <item id>" per line (default)
    json  - JSON array of entries
    jsonl - JSON lines, one entry per line

EXIT CODES:
    0 - Success (including an empty or missing ledger)
    1 - Error (unreadable config or ledger, unknown entry, etc.)
"#)]
struct Args {
    /// Configuration file naming the ledger (ignored with --ledger)
    #[arg(short, long, env = "REELCAST_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Ledger file (skips the configuration)
    #[arg(short, long, value_name = "PATH")]
    ledger: Option<PathBuf>,

    /// Only show this creator
    #[arg(long, value_name = "HANDLE")]
    creator: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json", "jsonl"])]
    format: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove one item from a creator's ledger entry
    Forget {
        /// Creator handle
        creator: String,
        /// Item id to forget
        item_id: String,
    },
}

/// One reposted item
#[derive(Debug, Serialize, PartialEq)]
struct HistoryEntry {
    creator: String,
    /// 1-based commit order within the creator
    position: usize,
    item_id: String,
}

fn entries(ledger: &Ledger, creator: Option<&str>) -> Vec<HistoryEntry> {
    ledger
        .creators()
        .filter(|c| creator.map_or(true, |wanted| c.as_str() == wanted))
        .flat_map(|c| {
            ledger
                .items(c)
                .iter()
                .enumerate()
                .map(move |(i, id)| HistoryEntry {
                    creator: c.to_string(),
                    position: i + 1,
                    item_id: id.clone(),
                })
        })
        .collect()
}

fn ledger_path(args: &Args) -> Result<PathBuf> {
    if let Some(path) = &args.ledger {
        return Ok(path.clone());
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => resolve_config_path().context("Failed to locate configuration")?,
    };
    let config = Config::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    Ok(expand_path(&config.ledger.path)?)
}

fn print_entries(entries: &[HistoryEntry], format: &str) -> Result<()> {
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(entries)?),
        "jsonl" => {
            for entry in entries {
                println!("{}", serde_json::to_string(entry)?);
            }
        }
        _ => {
            for entry in entries {
                println!("{} {} {}", entry.creator, entry.position, entry.item_id);
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    LoggingConfig::new(LogFormat::Text, "warn", false).init();

    let args = Args::parse();
    tracing::debug!("reel-history started with args: {:?}", args);

    let store = LedgerStore::new(ledger_path(&args)?);
    let mut ledger = store
        .load()
        .with_context(|| format!("Failed to read ledger {}", store.path().display()))?;

    match &args.command {
        Some(Command::Forget { creator, item_id }) => {
            if !ledger.forget(&Creator::new(creator.as_str()), item_id) {
                bail!("{} is not in the ledger for {}", item_id, creator);
            }
            store
                .save(&ledger)
                .with_context(|| format!("Failed to write ledger {}", store.path().display()))?;
            eprintln!("Forgot {} for {}", item_id, creator);
        }
        None => print_entries(&entries(&ledger, args.creator.as_deref()), &args.format)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_numbered_per_creator() {
        let mut ledger = Ledger::new();
        ledger.record(&Creator::new("bob"), "b1");
        ledger.record(&Creator::new("alice"), "a1");
        ledger.record(&Creator::new("alice"), "a2");

        let all = entries(&ledger, None);
        assert_eq!(all.len(), 3);
        assert_eq!(
            all[1],
            HistoryEntry {
                creator: "alice".to_string(),
                position: 2,
                item_id: "a2".to_string(),
            }
        );

        let bob = entries(&ledger, Some("bob"));
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].item_id, "b1");
    }
}
