//! # Magic Tree Watcher CLI
//!
//! Command-line companion for the asynchronous redemption flow.
//!
//! ## Usage
//!
//! ```bash
//! tree-watcher watch \
//!     --redeem-id 3 \
//!     --contract-id CC... \
//!     --source-account alice \
//!     --network testnet
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;

use magic_tree_watcher::{
    dispatch_decryption, watch, RetryPolicy, StatusSource, StellarCliSource, WatchConfig,
    WatchOutcome,
};

#[derive(Parser)]
#[command(name = "tree-watcher")]
#[command(about = "Track Magic Tree redemption requests to resolution")]
#[command(version)]
struct Cli {
    /// Deployed Magic Tree contract id
    #[arg(long)]
    contract_id: String,

    /// Account (or identity name) submitting transactions
    #[arg(long)]
    source_account: String,

    /// Network passphrase alias understood by the stellar CLI
    #[arg(long, default_value = "testnet")]
    network: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current status of a redemption request
    Status {
        #[arg(short, long)]
        redeem_id: u64,
    },

    /// Dispatch the decryption for a pending request, with bounded retries
    Decrypt {
        #[arg(short, long)]
        redeem_id: u64,

        /// Maximum dispatch attempts
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,
    },

    /// Poll a request until it resolves or the wait budget runs out
    Watch {
        #[arg(short, long)]
        redeem_id: u64,

        /// Seconds between polls
        #[arg(long, default_value_t = 5)]
        interval_secs: u64,

        /// Total seconds to wait before giving up the watch
        #[arg(long, default_value_t = 120)]
        max_wait_secs: u64,

        /// Dispatch the decryption first if it has not been requested yet
        #[arg(long)]
        dispatch: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut source = StellarCliSource::new(
        cli.contract_id.clone(),
        cli.source_account.clone(),
        cli.network.clone(),
    );

    match cli.command {
        Commands::Status { redeem_id } => status_command(&mut source, redeem_id),
        Commands::Decrypt {
            redeem_id,
            max_attempts,
        } => decrypt_command(&mut source, redeem_id, max_attempts),
        Commands::Watch {
            redeem_id,
            interval_secs,
            max_wait_secs,
            dispatch,
        } => watch_command(&mut source, redeem_id, interval_secs, max_wait_secs, dispatch),
    }
}

fn status_command(source: &mut StellarCliSource, redeem_id: u64) -> Result<()> {
    let status = source.redeem_status(redeem_id)?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn decrypt_command(
    source: &mut StellarCliSource,
    redeem_id: u64,
    max_attempts: u32,
) -> Result<()> {
    let policy = RetryPolicy {
        max_attempts,
        ..RetryPolicy::default()
    };
    let attempts = dispatch_decryption(source, redeem_id, &policy)?;
    println!(
        "Decryption dispatched for request {} ({} attempt{})",
        redeem_id,
        attempts,
        if attempts == 1 { "" } else { "s" }
    );
    Ok(())
}

fn watch_command(
    source: &mut StellarCliSource,
    redeem_id: u64,
    interval_secs: u64,
    max_wait_secs: u64,
    dispatch: bool,
) -> Result<()> {
    if dispatch {
        let status = source.redeem_status(redeem_id)?;
        if status.is_resolved {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }
        if !status.decryption_requested() {
            dispatch_decryption(source, redeem_id, &RetryPolicy::default())?;
            println!("Decryption dispatched for request {}", redeem_id);
        }
    }

    let config = WatchConfig {
        poll_interval: Duration::from_secs(interval_secs),
        max_wait: Duration::from_secs(max_wait_secs),
    };

    println!("=== Magic Tree Watcher ===");
    println!("Request: {}", redeem_id);
    println!("Polling every {}s, up to {}s", interval_secs, max_wait_secs);
    println!();

    match watch(source, redeem_id, &config)? {
        WatchOutcome::Resolved(status) => {
            if status.is_success() {
                println!(
                    "Resolved: SUCCESS (spent {} of {} points)",
                    status.revealed_spend, status.revealed_total
                );
            } else {
                println!(
                    "Resolved: FAILED (claimed {}, oracle revealed spend {} / total {})",
                    status.claimed_amount, status.revealed_spend, status.revealed_total
                );
            }
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        WatchOutcome::TimedOut { polls, last } => {
            println!(
                "Gave up waiting after {} polls; the request is still pending on-chain",
                polls
            );
            println!("Re-run `tree-watcher watch` later to keep tracking it.");
            println!("{}", serde_json::to_string_pretty(&last)?);
        }
    }
    Ok(())
}
