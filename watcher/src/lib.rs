//! # Magic Tree Redemption Watcher
//!
//! Host-side orchestration for the asynchronous redemption flow. After a
//! player registers a redemption and triggers decryption, the oracle calls
//! the contract back on its own schedule; this crate polls the request
//! status until it resolves or a wait budget runs out.
//!
//! Two things are deliberately NOT done here:
//!
//! - A timeout abandons the *wait*, never the request. There is no
//!   cancellation on-chain; a request that outlives the watcher stays
//!   pending and remains resolvable later.
//! - Retrying the decryption dispatch never risks duplicate oracle
//!   requests: the contract absorbs re-dispatch as a no-op once the
//!   decryption request id is set.
//!
//! ## Usage
//!
//! ```ignore
//! use magic_tree_watcher::{watch, StellarCliSource, WatchConfig};
//!
//! let mut source = StellarCliSource::new(contract_id, source_account, network);
//! match watch(&mut source, redeem_id, &WatchConfig::default())? {
//!     WatchOutcome::Resolved(status) => println!("{:?}", status),
//!     WatchOutcome::TimedOut { .. } => println!("still pending"),
//! }
//! ```

use std::process::Command;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// Defaults
// ============================================================================

/// How often to re-query the request status.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Total wait budget before the watcher gives up (the request itself
/// stays pending on-chain).
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

/// Bounded attempts for the decryption dispatch.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base backoff between dispatch attempts; grows linearly per attempt.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

// ============================================================================
// Redemption Status
// ============================================================================

/// Mirror of the contract's `RedeemRequest` view, as decoded from the
/// `get_redeem_status` JSON output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemStatus {
    pub requester: String,
    pub claimed_amount: u32,
    pub is_resolved: bool,
    pub revealed_spend: u32,
    pub revealed_total: u32,
    pub decryption_request_id: u64,
    pub created_at: u64,
}

impl RedeemStatus {
    /// Whether the decryption has been dispatched to the oracle.
    pub fn decryption_requested(&self) -> bool {
        self.decryption_request_id != 0
    }

    /// A resolved request succeeded when the revealed spend matched the
    /// claim and fit in the revealed balance; anything else is a failed
    /// resolution.
    pub fn is_success(&self) -> bool {
        self.is_resolved
            && self.revealed_spend == self.claimed_amount
            && self.revealed_spend <= self.revealed_total
    }
}

// ============================================================================
// Status Source
// ============================================================================

/// The chain-access boundary. Production uses [`StellarCliSource`];
/// tests script responses.
pub trait StatusSource {
    fn redeem_status(&mut self, redeem_id: u64) -> Result<RedeemStatus>;
    fn request_decryption(&mut self, redeem_id: u64) -> Result<()>;
}

/// Invokes the contract through the `stellar` CLI.
pub struct StellarCliSource {
    pub contract_id: String,
    pub source_account: String,
    pub network: String,
    pub binary: String,
}

impl StellarCliSource {
    pub fn new(contract_id: String, source_account: String, network: String) -> Self {
        Self {
            contract_id,
            source_account,
            network,
            binary: "stellar".to_string(),
        }
    }

    fn invoke(&self, fn_name: &str, fn_args: &[String]) -> Result<String> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("contract")
            .arg("invoke")
            .arg("--id")
            .arg(&self.contract_id)
            .arg("--source-account")
            .arg(&self.source_account)
            .arg("--network")
            .arg(&self.network)
            .arg("--")
            .arg(fn_name)
            .args(fn_args);

        let output = cmd
            .output()
            .with_context(|| format!("failed to run {}", self.binary))?;
        if !output.status.success() {
            bail!(
                "{} {} failed: {}",
                self.binary,
                fn_name,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl StatusSource for StellarCliSource {
    fn redeem_status(&mut self, redeem_id: u64) -> Result<RedeemStatus> {
        let stdout = self.invoke(
            "get_redeem_status",
            &[format!("--redeem_id={}", redeem_id)],
        )?;
        serde_json::from_str(&stdout)
            .with_context(|| format!("unexpected get_redeem_status output: {}", stdout))
    }

    fn request_decryption(&mut self, redeem_id: u64) -> Result<()> {
        self.invoke(
            "request_decryption",
            &[
                format!("--caller={}", self.source_account),
                format!("--redeem_id={}", redeem_id),
            ],
        )?;
        Ok(())
    }
}

// ============================================================================
// Watch Loop
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl WatchConfig {
    /// Number of polls the wait budget affords, at least one.
    fn poll_budget(&self) -> u32 {
        let interval = self.poll_interval.as_millis().max(1);
        let budget = (self.max_wait.as_millis() / interval) as u32;
        budget.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    Resolved(RedeemStatus),
    /// The wait budget ran out while the request was still pending. The
    /// on-chain request is untouched and may resolve later.
    TimedOut { polls: u32, last: RedeemStatus },
}

/// Poll until the request resolves or the wait budget runs out.
pub fn watch<S: StatusSource>(
    source: &mut S,
    redeem_id: u64,
    config: &WatchConfig,
) -> Result<WatchOutcome> {
    watch_with_sleep(source, redeem_id, config, std::thread::sleep)
}

/// [`watch`] with an injectable sleep, so tests run without real delays.
pub fn watch_with_sleep<S, F>(
    source: &mut S,
    redeem_id: u64,
    config: &WatchConfig,
    mut sleep: F,
) -> Result<WatchOutcome>
where
    S: StatusSource,
    F: FnMut(Duration),
{
    let budget = config.poll_budget();
    let mut last = None;
    for poll in 0..budget {
        let status = source
            .redeem_status(redeem_id)
            .with_context(|| format!("polling redeem request {}", redeem_id))?;
        if status.is_resolved {
            return Ok(WatchOutcome::Resolved(status));
        }
        last = Some(status);
        if poll + 1 < budget {
            sleep(config.poll_interval);
        }
    }
    Ok(WatchOutcome::TimedOut {
        polls: budget,
        last: last.ok_or_else(|| anyhow!("poll budget was zero"))?,
    })
}

// ============================================================================
// Decryption Dispatch with Bounded Retry
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Dispatch the decryption for a pending redemption, retrying transient
/// failures with linear backoff. Returns the number of attempts used.
pub fn dispatch_decryption<S: StatusSource>(
    source: &mut S,
    redeem_id: u64,
    policy: &RetryPolicy,
) -> Result<u32> {
    dispatch_decryption_with_sleep(source, redeem_id, policy, std::thread::sleep)
}

pub fn dispatch_decryption_with_sleep<S, F>(
    source: &mut S,
    redeem_id: u64,
    policy: &RetryPolicy,
    mut sleep: F,
) -> Result<u32>
where
    S: StatusSource,
    F: FnMut(Duration),
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match source.request_decryption(redeem_id) {
            Ok(()) => return Ok(attempt),
            Err(err) => {
                last_err = Some(err);
                if attempt < attempts {
                    sleep(policy.backoff * attempt);
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("no dispatch attempts made")))
        .with_context(|| format!("dispatching decryption for request {} failed", redeem_id))
}

// ============================================================================
// Tests
// ============================================================================
