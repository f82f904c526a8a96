//! Poller - deposit detection loop
//!
//! Each cycle lists the most recent signatures for the treasury, walks them
//! oldest to newest and drives the executor at most once per signature.
//! Candidates are processed strictly one after another so each sees the
//! cap and ledger state left by the previous one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::chain::{ChainClient, ParsedInstruction, ParsedTransaction, SignatureInfo};
use super::error::PresaleError;
use super::executor::{Distribution, DistributionExecutor};
use super::ledger::LedgerStore;
use super::policy::Ineligible;
use super::solana::Pubkey;
use crate::config::PresaleSettings;
use crate::money::lamports_to_sol;

/// A native transfer into the treasury
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub signature: String,
    pub sender: Pubkey,
    pub lamports: u64,
    pub base_amount: Decimal,
    pub block_time: Option<i64>,
}

/// Pick the first native transfer to `treasury` out of a transaction
pub fn classify(tx: &ParsedTransaction, treasury: &Pubkey) -> Option<Deposit> {
    if tx.failed {
        return None;
    }
    tx.instructions.iter().find_map(|ix| match ix {
        ParsedInstruction::NativeTransfer {
            source,
            destination,
            lamports,
        } if destination == treasury && *lamports > 0 => Some(Deposit {
            signature: tx.signature.clone(),
            sender: *source,
            lamports: *lamports,
            base_amount: lamports_to_sol(*lamports),
            block_time: tx.block_time,
        }),
        _ => None,
    })
}

/// Counters for one poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub listed: usize,
    pub skipped_seen: usize,
    /// Failed on chain, unknown to the node, or no qualifying transfer
    pub misses: usize,
    pub ineligible: usize,
    pub distributed: usize,
    /// Whole tokens sent to buyers this cycle (dry runs excluded)
    pub tokens_paid: u64,
    /// Whole tokens burned this cycle (dry runs excluded)
    pub tokens_burned: u64,
    /// Chain or ledger errors; the candidate is retried next cycle
    pub failed: usize,
    /// Cycle stopped early because the cap is full
    pub cap_exhausted: bool,
    /// Another cycle was still running, nothing was done
    pub overlapped: bool,
}

enum Outcome {
    Seen,
    Miss,
    Ineligible(Ineligible),
    Distributed(Distribution),
}

/// Clears the in-progress flag when a cycle ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Poller {
    chain: Arc<dyn ChainClient>,
    ledger: Arc<dyn LedgerStore>,
    settings: Arc<PresaleSettings>,
    executor: DistributionExecutor,
    running: AtomicBool,
}

impl Poller {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        ledger: Arc<dyn LedgerStore>,
        settings: Arc<PresaleSettings>,
    ) -> Self {
        let executor = DistributionExecutor::new(chain.clone(), ledger.clone(), settings.dry_run);
        Self {
            chain,
            ledger,
            settings,
            executor,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run cycles on the configured interval until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            treasury = %self.settings.treasury,
            interval = ?self.settings.poll_interval,
            window = self.settings.signature_window,
            dry_run = self.settings.dry_run,
            "Presale poller started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(report) if report.distributed > 0 || report.failed > 0 => {
                            info!(?report, "Poll cycle finished");
                        }
                        Ok(report) => debug!(?report, "Poll cycle finished"),
                        Err(e) => error!("Poll cycle failed: {}", e),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Presale poller stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One full cycle. Errors only when the listing itself fails
    pub async fn poll_once(&self) -> Result<CycleReport, PresaleError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            debug!("Previous poll cycle still running, skipping");
            return Ok(CycleReport {
                overlapped: true,
                ..Default::default()
            });
        };

        debug!("Poll cycle started");
        let mut report = CycleReport::default();

        let mut candidates = self
            .chain
            .recent_signatures(&self.settings.treasury, self.settings.signature_window)
            .await?;
        // Listed newest first
        candidates.reverse();
        report.listed = candidates.len();

        for candidate in &candidates {
            match self.process(candidate).await {
                Ok(Outcome::Seen) => report.skipped_seen += 1,
                Ok(Outcome::Miss) => report.misses += 1,
                Ok(Outcome::Ineligible(Ineligible::CapExhausted)) => {
                    info!(
                        signature = %candidate.signature,
                        "Distribution cap reached, ending cycle"
                    );
                    report.cap_exhausted = true;
                    break;
                }
                Ok(Outcome::Ineligible(_)) => report.ineligible += 1,
                Ok(Outcome::Distributed(distribution)) => {
                    report.distributed += 1;
                    if !distribution.dry_run {
                        report.tokens_paid += distribution.buyer_amount;
                        report.tokens_burned += distribution.burn_amount;
                    }
                }
                Err(e) => {
                    warn!(
                        signature = %candidate.signature,
                        "Candidate left for next cycle: {}",
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        debug!(?report, "Poll cycle done");
        Ok(report)
    }

    async fn process(&self, candidate: &SignatureInfo) -> Result<Outcome, PresaleError> {
        if self.ledger.seen(&candidate.signature).await? {
            return Ok(Outcome::Seen);
        }
        if candidate.failed {
            debug!("{}: failed on chain", candidate.signature);
            return Ok(Outcome::Miss);
        }

        let Some(tx) = self.chain.transaction(&candidate.signature).await? else {
            debug!("{}: not found", candidate.signature);
            return Ok(Outcome::Miss);
        };
        let Some(deposit) = classify(&tx, &self.settings.treasury) else {
            debug!("{}: no deposit to treasury", candidate.signature);
            return Ok(Outcome::Miss);
        };

        let raw_tokens = self.settings.pricing.resolve(deposit.base_amount);
        let totals = self.ledger.totals().await?;

        match self
            .settings
            .policy
            .evaluate(deposit.base_amount, raw_tokens, totals.tokens)
        {
            Ok(allocation) => {
                if allocation.capped {
                    info!(
                        signature = %deposit.signature,
                        raw = raw_tokens,
                        buyer = allocation.buyer,
                        "Payout pro-rated to fill the cap"
                    );
                }
                let distribution = self.executor.execute(&deposit, &allocation).await?;
                Ok(Outcome::Distributed(distribution))
            }
            Err(reason) => {
                if reason != Ineligible::CapExhausted {
                    info!(
                        signature = %deposit.signature,
                        sender = %deposit.sender,
                        amount = %deposit.base_amount,
                        reason = reason.as_str(),
                        "Deposit not eligible"
                    );
                }
                Ok(Outcome::Ineligible(reason))
            }
        }
    }
}
