//! Distribution Executor
//!
//! Pays the buyer, burns, then commits. Each step runs only when the
//! previous one succeeded. A failure after the payout is logged at error
//! level with the payout signature, but the deposit stays unmarked, so a
//! later cycle pays it again.
//!
//! A send whose outcome the chain client could not settle
//! (`ChainError::Unresolved`) counts as sent. Recording it keeps the deposit
//! from being paid twice; the signature is logged for a manual check.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::chain::ChainClient;
use super::error::{ChainError, PresaleError};
use super::ledger::{BurnRecord, LedgerStore, PurchaseRecord};
use super::policy::Allocation;
use super::poller::Deposit;

/// Outcome of one executed distribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Distribution {
    pub payout_signature: Option<String>,
    pub burn_signature: Option<String>,
    pub buyer_amount: u64,
    pub burn_amount: u64,
    /// false when the ledger already had the signature (a concurrent commit won)
    pub recorded: bool,
    pub dry_run: bool,
}

pub struct DistributionExecutor {
    chain: Arc<dyn ChainClient>,
    ledger: Arc<dyn LedgerStore>,
    dry_run: bool,
}

impl DistributionExecutor {
    pub fn new(chain: Arc<dyn ChainClient>, ledger: Arc<dyn LedgerStore>, dry_run: bool) -> Self {
        Self {
            chain,
            ledger,
            dry_run,
        }
    }

    pub async fn execute(
        &self,
        deposit: &Deposit,
        allocation: &Allocation,
    ) -> Result<Distribution, PresaleError> {
        if self.dry_run {
            info!(
                signature = %deposit.signature,
                sender = %deposit.sender,
                buyer = allocation.buyer,
                burn = allocation.burn,
                "[dry-run] would distribute"
            );
            return Ok(Distribution {
                payout_signature: None,
                burn_signature: None,
                buyer_amount: allocation.buyer,
                burn_amount: allocation.burn,
                recorded: false,
                dry_run: true,
            });
        }

        // 1. Payout. Nothing is written when this fails
        let payout_signature = if allocation.buyer > 0 {
            let sig = settled(
                "payout",
                self.chain
                    .transfer_tokens(&deposit.sender, allocation.buyer)
                    .await,
            )?;
            info!(
                deposit = %deposit.signature,
                payout = %sig,
                recipient = %deposit.sender,
                amount = allocation.buyer,
                "Tokens transferred"
            );
            Some(sig)
        } else {
            None
        };

        // 2 + 3. From here on a failure strands a sent payout
        match self.finish(deposit, allocation).await {
            Ok((burn_signature, recorded)) => Ok(Distribution {
                payout_signature,
                burn_signature,
                buyer_amount: allocation.buyer,
                burn_amount: allocation.burn,
                recorded,
                dry_run: false,
            }),
            Err(e) => {
                error!(
                    deposit = %deposit.signature,
                    payout = ?payout_signature,
                    amount = allocation.buyer,
                    "Payout sent but ledger not committed: {}",
                    e
                );
                Err(e)
            }
        }
    }

    async fn finish(
        &self,
        deposit: &Deposit,
        allocation: &Allocation,
    ) -> Result<(Option<String>, bool), PresaleError> {
        let burn_signature = if allocation.burn > 0 {
            let sig = settled("burn", self.chain.burn_tokens(allocation.burn).await)?;
            self.ledger
                .commit_burn(&BurnRecord::new(allocation.burn))
                .await?;
            info!(
                deposit = %deposit.signature,
                burn = %sig,
                amount = allocation.burn,
                "Tokens burned"
            );
            Some(sig)
        } else {
            None
        };

        let record = PurchaseRecord::new(
            deposit.signature.clone(),
            deposit.sender.to_string(),
            deposit.base_amount,
            allocation.buyer,
        );
        let recorded = self.ledger.commit_purchase(&record).await?;
        if recorded {
            info!(
                signature = %record.signature,
                base = %record.base_amount,
                tokens = record.token_amount,
                "Purchase recorded"
            );
        } else {
            warn!(
                "Purchase {} was already recorded, insert dropped",
                record.signature
            );
        }

        Ok((burn_signature, recorded))
    }
}

/// Treat a sent transaction with an unknown outcome as done
fn settled(step: &str, result: Result<String, ChainError>) -> Result<String, ChainError> {
    match result {
        Err(ChainError::Unresolved { signature }) => {
            warn!(
                %signature,
                step,
                "Outcome unknown, recording as sent; verify on chain"
            );
            Ok(signature)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::lamports_to_sol;
    use crate::presale::chain::mock::{MockCall, MockChain};
    use crate::presale::ledger::MemoryLedger;
    use crate::presale::solana::Pubkey;

    fn key(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    fn deposit(sig: &str) -> Deposit {
        Deposit {
            signature: sig.to_string(),
            sender: key(7),
            lamports: 100_000_000,
            base_amount: lamports_to_sol(100_000_000),
            block_time: None,
        }
    }

    fn setup(dry_run: bool) -> (Arc<MockChain>, Arc<MemoryLedger>, DistributionExecutor) {
        let chain = Arc::new(MockChain::new());
        let ledger = Arc::new(MemoryLedger::default());
        let executor = DistributionExecutor::new(chain.clone(), ledger.clone(), dry_run);
        (chain, ledger, executor)
    }

    #[tokio::test]
    async fn test_pays_burns_and_records() {
        let (chain, ledger, executor) = setup(false);
        let allocation = Allocation {
            buyer: 950_000,
            burn: 50_000,
            capped: false,
        };

        let result = executor.execute(&deposit("d1"), &allocation).await.unwrap();
        assert!(result.recorded);
        assert!(result.payout_signature.is_some());
        assert!(result.burn_signature.is_some());

        assert_eq!(
            chain.calls(),
            vec![
                MockCall::Transfer {
                    recipient: key(7),
                    amount: 950_000
                },
                MockCall::Burn { amount: 50_000 },
            ]
        );
        let totals = ledger.totals().await.unwrap();
        assert_eq!(totals.tokens, 950_000);
        assert_eq!(totals.burned, 50_000);
        assert!(ledger.seen("d1").await.unwrap());
    }

    #[tokio::test]
    async fn test_transfer_failure_writes_nothing() {
        let (chain, ledger, executor) = setup(false);
        chain.set_fail_transfer(true);
        let allocation = Allocation {
            buyer: 10,
            burn: 1,
            capped: false,
        };

        assert!(executor.execute(&deposit("d1"), &allocation).await.is_err());
        assert_eq!(chain.burn_count(), 0);
        assert!(!ledger.seen("d1").await.unwrap());
        assert_eq!(ledger.totals().await.unwrap().burned, 0);
    }

    #[tokio::test]
    async fn test_burn_failure_leaves_purchase_unrecorded() {
        let (chain, ledger, executor) = setup(false);
        chain.set_fail_burn(true);
        let allocation = Allocation {
            buyer: 10,
            burn: 1,
            capped: false,
        };

        assert!(executor.execute(&deposit("d1"), &allocation).await.is_err());
        // the payout already happened
        assert_eq!(chain.transfer_count(), 1);
        assert!(!ledger.seen("d1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unresolved_payout_is_recorded_as_sent() {
        let (chain, ledger, executor) = setup(false);
        chain.set_unresolved_transfer(true);
        let allocation = Allocation {
            buyer: 10,
            burn: 1,
            capped: false,
        };

        let result = executor.execute(&deposit("d1"), &allocation).await.unwrap();
        assert_eq!(result.payout_signature.as_deref(), Some("mock-sig-1"));
        assert!(result.recorded);
        assert_eq!(chain.transfer_count(), 1);
        assert_eq!(chain.burn_count(), 1);
        assert!(ledger.seen("d1").await.unwrap());
    }

    #[test]
    fn test_settled_passes_definite_outcomes_through() {
        assert_eq!(settled("payout", Ok("sig".to_string())).unwrap(), "sig");
        assert_eq!(
            settled(
                "burn",
                Err(ChainError::Unresolved {
                    signature: "sig".to_string()
                })
            )
            .unwrap(),
            "sig"
        );
        assert!(matches!(
            settled("payout", Err(ChainError::Expired("sig".to_string()))),
            Err(ChainError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_no_burn_call_without_burn_amount() {
        let (chain, ledger, executor) = setup(false);
        let allocation = Allocation {
            buyer: 10,
            burn: 0,
            capped: false,
        };

        let result = executor.execute(&deposit("d1"), &allocation).await.unwrap();
        assert!(result.burn_signature.is_none());
        assert_eq!(chain.burn_count(), 0);
        assert_eq!(ledger.totals().await.unwrap().burned, 0);
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let (chain, ledger, executor) = setup(true);
        let allocation = Allocation {
            buyer: 10,
            burn: 5,
            capped: false,
        };

        let result = executor.execute(&deposit("d1"), &allocation).await.unwrap();
        assert!(result.dry_run);
        assert!(!result.recorded);
        assert!(chain.calls().is_empty());
        assert!(!ledger.seen("d1").await.unwrap());
    }
}
