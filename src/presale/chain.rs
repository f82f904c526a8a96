use async_trait::async_trait;

use super::error::ChainError;
use super::solana::keys::Pubkey;

/// Capability interface to the ledger network
///
/// Everything the engine needs from the chain goes through here: listing
/// and fetching deposits, paying buyers, burning, and balance reads for the
/// query surface.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Most recent transaction signatures touching `address`, newest first
    async fn recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ChainError>;

    /// Fetch and parse a transaction. `None` when the node does not know it
    async fn transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>, ChainError>;

    /// Pay `amount` whole tokens to `recipient`, creating their token
    /// account first when missing. Returns the payout signature
    async fn transfer_tokens(&self, recipient: &Pubkey, amount: u64) -> Result<String, ChainError>;

    /// Burn `amount` whole tokens from the distributor's own holdings
    async fn burn_tokens(&self, amount: u64) -> Result<String, ChainError>;

    /// Native balance in lamports
    async fn native_balance(&self, address: &Pubkey) -> Result<u64, ChainError>;

    /// Token balance of `owner` in base units (0 without a token account)
    async fn token_balance(&self, owner: &Pubkey) -> Result<u64, ChainError>;
}

/// One entry of a signature listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub failed: bool,
}

/// A fetched transaction reduced to what deposit classification needs
#[derive(Debug, Clone)]
pub struct ParsedTransaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub failed: bool,
    pub instructions: Vec<ParsedInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInstruction {
    NativeTransfer {
        source: Pubkey,
        destination: Pubkey,
        lamports: u64,
    },
    Other {
        program: String,
    },
}

/// In-process chain for tests and local runs without a node
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum MockCall {
        Transfer { recipient: Pubkey, amount: u64 },
        Burn { amount: u64 },
    }

    #[derive(Default)]
    pub struct MockChain {
        /// Newest last; listings reverse it like a real node does
        history: Mutex<Vec<ParsedTransaction>>,
        calls: Mutex<Vec<MockCall>>,
        fetch_count: AtomicUsize,
        native_balances: Mutex<HashMap<Pubkey, u64>>,
        token_balances: Mutex<HashMap<Pubkey, u64>>,
        fail_list: AtomicBool,
        fail_fetch: AtomicBool,
        fail_transfer: AtomicBool,
        fail_burn: AtomicBool,
        unresolved_transfer: AtomicBool,
        list_delay: Mutex<Option<Duration>>,
    }

    impl MockChain {
        pub fn new() -> Self {
            Self::default()
        }

        /// Append a transaction as the newest on chain
        pub fn push_transaction(&self, tx: ParsedTransaction) {
            self.history.lock().unwrap_or_else(|p| p.into_inner()).push(tx);
        }

        /// Append a successful single-transfer deposit
        pub fn push_deposit(&self, signature: &str, source: Pubkey, destination: Pubkey, lamports: u64) {
            let slot = self.history.lock().unwrap_or_else(|p| p.into_inner()).len() as u64 + 1;
            self.push_transaction(ParsedTransaction {
                signature: signature.to_string(),
                slot,
                block_time: None,
                failed: false,
                instructions: vec![ParsedInstruction::NativeTransfer {
                    source,
                    destination,
                    lamports,
                }],
            });
        }

        pub fn calls(&self) -> Vec<MockCall> {
            self.calls.lock().unwrap_or_else(|p| p.into_inner()).clone()
        }

        pub fn transfer_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, MockCall::Transfer { .. }))
                .count()
        }

        pub fn burn_count(&self) -> usize {
            self.calls()
                .iter()
                .filter(|c| matches!(c, MockCall::Burn { .. }))
                .count()
        }

        pub fn fetch_count(&self) -> usize {
            self.fetch_count.load(Ordering::SeqCst)
        }

        pub fn set_native_balance(&self, address: Pubkey, lamports: u64) {
            self.native_balances
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .insert(address, lamports);
        }

        pub fn set_token_balance(&self, owner: Pubkey, amount: u64) {
            self.token_balances
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .insert(owner, amount);
        }

        pub fn set_fail_list(&self, fail: bool) {
            self.fail_list.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_fetch(&self, fail: bool) {
            self.fail_fetch.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_transfer(&self, fail: bool) {
            self.fail_transfer.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_burn(&self, fail: bool) {
            self.fail_burn.store(fail, Ordering::SeqCst);
        }

        /// Payouts are sent but their outcome stays unknown
        pub fn set_unresolved_transfer(&self, unresolved: bool) {
            self.unresolved_transfer.store(unresolved, Ordering::SeqCst);
        }

        pub fn set_list_delay(&self, delay: Duration) {
            *self.list_delay.lock().unwrap_or_else(|p| p.into_inner()) = Some(delay);
        }

        fn record(&self, call: MockCall) -> String {
            let mut calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
            calls.push(call);
            format!("mock-sig-{}", calls.len())
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn recent_signatures(
            &self,
            _address: &Pubkey,
            limit: usize,
        ) -> Result<Vec<SignatureInfo>, ChainError> {
            let delay = *self.list_delay.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(ChainError::Mock("list failed".to_string()));
            }
            let history = self.history.lock().unwrap_or_else(|p| p.into_inner());
            Ok(history
                .iter()
                .rev()
                .take(limit)
                .map(|tx| SignatureInfo {
                    signature: tx.signature.clone(),
                    slot: tx.slot,
                    failed: tx.failed,
                })
                .collect())
        }

        async fn transaction(
            &self,
            signature: &str,
        ) -> Result<Option<ParsedTransaction>, ChainError> {
            self.fetch_count.fetch_add(1, Ordering::SeqCst);
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(ChainError::Mock("fetch failed".to_string()));
            }
            let history = self.history.lock().unwrap_or_else(|p| p.into_inner());
            Ok(history.iter().find(|tx| tx.signature == signature).cloned())
        }

        async fn transfer_tokens(
            &self,
            recipient: &Pubkey,
            amount: u64,
        ) -> Result<String, ChainError> {
            if self.fail_transfer.load(Ordering::SeqCst) {
                return Err(ChainError::Mock("transfer failed".to_string()));
            }
            let signature = self.record(MockCall::Transfer {
                recipient: *recipient,
                amount,
            });
            if self.unresolved_transfer.load(Ordering::SeqCst) {
                return Err(ChainError::Unresolved { signature });
            }
            Ok(signature)
        }

        async fn burn_tokens(&self, amount: u64) -> Result<String, ChainError> {
            if self.fail_burn.load(Ordering::SeqCst) {
                return Err(ChainError::Mock("burn failed".to_string()));
            }
            Ok(self.record(MockCall::Burn { amount }))
        }

        async fn native_balance(&self, address: &Pubkey) -> Result<u64, ChainError> {
            Ok(self
                .native_balances
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(address)
                .copied()
                .unwrap_or(0))
        }

        async fn token_balance(&self, owner: &Pubkey) -> Result<u64, ChainError> {
            Ok(self
                .token_balances
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(owner)
                .copied()
                .unwrap_or(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockCall, MockChain};
    use super::*;

    fn key(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    #[tokio::test]
    async fn test_mock_lists_newest_first_and_honours_limit() {
        let chain = MockChain::new();
        chain.push_deposit("a", key(2), key(3), 10);
        chain.push_deposit("b", key(2), key(3), 20);
        chain.push_deposit("c", key(2), key(3), 30);

        let listed = chain.recent_signatures(&key(3), 2).await.unwrap();
        let sigs: Vec<_> = listed.iter().map(|s| s.signature.as_str()).collect();
        assert_eq!(sigs, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_mock_records_payouts_and_failures() {
        let chain = MockChain::new();
        chain.transfer_tokens(&key(2), 5).await.unwrap();
        chain.set_fail_burn(true);
        assert!(chain.burn_tokens(1).await.is_err());

        assert_eq!(
            chain.calls(),
            vec![MockCall::Transfer {
                recipient: key(2),
                amount: 5
            }]
        );
        assert_eq!(chain.transfer_count(), 1);
        assert_eq!(chain.burn_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_unresolved_transfer_is_still_sent() {
        let chain = MockChain::new();
        chain.set_unresolved_transfer(true);

        let err = chain.transfer_tokens(&key(2), 5).await.unwrap_err();
        assert!(matches!(err, ChainError::Unresolved { ref signature } if signature == "mock-sig-1"));
        assert_eq!(chain.transfer_count(), 1);
    }
}
