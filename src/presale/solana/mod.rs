//! Solana chain support
//!
//! Key handling over `solana-sdk` and the RPC-backed `ChainClient`.

pub mod keys;
pub mod rpc;

pub use keys::{KeyError, Keypair, Pubkey, Signer};
pub use rpc::SolanaRpcClient;
