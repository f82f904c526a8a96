use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    Malformed(String),

    #[error("Invalid commitment level: {0}")]
    Commitment(String),

    #[error("Failed to build instruction: {0}")]
    Instruction(String),

    /// Refused by the node or executed with an error; nothing moved
    #[error("Transaction {signature} rejected: {reason}")]
    Rejected { signature: String, reason: String },

    /// Blockhash expired without the signature landing; nothing moved
    #[error("Transaction {0} expired before landing")]
    Expired(String),

    /// Sent, but neither landed nor expired before the confirm timeout
    #[error("Transaction {signature} outcome unknown after confirm timeout")]
    Unresolved { signature: String },

    #[error("Token amount {0} overflows base units")]
    AmountOverflow(u64),

    #[error("Mock failure: {0}")]
    Mock(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored value out of range: {0}")]
    OutOfRange(String),
}

#[derive(Debug, Error)]
pub enum PresaleError {
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
