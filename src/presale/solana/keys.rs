//! Addresses and signing keys
//!
//! Address and key types come from `solana-sdk`. The distributor key is
//! accepted in the 64-byte layout written by the Solana CLI
//! (secret || public), either as a JSON byte array or as base58.

pub use solana_sdk::pubkey::Pubkey;
pub use solana_sdk::signature::{Keypair, Signer};

use solana_sdk::signer::keypair::keypair_from_seed;
use thiserror::Error;

const SECRET_LEN: usize = 32;
const KEYPAIR_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid base58: {0}")]
    Base58(String),

    #[error("Expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Secret key does not match its public half")]
    Mismatch,

    #[error("Invalid key file: {0}")]
    File(String),
}

/// Keypair from a 32-byte secret seed
pub fn keypair_from_secret(secret: &[u8; SECRET_LEN]) -> Result<Keypair, KeyError> {
    keypair_from_seed(secret).map_err(|e| KeyError::File(e.to_string()))
}

/// Keypair from the 64-byte secret || public layout
///
/// The public half must be the one the secret derives.
pub fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair, KeyError> {
    if bytes.len() != KEYPAIR_LEN {
        return Err(KeyError::Length {
            expected: KEYPAIR_LEN,
            actual: bytes.len(),
        });
    }
    let (secret, public) = bytes.split_at(SECRET_LEN);
    let secret: &[u8; SECRET_LEN] = secret.try_into().map_err(|_| KeyError::Length {
        expected: SECRET_LEN,
        actual: secret.len(),
    })?;

    let keypair = keypair_from_secret(secret)?;
    if keypair.pubkey().as_ref() != public {
        return Err(KeyError::Mismatch);
    }
    Ok(keypair)
}

/// Keypair from a base58 string or a JSON byte array
pub fn parse_keypair(material: &str) -> Result<Keypair, KeyError> {
    let material = material.trim();
    if material.starts_with('[') {
        let bytes: Vec<u8> =
            serde_json::from_str(material).map_err(|e| KeyError::File(e.to_string()))?;
        return keypair_from_bytes(&bytes);
    }
    let bytes = bs58::decode(material)
        .into_vec()
        .map_err(|e| KeyError::Base58(e.to_string()))?;
    keypair_from_bytes(&bytes)
}

pub fn read_keypair(path: &str) -> Result<Keypair, KeyError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| KeyError::File(format!("{}: {}", path, e)))?;
    parse_keypair(&content)
}

/// Associated token account of `owner` for `mint` under the SPL Token program
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    spl_associated_token_account::get_associated_token_address(owner, mint)
}
