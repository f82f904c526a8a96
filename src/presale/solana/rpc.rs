//! Solana RPC Chain Client
//!
//! Reads go through `jsonParsed` encodings so deposit classification never
//! has to decode raw instruction data. Writes are signed locally with the
//! distributor key and followed until they land, fail, or their blockhash
//! expires. A send whose fate is still open when the confirm timeout runs
//! out is reported as `ChainError::Unresolved`, never as a failure.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_client::rpc_request::{RpcError, RpcRequest};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::{TransactionStatus, UiTransactionEncoding};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::keys::{Keypair, Pubkey, Signer, associated_token_address};
use crate::config::ChainConfig;
use crate::money::whole_to_base_units;
use crate::presale::chain::{ChainClient, ParsedInstruction, ParsedTransaction, SignatureInfo};
use crate::presale::error::ChainError;

#[derive(Deserialize)]
struct RpcContextValue<T> {
    value: T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransactionWithMeta {
    slot: u64,
    block_time: Option<i64>,
    meta: Option<RpcTransactionMeta>,
    transaction: RpcTransaction,
}

#[derive(Deserialize)]
struct RpcTransactionMeta {
    err: Option<Value>,
}

#[derive(Deserialize)]
struct RpcTransaction {
    signatures: Vec<String>,
    message: RpcMessage,
}

#[derive(Deserialize)]
struct RpcMessage {
    instructions: Vec<RpcInstruction>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RpcInstruction {
    Parsed {
        program: String,
        parsed: Value,
    },
    Compiled {
        #[serde(rename = "programId")]
        program_id: String,
    },
}

#[derive(Deserialize)]
struct SystemInstruction {
    #[serde(rename = "type")]
    kind: String,
    info: SystemTransferInfo,
}

#[derive(Deserialize)]
struct SystemTransferInfo {
    source: String,
    destination: String,
    lamports: u64,
}

#[derive(Deserialize)]
struct RpcKeyedTokenAccount {
    account: RpcTokenAccount,
}

#[derive(Deserialize)]
struct RpcTokenAccount {
    data: RpcTokenAccountData,
}

#[derive(Deserialize)]
struct RpcTokenAccountData {
    parsed: RpcTokenAccountParsed,
}

#[derive(Deserialize)]
struct RpcTokenAccountParsed {
    info: RpcTokenAccountInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTokenAccountInfo {
    token_amount: RpcTokenAmount,
}

#[derive(Deserialize)]
struct RpcTokenAmount {
    amount: String,
}

/// Where a sent signature stands
enum Landing {
    /// Reached the configured commitment
    Confirmed,
    /// Executed with an error
    Failed(String),
    /// Seen by the node, not yet at the configured commitment
    Pending,
    /// Not seen by the node
    Unknown,
}

fn landing(status: Option<TransactionStatus>, commitment: CommitmentConfig) -> Landing {
    match status {
        None => Landing::Unknown,
        Some(status) => match status.err {
            Some(err) => Landing::Failed(err.to_string()),
            None if status.satisfies_commitment(commitment) => Landing::Confirmed,
            None => Landing::Pending,
        },
    }
}

fn map_client_error(err: ClientError) -> ChainError {
    match &err.kind {
        ClientErrorKind::RpcError(RpcError::RpcResponseError { code, message, .. }) => {
            ChainError::Rpc {
                code: *code,
                message: message.clone(),
            }
        }
        ClientErrorKind::Reqwest(_) | ClientErrorKind::Io(_) => {
            ChainError::RpcConnection(err.to_string())
        }
        _ => ChainError::Malformed(err.to_string()),
    }
}

/// Chain client backed by a Solana JSON-RPC node
pub struct SolanaRpcClient {
    client: RpcClient,
    commitment: CommitmentConfig,
    confirm_timeout: Duration,
    status_poll: Duration,
    distributor: Keypair,
    mint: Pubkey,
    decimals: u8,
}

impl SolanaRpcClient {
    pub fn new(
        config: &ChainConfig,
        distributor: Keypair,
        mint: Pubkey,
        decimals: u8,
    ) -> Result<Self, ChainError> {
        let commitment = CommitmentConfig::from_str(&config.commitment)
            .map_err(|_| ChainError::Commitment(config.commitment.clone()))?;

        info!(
            "Initializing Solana RPC client at {} (commitment {}, distributor {})",
            config.rpc_url,
            config.commitment,
            distributor.pubkey()
        );

        let client = RpcClient::new_with_timeout_and_commitment(
            config.rpc_url.clone(),
            Duration::from_millis(config.request_timeout_ms),
            commitment,
        );

        Ok(Self {
            client,
            commitment,
            confirm_timeout: Duration::from_millis(config.confirm_timeout_ms),
            status_poll: Duration::from_millis(config.status_poll_ms),
            distributor,
            mint,
            decimals,
        })
    }

    fn to_base_units(&self, amount: u64) -> Result<u64, ChainError> {
        whole_to_base_units(amount, self.decimals as u32)
            .map_err(|_| ChainError::AmountOverflow(amount))
    }

    fn distributor_token_account(&self) -> Pubkey {
        associated_token_address(&self.distributor.pubkey(), &self.mint)
    }

    fn send_config(&self, skip_preflight: bool) -> RpcSendTransactionConfig {
        RpcSendTransactionConfig {
            skip_preflight,
            preflight_commitment: Some(self.commitment.commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            ..RpcSendTransactionConfig::default()
        }
    }

    /// Sign, send and follow a transaction to a definite outcome
    ///
    /// Only an error object from `sendTransaction` proves the node refused
    /// the transaction. Any other send failure may still have reached the
    /// cluster, so the signature is followed like an accepted one.
    async fn submit(&self, instructions: &[Instruction]) -> Result<Signature, ChainError> {
        let (blockhash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(self.commitment)
            .await
            .map_err(map_client_error)?;

        let payer = self.distributor.pubkey();
        let transaction = Transaction::new_signed_with_payer(
            instructions,
            Some(&payer),
            &[&self.distributor],
            blockhash,
        );
        let signature = transaction
            .signatures
            .first()
            .copied()
            .ok_or_else(|| ChainError::Malformed("unsigned transaction".to_string()))?;

        match self
            .client
            .send_transaction_with_config(&transaction, self.send_config(false))
            .await
        {
            Ok(_) => debug!("Submitted transaction {}", signature),
            Err(e) => {
                if let ClientErrorKind::RpcError(RpcError::RpcResponseError { message, .. }) =
                    &e.kind
                {
                    return Err(ChainError::Rejected {
                        signature: signature.to_string(),
                        reason: message.clone(),
                    });
                }
                warn!(%signature, "Send outcome unknown, following signature: {}", e);
            }
        }

        self.confirm(&transaction, &signature, last_valid_block_height)
            .await?;
        Ok(signature)
    }

    async fn status(
        &self,
        signature: &Signature,
        history: bool,
    ) -> Result<Option<TransactionStatus>, ClientError> {
        let statuses = if history {
            self.client
                .get_signature_statuses_with_history(&[*signature])
                .await?
        } else {
            self.client.get_signature_statuses(&[*signature]).await?
        };
        Ok(statuses.value.into_iter().next().flatten())
    }

    /// Poll until the signature lands, fails, or its blockhash expires
    ///
    /// Status and block height errors are transient and only cost a poll.
    /// While the blockhash is still valid an unseen transaction is
    /// re-broadcast; the signature, and so the payout, stays the same.
    async fn confirm(
        &self,
        transaction: &Transaction,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Result<(), ChainError> {
        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            match self.status(signature, false).await {
                Ok(status) => match landing(status, self.commitment) {
                    Landing::Confirmed => return Ok(()),
                    Landing::Failed(reason) => {
                        return Err(ChainError::Rejected {
                            signature: signature.to_string(),
                            reason,
                        });
                    }
                    Landing::Pending => debug!("{} seen, awaiting commitment", signature),
                    Landing::Unknown => {
                        if let Some(outcome) =
                            self.check_expiry(transaction, signature, last_valid_block_height).await
                        {
                            return outcome;
                        }
                    }
                },
                Err(e) => warn!(%signature, "Signature status unavailable: {}", e),
            }

            if Instant::now() >= deadline {
                warn!(%signature, "Transaction outcome unknown at confirm timeout");
                return Err(ChainError::Unresolved {
                    signature: signature.to_string(),
                });
            }
            sleep(self.status_poll).await;
        }
    }

    /// `Some` once the blockhash has expired and the outcome is final
    async fn check_expiry(
        &self,
        transaction: &Transaction,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Option<Result<(), ChainError>> {
        let height = match self
            .client
            .get_block_height_with_commitment(self.commitment)
            .await
        {
            Ok(height) => height,
            Err(e) => {
                warn!(%signature, "Block height unavailable: {}", e);
                return None;
            }
        };

        if height <= last_valid_block_height {
            if let Err(e) = self
                .client
                .send_transaction_with_config(transaction, self.send_config(true))
                .await
            {
                debug!("Re-broadcast of {} failed: {}", signature, e);
            }
            return None;
        }

        // Expired. One last look, including history, before calling it
        match self.status(signature, true).await {
            Ok(status) => match landing(status, CommitmentConfig::processed()) {
                Landing::Confirmed | Landing::Pending => Some(Ok(())),
                Landing::Failed(reason) => Some(Err(ChainError::Rejected {
                    signature: signature.to_string(),
                    reason,
                })),
                Landing::Unknown => {
                    warn!(
                        %signature,
                        height,
                        last_valid_block_height,
                        "Blockhash expired before the transaction landed"
                    );
                    Some(Err(ChainError::Expired(signature.to_string())))
                }
            },
            Err(e) => {
                warn!(%signature, "Signature history unavailable: {}", e);
                None
            }
        }
    }
}

fn parse_instruction(ix: RpcInstruction) -> ParsedInstruction {
    match ix {
        RpcInstruction::Parsed { program, parsed } if program == "system" => {
            let transfer = serde_json::from_value::<SystemInstruction>(parsed)
                .ok()
                .filter(|p| p.kind == "transfer");
            let Some(transfer) = transfer else {
                return ParsedInstruction::Other { program };
            };
            match (
                Pubkey::from_str(&transfer.info.source),
                Pubkey::from_str(&transfer.info.destination),
            ) {
                (Ok(source), Ok(destination)) => ParsedInstruction::NativeTransfer {
                    source,
                    destination,
                    lamports: transfer.info.lamports,
                },
                _ => ParsedInstruction::Other { program },
            }
        }
        RpcInstruction::Parsed { program, .. } => ParsedInstruction::Other { program },
        RpcInstruction::Compiled { program_id } => ParsedInstruction::Other {
            program: program_id,
        },
    }
}

fn parse_transaction(signature: &str, raw: RpcTransactionWithMeta) -> ParsedTransaction {
    // Missing meta means success cannot be established; treat as failed
    let failed = raw.meta.is_none_or(|meta| meta.err.is_some());
    ParsedTransaction {
        signature: raw
            .transaction
            .signatures
            .into_iter()
            .next()
            .unwrap_or_else(|| signature.to_string()),
        slot: raw.slot,
        block_time: raw.block_time,
        failed,
        instructions: raw
            .transaction
            .message
            .instructions
            .into_iter()
            .map(parse_instruction)
            .collect(),
    }
}

#[async_trait]
impl ChainClient for SolanaRpcClient {
    async fn recent_signatures(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, ChainError> {
        let infos = self
            .client
            .get_signatures_for_address_with_config(
                address,
                GetConfirmedSignaturesForAddress2Config {
                    before: None,
                    until: None,
                    limit: Some(limit),
                    commitment: Some(self.commitment),
                },
            )
            .await
            .map_err(map_client_error)?;

        Ok(infos
            .into_iter()
            .map(|info| SignatureInfo {
                signature: info.signature,
                slot: info.slot,
                failed: info.err.is_some(),
            })
            .collect())
    }

    async fn transaction(&self, signature: &str) -> Result<Option<ParsedTransaction>, ChainError> {
        let raw: Option<RpcTransactionWithMeta> = self
            .client
            .send(
                RpcRequest::GetTransaction,
                json!([
                    signature,
                    {
                        "encoding": "jsonParsed",
                        "commitment": self.commitment.commitment,
                        "maxSupportedTransactionVersion": 0
                    }
                ]),
            )
            .await
            .map_err(map_client_error)?;

        Ok(raw.map(|raw| parse_transaction(signature, raw)))
    }

    async fn transfer_tokens(&self, recipient: &Pubkey, amount: u64) -> Result<String, ChainError> {
        let base_units = self.to_base_units(amount)?;
        let payer = self.distributor.pubkey();
        let source = self.distributor_token_account();
        let destination = associated_token_address(recipient, &self.mint);

        let instructions = [
            spl_associated_token_account::instruction::create_associated_token_account_idempotent(
                &payer,
                recipient,
                &self.mint,
                &spl_token::id(),
            ),
            spl_token::instruction::transfer_checked(
                &spl_token::id(),
                &source,
                &self.mint,
                &destination,
                &payer,
                &[],
                base_units,
                self.decimals,
            )
            .map_err(|e| ChainError::Instruction(e.to_string()))?,
        ];

        let signature = self.submit(&instructions).await?;
        info!(
            "Transferred {} tokens to {} (tx: {})",
            amount, recipient, signature
        );
        Ok(signature.to_string())
    }

    async fn burn_tokens(&self, amount: u64) -> Result<String, ChainError> {
        let base_units = self.to_base_units(amount)?;
        let burn = spl_token::instruction::burn_checked(
            &spl_token::id(),
            &self.distributor_token_account(),
            &self.mint,
            &self.distributor.pubkey(),
            &[],
            base_units,
            self.decimals,
        )
        .map_err(|e| ChainError::Instruction(e.to_string()))?;

        let signature = self.submit(&[burn]).await?;
        info!("Burned {} tokens (tx: {})", amount, signature);
        Ok(signature.to_string())
    }

    async fn native_balance(&self, address: &Pubkey) -> Result<u64, ChainError> {
        let balance = self
            .client
            .get_balance_with_commitment(address, self.commitment)
            .await
            .map_err(map_client_error)?;
        Ok(balance.value)
    }

    async fn token_balance(&self, owner: &Pubkey) -> Result<u64, ChainError> {
        let accounts: RpcContextValue<Vec<RpcKeyedTokenAccount>> = self
            .client
            .send(
                RpcRequest::GetTokenAccountsByOwner,
                json!([
                    owner.to_string(),
                    { "mint": self.mint.to_string() },
                    { "encoding": "jsonParsed", "commitment": self.commitment.commitment }
                ]),
            )
            .await
            .map_err(map_client_error)?;

        let mut total = 0u64;
        for keyed in &accounts.value {
            let amount: u64 = keyed
                .account
                .data
                .parsed
                .info
                .token_amount
                .amount
                .parse()
                .map_err(|e| ChainError::Malformed(format!("token amount: {}", e)))?;
            total = total.saturating_add(amount);
        }
        Ok(total)
    }
}
