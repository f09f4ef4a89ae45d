use std::{fmt, path::Path, sync::Arc, time::Duration};

use ethers_core::{
    abi::{Abi, Function, Token},
    types::{Address, U256},
};
use serde::Deserialize;
use serde_json::json;
use shared::{
    domain::{AccountAddress, TxHash},
    protocol::{method, CallRequest, TransactionReceipt, TransactionRequest},
};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    input::VoteAmount,
    provider::{decode_result, ProviderError, WalletProvider},
};

pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const EMBEDDED_VOTING_ARTIFACT: &str = include_str!("../abi/Voting.json");
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_CONSECUTIVE_RECEIPT_ERRORS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VotingCall {
    TotalVotes,
    VotesForPartyA,
    VotesForPartyB,
    WinningParty,
    SetTotalVotes,
    VoteForPartyA,
    VoteForPartyB,
}

impl VotingCall {
    pub const ALL: [VotingCall; 7] = [
        VotingCall::TotalVotes,
        VotingCall::VotesForPartyA,
        VotingCall::VotesForPartyB,
        VotingCall::WinningParty,
        VotingCall::SetTotalVotes,
        VotingCall::VoteForPartyA,
        VotingCall::VoteForPartyB,
    ];

    pub fn function_name(self) -> &'static str {
        match self {
            VotingCall::TotalVotes => "totalVotes",
            VotingCall::VotesForPartyA => "votesForPartyA",
            VotingCall::VotesForPartyB => "votesForPartyB",
            VotingCall::WinningParty => "winningParty",
            VotingCall::SetTotalVotes => "setTotalVotes",
            VotingCall::VoteForPartyA => "voteForPartyA",
            VotingCall::VoteForPartyB => "voteForPartyB",
        }
    }
}

impl fmt::Display for VotingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.function_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("failed to read contract artifact {path}: {reason}")]
    ArtifactIo { path: String, reason: String },
    #[error("failed to parse contract artifact: {0}")]
    Artifact(String),
    #[error("contract interface is missing function `{0}`")]
    MissingFunction(VotingCall),
    #[error("failed to encode `{call}` arguments: {reason}")]
    Encode { call: VotingCall, reason: String },
    #[error("failed to decode `{call}` output: {reason}")]
    Decode { call: VotingCall, reason: String },
    #[error("`{call}` returned {value}, which does not fit in u64")]
    Overflow { call: VotingCall, value: String },
    #[error("invalid contract address `{0}`")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionFailure {
    #[error("transaction rejected in wallet: {0}")]
    Rejected(String),
    #[error("failed to submit transaction: {0}")]
    Submit(ProviderError),
    #[error("transaction {hash} reverted")]
    Reverted { hash: TxHash },
    #[error("transaction {hash} dropped: {reason}")]
    Dropped { hash: TxHash, reason: String },
    #[error("transaction {hash} not confirmed within {waited:?}")]
    Timeout { hash: TxHash, waited: Duration },
}

impl TransactionFailure {
    pub fn is_transient(&self) -> bool {
        match self {
            TransactionFailure::Submit(err) => err.is_transient(),
            TransactionFailure::Timeout { .. } | TransactionFailure::Dropped { .. } => true,
            TransactionFailure::Rejected(_) | TransactionFailure::Reverted { .. } => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error(transparent)]
    Abi(#[from] AbiError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Transaction(#[from] TransactionFailure),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactFormat {
    Bare(Abi),
    Hardhat { abi: Abi },
}

#[derive(Debug, Clone)]
pub struct VotingAbi {
    abi: Abi,
}

impl VotingAbi {
    pub fn embedded() -> Result<Self, AbiError> {
        Self::from_artifact_json(EMBEDDED_VOTING_ARTIFACT)
    }

    pub fn from_artifact_path(path: &Path) -> Result<Self, AbiError> {
        let raw = std::fs::read_to_string(path).map_err(|err| AbiError::ArtifactIo {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Self::from_artifact_json(&raw)
    }

    /// Accepts a Hardhat artifact (`{"abi": [...]}`) or a bare ABI array.
    pub fn from_artifact_json(raw: &str) -> Result<Self, AbiError> {
        let abi = match serde_json::from_str::<ArtifactFormat>(raw)
            .map_err(|err| AbiError::Artifact(err.to_string()))?
        {
            ArtifactFormat::Bare(abi) | ArtifactFormat::Hardhat { abi } => abi,
        };

        let loaded = Self { abi };
        for call in VotingCall::ALL {
            loaded.function(call)?;
        }
        Ok(loaded)
    }

    pub fn function(&self, call: VotingCall) -> Result<&Function, AbiError> {
        self.abi
            .function(call.function_name())
            .map_err(|_| AbiError::MissingFunction(call))
    }

    pub fn encode(&self, call: VotingCall, args: &[Token]) -> Result<Vec<u8>, AbiError> {
        self.function(call)?
            .encode_input(args)
            .map_err(|err| AbiError::Encode {
                call,
                reason: err.to_string(),
            })
    }

    pub fn decode(&self, call: VotingCall, output: &[u8]) -> Result<Vec<Token>, AbiError> {
        self.function(call)?
            .decode_output(output)
            .map_err(|err| AbiError::Decode {
                call,
                reason: err.to_string(),
            })
    }
}

pub fn parse_contract_address(raw: &str) -> Result<Address, AbiError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| AbiError::InvalidAddress(raw.to_string()))
}

fn first_token(call: VotingCall, tokens: Vec<Token>) -> Result<Token, AbiError> {
    tokens.into_iter().next().ok_or_else(|| AbiError::Decode {
        call,
        reason: "empty output".to_string(),
    })
}

pub(crate) fn token_to_u64(call: VotingCall, token: Token) -> Result<u64, AbiError> {
    let value = token.into_uint().ok_or_else(|| AbiError::Decode {
        call,
        reason: "expected an unsigned integer".to_string(),
    })?;
    if value > U256::from(u64::MAX) {
        return Err(AbiError::Overflow {
            call,
            value: value.to_string(),
        });
    }
    Ok(value.low_u64())
}

fn token_to_display(token: Token) -> String {
    match token {
        Token::String(value) => value,
        other => other.to_string(),
    }
}

fn decode_hex_payload(call: VotingCall, raw: &str) -> Result<Vec<u8>, AbiError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|err| AbiError::Decode {
        call,
        reason: format!("invalid hex payload: {err}"),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub timeout: Option<Duration>,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: Some(DEFAULT_CONFIRMATION_TIMEOUT),
        }
    }
}

#[derive(Clone)]
pub struct Signer {
    provider: Arc<dyn WalletProvider>,
    address: AccountAddress,
}

impl Signer {
    pub fn new(provider: Arc<dyn WalletProvider>, address: AccountAddress) -> Self {
        Self { provider, address }
    }

    pub async fn send_transaction(&self, to: Address, data: Vec<u8>) -> Result<TxHash, ProviderError> {
        let request = TransactionRequest {
            from: self.address.clone(),
            to: format!("{to:?}"),
            data: format!("0x{}", hex::encode(data)),
        };
        let value = self
            .provider
            .request(method::SEND_TRANSACTION, json!([request]))
            .await?;
        decode_result(method::SEND_TRANSACTION, value)
    }
}

pub struct PendingTransaction {
    hash: TxHash,
    provider: Arc<dyn WalletProvider>,
}

impl PendingTransaction {
    pub fn new(hash: TxHash, provider: Arc<dyn WalletProvider>) -> Self {
        Self { hash, provider }
    }

    pub fn hash(&self) -> &TxHash {
        &self.hash
    }

    pub async fn wait(self, policy: ConfirmationPolicy) -> Result<TransactionReceipt, TransactionFailure> {
        let started = Instant::now();
        let deadline = policy.timeout.map(|timeout| started + timeout);
        let mut consecutive_errors = 0;

        loop {
            let request = self
                .provider
                .request(method::GET_TRANSACTION_RECEIPT, json!([self.hash]));
            let polled = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, request).await {
                    Ok(polled) => polled,
                    Err(_) => {
                        warn!("contract: receipt request stalled past deadline tx={}", self.hash);
                        return Err(TransactionFailure::Timeout {
                            hash: self.hash.clone(),
                            waited: started.elapsed(),
                        });
                    }
                },
                None => request.await,
            };

            match polled {
                Ok(value) if value.is_null() => {
                    consecutive_errors = 0;
                    debug!("contract: receipt pending tx={}", self.hash);
                }
                Ok(value) => {
                    let receipt: TransactionReceipt =
                        decode_result(method::GET_TRANSACTION_RECEIPT, value).map_err(|err| {
                            TransactionFailure::Dropped {
                                hash: self.hash.clone(),
                                reason: err.to_string(),
                            }
                        })?;
                    if receipt.succeeded() {
                        info!(
                            "contract: transaction confirmed tx={} block={}",
                            self.hash,
                            receipt.block_number.as_deref().unwrap_or("unknown")
                        );
                        return Ok(receipt);
                    }
                    warn!("contract: transaction reverted tx={}", self.hash);
                    return Err(TransactionFailure::Reverted { hash: self.hash });
                }
                Err(err) if err.is_transient() && consecutive_errors < MAX_CONSECUTIVE_RECEIPT_ERRORS => {
                    consecutive_errors += 1;
                    warn!(
                        "contract: receipt poll failed tx={} attempt={consecutive_errors} error={err}",
                        self.hash
                    );
                }
                Err(err) => {
                    return Err(TransactionFailure::Dropped {
                        hash: self.hash,
                        reason: err.to_string(),
                    })
                }
            }

            if let Some(timeout) = policy.timeout {
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(TransactionFailure::Timeout {
                        hash: self.hash,
                        waited,
                    });
                }
            }
            tokio::time::sleep(policy.poll_interval).await;
        }
    }
}

pub struct VotingContractClient {
    signer: Signer,
    address: Address,
    abi: Arc<VotingAbi>,
}

impl VotingContractClient {
    pub fn new(signer: Signer, address: Address, abi: Arc<VotingAbi>) -> Self {
        Self {
            signer,
            address,
            abi,
        }
    }

    async fn call(&self, call: VotingCall) -> Result<Token, ContractError> {
        let data = self.abi.encode(call, &[])?;
        let request = CallRequest {
            from: Some(self.signer.address.clone()),
            to: format!("{:?}", self.address),
            data: format!("0x{}", hex::encode(data)),
        };
        let value = self
            .signer
            .provider
            .request(method::CALL, json!([request, "latest"]))
            .await?;
        let raw: String = decode_result(method::CALL, value)?;
        let output = decode_hex_payload(call, &raw)?;
        Ok(first_token(call, self.abi.decode(call, &output)?)?)
    }

    async fn read_count(&self, call: VotingCall) -> Result<u64, ContractError> {
        let token = self.call(call).await?;
        Ok(token_to_u64(call, token)?)
    }

    pub async fn total_votes(&self) -> Result<u64, ContractError> {
        self.read_count(VotingCall::TotalVotes).await
    }

    pub async fn votes_for_party_a(&self) -> Result<u64, ContractError> {
        self.read_count(VotingCall::VotesForPartyA).await
    }

    pub async fn votes_for_party_b(&self) -> Result<u64, ContractError> {
        self.read_count(VotingCall::VotesForPartyB).await
    }

    pub async fn winning_party(&self) -> Result<String, ContractError> {
        let token = self.call(VotingCall::WinningParty).await?;
        Ok(token_to_display(token))
    }

    async fn transact(
        &self,
        call: VotingCall,
        amount: VoteAmount,
    ) -> Result<PendingTransaction, ContractError> {
        let data = self.abi.encode(call, &[Token::Uint(amount.as_u256())])?;
        let hash = self
            .signer
            .send_transaction(self.address, data)
            .await
            .map_err(|err| {
                if err.is_user_rejection() {
                    TransactionFailure::Rejected(err.to_string())
                } else {
                    TransactionFailure::Submit(err)
                }
            })?;
        info!(
            "contract: transaction submitted call={call} amount={amount} from={} tx={hash}",
            self.signer.address
        );
        Ok(PendingTransaction::new(
            hash,
            Arc::clone(&self.signer.provider),
        ))
    }

    pub async fn set_total_votes(&self, amount: VoteAmount) -> Result<PendingTransaction, ContractError> {
        self.transact(VotingCall::SetTotalVotes, amount).await
    }

    pub async fn vote_for_party_a(&self, amount: VoteAmount) -> Result<PendingTransaction, ContractError> {
        self.transact(VotingCall::VoteForPartyA, amount).await
    }

    pub async fn vote_for_party_b(&self, amount: VoteAmount) -> Result<PendingTransaction, ContractError> {
        self.transact(VotingCall::VoteForPartyB, amount).await
    }
}

#[cfg(test)]
#[path = "tests/contract_tests.rs"]
mod tests;
