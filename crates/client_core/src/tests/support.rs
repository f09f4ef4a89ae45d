use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use async_trait::async_trait;
use ethers_core::{
    abi::{self, Token},
    types::U256,
};
use serde_json::{json, Value};
use shared::{
    domain::AccountAddress,
    error::USER_REJECTED_REQUEST,
    protocol::method,
};

use crate::{
    contract::{VotingAbi, VotingCall},
    provider::{ProviderError, WalletProvider},
};

pub(crate) const ALICE: &str = "0xaaa0000000000000000000000000000000000001";
pub(crate) const BOB: &str = "0xbbb0000000000000000000000000000000000002";

pub(crate) fn account(raw: &str) -> AccountAddress {
    AccountAddress::new(raw)
}

#[derive(Default)]
pub(crate) struct ChainState {
    pub authorized: Vec<String>,
    // handed out by eth_requestAccounts
    pub grant_on_request: Vec<String>,
    pub reject_account_request: bool,
    pub total: u64,
    pub for_a: u64,
    pub for_b: u64,
    pub winner: String,
    pub methods: Vec<String>,
    pub reads: Vec<VotingCall>,
    pub sent: Vec<Value>,
    pub reject_sends: bool,
    pub revert_sends: bool,
    pub hold_receipts: bool,
    // receipt requests never answer
    pub stall_receipts: bool,
    pub fail_reads_after_send: bool,
    pub fail_reads: Option<ProviderError>,
    pub receipts: HashMap<String, Value>,
}

impl ChainState {
    pub(crate) fn with_counts(total: u64, for_a: u64, for_b: u64) -> Self {
        Self {
            total,
            for_a,
            for_b,
            winner: "Party A".to_string(),
            ..Self::default()
        }
    }

    pub(crate) fn read_count(&self, call: VotingCall) -> usize {
        self.reads.iter().filter(|read| **read == call).count()
    }

    pub(crate) fn method_count(&self, name: &str) -> usize {
        self.methods.iter().filter(|m| m.as_str() == name).count()
    }
}

pub(crate) struct ScriptedWallet {
    abi: VotingAbi,
    state: StdMutex<ChainState>,
}

impl ScriptedWallet {
    pub(crate) fn new(state: ChainState) -> Arc<Self> {
        Arc::new(Self {
            abi: VotingAbi::embedded().expect("embedded abi"),
            state: StdMutex::new(state),
        })
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        let mut guard = self.state.lock().expect("chain state lock");
        f(&mut guard)
    }

    fn calldata(params: &Value) -> Vec<u8> {
        let raw = params[0]["data"].as_str().unwrap_or_default();
        hex::decode(raw.trim_start_matches("0x")).expect("calldata hex")
    }

    fn selector_call(&self, data: &[u8]) -> VotingCall {
        VotingCall::ALL
            .into_iter()
            .find(|call| {
                self.abi
                    .function(*call)
                    .map(|function| data.len() >= 4 && function.short_signature() == data[..4])
                    .unwrap_or(false)
            })
            .expect("known selector")
    }

    fn eth_call(&self, state: &mut ChainState, params: &Value) -> Result<Value, ProviderError> {
        let call = self.selector_call(&Self::calldata(params));
        state.reads.push(call);
        if let Some(err) = &state.fail_reads {
            return Err(err.clone());
        }

        let token = match call {
            VotingCall::TotalVotes => Token::Uint(U256::from(state.total)),
            VotingCall::VotesForPartyA => Token::Uint(U256::from(state.for_a)),
            VotingCall::VotesForPartyB => Token::Uint(U256::from(state.for_b)),
            VotingCall::WinningParty => Token::String(state.winner.clone()),
            other => panic!("eth_call on mutating function {other}"),
        };
        Ok(json!(format!("0x{}", hex::encode(abi::encode(&[token])))))
    }

    fn send_transaction(
        &self,
        state: &mut ChainState,
        params: &Value,
    ) -> Result<Value, ProviderError> {
        state.sent.push(params[0].clone());
        if state.reject_sends {
            return Err(ProviderError::Rpc {
                code: USER_REJECTED_REQUEST,
                message: "User denied transaction signature.".to_string(),
            });
        }

        let data = Self::calldata(params);
        let call = self.selector_call(&data);
        let amount = self
            .abi
            .function(call)
            .expect("function")
            .decode_input(&data[4..])
            .expect("decode input")
            .into_iter()
            .next()
            .and_then(Token::into_uint)
            .expect("uint argument")
            .low_u64();

        let status = if state.revert_sends {
            "0x0"
        } else {
            match call {
                VotingCall::SetTotalVotes => state.total = amount,
                VotingCall::VoteForPartyA => state.for_a += amount,
                VotingCall::VoteForPartyB => state.for_b += amount,
                other => panic!("transaction to read-only function {other}"),
            }
            "0x1"
        };

        if state.fail_reads_after_send {
            state.fail_reads = Some(ProviderError::Transport("node restarting".to_string()));
        }

        let hash = format!("0x{:064x}", state.sent.len());
        state.receipts.insert(
            hash.clone(),
            json!({
                "transactionHash": hash,
                "blockNumber": format!("0x{:x}", state.sent.len()),
                "status": status,
            }),
        );
        Ok(json!(hash))
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    async fn request(&self, name: &str, params: Value) -> Result<Value, ProviderError> {
        if name == method::GET_TRANSACTION_RECEIPT && self.with_state(|state| state.stall_receipts) {
            std::future::pending::<()>().await;
        }
        self.with_state(|state| {
            state.methods.push(name.to_string());
            match name {
                method::CHAIN_ID => Ok(json!("0x7a69")),
                method::ACCOUNTS => Ok(json!(state.authorized)),
                method::REQUEST_ACCOUNTS => {
                    if state.reject_account_request {
                        return Err(ProviderError::Rpc {
                            code: USER_REJECTED_REQUEST,
                            message: "User rejected the request.".to_string(),
                        });
                    }
                    state.authorized = state.grant_on_request.clone();
                    Ok(json!(state.authorized))
                }
                method::CALL => self.eth_call(state, &params),
                method::SEND_TRANSACTION => self.send_transaction(state, &params),
                method::GET_TRANSACTION_RECEIPT => {
                    if state.hold_receipts {
                        return Ok(Value::Null);
                    }
                    let hash = params[0].as_str().unwrap_or_default();
                    Ok(state.receipts.get(hash).cloned().unwrap_or(Value::Null))
                }
                other => Err(ProviderError::Rpc {
                    code: -32601,
                    message: format!("method {other} not supported"),
                }),
            }
        })
    }
}
