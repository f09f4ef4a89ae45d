use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use shared::{
    domain::AccountAddress,
    error::{UNAUTHORIZED, USER_REJECTED_REQUEST},
    protocol::{method, RpcRequest, RpcResponse},
};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("wallet returned error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("wallet transport failure: {0}")]
    Transport(String),
    #[error("malformed wallet response to {method}: {reason}")]
    MalformedResponse { method: String, reason: String },
}

impl ProviderError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, ProviderError::Rpc { code, .. } if *code == USER_REJECTED_REQUEST)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Rpc { code, .. } if *code == UNAUTHORIZED)
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

#[async_trait]
pub trait WalletDiscovery: Send + Sync {
    async fn discover(&self) -> Option<Arc<dyn WalletProvider>>;
}

pub struct MissingWalletDiscovery;

#[async_trait]
impl WalletDiscovery for MissingWalletDiscovery {
    async fn discover(&self) -> Option<Arc<dyn WalletProvider>> {
        None
    }
}

pub struct InjectedWalletDiscovery {
    provider: Option<Arc<dyn WalletProvider>>,
}

impl InjectedWalletDiscovery {
    pub fn new(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl WalletDiscovery for InjectedWalletDiscovery {
    async fn discover(&self) -> Option<Arc<dyn WalletProvider>> {
        self.provider.clone()
    }
}

pub struct HttpWalletProvider {
    http: Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl HttpWalletProvider {
    pub fn new(endpoint: Url) -> Self {
        Self {
            http: Client::new(),
            endpoint,
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("wallet: request id={id} method={method}");

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&RpcRequest::new(id, method, params))
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let body: RpcResponse =
            response
                .json()
                .await
                .map_err(|err| ProviderError::MalformedResponse {
                    method: method.to_string(),
                    reason: err.to_string(),
                })?;

        if let Some(error) = body.error {
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(body.result.unwrap_or(Value::Null))
    }
}

// A missing endpoint or failed eth_chainId probe means "no wallet".
pub struct HttpWalletDiscovery {
    endpoint: Option<Url>,
}

impl HttpWalletDiscovery {
    pub fn new(endpoint: Option<Url>) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl WalletDiscovery for HttpWalletDiscovery {
    async fn discover(&self) -> Option<Arc<dyn WalletProvider>> {
        let endpoint = self.endpoint.clone()?;
        let provider = HttpWalletProvider::new(endpoint.clone());

        match provider.request(method::CHAIN_ID, json!([])).await {
            Ok(chain_id) => {
                info!("wallet: provider detected endpoint={endpoint} chain_id={chain_id}");
                Some(Arc::new(provider))
            }
            Err(err) => {
                warn!("wallet: probe failed endpoint={endpoint} error={err}");
                None
            }
        }
    }
}

pub(crate) fn decode_result<T: DeserializeOwned>(
    method: &str,
    value: Value,
) -> Result<T, ProviderError> {
    serde_json::from_value(value).map_err(|err| ProviderError::MalformedResponse {
        method: method.to_string(),
        reason: err.to_string(),
    })
}

pub async fn request_accounts(
    provider: &dyn WalletProvider,
    accounts_method: &str,
) -> Result<Vec<AccountAddress>, ProviderError> {
    let value = provider.request(accounts_method, json!([])).await?;
    if value.is_null() {
        return Ok(Vec::new());
    }
    decode_result(accounts_method, value)
}

#[cfg(test)]
#[path = "tests/provider_tests.rs"]
mod tests;
