use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ethers_core::types::Address;
use shared::{
    domain::{AccountAddress, SessionPhase, Tallies, VoteField},
    error::{ErrorContext, ErrorKind, ViewError},
    protocol::{method, TransactionReceipt},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

pub mod contract;
pub mod input;
pub mod provider;

pub use contract::{
    parse_contract_address, AbiError, ConfirmationPolicy, ContractError, PendingTransaction,
    Signer, TransactionFailure, VotingAbi, VotingCall, VotingContractClient,
    DEFAULT_CONTRACT_ADDRESS,
};
pub use input::{InputError, VoteAmount, VoteInputs};
pub use provider::{
    request_accounts, HttpWalletDiscovery, HttpWalletProvider, InjectedWalletDiscovery,
    MissingWalletDiscovery, ProviderError, WalletDiscovery, WalletProvider,
};

pub const INSTALL_WALLET_NOTICE: &str = "Please install a wallet to authenticate.";
pub const WALLET_REQUIRED_WARNING: &str = "A wallet is required to connect";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a wallet is required to connect")]
    MissingProvider,
    #[error("no authorized account; connect a wallet account first")]
    Unauthenticated,
    #[error("contract client is not bound; connect an account first")]
    ContractUnbound,
    #[error("invalid {} input: {}", .field.label(), .reason)]
    InvalidInput { field: VoteField, reason: InputError },
    #[error("another vote submission is still waiting for confirmation")]
    SubmissionPending,
    #[error(transparent)]
    Transaction(#[from] TransactionFailure),
    #[error("failed to read `{call}`: {source}")]
    Read {
        call: VotingCall,
        source: ContractError,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Abi(#[from] AbiError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::MissingProvider => ErrorKind::MissingProvider,
            SessionError::Unauthenticated | SessionError::ContractUnbound => {
                ErrorKind::Unauthenticated
            }
            SessionError::InvalidInput { .. } | SessionError::SubmissionPending => {
                ErrorKind::Validation
            }
            SessionError::Transaction(_) => ErrorKind::Transaction,
            SessionError::Read { source, .. } => match source {
                ContractError::Provider(err) if err.is_transient() => ErrorKind::Transport,
                _ => ErrorKind::Read,
            },
            SessionError::Provider(err) if err.is_transient() => ErrorKind::Transport,
            SessionError::Provider(err) if err.is_user_rejection() || err.is_unauthorized() => {
                ErrorKind::Unauthenticated
            }
            SessionError::Provider(_) => ErrorKind::Unknown,
            SessionError::Abi(_) => ErrorKind::Read,
        }
    }

    pub fn is_transient(&self) -> bool {
        match self {
            SessionError::Transaction(failure) => failure.is_transient(),
            SessionError::Read {
                source: ContractError::Provider(err),
                ..
            }
            | SessionError::Provider(err) => err.is_transient(),
            SessionError::SubmissionPending => true,
            _ => false,
        }
    }
}

impl From<ContractError> for SessionError {
    fn from(value: ContractError) -> Self {
        match value {
            ContractError::Abi(err) => SessionError::Abi(err),
            ContractError::Provider(err) => SessionError::Provider(err),
            ContractError::Transaction(failure) => SessionError::Transaction(failure),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContractSettings {
    pub address: Address,
    pub abi: Arc<VotingAbi>,
    pub confirmation: ConfirmationPolicy,
}

impl ContractSettings {
    pub fn new(address: Address, abi: VotingAbi) -> Self {
        Self {
            address,
            abi: Arc::new(abi),
            confirmation: ConfirmationPolicy::default(),
        }
    }

    pub fn default_deployment() -> Result<Self, AbiError> {
        Ok(Self::new(
            parse_contract_address(DEFAULT_CONTRACT_ADDRESS)?,
            VotingAbi::embedded()?,
        ))
    }

    pub fn with_confirmation(mut self, confirmation: ConfirmationPolicy) -> Self {
        self.confirmation = confirmation;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub phase: SessionPhase,
    pub wallet_detected: bool,
    pub account: Option<AccountAddress>,
    pub contract_bound: bool,
    pub tallies: Tallies,
    pub winning_party: Option<String>,
    pub inputs: VoteInputs,
    pub submission_pending: bool,
    pub last_error: Option<ViewError>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionView),
    Notice(String),
    Warning(String),
    Error(ViewError),
    TransactionSubmitted {
        field: VoteField,
        hash: shared::domain::TxHash,
    },
    TransactionConfirmed {
        field: VoteField,
        hash: shared::domain::TxHash,
    },
}

#[derive(Default)]
struct SessionState {
    wallet: Option<Arc<dyn WalletProvider>>,
    account: Option<AccountAddress>,
    contract: Option<Arc<VotingContractClient>>,
    tallies: Tallies,
    winning_party: Option<String>,
    inputs: VoteInputs,
    last_error: Option<ViewError>,
}

struct SubmissionGuard<'a>(&'a AtomicBool);

impl<'a> SubmissionGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SubmissionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SessionController {
    discovery: Arc<dyn WalletDiscovery>,
    settings: ContractSettings,
    inner: Mutex<SessionState>,
    submission_in_flight: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    pub fn new(discovery: Arc<dyn WalletDiscovery>, settings: ContractSettings) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            discovery,
            settings,
            inner: Mutex::new(SessionState::default()),
            submission_in_flight: AtomicBool::new(false),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionView {
        let guard = self.inner.lock().await;
        self.view_of(&guard)
    }

    fn view_of(&self, state: &SessionState) -> SessionView {
        let wallet_detected = state.wallet.is_some();
        let contract_bound = state.contract.is_some();
        SessionView {
            phase: SessionPhase::from_presence(
                wallet_detected,
                state.account.is_some(),
                contract_bound,
            ),
            wallet_detected,
            account: state.account.clone(),
            contract_bound,
            tallies: state.tallies,
            winning_party: state.winning_party.clone(),
            inputs: state.inputs.clone(),
            submission_pending: self.submission_in_flight.load(Ordering::Acquire),
            last_error: state.last_error.clone(),
        }
    }

    async fn publish_state(&self) {
        let view = self.snapshot().await;
        let _ = self.events.send(SessionEvent::StateChanged(view));
    }

    async fn record_failure(&self, context: ErrorContext, err: SessionError) -> SessionError {
        let view_error = ViewError::new(err.kind(), context, err.to_string());
        warn!(
            "session: operation failed context={context:?} kind={:?} transient={} error={err}",
            view_error.kind,
            err.is_transient()
        );
        self.inner.lock().await.last_error = Some(view_error.clone());
        let _ = self.events.send(SessionEvent::Error(view_error));
        self.publish_state().await;
        err
    }

    async fn wallet(&self) -> Option<Arc<dyn WalletProvider>> {
        self.inner.lock().await.wallet.clone()
    }

    async fn contract(&self) -> Result<Arc<VotingContractClient>, SessionError> {
        self.inner
            .lock()
            .await
            .contract
            .clone()
            .ok_or(SessionError::ContractUnbound)
    }

    pub async fn discover_wallet(&self) -> Result<(), SessionError> {
        let wallet = match self.wallet().await {
            Some(wallet) => wallet,
            None => match self.discovery.discover().await {
                Some(wallet) => {
                    info!("session: wallet provider detected");
                    self.inner.lock().await.wallet = Some(Arc::clone(&wallet));
                    wallet
                }
                None => {
                    info!("session: no wallet provider detected");
                    let _ = self
                        .events
                        .send(SessionEvent::Notice(INSTALL_WALLET_NOTICE.to_string()));
                    self.publish_state().await;
                    return Ok(());
                }
            },
        };

        let accounts = match request_accounts(wallet.as_ref(), method::ACCOUNTS).await {
            Ok(accounts) => accounts,
            Err(err) => return Err(self.record_failure(ErrorContext::Discover, err.into()).await),
        };

        let account = self.handle_accounts(&accounts).await;
        let unbound = self.inner.lock().await.contract.is_none();
        if account.is_some() && unbound {
            self.bind_contract_client().await?;
        } else {
            self.publish_state().await;
        }
        Ok(())
    }

    pub async fn handle_accounts(&self, accounts: &[AccountAddress]) -> Option<AccountAddress> {
        let mut guard = self.inner.lock().await;
        match accounts.first() {
            Some(account) => {
                info!("session: account connected account={account}");
                guard.account = Some(account.clone());
            }
            None => info!("session: no account found"),
        }
        guard.account.clone()
    }

    pub async fn connect_account(&self) -> Result<(), SessionError> {
        let Some(wallet) = self.wallet().await else {
            warn!("session: connect requested without a wallet provider");
            let _ = self
                .events
                .send(SessionEvent::Warning(WALLET_REQUIRED_WARNING.to_string()));
            return Err(SessionError::MissingProvider);
        };

        let accounts = match request_accounts(wallet.as_ref(), method::REQUEST_ACCOUNTS).await {
            Ok(accounts) => accounts,
            Err(err) if err.is_user_rejection() || err.is_unauthorized() => {
                info!("session: account request declined error={err}");
                return Err(self
                    .record_failure(ErrorContext::Connect, SessionError::Unauthenticated)
                    .await);
            }
            Err(err) => return Err(self.record_failure(ErrorContext::Connect, err.into()).await),
        };

        self.handle_accounts(&accounts).await;
        self.bind_contract_client().await
    }

    // Address and interface are not checked against the chain.
    pub async fn bind_contract_client(&self) -> Result<(), SessionError> {
        let bound = {
            let mut guard = self.inner.lock().await;
            match (guard.wallet.clone(), guard.account.clone()) {
                (None, _) => Err(SessionError::MissingProvider),
                (Some(_), None) => Err(SessionError::Unauthenticated),
                (Some(wallet), Some(account)) => {
                    let signer = Signer::new(wallet, account.clone());
                    guard.contract = Some(Arc::new(VotingContractClient::new(
                        signer,
                        self.settings.address,
                        Arc::clone(&self.settings.abi),
                    )));
                    guard.last_error = None;
                    Ok(account)
                }
            }
        };

        match bound {
            Ok(account) => {
                info!(
                    "session: contract bound address={:?} signer={account}",
                    self.settings.address
                );
                self.publish_state().await;
                Ok(())
            }
            Err(err) => Err(self.record_failure(ErrorContext::Connect, err).await),
        }
    }

    /// Reads the three counts concurrently. Tallies only change when all three
    /// reads succeed; they are not an atomic snapshot of contract state.
    pub async fn fetch_tallies(&self) -> Result<Tallies, SessionError> {
        let contract = self.contract().await?;

        let read_failed =
            |call: VotingCall| move |source: ContractError| SessionError::Read { call, source };
        let outcome = tokio::try_join!(
            async {
                contract
                    .total_votes()
                    .await
                    .map_err(read_failed(VotingCall::TotalVotes))
            },
            async {
                contract
                    .votes_for_party_a()
                    .await
                    .map_err(read_failed(VotingCall::VotesForPartyA))
            },
            async {
                contract
                    .votes_for_party_b()
                    .await
                    .map_err(read_failed(VotingCall::VotesForPartyB))
            },
        );

        match outcome {
            Ok((total, for_a, for_b)) => {
                let tallies = Tallies::fetched(total, for_a, for_b);
                {
                    let mut guard = self.inner.lock().await;
                    guard.tallies = tallies;
                    guard.last_error = None;
                }
                info!("session: tallies refreshed total={total} party_a={for_a} party_b={for_b}");
                self.publish_state().await;
                Ok(tallies)
            }
            Err(err) => Err(self.record_failure(ErrorContext::FetchTallies, err).await),
        }
    }

    pub async fn fetch_winning_party(&self) -> Result<String, SessionError> {
        let contract = self.contract().await?;

        match contract.winning_party().await {
            Ok(winner) => {
                {
                    let mut guard = self.inner.lock().await;
                    guard.winning_party = Some(winner.clone());
                    guard.last_error = None;
                }
                info!("session: winning party fetched winner={winner}");
                self.publish_state().await;
                Ok(winner)
            }
            Err(source) => {
                let err = SessionError::Read {
                    call: VotingCall::WinningParty,
                    source,
                };
                Err(self.record_failure(ErrorContext::FetchWinner, err).await)
            }
        }
    }

    pub async fn submit_total_votes(
        &self,
        amount: VoteAmount,
    ) -> Result<TransactionReceipt, SessionError> {
        self.submit(VoteField::TotalVotes, amount).await
    }

    pub async fn submit_vote_a(&self, amount: VoteAmount) -> Result<TransactionReceipt, SessionError> {
        self.submit(VoteField::PartyA, amount).await
    }

    pub async fn submit_vote_b(&self, amount: VoteAmount) -> Result<TransactionReceipt, SessionError> {
        self.submit(VoteField::PartyB, amount).await
    }

    pub async fn set_input(&self, field: VoteField, raw: impl Into<String>) {
        self.inner.lock().await.inputs.set(field, raw);
        self.publish_state().await;
    }

    pub async fn submit_input(&self, field: VoteField) -> Result<TransactionReceipt, SessionError> {
        let raw = self.inner.lock().await.inputs.get(field).to_string();
        let amount = match VoteAmount::parse(&raw) {
            Ok(amount) => amount,
            Err(reason) => {
                let err = SessionError::InvalidInput { field, reason };
                return Err(self.record_failure(ErrorContext::Submit, err).await);
            }
        };
        self.submit(field, amount).await
    }

    async fn submit(
        &self,
        field: VoteField,
        amount: VoteAmount,
    ) -> Result<TransactionReceipt, SessionError> {
        let contract = self.contract().await?;

        let Some(guard) = SubmissionGuard::acquire(&self.submission_in_flight) else {
            return Err(self
                .record_failure(ErrorContext::Submit, SessionError::SubmissionPending)
                .await);
        };
        self.publish_state().await;

        let outcome = self.send_and_confirm(&contract, field, amount).await;
        drop(guard);

        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(err) => return Err(self.record_failure(ErrorContext::Submit, err).await),
        };

        // The vote is on chain at this point; a failed refresh is recorded by
        // fetch_tallies and does not fail the submission.
        if let Err(err) = self.fetch_tallies().await {
            warn!(
                "session: refresh after confirmed submission failed field={} tx={} error={err}",
                field.label(),
                receipt.transaction_hash
            );
        }
        Ok(receipt)
    }

    async fn send_and_confirm(
        &self,
        contract: &VotingContractClient,
        field: VoteField,
        amount: VoteAmount,
    ) -> Result<TransactionReceipt, SessionError> {
        let pending = match field {
            VoteField::TotalVotes => contract.set_total_votes(amount).await?,
            VoteField::PartyA => contract.vote_for_party_a(amount).await?,
            VoteField::PartyB => contract.vote_for_party_b(amount).await?,
        };
        let hash = pending.hash().clone();
        let _ = self.events.send(SessionEvent::TransactionSubmitted {
            field,
            hash: hash.clone(),
        });

        let receipt = pending.wait(self.settings.confirmation).await?;
        let _ = self
            .events
            .send(SessionEvent::TransactionConfirmed { field, hash });
        Ok(receipt)
    }

    /// Losing every account drops the contract client; a different first
    /// account re-binds it with the new signer.
    pub async fn handle_accounts_changed(&self, accounts: &[AccountAddress]) -> Result<(), SessionError> {
        let next = accounts.first().cloned();
        let rebind = {
            let mut guard = self.inner.lock().await;
            if next == guard.account {
                return Ok(());
            }
            match next {
                None => {
                    info!("session: wallet reported no authorized accounts; contract released");
                    guard.account = None;
                    guard.contract = None;
                    false
                }
                Some(account) => {
                    info!(
                        "session: active account changed from={} to={account}",
                        guard
                            .account
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "none".to_string())
                    );
                    guard.account = Some(account);
                    guard.contract = None;
                    guard.wallet.is_some()
                }
            }
        };

        if rebind {
            self.bind_contract_client().await
        } else {
            self.publish_state().await;
            Ok(())
        }
    }

    pub async fn sync_accounts(&self) -> Result<(), SessionError> {
        let wallet = self.wallet().await.ok_or(SessionError::MissingProvider)?;
        match request_accounts(wallet.as_ref(), method::ACCOUNTS).await {
            Ok(accounts) => self.handle_accounts_changed(&accounts).await,
            Err(err) => Err(self
                .record_failure(ErrorContext::AccountsChanged, err.into())
                .await),
        }
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
