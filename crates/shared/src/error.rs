use serde::{Deserialize, Serialize};

/// EIP-1193 code for a request the user declined in the wallet UI.
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// EIP-1193 code for a method or account the user has not authorized.
pub const UNAUTHORIZED: i64 = 4100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MissingProvider,
    Unauthenticated,
    Transaction,
    Read,
    Validation,
    Transport,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorContext {
    Discover,
    Connect,
    FetchTallies,
    FetchWinner,
    Submit,
    AccountsChanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewError {
    pub kind: ErrorKind,
    pub context: ErrorContext,
    pub message: String,
}

impl ViewError {
    pub fn new(kind: ErrorKind, context: ErrorContext, message: impl Into<String>) -> Self {
        Self {
            kind,
            context,
            message: message.into(),
        }
    }

    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::MissingProvider | ErrorKind::Unauthenticated
        )
    }
}
