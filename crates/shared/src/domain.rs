use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! hex_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

hex_newtype!(AccountAddress);
hex_newtype!(TxHash);

/// Vote counts as last read from the contract. Each field stays `None` until
/// the first successful refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tallies {
    pub total: Option<u64>,
    pub for_a: Option<u64>,
    pub for_b: Option<u64>,
}

impl Tallies {
    pub fn fetched(total: u64, for_a: u64, for_b: u64) -> Self {
        Self {
            total: Some(total),
            for_a: Some(for_a),
            for_b: Some(for_b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteField {
    TotalVotes,
    PartyA,
    PartyB,
}

impl VoteField {
    pub const ALL: [VoteField; 3] = [VoteField::TotalVotes, VoteField::PartyA, VoteField::PartyB];

    pub fn label(self) -> &'static str {
        match self {
            VoteField::TotalVotes => "total votes",
            VoteField::PartyA => "party A",
            VoteField::PartyB => "party B",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NoWallet,
    WalletDetected,
    Authenticated,
    ContractBound,
}

impl SessionPhase {
    pub fn from_presence(wallet: bool, account: bool, contract: bool) -> Self {
        match (wallet, account, contract) {
            (false, _, _) => SessionPhase::NoWallet,
            (true, false, _) => SessionPhase::WalletDetected,
            (true, true, false) => SessionPhase::Authenticated,
            (true, true, true) => SessionPhase::ContractBound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_follows_dependency_chain() {
        assert_eq!(
            SessionPhase::from_presence(false, true, true),
            SessionPhase::NoWallet
        );
        assert_eq!(
            SessionPhase::from_presence(true, false, false),
            SessionPhase::WalletDetected
        );
        assert_eq!(
            SessionPhase::from_presence(true, true, false),
            SessionPhase::Authenticated
        );
        assert_eq!(
            SessionPhase::from_presence(true, true, true),
            SessionPhase::ContractBound
        );
    }

    #[test]
    fn tallies_are_unfetched_by_default() {
        assert_eq!(
            Tallies::default(),
            Tallies {
                total: None,
                for_a: None,
                for_b: None,
            }
        );
        assert_eq!(Tallies::fetched(10, 6, 4).for_b, Some(4));
    }
}
