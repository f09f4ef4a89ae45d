use std::fmt;

use ethers_core::types::U256;
use shared::domain::VoteField;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("a value is required")]
    Empty,
    #[error("votes must not be negative")]
    Negative,
    #[error("`{0}` is not a whole number")]
    NotInteger(String),
    #[error("`{0}` does not fit in uint256")]
    TooLarge(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteAmount(U256);

impl VoteAmount {
    pub fn parse(raw: &str) -> Result<Self, InputError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InputError::Empty);
        }
        if trimmed.starts_with('-') {
            return Err(InputError::Negative);
        }
        let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(InputError::NotInteger(trimmed.to_string()));
        }

        U256::from_dec_str(digits)
            .map(Self)
            .map_err(|_| InputError::TooLarge(trimmed.to_string()))
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }
}

impl From<u64> for VoteAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for VoteAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteInputs {
    pub total_votes: String,
    pub party_a: String,
    pub party_b: String,
}

impl VoteInputs {
    pub fn get(&self, field: VoteField) -> &str {
        match field {
            VoteField::TotalVotes => &self.total_votes,
            VoteField::PartyA => &self.party_a,
            VoteField::PartyB => &self.party_b,
        }
    }

    pub fn set(&mut self, field: VoteField, raw: impl Into<String>) {
        let slot = match field {
            VoteField::TotalVotes => &mut self.total_votes,
            VoteField::PartyA => &mut self.party_a,
            VoteField::PartyB => &mut self.party_b,
        };
        *slot = raw.into();
    }
}
