//! Request and response messages exchanged with the bank.
//!
//! Each message is a flat JSON object. Requests carry an `action`
//! discriminator, responses a `status` discriminator.

use crate::domain::account::{Balance, MerchantRegistration, UserRegistration};
use crate::domain::identity::{MerchantId, Mmid, Uid};
use crate::domain::ledger::LedgerBlock;
use crate::domain::transaction::SettlementRequest;
use crate::error::{BankError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    RegisterUser,
    RegisterMerchant,
    ValidateTransaction,
    GetBlockchain,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RegisterUser => "register_user",
            Self::RegisterMerchant => "register_merchant",
            Self::ValidateTransaction => "validate_transaction",
            Self::GetBlockchain => "get_blockchain",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    RegisterUser(UserRegistration),
    RegisterMerchant(MerchantRegistration),
    ValidateTransaction(SettlementRequest),
    GetBlockchain,
}

impl Request {
    /// Decodes one request.
    ///
    /// Bytes that are not a JSON object with a known `action` are a protocol
    /// error; a known action whose fields are missing or malformed is a
    /// validation error.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| BankError::ProtocolError(format!("Malformed request: {e}")))?;

        let action = value
            .get("action")
            .ok_or_else(|| BankError::ProtocolError("Missing action".to_string()))?;
        serde_json::from_value::<Action>(action.clone())
            .map_err(|_| BankError::ProtocolError("Unknown action".to_string()))?;

        serde_json::from_value(value).map_err(|e| BankError::ValidationError(e.to_string()))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn action(&self) -> Action {
        match self {
            Self::RegisterUser(_) => Action::RegisterUser,
            Self::RegisterMerchant(_) => Action::RegisterMerchant,
            Self::ValidateTransaction(_) => Action::ValidateTransaction,
            Self::GetBlockchain => Action::GetBlockchain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success(Outcome),
    /// A business rule rejected the request.
    Failure { message: String },
    /// The request was malformed or the bank failed.
    Error { message: String },
}

/// Payload of a successful response, one shape per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome {
    UserRegistered {
        uid: Uid,
        mmid: Mmid,
    },
    MerchantRegistered {
        merchant_id: MerchantId,
    },
    Settled {
        message: String,
        remaining_balance: Balance,
    },
    Chain {
        chain: Vec<LedgerBlock>,
    },
}

impl Response {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| BankError::ProtocolError(format!("Malformed response: {e}")))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Outcome::Settled { message, .. }) => Some(message),
            Self::Failure { message } | Self::Error { message } => Some(message),
            Self::Success(_) => None,
        }
    }
}

impl From<&BankError> for Response {
    fn from(err: &BankError) -> Self {
        if err.is_rejection() {
            Self::Failure {
                message: err.to_string(),
            }
        } else if err.is_internal() {
            Self::Error {
                message: "internal error".to_string(),
            }
        } else {
            Self::Error {
                message: err.to_string(),
            }
        }
    }
}
