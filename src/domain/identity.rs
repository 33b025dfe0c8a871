//! Derivation of account, merchant and transaction identifiers.
//!
//! Identifiers are one-way hashes of registration inputs salted with a
//! high-resolution timestamp. Collisions are not impossible, only unlikely;
//! callers that insert identifiers into a namespace check for an existing key.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length in hex characters of account and merchant identifiers.
pub const ID_LEN: usize = 16;

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

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

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }
    };
}

identifier!(
    /// Internal user identifier.
    Uid
);
identifier!(
    /// Routing handle of a user account; the registry key for users.
    Mmid
);
identifier!(
    /// Identifier of a merchant account.
    MerchantId
);
identifier!(
    /// Identifier of a committed transfer.
    TxId
);

/// Source of the timestamps used as derivation salt and block time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Canonical text form of a timestamp wherever one enters a hash.
pub fn timestamp_text(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Full SHA-256 hex digest over the concatenation of `parts`.
pub fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Hashes `parts` followed by the optional `salt` and keeps the first
/// [`ID_LEN`] hex characters.
pub fn derive(parts: &[&str], salt: Option<&DateTime<Utc>>) -> String {
    let salt = salt.map(timestamp_text);
    let mut input: Vec<&str> = parts.to_vec();
    if let Some(salt) = salt.as_deref() {
        input.push(salt);
    }
    let mut token = digest(&input);
    token.truncate(ID_LEN);
    token
}

pub fn user_ids(name: &str, password: &str, phone: &str, salt: &DateTime<Utc>) -> (Uid, Mmid) {
    let uid = Uid(derive(&[name, password], Some(salt)));
    let mmid = Mmid(derive(&[phone, uid.as_str()], None));
    (uid, mmid)
}

pub fn merchant_id(name: &str, password: &str, salt: &DateTime<Utc>) -> MerchantId {
    MerchantId(derive(&[name, password], Some(salt)))
}

pub fn tx_id(mmid: &Mmid, merchant_id: &MerchantId, salt: &DateTime<Utc>, amount: &str) -> TxId {
    let salt = timestamp_text(salt);
    TxId(digest(&[mmid.as_str(), merchant_id.as_str(), &salt, amount]))
}
