use crate::domain::identity::{MerchantId, Mmid, Uid};
use crate::error::{BankError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A monetary balance.
///
/// Wraps `rust_decimal::Decimal` so that amounts are exact. Balances held by
/// the registry are never negative: they start from a validated opening value
/// and only change through [`Balance::withdrawn`] and [`Balance::deposited`],
/// neither of which can panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// A strictly positive amount moved by a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(BankError::ValidationError(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = BankError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Validates an opening balance supplied at registration.
    pub fn opening(amount: Decimal) -> Result<Self> {
        if amount < Decimal::ZERO {
            return Err(BankError::ValidationError(
                "balance must not be negative".to_string(),
            ));
        }
        Ok(Self(amount))
    }

    /// The balance left after taking `amount` out of it.
    pub fn withdrawn(self, amount: Amount) -> Result<Self> {
        if self.0 < amount.0 {
            return Err(BankError::InsufficientFundsError);
        }
        Ok(Self(self.0 - amount.0))
    }

    /// The balance after adding `amount`. Fails rather than wrapping when the
    /// result is not representable.
    pub fn deposited(self, amount: Amount) -> Result<Self> {
        self.0.checked_add(amount.0).map(Self).ok_or_else(|| {
            BankError::ValidationError("balance would exceed the largest supported amount".to_string())
        })
    }

    /// Sums `balances`, failing if the total is not representable.
    pub fn total<I>(balances: I) -> Result<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        balances.into_iter().try_fold(Self::ZERO, |acc, balance| {
            acc.0.checked_add(balance.0).map(Self).ok_or_else(|| {
                BankError::InternalError("total balance exceeds the largest supported amount".to_string())
            })
        })
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// A password or PIN. Never printed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(#[serde(deserialize_with = "text")] String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Compares without short-circuiting on the first differing byte.
    pub fn matches(&self, candidate: &str) -> bool {
        let a = self.0.as_bytes();
        let b = candidate.as_bytes();
        let mut diff = a.len() ^ b.len();
        for i in 0..a.len().max(b.len()) {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            diff |= usize::from(x ^ y);
        }
        diff == 0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

/// Accepts a JSON string or integer. Front ends send PINs and phone numbers
/// either way.
pub(crate) fn text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(value) => value,
        Scalar::Unsigned(value) => value.to_string(),
        Scalar::Signed(value) => value.to_string(),
    })
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(BankError::ValidationError(format!(
            "field `{field}` must not be empty"
        )))
    } else {
        Ok(())
    }
}

/// Fields a user supplies to open an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRegistration {
    pub name: String,
    pub password: Secret,
    #[serde(alias = "ifsc_code")]
    pub routing_code: String,
    pub balance: Decimal,
    #[serde(alias = "pin_code")]
    pub pin: Secret,
    #[serde(alias = "phone_number", deserialize_with = "text")]
    pub phone: String,
}

impl UserRegistration {
    pub fn validate(&self) -> Result<Balance> {
        require("name", &self.name)?;
        require("password", self.password.expose())?;
        require("routing_code", &self.routing_code)?;
        require("pin", self.pin.expose())?;
        require("phone", &self.phone)?;
        Balance::opening(self.balance)
    }
}

/// Fields a merchant supplies to open an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerchantRegistration {
    pub name: String,
    pub password: Secret,
    #[serde(alias = "ifsc_code")]
    pub routing_code: String,
    pub balance: Decimal,
}

impl MerchantRegistration {
    pub fn validate(&self) -> Result<Balance> {
        require("name", &self.name)?;
        require("password", self.password.expose())?;
        require("routing_code", &self.routing_code)?;
        Balance::opening(self.balance)
    }
}

/// A user account held by the bank, keyed by its [`Mmid`].
#[derive(Debug, Clone, PartialEq)]
pub struct UserAccount {
    pub uid: Uid,
    pub mmid: Mmid,
    pub name: String,
    pub password: Secret,
    pub routing_code: String,
    pub balance: Balance,
    pub pin: Secret,
    pub phone: String,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn open(
        uid: Uid,
        mmid: Mmid,
        registration: UserRegistration,
        balance: Balance,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            uid,
            mmid,
            name: registration.name,
            password: registration.password,
            routing_code: registration.routing_code,
            balance,
            pin: registration.pin,
            phone: registration.phone,
            created_at,
        }
    }
}

/// A merchant account held by the bank, keyed by its [`MerchantId`].
#[derive(Debug, Clone, PartialEq)]
pub struct MerchantAccount {
    pub merchant_id: MerchantId,
    pub name: String,
    pub password: Secret,
    pub routing_code: String,
    pub balance: Balance,
    pub created_at: DateTime<Utc>,
}

impl MerchantAccount {
    pub fn open(
        merchant_id: MerchantId,
        registration: MerchantRegistration,
        balance: Balance,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            merchant_id,
            name: registration.name,
            password: registration.password,
            routing_code: registration.routing_code,
            balance,
            created_at,
        }
    }
}
