use super::account::{Amount, Balance, MerchantAccount, UserAccount};
use super::identity::{MerchantId, Mmid, TxId};
use super::ledger::{LedgerBlock, PendingBlock};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for user and merchant accounts.
///
/// Implementations must make `insert_*` and `transfer` atomic: a concurrent
/// reader sees either none or all of their effect.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts the account unless its key is taken. Returns whether it was
    /// inserted.
    async fn insert_user(&self, account: UserAccount) -> Result<bool>;
    async fn insert_merchant(&self, account: MerchantAccount) -> Result<bool>;
    async fn get_user(&self, mmid: &Mmid) -> Result<Option<UserAccount>>;
    async fn get_merchant(&self, merchant_id: &MerchantId) -> Result<Option<MerchantAccount>>;
    /// Moves `amount` from a user to a merchant, checking funds and mutating
    /// both balances under one exclusive section. Returns the user's new
    /// balance.
    async fn transfer(&self, from: &Mmid, to: &MerchantId, amount: Amount) -> Result<Balance>;
    /// Moves `amount` back from a merchant to a user.
    async fn refund(&self, from: &MerchantId, to: &Mmid, amount: Amount) -> Result<Balance>;
    /// Sum of every user and merchant balance.
    async fn total_balance(&self) -> Result<Balance>;
}

/// Storage for the hash-chained ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Links `pending` to the current tail and appends it.
    async fn append(&self, pending: PendingBlock) -> Result<LedgerBlock>;
    /// Every block committed before the call, in chain order.
    async fn snapshot(&self) -> Result<Vec<LedgerBlock>>;
    async fn contains(&self, tx_id: &TxId) -> Result<bool>;
    async fn len(&self) -> Result<usize>;
}

pub type SharedAccountStore = Arc<dyn AccountStore>;
pub type SharedLedgerStore = Arc<dyn LedgerStore>;
