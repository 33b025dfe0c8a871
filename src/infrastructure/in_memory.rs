use crate::domain::account::{Amount, Balance, MerchantAccount, UserAccount};
use crate::domain::identity::{MerchantId, Mmid, TxId};
use crate::domain::ledger::{Chain, LedgerBlock, PendingBlock};
use crate::domain::ports::{AccountStore, LedgerStore};
use crate::error::{BankError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Accounts {
    users: HashMap<Mmid, UserAccount>,
    merchants: HashMap<MerchantId, MerchantAccount>,
}

impl Accounts {
    fn pair_mut(
        &mut self,
        mmid: &Mmid,
        merchant_id: &MerchantId,
    ) -> Result<(&mut UserAccount, &mut MerchantAccount)> {
        let user = self
            .users
            .get_mut(mmid)
            .ok_or_else(|| BankError::NotFoundError("account not found".to_string()))?;
        let merchant = self
            .merchants
            .get_mut(merchant_id)
            .ok_or_else(|| BankError::NotFoundError("merchant not found".to_string()))?;
        Ok((user, merchant))
    }
}

/// A thread-safe in-memory store for user and merchant accounts.
///
/// Both namespaces sit behind a single `RwLock`, so a transfer holds exclusive
/// access to the debited and the credited account for its whole
/// check-and-mutate sequence.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    accounts: Arc<RwLock<Accounts>>,
}

impl InMemoryAccountStore {
    /// Creates a new, empty in-memory account store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn insert_user(&self, account: UserAccount) -> Result<bool> {
        let mut accounts = self.accounts.write().await;
        match accounts.users.entry(account.mmid.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(account);
                Ok(true)
            }
        }
    }

    async fn insert_merchant(&self, account: MerchantAccount) -> Result<bool> {
        let mut accounts = self.accounts.write().await;
        match accounts.merchants.entry(account.merchant_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(account);
                Ok(true)
            }
        }
    }

    async fn get_user(&self, mmid: &Mmid) -> Result<Option<UserAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.users.get(mmid).cloned())
    }

    async fn get_merchant(&self, merchant_id: &MerchantId) -> Result<Option<MerchantAccount>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.merchants.get(merchant_id).cloned())
    }

    async fn transfer(&self, from: &Mmid, to: &MerchantId, amount: Amount) -> Result<Balance> {
        let mut accounts = self.accounts.write().await;
        let (user, merchant) = accounts.pair_mut(from, to)?;
        let user_balance = user.balance.withdrawn(amount)?;
        let merchant_balance = merchant.balance.deposited(amount)?;
        user.balance = user_balance;
        merchant.balance = merchant_balance;
        Ok(user_balance)
    }

    async fn refund(&self, from: &MerchantId, to: &Mmid, amount: Amount) -> Result<Balance> {
        let mut accounts = self.accounts.write().await;
        let (user, merchant) = accounts.pair_mut(to, from)?;
        let merchant_balance = merchant.balance.withdrawn(amount)?;
        let user_balance = user.balance.deposited(amount)?;
        merchant.balance = merchant_balance;
        user.balance = user_balance;
        Ok(user_balance)
    }

    async fn total_balance(&self) -> Result<Balance> {
        let accounts = self.accounts.read().await;
        let users = accounts.users.values().map(|u| u.balance);
        let merchants = accounts.merchants.values().map(|m| m.balance);
        Balance::total(users.chain(merchants))
    }
}

/// A thread-safe in-memory ledger.
///
/// Appends take the write lock for one push; snapshots clone under the read
/// lock, so readers never observe a half-appended block and wait at most for
/// one append to finish.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    chain: Arc<RwLock<Chain>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(&self, pending: PendingBlock) -> Result<LedgerBlock> {
        let mut chain = self.chain.write().await;
        chain.append(pending)
    }

    async fn snapshot(&self) -> Result<Vec<LedgerBlock>> {
        let chain = self.chain.read().await;
        Ok(chain.blocks().to_vec())
    }

    async fn contains(&self, tx_id: &TxId) -> Result<bool> {
        let chain = self.chain.read().await;
        Ok(chain.contains(tx_id))
    }

    async fn len(&self) -> Result<usize> {
        let chain = self.chain.read().await;
        Ok(chain.len())
    }
}
