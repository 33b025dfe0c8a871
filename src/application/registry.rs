use crate::domain::account::{
    Amount, Balance, MerchantAccount, MerchantRegistration, UserAccount, UserRegistration,
};
use crate::domain::identity::{self, Clock, MerchantId, Mmid, Uid};
use crate::domain::ports::SharedAccountStore;
use crate::error::{BankError, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// How many fresh timestamps registration tries before giving up on finding
/// an unused identifier.
pub const MAX_DERIVATION_ATTEMPTS: usize = 8;

/// Identifiers handed back to a newly registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    pub uid: Uid,
    pub mmid: Mmid,
}

/// Owns user and merchant records and the rules for creating them.
#[derive(Clone)]
pub struct AccountRegistry {
    store: SharedAccountStore,
    clock: Arc<dyn Clock>,
}

impl AccountRegistry {
    pub fn new(store: SharedAccountStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn register_user(&self, registration: UserRegistration) -> Result<RegisteredUser> {
        let balance = registration.validate()?;

        for _ in 0..MAX_DERIVATION_ATTEMPTS {
            let created_at = self.clock.now();
            let (uid, mmid) = identity::user_ids(
                &registration.name,
                registration.password.expose(),
                &registration.phone,
                &created_at,
            );
            let account = UserAccount::open(
                uid.clone(),
                mmid.clone(),
                registration.clone(),
                balance,
                created_at,
            );
            if self.store.insert_user(account).await? {
                info!(%mmid, name = %registration.name, %balance, "registered user");
                return Ok(RegisteredUser { uid, mmid });
            }
            warn!(%mmid, "derived mmid already registered, retrying");
        }

        Err(BankError::InternalError(
            "could not derive a unique account identifier".to_string(),
        ))
    }

    pub async fn register_merchant(&self, registration: MerchantRegistration) -> Result<MerchantId> {
        let balance = registration.validate()?;

        for _ in 0..MAX_DERIVATION_ATTEMPTS {
            let created_at = self.clock.now();
            let merchant_id = identity::merchant_id(
                &registration.name,
                registration.password.expose(),
                &created_at,
            );
            let account = MerchantAccount::open(
                merchant_id.clone(),
                registration.clone(),
                balance,
                created_at,
            );
            if self.store.insert_merchant(account).await? {
                info!(%merchant_id, name = %registration.name, %balance, "registered merchant");
                return Ok(merchant_id);
            }
            warn!(%merchant_id, "derived merchant id already registered, retrying");
        }

        Err(BankError::InternalError(
            "could not derive a unique merchant identifier".to_string(),
        ))
    }

    pub async fn get_user(&self, mmid: &Mmid) -> Result<UserAccount> {
        self.store
            .get_user(mmid)
            .await?
            .ok_or_else(|| BankError::NotFoundError("account not found".to_string()))
    }

    pub async fn get_merchant(&self, merchant_id: &MerchantId) -> Result<MerchantAccount> {
        self.store
            .get_merchant(merchant_id)
            .await?
            .ok_or_else(|| BankError::NotFoundError("merchant not found".to_string()))
    }

    /// The only path that changes balances after registration.
    pub async fn adjust_balances(
        &self,
        debit: &Mmid,
        credit: &MerchantId,
        amount: Amount,
    ) -> Result<Balance> {
        self.store.transfer(debit, credit, amount).await
    }

    /// Undoes an [`adjust_balances`](Self::adjust_balances) whose settlement
    /// could not be recorded.
    pub async fn reverse_balances(
        &self,
        debit: &Mmid,
        credit: &MerchantId,
        amount: Amount,
    ) -> Result<Balance> {
        self.store.refund(credit, debit, amount).await
    }

    pub async fn total_balance(&self) -> Result<Balance> {
        self.store.total_balance().await
    }
}
