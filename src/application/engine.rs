use crate::application::registry::AccountRegistry;
use crate::domain::account::{Amount, Balance};
use crate::domain::identity::{self, TxId};
use crate::domain::ledger::{LedgerBlock, PendingBlock};
use crate::domain::ports::SharedLedgerStore;
use crate::domain::transaction::{PreparedSettlement, SettlementReceipt, SettlementRequest};
use crate::error::{BankError, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info};

/// Validates and executes transfers from users to merchants.
///
/// `prepare` performs every check without touching state; `commit` moves the
/// funds and records the block. Callers that run both must ensure nothing else
/// mutates the accounts in between; the bank worker does so by running all
/// mutating operations on one task.
#[derive(Clone)]
pub struct SettlementEngine {
    registry: AccountRegistry,
    ledger: SharedLedgerStore,
}

impl SettlementEngine {
    pub fn new(registry: AccountRegistry, ledger: SharedLedgerStore) -> Self {
        Self { registry, ledger }
    }

    pub fn ledger(&self) -> &SharedLedgerStore {
        &self.ledger
    }

    /// Runs the full validate-then-transfer sequence.
    pub async fn settle(&self, request: SettlementRequest) -> Result<SettlementReceipt> {
        let prepared = self.prepare(&request).await?;
        self.commit(prepared).await
    }

    /// Checks account, PIN, amount, funds and merchant, in that order.
    pub async fn prepare(&self, request: &SettlementRequest) -> Result<PreparedSettlement> {
        let user = self.registry.get_user(&request.mmid).await?;

        if !user.pin.matches(request.pin.expose()) {
            return Err(BankError::AuthError);
        }

        let amount = Amount::new(request.amount)?;

        if user.balance < Balance::from(amount) {
            return Err(BankError::InsufficientFundsError);
        }

        let merchant = self.registry.get_merchant(&request.merchant_id).await?;

        Ok(PreparedSettlement {
            mmid: user.mmid,
            merchant_id: merchant.merchant_id,
            amount,
        })
    }

    /// Moves the funds and appends the block. On any failure after the
    /// transfer the funds are moved back, so an error always means no effect.
    pub async fn commit(&self, prepared: PreparedSettlement) -> Result<SettlementReceipt> {
        let (tx_id, timestamp) = self.unused_tx_id(&prepared).await?;

        let remaining_balance = self
            .registry
            .adjust_balances(&prepared.mmid, &prepared.merchant_id, prepared.amount)
            .await?;

        let pending = PendingBlock {
            tx_id: tx_id.clone(),
            mmid: prepared.mmid.clone(),
            merchant_id: prepared.merchant_id.clone(),
            amount: prepared.amount,
            timestamp,
        };

        let block = match self.ledger.append(pending).await {
            Ok(block) => block,
            Err(err) => {
                self.rollback(&prepared).await;
                return Err(err);
            }
        };

        info!(
            %tx_id,
            mmid = %prepared.mmid,
            merchant_id = %prepared.merchant_id,
            amount = %prepared.amount,
            "settlement committed"
        );

        Ok(SettlementReceipt {
            tx_id,
            amount: prepared.amount,
            remaining_balance,
            block,
        })
    }

    pub async fn blockchain(&self) -> Result<Vec<LedgerBlock>> {
        self.ledger.snapshot().await
    }

    async fn unused_tx_id(&self, prepared: &PreparedSettlement) -> Result<(TxId, DateTime<Utc>)> {
        let amount = prepared.amount.to_string();
        for _ in 0..super::registry::MAX_DERIVATION_ATTEMPTS {
            let timestamp = self.registry.clock().now();
            let tx_id = identity::tx_id(&prepared.mmid, &prepared.merchant_id, &timestamp, &amount);
            if !self.ledger.contains(&tx_id).await? {
                return Ok((tx_id, timestamp));
            }
        }
        Err(BankError::InternalError(
            "could not derive a unique transaction identifier".to_string(),
        ))
    }

    async fn rollback(&self, prepared: &PreparedSettlement) {
        if let Err(err) = self
            .registry
            .reverse_balances(&prepared.mmid, &prepared.merchant_id, prepared.amount)
            .await
        {
            error!(
                mmid = %prepared.mmid,
                merchant_id = %prepared.merchant_id,
                error = %err,
                "failed to reverse transfer after ledger append failed"
            );
        }
    }
}
