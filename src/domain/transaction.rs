use crate::domain::account::{Amount, Balance, Secret};
use crate::domain::identity::{MerchantId, Mmid, TxId};
use crate::domain::ledger::LedgerBlock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A user's request to pay a merchant.
///
/// `amount` is kept as a raw decimal so that a non-positive value is reported
/// by the engine as a validation failure rather than a decoding error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub mmid: Mmid,
    #[serde(alias = "pin_code")]
    pub pin: Secret,
    pub amount: Decimal,
    #[serde(alias = "encrypted_merchant_id")]
    pub merchant_id: MerchantId,
}

/// A settlement that passed every check and may be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSettlement {
    pub mmid: Mmid,
    pub merchant_id: MerchantId,
    pub amount: Amount,
}

/// Result of a committed settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementReceipt {
    pub tx_id: TxId,
    pub amount: Amount,
    pub remaining_balance: Balance,
    pub block: LedgerBlock,
}
