use crate::application::engine::SettlementEngine;
use crate::application::registry::{AccountRegistry, RegisteredUser};
use crate::domain::account::{Balance, MerchantAccount, MerchantRegistration, UserAccount, UserRegistration};
use crate::domain::identity::{Clock, MerchantId, Mmid};
use crate::domain::ledger::LedgerBlock;
use crate::domain::ports::{SharedAccountStore, SharedLedgerStore};
use crate::domain::transaction::{SettlementReceipt, SettlementRequest};
use crate::error::{BankError, Result};
use crate::infrastructure::in_memory::{InMemoryAccountStore, InMemoryLedgerStore};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    RegisterUser {
        registration: UserRegistration,
        reply: Reply<RegisteredUser>,
    },
    RegisterMerchant {
        registration: MerchantRegistration,
        reply: Reply<MerchantId>,
    },
    Settle {
        request: SettlementRequest,
        reply: Reply<SettlementReceipt>,
    },
}

/// Cloneable front door to the bank.
///
/// Every mutating operation is queued to a single worker task and executed
/// one at a time, so balance checks and the mutations they guard never
/// interleave and ledger order is commit order. Reads go straight to the
/// stores.
#[derive(Clone)]
pub struct BankHandle {
    commands: mpsc::Sender<Command>,
    registry: AccountRegistry,
    ledger: SharedLedgerStore,
}

impl BankHandle {
    /// Builds the registry and engine over the given stores and spawns the
    /// worker. The worker stops once every handle has been dropped.
    pub fn spawn(
        accounts: SharedAccountStore,
        ledger: SharedLedgerStore,
        clock: Arc<dyn Clock>,
        queue_capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let registry = AccountRegistry::new(accounts, clock);
        let engine = SettlementEngine::new(registry.clone(), ledger.clone());
        let (commands, receiver) = mpsc::channel(queue_capacity.max(1));

        let worker = BankWorker {
            registry: registry.clone(),
            engine,
            receiver,
        };
        let task = tokio::spawn(worker.run());

        let handle = Self {
            commands,
            registry,
            ledger,
        };
        (handle, task)
    }

    /// A bank backed by fresh in-memory stores.
    pub fn in_memory(clock: Arc<dyn Clock>, queue_capacity: usize) -> (Self, JoinHandle<()>) {
        Self::spawn(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemoryLedgerStore::new()),
            clock,
            queue_capacity,
        )
    }

    pub async fn register_user(&self, registration: UserRegistration) -> Result<RegisteredUser> {
        self.call(|reply| Command::RegisterUser {
            registration,
            reply,
        })
        .await
    }

    pub async fn register_merchant(&self, registration: MerchantRegistration) -> Result<MerchantId> {
        self.call(|reply| Command::RegisterMerchant {
            registration,
            reply,
        })
        .await
    }

    /// Queues a settlement. Dropping the returned future before the worker
    /// reaches the commit point abandons the settlement with no effect.
    pub async fn settle(&self, request: SettlementRequest) -> Result<SettlementReceipt> {
        self.call(|reply| Command::Settle { request, reply }).await
    }

    pub async fn blockchain(&self) -> Result<Vec<LedgerBlock>> {
        self.ledger.snapshot().await
    }

    pub async fn get_user(&self, mmid: &Mmid) -> Result<UserAccount> {
        self.registry.get_user(mmid).await
    }

    pub async fn get_merchant(&self, merchant_id: &MerchantId) -> Result<MerchantAccount> {
        self.registry.get_merchant(merchant_id).await
    }

    pub async fn total_balance(&self) -> Result<Balance> {
        self.registry.total_balance().await
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| BankError::InternalError("bank worker is not running".to_string()))?;
        response
            .await
            .map_err(|_| BankError::InternalError("bank worker dropped the request".to_string()))?
    }
}

struct BankWorker {
    registry: AccountRegistry,
    engine: SettlementEngine,
    receiver: mpsc::Receiver<Command>,
}

impl BankWorker {
    async fn run(mut self) {
        while let Some(command) = self.receiver.recv().await {
            self.handle(command).await;
        }
        debug!("bank worker stopped");
    }

    async fn handle(&self, command: Command) {
        match command {
            Command::RegisterUser {
                registration,
                reply,
            } => {
                if reply.is_closed() {
                    debug!("registration abandoned by requester");
                    return;
                }
                let result = self.registry.register_user(registration).await;
                deliver(reply, result);
            }
            Command::RegisterMerchant {
                registration,
                reply,
            } => {
                if reply.is_closed() {
                    debug!("registration abandoned by requester");
                    return;
                }
                let result = self.registry.register_merchant(registration).await;
                deliver(reply, result);
            }
            Command::Settle { request, reply } => {
                let prepared = match self.engine.prepare(&request).await {
                    Ok(prepared) => prepared,
                    Err(err) => {
                        deliver(reply, Err(err));
                        return;
                    }
                };
                // Last point at which the settlement can be dropped cleanly.
                if reply.is_closed() {
                    warn!(mmid = %prepared.mmid, "settlement abandoned before commit");
                    return;
                }
                let result = self.engine.commit(prepared).await;
                if let Err(Ok(receipt)) = reply.send(result) {
                    warn!(
                        tx_id = %receipt.tx_id,
                        mmid = %receipt.block.mmid,
                        merchant_id = %receipt.block.merchant_id,
                        amount = %receipt.amount,
                        "requester went away after commit; settlement stands"
                    );
                }
            }
        }
    }
}

fn deliver<T>(reply: Reply<T>, result: Result<T>) {
    if let Err(Ok(_)) = reply.send(result) {
        warn!("requester went away after registration; account stands");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Secret;
    use crate::domain::identity::{SystemClock, TxId};
    use crate::domain::ledger::PendingBlock;
    use crate::domain::ports::LedgerStore;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tokio::sync::{Notify, Semaphore};

    fn alice(balance: Decimal) -> UserRegistration {
        UserRegistration {
            name: "alice".into(),
            password: Secret::new("hunter2"),
            routing_code: "BANK0001".into(),
            balance,
            pin: Secret::new("1234"),
            phone: "5550100".into(),
        }
    }

    fn shop() -> MerchantRegistration {
        MerchantRegistration {
            name: "shop".into(),
            password: Secret::new("pw"),
            routing_code: "BANK0002".into(),
            balance: dec!(0),
        }
    }

    fn pay(user: &RegisteredUser, merchant_id: &MerchantId, amount: Decimal) -> SettlementRequest {
        SettlementRequest {
            mmid: user.mmid.clone(),
            pin: Secret::new("1234"),
            amount,
            merchant_id: merchant_id.clone(),
        }
    }

    #[tokio::test]
    async fn test_handle_round_trip() {
        let (bank, _worker) = BankHandle::in_memory(Arc::new(SystemClock), 16);
        let user = bank.register_user(alice(dec!(100))).await.unwrap();
        let merchant_id = bank.register_merchant(shop()).await.unwrap();

        let receipt = bank.settle(pay(&user, &merchant_id, dec!(40))).await.unwrap();

        assert_eq!(receipt.remaining_balance, Balance::new(dec!(60)));
        assert_eq!(bank.blockchain().await.unwrap().len(), 1);
        let merchant = bank.get_merchant(&merchant_id).await.unwrap();
        assert_eq!(merchant.balance, Balance::new(dec!(40)));
    }

    #[tokio::test]
    async fn test_concurrent_settlements_never_overdraw() {
        let (bank, _worker) = BankHandle::in_memory(Arc::new(SystemClock), 4);
        let user = bank.register_user(alice(dec!(100))).await.unwrap();
        let merchant_id = bank.register_merchant(shop()).await.unwrap();
        let total_before = bank.total_balance().await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..25 {
            let bank = bank.clone();
            let request = pay(&user, &merchant_id, dec!(30));
            tasks.push(tokio::spawn(async move { bank.settle(request).await }));
        }

        let mut successes = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(receipt) => {
                    assert!(receipt.remaining_balance >= Balance::ZERO);
                    successes += 1;
                }
                Err(err) => assert!(matches!(err, BankError::InsufficientFundsError)),
            }
        }

        assert_eq!(successes, 3);
        assert_eq!(bank.blockchain().await.unwrap().len(), 3);
        let account = bank.get_user(&user.mmid).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(10)));
        assert_eq!(bank.total_balance().await.unwrap(), total_before);
    }

    #[tokio::test]
    async fn test_abandoned_settlement_has_no_effect() {
        let (bank, _worker) = BankHandle::in_memory(Arc::new(SystemClock), 16);
        let user = bank.register_user(alice(dec!(100))).await.unwrap();
        let merchant_id = bank.register_merchant(shop()).await.unwrap();

        // Queue a command whose requester has already given up.
        let (reply, response) = oneshot::channel();
        drop(response);
        bank.commands
            .send(Command::Settle {
                request: pay(&user, &merchant_id, dec!(40)),
                reply,
            })
            .await
            .unwrap();

        // Commands run in order, so once this completes the abandoned one has
        // been handled.
        bank.register_merchant(shop()).await.unwrap();

        assert!(bank.blockchain().await.unwrap().is_empty());
        let account = bank.get_user(&user.mmid).await.unwrap();
        assert_eq!(account.balance, Balance::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_overflowing_settlement_leaves_worker_running() {
        let (bank, worker) = BankHandle::in_memory(Arc::new(SystemClock), 16);
        let user = bank.register_user(alice(dec!(10))).await.unwrap();
        let merchant_id = bank
            .register_merchant(MerchantRegistration {
                balance: Decimal::MAX,
                ..shop()
            })
            .await
            .unwrap();

        let result = bank.settle(pay(&user, &merchant_id, dec!(1))).await;

        assert!(matches!(result, Err(BankError::ValidationError(_))));
        assert_eq!(
            bank.get_user(&user.mmid).await.unwrap().balance,
            Balance::new(dec!(10))
        );
        assert_eq!(
            bank.get_merchant(&merchant_id).await.unwrap().balance,
            Balance::new(Decimal::MAX)
        );
        assert!(bank.blockchain().await.unwrap().is_empty());

        assert!(!worker.is_finished());
        assert!(bank.register_merchant(shop()).await.is_ok());
    }

    /// Holds every append until the test adds a permit.
    struct GatedLedger {
        inner: InMemoryLedgerStore,
        entered: Notify,
        gate: Semaphore,
    }

    #[async_trait]
    impl LedgerStore for GatedLedger {
        async fn append(&self, pending: PendingBlock) -> Result<LedgerBlock> {
            self.entered.notify_one();
            let _permit = self.gate.acquire().await.unwrap();
            self.inner.append(pending).await
        }

        async fn snapshot(&self) -> Result<Vec<LedgerBlock>> {
            self.inner.snapshot().await
        }

        async fn contains(&self, tx_id: &TxId) -> Result<bool> {
            self.inner.contains(tx_id).await
        }

        async fn len(&self) -> Result<usize> {
            self.inner.len().await
        }
    }

    #[tokio::test]
    async fn test_requester_leaving_after_commit_point_does_not_undo_settlement() {
        let ledger = Arc::new(GatedLedger {
            inner: InMemoryLedgerStore::new(),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        });
        let (bank, _worker) = BankHandle::spawn(
            Arc::new(InMemoryAccountStore::new()),
            ledger.clone(),
            Arc::new(SystemClock),
            16,
        );
        let user = bank.register_user(alice(dec!(100))).await.unwrap();
        let merchant_id = bank.register_merchant(shop()).await.unwrap();

        let pending = {
            let bank = bank.clone();
            let request = pay(&user, &merchant_id, dec!(40));
            tokio::spawn(async move { bank.settle(request).await })
        };
        ledger.entered.notified().await;
        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());
        ledger.gate.add_permits(1);

        // Runs after the abandoned settlement has finished committing.
        bank.register_merchant(shop()).await.unwrap();

        let chain = bank.blockchain().await.unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].mmid, user.mmid);
        assert_eq!(
            bank.get_user(&user.mmid).await.unwrap().balance,
            Balance::new(dec!(60))
        );
    }

    #[tokio::test]
    async fn test_worker_stops_when_handles_drop() {
        let (bank, worker) = BankHandle::in_memory(Arc::new(SystemClock), 1);
        drop(bank);
        worker.await.unwrap();
    }
}
