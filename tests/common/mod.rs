#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use settlement_bank::application::worker::BankHandle;
use settlement_bank::config::ServerConfig;
use settlement_bank::domain::account::{MerchantRegistration, Secret, UserRegistration};
use settlement_bank::domain::identity::{MerchantId, Mmid, SystemClock, TxId};
use settlement_bank::domain::ledger::{LedgerBlock, PendingBlock};
use settlement_bank::domain::ports::{LedgerStore, SharedLedgerStore};
use settlement_bank::domain::transaction::SettlementRequest;
use settlement_bank::error::{BankError, Result};
use settlement_bank::infrastructure::in_memory::{InMemoryAccountStore, InMemoryLedgerStore};
use settlement_bank::interfaces::dispatcher::Dispatcher;
use settlement_bank::interfaces::tcp::client::BankClient;
use settlement_bank::interfaces::tcp::server::BankServer;
use settlement_bank::interfaces::wire::protocol::{Outcome, Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore, oneshot};
use tokio::task::JoinHandle;

pub const PIN: &str = "4321";

/// A bank server on an ephemeral port, stopped when dropped.
pub struct TestBank {
    pub addr: SocketAddr,
    pub bank: BankHandle,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl TestBank {
    pub async fn start() -> Self {
        Self::start_with(local_config()).await
    }

    pub async fn start_with(config: ServerConfig) -> Self {
        Self::serve(config, Arc::new(InMemoryLedgerStore::new())).await
    }

    pub async fn start_with_ledger(ledger: SharedLedgerStore) -> Self {
        Self::serve(local_config(), ledger).await
    }

    async fn serve(config: ServerConfig, ledger: SharedLedgerStore) -> Self {
        let (bank, _worker) = BankHandle::spawn(
            Arc::new(InMemoryAccountStore::new()),
            ledger,
            Arc::new(SystemClock),
            config.queue_capacity,
        );
        let server = BankServer::bind(config, Dispatcher::new(bank.clone()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel();
        let server = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            bank,
            shutdown: Some(tx),
            server: Some(server),
        }
    }

    pub fn client(&self) -> BankClient {
        BankClient::new(self.addr, Duration::from_secs(5))
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            server.await.unwrap();
        }
    }
}

impl Drop for TestBank {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn local_config() -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        ..ServerConfig::default()
    }
}

/// An in-memory ledger whose appends wait until [`GatedLedger::open`] is
/// called, holding the bank worker inside a commit.
pub struct GatedLedger {
    inner: InMemoryLedgerStore,
    entered: Notify,
    gate: Semaphore,
}

impl GatedLedger {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryLedgerStore::new(),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        })
    }

    /// Resolves once an append is waiting at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn open(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl LedgerStore for GatedLedger {
    async fn append(&self, pending: PendingBlock) -> Result<LedgerBlock> {
        self.entered.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| BankError::InternalError("gate closed".to_string()))?;
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

pub fn user(name: &str, phone: &str, balance: Decimal) -> Request {
    Request::RegisterUser(UserRegistration {
        name: name.to_string(),
        password: Secret::new("p"),
        routing_code: "IFSC0001".to_string(),
        balance,
        pin: Secret::new(PIN),
        phone: phone.to_string(),
    })
}

pub fn merchant(name: &str, balance: Decimal) -> Request {
    Request::RegisterMerchant(MerchantRegistration {
        name: name.to_string(),
        password: Secret::new("q"),
        routing_code: "IFSC0002".to_string(),
        balance,
    })
}

pub fn settle(mmid: &Mmid, merchant_id: &MerchantId, pin: &str, amount: Decimal) -> Request {
    Request::ValidateTransaction(SettlementRequest {
        mmid: mmid.clone(),
        pin: Secret::new(pin),
        amount,
        merchant_id: merchant_id.clone(),
    })
}

pub async fn register_user(client: &BankClient, name: &str, phone: &str, balance: Decimal) -> Mmid {
    match client.send(&user(name, phone, balance)).await.unwrap() {
        Response::Success(Outcome::UserRegistered { mmid, .. }) => mmid,
        other => panic!("unexpected response: {other:?}"),
    }
}

pub async fn register_merchant(client: &BankClient, name: &str, balance: Decimal) -> MerchantId {
    match client.send(&merchant(name, balance)).await.unwrap() {
        Response::Success(Outcome::MerchantRegistered { merchant_id }) => merchant_id,
        other => panic!("unexpected response: {other:?}"),
    }
}
