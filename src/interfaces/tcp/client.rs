use crate::domain::ledger::LedgerBlock;
use crate::error::{BankError, Result};
use crate::interfaces::wire::frame::{read_frame, write_frame};
use crate::interfaces::wire::protocol::{Outcome, Request, Response};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Responses carry the whole ledger, so they may be far larger than any
/// request the server accepts.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// Sends requests to a bank server, one connection per request.
#[derive(Debug, Clone)]
pub struct BankClient {
    addr: SocketAddr,
    timeout: Duration,
    max_frame_bytes: usize,
}

impl BankClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self {
            addr,
            timeout,
            max_frame_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    pub async fn send(&self, request: &Request) -> Result<Response> {
        let body = request.encode()?;
        let reply = self.exchange(&body).await?;
        Response::decode(&reply)
    }

    /// Sends an already-encoded body. Lets callers exercise the server with
    /// bytes a well-behaved client would never produce.
    pub async fn exchange(&self, body: &[u8]) -> Result<Vec<u8>> {
        let mut stream = timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| BankError::timed_out("connect"))??;
        timeout(self.timeout, write_frame(&mut stream, body))
            .await
            .map_err(|_| BankError::timed_out("write"))??;
        timeout(self.timeout, read_frame(&mut stream, self.max_frame_bytes))
            .await
            .map_err(|_| BankError::timed_out("read"))?
    }

    /// Fetches the full ledger.
    pub async fn fetch_chain(&self) -> Result<Vec<LedgerBlock>> {
        match self.send(&Request::GetBlockchain).await? {
            Response::Success(Outcome::Chain { chain }) => Ok(chain),
            Response::Success(other) => Err(BankError::ProtocolError(format!(
                "unexpected reply to get_blockchain: {other:?}"
            ))),
            Response::Failure { message } | Response::Error { message } => {
                Err(BankError::InternalError(message))
            }
        }
    }
}
