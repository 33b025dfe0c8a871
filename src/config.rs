use crate::error::{BankError, Result};
use crate::interfaces::wire::frame::DEFAULT_MAX_FRAME_BYTES;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9999";
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Runtime settings for the bank server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,
    /// Bound on each socket read or write.
    pub io_timeout: Duration,
    /// Bound on executing one request once it has been read.
    pub request_timeout: Duration,
    /// Largest accepted request body.
    pub max_frame_bytes: usize,
    /// Mutating requests waiting for the bank worker before senders block.
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9999)),
            io_timeout: DEFAULT_IO_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.io_timeout.is_zero() {
            return Err(BankError::ValidationError(
                "io_timeout must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(BankError::ValidationError(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_frame_bytes == 0 || u32::try_from(self.max_frame_bytes).is_err() {
            return Err(BankError::ValidationError(format!(
                "max_frame_bytes must be between 1 and {}",
                u32::MAX
            )));
        }
        if self.queue_capacity == 0 {
            return Err(BankError::ValidationError(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
