//! Network-facing layer: wire format, request routing, TCP server and client.

pub mod dispatcher;
pub mod tcp;
pub mod wire;
