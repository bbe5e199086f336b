//! # Transport Abstraction
//!
//! The two capabilities a `Channel` needs from whatever moves its bytes.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: The transport knows nothing about messages, types, or signatures.
//! - **Non-Blocking**: `send` may run from an interrupt or event context. It copies
//!   the bytes out (into a FIFO, a DMA descriptor, a socket queue) and returns promptly.
//! - **Inbound is pushed**: The transport calls `Channel::recv` with whatever bytes
//!   it has, in whatever chunking it has them.

/// Errors reported by a send hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The link is down.
    ConnectionLost(String),
    /// The transport cannot take this many bytes right now.
    Busy,
    /// Generic I/O failure.
    Io(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Busy => write!(f, "Transport busy"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Outbound half of a byte link.
pub trait Transport {
    /// Accepts one complete encoded message for transmission.
    ///
    /// # Invariants
    /// - Must not block.
    /// - Must copy `bytes` before returning; the slice is reused immediately after.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Invoked once `send` has accepted a message of `len` bytes.
    fn after_send(&mut self, _len: usize) {}
}

/// Collects each sent message. Useful for loopback wiring and tests.
impl Transport for Vec<Vec<u8>> {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.push(bytes.to_vec());
        Ok(())
    }
}
