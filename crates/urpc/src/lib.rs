//! # uRPC
//!
//! A minimal binary RPC protocol for constrained devices talking over a byte link
//! (UART, a socket, a radio FIFO).
//!
//! ## Architecture
//!
//! - `types`: the closed set of primitive kinds, `Signature`, and the self-describing `Vary`.
//! - `codec`: the wire format of the five message kinds, restartable on partial input.
//! - `func`: named handlers with declared signatures, held in a bounded `Registry`.
//! - `channel`: one endpoint. Owns a `wio::Buffer`, a `Registry`, and a `Transport`,
//!   answers inbound requests and resolves its own outbound request.
//!
//! Everything is single-threaded and callback-driven. Nothing blocks; nothing waits.
//! Waiting for a response, and giving up on one, is left to the integration
//! (see the `urpc-link` crate for a tokio one).
//!
//! ## Example
//!
//! ```
//! use urpc::ChannelBuilder;
//! use urpc::Outcome;
//! use urpc::Type;
//! use urpc::Value;
//!
//! let mut server = ChannelBuilder::new().build(Vec::<Vec<u8>>::new()).unwrap();
//! server
//!     .register_fn("add", [Type::I32, Type::I32], Type::I32, |args| {
//!         let a = i32::try_from(&args[0]).map_err(|_| "a")?;
//!         let b = i32::try_from(&args[1]).map_err(|_| "b")?;
//!         Ok(Value::I32(a.wrapping_add(b)))
//!     })
//!     .unwrap();
//!
//! let mut client = ChannelBuilder::new().build(Vec::<Vec<u8>>::new()).unwrap();
//! client.call("add", &[Value::I32(2), Value::I32(3)]).unwrap();
//!
//! for msg in client.transport_mut().drain(..).collect::<Vec<_>>() {
//!     server.recv(&msg);
//! }
//! for msg in server.transport_mut().drain(..).collect::<Vec<_>>() {
//!     client.recv(&msg);
//! }
//! assert_eq!(client.take_outcome(), Some(Outcome::Value(Value::I32(5))));
//! ```

pub mod channel;
pub mod codec;
mod cursor;
pub mod error;
pub mod func;
pub mod transport;
pub mod types;


pub use channel::CallState;
pub use channel::Channel;
pub use channel::ChannelBuilder;
pub use channel::Outcome;
pub use channel::Request;
pub use codec::Kind;
pub use codec::Message;
pub use codec::VERSION;
pub use error::Error;
pub use error::ErrorCode;
pub use error::Result;
pub use func::Fault;
pub use func::FuncInfo;
pub use func::Function;
pub use func::Handler;
pub use transport::Transport;
pub use transport::TransportError;
pub use types::Signature;
pub use types::Type;
pub use types::Value;
pub use types::Vary;
pub use wio::Buffer;
