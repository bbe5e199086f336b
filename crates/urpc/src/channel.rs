//! # Channel
//!
//! An RPC endpoint: a function registry, one shared `Buffer`, and a `Transport`.
//!
//! ## Philosophy
//!
//! - **Pushed, Not Polled**: The transport hands arriving bytes to `recv` in whatever
//!   chunks it has. Requests are answered from inside `recv`; responses resolve the
//!   outstanding call.
//! - **Lock-Step**: At most one outbound request is in flight. There is no call
//!   identifier on the wire, so the next response always belongs to it.
//! - **Never Crash on Input**: Only the bytes of a malformed message are discarded
//!   and reported. Decoding resumes right after them.
//!
//! ## Buffer Sharing
//!
//! The buffer holds at most one inbound message at a time. Bytes past its end stay
//! in the caller's slice until the message has been dispatched and answered, so a
//! reply always has the whole buffer to itself.
//!
//! Outbound requests are staged after any partially received message, handed to
//! the transport, and rolled back, so that message is never disturbed by sending.
//!
//! A message longer than the buffer is answered with `BROKEN_MSG`. Its remaining
//! bytes are skipped as they arrive, using the lengths in its header.
//!
//! ## Call State
//!
//! ```text
//! Idle -> Sent -> Resolved(outcome) -> Idle   (take_outcome)
//!              -> TimedOut          -> Idle   (take_outcome or reset)
//! ```

use tracing::debug;
use tracing::trace;
use tracing::warn;
use wio::Buffer;

use crate::codec;
use crate::codec::Kind;
use crate::codec::Message;
use crate::codec::Skip;
use crate::codec::VERSION;
use crate::error::Error;
use crate::error::ErrorCode;
use crate::error::Result;
use crate::func::Fault;
use crate::func::FuncInfo;
use crate::func::Function;
use crate::func::Registry;
use crate::transport::Transport;
use crate::types::Signature;
use crate::types::Type;
use crate::types::Value;

/// Default buffer capacity in bytes.
pub const DEFAULT_CAPACITY: u16 = 256;
/// Default registry size.
pub const DEFAULT_MAX_FUNCS: usize = 16;

/// The request awaiting a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `ret` is known when the call was checked against a remote description.
    Call { name: String, ret: Option<Type> },
    Query { name: String },
}

impl Request {
    pub fn name(&self) -> &str {
        match self {
            Request::Call { name, .. } | Request::Query { name } => name,
        }
    }
}

/// How an outbound request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The call returned a value.
    Value(Value),
    /// The query described a function.
    Func(FuncInfo),
    /// The peer reported an error, or its answer was unusable.
    Failed(ErrorCode),
    /// The request was abandoned by `time_out`.
    TimedOut,
}

/// Lifecycle of the outbound request slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallState {
    #[default]
    Idle,
    Sent(Request),
    Resolved(Outcome),
    TimedOut,
}

/// An RPC endpoint over a single buffer and transport.
pub struct Channel<'a, T: Transport> {
    buf: Buffer<'a>,
    funcs: Registry,
    transport: T,
    state: CallState,
    /// Remainder of a discarded message still to arrive.
    skip: Option<Skip>,
}

impl<T: Transport> std::fmt::Debug for Channel<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("buf", &self.buf)
            .field("funcs", &self.funcs)
            .field("state", &self.state)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

impl<'a, T: Transport> Channel<'a, T> {
    /// Wires an initialized buffer to a transport.
    ///
    /// # Errors
    /// Returns `Error::Local(Invalid)` if `buf` has no storage.
    pub fn new(buf: Buffer<'a>, transport: T) -> Result<Self> {
        Self::with_registry(buf, transport, Registry::new(DEFAULT_MAX_FUNCS))
    }

    fn with_registry(buf: Buffer<'a>, transport: T, funcs: Registry) -> Result<Self> {
        if !buf.is_init() {
            return Err(Error::Local(wio::Error::Invalid));
        }
        Ok(Self { buf, funcs, transport, state: CallState::Idle, skip: None })
    }

    // ------------------------------------------------------------------------
    //  Registry
    // ------------------------------------------------------------------------

    /// Adds a function descriptor.
    ///
    /// # Errors
    /// `Already` for a duplicate name, `NoMemory` when the registry is full,
    /// `Invalid` for an empty name.
    pub fn register(&mut self, func: Function) -> Result<()> {
        debug!(name = %func.name(), params = ?func.params(), ret = ?func.ret(), "registering function");
        self.funcs.insert(func)
    }

    /// Shorthand for `register(Function::new(..))`.
    pub fn register_fn<F>(&mut self, name: &str, params: impl Into<Signature>, ret: Type, handler: F) -> Result<()>
    where
        F: FnMut(&[Value]) -> std::result::Result<Value, Fault> + Send + 'static,
    {
        self.register(Function::new(name, params, ret, handler))
    }

    /// Removes and returns a descriptor. Fails `NONEXIST` if absent.
    pub fn unregister(&mut self, name: &str) -> Result<Function> {
        self.funcs.remove(name)
    }

    /// Looks up a descriptor. Fails `NONEXIST` if absent.
    pub fn get_func(&self, name: &str) -> Result<&Function> {
        self.funcs.get(name)
    }

    pub fn funcs(&self) -> &Registry {
        &self.funcs
    }

    // ------------------------------------------------------------------------
    //  Outbound
    // ------------------------------------------------------------------------

    /// Sends a `CALL` for `name`, with a signature derived from `args`.
    ///
    /// # Errors
    /// - `Local(Already)` if a request is outstanding or unclaimed.
    /// - `Local(OutOfRange)` if the message does not fit the buffer.
    /// - `Transport(..)` if the send hook refused it.
    ///
    /// On error the state is unchanged.
    pub fn call(&mut self, name: &str, args: &[Value]) -> Result<()> {
        self.start(Request::Call { name: name.to_string(), ret: None }, |buf| {
            codec::encode_call(name, args, buf)
        })
    }

    /// Like `call`, but first checks `args` against a description obtained by `query`.
    ///
    /// Mismatched arguments fail with `Protocol(SigIncorrect)` and nothing is sent.
    /// A result of a type other than `info.ret` resolves as `Failed(SigIncorrect)`.
    pub fn call_checked(&mut self, info: &FuncInfo, args: &[Value]) -> Result<()> {
        if !info.params.matches(args) {
            return Err(Error::Protocol(ErrorCode::SigIncorrect));
        }
        let request = Request::Call { name: info.name.clone(), ret: Some(info.ret) };
        self.start(request, |buf| codec::encode_call(&info.name, args, buf))
    }

    /// Sends a `FUNC_QUERY` for `name`. Resolves to `Outcome::Func`.
    pub fn query(&mut self, name: &str) -> Result<()> {
        let msg = Message::FuncQuery { name: name.to_string() };
        self.start(Request::Query { name: name.to_string() }, |buf| codec::encode(&msg, buf))
    }

    fn start(&mut self, request: Request, encode: impl FnOnce(&mut Buffer<'a>) -> Result<()>) -> Result<()> {
        if self.state != CallState::Idle {
            return Err(Error::Local(wio::Error::Already));
        }
        self.stage(encode)?;
        debug!(name = %request.name(), "request sent");
        self.state = CallState::Sent(request);
        Ok(())
    }

    pub fn state(&self) -> &CallState {
        &self.state
    }

    /// Claims the outcome of a resolved or timed-out request, returning to `Idle`.
    ///
    /// Returns `None` while the request is still in flight, or when idle.
    pub fn take_outcome(&mut self) -> Option<Outcome> {
        match std::mem::take(&mut self.state) {
            CallState::Resolved(outcome) => Some(outcome),
            CallState::TimedOut => Some(Outcome::TimedOut),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Abandons the request in flight. Returns `false` if there was none.
    ///
    /// A response that arrives later is dropped as unsolicited.
    pub fn time_out(&mut self) -> bool {
        match &self.state {
            CallState::Sent(request) => {
                warn!(name = %request.name(), "request timed out");
                self.state = CallState::TimedOut;
                true
            }
            _ => false,
        }
    }

    /// Returns to `Idle` and discards any buffered partial input.
    pub fn reset(&mut self) {
        if self.buf.unread() > 0 {
            debug!(len = self.buf.unread(), "discarding buffered input");
        }
        self.buf.reset();
        self.skip = None;
        self.state = CallState::Idle;
    }

    // ------------------------------------------------------------------------
    //  Inbound
    // ------------------------------------------------------------------------

    /// Feeds newly arrived bytes. Any chunking is accepted.
    ///
    /// Every complete message is dispatched before this returns; a trailing
    /// partial message stays buffered for the next call.
    pub fn recv(&mut self, mut bytes: &[u8]) {
        trace!(len = bytes.len(), "recv");
        while !bytes.is_empty() {
            match self.skip.as_mut() {
                Some(skip) => {
                    let n = skip.feed(bytes);
                    bytes = &bytes[n..];
                    if skip.is_done() {
                        trace!("discarded message ended");
                        self.skip = None;
                    }
                }
                None => bytes = self.absorb(bytes),
            }
        }
    }

    /// Buffers input until one message completes or fails, and handles it.
    ///
    /// Returns the bytes not yet accounted for.
    fn absorb<'b>(&mut self, bytes: &'b [u8]) -> &'b [u8] {
        self.buf.compact();
        let before = usize::from(self.buf.unread());
        let n = bytes.len().min(usize::from(self.buf.available()));
        if n == 0 {
            self.overflow();
            return bytes;
        }
        if let Err(e) = self.buf.write(&bytes[..n]) {
            warn!(error = %e, "dropping input");
            self.buf.reset();
            return &[];
        }

        match codec::decode_slice(self.buf.peek()) {
            Ok(Some((msg, len))) => {
                // Everything buffered before this write was a prefix of `msg`.
                let take = len.saturating_sub(before).min(n);
                self.buf.reset();
                self.dispatch(msg);
                &bytes[take..]
            }
            Ok(None) => {
                if self.buf.available() == 0 {
                    self.overflow();
                }
                &bytes[n..]
            }
            Err(e) => {
                warn!(error = %e, len = e.len(), "discarding malformed input");
                let take = e.len().saturating_sub(before);
                self.buf.reset();
                let rest = if take > n {
                    self.skip = Some(Skip::bytes(take - n));
                    &bytes[n..]
                } else {
                    &bytes[take..]
                };
                self.reject(e.kind(), e.code());
                rest
            }
        }
    }

    fn dispatch(&mut self, msg: Message) {
        trace!(kind = ?msg.kind(), "decoded message");
        match msg {
            Message::Call { name, params, args } => self.handle_call(&name, &params, &args),
            Message::FuncQuery { name } => match self.funcs.get(&name) {
                Ok(func) => {
                    let info = func.info();
                    self.reply(&Message::FuncResp { version: info.version, params: info.params, ret: info.ret });
                }
                Err(_) => {
                    debug!(name = %name, "query for unknown function");
                    self.send_error(ErrorCode::Nonexist);
                }
            },
            response => self.resolve(response),
        }
    }

    fn handle_call(&mut self, name: &str, params: &Signature, args: &[Value]) {
        let Some(func) = self.funcs.get_mut(name) else {
            debug!(name = %name, "call to unknown function");
            self.send_error(ErrorCode::Nonexist);
            return;
        };
        if func.params() != params {
            debug!(name = %name, expected = ?func.params(), got = ?params, "signature mismatch");
            self.send_error(ErrorCode::SigIncorrect);
            return;
        }
        match func.invoke(args) {
            Ok(value) => {
                trace!(name = %name, "call handled");
                self.reply(&Message::CallResult(value));
            }
            Err(fault) => {
                warn!(name = %name, fault = %fault, "handler fault");
                self.send_error(ErrorCode::Exception);
            }
        }
    }

    fn resolve(&mut self, response: Message) {
        let request = match std::mem::take(&mut self.state) {
            CallState::Sent(request) => request,
            other => {
                warn!(kind = ?response.kind(), state = ?other, "dropping unsolicited response");
                self.state = other;
                return;
            }
        };

        let outcome = match (&request, response) {
            (_, Message::Error(code)) => Outcome::Failed(code),
            (Request::Call { ret: Some(ret), .. }, Message::CallResult(value)) if value.ty() != *ret => {
                debug!(name = %request.name(), expected = ?ret, got = ?value.ty(), "result of undeclared type");
                Outcome::Failed(ErrorCode::SigIncorrect)
            }
            (Request::Call { .. }, Message::CallResult(value)) => Outcome::Value(value),
            (Request::Query { name }, Message::FuncResp { version, params, ret }) => {
                if version == VERSION {
                    Outcome::Func(FuncInfo { name: name.clone(), version, params, ret })
                } else {
                    debug!(name = %name, version, "unsupported protocol version");
                    Outcome::Failed(ErrorCode::NoSupport)
                }
            }
            (_, other) => {
                debug!(name = %request.name(), kind = ?other.kind(), "response does not answer request");
                Outcome::Failed(ErrorCode::BrokenMsg)
            }
        };

        debug!(name = %request.name(), outcome = ?outcome, "request resolved");
        self.state = CallState::Resolved(outcome);
    }

    /// The buffer is full and still holds no complete message.
    fn overflow(&mut self) {
        let Some(kind) = self.buf.peek().first().copied().and_then(Kind::from_u8) else {
            self.buf.reset();
            return;
        };
        warn!(kind = ?kind, capacity = self.buf.capacity(), "message too long, discarding");
        let mut skip = Skip::message(kind);
        skip.feed(self.buf.peek());
        self.buf.reset();
        if !skip.is_done() {
            self.skip = Some(skip);
        }
        self.reject(Some(kind), ErrorCode::BrokenMsg);
    }

    /// Reports a failure to whoever is waiting on it.
    ///
    /// Requests and unknown kinds are answered on the wire. A broken response
    /// resolves the local request instead; an `ERROR` is never answered.
    fn reject(&mut self, kind: Option<Kind>, code: ErrorCode) {
        match kind {
            Some(kind) if !kind.is_request() => {
                if matches!(self.state, CallState::Sent(_)) {
                    self.state = CallState::Resolved(Outcome::Failed(code));
                }
            }
            _ => self.send_error(code),
        }
    }

    // ------------------------------------------------------------------------
    //  Sending
    // ------------------------------------------------------------------------

    /// Encodes after any partially received message, sends, then rolls the buffer back.
    fn stage(&mut self, encode: impl FnOnce(&mut Buffer<'a>) -> Result<()>) -> Result<()> {
        self.buf.compact();
        let mark = self.buf.mark();
        encode(&mut self.buf)?;
        let len = self.buf.since(mark).len();
        let sent = self.transport.send(self.buf.since(mark));
        self.buf.rollback(mark);
        sent?;
        trace!(len, "sent");
        self.transport.after_send(len);
        Ok(())
    }

    /// Sends a response. A response too large for the buffer becomes `ERROR(EXCEPTION)`.
    fn reply(&mut self, msg: &Message) {
        match self.stage(|buf| codec::encode(msg, buf)) {
            Ok(()) => {}
            Err(Error::Local(e)) if e.is_recoverable() => {
                warn!(kind = ?msg.kind(), error = %e, "response does not fit");
                self.send_error(ErrorCode::Exception);
            }
            Err(e) => warn!(kind = ?msg.kind(), error = %e, "failed to send response"),
        }
    }

    /// `ERROR` is two bytes and is encoded on the stack, so it can always be sent.
    fn send_error(&mut self, code: ErrorCode) {
        let mut scratch = [0u8; 2];
        let result = Buffer::borrowed(&mut scratch)
            .map_err(Error::from)
            .and_then(|mut buf| {
                codec::encode(&Message::Error(code), &mut buf)?;
                self.transport.send(buf.peek())?;
                Ok(buf.unread())
            });
        match result {
            Ok(len) => {
                trace!(code = ?code, "sent error");
                self.transport.after_send(usize::from(len));
            }
            Err(e) => warn!(code = ?code, error = %e, "failed to send error"),
        }
    }

    // ------------------------------------------------------------------------
    //  Accessors
    // ------------------------------------------------------------------------

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn buffer(&self) -> &Buffer<'a> {
        &self.buf
    }
}

/// Fluent configuration for a `Channel`.
pub struct ChannelBuilder<'a> {
    buffer: Option<Buffer<'a>>,
    capacity: u16,
    max_funcs: usize,
    funcs: Vec<Function>,
}

impl Default for ChannelBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ChannelBuilder<'a> {
    pub fn new() -> Self {
        Self {
            buffer: None,
            capacity: DEFAULT_CAPACITY,
            max_funcs: DEFAULT_MAX_FUNCS,
            funcs: Vec::new(),
        }
    }

    /// Capacity of the owned buffer allocated by `build`.
    pub fn capacity(mut self, capacity: u16) -> Self {
        self.capacity = capacity;
        self
    }

    /// Uses an existing buffer instead of allocating one. `capacity` is then ignored.
    pub fn buffer(mut self, buffer: Buffer<'a>) -> Self {
        self.buffer = Some(buffer);
        self
    }

    pub fn max_funcs(mut self, max: usize) -> Self {
        self.max_funcs = max;
        self
    }

    pub fn function(mut self, func: Function) -> Self {
        self.funcs.push(func);
        self
    }

    /// # Errors
    /// Buffer allocation failures, and any registration error of the queued functions.
    pub fn build<T: Transport>(self, transport: T) -> Result<Channel<'a, T>> {
        let buf = match self.buffer {
            Some(buf) => buf,
            None => Buffer::owned(self.capacity)?,
        };
        let mut channel = Channel::with_registry(buf, transport, Registry::new(self.max_funcs))?;
        for func in self.funcs {
            channel.register(func)?;
        }
        Ok(channel)
    }
}
