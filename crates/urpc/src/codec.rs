//! # Codec
//!
//! The wire format of every message, and its translation to and from a `wio::Buffer`.
//!
//! ## Format
//!
//! - **Message**: `[Kind: 1b][Payload]`
//! - **Identifier**: `[Len: 2b][UTF-8: Len]`
//! - **Signature**: `[Count: 2b][Type: 1b]*Count`
//! - **Scalars**: fixed width per `Type`
//! - **Vary**: `[Type: 1b][Len: 2b][Data: Len]`
//!
//! All integers are Little-Endian.
//!
//! ## Invariants
//! - **Restartable**: Decoding a prefix of a valid message reports `None`, never an error,
//!   and leaves the buffer untouched.
//! - **Transactional**: A failed encode leaves the buffer exactly as it was.
//! - **Panic Safety**: All decoding paths return `Result`, never panicking on unknown data.

use std::collections::VecDeque;

use wio::Buffer;

use crate::cursor::Cursor;
use crate::cursor::Short;
use crate::cursor::Step;
use crate::error::Error;
use crate::error::ErrorCode;
use crate::error::Result;
use crate::types::Signature;
use crate::types::Type;
use crate::types::Value;
use crate::types::Vary;

/// Protocol version announced in `FUNC_RESP`.
pub const VERSION: u8 = 0;

/// Message kind, the first byte of every message.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Error = 0x00,
    FuncQuery = 0x01,
    FuncResp = 0x02,
    Call = 0x03,
    CallResult = 0x04,
}

impl Kind {
    /// Returns the Kind for a given byte, or `None` if invalid.
    pub const fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Kind::Error),
            0x01 => Some(Kind::FuncQuery),
            0x02 => Some(Kind::FuncResp),
            0x03 => Some(Kind::Call),
            0x04 => Some(Kind::CallResult),
            _ => None,
        }
    }

    /// Requests expect an answer; everything else answers something.
    pub const fn is_request(self) -> bool {
        matches!(self, Kind::Call | Kind::FuncQuery)
    }
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Invoke `name`. `params` restates the caller's view of the signature.
    Call { name: String, params: Signature, args: Vec<Value> },
    /// The return value of the outstanding call.
    CallResult(Value),
    /// The outstanding request failed.
    Error(ErrorCode),
    /// Ask the peer to describe `name`.
    FuncQuery { name: String },
    /// Answer to a `FuncQuery`.
    FuncResp { version: u8, params: Signature, ret: Type },
}

impl Message {
    /// Builds a `Call` whose signature is derived from the arguments.
    pub fn call(name: impl Into<String>, args: Vec<Value>) -> Self {
        let params = Signature::of(&args);
        Message::Call { name: name.into(), params, args }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Message::Call { .. } => Kind::Call,
            Message::CallResult(_) => Kind::CallResult,
            Message::Error(_) => Kind::Error,
            Message::FuncQuery { .. } => Kind::FuncQuery,
            Message::FuncResp { .. } => Kind::FuncResp,
        }
    }
}

/// Inbound bytes that can never become a valid message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The first byte is not a known message kind.
    UnknownKind(u8),
    /// The header was recognized but the payload is structurally impossible.
    ///
    /// `len` counts the bytes known to belong to the message, up to and including
    /// the offending field. It may exceed what has been received.
    Broken { kind: Kind, reason: &'static str, len: usize },
}

impl DecodeError {
    /// The wire code to report for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::UnknownKind(_) => ErrorCode::NoSupport,
            DecodeError::Broken { .. } => ErrorCode::BrokenMsg,
        }
    }

    /// Bytes to discard before decoding can resume.
    pub fn len(&self) -> usize {
        match self {
            DecodeError::UnknownKind(_) => 1,
            DecodeError::Broken { len, .. } => *len,
        }
    }

    /// The kind of the offending message, if it was recognized.
    pub fn kind(&self) -> Option<Kind> {
        match self {
            DecodeError::UnknownKind(_) => None,
            DecodeError::Broken { kind, .. } => Some(*kind),
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::UnknownKind(b) => write!(f, "Unknown message kind: {:#04x}", b),
            DecodeError::Broken { kind, reason, .. } => write!(f, "Broken {:?} message: {}", kind, reason),
        }
    }
}

impl std::error::Error for DecodeError {}

// ============================================================================
//  ENCODING
// ============================================================================

/// Appends `msg` at the write cursor of `buf`.
///
/// # Errors
/// - `Error::Local(OutOfRange)` if the message does not fit.
/// - `Error::Local(Invalid)` if a name, signature, or `Vary` exceeds a 16-bit length.
/// - `Error::Protocol(SigIncorrect)` if a `Call`'s arguments disagree with its `params`.
///
/// On error, nothing is written.
pub fn encode(msg: &Message, buf: &mut Buffer<'_>) -> Result<()> {
    match msg {
        Message::Call { name, params, args } => {
            if !params.matches(args) {
                return Err(ErrorCode::SigIncorrect.into());
            }
            staged(buf, |w| w.call(name, params, args))
        }
        Message::CallResult(v) => staged(buf, |w| {
            w.u8(Kind::CallResult as u8)?;
            w.u8(v.ty() as u8)?;
            w.value(v)
        }),
        Message::Error(code) => staged(buf, |w| {
            w.u8(Kind::Error as u8)?;
            w.u8(*code as u8)
        }),
        Message::FuncQuery { name } => staged(buf, |w| {
            w.u8(Kind::FuncQuery as u8)?;
            w.name(name)
        }),
        Message::FuncResp { version, params, ret } => staged(buf, |w| {
            w.u8(Kind::FuncResp as u8)?;
            w.u8(*version)?;
            w.signature(params)?;
            w.u8(*ret as u8)
        }),
    }
}

/// Appends a `Call` for `name` with a signature derived from `args`.
///
/// Equivalent to `encode(&Message::call(name, args), buf)` without cloning the arguments.
pub fn encode_call(name: &str, args: &[Value], buf: &mut Buffer<'_>) -> Result<()> {
    let params = Signature::of(args);
    staged(buf, |w| w.call(name, &params, args))
}

/// Runs `f` against the buffer, rolling back everything it wrote if it fails.
fn staged(buf: &mut Buffer<'_>, f: impl FnOnce(&mut Writer<'_, '_>) -> wio::Result<()>) -> Result<()> {
    let mark = buf.mark();
    let mut writer = Writer { buf };
    match f(&mut writer) {
        Ok(()) => Ok(()),
        Err(e) => {
            writer.buf.rollback(mark);
            Err(Error::Local(e))
        }
    }
}

struct Writer<'b, 'a> {
    buf: &'b mut Buffer<'a>,
}

impl Writer<'_, '_> {
    fn bytes(&mut self, v: &[u8]) -> wio::Result<()> {
        self.buf.write(v)
    }

    fn u8(&mut self, v: u8) -> wio::Result<()> {
        self.bytes(&[v])
    }

    fn u16(&mut self, v: u16) -> wio::Result<()> {
        self.bytes(&v.to_le_bytes())
    }

    fn len16(&mut self, len: usize) -> wio::Result<()> {
        let len = u16::try_from(len).map_err(|_| wio::Error::Invalid)?;
        self.u16(len)
    }

    fn name(&mut self, name: &str) -> wio::Result<()> {
        self.len16(name.len())?;
        self.bytes(name.as_bytes())
    }

    fn signature(&mut self, sig: &Signature) -> wio::Result<()> {
        self.len16(sig.len())?;
        for ty in sig.types() {
            self.u8(*ty as u8)?;
        }
        Ok(())
    }

    fn call(&mut self, name: &str, params: &Signature, args: &[Value]) -> wio::Result<()> {
        self.u8(Kind::Call as u8)?;
        self.name(name)?;
        self.signature(params)?;
        for arg in args {
            self.value(arg)?;
        }
        Ok(())
    }

    fn value(&mut self, v: &Value) -> wio::Result<()> {
        match v {
            Value::I8(x) => self.bytes(&x.to_le_bytes()),
            Value::U8(x) => self.bytes(&x.to_le_bytes()),
            Value::I16(x) => self.bytes(&x.to_le_bytes()),
            Value::U16(x) => self.bytes(&x.to_le_bytes()),
            Value::I32(x) => self.bytes(&x.to_le_bytes()),
            Value::U32(x) => self.bytes(&x.to_le_bytes()),
            Value::I64(x) => self.bytes(&x.to_le_bytes()),
            Value::U64(x) => self.bytes(&x.to_le_bytes()),
            Value::Vary(x) => self.vary(x),
        }
    }

    fn vary(&mut self, v: &Vary) -> wio::Result<()> {
        self.u8(v.tag() as u8)?;
        self.len16(v.len())?;
        match v {
            Vary::I8(x) => self.bytes(&x.to_le_bytes()),
            Vary::U8(x) => self.bytes(&x.to_le_bytes()),
            Vary::I16(x) => self.bytes(&x.to_le_bytes()),
            Vary::U16(x) => self.bytes(&x.to_le_bytes()),
            Vary::I32(x) => self.bytes(&x.to_le_bytes()),
            Vary::U32(x) => self.bytes(&x.to_le_bytes()),
            Vary::I64(x) => self.bytes(&x.to_le_bytes()),
            Vary::U64(x) => self.bytes(&x.to_le_bytes()),
            Vary::Bytes(b) => self.bytes(b),
        }
    }
}

// ============================================================================
//  DECODING
// ============================================================================

/// Decodes the first message of `bytes`.
///
/// Returns `Ok(Some((message, len)))` where `len` is the number of bytes it
/// occupied, or `Ok(None)` if `bytes` is a prefix of a message that has not
/// fully arrived.
pub fn decode_slice(bytes: &[u8]) -> std::result::Result<Option<(Message, usize)>, DecodeError> {
    let mut cur = Cursor::new(bytes);
    let Ok(byte) = cur.read_u8() else {
        return Ok(None);
    };
    let kind = Kind::from_u8(byte).ok_or(DecodeError::UnknownKind(byte))?;

    match read_body(kind, &mut cur) {
        Ok(message) => Ok(Some((message, cur.pos()))),
        Err(Short::Pending(_)) => Ok(None),
        Err(Short::Broken(reason)) => Err(DecodeError::Broken { kind, reason, len: cur.pos() }),
    }
}

/// Decodes the message at the read cursor of `buf`, consuming it on success.
///
/// Incomplete or malformed input is left in place; resynchronizing is up to the caller.
pub fn decode(buf: &mut Buffer<'_>) -> std::result::Result<Option<Message>, DecodeError> {
    let Some((message, len)) = decode_slice(buf.peek())? else {
        return Ok(None);
    };
    // `len` never exceeds the unread bytes it was decoded from.
    if buf.consume(len as u16).is_err() {
        return Ok(None);
    }
    Ok(Some(message))
}

fn read_body(kind: Kind, cur: &mut Cursor<'_>) -> Step<Message> {
    match kind {
        Kind::Error => {
            let b = cur.read_u8()?;
            let code = ErrorCode::from_u8(b).ok_or(Short::Broken("unknown error code"))?;
            Ok(Message::Error(code))
        }
        Kind::FuncQuery => Ok(Message::FuncQuery { name: read_name(cur)? }),
        Kind::FuncResp => {
            let version = cur.read_u8()?;
            let params = read_signature(cur)?;
            let ret = read_type(cur)?;
            Ok(Message::FuncResp { version, params, ret })
        }
        Kind::Call => {
            let name = read_name(cur)?;
            let params = read_signature(cur)?;
            // Every value occupies at least one byte.
            let mut args = Vec::with_capacity(params.len().min(cur.remaining()));
            for ty in params.types() {
                args.push(read_value(cur, *ty)?);
            }
            Ok(Message::Call { name, params, args })
        }
        Kind::CallResult => {
            let ty = read_type(cur)?;
            Ok(Message::CallResult(read_value(cur, ty)?))
        }
    }
}

fn read_type(cur: &mut Cursor<'_>) -> Step<Type> {
    let b = cur.read_u8()?;
    Type::from_u8(b).ok_or(Short::Broken("unknown type tag"))
}

fn read_name(cur: &mut Cursor<'_>) -> Step<String> {
    let len = cur.read_u16()?;
    let bytes = cur.read_bytes(usize::from(len))?;
    let name = std::str::from_utf8(bytes).map_err(|_| Short::Broken("identifier is not UTF-8"))?;
    Ok(name.to_string())
}

fn read_signature(cur: &mut Cursor<'_>) -> Step<Signature> {
    let count = cur.read_u16()?;
    let mut types = Vec::with_capacity(usize::from(count).min(cur.remaining()));
    for _ in 0..count {
        types.push(read_type(cur)?);
    }
    Ok(Signature::from(types))
}

fn read_value(cur: &mut Cursor<'_>, ty: Type) -> Step<Value> {
    Ok(match ty {
        Type::I8 => Value::I8(i8::from_le_bytes(cur.read_array()?)),
        Type::U8 => Value::U8(cur.read_u8()?),
        Type::I16 => Value::I16(i16::from_le_bytes(cur.read_array()?)),
        Type::U16 => Value::U16(cur.read_u16()?),
        Type::I32 => Value::I32(i32::from_le_bytes(cur.read_array()?)),
        Type::U32 => Value::U32(u32::from_le_bytes(cur.read_array()?)),
        Type::I64 => Value::I64(i64::from_le_bytes(cur.read_array()?)),
        Type::U64 => Value::U64(u64::from_le_bytes(cur.read_array()?)),
        Type::Vary => Value::Vary(read_vary(cur)?),
    })
}

fn read_vary(cur: &mut Cursor<'_>) -> Step<Vary> {
    let tag = read_type(cur)?;
    let len = usize::from(cur.read_u16()?);
    if let Some(width) = tag.width() {
        if width != len {
            cur.pass(len);
            return Err(Short::Broken("vary length disagrees with its tag"));
        }
    }
    let mut payload = Cursor::new(cur.read_bytes(len)?);
    Ok(match tag {
        Type::Vary => Vary::Bytes(payload.read_bytes(len)?.to_vec()),
        scalar => match read_value(&mut payload, scalar)? {
            Value::I8(x) => Vary::I8(x),
            Value::U8(x) => Vary::U8(x),
            Value::I16(x) => Vary::I16(x),
            Value::U16(x) => Vary::U16(x),
            Value::I32(x) => Vary::I32(x),
            Value::U32(x) => Vary::U32(x),
            Value::I64(x) => Vary::I64(x),
            Value::U64(x) => Vary::U64(x),
            Value::Vary(v) => v,
        },
    })
}

// ============================================================================
//  SKIPPING
// ============================================================================

/// Walks past the remainder of a message without holding it.
///
/// Used once a message outgrows the receive buffer. Its header fields still
/// fix where it ends, so only those few bytes are ever looked at.
#[derive(Debug, Clone, Default)]
pub(crate) struct Skip {
    /// Pending work, next on top.
    ops: Vec<Op>,
    /// Parameter types whose values still follow.
    types: VecDeque<Type>,
    field: [u8; 3],
    got: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Bytes(usize),
    Name,
    Signature { values: bool },
    Tags(u16),
    Values,
    Tagged,
    Vary,
}

impl Skip {
    /// Skips a whole message of `kind`, starting at its kind byte.
    pub(crate) fn message(kind: Kind) -> Self {
        let ops = match kind {
            Kind::Error => vec![Op::Bytes(2)],
            Kind::FuncQuery => vec![Op::Name, Op::Bytes(1)],
            Kind::FuncResp => vec![Op::Bytes(1), Op::Signature { values: false }, Op::Bytes(2)],
            Kind::Call => vec![Op::Values, Op::Signature { values: true }, Op::Name, Op::Bytes(1)],
            Kind::CallResult => vec![Op::Tagged, Op::Bytes(1)],
        };
        Self { ops, ..Self::default() }
    }

    /// Skips exactly `n` bytes.
    pub(crate) fn bytes(n: usize) -> Self {
        Self { ops: vec![Op::Bytes(n)], ..Self::default() }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consumes bytes of the message and returns how many.
    ///
    /// Less than `input.len()` is consumed only once the message has ended.
    /// An unknown type tag ends the walk early, since nothing after it can be sized.
    pub(crate) fn feed(&mut self, input: &[u8]) -> usize {
        let mut pos = 0;
        while let Some(op) = self.ops.pop() {
            match op {
                Op::Bytes(n) => {
                    let k = n.min(input.len() - pos);
                    pos += k;
                    if k < n {
                        self.ops.push(Op::Bytes(n - k));
                        return pos;
                    }
                }
                Op::Tags(0) => {}
                Op::Values => {
                    if let Some(ty) = self.types.pop_front() {
                        self.ops.push(Op::Values);
                        self.ops.push(Self::value(ty));
                    }
                }
                _ => {
                    let width = match op {
                        Op::Vary => 3,
                        Op::Name | Op::Signature { .. } => 2,
                        _ => 1,
                    };
                    let Some(f) = self.field(width, input, &mut pos) else {
                        self.ops.push(op);
                        return pos;
                    };
                    if !self.step(op, f) {
                        self.ops.clear();
                        self.types.clear();
                        return pos;
                    }
                }
            }
        }
        pos
    }

    /// Applies a completed header field. Returns `false` on an unknown tag.
    fn step(&mut self, op: Op, f: [u8; 3]) -> bool {
        let word = u16::from_le_bytes([f[0], f[1]]);
        match op {
            Op::Name | Op::Signature { values: false } => self.ops.push(Op::Bytes(usize::from(word))),
            Op::Signature { values: true } => self.ops.push(Op::Tags(word)),
            Op::Tags(left) => {
                let Some(ty) = Type::from_u8(f[0]) else { return false };
                self.types.push_back(ty);
                self.ops.push(Op::Tags(left - 1));
            }
            Op::Tagged => {
                let Some(ty) = Type::from_u8(f[0]) else { return false };
                self.ops.push(Self::value(ty));
            }
            Op::Vary => {
                if Type::from_u8(f[0]).is_none() {
                    return false;
                }
                self.ops.push(Op::Bytes(usize::from(u16::from_le_bytes([f[1], f[2]]))));
            }
            Op::Bytes(_) | Op::Values => {}
        }
        true
    }

    fn value(ty: Type) -> Op {
        match ty.width() {
            Some(w) => Op::Bytes(w),
            None => Op::Vary,
        }
    }

    /// Accumulates an `n`-byte header field across deliveries.
    fn field(&mut self, n: usize, input: &[u8], pos: &mut usize) -> Option<[u8; 3]> {
        while self.got < n {
            self.field[self.got] = *input.get(*pos)?;
            self.got += 1;
            *pos += 1;
        }
        self.got = 0;
        Some(self.field)
    }
}
