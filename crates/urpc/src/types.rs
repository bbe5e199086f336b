//! # Type System
//!
//! Primitive kinds, signatures, and the self-describing `Vary` value.
//!
//! ## Invariants
//! - `Signature` equality is exact and position-sensitive.
//! - Every `Value` knows its own `Type`, so a signature can always be derived from arguments.

/// Primitive kind of an argument or return value.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    I8 = 0x00,
    U8 = 0x01,
    I16 = 0x02,
    U16 = 0x03,
    I32 = 0x04,
    U32 = 0x05,
    I64 = 0x06,
    U64 = 0x07,
    /// Self-describing `[tag][len][bytes]` value.
    Vary = 0x08,
}

impl Type {
    /// Returns the Type for a given tag byte, or `None` if invalid.
    pub const fn from_u8(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Type::I8),
            0x01 => Some(Type::U8),
            0x02 => Some(Type::I16),
            0x03 => Some(Type::U16),
            0x04 => Some(Type::I32),
            0x05 => Some(Type::U32),
            0x06 => Some(Type::I64),
            0x07 => Some(Type::U64),
            0x08 => Some(Type::Vary),
            _ => None,
        }
    }

    /// Encoded width of a fixed-size kind. `None` for `Vary`.
    pub const fn width(self) -> Option<usize> {
        match self {
            Type::I8 | Type::U8 => Some(1),
            Type::I16 | Type::U16 => Some(2),
            Type::I32 | Type::U32 => Some(4),
            Type::I64 | Type::U64 => Some(8),
            Type::Vary => None,
        }
    }
}

/// Ordered parameter types of a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature(Vec<Type>);

impl Signature {
    pub fn new(types: impl Into<Vec<Type>>) -> Self {
        Self(types.into())
    }

    /// The signature implied by a list of argument values.
    pub fn of(values: &[Value]) -> Self {
        Self(values.iter().map(Value::ty).collect())
    }

    pub fn types(&self) -> &[Type] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if `values` has exactly these types, in this order.
    pub fn matches(&self, values: &[Value]) -> bool {
        self.0.len() == values.len() && self.0.iter().zip(values).all(|(t, v)| *t == v.ty())
    }
}

impl From<Vec<Type>> for Signature {
    fn from(types: Vec<Type>) -> Self {
        Self(types)
    }
}

impl<const N: usize> From<[Type; N]> for Signature {
    fn from(types: [Type; N]) -> Self {
        Self(types.to_vec())
    }
}

impl From<&[Type]> for Signature {
    fn from(types: &[Type]) -> Self {
        Self(types.to_vec())
    }
}

/// A runtime-tagged value whose type is not fixed by the signature.
///
/// Primitive payloads keep their kind; anything else is raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Vary {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Bytes(Vec<u8>),
}

impl Vary {
    /// The wire tag of the payload. Raw bytes are tagged `Type::Vary`.
    pub fn tag(&self) -> Type {
        match self {
            Vary::I8(_) => Type::I8,
            Vary::U8(_) => Type::U8,
            Vary::I16(_) => Type::I16,
            Vary::U16(_) => Type::U16,
            Vary::I32(_) => Type::I32,
            Vary::U32(_) => Type::U32,
            Vary::I64(_) => Type::I64,
            Vary::U64(_) => Type::U64,
            Vary::Bytes(_) => Type::Vary,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Vary::Bytes(b) => b.len(),
            other => other.tag().width().unwrap_or(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrows raw bytes, if this is a byte payload.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Vary::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Borrows a UTF-8 string, if this is a byte payload holding valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }
}

impl From<&str> for Vary {
    fn from(s: &str) -> Self {
        Vary::Bytes(s.as_bytes().to_vec())
    }
}

impl From<String> for Vary {
    fn from(s: String) -> Self {
        Vary::Bytes(s.into_bytes())
    }
}

impl From<Vec<u8>> for Vary {
    fn from(b: Vec<u8>) -> Self {
        Vary::Bytes(b)
    }
}

/// A single argument or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    Vary(Vary),
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::I8(_) => Type::I8,
            Value::U8(_) => Type::U8,
            Value::I16(_) => Type::I16,
            Value::U16(_) => Type::U16,
            Value::I32(_) => Type::I32,
            Value::U32(_) => Type::U32,
            Value::I64(_) => Type::I64,
            Value::U64(_) => Type::U64,
            Value::Vary(_) => Type::Vary,
        }
    }

    pub fn as_vary(&self) -> Option<&Vary> {
        match self {
            Value::Vary(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Vary> for Value {
    fn from(v: Vary) -> Self {
        Value::Vary(v)
    }
}

/// Generates `From<prim>` and `TryFrom<&Value>` for each fixed-width kind.
macro_rules! impl_scalar_conversions {
    ($($ty:ty => $var:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$var(v)
                }
            }

            impl From<$ty> for Vary {
                fn from(v: $ty) -> Self {
                    Vary::$var(v)
                }
            }

            impl TryFrom<&Value> for $ty {
                type Error = Type;

                /// On mismatch, returns the type that was found instead.
                fn try_from(v: &Value) -> std::result::Result<Self, Type> {
                    match v {
                        Value::$var(x) => Ok(*x),
                        other => Err(other.ty()),
                    }
                }
            }
        )*
    };
}

impl_scalar_conversions! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
}
