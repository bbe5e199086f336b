//! # Function Registry
//!
//! Named handlers with a declared signature and return type.
//!
//! ## Invariants
//! - Names are unique within a registry.
//! - A registry never holds more than its configured number of functions.
//! - A handler is only ever invoked with arguments matching its `params`.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use crate::codec::VERSION;
use crate::error::Error;
use crate::error::ErrorCode;
use crate::error::Result;
use crate::types::Signature;
use crate::types::Type;
use crate::types::Value;

/// A failure raised by a handler. Reported to the caller as `ERROR(EXCEPTION)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault(pub String);

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Fault {}

impl From<&str> for Fault {
    fn from(s: &str) -> Self {
        Fault(s.to_string())
    }
}

impl From<String> for Fault {
    fn from(s: String) -> Self {
        Fault(s)
    }
}

/// Handler body. Receives arguments already checked against the signature.
pub type Handler = Box<dyn FnMut(&[Value]) -> std::result::Result<Value, Fault> + Send>;

/// A registered function descriptor.
pub struct Function {
    name: String,
    params: Signature,
    ret: Type,
    handler: Handler,
}

impl Function {
    pub fn new<F>(name: impl Into<String>, params: impl Into<Signature>, ret: Type, handler: F) -> Self
    where
        F: FnMut(&[Value]) -> std::result::Result<Value, Fault> + Send + 'static,
    {
        Self {
            name: name.into(),
            params: params.into(),
            ret,
            handler: Box::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &Signature {
        &self.params
    }

    pub fn ret(&self) -> Type {
        self.ret
    }

    /// The description a peer receives in answer to `FUNC_QUERY`.
    pub fn info(&self) -> FuncInfo {
        FuncInfo {
            name: self.name.clone(),
            version: VERSION,
            params: self.params.clone(),
            ret: self.ret,
        }
    }

    /// Runs the handler.
    ///
    /// A returned value whose type is not `ret` is reported as a fault,
    /// so a caller never receives a value of an undeclared type. A panic
    /// in the handler is caught and reported as a fault too.
    pub fn invoke(&mut self, args: &[Value]) -> std::result::Result<Value, Fault> {
        let handler = &mut self.handler;
        let value = std::panic::catch_unwind(AssertUnwindSafe(|| handler(args)))
            .map_err(|_| Fault(format!("{} panicked", self.name)))??;
        if value.ty() != self.ret {
            return Err(Fault(format!(
                "{} returned {:?}, declared {:?}",
                self.name,
                value.ty(),
                self.ret
            )));
        }
        Ok(value)
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .finish_non_exhaustive()
    }
}

/// What a peer knows about a function without being able to call it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncInfo {
    pub name: String,
    pub version: u8,
    pub params: Signature,
    pub ret: Type,
}

/// Bounded map from name to descriptor.
#[derive(Debug)]
pub struct Registry {
    funcs: HashMap<String, Function>,
    max: usize,
}

impl Registry {
    pub fn new(max: usize) -> Self {
        Self { funcs: HashMap::new(), max }
    }

    /// # Errors
    /// - `Error::Local(Invalid)` if the name is empty or longer than a 16-bit length.
    /// - `Error::Local(Already)` if the name is taken.
    /// - `Error::Local(NoMemory)` if the registry is full.
    pub fn insert(&mut self, func: Function) -> Result<()> {
        if func.name.is_empty() || func.name.len() > usize::from(u16::MAX) {
            return Err(Error::Local(wio::Error::Invalid));
        }
        if self.funcs.contains_key(&func.name) {
            return Err(Error::Local(wio::Error::Already));
        }
        if self.funcs.len() >= self.max {
            return Err(Error::Local(wio::Error::NoMemory));
        }
        self.funcs.insert(func.name.clone(), func);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Function> {
        self.funcs.get(name).ok_or(Error::Protocol(ErrorCode::Nonexist))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.funcs.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Result<Function> {
        self.funcs.remove(name).ok_or(Error::Protocol(ErrorCode::Nonexist))
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max
    }
}
