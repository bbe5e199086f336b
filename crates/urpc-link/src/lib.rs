//! # uRPC Link
//!
//! Drives a `urpc::Channel` over any async byte stream: a serial port, a TCP socket,
//! or an in-memory `tokio::io::duplex` pipe.
//!
//! ## Architecture
//!
//! One task owns the channel (the actor). It multiplexes three event sources:
//!
//! 1. **Inbound bytes** from the reader, fed to `Channel::recv` as they arrive.
//! 2. **Commands** from `Link` handles, started one at a time.
//! 3. **The deadline** of the request in flight, which abandons it via `Channel::time_out`.
//!
//! After every event, anything the channel sent is flushed to the writer and a resolved
//! request is handed back to its waiting caller.
//!
//! ## Invariants
//! - At most one request is in flight. Later commands wait in the queue.
//! - Inbound requests are served regardless of whether a local request is pending.

use std::collections::VecDeque;
use std::collections::vec_deque::Drain;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;
use tracing::warn;
use urpc::Channel;
use urpc::ErrorCode;
use urpc::FuncInfo;
use urpc::Outcome;
use urpc::Transport;
use urpc::Value;

// ============================================================================
//  ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The channel refused to start the request.
    Local(urpc::Error),
    /// The peer answered with an `ERROR`.
    Remote(ErrorCode),
    /// No answer within `LinkConfig::timeout`.
    Timeout,
    /// The link task has stopped.
    Closed,
    /// The byte stream failed.
    Io(String),
    /// The answer does not fit the request (e.g. a description for a call).
    Unexpected(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(e) => write!(f, "{}", e),
            Self::Remote(code) => write!(f, "Remote error: {}", code),
            Self::Timeout => write!(f, "Request timed out"),
            Self::Closed => write!(f, "Link closed"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::Unexpected(msg) => write!(f, "Unexpected answer: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<urpc::Error> for Error {
    fn from(e: urpc::Error) -> Self {
        Self::Local(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
//  CONFIG
// ============================================================================

/// Tuning for a `Link`.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// How long a request may wait for its answer.
    pub timeout: Duration,
    /// Size of a single read from the stream.
    pub chunk: usize,
    /// Commands that may queue behind the request in flight.
    pub queue: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            chunk: 64,
            queue: 8,
        }
    }
}

impl LinkConfig {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk.max(1);
        self
    }

    pub fn queue(mut self, queue: usize) -> Self {
        self.queue = queue.max(1);
        self
    }
}

// ============================================================================
//  OUTBOX
// ============================================================================

/// A `Transport` that queues messages for the link task to write out.
///
/// `send` never blocks: the bytes are copied into the queue and written
/// asynchronously once the channel returns control.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Vec<u8>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&mut self) -> Drain<'_, Vec<u8>> {
        self.queue.drain(..)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Transport for Outbox {
    fn send(&mut self, bytes: &[u8]) -> urpc::transport::Result<()> {
        self.queue.push_back(bytes.to_vec());
        Ok(())
    }
}

// ============================================================================
//  LINK
// ============================================================================

enum Request {
    Call { name: String, args: Vec<Value> },
    Query { name: String },
}

struct Command {
    request: Request,
    reply: oneshot::Sender<Result<Outcome>>,
}

/// Handle to a running link task.
///
/// Dropping every handle (or calling `shutdown`) stops the task.
#[derive(Debug)]
pub struct Link {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl Link {
    /// Spawns the task that owns `channel` and services the stream.
    pub fn spawn<R, W>(channel: Channel<'static, Outbox>, reader: R, writer: W, config: LinkConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue.max(1));
        let task = tokio::spawn(run(channel, reader, writer, rx, config));
        Self { commands: tx, task }
    }

    /// Calls `name` on the peer and waits for its return value.
    pub async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        let request = Request::Call { name: name.to_string(), args };
        match self.submit(request).await? {
            Outcome::Value(v) => Ok(v),
            other => Err(unexpected(other)),
        }
    }

    /// Asks the peer to describe `name`.
    pub async fn query(&self, name: &str) -> Result<FuncInfo> {
        let request = Request::Query { name: name.to_string() };
        match self.submit(request).await? {
            Outcome::Func(info) => Ok(info),
            other => Err(unexpected(other)),
        }
    }

    async fn submit(&self, request: Request) -> Result<Outcome> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command { request, reply })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Stops the task and waits for it to exit.
    pub async fn shutdown(self) {
        let Self { commands, task } = self;
        drop(commands);
        if let Err(e) = task.await {
            warn!(error = %e, "link task failed");
        }
    }
}

fn unexpected(outcome: Outcome) -> Error {
    match outcome {
        Outcome::Failed(code) => Error::Remote(code),
        Outcome::TimedOut => Error::Timeout,
        other => Error::Unexpected(format!("{:?}", other)),
    }
}

type Waiter = (oneshot::Sender<Result<Outcome>>, Instant);

async fn run<R, W>(
    mut channel: Channel<'static, Outbox>,
    mut reader: R,
    mut writer: W,
    mut commands: mpsc::Receiver<Command>,
    config: LinkConfig,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; config.chunk.max(1)];
    let mut waiter: Option<Waiter> = None;

    let failure = loop {
        let deadline = waiter.as_ref().map(|(_, at)| *at);

        tokio::select! {
            read = reader.read(&mut chunk) => match read {
                Ok(0) => break Error::Closed,
                Ok(n) => {
                    trace!(len = n, "read");
                    channel.recv(&chunk[..n]);
                }
                Err(e) => break Error::Io(e.to_string()),
            },

            command = commands.recv(), if waiter.is_none() => match command {
                Some(Command { request, reply }) => {
                    let started = match &request {
                        Request::Call { name, args } => channel.call(name, args),
                        Request::Query { name } => channel.query(name),
                    };
                    match started {
                        Ok(()) => waiter = Some((reply, Instant::now() + config.timeout)),
                        Err(e) => {
                            let _ = reply.send(Err(Error::Local(e)));
                        }
                    }
                }
                None => break Error::Closed,
            },

            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                channel.time_out();
            }
        }

        if let Err(e) = flush(&mut channel, &mut writer).await {
            break Error::Io(e.to_string());
        }

        if waiter.is_some() {
            if let Some(outcome) = channel.take_outcome() {
                if let Some((reply, _)) = waiter.take() {
                    let _ = reply.send(Ok(outcome));
                }
            }
        }
    };

    debug!(reason = %failure, "link stopped");
    if let Some((reply, _)) = waiter {
        let _ = reply.send(Err(failure));
    }
}

async fn flush<W: AsyncWrite + Unpin>(channel: &mut Channel<'static, Outbox>, writer: &mut W) -> std::io::Result<()> {
    let pending: Vec<Vec<u8>> = channel.transport_mut().drain().collect();
    if pending.is_empty() {
        return Ok(());
    }
    for msg in &pending {
        writer.write_all(msg).await?;
    }
    writer.flush().await
}
