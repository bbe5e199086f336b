//! # Wio
//!
//! A fixed-capacity byte buffer with independent read and write cursors.
//!
//! ## Philosophy
//!
//! - **Bounded**: Capacity is fixed at initialization. Sizes and offsets are `u16`,
//!   so no buffer or field ever exceeds 65535 bytes.
//! - **Transactional**: Every operation checks its preconditions before touching state.
//!   A failed operation leaves both cursors and the contents unchanged.
//! - **Two Lifecycles, One Interface**: A buffer either borrows caller storage
//!   (never released by the buffer) or owns a heap allocation (released exactly once on drop).
//!
//! ## Layout
//!
//! ```text
//! 0          read          write          capacity
//! |  consumed  |   unread    |    free       |
//! ```
//!
//! Invariant: `read <= write <= capacity`.

#[cfg(test)]
mod tests;

/// Local buffer errors.
///
/// These never travel on a wire; they are returned synchronously to the caller
/// of the failing operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The buffer is already initialized.
    Already,
    /// Fewer unread bytes are available than requested.
    Empty,
    /// Storage is absent, zero-sized, too large, or the buffer is uninitialized.
    Invalid,
    /// The backing store could not be allocated.
    NoMemory,
    /// The request exceeds the remaining capacity.
    OutOfRange,
}

impl Error {
    /// Returns `true` if the caller may shrink the request or retry later.
    ///
    /// `Already` and `Invalid` are precondition violations and never succeed on retry.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NoMemory | Error::OutOfRange | Error::Empty)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Already => write!(f, "buffer already initialized"),
            Error::Empty => write!(f, "not enough unread bytes"),
            Error::Invalid => write!(f, "invalid buffer storage or uninitialized buffer"),
            Error::NoMemory => write!(f, "backing store allocation failed"),
            Error::OutOfRange => write!(f, "request exceeds remaining capacity"),
        }
    }
}

impl std::error::Error for Error {}

/// Specialized `Result` for buffer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Backing store of a `Buffer`.
#[derive(Debug)]
enum Storage<'a> {
    /// Not yet initialized.
    Unset,
    /// Caller-supplied storage. Never released by the buffer.
    Borrowed(&'a mut [u8]),
    /// Buffer-allocated storage. Released when the buffer drops.
    Owned(Box<[u8]>),
}

impl Storage<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Unset => &[],
            Storage::Borrowed(b) => b,
            Storage::Owned(b) => b,
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Unset => &mut [],
            Storage::Borrowed(b) => b,
            Storage::Owned(b) => b,
        }
    }
}

/// A write position that can be rolled back to.
///
/// Used to stage a message at the tail of the buffer and discard it once it
/// has been handed off, without disturbing bytes written before the mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    write: u16,
}

/// A fixed-capacity byte store with independent read and write cursors.
#[derive(Debug)]
pub struct Buffer<'a> {
    storage: Storage<'a>,
    read: u16,
    write: u16,
}

impl Default for Buffer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Buffer<'a> {
    /// Creates an uninitialized buffer.
    ///
    /// Every data operation fails with `Error::Invalid` until `init` or `alloc_init` succeeds.
    pub const fn new() -> Self {
        Self { storage: Storage::Unset, read: 0, write: 0 }
    }

    /// Creates a buffer over caller-supplied storage.
    pub fn borrowed(storage: &'a mut [u8]) -> Result<Self> {
        let mut buf = Self::new();
        buf.init(storage)?;
        Ok(buf)
    }

    /// Creates a buffer owning a fresh allocation of `capacity` bytes.
    pub fn owned(capacity: u16) -> Result<Self> {
        let mut buf = Self::new();
        buf.alloc_init(capacity)?;
        Ok(buf)
    }

    /// Initializes the buffer in borrowed mode.
    ///
    /// # Errors
    /// - `Error::Already` if the buffer has storage.
    /// - `Error::Invalid` if `storage` is empty or longer than `u16::MAX`.
    pub fn init(&mut self, storage: &'a mut [u8]) -> Result<()> {
        if self.is_init() {
            return Err(Error::Already);
        }
        if storage.is_empty() || storage.len() > usize::from(u16::MAX) {
            return Err(Error::Invalid);
        }
        self.storage = Storage::Borrowed(storage);
        self.read = 0;
        self.write = 0;
        Ok(())
    }

    /// Initializes the buffer in owned mode, allocating `capacity` bytes.
    ///
    /// # Errors
    /// - `Error::Already` if the buffer has storage.
    /// - `Error::Invalid` if `capacity` is zero.
    /// - `Error::NoMemory` if the allocation cannot be satisfied.
    pub fn alloc_init(&mut self, capacity: u16) -> Result<()> {
        if self.is_init() {
            return Err(Error::Already);
        }
        if capacity == 0 {
            return Err(Error::Invalid);
        }
        let mut mem = Vec::new();
        mem.try_reserve_exact(usize::from(capacity)).map_err(|_| Error::NoMemory)?;
        mem.resize(usize::from(capacity), 0);
        self.storage = Storage::Owned(mem.into_boxed_slice());
        self.read = 0;
        self.write = 0;
        Ok(())
    }

    /// Returns `true` once the buffer has storage.
    pub fn is_init(&self) -> bool {
        !matches!(self.storage, Storage::Unset)
    }

    /// Returns `true` if the storage is caller-supplied.
    pub fn is_borrowed(&self) -> bool {
        matches!(self.storage, Storage::Borrowed(_))
    }

    /// Total capacity in bytes. Zero while uninitialized.
    pub fn capacity(&self) -> u16 {
        // Storage length is checked against u16::MAX at init.
        self.storage.bytes().len() as u16
    }

    /// Bytes consumed so far.
    pub fn read_pos(&self) -> u16 {
        self.read
    }

    /// Bytes written so far.
    pub fn write_pos(&self) -> u16 {
        self.write
    }

    /// Bytes written but not yet read.
    pub fn unread(&self) -> u16 {
        self.write - self.read
    }

    /// Bytes that can still be written.
    pub fn available(&self) -> u16 {
        self.capacity() - self.write
    }

    /// A view of the unread bytes. Does not advance the read cursor.
    pub fn peek(&self) -> &[u8] {
        &self.storage.bytes()[usize::from(self.read)..usize::from(self.write)]
    }

    fn check_init(&self) -> Result<()> {
        if self.is_init() { Ok(()) } else { Err(Error::Invalid) }
    }

    /// Appends `data` at the write cursor.
    ///
    /// # Errors
    /// Returns `Error::OutOfRange` if `data` does not fit; nothing is written.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let dst = self.alloc_len(data.len())?;
        dst.copy_from_slice(data);
        Ok(())
    }

    /// Copies `out.len()` bytes from the read cursor into `out`.
    ///
    /// # Errors
    /// Returns `Error::Empty` if fewer bytes are unread; nothing is consumed.
    pub fn read(&mut self, out: &mut [u8]) -> Result<()> {
        self.check_init()?;
        if out.len() > usize::from(self.unread()) {
            return Err(Error::Empty);
        }
        let start = usize::from(self.read);
        out.copy_from_slice(&self.storage.bytes()[start..start + out.len()]);
        self.read += out.len() as u16;
        Ok(())
    }

    /// Advances the read cursor by `size` bytes without copying them out.
    ///
    /// # Errors
    /// Returns `Error::Empty` if fewer bytes are unread.
    pub fn consume(&mut self, size: u16) -> Result<()> {
        self.check_init()?;
        if size > self.unread() {
            return Err(Error::Empty);
        }
        self.read += size;
        Ok(())
    }

    /// Reserves `size` bytes at the write cursor and returns them for in-place filling.
    ///
    /// The write cursor advances as if the bytes had been written.
    ///
    /// # Errors
    /// Returns `Error::OutOfRange` if `size` exceeds the remaining capacity.
    pub fn alloc(&mut self, size: u16) -> Result<&mut [u8]> {
        self.alloc_len(usize::from(size))
    }

    fn alloc_len(&mut self, size: usize) -> Result<&mut [u8]> {
        self.check_init()?;
        if size > usize::from(self.available()) {
            return Err(Error::OutOfRange);
        }
        let start = usize::from(self.write);
        self.write += size as u16;
        Ok(&mut self.storage.bytes_mut()[start..start + size])
    }

    /// Releases up to `size` bytes from the front of the buffer.
    ///
    /// Remaining bytes shift down to offset zero; both cursors move down with them.
    /// Releasing more than was written releases everything written.
    pub fn free(&mut self, size: u16) -> Result<()> {
        self.check_init()?;
        let n = size.min(self.write);
        if n == 0 {
            return Ok(());
        }
        let end = usize::from(self.write);
        self.storage.bytes_mut().copy_within(usize::from(n)..end, 0);
        self.write -= n;
        self.read = self.read.saturating_sub(n);
        Ok(())
    }

    /// Releases the consumed prefix. Returns the number of bytes reclaimed.
    pub fn compact(&mut self) -> u16 {
        let consumed = self.read;
        if consumed > 0 && self.free(consumed).is_err() {
            return 0;
        }
        consumed
    }

    /// Moves up to `size` unread bytes from `from` to the tail of `to`.
    ///
    /// Transfers exactly `min(size, from.unread(), to.available())` bytes and
    /// advances both cursors by that amount. Returns the count.
    pub fn copy(from: &mut Buffer<'_>, to: &mut Buffer<'_>, size: u16) -> Result<u16> {
        from.check_init()?;
        to.check_init()?;
        let n = size.min(from.unread()).min(to.available());
        let start = usize::from(from.read);
        let src = &from.storage.bytes()[start..start + usize::from(n)];
        to.write(src)?;
        from.read += n;
        Ok(n)
    }

    /// Discards all contents. Storage and capacity are kept.
    pub fn reset(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Records the current write position.
    pub fn mark(&self) -> Mark {
        Mark { write: self.write }
    }

    /// The bytes written since `mark`.
    pub fn since(&self, mark: Mark) -> &[u8] {
        let start = usize::from(mark.write.min(self.write));
        &self.storage.bytes()[start..usize::from(self.write)]
    }

    /// Drops everything written after `mark`.
    ///
    /// A mark that lies ahead of the write cursor, or behind the read cursor,
    /// is clamped so the cursor invariant holds.
    pub fn rollback(&mut self, mark: Mark) {
        self.write = mark.write.clamp(self.read, self.write);
    }
}
