//! Bounds-checked read cursor over received bytes.
//!
//! Running off the end is not an error: it reports `Pending`, meaning the
//! message may still complete once more bytes arrive.

/// Why a read could not be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Short {
    /// More bytes are needed; the count is how many beyond what is buffered.
    Pending(usize),
    /// The bytes present can never form a valid message.
    Broken(&'static str),
}

pub(crate) type Step<T> = std::result::Result<T, Short>;

/// A cursor tracks position within a borrowed byte slice.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    slice: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(slice: &'a [u8]) -> Self {
        Self { slice, pos: 0 }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Bytes present beyond the cursor.
    pub(crate) fn remaining(&self) -> usize {
        self.slice.len().saturating_sub(self.pos)
    }

    /// Accounts for `n` bytes that belong to the message but will not be read.
    ///
    /// The position may then lie past the end of the slice; only call this
    /// right before reporting `Short::Broken`.
    pub(crate) fn pass(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n);
    }

    #[inline]
    fn need(&self, n: usize) -> Step<()> {
        if self.pos + n > self.slice.len() {
            Err(Short::Pending(self.pos + n - self.slice.len()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn read_bytes(&mut self, len: usize) -> Step<&'a [u8]> {
        self.need(len)?;
        let bytes = &self.slice[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Step<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub(crate) fn read_u8(&mut self) -> Step<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Step<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }
}
