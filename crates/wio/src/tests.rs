use crate::*;

// ============================================================================
//  INITIALIZATION
// ============================================================================

#[test]
fn test_borrowed_init() -> Result<()> {
    let mut store = [0u8; 16];
    let buf = Buffer::borrowed(&mut store)?;

    assert!(buf.is_init());
    assert!(buf.is_borrowed());
    assert_eq!(buf.capacity(), 16);
    assert_eq!(buf.read_pos(), 0);
    assert_eq!(buf.write_pos(), 0);
    Ok(())
}

#[test]
fn test_borrowed_init_rejects_empty_storage() {
    let mut store: [u8; 0] = [];
    assert_eq!(Buffer::borrowed(&mut store).unwrap_err(), Error::Invalid);
}

#[test]
fn test_borrowed_init_rejects_oversized_storage() {
    let mut store = vec![0u8; usize::from(u16::MAX) + 1];
    assert_eq!(Buffer::borrowed(&mut store).unwrap_err(), Error::Invalid);
}

#[test]
fn test_reinit_fails_already() -> Result<()> {
    let mut a = [0u8; 4];
    let mut b = [0u8; 4];
    let mut buf = Buffer::new();
    buf.init(&mut a)?;

    assert_eq!(buf.init(&mut b), Err(Error::Already));
    assert_eq!(buf.alloc_init(4), Err(Error::Already));
    Ok(())
}

#[test]
fn test_owned_init() -> Result<()> {
    let buf = Buffer::owned(32)?;
    assert!(buf.is_init());
    assert!(!buf.is_borrowed());
    assert_eq!(buf.capacity(), 32);
    assert_eq!(Buffer::owned(0).unwrap_err(), Error::Invalid);

    let mut owned = Buffer::owned(8)?;
    assert_eq!(owned.alloc_init(8), Err(Error::Already));
    Ok(())
}

#[test]
fn test_uninitialized_buffer_is_invalid() {
    let mut buf = Buffer::new();
    let mut out = [0u8; 1];

    assert_eq!(buf.capacity(), 0);
    assert_eq!(buf.write(b"x"), Err(Error::Invalid));
    assert_eq!(buf.read(&mut out), Err(Error::Invalid));
    assert_eq!(buf.alloc(1).unwrap_err(), Error::Invalid);
    assert_eq!(buf.free(1), Err(Error::Invalid));
}

// ============================================================================
//  READ / WRITE
// ============================================================================

#[test]
fn test_write_then_read_roundtrip() -> Result<()> {
    let mut buf = Buffer::owned(16)?;
    buf.write(b"hello")?;
    buf.write(b" wio")?;

    let mut out = [0u8; 9];
    buf.read(&mut out)?;
    assert_eq!(&out, b"hello wio");
    assert_eq!(buf.unread(), 0);
    assert_eq!(buf.read_pos(), 9);
    Ok(())
}

#[test]
fn test_over_read_fails_empty_without_consuming() -> Result<()> {
    let mut buf = Buffer::owned(8)?;
    buf.write(b"abc")?;

    let mut out = [0u8; 4];
    assert_eq!(buf.read(&mut out), Err(Error::Empty));
    assert_eq!(buf.read_pos(), 0);
    assert_eq!(buf.peek(), b"abc");
    Ok(())
}

#[test]
fn test_borrowed_over_write_leaves_state_unchanged() -> Result<()> {
    let mut store = [0u8; 8];
    let mut buf = Buffer::borrowed(&mut store)?;
    buf.write(b"ab")?;

    assert_eq!(buf.write(&[7u8; 10]), Err(Error::OutOfRange));
    assert_eq!(buf.write_pos(), 2);
    assert_eq!(buf.read_pos(), 0);

    // A zero-sized read always succeeds.
    buf.read(&mut [])?;
    assert_eq!(buf.read_pos(), 0);
    assert_eq!(buf.peek(), b"ab");
    Ok(())
}

#[test]
fn test_write_exactly_to_capacity() -> Result<()> {
    let mut buf = Buffer::owned(4)?;
    buf.write(b"full")?;
    assert_eq!(buf.available(), 0);
    assert_eq!(buf.write(b"!"), Err(Error::OutOfRange));
    Ok(())
}

#[test]
fn test_consume_skips_bytes() -> Result<()> {
    let mut buf = Buffer::owned(8)?;
    buf.write(b"skipme")?;
    buf.consume(4)?;
    assert_eq!(buf.peek(), b"me");
    assert_eq!(buf.consume(3), Err(Error::Empty));
    Ok(())
}

// ============================================================================
//  ALLOC / FREE
// ============================================================================

#[test]
fn test_alloc_fills_in_place() -> Result<()> {
    let mut buf = Buffer::owned(8)?;
    buf.write(&[1])?;
    {
        let region = buf.alloc(3)?;
        region.copy_from_slice(&[2, 3, 4]);
    }
    assert_eq!(buf.write_pos(), 4);
    assert_eq!(buf.peek(), &[1, 2, 3, 4]);
    assert_eq!(buf.alloc(5).unwrap_err(), Error::OutOfRange);
    assert_eq!(buf.write_pos(), 4);
    Ok(())
}

#[test]
fn test_free_shifts_remaining_bytes() -> Result<()> {
    let mut buf = Buffer::owned(8)?;
    buf.write(b"abcdef")?;
    buf.consume(3)?;

    buf.free(2)?;
    assert_eq!(buf.read_pos(), 1);
    assert_eq!(buf.write_pos(), 4);
    assert_eq!(buf.peek(), b"def");
    Ok(())
}

#[test]
fn test_alloc_init_free_then_read_is_empty() -> Result<()> {
    let mut buf = Buffer::new();
    buf.alloc_init(4)?;
    buf.free(4)?;

    let mut out = [0u8; 1];
    assert_eq!(buf.read(&mut out), Err(Error::Empty));
    Ok(())
}

#[test]
fn test_compact_reclaims_consumed_prefix() -> Result<()> {
    let mut buf = Buffer::owned(6)?;
    buf.write(b"xyz123")?;
    buf.consume(3)?;

    assert_eq!(buf.compact(), 3);
    assert_eq!(buf.read_pos(), 0);
    assert_eq!(buf.available(), 3);
    assert_eq!(buf.peek(), b"123");
    assert_eq!(buf.compact(), 0);
    Ok(())
}

// ============================================================================
//  COPY
// ============================================================================

#[test]
fn test_copy_bounded_by_source() -> Result<()> {
    let mut a = Buffer::owned(8)?;
    let mut b = Buffer::owned(8)?;
    a.write(b"abc")?;

    let n = Buffer::copy(&mut a, &mut b, 10)?;
    assert_eq!(n, 3);
    assert_eq!(a.read_pos(), 3);
    assert_eq!(b.write_pos(), 3);
    assert_eq!(b.peek(), b"abc");
    Ok(())
}

#[test]
fn test_copy_bounded_by_destination() -> Result<()> {
    let mut a = Buffer::owned(8)?;
    let mut store = [0u8; 4];
    let mut b = Buffer::borrowed(&mut store)?;
    a.write(b"abcdef")?;
    b.write(b"z")?;

    let n = Buffer::copy(&mut a, &mut b, 6)?;
    assert_eq!(n, 3);
    assert_eq!(a.peek(), b"def");
    assert_eq!(b.peek(), b"zabc");
    Ok(())
}

#[test]
fn test_copy_bounded_by_size() -> Result<()> {
    let mut a = Buffer::owned(8)?;
    let mut b = Buffer::owned(8)?;
    a.write(b"abcdef")?;

    assert_eq!(Buffer::copy(&mut a, &mut b, 2)?, 2);
    assert_eq!(a.read_pos(), 2);
    assert_eq!(b.write_pos(), 2);
    Ok(())
}

// ============================================================================
//  MARK / ROLLBACK / LIFECYCLE
// ============================================================================

#[test]
fn test_mark_and_rollback_preserve_prefix() -> Result<()> {
    let mut buf = Buffer::owned(16)?;
    buf.write(b"in")?;

    let mark = buf.mark();
    buf.write(b"staged")?;
    assert_eq!(buf.since(mark), b"staged");

    buf.rollback(mark);
    assert_eq!(buf.peek(), b"in");
    assert_eq!(buf.since(mark), b"");
    Ok(())
}

#[test]
fn test_reset_keeps_capacity() -> Result<()> {
    let mut buf = Buffer::owned(8)?;
    buf.write(b"data")?;
    buf.consume(1)?;
    buf.reset();

    assert_eq!(buf.read_pos(), 0);
    assert_eq!(buf.write_pos(), 0);
    assert_eq!(buf.capacity(), 8);
    Ok(())
}

#[test]
fn test_borrowed_storage_outlives_buffer() -> Result<()> {
    let mut store = [0u8; 4];
    {
        let mut buf = Buffer::borrowed(&mut store)?;
        buf.write(b"keep")?;
    }
    // The buffer is gone; its storage is still ours and still holds the bytes.
    assert_eq!(&store, b"keep");
    Ok(())
}

#[test]
fn test_error_recoverability() {
    assert!(Error::NoMemory.is_recoverable());
    assert!(Error::OutOfRange.is_recoverable());
    assert!(!Error::Already.is_recoverable());
    assert!(!Error::Invalid.is_recoverable());
}
