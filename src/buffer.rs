//! Growable byte buffer handed out by the slab store
//!
//! A [`Buffer`] owns a `Vec<u8>` plus a read cursor. Writes append at the end,
//! reads consume from the cursor. Once the buffer has been given back to a
//! [`SlabStore`](crate::slab::SlabStore) through
//! [`recycle`](crate::slab::SlabStore::recycle) the handle becomes a tombstone:
//! [`len`](Buffer::len) reports [`Buffer::RELEASED`], [`capacity`](Buffer::capacity)
//! reports [`MIN_SIZE`], and every read or write panics.

use crate::error::Result;
use crate::slab::size_class::MIN_SIZE;
use bytes::buf::UninitSlice;
use bytes::{Buf, BufMut};
use std::fmt;
use std::io;

const USE_AFTER_RELEASE: &str = "bufpool: use of Buffer after it was returned to the pool";

/// Variable-length byte buffer with a read cursor
pub struct Buffer {
    /// Backing storage, `None` once released
    buf: Option<Vec<u8>>,
    /// Read offset into `buf`
    off: usize,
}

impl Buffer {
    /// Length reported by a released buffer
    pub const RELEASED: usize = usize::MAX;

    /// Create a buffer over existing storage.
    ///
    /// The contents of `initial` become the unread data.
    pub fn new(initial: Vec<u8>) -> Self {
        Self {
            buf: Some(initial),
            off: 0,
        }
    }

    /// Create an empty buffer able to hold `capacity` bytes without growing
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(Vec::with_capacity(capacity))
    }

    /// Number of unread bytes, or [`Buffer::RELEASED`] after release
    pub fn len(&self) -> usize {
        match &self.buf {
            Some(buf) => buf.len() - self.off,
            None => Self::RELEASED,
        }
    }

    /// True when there is nothing left to read
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity of the backing storage, or [`MIN_SIZE`] after release
    pub fn capacity(&self) -> usize {
        match &self.buf {
            Some(buf) => buf.capacity(),
            None => MIN_SIZE,
        }
    }

    /// True once the buffer has been handed back to its store
    pub fn is_released(&self) -> bool {
        self.buf.is_none()
    }

    /// Unread bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage()[self.off..]
    }

    /// Unread bytes, mutably
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        let off = self.off;
        &mut self.storage_mut()[off..]
    }

    /// Unread bytes as UTF-8 text
    pub fn as_str(&self) -> Result<&str> {
        Ok(std::str::from_utf8(self.as_bytes())?)
    }

    /// Append a single byte
    pub fn write_byte(&mut self, byte: u8) {
        self.storage_mut().push(byte);
    }

    /// Append a byte slice
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.storage_mut().extend_from_slice(data);
    }

    /// Consume one byte from the read cursor
    pub fn read_byte(&mut self) -> Option<u8> {
        let off = self.off;
        let byte = self.storage().get(off).copied()?;
        self.advance_read(1);
        Some(byte)
    }

    /// Resize the unread region to `new_len` bytes, filling with `value`
    pub fn resize(&mut self, new_len: usize, value: u8) {
        let off = self.off;
        self.storage_mut().resize(off + new_len, value);
    }

    /// Make sure `additional` more bytes can be written without reallocating
    pub fn reserve(&mut self, additional: usize) {
        self.storage_mut().reserve(additional);
    }

    /// Empty the buffer, keeping its storage
    pub fn reset(&mut self) {
        self.storage_mut().clear();
        self.off = 0;
    }

    /// Replace the backing storage.
    ///
    /// The contents of `backing` become the unread data. This is the only
    /// operation allowed on a released buffer: it gives the handle fresh,
    /// unshared storage.
    pub fn reset_with(&mut self, backing: Vec<u8>) {
        self.buf = Some(backing);
        self.off = 0;
    }

    /// Detach the storage, unread bytes only
    pub fn into_vec(mut self) -> Vec<u8> {
        let off = self.off;
        let mut buf = self.buf.take().expect(USE_AFTER_RELEASE);
        buf.drain(..off);
        buf
    }

    /// Take the storage out, leaving a released tombstone behind
    pub(crate) fn take_storage(&mut self) -> Option<Vec<u8>> {
        self.off = 0;
        self.buf.take()
    }

    fn advance_read(&mut self, cnt: usize) {
        let len = self.storage().len();
        assert!(self.off + cnt <= len, "advance past end of buffer");
        self.off += cnt;
        if self.off == len {
            self.reset();
        }
    }

    fn storage(&self) -> &Vec<u8> {
        self.buf.as_ref().expect(USE_AFTER_RELEASE)
    }

    fn storage_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect(USE_AFTER_RELEASE)
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_released() {
            return f.write_str("Buffer(released)");
        }
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl io::Write for Buffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.write_bytes(data);
        Ok(data.len())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_bytes(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Read for Buffer {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let unread = self.as_bytes();
        let n = unread.len().min(out.len());
        out[..n].copy_from_slice(&unread[..n]);
        if n > 0 {
            self.advance_read(n);
        }
        Ok(n)
    }
}

impl fmt::Write for Buffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

impl Buf for Buffer {
    fn remaining(&self) -> usize {
        self.as_bytes().len()
    }

    fn chunk(&self) -> &[u8] {
        self.as_bytes()
    }

    fn advance(&mut self, cnt: usize) {
        self.advance_read(cnt);
    }
}

// SAFETY: every method delegates to the `Vec<u8>` implementation.
unsafe impl BufMut for Buffer {
    fn remaining_mut(&self) -> usize {
        self.storage().remaining_mut()
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        self.storage_mut().advance_mut(cnt);
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        self.storage_mut().chunk_mut()
    }
}
