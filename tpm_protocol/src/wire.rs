// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Position-tracking big-endian reader/writer over caller-supplied byte
//! windows, plus the `TPM2B` length-prefixed field encoding.
//!
//! The writer and reader produce byte-identical results to the
//! specification's big-endian field ordering; there is no platform-endian
//! fallback. The two sides treat bounds violations differently: request
//! buffers are sized exactly from declared command sizes, making a writer
//! overflow a codec bug that panics, while response bytes come from the
//! device, making a reader underflow an ordinary decode error.

use thiserror::Error;

/// Errors found while decoding response bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// A read ran past the bytes available in the window.
    #[error("truncated buffer: needed {needed} more bytes, {remaining} remaining")]
    Truncated {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the window.
        remaining: usize,
    },
    /// A list count or discriminator exceeded its defined bound.
    #[error("field value {value} exceeds the defined bound {bound}")]
    OutOfBounds {
        /// The decoded value.
        value: u64,
        /// The largest value the wire grammar allows here.
        bound: u64,
    },
    /// A wire discriminator selected no known variant.
    #[error("selector value {0:#x} does not name a known variant")]
    InvalidSelector(u32),
}

/// Cursor-based big-endian writer over a fixed, exactly-sized byte window.
///
/// All writes advance the cursor. Writing past the end of the window
/// panics: the engine sizes every buffer from a declared serialized size,
/// so an overflow means the size declaration and the write operations
/// disagree, which is a programming error in a command codec rather than
/// a runtime condition.
pub struct TpmWriter<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> TpmWriter<'a> {
    /// Wrap a mutable byte window.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Bytes written so far.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left in the window.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.offset + bytes.len();
        assert!(
            end <= self.buffer.len(),
            "write of {} bytes overruns the {}-byte buffer at offset {}",
            bytes.len(),
            self.buffer.len(),
            self.offset,
        );
        self.buffer[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
    }

    /// Append a `u8`.
    pub fn write_u8(&mut self, val: u8) {
        self.write_bytes(&[val]);
    }

    /// Append a big-endian `u16`.
    pub fn write_u16(&mut self, val: u16) {
        self.write_bytes(&val.to_be_bytes());
    }

    /// Append a big-endian `u32`.
    pub fn write_u32(&mut self, val: u32) {
        self.write_bytes(&val.to_be_bytes());
    }

    /// Append a big-endian `u64`.
    pub fn write_u64(&mut self, val: u64) {
        self.write_bytes(&val.to_be_bytes());
    }

    /// Append a `TPM2B` field: a 16-bit big-endian length followed by
    /// that many bytes.
    pub fn write_2b(&mut self, data: &[u8]) {
        assert!(
            data.len() <= u16::MAX as usize,
            "TPM2B payload of {} bytes overflows the 16-bit length prefix",
            data.len(),
        );
        self.write_u16(data.len() as u16);
        self.write_bytes(data);
    }
}

/// Cursor-based big-endian reader over a read-only byte window.
///
/// All reads advance the cursor and return `WireError::Truncated` instead
/// of running past the window. Byte-range reads borrow from the window
/// rather than copying, so decoded values stay valid exactly as long as
/// the backing response buffer does.
pub struct TpmReader<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> TpmReader<'a> {
    /// Wrap a read-only byte window.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.offset
    }

    /// Bytes left in the window.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        if len > self.remaining() {
            return Err(WireError::Truncated {
                needed: len,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    /// Read a borrowed byte range.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        self.take(len)
    }

    /// Read a `u8`.
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a big-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a big-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        let bytes = self.take(8)?;
        Ok(u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// Read a `TPM2B` field, borrowing the payload from the window.
    pub fn read_2b(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_u16()? as usize;
        self.take(len)
    }
}

/// Serialized size of a `TPM2B` field holding `len` payload bytes.
pub const fn size_2b(len: usize) -> usize {
    size_of::<u16>() + len
}
