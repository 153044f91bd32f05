//! Fixed-capacity cursor buffer, modeled on `java.nio.ByteBuffer`'s
//! position/limit/capacity invariant: `0 <= position <= limit <= capacity`.
//!
//! A freshly allocated buffer starts in write mode (`position == 0`,
//! `limit == capacity`). `flip()` switches to read mode over exactly the
//! bytes written so far. `clear()` resets to write mode over the whole
//! capacity. `compact()` keeps the unread tail and switches back to write
//! mode so more data can be appended after it — the core operation behind
//! refilling a stream's read buffer without losing a partial packet.

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    position: usize,
    limit: usize,
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            position: 0,
            limit: capacity,
        }
    }

    /// A buffer in read mode with nothing in it yet, matching the state a
    /// freshly constructed stream reader starts in.
    pub fn new_empty_reader(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            position: 0,
            limit: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.limit
    }

    /// Switch from write mode to read mode: limit becomes the write
    /// position, position resets to zero.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// Reset to write mode over the full capacity, discarding any unread
    /// bytes.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.data.len();
    }

    /// Move the unread region (`position..limit`) to the start of the
    /// buffer and switch to write mode with position set just past it, so
    /// a refill can append after the retained bytes without clobbering
    /// them.
    pub fn compact(&mut self) {
        let remaining = self.remaining();
        self.data.copy_within(self.position..self.limit, 0);
        self.position = remaining;
        self.limit = self.data.len();
    }

    /// The writable region, for a reader to fill directly (e.g. a socket
    /// read into `spare_capacity`).
    pub fn write_slice(&mut self) -> &mut [u8] {
        &mut self.data[self.position..self.limit]
    }

    /// Advance the write cursor after bytes were placed via `write_slice`.
    pub fn advance_written(&mut self, n: usize) {
        debug_assert!(self.position + n <= self.limit);
        self.position += n;
    }

    /// The unread region, for a writer to drain directly (e.g. a socket
    /// write of pending bytes).
    pub fn read_slice(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    pub fn advance_read(&mut self, n: usize) {
        debug_assert!(self.position + n <= self.limit);
        self.position += n;
    }

    fn require(&self, n: usize) -> Result<()> {
        if self.remaining() < n {
            Err(Error::BufferUnderflow {
                requested: n,
                available: self.remaining(),
            })
        } else {
            Ok(())
        }
    }

    fn require_write(&self, n: usize) -> Result<()> {
        if self.limit - self.position < n {
            Err(Error::BufferOverflow {
                requested: n,
                available: self.limit - self.position,
            })
        } else {
            Ok(())
        }
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.require(n)?;
        let start = self.position;
        self.position += n;
        Ok(&self.data[start..start + n])
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.require_write(bytes.len())?;
        let start = self.position;
        self.data[start..start + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len();
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn read_u24_le(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(3)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }

    pub fn write_u24_le(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes()[..3])
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(arr))
    }

    pub fn write_u64_le(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn read_null_terminated(&mut self) -> Result<Vec<u8>> {
        let rest = &self.data[self.position..self.limit];
        match rest.iter().position(|&b| b == 0) {
            Some(i) => {
                let out = rest[..i].to_vec();
                self.position += i + 1;
                Ok(out)
            }
            None => Err(Error::BufferUnderflow {
                requested: rest.len() + 1,
                available: rest.len(),
            }),
        }
    }

    pub fn write_null_terminated(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_bytes(bytes)?;
        self.write_u8(0)
    }

    /// Bytes up to and including the next `\n` in the unread region.
    /// Transactional: underflow (no `\n` buffered yet) leaves `position`
    /// unchanged so the caller can refill and retry.
    pub fn read_line(&mut self) -> Result<Vec<u8>> {
        let rest = &self.data[self.position..self.limit];
        match rest.iter().position(|&b| b == b'\n') {
            Some(i) => {
                let out = rest[..=i].to_vec();
                self.position += i + 1;
                Ok(out)
            }
            None => Err(Error::BufferUnderflow {
                requested: rest.len() + 1,
                available: rest.len(),
            }),
        }
    }

    /// Everything left unread, without advancing the cursor.
    pub fn peek_rest(&self) -> &[u8] {
        &self.data[self.position..self.limit]
    }

    /// Consume and return everything left unread.
    pub fn read_rest(&mut self) -> &[u8] {
        let start = self.position;
        self.position = self.limit;
        &self.data[start..self.limit]
    }

    /// Length-coded binary integer: single byte < 0xFB, `0xFB` is NULL,
    /// `0xFC`/`0xFD`/`0xFE` prefix a 2/3/8-byte little-endian payload,
    /// `0xFF` is a protocol error. Transactional: on any failure the
    /// buffer's position is restored to where it was on entry.
    pub fn read_length_coded_binary(&mut self) -> Result<Option<u64>> {
        let start = self.position;
        let result = (|| -> Result<Option<u64>> {
            match self.read_u8()? {
                0xFB => Ok(None),
                0xFF => Err(Error::BufferInvalidArgument(
                    "0xFF length-coded-binary prefix is a protocol error marker".into(),
                )),
                0xFC => Ok(Some(u64::from(self.read_u16_le()?))),
                0xFD => Ok(Some(u64::from(self.read_u24_le()?))),
                0xFE => Ok(Some(self.read_u64_le()?)),
                small => Ok(Some(u64::from(small))),
            }
        })();
        if result.is_err() {
            self.position = start;
        }
        result
    }

    pub fn write_length_coded_binary(&mut self, value: u64) -> Result<()> {
        if value < 251 {
            self.write_u8(value as u8)
        } else if value < (1 << 16) {
            self.write_u8(0xFC)?;
            self.write_u16_le(value as u16)
        } else if value < (1 << 24) {
            self.write_u8(0xFD)?;
            self.write_u24_le(value as u32)
        } else {
            self.write_u8(0xFE)?;
            self.write_u64_le(value)
        }
    }

    /// Length-coded string: a length-coded-binary length prefix followed by
    /// that many raw bytes. `None` on a NULL length prefix.
    pub fn read_length_coded_string(&mut self) -> Result<Option<Vec<u8>>> {
        let start = self.position;
        let result = (|| -> Result<Option<Vec<u8>>> {
            match self.read_length_coded_binary()? {
                None => Ok(None),
                Some(len) => Ok(Some(self.read_bytes(len as usize)?.to_vec())),
            }
        })();
        if result.is_err() {
            self.position = start;
        }
        result
    }

    pub fn write_length_coded_string(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_length_coded_binary(bytes.len() as u64)?;
        self.write_bytes(bytes)
    }
}
