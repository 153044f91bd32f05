//! Packet framing: a 3-byte little-endian length followed by a 1-byte
//! sequence number, with payloads at or above `0xFFFFFF` bytes split across
//! consecutive packets (a final, possibly-empty, packet whose length is
//! less than `0xFFFFFF` ends the split). Grounded on the teacher's
//! `PacketHeader` (`src/protocol/packet.rs`) for the header layout and on
//! `src/tokio/conn.rs`'s `write_payload`/`read_payload` for the oversize
//! chunking logic, reimplemented here directly against `BufferedStream`
//! instead of a `tokio_util::codec::Decoder`.
//!
//! The sequence number is a single counter shared by both directions of one
//! command/response cycle (client sends seq 0, server's first reply is seq
//! 1, and so on), so `read_packet`/`write_packet` take it as a `&mut u8`
//! rather than each tracking their own — matching how `Connection` holds a
//! single "current expected sequence" field rather than one per direction.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::stream::BufferedStream;

pub const MAX_PACKET_PAYLOAD: usize = 0x00FF_FFFF;

#[derive(Debug, Default)]
pub struct PacketReader {
    max_packet_size: usize,
}

impl PacketReader {
    pub fn new(max_packet_size: usize) -> Self {
        Self { max_packet_size }
    }

    /// Read one logical packet, transparently reassembling payloads split
    /// across the `0xFFFFFF`-byte boundary. Verifies each header's sequence
    /// number matches `*sequence`, incrementing (wrapping) it afterward.
    pub async fn read_packet<S: AsyncRead + AsyncWrite + Unpin>(
        &mut self,
        stream: &mut BufferedStream<S>,
        sequence: &mut u8,
    ) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        loop {
            let header = stream.read_exact(4).await?;
            let length = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            let sequence_id = header[3];

            if sequence_id != *sequence {
                return Err(Error::PacketRead(format!(
                    "sequence mismatch: expected {sequence}, got {sequence_id}"
                )));
            }
            *sequence = sequence.wrapping_add(1);

            if payload.len() + length > self.max_packet_size {
                return Err(Error::PacketRead(format!(
                    "packet exceeds max_packet_size ({} > {})",
                    payload.len() + length,
                    self.max_packet_size
                )));
            }

            let chunk = stream.read_exact(length).await?;
            payload.extend_from_slice(&chunk);

            if length < MAX_PACKET_PAYLOAD {
                return Ok(payload);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct PacketWriter;

impl PacketWriter {
    pub fn new() -> Self {
        Self
    }

    /// Write one logical packet, splitting into `0xFFFFFF`-byte chunks and
    /// following an exact multiple of that size with a zero-length
    /// terminator, matching the server's own reassembly rule.
    pub async fn write_packet<S: AsyncRead + AsyncWrite + Unpin>(
        &mut self,
        stream: &mut BufferedStream<S>,
        payload: &[u8],
        sequence: &mut u8,
    ) -> Result<()> {
        let mut offset = 0;
        loop {
            let remaining = payload.len() - offset;
            let chunk_len = remaining.min(MAX_PACKET_PAYLOAD);
            let mut header = [0u8; 4];
            header[..3].copy_from_slice(&(chunk_len as u32).to_le_bytes()[..3]);
            header[3] = *sequence;
            *sequence = sequence.wrapping_add(1);

            stream.write_all(&header).await?;
            stream.write_all(&payload[offset..offset + chunk_len]).await?;
            offset += chunk_len;

            if chunk_len < MAX_PACKET_PAYLOAD {
                break;
            }
        }
        stream.flush().await
    }
}
