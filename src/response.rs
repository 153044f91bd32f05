//! OK / ERR / EOF packet parsing, discriminated by the first payload byte
//! per spec: `0x00` (or `0xFE` with a short enough payload) is OK, `0xFF` is
//! ERR, `0xFE` with length < 9 is EOF, anything else is the start of a
//! result set's column count. Grounded on the teacher's
//! `src/protocol/response.rs`, reworked to parse from a [`Buffer`] instead
//! of a raw slice.

use crate::buffer::Buffer;
use crate::constant::ServerStatusFlags;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: ServerStatusFlags,
    pub warnings: u16,
}

impl OkPacket {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = Buffer::new(payload.len());
        buf.write_bytes(payload)?;
        buf.flip();

        let header = buf.read_u8()?;
        if header != 0x00 && header != 0xFE {
            return Err(Error::PacketRead(format!(
                "expected OK packet header, got {header:#04x}"
            )));
        }

        let affected_rows = buf
            .read_length_coded_binary()?
            .ok_or_else(|| Error::PacketRead("NULL affected_rows in OK packet".into()))?;
        let last_insert_id = buf
            .read_length_coded_binary()?
            .ok_or_else(|| Error::PacketRead("NULL last_insert_id in OK packet".into()))?;
        let status_flags = buf.read_u16_le()?;
        let warnings = buf.read_u16_le()?;

        Ok(Self {
            affected_rows,
            last_insert_id,
            status_flags: ServerStatusFlags::from_bits_truncate(status_flags),
            warnings,
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("ERROR {error_code} ({sql_state}): {message}")]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub message: String,
}

impl ErrPacket {
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = Buffer::new(payload.len());
        buf.write_bytes(payload)?;
        buf.flip();

        let header = buf.read_u8()?;
        if header != 0xFF {
            return Err(Error::PacketRead(format!(
                "expected ERR packet header, got {header:#04x}"
            )));
        }
        let error_code = buf.read_u16_le()?;
        let _marker = buf.read_bytes(1)?; // '#'
        let sql_state = String::from_utf8_lossy(buf.read_bytes(5)?).into_owned();
        let message = String::from_utf8_lossy(buf.read_rest()).into_owned();

        Ok(Self {
            error_code,
            sql_state,
            message,
        })
    }
}

#[derive(Debug, Clone)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: ServerStatusFlags,
}

impl EofPacket {
    /// `payload.len() < 9` distinguishes an EOF packet from a result-set
    /// row that happens to start with `0xFE` (a lenenc-encoded column
    /// value of exactly that length would need 9+ bytes).
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = Buffer::new(payload.len());
        buf.write_bytes(payload)?;
        buf.flip();

        let header = buf.read_u8()?;
        if header != 0xFE {
            return Err(Error::PacketRead(format!(
                "expected EOF packet header, got {header:#04x}"
            )));
        }
        let warnings = buf.read_u16_le()?;
        let status_flags = buf.read_u16_le()?;
        Ok(Self {
            warnings,
            status_flags: ServerStatusFlags::from_bits_truncate(status_flags),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_an_ok_packet() {
        let mut payload = vec![0x00];
        payload.push(2); // affected_rows = 2 (lenenc single byte)
        payload.push(0); // last_insert_id = 0
        payload.extend_from_slice(&2u16.to_le_bytes()); // SERVER_STATUS_AUTOCOMMIT
        payload.extend_from_slice(&0u16.to_le_bytes()); // warnings
        let ok = OkPacket::parse(&payload).unwrap();
        assert_eq!(ok.affected_rows, 2);
        assert_eq!(ok.last_insert_id, 0);
        assert!(ok.status_flags.contains(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT));
    }

    #[test]
    fn parses_an_err_packet() {
        let mut payload = vec![0xFF];
        payload.extend_from_slice(&1045u16.to_le_bytes());
        payload.push(b'#');
        payload.extend_from_slice(b"28000");
        payload.extend_from_slice(b"Access denied");
        let err = ErrPacket::parse(&payload).unwrap();
        assert_eq!(err.error_code, 1045);
        assert_eq!(err.sql_state, "28000");
        assert_eq!(err.message, "Access denied");
    }

    #[test]
    fn parses_an_eof_packet() {
        let mut payload = vec![0xFE];
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.extend_from_slice(&2u16.to_le_bytes());
        let eof = EofPacket::parse(&payload).unwrap();
        assert_eq!(eof.warnings, 0);
        assert!(eof.status_flags.contains(ServerStatusFlags::SERVER_STATUS_AUTOCOMMIT));
    }
}
