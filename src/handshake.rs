//! Initial handshake (`HandshakeV10`) parsing, `HandshakeResponse41` writing,
//! and `mysql_native_password` authentication. Grounded on the teacher's
//! `src/protocol/connection/handshake.rs`, trimmed to the single auth plugin
//! this crate supports and reworked to parse from a [`Buffer`].

use sha1::{Digest, Sha1};

use crate::buffer::Buffer;
use crate::constant::CapabilityFlags;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data: Vec<u8>,
    pub capability_flags: CapabilityFlags,
    pub charset: u8,
    pub status_flags: u16,
    pub auth_plugin_name: String,
}

impl InitialHandshake {
    /// Parse `Protocol::HandshakeV10`. The caller is responsible for
    /// recognizing an `0xFF` first byte as an ERR packet before calling this.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = Buffer::new(payload.len());
        buf.write_bytes(payload)?;
        buf.flip();

        let protocol_version = buf.read_u8()?;
        if protocol_version != 10 {
            return Err(Error::PacketRead(format!(
                "unsupported handshake protocol version {protocol_version}"
            )));
        }

        let server_version = String::from_utf8_lossy(&buf.read_null_terminated()?).into_owned();
        let connection_id = buf.read_u32_le()?;
        let auth_data_1 = buf.read_bytes(8)?.to_vec();
        let _filler = buf.read_u8()?;
        let cap_lower = buf.read_u16_le()?;
        let charset = buf.read_u8()?;
        let status_flags = buf.read_u16_le()?;
        let cap_upper = buf.read_u16_le()?;
        let auth_data_len = buf.read_u8()?;
        let _reserved = buf.read_bytes(10)?;

        let cap_bits = (u32::from(cap_upper) << 16) | u32::from(cap_lower);
        let capability_flags = CapabilityFlags::from_bits_truncate(cap_bits);

        let auth_data_2_len = (auth_data_len as usize).saturating_sub(9).max(12);
        let mut auth_plugin_data = auth_data_1;
        auth_plugin_data.extend_from_slice(buf.read_bytes(auth_data_2_len)?);
        let _trailing_nul = buf.read_u8()?;

        let auth_plugin_name = String::from_utf8_lossy(&buf.read_null_terminated()?).into_owned();

        Ok(Self {
            protocol_version,
            server_version,
            connection_id,
            auth_plugin_data,
            capability_flags,
            charset,
            status_flags,
            auth_plugin_name,
        })
    }
}

pub struct HandshakeResponse41<'a> {
    pub capability_flags: CapabilityFlags,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
}

impl HandshakeResponse41<'_> {
    pub fn write(&self, out: &mut Buffer) -> Result<()> {
        out.write_u32_le(self.capability_flags.bits())?;
        out.write_u32_le(self.max_packet_size)?;
        out.write_u8(self.charset)?;
        out.write_bytes(&[0u8; 23])?;
        out.write_null_terminated(self.username.as_bytes())?;
        out.write_u8(self.auth_response.len() as u8)?;
        out.write_bytes(self.auth_response)?;
        if let Some(db) = self.database {
            out.write_null_terminated(db.as_bytes())?;
        }
        Ok(())
    }
}

/// `SHA1(password) XOR SHA1(challenge || SHA1(SHA1(password)))`. An empty
/// password authenticates with an empty response, per protocol.
pub fn mysql_native_password(password: &str, challenge: &[u8]) -> [u8; 20] {
    if password.is_empty() {
        return [0u8; 20];
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(challenge);
    hasher.update(stage2);
    let token = hasher.finalize();

    let mut result = [0u8; 20];
    for i in 0..20 {
        result[i] = stage1[i] ^ token[i];
    }
    result
}
