//! Field (column) descriptor parsing: the lenenc catalog/schema/table/
//! org_table/name/org_name strings followed by a fixed 12-byte tail.
//! Grounded on the teacher's `ColumnDefinitionTail`/`ColumnDefinition`
//! (`src/col.rs`), adapted from its zero-copy-over-a-slice design to parse
//! directly out of a [`Buffer`] since this crate owns each row/field packet
//! as a standalone buffer rather than borrowing from a shared `BytesMut`.

use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::buffer::Buffer;
use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};

/// Fixed-size tail of a column definition packet (12 bytes), following the
/// length-encoded `0x0c` fixed-fields-length indicator.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct ColumnDefinitionTail {
    charset: U16LE,
    column_length: U32LE,
    column_type: u8,
    flags: U16LE,
    decimals: u8,
    reserved: U16LE,
}

impl ColumnDefinitionTail {
    pub fn charset(&self) -> u16 {
        self.charset.get()
    }

    pub fn column_length(&self) -> u32 {
        self.column_length.get()
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn flags(&self) -> Result<ColumnFlags> {
        ColumnFlags::from_bits(self.flags.get())
            .ok_or_else(|| Error::PacketRead(format!("unknown column flags {:#06x}", self.flags.get())))
    }

    pub fn column_type(&self) -> Result<ColumnType> {
        ColumnType::from_u8(self.column_type)
            .ok_or_else(|| Error::PacketRead(format!("unknown column type {:#04x}", self.column_type)))
    }
}

/// A fully parsed field descriptor for one column of a result set.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub column_length: u32,
    pub column_type: ColumnType,
    pub flags: ColumnFlags,
    pub decimals: u8,
}

fn lenenc_string(buf: &mut Buffer) -> Result<String> {
    let bytes = buf
        .read_length_coded_string()?
        .ok_or_else(|| Error::PacketRead("NULL not allowed in field descriptor string".into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl FieldDescriptor {
    /// Parse one column definition packet's payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut buf = Buffer::new(payload.len());
        buf.write_bytes(payload)?;
        buf.flip();

        let catalog = lenenc_string(&mut buf)?;
        let schema = lenenc_string(&mut buf)?;
        let table = lenenc_string(&mut buf)?;
        let org_table = lenenc_string(&mut buf)?;
        let name = lenenc_string(&mut buf)?;
        let org_name = lenenc_string(&mut buf)?;

        // length-encoded length-of-fixed-fields, always 0x0c
        let _fixed_len = buf.read_length_coded_binary()?;

        let tail_bytes = buf.read_bytes(12)?;
        let tail = ColumnDefinitionTail::ref_from_bytes(tail_bytes)
            .map_err(|_| Error::PacketRead("malformed column definition tail".into()))?;

        Ok(Self {
            catalog,
            schema,
            table,
            org_table,
            name,
            org_name,
            charset: tail.charset(),
            column_length: tail.column_length(),
            column_type: tail.column_type()?,
            flags: tail.flags()?,
            decimals: tail.decimals(),
        })
    }
}
