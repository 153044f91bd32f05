//! A lazy, single-pass sequence of rows from a text-protocol query.
//!
//! The teacher drives result sets through a caller-supplied
//! `TextResultSetHandler` callback (`src/tokio/conn.rs`'s `query`); spec.md
//! calls for an explicit external iterator instead (`next()`/`close()`), so
//! `ResultSet` borrows the `Connection` mutably for its lifetime — the same
//! one-ResultSet-at-a-time rule the teacher enforces with an internal mode
//! field, here enforced by the borrow checker: the connection can't be used
//! for another command while a `ResultSet` derived from it is still alive.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::buffer::Buffer;
use crate::col::FieldDescriptor;
use crate::connection::{Connection, Mode};
use crate::error::{Error, Result};
use crate::response::EofPacket;
use crate::value::{self, Value};

pub struct ResultSet<'a, S> {
    pub(crate) connection: &'a mut Connection<S>,
    pub(crate) fields: Vec<FieldDescriptor>,
    pub(crate) eof: bool,
}

impl<'a, S: AsyncRead + AsyncWrite + Unpin> ResultSet<'a, S> {
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Read the next row, or `None` at end-of-stream. Reaching end-of-stream
    /// returns the connection to `Mode::Idle`.
    pub async fn next(&mut self) -> Result<Option<Vec<Value>>> {
        if self.eof {
            return Ok(None);
        }

        let payload = self.connection.read_packet().await?;
        if payload.first() == Some(&0xFE) && payload.len() < 9 {
            EofPacket::parse(&payload)?;
            self.eof = true;
            self.connection.mode = Mode::Idle;
            return Ok(None);
        }

        let mut buf = Buffer::new(payload.len());
        buf.write_bytes(&payload)?;
        buf.flip();

        let mut row = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let raw = buf.read_length_coded_string()?;
            row.push(value::decode(field, raw.as_deref(), self.connection.use_unicode)?);
        }
        Ok(Some(row))
    }

    /// Valid only once every row has been read. Closing early is caller
    /// misuse: silently draining an unknown number of rows would desync the
    /// connection's packet sequencing for the next command.
    pub async fn close(self) -> Result<()> {
        if !self.eof {
            return Err(Error::programming(
                "ResultSet::close called before reaching end-of-stream",
            ));
        }
        Ok(())
    }
}

impl<S> Drop for ResultSet<'_, S> {
    fn drop(&mut self) {
        if !self.eof {
            // Leftover row packets are still coming from the server; any
            // further use of the connection would desync sequencing, so
            // poison it instead of pretending it's still idle.
            self.connection.mode = Mode::Closed;
        }
    }
}
