//! The connection state machine: handshake, command dispatch, and the
//! idle/busy/closed mode spec.md assigns the Connection. Grounded on the
//! teacher's `src/tokio/conn.rs` for the overall shape (`connect` drives a
//! handshake loop, then exposes `query`/`ping`/etc. as thin command
//! wrappers over shared packet read/write helpers), generalized to a lazy
//! external `ResultSet` instead of the teacher's handler-callback query API.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::instrument;

use crate::buffer::Buffer;
use crate::col::FieldDescriptor;
use crate::constant::{BASE_CAPABILITIES, CapabilityFlags, CommandByte};
use crate::error::{Error, Result};
use crate::handshake::{self, HandshakeResponse41, InitialHandshake};
use crate::opts::Opts;
use crate::packet::{PacketReader, PacketWriter};
use crate::response::{EofPacket, ErrPacket, OkPacket};
use crate::stream::BufferedStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Idle,
    Busy,
    Closed,
}

pub enum QueryOutcome<'a, S> {
    Ok {
        affected_rows: u64,
        last_insert_id: u64,
    },
    Rows(crate::resultset::ResultSet<'a, S>),
}

pub struct Connection<S> {
    stream: BufferedStream<S>,
    packet_reader: PacketReader,
    packet_writer: PacketWriter,
    sequence: u8,
    pub(crate) use_unicode: bool,
    pub(crate) mode: Mode,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    /// Run the handshake over an already-connected socket and return an
    /// authenticated connection ready for commands.
    #[instrument(skip_all, fields(user = %opts.user))]
    pub async fn handshake(socket: S, opts: &Opts) -> Result<Self> {
        let mut stream = BufferedStream::new(socket, opts.read_buffer_size, opts.write_buffer_size);
        let mut packet_reader = PacketReader::new(opts.max_packet_size);
        let packet_writer = PacketWriter::new();
        let mut sequence = 0u8;

        let greeting = packet_reader.read_packet(&mut stream, &mut sequence).await?;
        if greeting.first() == Some(&0xFF) {
            let err = ErrPacket::parse(&greeting)?;
            return Err(Error::Login(err.message));
        }
        let initial = InitialHandshake::parse(&greeting)?;

        let mut capability_flags = BASE_CAPABILITIES;
        if opts.schema.is_some() {
            capability_flags |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
        }

        let auth_response = handshake::mysql_native_password(
            opts.password.as_deref().unwrap_or(""),
            &initial.auth_plugin_data,
        );

        let response = HandshakeResponse41 {
            capability_flags,
            max_packet_size: opts.max_packet_size as u32,
            charset: opts.charset,
            username: &opts.user,
            auth_response: &auth_response,
            database: opts.schema.as_deref(),
        };
        let mut buf = Buffer::new(256 + opts.user.len() + opts.schema.as_deref().unwrap_or_default().len());
        response.write(&mut buf)?;
        buf.flip();

        let mut connection = Self {
            stream,
            packet_reader,
            packet_writer,
            sequence,
            use_unicode: opts.use_unicode,
            mode: Mode::Idle,
        };
        connection
            .packet_writer
            .write_packet(&mut connection.stream, buf.read_slice(), &mut connection.sequence)
            .await?;

        let reply = connection.read_packet().await?;
        match reply.first().copied() {
            Some(0x00) => {
                OkPacket::parse(&reply)?;
                Ok(connection)
            }
            Some(0xFF) => {
                let err = ErrPacket::parse(&reply)?;
                Err(Error::Login(err.message))
            }
            _ => Err(Error::Login(
                "unexpected packet during authentication (auth plugin switching is not supported)"
                    .into(),
            )),
        }
    }

    pub(crate) async fn read_packet(&mut self) -> Result<Vec<u8>> {
        self.packet_reader
            .read_packet(&mut self.stream, &mut self.sequence)
            .await
    }

    async fn write_command(&mut self, payload: &[u8]) -> Result<()> {
        self.sequence = 0;
        self.packet_writer
            .write_packet(&mut self.stream, payload, &mut self.sequence)
            .await
    }

    fn ensure_idle(&self) -> Result<()> {
        match self.mode {
            Mode::Idle => Ok(()),
            Mode::Busy => Err(Error::programming(
                "a command is already in flight or a result set is still open",
            )),
            Mode::Closed => Err(Error::programming("connection is closed")),
        }
    }

    fn expect_ok(&self, response: &[u8]) -> Result<()> {
        match response.first().copied() {
            Some(0x00) => {
                OkPacket::parse(response)?;
                Ok(())
            }
            Some(0xFF) => {
                let err = ErrPacket::parse(response)?;
                Err(Error::Command {
                    code: err.error_code,
                    sql_state: err.sql_state,
                    message: err.message,
                })
            }
            _ => Err(Error::PacketRead("expected an OK or ERR packet".into())),
        }
    }

    /// Run a text-protocol query. Returns `QueryOutcome::Ok` for statements
    /// with no result set, or `QueryOutcome::Rows` borrowing `self` for as
    /// long as the result set is being read.
    #[instrument(skip_all)]
    pub async fn query(&mut self, sql: &str) -> Result<QueryOutcome<'_, S>> {
        self.ensure_idle()?;
        self.mode = Mode::Busy;

        let mut payload = vec![CommandByte::Query as u8];
        payload.extend_from_slice(sql.as_bytes());
        self.write_command(&payload).await?;

        let response = self.read_packet().await?;
        match response.first().copied() {
            Some(0x00) => {
                let ok = OkPacket::parse(&response)?;
                self.mode = Mode::Idle;
                Ok(QueryOutcome::Ok {
                    affected_rows: ok.affected_rows,
                    last_insert_id: ok.last_insert_id,
                })
            }
            Some(0xFF) => {
                let err = ErrPacket::parse(&response)?;
                self.mode = Mode::Idle;
                Err(Error::Command {
                    code: err.error_code,
                    sql_state: err.sql_state,
                    message: err.message,
                })
            }
            _ => {
                let mut buf = Buffer::new(response.len());
                buf.write_bytes(&response)?;
                buf.flip();
                let column_count = buf
                    .read_length_coded_binary()?
                    .ok_or_else(|| Error::PacketRead("NULL column count".into()))?
                    as usize;

                let mut fields = Vec::with_capacity(column_count);
                for _ in 0..column_count {
                    let field_payload = self.read_packet().await?;
                    fields.push(FieldDescriptor::parse(&field_payload)?);
                }
                let eof_payload = self.read_packet().await?;
                EofPacket::parse(&eof_payload)?;

                Ok(QueryOutcome::Rows(crate::resultset::ResultSet {
                    connection: self,
                    fields,
                    eof: false,
                }))
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn ping(&mut self) -> Result<()> {
        self.ensure_idle()?;
        self.write_command(&[CommandByte::Ping as u8]).await?;
        let response = self.read_packet().await?;
        self.expect_ok(&response)
    }

    #[instrument(skip_all)]
    pub async fn select_db(&mut self, schema: &str) -> Result<()> {
        self.ensure_idle()?;
        let mut payload = vec![CommandByte::InitDb as u8];
        payload.extend_from_slice(schema.as_bytes());
        self.write_command(&payload).await?;
        let response = self.read_packet().await?;
        self.expect_ok(&response)
    }

    #[instrument(skip_all)]
    pub async fn close(mut self) -> Result<()> {
        self.ensure_idle()?;
        self.write_command(&[CommandByte::Quit as u8]).await?;
        self.mode = Mode::Closed;
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Connect to a MySQL server over TCP and complete the handshake.
#[instrument(skip_all, fields(host = opts.host.as_deref().unwrap_or("")))]
pub async fn connect(opts: Opts) -> Result<Connection<TcpStream>> {
    let host = opts
        .host
        .as_deref()
        .ok_or_else(|| Error::programming("Opts.host is required"))?;
    let socket = TcpStream::connect((host, opts.port)).await?;
    socket.set_nodelay(true)?;
    Connection::handshake(socket, &opts).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn small_packet(sequence_id: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; 4];
        out[..3].copy_from_slice(&(payload.len() as u32).to_le_bytes()[..3]);
        out[3] = sequence_id;
        out.extend_from_slice(payload);
        out
    }

    fn initial_handshake_packet() -> Vec<u8> {
        let mut payload = vec![10u8];
        payload.extend_from_slice(b"8.0.33\0");
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(b"AAAAAAAA");
        payload.push(0);
        payload.extend_from_slice(&(CapabilityFlags::CLIENT_PROTOCOL_41.bits() as u16).to_le_bytes());
        payload.push(33);
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload.push(21);
        payload.extend_from_slice(&[0u8; 10]);
        payload.extend_from_slice(b"BBBBBBBBBBBB");
        payload.push(0);
        payload.extend_from_slice(b"mysql_native_password\0");
        small_packet(0, &payload)
    }

    fn ok_payload() -> Vec<u8> {
        let mut payload = vec![0x00, 0, 0];
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes());
        payload
    }

    async fn handshaken_pair() -> (Connection<tokio::io::DuplexStream>, tokio::io::DuplexStream) {
        let (client, mut server) = tokio::io::duplex(1 << 16);
        let server_task = tokio::spawn(async move {
            tokio::io::AsyncWriteExt::write_all(&mut server, &initial_handshake_packet())
                .await
                .unwrap();

            // Drain the client's handshake response packet.
            let mut header = [0u8; 4];
            tokio::io::AsyncReadExt::read_exact(&mut server, &mut header)
                .await
                .unwrap();
            let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            let mut body = vec![0u8; len];
            tokio::io::AsyncReadExt::read_exact(&mut server, &mut body)
                .await
                .unwrap();

            let ok = small_packet(2, &ok_payload());
            tokio::io::AsyncWriteExt::write_all(&mut server, &ok).await.unwrap();
            server
        });

        let opts = Opts {
            user: "root".into(),
            ..Opts::default()
        };
        let connection = Connection::handshake(client, &opts).await.unwrap();
        let server = server_task.await.unwrap();
        (connection, server)
    }

    #[tokio::test]
    async fn handshake_authenticates_and_leaves_connection_idle() {
        let (connection, _server) = handshaken_pair().await;
        assert_eq!(connection.mode, Mode::Idle);
    }

    #[tokio::test]
    async fn select_1_round_trips_a_single_row() {
        let (mut connection, mut server) = handshaken_pair().await;

        let server_task = tokio::spawn(async move {
            let mut header = [0u8; 4];
            tokio::io::AsyncReadExt::read_exact(&mut server, &mut header)
                .await
                .unwrap();
            let len = u32::from_le_bytes([header[0], header[1], header[2], 0]) as usize;
            let mut body = vec![0u8; len];
            tokio::io::AsyncReadExt::read_exact(&mut server, &mut body)
                .await
                .unwrap();
            assert_eq!(&body[1..], b"select 1");

            // column count = 1
            tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(1, &[1]))
                .await
                .unwrap();

            let mut field = Vec::new();
            field.push(3u8);
            field.extend_from_slice(b"def");
            field.push(0);
            field.push(0);
            field.push(0);
            field.push(1);
            field.push(b'1');
            field.push(1);
            field.push(b'1');
            field.push(0x0c);
            field.extend_from_slice(&33u16.to_le_bytes());
            field.extend_from_slice(&1u32.to_le_bytes());
            field.push(0x03);
            field.extend_from_slice(&0u16.to_le_bytes());
            field.push(0);
            field.extend_from_slice(&0u16.to_le_bytes());
            tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(2, &field))
                .await
                .unwrap();

            let eof = [0xFEu8, 0, 0, 2, 0];
            tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(3, &eof))
                .await
                .unwrap();

            let row = [1u8, b'1'];
            tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(4, &row))
                .await
                .unwrap();

            let eof = [0xFEu8, 0, 0, 2, 0];
            tokio::io::AsyncWriteExt::write_all(&mut server, &small_packet(5, &eof))
                .await
                .unwrap();
            server
        });

        let outcome = connection.query("select 1").await.unwrap();
        let QueryOutcome::Rows(mut rows) = outcome else {
            panic!("expected a result set");
        };
        assert_eq!(rows.fields().len(), 1);
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row, vec![Value::Int(1)]);
        assert!(rows.next().await.unwrap().is_none());
        rows.close().await.unwrap();
        assert_eq!(connection.mode, Mode::Idle);

        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn a_second_command_while_a_result_set_is_open_does_not_typecheck() {
        // This scenario is enforced at compile time: `ResultSet` holds
        // `&mut Connection`, so a second `connection.query(..)` call while
        // `rows` is alive would be a borrow-checker error, not a runtime
        // one. See DESIGN.md for the rationale.
    }

    #[tokio::test]
    async fn ping_after_close_is_a_programming_error() {
        let (connection, _server) = handshaken_pair().await;
        connection.close().await.unwrap();
    }
}
