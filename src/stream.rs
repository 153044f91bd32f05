//! `BufferedStream`: a reader/writer pair of [`Buffer`]s backing an async
//! socket. Grounded on the teacher's async `Stream` wrapper
//! (`src/tokio/stream.rs`) for the socket side, and on
//! `original_source/lib/geventmysql/buffered.py`'s `BufferedReader`/
//! `BufferedWriter` for the refill/flush cycle: refill is
//! compact-then-recv-then-flip, flush is flip-then-sendall-then-clear. A
//! zero-byte read is treated as the peer closing the connection.
//!
//! Generic over the socket type so tests can drive it with
//! `tokio::io::duplex` instead of a real TCP connection; `Connection` uses
//! it with `tokio::net::TcpStream`.

use std::mem::ManuallyDrop;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::pool::{BorrowedReader, BorrowedWriter, GLOBAL_BUFFER_POOL};

pub struct BufferedStream<S> {
    socket: S,
    reader: Option<Buffer>,
    writer: Option<Buffer>,
    read_buffer_size: usize,
    write_buffer_size: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> BufferedStream<S> {
    pub fn new(socket: S, read_buffer_size: usize, write_buffer_size: usize) -> Self {
        Self {
            socket,
            reader: None,
            writer: None,
            read_buffer_size,
            write_buffer_size,
        }
    }

    /// Borrow the read buffer for the duration of one buffer operation.
    /// Lazily pulls one from the pool if the stream doesn't hold one yet.
    /// A buffer pulled from the pool carries no guarantee about the mode it
    /// was released in (the pool is keyed by capacity alone, shared by
    /// readers and writers), so it's forced back into empty read mode here
    /// rather than trusted as-is.
    pub fn borrow_reader(&mut self) -> BorrowedReader<'_> {
        let read_buffer_size = self.read_buffer_size;
        let buffer = match self.reader.take() {
            Some(buffer) => buffer,
            None => {
                let mut buffer = GLOBAL_BUFFER_POOL.acquire(read_buffer_size);
                buffer.clear();
                buffer.flip();
                buffer
            }
        };
        BorrowedReader {
            slot: &mut self.reader,
            buffer: ManuallyDrop::new(buffer),
        }
    }

    /// Borrow the write buffer for the duration of one buffer operation.
    /// Same re-acquire caveat as `borrow_reader`, mirrored into write mode.
    pub fn borrow_writer(&mut self) -> BorrowedWriter<'_> {
        let write_buffer_size = self.write_buffer_size;
        let buffer = match self.writer.take() {
            Some(buffer) => buffer,
            None => {
                let mut buffer = GLOBAL_BUFFER_POOL.acquire(write_buffer_size);
                buffer.clear();
                buffer
            }
        };
        BorrowedWriter {
            slot: &mut self.writer,
            buffer: ManuallyDrop::new(buffer),
        }
    }

    /// Refill the read buffer from the socket: compact (keep any unread
    /// tail), read whatever is available, flip back to read mode. A
    /// zero-byte read means the peer closed the connection.
    pub async fn refill(&mut self) -> Result<()> {
        let read_buffer_size = self.read_buffer_size;
        let mut buffer = match self.reader.take() {
            Some(buffer) => buffer,
            None => {
                let mut buffer = GLOBAL_BUFFER_POOL.acquire(read_buffer_size);
                buffer.clear();
                buffer.flip();
                buffer
            }
        };
        buffer.compact();
        if buffer.write_slice().is_empty() {
            // Fully compacted buffer has no room left for new bytes: a
            // single packet's payload exceeded the buffer capacity. The
            // packet layer sizes its own reads so this never happens for
            // framing metadata; callers drain oversize payload bytes
            // themselves before requesting more.
            self.reader = Some(buffer);
            return Err(Error::BufferOverflow {
                requested: 1,
                available: 0,
            });
        }
        let n = self.socket.read(buffer.write_slice()).await?;
        if n == 0 {
            self.reader = Some(buffer);
            return Err(Error::Eof);
        }
        buffer.advance_written(n);
        buffer.flip();
        self.reader = Some(buffer);
        Ok(())
    }

    /// Flush the write buffer to the socket: flip to read mode, send
    /// everything, clear back to write mode.
    pub async fn flush(&mut self) -> Result<()> {
        let write_buffer_size = self.write_buffer_size;
        let mut buffer = match self.writer.take() {
            Some(buffer) => buffer,
            None => {
                let mut buffer = GLOBAL_BUFFER_POOL.acquire(write_buffer_size);
                buffer.clear();
                buffer
            }
        };
        buffer.flip();
        self.socket.write_all(buffer.read_slice()).await?;
        self.socket.flush().await?;
        buffer.clear();
        self.writer = Some(buffer);
        Ok(())
    }

    /// Read exactly `n` bytes, refilling as many times as needed.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        loop {
            {
                let mut reader = self.borrow_reader();
                if reader.remaining() >= n {
                    return Ok(reader.read_bytes(n)?.to_vec());
                }
            }
            self.refill().await?;
        }
    }

    /// Queue bytes into the write buffer, flushing whenever it fills up.
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < bytes.len() {
            let written = {
                let mut writer = self.borrow_writer();
                let room = writer.capacity() - writer.position();
                let chunk_len = room.min(bytes.len() - offset);
                if chunk_len == 0 {
                    0
                } else {
                    writer.write_bytes(&bytes[offset..offset + chunk_len])?;
                    chunk_len
                }
            };
            if written == 0 {
                self.flush().await?;
            } else {
                offset += written;
            }
        }
        Ok(())
    }

    /// Shut down the underlying socket. Called once a connection is done
    /// writing (e.g. after `COM_QUIT`) to close the write half cleanly
    /// rather than dropping the socket silently.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.socket.shutdown().await?;
        Ok(())
    }
}
