//! A single RESP2 connection.

use bytes::BytesMut;
use planvault_core::StoreError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::resp::{encode_command, parse, ParseResult, RespValue};

const READ_CHUNK: usize = 8 * 1024;

/// A connection to a Redis server.
///
/// Commands are sent one at a time and each waits for its reply.
#[derive(Debug)]
pub struct RedisConnection {
    stream: TcpStream,
    buffer: BytesMut,
}

impl RedisConnection {
    /// Connects to `addr`, authenticates if `password` is set and selects `db`.
    pub async fn connect(addr: &str, password: Option<&str>, db: u32) -> Result<Self, StoreError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| StoreError::Connection(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;

        let mut conn = Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK),
        };

        if let Some(password) = password {
            conn.expect_ok(&[b"AUTH".as_slice(), password.as_bytes()]).await?;
        }
        if db != 0 {
            let db = db.to_string();
            conn.expect_ok(&[b"SELECT".as_slice(), db.as_bytes()]).await?;
        }

        tracing::debug!(addr, db, "redis connection established");
        Ok(conn)
    }

    /// Sends a command and reads its reply.
    ///
    /// Server error replies are returned as [`StoreError::Protocol`] and leave
    /// the connection usable. A reply that cannot be parsed is a
    /// [`StoreError::Connection`] error, after which the connection must be
    /// discarded.
    pub async fn execute(&mut self, args: &[&[u8]]) -> Result<RespValue, StoreError> {
        self.stream.write_all(&encode_command(args)).await?;
        match self.read_reply().await? {
            RespValue::Error(message) => Err(StoreError::Protocol(message)),
            reply => Ok(reply),
        }
    }

    async fn expect_ok(&mut self, args: &[&[u8]]) -> Result<(), StoreError> {
        match self.execute(args).await? {
            RespValue::SimpleString(s) if s == "OK" => Ok(()),
            other => Err(StoreError::Protocol(format!("unexpected reply: {other:?}"))),
        }
    }

    async fn read_reply(&mut self) -> Result<RespValue, StoreError> {
        loop {
            match parse(&self.buffer) {
                ParseResult::Complete(value, consumed) => {
                    let _ = self.buffer.split_to(consumed);
                    return Ok(value);
                }
                ParseResult::Error(message) => {
                    return Err(StoreError::Connection(format!("malformed reply: {message}")))
                }
                ParseResult::Incomplete => {}
            }

            self.buffer.reserve(READ_CHUNK);
            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                return Err(StoreError::Connection(
                    "connection closed by server".to_string(),
                ));
            }
        }
    }
}
