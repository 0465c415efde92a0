//! A small pool of Redis connections.
//!
//! At most `size` connections are checked out at once; further callers wait
//! for a permit. A checked-out connection returns to the idle list only when
//! [`PooledConnection::release`] is called after a complete reply. A guard
//! dropped mid-command (timeout, cancelled request) closes its connection, so
//! an unread reply can never reach the next caller.

use parking_lot::Mutex;
use planvault_core::StoreError;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::connection::RedisConnection;
use crate::resp::RespValue;

/// Where and how pooled connections connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ConnectOptions {
    pub addr: String,
    pub password: Option<String>,
    pub db: u32,
}

#[derive(Debug)]
pub(crate) struct ConnectionPool {
    options: ConnectOptions,
    idle: Mutex<Vec<RedisConnection>>,
    permits: Semaphore,
}

impl ConnectionPool {
    pub fn new(options: ConnectOptions, size: usize) -> Self {
        let size = size.max(1);
        Self {
            options,
            idle: Mutex::new(Vec::with_capacity(size)),
            permits: Semaphore::new(size),
        }
    }

    pub fn addr(&self) -> &str {
        &self.options.addr
    }

    /// Takes an idle connection, or opens one, once a slot is free.
    pub async fn checkout(&self) -> Result<PooledConnection<'_>, StoreError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Connection("connection pool closed".to_string()))?;

        let idle = self.idle.lock().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => {
                RedisConnection::connect(
                    &self.options.addr,
                    self.options.password.as_deref(),
                    self.options.db,
                )
                .await?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self,
            _permit: permit,
        })
    }

    /// Connections waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

/// A checked-out connection. Dropping it without [`release`](Self::release)
/// closes the connection.
#[derive(Debug)]
pub(crate) struct PooledConnection<'a> {
    conn: Option<RedisConnection>,
    pool: &'a ConnectionPool,
    _permit: SemaphorePermit<'a>,
}

impl PooledConnection<'_> {
    pub async fn execute(&mut self, args: &[&[u8]]) -> Result<RespValue, StoreError> {
        match self.conn.as_mut() {
            Some(conn) => conn.execute(args).await,
            None => Err(StoreError::Connection("connection already released".to_string())),
        }
    }

    /// Hands the connection back for reuse.
    pub fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle.lock().push(conn);
        }
    }
}
