//! Redis plan store.

use std::time::Duration;

use async_trait::async_trait;
use planvault_core::{CasOutcome, ETag, PlanKey, PlanStore, StoreError, StoredPlan};
use serde_json::Value;

use crate::pool::{ConnectOptions, ConnectionPool};
use crate::resp::RespValue;

const BODY_FIELD: &str = "body";
const ETAG_FIELD: &str = "etag";

/// `KEYS[1]` key, `ARGV` body, etag. Returns 1 when written, 0 when present.
const INSERT_SCRIPT: &str = "\
if redis.call('EXISTS', KEYS[1]) == 1 then return 0 end
redis.call('HSET', KEYS[1], 'body', ARGV[1], 'etag', ARGV[2])
return 1";

/// `KEYS[1]` key, `ARGV` expected etag, body, etag.
/// Returns `{1}` applied, `{0}` missing, `{2, current}` stale.
const REPLACE_SCRIPT: &str = "\
local current = redis.call('HGET', KEYS[1], 'etag')
if not current then return {0} end
if current ~= ARGV[1] then return {2, current} end
redis.call('HSET', KEYS[1], 'body', ARGV[2], 'etag', ARGV[3])
return {1}";

/// `KEYS[1]` key, `ARGV` expected etag. Same replies as the replace script.
const DELETE_SCRIPT: &str = "\
local current = redis.call('HGET', KEYS[1], 'etag')
if not current then return {0} end
if current ~= ARGV[1] then return {2, current} end
redis.call('DEL', KEYS[1])
return {1}";

/// Connection settings for [`RedisPlanStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// `host:port` of the server.
    pub addr: String,
    /// Logical database index.
    pub db: u32,
    /// Password for `AUTH`, if the server requires one.
    pub password: Option<String>,
    /// Upper bound on waiting for a connection, connecting and one command
    /// round trip.
    pub timeout: Duration,
    /// Most connections open at once.
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:6379".to_string(),
            db: 0,
            password: None,
            timeout: Duration::from_secs(5),
            pool_size: 8,
        }
    }
}

/// A [`PlanStore`] backed by Redis hashes.
///
/// Commands run on a pool of up to `pool_size` connections, opened lazily.
/// A connection whose command fails, times out or is cancelled is closed
/// rather than reused.
#[derive(Debug)]
pub struct RedisPlanStore {
    timeout: Duration,
    pool: ConnectionPool,
}

impl RedisPlanStore {
    /// Creates a store; no connection is made until the first command.
    #[must_use]
    pub fn new(config: RedisConfig) -> Self {
        let options = ConnectOptions {
            addr: config.addr,
            password: config.password,
            db: config.db,
        };
        Self {
            timeout: config.timeout,
            pool: ConnectionPool::new(options, config.pool_size),
        }
    }

    /// Opens the connection now, failing fast on a bad address or password.
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let store = Self::new(config);
        store.ping().await?;
        Ok(store)
    }

    /// Round-trips a `PING`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        match self.execute(&[b"PING".as_slice()]).await? {
            RespValue::SimpleString(s) if s == "PONG" => Ok(()),
            other => Err(StoreError::Protocol(format!("unexpected PING reply: {other:?}"))),
        }
    }

    async fn execute(&self, args: &[&[u8]]) -> Result<RespValue, StoreError> {
        let timeout = self.timeout;
        let result = tokio::time::timeout(timeout, async {
            let mut conn = self.pool.checkout().await?;
            let reply = conn.execute(args).await;
            // Server error replies leave the stream in sync; anything else may not.
            if matches!(reply, Ok(_) | Err(StoreError::Protocol(_))) {
                conn.release();
            }
            reply
        })
        .await
        .unwrap_or(Err(StoreError::Timeout(timeout)));

        if let Err(err) = &result {
            if !matches!(err, StoreError::Protocol(_)) {
                tracing::warn!(error = %err, addr = %self.pool.addr(), "redis command failed, connection discarded");
            }
        }
        result
    }

    async fn eval(&self, script: &str, key: &PlanKey, argv: &[&[u8]]) -> Result<RespValue, StoreError> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(4 + argv.len());
        args.extend_from_slice(&[
            b"EVAL".as_slice(),
            script.as_bytes(),
            b"1".as_slice(),
            key.as_str().as_bytes(),
        ]);
        args.extend_from_slice(argv);
        self.execute(&args).await
    }
}

fn encode_body(key: &PlanKey, plan: &StoredPlan) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(&plan.body).map_err(|e| StoreError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn cas_outcome(reply: RespValue) -> Result<CasOutcome, StoreError> {
    let RespValue::Array(items) = reply else {
        return Err(StoreError::Protocol(format!("unexpected script reply: {reply:?}")));
    };
    match items.as_slice() {
        [RespValue::Integer(1)] => Ok(CasOutcome::Applied),
        [RespValue::Integer(0)] => Ok(CasOutcome::Missing),
        [RespValue::Integer(2), current] => current
            .as_str()
            .map(|etag| CasOutcome::Stale(ETag::from_stored(etag)))
            .ok_or_else(|| StoreError::Protocol("stale reply without etag".to_string())),
        other => Err(StoreError::Protocol(format!("unexpected script reply: {other:?}"))),
    }
}

#[async_trait]
impl PlanStore for RedisPlanStore {
    async fn get(&self, key: &PlanKey) -> Result<Option<StoredPlan>, StoreError> {
        let reply = self
            .execute(&[
                b"HMGET".as_slice(),
                key.as_str().as_bytes(),
                BODY_FIELD.as_bytes(),
                ETAG_FIELD.as_bytes(),
            ])
            .await?;

        let corrupt = |reason: String| StoreError::Corrupt {
            key: key.to_string(),
            reason,
        };

        match reply {
            RespValue::Array(fields) => match fields.as_slice() {
                [RespValue::Null, _] => Ok(None),
                [RespValue::BulkString(body), etag] => {
                    let body: Value =
                        serde_json::from_slice(body).map_err(|e| corrupt(e.to_string()))?;
                    let etag = etag
                        .as_str()
                        .ok_or_else(|| corrupt("missing etag field".to_string()))?;
                    Ok(Some(StoredPlan {
                        body,
                        etag: ETag::from_stored(etag),
                    }))
                }
                other => Err(StoreError::Protocol(format!("unexpected HMGET reply: {other:?}"))),
            },
            other => Err(StoreError::Protocol(format!("unexpected HMGET reply: {other:?}"))),
        }
    }

    async fn insert_if_absent(&self, key: &PlanKey, plan: StoredPlan) -> Result<bool, StoreError> {
        let body = encode_body(key, &plan)?;
        let reply = self
            .eval(INSERT_SCRIPT, key, &[body.as_slice(), plan.etag.as_str().as_bytes()])
            .await?;
        match reply.as_integer() {
            Some(1) => Ok(true),
            Some(0) => Ok(false),
            _ => Err(StoreError::Protocol(format!("unexpected insert reply: {reply:?}"))),
        }
    }

    async fn replace_if_match(
        &self,
        key: &PlanKey,
        expected: &ETag,
        plan: StoredPlan,
    ) -> Result<CasOutcome, StoreError> {
        let body = encode_body(key, &plan)?;
        let reply = self
            .eval(
                REPLACE_SCRIPT,
                key,
                &[expected.as_str().as_bytes(), body.as_slice(), plan.etag.as_str().as_bytes()],
            )
            .await?;
        cas_outcome(reply)
    }

    async fn delete_if_match(&self, key: &PlanKey, expected: &ETag) -> Result<CasOutcome, StoreError> {
        let reply = self
            .eval(DELETE_SCRIPT, key, &[expected.as_str().as_bytes()])
            .await?;
        cas_outcome(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resp::{parse, ParseResult};
    use bytes::{BufMut, BytesMut};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    type Records = Arc<std::sync::Mutex<HashMap<String, (Vec<u8>, String)>>>;

    fn reply(value: &RespValue, out: &mut BytesMut) {
        match value {
            RespValue::SimpleString(s) => out.put_slice(format!("+{s}\r\n").as_bytes()),
            RespValue::Error(s) => out.put_slice(format!("-{s}\r\n").as_bytes()),
            RespValue::Integer(n) => out.put_slice(format!(":{n}\r\n").as_bytes()),
            RespValue::BulkString(b) => {
                out.put_slice(format!("${}\r\n", b.len()).as_bytes());
                out.put_slice(b);
                out.put_slice(b"\r\n");
            }
            RespValue::Array(items) => {
                out.put_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    reply(item, out);
                }
            }
            RespValue::Null => out.put_slice(b"$-1\r\n"),
        }
    }

    fn bulk(data: &[u8]) -> RespValue {
        RespValue::BulkString(bytes::Bytes::copy_from_slice(data))
    }

    fn cas(records: &Records, key: &str, expected: &str, write: Option<(Vec<u8>, String)>) -> RespValue {
        let mut map = records.lock().unwrap();
        let Some((_, current)) = map.get(key).cloned() else {
            return RespValue::Array(vec![RespValue::Integer(0)]);
        };
        if current != expected {
            return RespValue::Array(vec![RespValue::Integer(2), bulk(current.as_bytes())]);
        }
        match write {
            Some(record) => map.insert(key.to_string(), record),
            None => map.remove(key),
        };
        RespValue::Array(vec![RespValue::Integer(1)])
    }

    /// Interprets the commands the store sends, against an in-memory map.
    fn dispatch(records: &Records, password: Option<&str>, args: &[String], authed: &mut bool) -> RespValue {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
        if arg(0) == "AUTH" {
            *authed = Some(arg(1)) == password;
            return if *authed {
                RespValue::SimpleString("OK".into())
            } else {
                RespValue::Error("WRONGPASS invalid password".into())
            };
        }
        if password.is_some() && !*authed {
            return RespValue::Error("NOAUTH Authentication required.".into());
        }

        match arg(0) {
            "PING" => RespValue::SimpleString("PONG".into()),
            "SELECT" => RespValue::SimpleString("OK".into()),
            "HMGET" => match records.lock().unwrap().get(arg(1)) {
                Some((body, etag)) => RespValue::Array(vec![bulk(body), bulk(etag.as_bytes())]),
                None => RespValue::Array(vec![RespValue::Null, RespValue::Null]),
            },
            "EVAL" if arg(1) == INSERT_SCRIPT => {
                let mut map = records.lock().unwrap();
                if map.contains_key(arg(3)) {
                    RespValue::Integer(0)
                } else {
                    map.insert(arg(3).to_string(), (arg(4).as_bytes().to_vec(), arg(5).to_string()));
                    RespValue::Integer(1)
                }
            }
            "EVAL" if arg(1) == REPLACE_SCRIPT => cas(
                records,
                arg(3),
                arg(4),
                Some((arg(5).as_bytes().to_vec(), arg(6).to_string())),
            ),
            "EVAL" if arg(1) == DELETE_SCRIPT => cas(records, arg(3), arg(4), None),
            other => RespValue::Error(format!("ERR unknown command '{other}'")),
        }
    }

    async fn serve(mut socket: TcpStream, records: Records, password: Option<String>, hmget_delay: Duration) {
        let mut buffer = BytesMut::new();
        let mut authed = false;
        loop {
            match parse(&buffer) {
                ParseResult::Complete(RespValue::Array(items), consumed) => {
                    let _ = buffer.split_to(consumed);
                    let args: Vec<String> = items
                        .iter()
                        .map(|i| i.as_str().unwrap_or_default().to_string())
                        .collect();
                    if args.first().map(String::as_str) == Some("HMGET") {
                        tokio::time::sleep(hmget_delay).await;
                    }
                    let answer = dispatch(&records, password.as_deref(), &args, &mut authed);
                    let mut out = BytesMut::new();
                    reply(&answer, &mut out);
                    if socket.write_all(&out).await.is_err() {
                        return;
                    }
                }
                ParseResult::Incomplete => match socket.read_buf(&mut buffer).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                },
                _ => return,
            }
        }
    }

    async fn fake_redis(password: Option<&str>) -> (String, Records) {
        fake_redis_with_delay(password, Duration::ZERO).await
    }

    /// A fake server whose `HMGET` replies arrive after `hmget_delay`.
    async fn fake_redis_with_delay(password: Option<&str>, hmget_delay: Duration) -> (String, Records) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let records: Records = Arc::default();
        let shared = records.clone();
        let password = password.map(ToString::to_string);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, shared.clone(), password.clone(), hmget_delay));
            }
        });
        (addr, records)
    }

    fn config(addr: String) -> RedisConfig {
        RedisConfig {
            addr,
            timeout: Duration::from_secs(2),
            ..RedisConfig::default()
        }
    }

    #[tokio::test]
    async fn test_lifecycle_over_the_wire() {
        let (addr, records) = fake_redis(None).await;
        let store = RedisPlanStore::connect(config(addr)).await.unwrap();
        let key = PlanKey::new("plan", "p1");
        let first = StoredPlan::new(&key, json!({"objectId": "p1", "planType": "a"}));
        let second = StoredPlan::new(&key, json!({"objectId": "p1", "planType": "b"}));

        assert!(store.get(&key).await.unwrap().is_none());
        assert!(store.insert_if_absent(&key, first.clone()).await.unwrap());
        assert!(!store.insert_if_absent(&key, second.clone()).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(first.clone()));

        let outcome = store.replace_if_match(&key, &first.etag, second.clone()).await.unwrap();
        assert_eq!(outcome, CasOutcome::Applied);
        let outcome = store.replace_if_match(&key, &first.etag, first.clone()).await.unwrap();
        assert_eq!(outcome, CasOutcome::Stale(second.etag.clone()));

        assert_eq!(store.delete_if_match(&key, &first.etag).await.unwrap(), CasOutcome::Stale(second.etag.clone()));
        assert_eq!(store.delete_if_match(&key, &second.etag).await.unwrap(), CasOutcome::Applied);
        assert_eq!(store.delete_if_match(&key, &second.etag).await.unwrap(), CasOutcome::Missing);
        assert!(records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_authentication() {
        let (addr, _) = fake_redis(Some("s3cret")).await;

        let wrong = RedisConfig {
            password: Some("nope".into()),
            ..config(addr.clone())
        };
        let err = RedisPlanStore::connect(wrong).await.unwrap_err();
        assert!(matches!(err, StoreError::Protocol(ref m) if m.starts_with("WRONGPASS")));

        let right = RedisConfig {
            password: Some("s3cret".into()),
            db: 2,
            ..config(addr)
        };
        assert!(RedisPlanStore::connect(right).await.is_ok());
    }

    #[tokio::test]
    async fn test_corrupt_body() {
        let (addr, records) = fake_redis(None).await;
        records
            .lock()
            .unwrap()
            .insert("plan_p1".into(), (b"not json".to_vec(), "abc".into()));
        let store = RedisPlanStore::new(config(addr));
        let err = store.get(&PlanKey::new("plan", "p1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let store = RedisPlanStore::new(config(addr));
        let err = store.get(&PlanKey::new("plan", "p1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn test_timeout_drops_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        // Accept and never answer.
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let store = RedisPlanStore::new(RedisConfig {
            timeout: Duration::from_millis(50),
            ..config(addr)
        });
        let err = store.ping().await.unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert_eq!(store.pool.idle_count(), 0);
    }

    fn seed(records: &Records, object_id: &str) {
        records.lock().unwrap().insert(
            format!("plan_{object_id}"),
            (
                serde_json::to_vec(&json!({"objectId": object_id})).unwrap(),
                format!("e-{object_id}"),
            ),
        );
    }

    #[tokio::test]
    async fn test_cancelled_read_does_not_leak_its_reply() {
        let (addr, records) = fake_redis_with_delay(None, Duration::from_millis(100)).await;
        seed(&records, "aa");
        seed(&records, "bb");
        let store = RedisPlanStore::new(RedisConfig {
            pool_size: 1,
            ..config(addr)
        });

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), store.get(&PlanKey::new("plan", "aa"))).await;
        assert!(cancelled.is_err());

        let plan = store.get(&PlanKey::new("plan", "bb")).await.unwrap().unwrap();
        assert_eq!(plan.body, json!({"objectId": "bb"}));
        assert_eq!(plan.etag.as_str(), "e-bb");
    }

    #[tokio::test]
    async fn test_slow_commands_run_concurrently() {
        let delay = Duration::from_millis(200);
        let (addr, records) = fake_redis_with_delay(None, delay).await;
        seed(&records, "aa");
        seed(&records, "bb");
        let store = RedisPlanStore::new(config(addr));

        let started = std::time::Instant::now();
        let aa = PlanKey::new("plan", "aa");
        let bb = PlanKey::new("plan", "bb");
        let (a, b) = tokio::join!(store.get(&aa), store.get(&bb));
        let elapsed = started.elapsed();

        assert_eq!(a.unwrap().unwrap().etag.as_str(), "e-aa");
        assert_eq!(b.unwrap().unwrap().etag.as_str(), "e-bb");
        assert!(elapsed < delay * 2, "commands were serialized: {elapsed:?}");
        assert_eq!(store.pool.idle_count(), 2);
    }

    #[test]
    fn test_cas_reply_decoding() {
        assert_eq!(
            cas_outcome(RespValue::Array(vec![RespValue::Integer(1)])).unwrap(),
            CasOutcome::Applied
        );
        assert!(cas_outcome(RespValue::Integer(1)).is_err());
        assert!(cas_outcome(RespValue::Array(vec![RespValue::Integer(2)])).is_err());
    }
}
