//! # Planvault Redis
//!
//! A [`PlanStore`](planvault_core::PlanStore) backed by Redis.
//!
//! Each plan is a Redis hash with a `body` field (the JSON document) and an
//! `etag` field. Conditional writes run as Lua scripts so the fingerprint
//! comparison and the write happen in one atomic server-side step.
//!
//! The client speaks RESP2 directly over tokio `TcpStream`s held in a small
//! pool; see [`resp`].

#![doc(html_root_url = "https://docs.rs/planvault-redis/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod connection;
mod pool;
pub mod resp;
mod store;

pub use connection::RedisConnection;
pub use store::{RedisConfig, RedisPlanStore};
