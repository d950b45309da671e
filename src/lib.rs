//! # Stale Cache
//!
//! A concurrent, in-memory TTL cache for application-embedded use, with:
//! - **Byte-string keys** copied on write, opaque values of any type
//! - **Jittered expiration** to desynchronize keys written together
//! - **Stale reads**: expired lookups return the old value alongside the
//!   error, enabling serve-stale-while-refresh
//! - **Background janitor** reclaiming expired entries and evicting the
//!   oldest-expiring fraction under count or memory pressure
//! - **Binary snapshots**: dump the keyspace to any writer and restore it
//!   later, expirations included
//! - **Read-optimized concurrency** via fine-grained sharding
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use stale_cache::{CacheBuilder, Context, Ttl};
//!
//! let cache = CacheBuilder::new()
//! 	.name("sessions")
//! 	.time_to_live(Ttl::After(Duration::from_secs(60)))
//! 	.build::<String>();
//!
//! let cx = Context::new();
//! cache.write(&cx, b"user:1", "alice".to_string()).unwrap();
//! assert_eq!(cache.read(&cx, b"user:1").unwrap(), "alice");
//!
//! // Per-call overrides ride on the context.
//! let pinned = Context::new().with_ttl(Ttl::Unlimited);
//! cache.write(&pinned, b"schema", "v2".to_string()).unwrap();
//!
//! cache.close();
//! ```
//!
//! ## Serving Stale
//!
//! An expired entry stays readable until the janitor reclaims it; the
//! `Expired` error carries the old value so callers can keep serving it
//! while a refresh is in flight:
//!
//! ```rust,ignore
//! match cache.read(&cx, key) {
//! 	Ok(value) => serve(value),
//! 	Err(err) if err.is_expired() => {
//! 		schedule_refresh(key);
//! 		serve(err.into_stale().unwrap());
//! 	}
//! 	Err(_) => rebuild(key),
//! }
//! ```
//!
//! ## Thread Safety
//!
//! The cache is `Send + Sync`; share it across threads or async tasks via
//! `Arc`. All operations are synchronous and non-blocking on the hot
//! path, so they are safe to call from async contexts without holding
//! anything across `.await` points.

mod builder;
mod cache;
mod clock;
mod codec;
mod context;
mod core;
mod entry;
mod error;
mod observe;
mod pressure;
mod shard;
mod traits;

pub use builder::CacheBuilder;
pub use cache::Cache;
pub use clock::{Timestamp, NEVER};
pub use context::{Context, Ttl};
pub use entry::Entry;
pub use error::CacheError;
pub use observe::{
	Fields, LogSink, MetricsSink, TracingLog, METRIC_DELETE, METRIC_EVICT, METRIC_EXPIRED,
	METRIC_HIT, METRIC_ITEMS, METRIC_MISS, METRIC_WRITE,
};
pub use pressure::{FixedPressure, PressureSource, ProcessRss};
pub use traits::{
	CacheValue, Deleter, Dumper, ReadWriter, Reader, Restorer, WalkDumpRestorer, Walker, Writer,
};
