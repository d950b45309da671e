use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::builder::{CacheBuilder, Config};
use crate::clock::{self, Timestamp, NEVER};
use crate::codec;
use crate::context::Context;
use crate::core::{spawn_workers, Backend, CacheCore};
use crate::entry::Entry;
use crate::error::CacheError;
use crate::shard::Shard;
use crate::traits::{CacheValue, Deleter, Dumper, Reader, Restorer, Walker, Writer};

/// Concurrent in-memory cache keyed by byte strings.
///
/// Point operations are safe under arbitrary parallelism; share the
/// cache across threads via `Arc<Cache<T>>`. The hot path takes one
/// fine-grained shard lock and never waits on the background workers.
///
/// Construction starts the janitor (and, with a metrics sink, the
/// items-count reporter); [`Cache::close`] stops them, and dropping the
/// cache is a safety net that does the same.
pub struct Cache<T: CacheValue> {
	inner: Arc<Inner<T>>,
	shutdown: Mutex<Option<Sender<()>>>,
	workers: Mutex<Vec<JoinHandle<()>>>,
}

pub(crate) struct Inner<T: CacheValue> {
	core: Arc<CacheCore>,
	shards: Box<[RwLock<Shard<T>>]>,
	mask: usize,
	entry_count: AtomicUsize,
	hasher: ahash::RandomState,
}

impl<T: CacheValue> Cache<T> {
	/// Create a cache with default configuration. Use [`CacheBuilder`]
	/// to tune it.
	pub fn new() -> Self {
		CacheBuilder::new().build()
	}

	pub(crate) fn with_config(config: Config) -> Self {
		let shard_count = config.shards.next_power_of_two();
		let shards = (0..shard_count)
			.map(|_| RwLock::new(Shard::new()))
			.collect::<Vec<_>>()
			.into_boxed_slice();

		let core = Arc::new(CacheCore::new(config));
		let inner = Arc::new(Inner {
			core: Arc::clone(&core),
			shards,
			mask: shard_count - 1,
			entry_count: AtomicUsize::new(0),
			hasher: ahash::RandomState::new(),
		});

		let (shutdown_tx, shutdown_rx) = bounded(0);
		let workers = spawn_workers(&core, &inner, &shutdown_rx);

		Self {
			inner,
			shutdown: Mutex::new(Some(shutdown_tx)),
			workers: Mutex::new(workers),
		}
	}

	/// Look up a value.
	///
	/// Returns `NotFound` for absent keys (and unconditionally when the
	/// context skips reads), or `Expired` carrying the stale value and
	/// its original expiration for entries past their TTL. Stale entries
	/// are left in place; reclamation belongs to the janitor.
	pub fn read(&self, cx: &Context, key: &[u8]) -> Result<T, CacheError<T>> {
		if cx.skip_read() {
			return Err(CacheError::NotFound);
		}

		let entry = {
			let shard = self.inner.shard_for(key).read();
			shard.get(key).cloned()
		};

		self.inner.core.prepare_read(entry.as_ref())
	}

	/// Store a value under a copy of `key`, replacing any prior entry.
	///
	/// The expiration instant is now plus the context's effective TTL
	/// (configured default, jittered, unless overridden per call).
	pub fn write(&self, cx: &Context, key: &[u8], value: T) -> Result<(), CacheError<T>> {
		let (ttl, expire_at) = self.inner.core.expire_at(cx);
		let entry = Entry::new(key, value, expire_at);

		self.inner.core.notify_written(key, entry.value(), ttl);

		let replaced = self.inner.shard_for(key).write().insert(entry);
		if replaced.is_none() {
			self.inner.entry_count.fetch_add(1, Ordering::Relaxed);
		}

		Ok(())
	}

	/// Remove an entry, returning `NotFound` if the key is absent.
	pub fn delete(&self, _cx: &Context, key: &[u8]) -> Result<(), CacheError<T>> {
		let removed = self.inner.shard_for(key).write().remove(key);

		match removed {
			Some(_) => {
				self.inner.entry_count.fetch_sub(1, Ordering::Relaxed);
				self.inner.core.notify_deleted(key);

				Ok(())
			}
			None => Err(CacheError::NotFound),
		}
	}

	/// Mark every entry as expired right now.
	///
	/// Entries remain readable as stale (`Expired` carries their value)
	/// until the janitor reclaims them or [`Cache::delete_all`] runs.
	pub fn expire_all(&self, _cx: &Context) {
		let start = Instant::now();
		let now = clock::now();
		let mut count = 0;

		for shard in self.inner.shards.iter() {
			count += shard.write().expire_all(now);
		}

		self.inner.core.notify_expired_all(start, count);
	}

	/// Remove every entry.
	pub fn delete_all(&self, _cx: &Context) {
		let start = Instant::now();
		let mut count = 0;

		for shard in self.inner.shards.iter() {
			let removed = shard.write().clear();
			if removed > 0 {
				self.inner.entry_count.fetch_sub(removed, Ordering::Relaxed);
			}
			count += removed;
		}

		self.inner.core.notify_deleted_all(start, count);
	}

	/// Number of entries, including stale ones not yet reclaimed.
	pub fn len(&self) -> usize {
		self.inner.entry_count.load(Ordering::Relaxed)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Visit every entry in unspecified order, stopping at the first
	/// callback error; returns the number of entries processed before
	/// the stop and the error, if any.
	///
	/// A key present for the whole walk is visited exactly once; keys
	/// written concurrently may or may not be seen. The callback runs
	/// under a shard read lock and must not call back into the cache.
	pub fn walk<E, F>(&self, mut f: F) -> (usize, Option<E>)
	where
		F: FnMut(&Entry<T>) -> Result<(), E>,
	{
		let mut processed = 0;

		for shard in self.inner.shards.iter() {
			let guard = shard.read();
			for entry in guard.iter() {
				match f(entry) {
					Ok(()) => processed += 1,
					Err(e) => return (processed, Some(e)),
				}
			}
		}

		(processed, None)
	}

	/// Write every entry to the sink as self-delimited binary records,
	/// returning the number written. Fails fast on the first sink or
	/// encode error, which carries the count written before it.
	pub fn dump<W: Write>(&self, mut w: W) -> Result<usize, CacheError<T>>
	where
		T: Serialize,
	{
		let (processed, err) = self.walk(|entry| codec::encode(&mut w, entry));

		match err {
			None => Ok(processed),
			Some(failure) => Err(CacheError::snapshot(failure, processed)),
		}
	}

	/// Read records until end of input, storing each one and overwriting
	/// same-key entries (last record wins). Dumped expirations are kept
	/// as-is, so restored entries keep their original lifetimes.
	///
	/// A clean end of input is success. A mid-stream error returns the
	/// count restored so far and leaves the partially restored state in
	/// place; restore into a fresh cache and swap for atomicity.
	pub fn restore<R: Read>(&self, mut r: R) -> Result<usize, CacheError<T>>
	where
		T: DeserializeOwned,
	{
		let mut processed = 0;

		loop {
			match codec::decode::<T, R>(&mut r) {
				Ok(Some(entry)) => {
					let index = self.inner.shard_index(entry.key());
					let replaced = self.inner.shards[index].write().insert(entry);
					if replaced.is_none() {
						self.inner.entry_count.fetch_add(1, Ordering::Relaxed);
					}
					processed += 1;
				}
				Ok(None) => return Ok(processed),
				Err(failure) => return Err(CacheError::snapshot(failure, processed)),
			}
		}
	}

	/// Stop the background workers and wait for them to finish.
	/// Idempotent; also invoked by `Drop`.
	pub fn close(&self) {
		drop(self.shutdown.lock().take());

		let workers = std::mem::take(&mut *self.workers.lock());
		for handle in workers {
			let _ = handle.join();
		}
	}
}

impl<T: CacheValue> Default for Cache<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: CacheValue> Drop for Cache<T> {
	fn drop(&mut self) {
		self.close();
	}
}

impl<T: CacheValue> Inner<T> {
	fn shard_index(&self, key: &[u8]) -> usize {
		(self.hasher.hash_one(key) as usize) & self.mask
	}

	fn shard_for(&self, key: &[u8]) -> &RwLock<Shard<T>> {
		&self.shards[self.shard_index(key)]
	}
}

impl<T: CacheValue> Backend for Inner<T> {
	fn len(&self) -> usize {
		self.entry_count.load(Ordering::Relaxed)
	}

	fn delete_expired(&self, before: Timestamp) {
		for shard in self.shards.iter() {
			let removed = shard.write().delete_expired_before(before);
			if removed > 0 {
				self.entry_count.fetch_sub(removed, Ordering::Relaxed);
			}
		}
	}

	fn evict_oldest(&self, fraction: f64) -> usize {
		// Snapshot keys and expirations, then drop the oldest-expiring
		// prefix. O(n log n) is fine at janitor cadence and keeps the hot
		// path free of access bookkeeping.
		let mut snapshot: Vec<(Box<[u8]>, Timestamp)> = Vec::with_capacity(self.len());

		for shard in self.shards.iter() {
			let guard = shard.read();
			for entry in guard.iter() {
				snapshot.push((entry.cloned_key(), entry.expire_at()));
			}
		}

		// Never-expiring entries go to the back of the line.
		snapshot.sort_by_key(|(_, expire_at)| {
			if *expire_at == NEVER {
				u64::MAX
			} else {
				*expire_at
			}
		});

		let target = (snapshot.len() as f64 * fraction) as usize;
		let mut evicted = 0;

		for (key, _) in snapshot.into_iter().take(target) {
			if self.shards[self.shard_index(&key)].write().remove(&key).is_some() {
				self.entry_count.fetch_sub(1, Ordering::Relaxed);
				evicted += 1;
			}
		}

		evicted
	}
}

impl<T: CacheValue> Reader<T> for Cache<T> {
	fn read(&self, cx: &Context, key: &[u8]) -> Result<T, CacheError<T>> {
		Cache::read(self, cx, key)
	}
}

impl<T: CacheValue> Writer<T> for Cache<T> {
	fn write(&self, cx: &Context, key: &[u8], value: T) -> Result<(), CacheError<T>> {
		Cache::write(self, cx, key, value)
	}
}

impl<T: CacheValue> Deleter<T> for Cache<T> {
	fn delete(&self, cx: &Context, key: &[u8]) -> Result<(), CacheError<T>> {
		Cache::delete(self, cx, key)
	}
}

impl<T: CacheValue> Walker<T> for Cache<T> {
	fn walk<E, F>(&self, f: F) -> (usize, Option<E>)
	where
		F: FnMut(&Entry<T>) -> Result<(), E>,
	{
		Cache::walk(self, f)
	}
}

impl<T: CacheValue + Serialize> Dumper<T> for Cache<T> {
	fn dump<W: Write>(&self, w: W) -> Result<usize, CacheError<T>> {
		Cache::dump(self, w)
	}
}

impl<T: CacheValue + DeserializeOwned> Restorer<T> for Cache<T> {
	fn restore<R: Read>(&self, r: R) -> Result<usize, CacheError<T>> {
		Cache::restore(self, r)
	}
}

#[cfg(test)]
mod tests {
	use std::thread;
	use std::time::Duration;

	use super::*;
	use crate::context::Ttl;

	fn quiet_cache() -> Cache<String> {
		CacheBuilder::new().expiration_jitter(0.0).build()
	}

	#[test]
	fn test_cache_write_and_read() {
		let cache = quiet_cache();
		let cx = Context::new();

		cache.write(&cx, b"k1", "v1".to_string()).unwrap();
		assert_eq!(cache.read(&cx, b"k1").unwrap(), "v1");
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn test_cache_read_missing() {
		let cache = quiet_cache();
		let err = cache.read(&Context::new(), b"absent").unwrap_err();
		assert!(err.is_not_found());
	}

	#[test]
	fn test_cache_skip_read() {
		let cache = quiet_cache();
		let cx = Context::new();

		cache.write(&cx, b"k", "v".to_string()).unwrap();

		let skipping = Context::new().with_skip_read(true);
		assert!(cache.read(&skipping, b"k").unwrap_err().is_not_found());
		assert_eq!(cache.read(&cx, b"k").unwrap(), "v");
	}

	#[test]
	fn test_cache_overwrite_is_last_writer_wins() {
		let cache = quiet_cache();
		let cx = Context::new();

		cache.write(&cx, b"k", "v1".to_string()).unwrap();
		cache.write(&cx, b"k", "v2".to_string()).unwrap();

		assert_eq!(cache.read(&cx, b"k").unwrap(), "v2");
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn test_cache_delete() {
		let cache = quiet_cache();
		let cx = Context::new();

		cache.write(&cx, b"k", "v".to_string()).unwrap();
		cache.delete(&cx, b"k").unwrap();

		assert!(cache.read(&cx, b"k").unwrap_err().is_not_found());
		assert_eq!(cache.len(), 0);
	}

	#[test]
	fn test_cache_delete_missing_is_not_found() {
		let cache = quiet_cache();
		let err = cache.delete(&Context::new(), b"absent").unwrap_err();
		assert!(err.is_not_found());
	}

	#[test]
	fn test_cache_expired_read_carries_stale() {
		let cache = quiet_cache();
		let cx = Context::new().with_ttl(Ttl::After(Duration::from_millis(30)));

		cache.write(&cx, b"k", "stale".to_string()).unwrap();
		thread::sleep(Duration::from_millis(60));

		let err = cache.read(&Context::new(), b"k").unwrap_err();
		assert!(err.is_expired());
		assert_eq!(err.stale().map(String::as_str), Some("stale"));

		// The entry is not removed by the read itself.
		assert_eq!(cache.len(), 1);
	}

	#[test]
	fn test_cache_unlimited_ttl_never_expires() {
		let cache = quiet_cache();
		let cx = Context::new().with_ttl(Ttl::Unlimited);

		cache.write(&cx, b"k", "v".to_string()).unwrap();

		let (_, err) = cache.walk(|entry| -> Result<(), ()> {
			assert!(entry.never_expires());
			Ok(())
		});
		assert!(err.is_none());
		assert_eq!(cache.read(&Context::new(), b"k").unwrap(), "v");
	}

	#[test]
	fn test_cache_expire_all_keeps_entries_stale() {
		let cache = quiet_cache();
		let cx = Context::new();

		for key in [b"a".as_slice(), b"b", b"c"] {
			cache.write(&cx, key, "v".to_string()).unwrap();
		}

		cache.expire_all(&cx);

		assert_eq!(cache.len(), 3);
		for key in [b"a".as_slice(), b"b", b"c"] {
			assert!(cache.read(&cx, key).unwrap_err().is_expired());
		}
	}

	#[test]
	fn test_cache_delete_all() {
		let cache = quiet_cache();
		let cx = Context::new();

		cache.write(&cx, b"a", "v".to_string()).unwrap();
		cache.write(&cx, b"b", "v".to_string()).unwrap();

		cache.delete_all(&cx);

		assert_eq!(cache.len(), 0);
		assert!(cache.is_empty());
		assert!(cache.read(&cx, b"a").unwrap_err().is_not_found());
	}

	#[test]
	fn test_cache_walk_counts_and_stops_on_error() {
		let cache = quiet_cache();
		let cx = Context::new();

		for i in 0..10u8 {
			cache.write(&cx, &[i], format!("v{i}")).unwrap();
		}

		let (count, err) = cache.walk(|_| -> Result<(), ()> { Ok(()) });
		assert_eq!(count, 10);
		assert!(err.is_none());

		let mut seen = 0;
		let (count, err) = cache.walk(|_| {
			seen += 1;
			if seen == 4 {
				Err("stop")
			} else {
				Ok(())
			}
		});
		assert_eq!(count, 3);
		assert_eq!(err, Some("stop"));
	}

	#[test]
	fn test_cache_defensive_key_copy() {
		let cache = quiet_cache();
		let cx = Context::new();

		let mut key = b"owned".to_vec();
		cache.write(&cx, &key, "v".to_string()).unwrap();

		key[0] = b'X';
		assert_eq!(cache.read(&cx, b"owned").unwrap(), "v");
		assert!(cache.read(&cx, &key).unwrap_err().is_not_found());
	}

	#[test]
	fn test_cache_dump_restore_round_trip() {
		let cache = quiet_cache();
		let cx = Context::new();

		for i in 0..50u32 {
			let key = format!("key-{i}");
			cache.write(&cx, key.as_bytes(), format!("value-{i}")).unwrap();
		}

		let mut buf = Vec::new();
		assert_eq!(cache.dump(&mut buf).unwrap(), 50);

		let restored = quiet_cache();
		assert_eq!(restored.restore(buf.as_slice()).unwrap(), 50);
		assert_eq!(restored.len(), 50);

		let mut original: Vec<(Vec<u8>, String, Timestamp)> = Vec::new();
		cache.walk(|e| -> Result<(), ()> {
			original.push((e.key().to_vec(), e.value().clone(), e.expire_at()));
			Ok(())
		});
		let mut round_tripped: Vec<(Vec<u8>, String, Timestamp)> = Vec::new();
		restored.walk(|e| -> Result<(), ()> {
			round_tripped.push((e.key().to_vec(), e.value().clone(), e.expire_at()));
			Ok(())
		});

		original.sort();
		round_tripped.sort();
		assert_eq!(original, round_tripped);
	}

	#[test]
	fn test_cache_restore_is_last_wins() {
		let cache = quiet_cache();
		let cx = Context::new();

		cache.write(&cx, b"k", "old".to_string()).unwrap();

		let donor = quiet_cache();
		donor.write(&cx, b"k", "new".to_string()).unwrap();

		let mut buf = Vec::new();
		donor.dump(&mut buf).unwrap();
		cache.restore(buf.as_slice()).unwrap();

		assert_eq!(cache.len(), 1);
		assert_eq!(cache.read(&cx, b"k").unwrap(), "new");
	}

	#[test]
	fn test_cache_restore_truncated_keeps_partial_state() {
		let donor = quiet_cache();
		let cx = Context::new();
		for i in 0..10u8 {
			donor.write(&cx, &[i], format!("v{i}")).unwrap();
		}

		let mut buf = Vec::new();
		donor.dump(&mut buf).unwrap();
		buf.truncate(buf.len() - 3);

		let target = quiet_cache();
		let err = target.restore(buf.as_slice()).unwrap_err();

		assert_eq!(err.processed(), Some(9));
		assert_eq!(target.len(), 9);
	}

	#[test]
	fn test_evict_oldest_drops_expiring_prefix() {
		let cache = quiet_cache();
		let cx = Context::new();

		// Expirations strictly increase with the key index.
		for i in 1..=12u64 {
			let cx = cx.with_ttl(Ttl::After(Duration::from_secs(100 * i)));
			cache.write(&cx, format!("k{i}").as_bytes(), "v".to_string()).unwrap();
		}

		let evicted = cache.inner.evict_oldest(0.5);
		assert_eq!(evicted, 6);
		assert_eq!(cache.len(), 6);

		for i in 1..=6u64 {
			let err = cache.read(&cx, format!("k{i}").as_bytes()).unwrap_err();
			assert!(err.is_not_found());
		}
		for i in 7..=12u64 {
			assert!(cache.read(&cx, format!("k{i}").as_bytes()).is_ok());
		}
	}

	#[test]
	fn test_evict_oldest_spares_unlimited_entries() {
		let cache = quiet_cache();
		let cx = Context::new();

		cache
			.write(&cx.with_ttl(Ttl::Unlimited), b"forever", "v".to_string())
			.unwrap();
		cache
			.write(&cx.with_ttl(Ttl::After(Duration::from_secs(1))), b"soon", "v".to_string())
			.unwrap();

		let evicted = cache.inner.evict_oldest(0.5);
		assert_eq!(evicted, 1);
		assert!(cache.read(&cx, b"soon").unwrap_err().is_not_found());
		assert!(cache.read(&cx, b"forever").is_ok());
	}

	#[test]
	fn test_evict_oldest_fraction_floor() {
		let cache = quiet_cache();
		let cx = Context::new();

		for i in 0..5u8 {
			cache.write(&cx, &[i], "v".to_string()).unwrap();
		}

		// floor(5 * 0.5) = 2
		assert_eq!(cache.inner.evict_oldest(0.5), 2);
		assert_eq!(cache.len(), 3);
	}

	#[test]
	fn test_delete_expired_via_backend() {
		let cache = quiet_cache();
		let cx = Context::new();

		cache
			.write(&cx.with_ttl(Ttl::After(Duration::from_millis(10))), b"old", "v".to_string())
			.unwrap();
		cache
			.write(&cx.with_ttl(Ttl::After(Duration::from_secs(3600))), b"fresh", "v".to_string())
			.unwrap();
		cache.write(&cx.with_ttl(Ttl::Unlimited), b"forever", "v".to_string()).unwrap();

		thread::sleep(Duration::from_millis(30));
		cache.inner.delete_expired(clock::now());

		assert_eq!(cache.len(), 2);
		assert!(cache.read(&cx, b"old").unwrap_err().is_not_found());
		assert!(cache.read(&cx, b"fresh").is_ok());
		assert!(cache.read(&cx, b"forever").is_ok());
	}

	#[test]
	fn test_cache_close_is_idempotent() {
		let cache = quiet_cache();
		cache.close();
		cache.close();
	}

	#[test]
	fn test_cache_concurrent_access() {
		let cache = Arc::new(CacheBuilder::new().expiration_jitter(0.0).build::<String>());
		let mut handles = vec![];

		for t in 0..4u64 {
			let cache = Arc::clone(&cache);
			handles.push(thread::spawn(move || {
				let cx = Context::new();
				for i in 0..250u64 {
					let key = format!("key-{}", t * 250 + i);
					cache.write(&cx, key.as_bytes(), format!("value-{i}")).unwrap();
					assert_eq!(cache.read(&cx, key.as_bytes()).unwrap(), format!("value-{i}"));
				}
			}));
		}

		for handle in handles {
			handle.join().unwrap();
		}

		assert_eq!(cache.len(), 1000);
	}

	#[test]
	fn test_cache_is_send_sync() {
		fn assert_send<T: Send>() {}
		fn assert_sync<T: Sync>() {}

		assert_send::<Cache<String>>();
		assert_sync::<Cache<String>>();
	}
}
