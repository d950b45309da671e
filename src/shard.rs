use std::collections::HashMap;

use ahash::RandomState;

use crate::clock::Timestamp;
use crate::entry::Entry;

/// A single bucket of the sharded keyspace.
///
/// Not thread-safe on its own; the cache wraps each shard in an RwLock.
pub(crate) struct Shard<T> {
	entries: HashMap<Box<[u8]>, Entry<T>, RandomState>,
}

impl<T> Shard<T> {
	pub fn new() -> Self {
		Self {
			entries: HashMap::default(),
		}
	}

	/// Insert an entry, returning the one it replaced if the key existed.
	pub fn insert(&mut self, entry: Entry<T>) -> Option<Entry<T>> {
		self.entries.insert(entry.cloned_key(), entry)
	}

	pub fn get(&self, key: &[u8]) -> Option<&Entry<T>> {
		self.entries.get(key)
	}

	pub fn remove(&mut self, key: &[u8]) -> Option<Entry<T>> {
		self.entries.remove(key)
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Remove every entry, returning how many were dropped.
	pub fn clear(&mut self) -> usize {
		let removed = self.entries.len();
		self.entries.clear();
		removed
	}

	/// Rewrite every entry's expiration to `now`, returning the number of
	/// entries touched. Entries stay in the shard, readable as stale.
	pub fn expire_all(&mut self, now: Timestamp) -> usize {
		for entry in self.entries.values_mut() {
			entry.set_expire_at(now);
		}

		self.entries.len()
	}

	/// Remove entries whose expiration lies before the boundary, returning
	/// how many were dropped. Never-expiring entries are kept.
	pub fn delete_expired_before(&mut self, boundary: Timestamp) -> usize {
		let before = self.entries.len();
		self.entries
			.retain(|_, entry| entry.never_expires() || entry.expire_at() >= boundary);
		before - self.entries.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
		self.entries.values()
	}
}
