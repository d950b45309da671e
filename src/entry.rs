use std::borrow::Cow;
use std::time::SystemTime;

use crate::clock::{self, Timestamp, NEVER};

/// A stored cache record: key bytes, value and expiration instant.
///
/// The key is copied on write, so the caller's buffer is never aliased.
#[derive(Clone, Debug)]
pub struct Entry<T> {
	key: Box<[u8]>,
	value: T,
	expire_at: Timestamp,
}

impl<T> Entry<T> {
	pub(crate) fn new(key: &[u8], value: T, expire_at: Timestamp) -> Self {
		Self {
			key: key.to_vec().into_boxed_slice(),
			value,
			expire_at,
		}
	}

	pub(crate) fn from_parts(key: Box<[u8]>, value: T, expire_at: Timestamp) -> Self {
		Self {
			key,
			value,
			expire_at,
		}
	}

	pub fn key(&self) -> &[u8] {
		&self.key
	}

	pub fn value(&self) -> &T {
		&self.value
	}

	/// Expiration instant; [`NEVER`] for unlimited entries.
	pub fn expire_at(&self) -> Timestamp {
		self.expire_at
	}

	/// Expiration as wall-clock time, `None` for unlimited entries.
	pub fn expires(&self) -> Option<SystemTime> {
		(self.expire_at != NEVER).then(|| clock::to_system_time(self.expire_at))
	}

	pub fn never_expires(&self) -> bool {
		self.expire_at == NEVER
	}

	pub(crate) fn is_stale(&self, now: Timestamp) -> bool {
		self.expire_at != NEVER && self.expire_at < now
	}

	pub(crate) fn set_expire_at(&mut self, at: Timestamp) {
		self.expire_at = at;
	}

	pub(crate) fn cloned_key(&self) -> Box<[u8]> {
		self.key.clone()
	}
}

/// Lossy UTF-8 rendering of a key for log fields.
pub(crate) fn key_lossy(key: &[u8]) -> Cow<'_, str> {
	String::from_utf8_lossy(key)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock;

	#[test]
	fn test_entry_accessors() {
		let entry = Entry::new(b"k1", 42u64, 7);
		assert_eq!(entry.key(), b"k1");
		assert_eq!(*entry.value(), 42);
		assert_eq!(entry.expire_at(), 7);
	}

	#[test]
	fn test_defensive_key_copy() {
		let mut key = b"mutable".to_vec();
		let entry = Entry::new(&key, "v", NEVER);

		key[0] = b'X';
		assert_eq!(entry.key(), b"mutable");
	}

	#[test]
	fn test_unlimited_entry_is_never_stale() {
		let entry = Entry::new(b"k", (), NEVER);
		assert!(entry.never_expires());
		assert!(!entry.is_stale(u64::MAX));
		assert!(entry.expires().is_none());
	}

	#[test]
	fn test_staleness_boundary() {
		let entry = Entry::new(b"k", (), 100);
		assert!(!entry.is_stale(99));
		// An entry is live at its exact expiration instant.
		assert!(!entry.is_stale(100));
		assert!(entry.is_stale(101));
	}

	#[test]
	fn test_future_entry_is_live() {
		let entry = Entry::new(b"k", (), clock::deadline(std::time::Duration::from_secs(60)));
		assert!(!entry.is_stale(clock::now()));
		assert!(entry.expires().is_some());
	}

	#[test]
	fn test_key_lossy() {
		assert_eq!(key_lossy(b"plain"), "plain");
		assert_eq!(key_lossy(&[0xff, 0xfe]), "\u{fffd}\u{fffd}");
	}
}
