use std::fmt;
use std::io;

use crate::context::Context;
use crate::entry::Entry;
use crate::error::CacheError;

/// Bounds required of every cached value.
///
/// Blanket-implemented; any cloneable, debuggable, thread-safe type
/// qualifies. Snapshot support additionally needs serde traits, required
/// only on [`Dumper`]/[`Restorer`] implementations. Wrap large payloads
/// in `Arc` to keep read-path clones cheap.
pub trait CacheValue: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + fmt::Debug + Send + Sync + 'static {}

/// Reads from cache.
pub trait Reader<T: CacheValue> {
	/// Returns the cached value, `NotFound`, or `Expired` carrying the
	/// stale payload.
	fn read(&self, cx: &Context, key: &[u8]) -> Result<T, CacheError<T>>;
}

/// Writes to cache.
pub trait Writer<T: CacheValue> {
	/// Stores a value under a copied key with the context's effective TTL.
	fn write(&self, cx: &Context, key: &[u8], value: T) -> Result<(), CacheError<T>>;
}

/// Deletes from cache.
pub trait Deleter<T: CacheValue> {
	/// Removes an entry, returning `NotFound` for absent keys.
	fn delete(&self, cx: &Context, key: &[u8]) -> Result<(), CacheError<T>>;
}

/// Reads from and writes to cache.
pub trait ReadWriter<T: CacheValue>: Reader<T> + Writer<T> {}

impl<T: CacheValue, C: Reader<T> + Writer<T>> ReadWriter<T> for C {}

/// Visits every cached entry.
pub trait Walker<T: CacheValue> {
	/// Calls `f` for every entry in unspecified order, stopping at the
	/// first error. Returns the number of entries processed before the
	/// stop, and the error if any.
	fn walk<E, F>(&self, f: F) -> (usize, Option<E>)
	where
		F: FnMut(&Entry<T>) -> Result<(), E>;
}

/// Dumps cache entries in binary format.
pub trait Dumper<T: CacheValue> {
	/// Writes every entry to the sink, returning the number written.
	fn dump<W: io::Write>(&self, w: W) -> Result<usize, CacheError<T>>;
}

/// Restores cache entries from a binary dump.
pub trait Restorer<T: CacheValue> {
	/// Reads records until end of input, returning the number restored.
	fn restore<R: io::Read>(&self, r: R) -> Result<usize, CacheError<T>>;
}

/// Walks, dumps and restores cache.
pub trait WalkDumpRestorer<T: CacheValue>: Walker<T> + Dumper<T> + Restorer<T> {}

impl<T: CacheValue, C: Walker<T> + Dumper<T> + Restorer<T>> WalkDumpRestorer<T> for C {}
