use std::io;
use std::time::SystemTime;

use thiserror::Error;

use crate::codec::CodecFailure;
use crate::traits::CacheValue;

/// Failure carriers for cache operations.
///
/// `NotFound` and `Expired` are expected steady-state outcomes, not
/// exceptional conditions; consumers discriminate by variant. `Expired`
/// carries the stale payload and its original expiration instant so
/// callers may serve stale while refreshing.
#[derive(Debug, Error)]
pub enum CacheError<T: CacheValue> {
	/// No entry for the key, or the read was suppressed by the context.
	#[error("cache key not found")]
	NotFound,

	/// The entry was found but is past its expiration instant. It remains
	/// in the store until reclaimed, readable as stale.
	#[error("cache entry expired")]
	Expired { stale: T, expired_at: SystemTime },

	/// A snapshot record failed to encode or decode.
	#[error("snapshot codec failed after {processed} entries")]
	Codec {
		processed: usize,
		#[source]
		source: bincode::Error,
	},

	/// The snapshot sink or source rejected an I/O operation.
	#[error("snapshot i/o failed after {processed} entries")]
	SinkIo {
		processed: usize,
		#[source]
		source: io::Error,
	},
}

impl<T: CacheValue> CacheError<T> {
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound)
	}

	pub fn is_expired(&self) -> bool {
		matches!(self, Self::Expired { .. })
	}

	/// The stale value carried by an `Expired` error.
	pub fn stale(&self) -> Option<&T> {
		match self {
			Self::Expired { stale, .. } => Some(stale),
			_ => None,
		}
	}

	/// Consumes the error, yielding the stale value if there is one.
	pub fn into_stale(self) -> Option<T> {
		match self {
			Self::Expired { stale, .. } => Some(stale),
			_ => None,
		}
	}

	/// The original expiration instant of an `Expired` error.
	pub fn expired_at(&self) -> Option<SystemTime> {
		match self {
			Self::Expired { expired_at, .. } => Some(*expired_at),
			_ => None,
		}
	}

	/// Number of records a snapshot operation completed before failing.
	pub fn processed(&self) -> Option<usize> {
		match self {
			Self::Codec { processed, .. } | Self::SinkIo { processed, .. } => Some(*processed),
			_ => None,
		}
	}

	pub(crate) fn snapshot(failure: CodecFailure, processed: usize) -> Self {
		match failure {
			CodecFailure::Codec(source) => Self::Codec { processed, source },
			CodecFailure::Io(source) => Self::SinkIo { processed, source },
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_kind_predicates() {
		let not_found: CacheError<u32> = CacheError::NotFound;
		assert!(not_found.is_not_found());
		assert!(!not_found.is_expired());

		let expired: CacheError<u32> = CacheError::Expired {
			stale: 7,
			expired_at: SystemTime::UNIX_EPOCH,
		};
		assert!(expired.is_expired());
		assert!(!expired.is_not_found());
	}

	#[test]
	fn test_stale_accessors() {
		let expired: CacheError<String> = CacheError::Expired {
			stale: "old".to_string(),
			expired_at: SystemTime::UNIX_EPOCH,
		};
		assert_eq!(expired.stale().map(String::as_str), Some("old"));
		assert_eq!(expired.expired_at(), Some(SystemTime::UNIX_EPOCH));
		assert_eq!(expired.into_stale().as_deref(), Some("old"));

		let not_found: CacheError<String> = CacheError::NotFound;
		assert!(not_found.stale().is_none());
		assert!(not_found.into_stale().is_none());
	}

	#[test]
	fn test_display_hides_payload() {
		let expired: CacheError<String> = CacheError::Expired {
			stale: "secret".to_string(),
			expired_at: SystemTime::UNIX_EPOCH,
		};
		assert!(!expired.to_string().contains("secret"));
	}

	#[test]
	fn test_snapshot_split() {
		let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
		let err: CacheError<u32> = CacheError::snapshot(CodecFailure::Io(io_err), 3);
		assert!(matches!(err, CacheError::SinkIo { processed: 3, .. }));
		assert_eq!(err.processed(), Some(3));
	}
}
