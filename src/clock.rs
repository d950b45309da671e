use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Expiration instant: nanoseconds since the Unix epoch.
pub type Timestamp = u64;

/// Sentinel expiration for entries that never go stale.
pub const NEVER: Timestamp = 0;

/// Current wall-clock time as a [`Timestamp`].
pub(crate) fn now() -> Timestamp {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_nanos() as u64)
		.unwrap_or(NEVER)
}

pub(crate) fn to_system_time(ts: Timestamp) -> SystemTime {
	UNIX_EPOCH + Duration::from_nanos(ts)
}

/// Expiration instant for an entry written now with the given lifetime.
pub(crate) fn deadline(ttl: Duration) -> Timestamp {
	now().saturating_add(ttl.as_nanos() as u64)
}

/// Reclamation boundary: instants older than now minus the grace period.
pub(crate) fn cutoff(grace: Duration) -> Timestamp {
	now().saturating_sub(grace.as_nanos() as u64)
}

/// Perturb a lifetime by a uniform factor in `1 ± jitter/2`.
pub(crate) fn jittered(ttl: Duration, jitter: f64) -> Duration {
	if jitter <= 0.0 {
		return ttl;
	}

	apply_jitter(ttl, jitter, rand::thread_rng().gen::<f64>())
}

// Split out so tests can pin the uniform sample.
fn apply_jitter(ttl: Duration, jitter: f64, sample: f64) -> Duration {
	Duration::from_secs_f64(ttl.as_secs_f64() * (1.0 + jitter * (sample - 0.5)))
}
