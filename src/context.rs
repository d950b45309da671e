use std::time::Duration;

/// Entry lifetime selector.
///
/// Replaces the usual zero/negative duration sentinels with explicit
/// variants: `Default` defers to the cache configuration (which in turn
/// falls back to the built-in five minutes), `Unlimited` never expires,
/// and `After` is an explicit duration. `After(Duration::ZERO)` is
/// normalized to `Unlimited`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ttl {
	/// Use the configured (or built-in) default lifetime.
	#[default]
	Default,
	/// Never expire.
	Unlimited,
	/// Expire after the given duration.
	After(Duration),
}

/// Per-call options consulted by cache operations.
///
/// A context carries only two knobs: a flag to bypass reads (useful to
/// force a refresh path) and a TTL override for writes. The neutral
/// context is `Context::new()`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use stale_cache::{Context, Ttl};
///
/// let cx = Context::new()
/// 	.with_skip_read(true)
/// 	.with_ttl(Ttl::After(Duration::from_secs(30)));
/// assert!(cx.skip_read());
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Context {
	skip_read: bool,
	ttl: Ttl,
}

impl Context {
	/// Neutral context: reads allowed, configured TTL.
	pub fn new() -> Self {
		Self::default()
	}

	/// Suppress cache reads; lookups return `NotFound` without touching
	/// storage. Writes are unaffected.
	pub fn with_skip_read(mut self, skip: bool) -> Self {
		self.skip_read = skip;
		self
	}

	/// Override the entry lifetime for writes made with this context.
	pub fn with_ttl(mut self, ttl: Ttl) -> Self {
		self.ttl = ttl;
		self
	}

	pub fn skip_read(&self) -> bool {
		self.skip_read
	}

	pub fn ttl(&self) -> Ttl {
		self.ttl
	}
}
