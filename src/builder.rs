use std::sync::Arc;
use std::time::Duration;

use crate::cache::Cache;
use crate::context::Ttl;
use crate::observe::{LogSink, MetricsSink};
use crate::pressure::{PressureSource, ProcessRss};
use crate::traits::CacheValue;

/// Lifetime applied when neither the builder nor the context names one.
pub(crate) const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(5 * 60);

/// Immutable cache configuration. Construct through [`CacheBuilder`].
#[derive(Clone)]
pub(crate) struct Config {
	pub(crate) name: String,
	pub(crate) time_to_live: Ttl,
	pub(crate) expiration_jitter: f64,
	pub(crate) delete_expired_after: Duration,
	pub(crate) delete_expired_job_interval: Duration,
	pub(crate) items_count_report_interval: Duration,
	pub(crate) heap_in_use_soft_limit: u64,
	pub(crate) count_soft_limit: usize,
	pub(crate) evict_fraction: f64,
	pub(crate) shards: usize,
	pub(crate) logger: Option<Arc<dyn LogSink>>,
	pub(crate) metrics: Option<Arc<dyn MetricsSink>>,
	pub(crate) pressure: Arc<dyn PressureSource>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			name: String::new(),
			time_to_live: Ttl::Default,
			expiration_jitter: 0.1,
			delete_expired_after: Duration::from_secs(24 * 60 * 60),
			delete_expired_job_interval: Duration::from_secs(60 * 60),
			items_count_report_interval: Duration::from_secs(60),
			heap_in_use_soft_limit: 0,
			count_soft_limit: 0,
			evict_fraction: 0.1,
			shards: 16,
			logger: None,
			metrics: None,
			pressure: Arc::new(ProcessRss),
		}
	}
}

/// Builder for configuring a [`Cache`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use stale_cache::{CacheBuilder, Ttl};
///
/// let cache = CacheBuilder::new()
/// 	.name("profiles")
/// 	.time_to_live(Ttl::After(Duration::from_secs(120)))
/// 	.count_soft_limit(100_000)
/// 	.build::<String>();
/// # cache.close();
/// ```
pub struct CacheBuilder {
	config: Config,
}

impl CacheBuilder {
	pub fn new() -> Self {
		Self {
			config: Config::default(),
		}
	}

	/// Cache name, used as a label on log events and metrics.
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.config.name = name.into();
		self
	}

	/// Default entry lifetime. `Ttl::Default` selects the built-in five
	/// minutes; `Ttl::Unlimited` disables expiry.
	pub fn time_to_live(mut self, ttl: Ttl) -> Self {
		self.config.time_to_live = ttl;
		self
	}

	/// Random TTL perturbation as a fraction in [0, 1]; entries get a
	/// lifetime within `ttl ± ttl * jitter / 2`, desynchronizing the
	/// expiry of keys written together. 0 disables jitter.
	///
	/// Default: 0.1
	pub fn expiration_jitter(mut self, jitter: f64) -> Self {
		assert!(
			(0.0..=1.0).contains(&jitter),
			"expiration_jitter must be between 0 and 1"
		);
		self.config.expiration_jitter = jitter;
		self
	}

	/// Grace period past expiration before the janitor physically removes
	/// an entry. Stale entries remain readable through `Expired` until
	/// then.
	///
	/// Default: 24 hours
	pub fn delete_expired_after(mut self, after: Duration) -> Self {
		self.config.delete_expired_after = after;
		self
	}

	/// Janitor period.
	///
	/// Default: 1 hour
	pub fn delete_expired_job_interval(mut self, interval: Duration) -> Self {
		assert!(
			!interval.is_zero(),
			"delete_expired_job_interval must be non-zero"
		);
		self.config.delete_expired_job_interval = interval;
		self
	}

	/// Items-count gauge period. The reporter only runs when a metrics
	/// sink is configured.
	///
	/// Default: 1 minute
	pub fn items_count_report_interval(mut self, interval: Duration) -> Self {
		assert!(
			!interval.is_zero(),
			"items_count_report_interval must be non-zero"
		);
		self.config.items_count_report_interval = interval;
		self
	}

	/// Byte threshold on the pressure source; once exceeded the janitor
	/// evicts the oldest-expiring fraction of entries. 0 disables.
	pub fn heap_in_use_soft_limit(mut self, bytes: u64) -> Self {
		self.config.heap_in_use_soft_limit = bytes;
		self
	}

	/// Entry-count threshold with the same effect. 0 disables.
	pub fn count_soft_limit(mut self, count: usize) -> Self {
		self.config.count_soft_limit = count;
		self
	}

	/// Fraction of entries dropped per eviction pass, in (0, 1].
	///
	/// Default: 0.1
	pub fn evict_fraction(mut self, fraction: f64) -> Self {
		assert!(
			fraction > 0.0 && fraction <= 1.0,
			"evict_fraction must be between 0 and 1"
		);
		self.config.evict_fraction = fraction;
		self
	}

	/// Number of shards, rounded up to the next power of two. More shards
	/// reduce contention at a small memory cost.
	///
	/// Default: 16
	pub fn shards(mut self, count: usize) -> Self {
		assert!(count > 0, "shards must be non-zero");
		self.config.shards = count;
		self
	}

	/// Structured log capability. Absent by default.
	pub fn logger(mut self, sink: Arc<dyn LogSink>) -> Self {
		self.config.logger = Some(sink);
		self
	}

	/// Metrics capability. Absent by default; also enables the
	/// items-count reporter.
	pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
		self.config.metrics = Some(sink);
		self
	}

	/// Memory pressure probe used by the heap soft limit.
	///
	/// Default: process resident set size.
	pub fn pressure(mut self, source: Arc<dyn PressureSource>) -> Self {
		self.config.pressure = source;
		self
	}

	/// Build the cache and start its background workers.
	pub fn build<T: CacheValue>(self) -> Cache<T> {
		Cache::with_config(self.config)
	}
}

impl Default for CacheBuilder {
	fn default() -> Self {
		Self::new()
	}
}
