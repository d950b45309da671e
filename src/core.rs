use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{select, tick, Receiver};

use crate::builder::{Config, DEFAULT_TIME_TO_LIVE};
use crate::clock::{self, Timestamp};
use crate::context::{Context, Ttl};
use crate::entry::{key_lossy, Entry};
use crate::error::CacheError;
use crate::observe::{
	Fields, METRIC_DELETE, METRIC_EVICT, METRIC_EXPIRED, METRIC_HIT, METRIC_ITEMS, METRIC_MISS,
	METRIC_WRITE,
};
use crate::traits::CacheValue;

/// Maintenance callbacks the backend exposes to the background workers.
pub(crate) trait Backend: Send + Sync + 'static {
	/// Entry count, including stale-but-unreclaimed entries.
	fn len(&self) -> usize;

	/// Remove entries whose expiration lies before the boundary.
	fn delete_expired(&self, before: Timestamp);

	/// Drop the oldest-expiring fraction of entries, returning how many
	/// were removed.
	fn evict_oldest(&self, fraction: f64) -> usize;
}

/// Shared machinery embedded by the cache backend: TTL derivation, read
/// classification, observability side effects and pressure sensing. The
/// background workers borrow it alongside the backend's maintenance
/// callbacks.
pub(crate) struct CacheCore {
	config: Config,
}

impl CacheCore {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Effective lifetime for a new entry; `None` means never expire.
	///
	/// The per-call override wins over the configured default, which in
	/// turn falls back to the built-in five minutes. Finite lifetimes are
	/// perturbed by the configured jitter; unlimited ones short-circuit.
	pub fn ttl(&self, cx: &Context) -> Option<Duration> {
		let selected = match cx.ttl() {
			Ttl::Default => self.config.time_to_live,
			requested => requested,
		};

		let base = match selected {
			Ttl::Default => DEFAULT_TIME_TO_LIVE,
			Ttl::Unlimited => return None,
			Ttl::After(d) if d.is_zero() => return None,
			Ttl::After(d) => d,
		};

		Some(clock::jittered(base, self.config.expiration_jitter))
	}

	/// Lifetime and expiration instant for an entry written now.
	pub fn expire_at(&self, cx: &Context) -> (Option<Duration>, Timestamp) {
		match self.ttl(cx) {
			Some(ttl) => (Some(ttl), clock::deadline(ttl)),
			None => (None, crate::clock::NEVER),
		}
	}

	/// Classify a looked-up entry as hit, miss or expired, emitting the
	/// matching metric and debug log.
	pub fn prepare_read<T: CacheValue>(
		&self,
		found: Option<&Entry<T>>,
	) -> Result<T, CacheError<T>> {
		let entry = match found {
			Some(entry) => entry,
			None => {
				self.log_debug("cache miss", &[("name", &self.config.name)]);
				self.metric_add(METRIC_MISS, 1.0);

				return Err(CacheError::NotFound);
			}
		};

		if entry.is_stale(clock::now()) {
			self.log_debug("cache key expired", &[("name", &self.config.name)]);
			self.metric_add(METRIC_EXPIRED, 1.0);

			return Err(CacheError::Expired {
				stale: entry.value().clone(),
				expired_at: clock::to_system_time(entry.expire_at()),
			});
		}

		self.metric_add(METRIC_HIT, 1.0);
		self.log_debug("cache hit", &[("name", &self.config.name), ("entry", entry)]);

		Ok(entry.value().clone())
	}

	pub fn notify_written<T: CacheValue>(&self, key: &[u8], value: &T, ttl: Option<Duration>) {
		if let Some(log) = &self.config.logger {
			let key = key_lossy(key);
			let fields: [(&str, &dyn fmt::Debug); 4] = [
				("name", &self.config.name),
				("key", &key),
				("value", value),
				("ttl", &ttl),
			];
			log.debug("wrote to cache", &fields);
		}

		self.metric_add(METRIC_WRITE, 1.0);
	}

	pub fn notify_deleted(&self, key: &[u8]) {
		if let Some(log) = &self.config.logger {
			let key = key_lossy(key);
			let fields: [(&str, &dyn fmt::Debug); 2] = [("name", &self.config.name), ("key", &key)];
			log.debug("deleted cache entry", &fields);
		}

		self.metric_add(METRIC_DELETE, 1.0);
	}

	pub fn notify_expired_all(&self, start: Instant, count: usize) {
		self.log_important(
			"expired all entries in cache",
			&[
				("name", &self.config.name),
				("elapsed", &start.elapsed()),
				("count", &count),
			],
		);
		self.metric_add(METRIC_EXPIRED, count as f64);
	}

	pub fn notify_deleted_all(&self, start: Instant, count: usize) {
		self.log_important(
			"deleted all entries in cache",
			&[
				("name", &self.config.name),
				("elapsed", &start.elapsed()),
				("count", &count),
			],
		);
		self.metric_add(METRIC_DELETE, count as f64);
	}

	fn heap_overflow(&self) -> bool {
		self.config.heap_in_use_soft_limit > 0
			&& self.config.pressure.heap_in_use() >= self.config.heap_in_use_soft_limit
	}

	fn count_overflow(&self, len: usize) -> bool {
		self.config.count_soft_limit > 0 && len >= self.config.count_soft_limit
	}

	fn log_debug(&self, event: &str, fields: Fields<'_>) {
		if let Some(log) = &self.config.logger {
			log.debug(event, fields);
		}
	}

	fn log_important(&self, event: &str, fields: Fields<'_>) {
		if let Some(log) = &self.config.logger {
			log.important(event, fields);
		}
	}

	fn metric_add(&self, metric: &'static str, delta: f64) {
		if let Some(stats) = &self.config.metrics {
			stats.add(metric, delta, &[("name", self.config.name.as_str())]);
		}
	}

	fn metric_set(&self, metric: &'static str, value: f64) {
		if let Some(stats) = &self.config.metrics {
			stats.set(metric, value, &[("name", self.config.name.as_str())]);
		}
	}
}

/// Start the janitor and, when a metrics sink is configured, the
/// items-count reporter. Both select over their tick channel and the
/// shutdown receiver; dropping the matching sender is the one-shot
/// shutdown broadcast.
pub(crate) fn spawn_workers<B: Backend>(
	core: &Arc<CacheCore>,
	backend: &Arc<B>,
	shutdown: &Receiver<()>,
) -> Vec<JoinHandle<()>> {
	let mut workers = Vec::with_capacity(2);

	let janitor_core = Arc::clone(core);
	let janitor_backend = Arc::clone(backend);
	let janitor_shutdown = shutdown.clone();
	workers.push(
		thread::Builder::new()
			.name(thread_label(&core.config().name, "janitor"))
			.spawn(move || janitor(janitor_core, janitor_backend, janitor_shutdown))
			.expect("failed to spawn cache janitor thread"),
	);

	if core.config().metrics.is_some() {
		let reporter_core = Arc::clone(core);
		let reporter_backend = Arc::clone(backend);
		let reporter_shutdown = shutdown.clone();
		workers.push(
			thread::Builder::new()
				.name(thread_label(&core.config().name, "items"))
				.spawn(move || report_items_count(reporter_core, reporter_backend, reporter_shutdown))
				.expect("failed to spawn items count reporter thread"),
		);
	}

	workers
}

fn thread_label(name: &str, role: &str) -> String {
	if name.is_empty() {
		format!("stale-cache-{role}")
	} else {
		format!("{name}-{role}")
	}
}

fn janitor<B: Backend>(core: Arc<CacheCore>, backend: Arc<B>, shutdown: Receiver<()>) {
	let ticker = tick(core.config().delete_expired_job_interval);

	loop {
		select! {
			recv(ticker) -> _ => {
				backend.delete_expired(clock::cutoff(core.config().delete_expired_after));

				if core.heap_overflow() || core.count_overflow(backend.len()) {
					let evicted = backend.evict_oldest(core.config().evict_fraction);

					core.log_important(
						"evicted oldest entries",
						&[("name", &core.config().name), ("count", &evicted)],
					);
					core.metric_add(METRIC_EVICT, evicted as f64);
				}
			}
			recv(shutdown) -> _ => {
				core.log_debug("closing cache janitor", &[("name", &core.config().name)]);

				return;
			}
		}
	}
}

fn report_items_count<B: Backend>(core: Arc<CacheCore>, backend: Arc<B>, shutdown: Receiver<()>) {
	let ticker = tick(core.config().items_count_report_interval);

	loop {
		select! {
			recv(ticker) -> _ => {
				let count = backend.len();

				core.log_debug(
					"cache items count",
					&[("name", &core.config().name), ("count", &count)],
				);
				core.metric_set(METRIC_ITEMS, count as f64);
			}
			recv(shutdown) -> _ => {
				core.log_debug(
					"closing items count reporter",
					&[("name", &core.config().name)],
				);
				core.metric_set(METRIC_ITEMS, backend.len() as f64);

				return;
			}
		}
	}
}
