use std::fmt;

/// Counter incremented on successful reads.
pub const METRIC_HIT: &str = "hit";
/// Counter incremented on reads of absent keys.
pub const METRIC_MISS: &str = "miss";
/// Counter incremented on reads of stale entries and on bulk expiry.
pub const METRIC_EXPIRED: &str = "expired";
/// Counter incremented on writes.
pub const METRIC_WRITE: &str = "write";
/// Counter incremented on deletes, including bulk deletion.
pub const METRIC_DELETE: &str = "delete";
/// Counter incremented with the number of entries dropped per eviction pass.
pub const METRIC_EVICT: &str = "evict";
/// Gauge reporting the current entry count.
pub const METRIC_ITEMS: &str = "items";

/// Flat key-value attributes attached to a log event.
pub type Fields<'a> = &'a [(&'a str, &'a dyn fmt::Debug)];

/// Structured log capability supplied by the caller.
///
/// Two levels only: `debug` for per-operation traces and `important`
/// for bulk operations. Sites pass the cache name as a field; with no
/// sink configured every site is a no-op.
pub trait LogSink: Send + Sync + 'static {
	fn debug(&self, event: &str, fields: Fields<'_>);
	fn important(&self, event: &str, fields: Fields<'_>);
}

/// Metrics capability supplied by the caller: counters and gauges with
/// flat string labels.
pub trait MetricsSink: Send + Sync + 'static {
	fn add(&self, metric: &str, delta: f64, labels: &[(&str, &str)]);
	fn set(&self, metric: &str, value: f64, labels: &[(&str, &str)]);
}

/// [`LogSink`] adapter emitting through `tracing`.
///
/// `debug` maps to `tracing::debug!`, `important` to `tracing::info!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLog;

impl LogSink for TracingLog {
	fn debug(&self, event: &str, fields: Fields<'_>) {
		tracing::debug!(fields = %format_fields(fields), "{}", event);
	}

	fn important(&self, event: &str, fields: Fields<'_>) {
		tracing::info!(fields = %format_fields(fields), "{}", event);
	}
}

fn format_fields(fields: Fields<'_>) -> String {
	let mut out = String::new();

	for (i, (key, value)) in fields.iter().enumerate() {
		if i > 0 {
			out.push(' ');
		}
		out.push_str(key);
		out.push('=');
		out.push_str(&format!("{:?}", value));
	}

	out
}
