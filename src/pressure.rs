/// Memory pressure probe consulted by the janitor.
///
/// The heap soft limit compares against whatever this reports; the
/// default implementation measures the whole process, which is a coarse
/// but workable signal for single-tenant services. Inject a custom
/// source to scope the measurement or to fake it in tests.
pub trait PressureSource: Send + Sync + 'static {
	/// Approximate bytes of memory currently in use.
	fn heap_in_use(&self) -> u64;
}

/// Default probe: resident set size of the current process.
///
/// Reads `VmRSS` from `/proc/self/status`; reports 0 on platforms
/// without procfs, which disables the heap soft limit there.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRss;

impl PressureSource for ProcessRss {
	fn heap_in_use(&self) -> u64 {
		resident_bytes()
	}
}

#[cfg(target_os = "linux")]
fn resident_bytes() -> u64 {
	std::fs::read_to_string("/proc/self/status")
		.ok()
		.and_then(|status| {
			status
				.lines()
				.find(|line| line.starts_with("VmRSS:"))
				.and_then(|line| line.split_whitespace().nth(1))
				.and_then(|kb| kb.parse::<u64>().ok())
				.map(|kb| kb * 1024)
		})
		.unwrap_or(0)
}

#[cfg(not(target_os = "linux"))]
fn resident_bytes() -> u64 {
	0
}

/// Fixed reading, for tests and for callers doing their own accounting.
#[derive(Debug, Clone, Copy)]
pub struct FixedPressure(pub u64);

impl PressureSource for FixedPressure {
	fn heap_in_use(&self) -> u64 {
		self.0
	}
}
