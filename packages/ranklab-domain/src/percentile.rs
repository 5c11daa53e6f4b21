use serde::{Deserialize, Serialize};

/// Latency percentiles stored on an execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
	pub took_p50: f64,
	pub took_p95: f64,
	pub took_p99: f64,
}
impl LatencySummary {
	pub fn from_samples(samples_ms: &[f64]) -> Self {
		let values = percentiles(samples_ms, &[0.50, 0.95, 0.99]);

		Self { took_p50: values[0], took_p95: values[1], took_p99: values[2] }
	}
}

/// Computes each requested quantile (`0.0..=1.0`) with linear interpolation between neighbours.
///
/// An empty sample set yields 0 for every quantile.
pub fn percentiles(values: &[f64], ps: &[f64]) -> Vec<f64> {
	let mut sorted = values.to_vec();

	sorted.sort_by(f64::total_cmp);

	ps.iter().map(|p| percentile_sorted(&sorted, *p)).collect()
}

pub fn percentiles_by<T, F>(items: &[T], accessor: F, ps: &[f64]) -> Vec<f64>
where
	F: Fn(&T) -> f64,
{
	let values: Vec<f64> = items.iter().map(accessor).collect();

	percentiles(&values, ps)
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
	if sorted.is_empty() {
		return 0.0;
	}

	let clamped = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
	let pos = clamped * (sorted.len() as f64 - 1.0);
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;

	if lower == upper {
		sorted[lower]
	} else {
		let weight = pos - lower as f64;

		sorted[lower] * (1.0 - weight) + sorted[upper] * weight
	}
}
