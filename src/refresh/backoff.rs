//! Exponential backoff with uniform jitter for refresh retries.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Backoff policy: `delay = min(max_delay, base_delay * 2^(attempt - 1)) * (1 ± jitter)`.
///
/// The jitter desynchronizes concurrent clients retrying after a shared failure so the
/// refresh endpoint never sees a thundering herd.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
	/// Delay for the first retry.
	pub base_delay: Duration,
	/// Upper bound for the exponential ramp.
	pub max_delay: Duration,
	/// Uniform jitter factor within `[0, 1)`.
	pub jitter_factor: f64,
}
impl BackoffPolicy {
	/// Creates a policy with the provided delays and the default jitter factor.
	pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
		Self { base_delay, max_delay, ..Default::default() }
	}

	/// Overrides the jitter factor.
	pub fn with_jitter_factor(mut self, jitter_factor: f64) -> Self {
		self.jitter_factor = jitter_factor;

		self
	}

	/// Computes the unjittered delay for the 1-based attempt number.
	pub fn raw_delay(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1).min(30);
		let millis = self
			.base_delay
			.whole_milliseconds()
			.clamp(0, i128::from(i64::MAX)) as i64;
		let ramped = millis.saturating_mul(1_i64 << exponent);

		Duration::milliseconds(ramped).min(self.max_delay)
	}

	/// Computes the jittered delay for the 1-based attempt number.
	pub fn jittered_delay(&self, attempt: u32) -> Duration {
		let raw = self.raw_delay(attempt);

		if self.jitter_factor <= 0.0 {
			return raw;
		}

		let factor =
			1.0 + rand::rng().random_range(-self.jitter_factor..=self.jitter_factor);
		let millis = (raw.whole_milliseconds() as f64 * factor).max(0.0);

		Duration::milliseconds(millis as i64)
	}

	/// [`jittered_delay`](Self::jittered_delay) converted for timer APIs.
	pub fn jittered_delay_std(&self, attempt: u32) -> std::time::Duration {
		std::time::Duration::try_from(self.jittered_delay(attempt)).unwrap_or_default()
	}
}
impl Default for BackoffPolicy {
	fn default() -> Self {
		Self {
			base_delay: Duration::milliseconds(1_000),
			max_delay: Duration::milliseconds(10_000),
			jitter_factor: 0.1,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn raw_delay_doubles_until_the_cap() {
		let policy = BackoffPolicy::default();

		assert_eq!(policy.raw_delay(1), Duration::milliseconds(1_000));
		assert_eq!(policy.raw_delay(2), Duration::milliseconds(2_000));
		assert_eq!(policy.raw_delay(3), Duration::milliseconds(4_000));
		assert_eq!(policy.raw_delay(4), Duration::milliseconds(8_000));
		assert_eq!(policy.raw_delay(5), Duration::milliseconds(10_000));
		assert_eq!(policy.raw_delay(64), Duration::milliseconds(10_000));
	}

	#[test]
	fn jittered_delay_stays_within_the_band() {
		let policy = BackoffPolicy::default();

		for attempt in 1..=5 {
			let raw = policy.raw_delay(attempt).whole_milliseconds() as f64;

			for _ in 0..32 {
				let jittered = policy.jittered_delay(attempt).whole_milliseconds() as f64;

				assert!(jittered >= raw * 0.9 - 1.0, "Jitter fell below the -10% band.");
				assert!(jittered <= raw * 1.1 + 1.0, "Jitter rose above the +10% band.");
			}
		}
	}

	#[test]
	fn zero_jitter_is_deterministic() {
		let policy = BackoffPolicy::default().with_jitter_factor(0.0);

		assert_eq!(policy.jittered_delay(3), policy.raw_delay(3));
	}
}
