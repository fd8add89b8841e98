//! Periodic and lifecycle-triggered token cleanup.
//!
//! The housekeeper removes *truly expired* tokens (never merely expiring-soon ones) and
//! drives a pre-emptive refresh when the access token will expire within the configured
//! buffer, hiding refresh latency from the user. It mutates the store through the same
//! [`TokenStore`] choke point as the coordinator.

// self
use crate::{
	_prelude::*,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::RefreshCoordinator,
	store::{StoreError, TokenStore},
	token::{claims, TokenSecret},
};

/// Sweeps expired tokens and refreshes pre-emptively on a fixed interval.
#[derive(Clone)]
pub struct Housekeeper {
	store: TokenStore,
	coordinator: RefreshCoordinator,
	buffer: Duration,
	interval: Duration,
}
impl Housekeeper {
	/// Creates a housekeeper over the shared store and coordinator.
	pub fn new(
		store: TokenStore,
		coordinator: RefreshCoordinator,
		buffer: Duration,
		interval: Duration,
	) -> Self {
		Self { store, coordinator, buffer, interval }
	}

	/// Removes expired tokens; clears the metadata record once both slots are gone.
	///
	/// Cheap and idempotent: safe to run before every outbound request.
	pub async fn sweep_expired(&self) -> Result<(), StoreError> {
		let now = OffsetDateTime::now_utc();
		let mut access = self.store.access().await?;
		let mut refresh = self.store.refresh().await?;

		if access.is_some() && claims::is_expired_at(access.as_ref(), now) {
			self.store.remove_access().await?;

			access = None;
		}
		if refresh.is_some() && claims::is_expired_at(refresh.as_ref(), now) {
			self.store.remove_refresh().await?;

			refresh = None;
		}
		if access.is_none() && refresh.is_none() {
			self.store.remove_metadata().await?;
		}

		Ok(())
	}

	/// Refreshes proactively when a valid access token expires within the buffer window.
	///
	/// Returns the fresh token when a refresh ran, `None` when nothing needed doing.
	pub async fn maybe_preemptive_refresh(&self) -> Result<Option<TokenSecret>> {
		let now = OffsetDateTime::now_utc();
		let access = self.store.access().await?;

		let Some(access) = access else { return Ok(None) };

		if claims::is_expired_at(Some(&access), now)
			|| !claims::is_expiring_soon_at(Some(&access), self.buffer, now)
		{
			return Ok(None);
		}
		if self.store.refresh().await?.is_none() {
			return Ok(None);
		}

		self.coordinator.ensure_fresh_token().await.map(Some)
	}

	/// Runs one full housekeeping pass: sweep, then pre-emptive refresh.
	pub async fn run_once(&self) {
		const KIND: FlowKind = FlowKind::Sweep;

		let span = FlowSpan::new(KIND, "run_once");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let outcome = span
			.instrument(async {
				self.sweep_expired().await?;
				self.maybe_preemptive_refresh().await?;

				Ok::<_, Error>(())
			})
			.await;

		match outcome {
			Ok(()) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_error) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				#[cfg(feature = "tracing")]
				tracing::warn!(error = %_error, "housekeeping pass failed");
			},
		}
	}

	/// Runs forever: one pass immediately, then one per configured interval.
	///
	/// Intended to be `tokio::spawn`ed at process start.
	pub async fn run(self) {
		let period = std::time::Duration::try_from(self.interval)
			.unwrap_or(std::time::Duration::from_secs(60));
		let mut ticker = tokio::time::interval(period);

		loop {
			ticker.tick().await;
			self.run_once().await;
		}
	}

	/// Best-effort cleanup of definitely-expired tokens at shutdown.
	pub async fn shutdown_sweep(&self) {
		let _ = self.sweep_expired().await;
	}
}
impl Debug for Housekeeper {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Housekeeper")
			.field("buffer", &self.buffer)
			.field("interval", &self.interval)
			.finish()
	}
}
