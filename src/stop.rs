use std::fmt::Debug;
use std::panic::Location;
use std::sync::Arc;

use tokio::sync::watch;

use crate::exit::ExitReason;

/// A stop request together with the place it was issued from.
#[derive(Debug, Clone)]
pub struct StopRequest {
	pub reason: ExitReason,
	pub location: &'static Location<'static>,
}

/// Out-of-band stop signal for one actor.
///
/// The first request wins; later requests are ignored. The actor loop polls
/// the token between steps only, so a step in progress always completes.
#[derive(Clone)]
pub struct StopToken {
	state: Arc<watch::Sender<Option<StopRequest>>>,
}

impl Default for StopToken {
	fn default() -> Self {
		Self::new()
	}
}

impl Debug for StopToken {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("StopToken")
			.field("state", &*self.state.borrow())
			.finish()
	}
}

impl StopToken {
	pub fn new() -> Self {
		StopToken {
			state: Arc::new(watch::Sender::new(None)),
		}
	}

	/// Returns `true` if this call was the one that stopped the token.
	#[track_caller]
	pub fn stop(&self, reason: ExitReason) -> bool {
		let location = Location::caller();
		self.state.send_if_modified(|state| match state {
			None => {
				*state = Some(StopRequest { reason, location });
				true
			}
			// do not re-stop
			Some(_) => false,
		})
	}

	pub fn is_stopped(&self) -> bool {
		self.state.borrow().is_some()
	}

	pub fn request(&self) -> Option<StopRequest> {
		self.state.borrow().clone()
	}

	pub async fn stopped(&self) -> StopRequest {
		let mut recv = self.state.subscribe();
		let request = {
			let result = recv.wait_for(Option::is_some).await;
			match result {
				Ok(state) => (*state).clone(),
				Err(_) => None,
			}
		};

		// the sender lives as long as `self`, so `wait_for` cannot fail here
		match request {
			Some(request) => request,
			None => std::future::pending().await,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn first_stop_wins() {
		let token = StopToken::new();
		assert!(!token.is_stopped());
		assert!(token.stop(ExitReason::Shutdown));
		assert!(!token.stop(ExitReason::Killed));

		let request = token.stopped().await;
		assert!(matches!(request.reason, ExitReason::Shutdown));
		assert!(request.location.file().ends_with("stop.rs"));
	}

	#[tokio::test]
	async fn stopped_wakes_waiters() {
		let token = StopToken::new();
		let waiter = tokio::spawn({
			let token = token.clone();
			async move { token.stopped().await.reason }
		});

		tokio::task::yield_now().await;
		token.stop(ExitReason::Cancelled);
		let reason = waiter.await.unwrap();
		assert!(matches!(reason, ExitReason::Cancelled));
	}
}
