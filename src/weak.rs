use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use crate::actor::Actor;
use crate::error::CallError;
use crate::exit::ExitReason;
use crate::link::ActorId;
use crate::link::ActorRef;
use crate::link::DynamicLink;
use crate::link::Link;
use crate::link::LinkState;

/// Non-owning handle. Does not keep the actor alive.
pub struct WeakLink<A: Actor> {
	id: ActorId,
	state: Weak<LinkState<A>>,
}

impl<A: Actor> Clone for WeakLink<A> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			state: self.state.clone(),
		}
	}
}

impl<A: Actor> WeakLink<A> {
	pub fn id(&self) -> ActorId {
		self.id
	}

	pub fn upgrade(&self) -> Option<Link<A>> {
		self.state.upgrade().map(|state| Link { state })
	}

	pub(crate) fn as_dyn(&self) -> Weak<dyn DynamicLink> {
		self.state.clone() as Weak<dyn DynamicLink>
	}

	pub fn cast(&self, msg: A::Cast) {
		if let Some(link) = self.upgrade() {
			link.cast(msg);
		}
	}

	pub async fn call(&self, msg: A::Call, timeout: Duration) -> Result<A::Reply, CallError> {
		match self.upgrade() {
			Some(link) => link.call(msg, timeout).await,
			None => Err(CallError::NoProc),
		}
	}

	#[track_caller]
	pub fn stop(&self, reason: ExitReason) {
		if let Some(link) = self.upgrade() {
			link.stop(reason);
		}
	}
}

impl<A: Actor> Link<A> {
	pub fn downgrade(&self) -> WeakLink<A> {
		WeakLink {
			id: self.id(),
			state: Arc::downgrade(&self.state),
		}
	}
}

/// Non-owning untyped handle.
#[derive(Clone)]
pub struct WeakRef {
	id: ActorId,
	state: Weak<dyn DynamicLink>,
}

impl WeakRef {
	pub fn id(&self) -> ActorId {
		self.id
	}

	pub fn upgrade(&self) -> Option<ActorRef> {
		self.state.upgrade().map(|state| ActorRef { state })
	}

	#[track_caller]
	pub fn stop(&self, reason: ExitReason) {
		if let Some(actor) = self.upgrade() {
			actor.stop(reason);
		}
	}
}

impl ActorRef {
	pub fn downgrade(&self) -> WeakRef {
		WeakRef {
			id: self.id(),
			state: Arc::downgrade(&self.state),
		}
	}
}

impl<A: Actor> From<WeakLink<A>> for WeakRef {
	fn from(link: WeakLink<A>) -> Self {
		WeakRef {
			id: link.id,
			state: link.as_dyn(),
		}
	}
}
