use std::any::Any;
use std::fmt::Debug;

use tokio::sync::oneshot;

use crate::actor::Actor;
use crate::error::CallError;
use crate::exit::ExitReason;
use crate::link::ActorId;

pub(crate) type ReplyTx<R> = oneshot::Sender<Result<R, CallError>>;

/// A mailbox entry.
///
/// The sender builds the envelope and gives up ownership on send. A `Call`
/// carries the caller's reply address; the reply goes back there and
/// nowhere else.
pub enum Envelope<A: Actor> {
	Call { msg: A::Call, reply: ReplyTx<A::Reply> },
	Cast(A::Cast),
	Info(Info),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
	Call,
	Cast,
	Info,
}

impl<A: Actor> Envelope<A> {
	pub(crate) fn call(msg: A::Call) -> (Self, oneshot::Receiver<Result<A::Reply, CallError>>) {
		let (reply, rx) = oneshot::channel();
		(Envelope::Call { msg, reply }, rx)
	}

	pub fn kind(&self) -> MessageKind {
		match self {
			Envelope::Call { .. } => MessageKind::Call,
			Envelope::Cast(_) => MessageKind::Cast,
			Envelope::Info(_) => MessageKind::Info,
		}
	}
}

impl<A: Actor> Debug for Envelope<A> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("Envelope").field(&self.kind()).finish()
	}
}

/// Out-of-band notifications.
pub enum Info {
	/// A watched actor terminated.
	Exit { id: ActorId, reason: ExitReason },
	/// An arbitrary payload sent with `Link::info`.
	User(Box<dyn Any + Send>),
}

impl Info {
	pub fn user<T: Any + Send>(payload: T) -> Self {
		Info::User(Box::new(payload))
	}

	pub fn downcast<T: Any>(self) -> Result<T, Self> {
		match self {
			Info::User(payload) => payload.downcast::<T>().map(|b| *b).map_err(Info::User),
			other => Err(other),
		}
	}
}

impl Debug for Info {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Info::Exit { id, reason } => f
				.debug_struct("Exit")
				.field("id", id)
				.field("reason", reason)
				.finish(),
			Info::User(_) => f.write_str("User(..)"),
		}
	}
}
