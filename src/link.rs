use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Weak;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use downcast_rs::DowncastSync;
use downcast_rs::impl_downcast;
use tokio::task::AbortHandle;

use crate::actor::Actor;
use crate::call::PendingCall;
use crate::envelope::Envelope;
use crate::envelope::Info;
use crate::error::CallError;
use crate::exit::ExitReason;
use crate::lifecycle::Lifecycle;
use crate::mailbox::MailboxSender;
use crate::stop::StopToken;

/// Identity of one actor incarnation. A restarted child gets a new id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ActorId {
	pub(crate) fn next() -> Self {
		ActorId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
	}

	pub fn as_u64(&self) -> u64 {
		self.0
	}
}

impl fmt::Display for ActorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

impl fmt::Debug for ActorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

pub(crate) struct LinkState<A: Actor> {
	pub(crate) tx: MailboxSender<A>,
	pub(crate) token: StopToken,
	pub(crate) life: Arc<Lifecycle>,
	pub(crate) abort: OnceLock<AbortHandle>,
}

/// Strong, typed handle to a running actor.
///
/// The actor keeps running while at least one strong handle (a `Link`, an
/// `ActorRef` or a registry entry) exists. Once the last one is dropped its
/// mailbox closes and it exits with `Normal`.
pub struct Link<A: Actor> {
	pub(crate) state: Arc<LinkState<A>>,
}

impl<A: Actor> Clone for Link<A> {
	fn clone(&self) -> Self {
		Self {
			state: self.state.clone(),
		}
	}
}

impl<A: Actor> fmt::Debug for Link<A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Link")
			.field("id", &self.state.life.id)
			.field("kind", &self.state.life.kind)
			.finish()
	}
}

impl<A: Actor> Link<A> {
	pub(crate) fn new(tx: MailboxSender<A>, token: StopToken, life: Arc<Lifecycle>) -> Self {
		Self {
			state: Arc::new(LinkState {
				tx,
				token,
				life,
				abort: OnceLock::new(),
			}),
		}
	}

	pub(crate) fn set_abort(&self, handle: AbortHandle) {
		let _ = self.state.abort.set(handle);
	}

	pub fn id(&self) -> ActorId {
		self.state.life.id
	}

	pub fn alive(&self) -> bool {
		!self.state.life.is_exited() && !self.state.tx.is_closed()
	}

	/// Sends a call and waits up to `timeout` for the reply.
	///
	/// Delivery is at most once. After a `CallError::Timeout` the actor may
	/// still process the message; callers must not assume it was dropped.
	pub async fn call(&self, msg: A::Call, timeout: Duration) -> Result<A::Reply, CallError> {
		self.request(msg).timeout(timeout).reply().await
	}

	/// Enqueues a call and returns a handle to collect the reply later.
	pub fn request(&self, msg: A::Call) -> PendingCall<A::Reply> {
		let (envelope, rx) = Envelope::call(msg);
		match self.state.tx.send(envelope) {
			Ok(()) => PendingCall::sent(rx, self.state.life.clone()),
			Err(_) => PendingCall::failed(),
		}
	}

	/// Fire and forget. The message is dropped if the actor is gone.
	pub fn cast(&self, msg: A::Cast) {
		if self.state.tx.send(Envelope::Cast(msg)).is_err() {
			tracing::trace!(id = %self.id(), "cast to a stopped actor dropped");
		}
	}

	/// Delivers an out-of-band `Info::User` payload.
	pub fn info<T: Any + Send>(&self, payload: T) {
		let _ = self.state.tx.send(Envelope::Info(Info::user(payload)));
	}

	/// Asks the actor to stop after its current step.
	#[track_caller]
	pub fn stop(&self, reason: ExitReason) {
		self.state.token.stop(reason);
	}

	pub async fn stop_and_wait(&self, reason: ExitReason) -> ExitReason {
		self.state.token.stop(reason);
		self.wait_exit().await
	}

	/// Aborts the actor task at its next await point. `terminate` does not run.
	pub fn kill(&self) {
		kill(&self.state.abort, &self.state.token);
	}

	pub async fn wait_exit(&self) -> ExitReason {
		self.state.life.exited().await
	}

	pub fn exit_reason(&self) -> Option<ExitReason> {
		self.state.life.exit_reason()
	}

	/// Makes this actor receive `Info::Exit` when `target` exits.
	pub fn watch(&self, target: &ActorRef) {
		let weak: Weak<dyn DynamicLink> = Arc::downgrade(&self.state) as Weak<dyn DynamicLink>;
		target.state.life().add_watcher(self.id(), weak);
	}

	pub fn unwatch(&self, target: &ActorRef) {
		target.state.life().remove_watcher(self.id());
	}

	pub fn to_ref(&self) -> ActorRef {
		ActorRef {
			state: self.state.clone(),
		}
	}
}

fn kill(abort: &OnceLock<AbortHandle>, token: &StopToken) {
	match abort.get() {
		Some(handle) => handle.abort(),
		None => {
			token.stop(ExitReason::Killed);
		}
	}
}

/// Type-erased view of a `LinkState`, shared by `ActorRef` and the
/// registry.
pub(crate) trait DynamicLink: DowncastSync {
	fn life(&self) -> &Arc<Lifecycle>;
	fn token(&self) -> &StopToken;
	fn deliver(&self, info: Info) -> bool;
	fn kill(&self);
	fn mailbox_closed(&self) -> bool;
}

impl_downcast!(sync DynamicLink);

impl<A: Actor> DynamicLink for LinkState<A> {
	fn life(&self) -> &Arc<Lifecycle> {
		&self.life
	}

	fn token(&self) -> &StopToken {
		&self.token
	}

	fn deliver(&self, info: Info) -> bool {
		self.tx.send(Envelope::Info(info)).is_ok()
	}

	fn kill(&self) {
		kill(&self.abort, &self.token);
	}

	fn mailbox_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Untyped handle to an actor of any type.
#[derive(Clone)]
pub struct ActorRef {
	pub(crate) state: Arc<dyn DynamicLink>,
}

impl fmt::Debug for ActorRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorRef")
			.field("id", &self.id())
			.field("kind", &self.kind())
			.finish()
	}
}

impl<A: Actor> From<Link<A>> for ActorRef {
	fn from(link: Link<A>) -> Self {
		ActorRef { state: link.state }
	}
}

impl ActorRef {
	pub fn id(&self) -> ActorId {
		self.state.life().id
	}

	/// Short type name of the actor behind this handle.
	pub fn kind(&self) -> &'static str {
		self.state.life().kind
	}

	pub fn alive(&self) -> bool {
		!self.state.life().is_exited() && !self.state.mailbox_closed()
	}

	#[track_caller]
	pub fn stop(&self, reason: ExitReason) {
		self.state.token().stop(reason);
	}

	pub async fn stop_and_wait(&self, reason: ExitReason) -> ExitReason {
		self.state.token().stop(reason);
		self.wait_exit().await
	}

	pub fn kill(&self) {
		self.state.kill();
	}

	pub fn info<T: Any + Send>(&self, payload: T) {
		let _ = self.state.deliver(Info::user(payload));
	}

	pub async fn wait_exit(&self) -> ExitReason {
		self.state.life().exited().await
	}

	pub fn exit_reason(&self) -> Option<ExitReason> {
		self.state.life().exit_reason()
	}

	/// Makes the actor behind `self` receive `Info::Exit` when `target` exits.
	pub fn watch(&self, target: &ActorRef) {
		let weak = Arc::downgrade(&self.state);
		target.state.life().add_watcher(self.id(), weak);
	}

	pub fn unwatch(&self, target: &ActorRef) {
		target.state.life().remove_watcher(self.id());
	}

	pub fn is<A: Actor>(&self) -> bool {
		self.state.is::<LinkState<A>>()
	}

	pub fn downcast<A: Actor>(&self) -> Option<Link<A>> {
		self.state
			.clone()
			.downcast_arc::<LinkState<A>>()
			.ok()
			.map(|state| Link { state })
	}

	pub(crate) fn life(&self) -> &Arc<Lifecycle> {
		self.state.life()
	}
}
