use std::any::type_name;
use std::future::Future;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt as _;
use take_once::TakeOnce;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::envelope::Envelope;
use crate::envelope::Info;
use crate::envelope::ReplyTx;
use crate::error::ActorError;
use crate::error::CallError;
use crate::error::StartError;
use crate::exit::ExitReason;
use crate::handler::Call;
use crate::handler::Exec;
use crate::lifecycle::Lifecycle;
use crate::link::ActorId;
use crate::link::ActorRef;
use crate::link::Link;
use crate::mailbox;
use crate::mailbox::Mailbox;
use crate::stop::StopToken;
use crate::weak::WeakLink;

/// Runtime context for an active actor instance.
///
/// Owned by the actor task. Handlers reach it through `Exec` and `Call`.
pub struct Context<A: Actor> {
	pub(crate) mailbox: Mailbox<A>,
	pub(crate) token: StopToken,
	pub(crate) tasks: JoinSet<()>,
	pub(crate) span: tracing::Span,
	pub(crate) link: WeakLink<A>,
	pub(crate) life: Arc<Lifecycle>,
	pub(crate) pending: Option<A::Continue>,
}

impl<A: Actor> Context<A> {
	pub fn id(&self) -> ActorId {
		self.life.id
	}

	pub fn link(&self) -> &WeakLink<A> {
		&self.link
	}

	pub fn span(&self) -> &tracing::Span {
		&self.span
	}

	/// Number of messages waiting in the mailbox.
	pub fn backlog(&self) -> usize {
		self.mailbox.len()
	}

	/// Number of background tasks that have not been reaped yet.
	pub fn background(&self) -> usize {
		self.tasks.len()
	}

	/// Spawn a background task within the actor's context.
	///
	/// The task is aborted when the actor shuts down.
	pub fn spawn(&mut self, future: impl Future<Output = ()> + Send + 'static) {
		self.tasks.spawn(future.instrument(self.span.clone()));
	}

	/// Schedules `token` to be handled by `handle_continue` before the next
	/// mailbox entry.
	pub fn continue_with(&mut self, token: A::Continue) {
		self.pending = Some(token);
	}

	/// Stops the actor once the current step returns.
	#[track_caller]
	pub fn stop(&self, reason: ExitReason) {
		self.token.stop(reason);
	}

	/// Delivers `Info::Exit` to this actor when `target` exits.
	pub fn watch(&self, target: &ActorRef) {
		target.life().add_watcher(self.id(), self.link.as_dyn());
	}

	pub fn unwatch(&self, target: &ActorRef) {
		target.life().remove_watcher(self.id());
	}
}

/// Initialization context provided to actors during startup.
pub struct Init<'a, A: Actor> {
	/// Start arguments.
	pub args: A::Args,
	/// A strong link to the actor being initialized. Keeping it inside the
	/// actor's own state keeps the actor alive until it is stopped.
	pub link: Link<A>,
	pub ctx: &'a mut Context<A>,
}

/// Successful outcome of `Actor::init`.
pub struct Startup<A: Actor> {
	state: A,
	next: Option<A::Continue>,
}

impl<A: Actor> Startup<A> {
	pub fn ready(state: A) -> Self {
		Self { state, next: None }
	}

	/// Starts with a follow-up step that runs before any message, after
	/// `start` has already returned to its caller.
	pub fn continue_with(state: A, token: A::Continue) -> Self {
		Self {
			state,
			next: Some(token),
		}
	}
}

pub type InitResult<A> = Result<Startup<A>, ExitReason>;

/// What to do with a message the actor has no handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmatched {
	/// Log and drop it. Unhandled calls are answered with `CallError::Unhandled`.
	Discard,
	/// Treat it as a fatal error for the actor.
	Crash,
}

pub trait Actor: Sized + Send + 'static {
	type Args: Send + 'static;
	type Call: Send + 'static;
	type Reply: Send + 'static;
	type Cast: Send + 'static;
	type Continue: Send + 'static;

	const UNMATCHED: Unmatched = Unmatched::Discard;

	fn span(_args: &Self::Args) -> tracing::Span {
		tracing::info_span!("actor", kind = short_name::<Self>(), id = tracing::field::Empty)
	}

	/// Builds the initial state, or refuses to start with a reason.
	fn init(ctx: Init<'_, Self>) -> impl Future<Output = InitResult<Self>> + Send;

	fn handle_continue(
		&mut self,
		_ctx: Exec<'_, Self>,
		_token: Self::Continue,
	) -> impl Future<Output = anyhow::Result<()>> + Send {
		futures::future::ready(Err(ActorError::Unhandled.into()))
	}

	fn handle_call(
		&mut self,
		_ctx: Call<'_, Self>,
		_msg: Self::Call,
	) -> impl Future<Output = anyhow::Result<Self::Reply>> + Send {
		futures::future::ready(Err(ActorError::Unhandled.into()))
	}

	fn handle_cast(
		&mut self,
		_ctx: Exec<'_, Self>,
		_msg: Self::Cast,
	) -> impl Future<Output = anyhow::Result<()>> + Send {
		futures::future::ready(Err(ActorError::Unhandled.into()))
	}

	fn handle_info(
		&mut self,
		_ctx: Exec<'_, Self>,
		_info: Info,
	) -> impl Future<Output = anyhow::Result<()>> + Send {
		futures::future::ready(Err(ActorError::Unhandled.into()))
	}

	/// Cleanup hook. Runs exactly once on every exit except `kill`.
	fn terminate(
		self,
		_ctx: &mut Context<Self>,
		_reason: &ExitReason,
	) -> impl Future<Output = ()> + Send {
		futures::future::ready(())
	}

	/// Spawns the actor and waits for `init` to finish.
	///
	/// Either a live handle comes back or nothing was created: a refusing
	/// or panicking initializer leaves no actor behind.
	fn start(args: Self::Args) -> impl Future<Output = Result<Link<Self>, StartError>> + Send {
		spawn::<Self>(args, None)
	}
}

pub(crate) fn short_name<T>() -> &'static str {
	let name = type_name::<T>();
	let base = name.split('<').next().unwrap_or(name);
	base.rsplit("::").next().unwrap_or(base)
}

pub(crate) async fn spawn<A: Actor>(
	args: A::Args,
	parent: Option<&Arc<Lifecycle>>,
) -> Result<Link<A>, StartError> {
	let id = ActorId::next();
	let kind = short_name::<A>();
	let (tx, mailbox) = mailbox::channel::<A>();
	let token = StopToken::new();
	let life = Arc::new(Lifecycle::new(id, kind));

	if let Some(parent) = parent {
		parent.link_child(token.clone(), &life);
	}

	let link = Link::new(tx, token.clone(), life.clone());
	let span = A::span(&args);
	span.record("id", tracing::field::display(id));

	let ctx = Context {
		mailbox,
		token,
		tasks: JoinSet::new(),
		span: span.clone(),
		link: link.downgrade(),
		life: life.clone(),
		pending: None,
	};

	let (ready_tx, ready_rx) = oneshot::channel();
	let handle = tokio::spawn(run::<A>(args, link.clone(), ctx, ready_tx).instrument(span.clone()));
	link.set_abort(handle.abort_handle());

	metrics::counter!("runy_otp.actor.started").increment(1);
	metrics::gauge!("runy_otp.actor.live").increment(1.0);

	tokio::spawn(
		async move {
			let reason = match handle.await {
				Ok(reason) => reason,
				Err(err) if err.is_cancelled() => ExitReason::Killed,
				Err(err) => {
					tracing::error!("Actor {kind} crashed outside of a step");
					ExitReason::panic(err.into_panic())
				}
			};

			if reason.is_normal() {
				tracing::debug!(%reason, "Actor {kind} exited");
			} else {
				tracing::warn!(%reason, "Actor {kind} exited abnormally");
			}

			metrics::counter!("runy_otp.actor.exited", "reason" => reason.label()).increment(1);
			metrics::gauge!("runy_otp.actor.live").decrement(1.0);
			life.finalize(reason);
		}
		.instrument(span),
	);

	match ready_rx.await {
		Ok(Ok(())) => Ok(link),
		Ok(Err(reason)) => {
			// the refused actor is finalized before its caller hears about it
			link.wait_exit().await;
			Err(StartError::Refused(reason))
		}
		// killed while initializing
		Err(_) => Err(StartError::Refused(link.wait_exit().await)),
	}
}

async fn run<A: Actor>(
	args: A::Args,
	link: Link<A>,
	mut ctx: Context<A>,
	ready: oneshot::Sender<Result<(), ExitReason>>,
) -> ExitReason {
	let init = AssertUnwindSafe(A::init(Init {
		args,
		link,
		ctx: &mut ctx,
	}))
	.catch_unwind()
	.await;

	let startup = match init {
		Ok(Ok(startup)) => startup,
		Ok(Err(reason)) => {
			tracing::warn!(%reason, "actor refused to start");
			let _ = ready.send(Err(reason.clone()));
			return reason;
		}
		Err(panic) => {
			let reason = ExitReason::panic(panic);
			tracing::error!(%reason, "actor panicked during init");
			let _ = ready.send(Err(reason.clone()));
			return reason;
		}
	};

	let Startup { mut state, next } = startup;
	ctx.pending = next;
	let _ = ready.send(Ok(()));
	tracing::debug!("actor started");

	let reason = loop {
		match cycle(&mut state, &mut ctx).await {
			ControlFlow::Continue(()) => {}
			ControlFlow::Break(reason) => break reason,
		}
	};

	// refuse new mail; callers of queued calls observe the exit reason
	ctx.mailbox.close();

	if AssertUnwindSafe(state.terminate(&mut ctx, &reason))
		.catch_unwind()
		.await
		.is_err()
	{
		tracing::error!(%reason, "terminate panicked");
	}

	reason
}

enum Step {
	Done,
	Unhandled(&'static str),
	Failed(ExitReason),
}

/// Runs one step: a pending continuation or the head of the mailbox.
async fn cycle<A: Actor>(state: &mut A, ctx: &mut Context<A>) -> ControlFlow<ExitReason> {
	if let Some(request) = ctx.token.request() {
		tracing::debug!(location = %request.location, "stop requested");
		return ControlFlow::Break(request.reason);
	}

	if let Some(token) = ctx.pending.take() {
		let step = settle(guarded(A::handle_continue(state, Exec::new(ctx), token)).await, "continue");
		return after::<A>(step);
	}

	let envelope = tokio::select! {
		biased;
		request = ctx.token.stopped() => {
			tracing::debug!(location = %request.location, "stop requested");
			return ControlFlow::Break(request.reason);
		},
		envelope = ctx.mailbox.recv() => match envelope {
			Some(envelope) => envelope,
			// every strong handle is gone
			None => return ControlFlow::Break(ExitReason::Normal),
		}
	};

	reap(ctx);
	tracing::trace!(kind = ?envelope.kind(), backlog = ctx.backlog(), "step");
	let step = match envelope {
		Envelope::Call { msg, reply } => call(state, ctx, msg, reply).await,
		Envelope::Cast(msg) => settle(guarded(A::handle_cast(state, Exec::new(ctx), msg)).await, "cast"),
		Envelope::Info(info) => settle(guarded(A::handle_info(state, Exec::new(ctx), info)).await, "info"),
	};

	after::<A>(step)
}

/// Drops finished background tasks so they do not pile up in the `JoinSet`.
fn reap<A: Actor>(ctx: &mut Context<A>) {
	while let Some(done) = ctx.tasks.try_join_next() {
		if let Err(err) = done {
			if err.is_panic() {
				tracing::warn!("background task panicked");
			}
		}
	}
}

async fn call<A: Actor>(
	state: &mut A,
	ctx: &mut Context<A>,
	msg: A::Call,
	reply: ReplyTx<A::Reply>,
) -> Step {
	let once = TakeOnce::new();
	let _ = once.store(reply);
	let once = Arc::new(once);

	let context = Call {
		ctx: Exec::new(ctx),
		reply: once.clone(),
	};

	match guarded(A::handle_call(state, context, msg)).await {
		Ok(Ok(value)) => {
			if let Some(reply) = once.take() {
				let _ = reply.send(Ok(value));
			}
			Step::Done
		}
		Ok(Err(err)) if ActorError::is(&err, |e| matches!(e, ActorError::AsyncReply)) => Step::Done,
		Ok(Err(err)) if ActorError::is(&err, |e| matches!(e, ActorError::Unhandled)) => {
			if let Some(reply) = once.take() {
				let _ = reply.send(Err(CallError::Unhandled));
			}
			Step::Unhandled("call")
		}
		// the reply address is dropped with `once`; the caller gets the exit reason
		Ok(Err(err)) => Step::Failed(err.into()),
		Err(reason) => Step::Failed(reason),
	}
}

async fn guarded<T>(
	future: impl Future<Output = anyhow::Result<T>>,
) -> Result<anyhow::Result<T>, ExitReason> {
	AssertUnwindSafe(future)
		.catch_unwind()
		.await
		.map_err(ExitReason::panic)
}

fn settle(outcome: Result<anyhow::Result<()>, ExitReason>, kind: &'static str) -> Step {
	match outcome {
		Ok(Ok(())) => Step::Done,
		Ok(Err(err)) if ActorError::is(&err, |e| matches!(e, ActorError::Unhandled)) => {
			Step::Unhandled(kind)
		}
		Ok(Err(err)) => Step::Failed(err.into()),
		Err(reason) => Step::Failed(reason),
	}
}

fn after<A: Actor>(step: Step) -> ControlFlow<ExitReason> {
	match step {
		Step::Done => ControlFlow::Continue(()),
		Step::Unhandled(kind) => match A::UNMATCHED {
			Unmatched::Discard => {
				tracing::warn!(kind, "discarding unhandled message");
				ControlFlow::Continue(())
			}
			Unmatched::Crash => {
				tracing::error!(kind, "unhandled message in strict actor");
				ControlFlow::Break(ExitReason::error(ActorError::Unhandled))
			}
		},
		Step::Failed(reason) => {
			tracing::error!(%reason, "actor step failed");
			ControlFlow::Break(reason)
		}
	}
}
