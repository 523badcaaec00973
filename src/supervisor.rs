//! # Supervisor: starts, watches and restarts a set of children.
//!
//! A [`Supervisor`] is itself an actor. It watches every child it starts,
//! so a child's exit arrives in its mailbox as [`Info::Exit`] and is handled
//! like any other message.
//!
//! ```text
//!   child exits ──► Lifecycle::finalize ──► Info::Exit ──► Supervisor mailbox
//!                                                              │
//!                          restart policy says no ◄────────────┤
//!                                                              ▼
//!                                            RestartLog::record (intensity)
//!                                              │ over limit          │ ok
//!                                              ▼                     ▼
//!                           supervisor exits abnormally   stop siblings in reverse,
//!                           (children torn down)          start targets in order
//! ```
//!
//! | Strategy     | On child X's abnormal exit                                  |
//! |--------------|-------------------------------------------------------------|
//! | `OneForOne`  | restart X                                                   |
//! | `OneForAll`  | stop all siblings, restart every child in declared order    |
//! | `RestForOne` | stop X and the children after it, restart them in order     |

use std::ops::Range;
use std::time::Duration;

use tokio::time::Instant;

use crate::actor::Actor;
use crate::actor::Context;
use crate::actor::Init;
use crate::actor::InitResult;
use crate::actor::Startup;
use crate::child::ChildKind;
use crate::child::ChildSpec;
use crate::child::Restart;
use crate::child::StartCtx;
use crate::child::shutdown_child;
use crate::envelope::Info;
use crate::error::ActorError;
use crate::error::CallError;
use crate::error::StartError;
use crate::error::SupervisorError;
use crate::exit::ExitReason;
use crate::handler::Call;
use crate::handler::Exec;
use crate::intensity::Intensity;
use crate::intensity::RestartLog;
use crate::link::ActorId;
use crate::link::ActorRef;
use crate::link::Link;
use crate::registry::Registry;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
	OneForOne,
	OneForAll,
	RestForOne,
}

/// Configuration of one supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorSpec {
	pub(crate) strategy: Strategy,
	pub(crate) intensity: Intensity,
	pub(crate) children: Vec<ChildSpec>,
	pub(crate) registry: Option<Registry>,
	pub(crate) owns_registry: bool,
	pub(crate) max_children: Option<usize>,
}

impl SupervisorSpec {
	pub fn new(strategy: Strategy) -> Self {
		Self {
			strategy,
			intensity: Intensity::default(),
			children: Vec::new(),
			registry: None,
			owns_registry: false,
			max_children: None,
		}
	}

	/// Allows `max_restarts` restarts within `window` before giving up.
	pub fn intensity(mut self, max_restarts: usize, window: Duration) -> Self {
		self.intensity = Intensity::new(max_restarts, window);
		self
	}

	pub fn child(mut self, child: ChildSpec) -> Self {
		self.children.push(child);
		self
	}

	pub fn children(mut self, children: impl IntoIterator<Item = ChildSpec>) -> Self {
		self.children.extend(children);
		self
	}

	/// Names of `named` children go into `registry`. The registry is cleared
	/// when this supervisor exits.
	pub fn registry(mut self, registry: Registry) -> Self {
		self.registry = Some(registry);
		self.owns_registry = true;
		self
	}

	/// Upper bound on the number of children; `start_child` fails beyond it.
	pub fn max_children(mut self, max: usize) -> Self {
		self.max_children = Some(max);
		self
	}
}

/// A child as seen by `which_children`.
#[derive(Debug, Clone)]
pub struct ChildInfo {
	pub id: String,
	pub actor: Option<ActorRef>,
	pub restart: Restart,
	pub kind: ChildKind,
}

pub enum SupervisorCall {
	StartChild(ChildSpec),
	TerminateChild(String),
	RestartChild(String),
	WhichChildren,
}

pub enum SupervisorReply {
	Started(ActorRef),
	Terminated,
	Children(Vec<ChildInfo>),
}

pub enum SupervisorCast {
	StartChild(ChildSpec),
}

/// Continuation used to retry a restart that failed to start a child.
pub enum Retry {
	Restart(String),
}

struct Child {
	spec: ChildSpec,
	actor: Option<ActorRef>,
}

pub struct Supervisor {
	strategy: Strategy,
	children: Vec<Child>,
	log: RestartLog,
	registry: Option<Registry>,
	owns_registry: bool,
	max_children: Option<usize>,
}

impl Supervisor {
	/// Starts a supervisor and all its children, in declared order.
	///
	/// If any child fails to start, the ones already running are stopped in
	/// reverse order and the refusal carries a `StartError::Child` naming
	/// the failing child.
	pub async fn start_link(spec: SupervisorSpec) -> Result<SupervisorRef, StartError> {
		Supervisor::start(spec).await.map(SupervisorRef::new)
	}

	fn start_ctx(&self, ctx: &Context<Self>) -> StartCtx {
		StartCtx {
			registry: self.registry.clone(),
			parent: ctx.life.clone(),
		}
	}

	fn position(&self, id: &str) -> Option<usize> {
		self.children.iter().position(|c| c.spec.id == id)
	}

	/// Starts one incarnation of `spec`, registers its name and watches it.
	async fn start_one(&self, ctx: &Context<Self>, spec: &ChildSpec) -> Result<ActorRef, StartError> {
		let actor = spec.spawn(self.start_ctx(ctx)).await?;

		if let Some(name) = &spec.name {
			match &self.registry {
				Some(registry) => {
					if let Err(err) = registry.register(name.clone(), actor.clone()) {
						shutdown_child(&actor, spec.shutdown).await;
						return Err(err.into());
					}
				}
				None => tracing::warn!(child = %spec.id, %name, "named child without a registry"),
			}
		}

		ctx.watch(&actor);
		tracing::debug!(child = %spec.id, id = %actor.id(), "child started");
		Ok(actor)
	}

	async fn stop_one(ctx: &Context<Self>, child: &mut Child) {
		if let Some(actor) = child.actor.take() {
			ctx.unwatch(&actor);
			let reason = shutdown_child(&actor, child.spec.shutdown).await;
			tracing::debug!(child = %child.spec.id, %reason, "child stopped");
		}
	}

	/// Stops every running child in reverse declared order.
	async fn stop_all(&mut self, ctx: &Context<Self>) {
		for child in self.children.iter_mut().rev() {
			Self::stop_one(ctx, child).await;
		}
	}

	async fn add_child(&mut self, ctx: &Context<Self>, spec: ChildSpec) -> Result<ActorRef, StartError> {
		if self.position(&spec.id).is_some() {
			return Err(StartError::DuplicateChild(spec.id));
		}
		if let Some(max) = self.max_children {
			if self.children.len() >= max {
				return Err(StartError::MaxChildren(max));
			}
		}

		let actor = self.start_one(ctx, &spec).await?;
		self.children.push(Child {
			spec,
			actor: Some(actor.clone()),
		});
		Ok(actor)
	}

	fn targets(&self, idx: usize) -> Range<usize> {
		match self.strategy {
			Strategy::OneForOne => idx..idx + 1,
			Strategy::OneForAll => 0..self.children.len(),
			Strategy::RestForOne => idx..self.children.len(),
		}
	}

	/// Applies the strategy after the child at `idx` failed.
	async fn restart(&mut self, ctx: &mut Context<Self>, idx: usize) -> anyhow::Result<()> {
		if !self.log.record(Instant::now()) {
			let limit = self.log.limit();
			tracing::error!(
				max_restarts = limit.max_restarts,
				window = ?limit.window,
				"restart intensity exceeded, shutting down"
			);
			return Err(ActorError::RestartIntensityExceeded {
				max_restarts: limit.max_restarts,
				window: limit.window,
			}
			.into());
		}
		metrics::counter!("runy_otp.supervisor.restarts").increment(1);

		let targets = self.targets(idx);
		for child in self.children[targets.clone()].iter_mut().rev() {
			Self::stop_one(ctx, child).await;
		}

		let mut i = targets.start;
		let mut end = targets.end;
		while i < end {
			if self.children[i].spec.restart == Restart::Temporary {
				tracing::debug!(child = %self.children[i].spec.id, "dropping temporary sibling");
				self.children.remove(i);
				end -= 1;
				continue;
			}

			let started = self.start_one(ctx, &self.children[i].spec).await;
			match started {
				Ok(actor) => {
					tracing::info!(child = %self.children[i].spec.id, id = %actor.id(), "child restarted");
					self.children[i].actor = Some(actor);
				}
				Err(err) => {
					let id = self.children[i].spec.id.clone();
					tracing::error!(child = %id, error = %err, "child failed to restart, retrying");
					ctx.continue_with(Retry::Restart(id));
					return Ok(());
				}
			}
			i += 1;
		}

		Ok(())
	}

	async fn child_exited(&mut self, ctx: &mut Context<Self>, id: ActorId, reason: ExitReason) -> anyhow::Result<()> {
		let Some(idx) = self
			.children
			.iter()
			.position(|c| c.actor.as_ref().map(ActorRef::id) == Some(id))
		else {
			tracing::trace!(%id, "exit of a child no longer supervised");
			return Ok(());
		};

		let child = &mut self.children[idx];
		child.actor = None;

		if !child.spec.restart.should_restart(&reason) {
			tracing::info!(child = %child.spec.id, %reason, "child exited");
			if child.spec.restart == Restart::Temporary {
				self.children.remove(idx);
			}
			return Ok(());
		}

		tracing::warn!(child = %child.spec.id, %reason, "child exited, restarting");
		self.restart(ctx, idx).await
	}

	fn which_children(&self) -> Vec<ChildInfo> {
		self.children
			.iter()
			.map(|c| ChildInfo {
				id: c.spec.id.clone(),
				actor: c.actor.clone(),
				restart: c.spec.restart,
				kind: c.spec.kind,
			})
			.collect()
	}
}

impl Actor for Supervisor {
	type Args = SupervisorSpec;
	type Call = SupervisorCall;
	type Reply = Result<SupervisorReply, SupervisorError>;
	type Cast = SupervisorCast;
	type Continue = Retry;

	async fn init(init: Init<'_, Self>) -> InitResult<Self> {
		let Init { args: spec, ctx, .. } = init;

		let mut sup = Supervisor {
			strategy: spec.strategy,
			children: Vec::with_capacity(spec.children.len()),
			log: RestartLog::new(spec.intensity),
			registry: spec.registry,
			owns_registry: spec.owns_registry,
			max_children: spec.max_children,
		};

		for child in spec.children {
			let id = child.id.clone();
			if let Err(err) = sup.add_child(ctx, child).await {
				tracing::error!(child = %id, error = %err, "child failed to start");
				sup.stop_all(ctx).await;
				return Err(ExitReason::error(StartError::Child {
					id,
					source: Box::new(err),
				}));
			}
		}

		tracing::info!(children = sup.children.len(), strategy = ?sup.strategy, "supervisor started");
		Ok(Startup::ready(sup))
	}

	async fn handle_call(&mut self, mut ctx: Call<'_, Self>, msg: SupervisorCall) -> anyhow::Result<Self::Reply> {
		let ctx: &mut Context<Self> = &mut ctx;
		let reply = match msg {
			SupervisorCall::StartChild(spec) => self
				.add_child(ctx, spec)
				.await
				.map(SupervisorReply::Started)
				.map_err(SupervisorError::from),
			SupervisorCall::TerminateChild(id) => match self.position(&id) {
				Some(idx) => {
					let mut child = self.children.remove(idx);
					Self::stop_one(ctx, &mut child).await;
					Ok(SupervisorReply::Terminated)
				}
				None => Err(SupervisorError::NotFound(id)),
			},
			SupervisorCall::RestartChild(id) => match self.position(&id) {
				Some(idx) if self.children[idx].actor.is_some() => Err(SupervisorError::Running(id)),
				Some(idx) => {
					let started = self.start_one(ctx, &self.children[idx].spec).await;
					started
						.map(|actor| {
							self.children[idx].actor = Some(actor.clone());
							SupervisorReply::Started(actor)
						})
						.map_err(SupervisorError::from)
				}
				None => Err(SupervisorError::NotFound(id)),
			},
			SupervisorCall::WhichChildren => Ok(SupervisorReply::Children(self.which_children())),
		};
		Ok(reply)
	}

	async fn handle_cast(&mut self, mut ctx: Exec<'_, Self>, msg: SupervisorCast) -> anyhow::Result<()> {
		match msg {
			SupervisorCast::StartChild(spec) => {
				let id = spec.id.clone();
				if let Err(err) = self.add_child(&mut ctx, spec).await {
					tracing::warn!(child = %id, error = %err, "could not start child");
				}
			}
		}
		Ok(())
	}

	async fn handle_info(&mut self, mut ctx: Exec<'_, Self>, info: Info) -> anyhow::Result<()> {
		match info {
			Info::Exit { id, reason } => self.child_exited(&mut ctx, id, reason).await,
			Info::User(_) => Err(ActorError::Unhandled.into()),
		}
	}

	async fn handle_continue(&mut self, mut ctx: Exec<'_, Self>, token: Retry) -> anyhow::Result<()> {
		match token {
			Retry::Restart(id) => match self.position(&id) {
				Some(idx) if self.children[idx].actor.is_none() => self.restart(&mut ctx, idx).await,
				_ => Ok(()),
			},
		}
	}

	async fn terminate(mut self, ctx: &mut Context<Self>, reason: &ExitReason) {
		tracing::info!(%reason, "supervisor stopping");
		self.stop_all(ctx).await;
		if self.owns_registry {
			if let Some(registry) = &self.registry {
				registry.clear();
			}
		}
	}
}

/// Client handle for a running supervisor.
#[derive(Clone, Debug)]
pub struct SupervisorRef {
	link: Link<Supervisor>,
	timeout: Duration,
}

impl From<SupervisorRef> for ActorRef {
	fn from(sup: SupervisorRef) -> Self {
		sup.link.to_ref()
	}
}

impl SupervisorRef {
	pub fn new(link: Link<Supervisor>) -> Self {
		Self {
			link,
			timeout: DEFAULT_CALL_TIMEOUT,
		}
	}

	/// Timeout applied to every management call.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn link(&self) -> &Link<Supervisor> {
		&self.link
	}

	pub fn id(&self) -> ActorId {
		self.link.id()
	}

	pub fn alive(&self) -> bool {
		self.link.alive()
	}

	async fn call(&self, msg: SupervisorCall) -> Result<SupervisorReply, SupervisorError> {
		self.link.call(msg, self.timeout).await?
	}

	pub async fn start_child(&self, spec: ChildSpec) -> Result<ActorRef, SupervisorError> {
		match self.call(SupervisorCall::StartChild(spec)).await? {
			SupervisorReply::Started(actor) => Ok(actor),
			_ => Err(CallError::Unhandled.into()),
		}
	}

	/// Queues a child start without waiting for it.
	pub fn start_child_detached(&self, spec: ChildSpec) {
		self.link.cast(SupervisorCast::StartChild(spec));
	}

	/// Stops the child and forgets its spec.
	pub async fn terminate_child(&self, id: impl Into<String>) -> Result<(), SupervisorError> {
		match self.call(SupervisorCall::TerminateChild(id.into())).await? {
			SupervisorReply::Terminated => Ok(()),
			_ => Err(CallError::Unhandled.into()),
		}
	}

	/// Starts a child whose spec is kept but which is not running.
	pub async fn restart_child(&self, id: impl Into<String>) -> Result<ActorRef, SupervisorError> {
		match self.call(SupervisorCall::RestartChild(id.into())).await? {
			SupervisorReply::Started(actor) => Ok(actor),
			_ => Err(CallError::Unhandled.into()),
		}
	}

	pub async fn which_children(&self) -> Result<Vec<ChildInfo>, SupervisorError> {
		match self.call(SupervisorCall::WhichChildren).await? {
			SupervisorReply::Children(children) => Ok(children),
			_ => Err(CallError::Unhandled.into()),
		}
	}

	/// The running actor of child `id`, if any.
	pub async fn child(&self, id: &str) -> Result<Option<ActorRef>, SupervisorError> {
		let children = self.which_children().await?;
		match children.into_iter().find(|c| c.id == id) {
			Some(child) => Ok(child.actor),
			None => Err(SupervisorError::NotFound(id.to_string())),
		}
	}

	#[track_caller]
	pub fn stop(&self, reason: ExitReason) {
		self.link.stop(reason);
	}

	pub async fn stop_and_wait(&self, reason: ExitReason) -> ExitReason {
		self.link.stop_and_wait(reason).await
	}

	pub async fn wait_exit(&self) -> ExitReason {
		self.link.wait_exit().await
	}
}
