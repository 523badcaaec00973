use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt as _;
use futures::future::BoxFuture;

use crate::actor::Actor;
use crate::actor::spawn;
use crate::error::StartError;
use crate::exit::ExitReason;
use crate::lifecycle::Lifecycle;
use crate::link::ActorRef;
use crate::link::Link;
use crate::registry::Registry;
use crate::supervisor::Supervisor;
use crate::supervisor::SupervisorSpec;

pub const DEFAULT_SHUTDOWN: Duration = Duration::from_secs(5);

/// When a child is restarted after it exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restart {
	/// Always.
	Permanent,
	/// Only after an abnormal exit.
	Transient,
	/// Never. The child is forgotten once it exits.
	Temporary,
}

impl Restart {
	pub fn should_restart(&self, reason: &ExitReason) -> bool {
		match self {
			Restart::Permanent => true,
			Restart::Transient => reason.is_abnormal(),
			Restart::Temporary => false,
		}
	}
}

/// How a supervisor stops a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
	/// Kill without running `terminate`.
	Brutal,
	/// Ask to stop, kill if still running after the grace period.
	Timeout(Duration),
	/// Ask to stop and wait as long as it takes.
	Infinity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
	Worker,
	Supervisor,
}

/// Passed to a child's start function.
pub struct StartCtx {
	pub(crate) registry: Option<Registry>,
	pub(crate) parent: Arc<Lifecycle>,
}

impl StartCtx {
	pub fn registry(&self) -> Option<&Registry> {
		self.registry.as_ref()
	}

	/// Starts an actor tied to the supervisor: if the supervisor dies
	/// without shutting it down, the actor is stopped with `Shutdown`.
	pub async fn start<A: Actor>(&self, args: A::Args) -> Result<Link<A>, StartError> {
		spawn::<A>(args, Some(&self.parent)).await
	}
}

type StartFn = Arc<dyn Fn(StartCtx) -> BoxFuture<'static, Result<ActorRef, StartError>> + Send + Sync>;

/// Describes one child of a supervisor.
#[derive(Clone)]
pub struct ChildSpec {
	pub(crate) id: String,
	start: StartFn,
	pub(crate) restart: Restart,
	pub(crate) shutdown: Shutdown,
	pub(crate) name: Option<String>,
	pub(crate) kind: ChildKind,
}

impl fmt::Debug for ChildSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChildSpec")
			.field("id", &self.id)
			.field("restart", &self.restart)
			.field("shutdown", &self.shutdown)
			.field("name", &self.name)
			.field("kind", &self.kind)
			.finish()
	}
}

impl ChildSpec {
	/// A child started by `start`, which runs again on every restart.
	pub fn new<F, Fut>(id: impl Into<String>, start: F) -> Self
	where
		F: Fn(StartCtx) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<ActorRef, StartError>> + Send + 'static,
	{
		Self {
			id: id.into(),
			start: Arc::new(move |ctx| start(ctx).boxed()),
			restart: Restart::Permanent,
			shutdown: Shutdown::Timeout(DEFAULT_SHUTDOWN),
			name: None,
			kind: ChildKind::Worker,
		}
	}

	/// A child running actor `A` with a fresh clone of `args` each start.
	pub fn actor<A>(id: impl Into<String>, args: A::Args) -> Self
	where
		A: Actor,
		A::Args: Clone + Sync,
	{
		Self::new(id, move |ctx| {
			let args = args.clone();
			async move { ctx.start::<A>(args).await.map(ActorRef::from) }
		})
	}

	/// A nested supervisor. It shares the parent's registry unless `spec`
	/// names its own.
	pub fn supervisor(id: impl Into<String>, spec: SupervisorSpec) -> Self {
		let mut child = Self::new(id, move |ctx| {
			let mut spec = spec.clone();
			if spec.registry.is_none() {
				spec.registry = ctx.registry.clone();
				spec.owns_registry = false;
			}
			async move { ctx.start::<Supervisor>(spec).await.map(ActorRef::from) }
		});
		child.shutdown = Shutdown::Infinity;
		child.kind = ChildKind::Supervisor;
		child
	}

	pub fn restart(mut self, restart: Restart) -> Self {
		self.restart = restart;
		self
	}

	pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
		self.shutdown = shutdown;
		self
	}

	/// Registers every incarnation of the child under `name` in the
	/// supervisor's registry.
	pub fn named(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub(crate) async fn spawn(&self, ctx: StartCtx) -> Result<ActorRef, StartError> {
		(self.start)(ctx).await
	}
}

/// Stops `actor` according to `policy` and returns its exit reason.
pub(crate) async fn shutdown_child(actor: &ActorRef, policy: Shutdown) -> ExitReason {
	match policy {
		Shutdown::Brutal => {
			actor.kill();
			actor.wait_exit().await
		}
		Shutdown::Timeout(grace) => {
			actor.stop(ExitReason::Shutdown);
			match tokio::time::timeout(grace, actor.wait_exit()).await {
				Ok(reason) => reason,
				Err(_) => {
					tracing::warn!(id = %actor.id(), ?grace, "child ignored shutdown, killing");
					actor.kill();
					actor.wait_exit().await
				}
			}
		}
		Shutdown::Infinity => actor.stop_and_wait(ExitReason::Shutdown).await,
	}
}
