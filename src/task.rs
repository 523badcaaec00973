//! Supervised single-shot tasks.
//!
//! A [`TaskExecutor`] is a one-for-one supervisor whose children are
//! temporary [`TaskActor`]s. Each hosts one work unit and resolves one
//! [`TaskHandle`]. The handle's result slot is set exactly once: by the work,
//! by `cancel`, by the reap deadline, or by the hosting actor going away,
//! whichever happens first.

use std::convert::Infallible;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::FutureExt as _;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::actor::Actor;
use crate::actor::Context;
use crate::actor::Init;
use crate::actor::InitResult;
use crate::actor::Startup;
use crate::child::ChildSpec;
use crate::child::Restart;
use crate::error::StartError;
use crate::error::TaskError;
use crate::exit::ExitReason;
use crate::handler::Exec;
use crate::link::ActorRef;
use crate::supervisor::Strategy;
use crate::supervisor::Supervisor;
use crate::supervisor::SupervisorRef;
use crate::supervisor::SupervisorSpec;
use crate::weak::WeakRef;

static NEXT_TASK: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
	/// Maximum number of tasks hosted at once. Submissions beyond it resolve
	/// as crashed without running.
	pub max_tasks: Option<usize>,
	/// Work still running after this long is stopped and resolves to
	/// `Crashed(Timeout)`.
	pub reap_after: Option<Duration>,
}

type Work<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;

struct TaskSlot<T> {
	outcome: watch::Sender<Option<Result<T, ExitReason>>>,
	host: OnceLock<WeakRef>,
}

impl<T> TaskSlot<T> {
	fn new() -> Self {
		Self {
			outcome: watch::Sender::new(None),
			host: OnceLock::new(),
		}
	}

	/// Returns `true` if this call set the slot.
	fn resolve(&self, outcome: Result<T, ExitReason>) -> bool {
		self.outcome.send_if_modified(|slot| match slot {
			None => {
				*slot = Some(outcome);
				true
			}
			// set-once: the first outcome wins
			Some(_) => false,
		})
	}

	fn is_resolved(&self) -> bool {
		self.outcome.borrow().is_some()
	}
}

/// Reference to one in-flight work unit.
pub struct TaskHandle<T> {
	slot: Arc<TaskSlot<T>>,
}

impl<T> Clone for TaskHandle<T> {
	fn clone(&self) -> Self {
		Self {
			slot: self.slot.clone(),
		}
	}
}

impl<T: Clone> TaskHandle<T> {
	/// Waits up to `timeout` for the outcome.
	///
	/// A timeout leaves the work running; call `cancel` to stop it or wait
	/// again. Once resolved, every call returns the same outcome.
	pub async fn wait(&self, timeout: Duration) -> Result<T, TaskError> {
		let mut recv = self.slot.outcome.subscribe();
		let waited = tokio::time::timeout(timeout, async move {
			recv.wait_for(Option::is_some)
				.await
				.map(|outcome| (*outcome).clone())
		})
		.await;

		match waited {
			Ok(Ok(Some(outcome))) => outcome.map_err(TaskError::Crashed),
			Err(_) => Err(TaskError::Timeout(timeout)),
			// the slot owns the sender, so the channel cannot close
			Ok(_) => Err(TaskError::Crashed(ExitReason::Killed)),
		}
	}

	/// The outcome if the task has resolved.
	pub fn try_result(&self) -> Option<Result<T, TaskError>> {
		self.slot
			.outcome
			.borrow()
			.clone()
			.map(|outcome| outcome.map_err(TaskError::Crashed))
	}
}

impl<T> TaskHandle<T> {
	pub fn is_resolved(&self) -> bool {
		self.slot.is_resolved()
	}

	/// Resolves the task as `Crashed(Cancelled)` and stops its host.
	///
	/// A task that already produced an outcome keeps it and this returns
	/// `AlreadyResolved`.
	pub fn cancel(&self) -> Result<(), TaskError> {
		if !self.slot.resolve(Err(ExitReason::Cancelled)) {
			return Err(TaskError::AlreadyResolved);
		}
		if let Some(host) = self.slot.host.get() {
			host.stop(ExitReason::Cancelled);
		}
		Ok(())
	}
}

pub struct TaskArgs<T> {
	label: String,
	slot: Arc<TaskSlot<T>>,
	work: Work<T>,
	reap_after: Option<Duration>,
}

pub enum TaskStep {
	Run,
}

/// Hosts one work unit. Its outcome goes into the handle, never into the
/// supervisor or the submitter's own failure path.
pub struct TaskActor<T> {
	slot: Arc<TaskSlot<T>>,
	work: Option<Work<T>>,
	reap_after: Option<Duration>,
}

impl<T> Drop for TaskActor<T> {
	fn drop(&mut self) {
		// only reached without `terminate` when the host was killed
		self.slot.resolve(Err(ExitReason::Killed));
	}
}

impl<T: Send + Sync + 'static> Actor for TaskActor<T> {
	type Args = TaskArgs<T>;
	type Call = Infallible;
	type Reply = ();
	type Cast = Infallible;
	type Continue = TaskStep;

	fn span(args: &Self::Args) -> tracing::Span {
		tracing::info_span!("task", label = %args.label, id = tracing::field::Empty)
	}

	async fn init(init: Init<'_, Self>) -> InitResult<Self> {
		let Init { args, ctx, .. } = init;
		let _ = args.slot.host.set(WeakRef::from(ctx.link().clone()));

		// cancelled before the host came up
		if args.slot.is_resolved() {
			return Err(ExitReason::Cancelled);
		}

		let actor = TaskActor {
			slot: args.slot,
			work: Some(args.work),
			reap_after: args.reap_after,
		};
		Ok(Startup::continue_with(actor, TaskStep::Run))
	}

	async fn handle_continue(&mut self, mut ctx: Exec<'_, Self>, step: TaskStep) -> anyhow::Result<()> {
		match step {
			TaskStep::Run => {
				let Some(work) = self.work.take() else {
					return Ok(());
				};

				let slot = self.slot.clone();
				let host = ctx.link().clone();
				ctx.spawn(async move {
					let outcome = match AssertUnwindSafe(work()).catch_unwind().await {
						Ok(Ok(value)) => Ok(value),
						Ok(Err(err)) => Err(ExitReason::from(err)),
						Err(panic) => Err(ExitReason::panic(panic)),
					};
					let reason = match &outcome {
						Ok(_) => ExitReason::Normal,
						Err(reason) => reason.clone(),
					};
					slot.resolve(outcome);
					host.stop(reason);
				});

				if let Some(after) = self.reap_after {
					let slot = self.slot.clone();
					let host = ctx.link().clone();
					ctx.spawn(async move {
						tokio::time::sleep(after).await;
						if slot.resolve(Err(ExitReason::Timeout)) {
							tracing::warn!(?after, "task reaped");
							host.stop(ExitReason::Timeout);
						}
					});
				}
				Ok(())
			}
		}
	}

	async fn terminate(self, _ctx: &mut Context<Self>, reason: &ExitReason) {
		self.slot.resolve(Err(reason.clone()));
	}
}

/// Holds a submission until the executor starts it. Dropped unstarted, it
/// resolves the handle so no waiter hangs.
struct Pending<T> {
	args: Option<TaskArgs<T>>,
}

impl<T> Drop for Pending<T> {
	fn drop(&mut self) {
		if let Some(args) = self.args.take() {
			tracing::warn!(label = %args.label, "task dropped before it started");
			args.slot
				.resolve(Err(ExitReason::msg("task was rejected before it started")));
		}
	}
}

/// Bounded fire-and-forget work under supervision.
#[derive(Clone)]
pub struct TaskExecutor {
	sup: SupervisorRef,
	config: ExecutorConfig,
}

impl TaskExecutor {
	fn supervisor_spec(config: &ExecutorConfig) -> SupervisorSpec {
		let spec = SupervisorSpec::new(Strategy::OneForOne);
		match config.max_tasks {
			Some(max) => spec.max_children(max),
			None => spec,
		}
	}

	pub async fn start(config: ExecutorConfig) -> Result<Self, StartError> {
		let sup = Supervisor::start_link(Self::supervisor_spec(&config)).await?;
		Ok(Self { sup, config })
	}

	/// Spec for running the executor's supervisor inside a larger tree.
	/// Pair with [`TaskExecutor::from_supervisor`].
	pub fn child_spec(id: impl Into<String>, config: &ExecutorConfig) -> ChildSpec {
		ChildSpec::supervisor(id, Self::supervisor_spec(config))
	}

	pub fn from_supervisor(sup: SupervisorRef, config: ExecutorConfig) -> Self {
		Self { sup, config }
	}

	pub fn supervisor(&self) -> &SupervisorRef {
		&self.sup
	}

	/// Starts `work` concurrently with the caller and returns at once.
	pub fn submit<T, F, Fut>(&self, work: F) -> TaskHandle<T>
	where
		T: Send + Sync + 'static,
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		let label = format!("task-{}", NEXT_TASK.fetch_add(1, Ordering::Relaxed));
		let slot = Arc::new(TaskSlot::new());
		let work: Work<T> = Box::new(move || work().boxed());

		let pending = Mutex::new(Pending {
			args: Some(TaskArgs {
				label: label.clone(),
				slot: slot.clone(),
				work,
				reap_after: self.config.reap_after,
			}),
		});

		let spec = ChildSpec::new(label, move |ctx| {
			let args = pending.lock().args.take();
			async move {
				match args {
					Some(args) => ctx.start::<TaskActor<T>>(args).await.map(ActorRef::from),
					None => Err(StartError::Refused(ExitReason::msg("task already started"))),
				}
			}
		})
		.restart(Restart::Temporary);

		metrics::counter!("runy_otp.task.submitted").increment(1);
		self.sup.start_child_detached(spec);
		TaskHandle { slot }
	}

	/// Stops the executor; unfinished tasks resolve to `Crashed(Shutdown)`.
	pub async fn shutdown(&self) -> ExitReason {
		self.sup.stop_and_wait(ExitReason::Shutdown).await
	}
}
