use std::time::Duration;

use crate::exit::ExitReason;

/// Markers passed through `anyhow::Error` by handlers and the runtime.
#[derive(thiserror::Error, Debug)]
pub enum ActorError {
	#[error("message was not handled")]
	Unhandled,

	#[error("reply will be sent asynchronously")]
	AsyncReply,

	#[error("reply already taken")]
	ReplyTaken,

	#[error("restart intensity exceeded: more than {max_restarts} restarts in {window:?}")]
	RestartIntensityExceeded {
		max_restarts: usize,
		window: Duration,
	},
}

impl ActorError {
	pub(crate) fn is(err: &anyhow::Error, pred: impl FnOnce(&ActorError) -> bool) -> bool {
		err.downcast_ref::<ActorError>().map(pred).unwrap_or(false)
	}
}

#[derive(thiserror::Error, Debug)]
pub enum StartError {
	#[error("initializer refused to start: {0}")]
	Refused(ExitReason),

	#[error("child `{id}` failed to start")]
	Child {
		id: String,
		#[source]
		source: Box<StartError>,
	},

	#[error("child `{0}` already exists")]
	DuplicateChild(String),

	#[error("maximum number of children ({0}) reached")]
	MaxChildren(usize),

	#[error("could not register child name: {0}")]
	Registry(#[from] RegistryError),
}

/// Outcome of a failed `call`.
///
/// A `Timeout` does not mean the message was dropped: delivery is at most
/// once and the actor may still process it after the caller gave up.
#[derive(thiserror::Error, Debug)]
pub enum CallError {
	#[error("call timed out after {0:?}")]
	Timeout(Duration),

	#[error("actor is not running")]
	NoProc,

	#[error("actor exited before replying: {0}")]
	Actor(ExitReason),

	#[error("actor did not handle the message")]
	Unhandled,
}

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
	#[error("name `{0}` is already registered")]
	NameTaken(String),

	#[error("name `{0}` is not registered")]
	NotFound(String),

	#[error("name `{0}` belongs to an actor of another type")]
	WrongType(String),

	#[error("actor is not running")]
	NoProc,
}

#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
	#[error("no child with id `{0}`")]
	NotFound(String),

	#[error("child `{0}` is already running")]
	Running(String),

	#[error(transparent)]
	Start(#[from] StartError),

	#[error(transparent)]
	Call(#[from] CallError),
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum TaskError {
	#[error("task crashed: {0}")]
	Crashed(ExitReason),

	#[error("task did not resolve within {0:?}")]
	Timeout(Duration),

	#[error("task already resolved")]
	AlreadyResolved,
}
