mod actor;
mod call;
mod child;
mod envelope;
mod error;
mod exit;
mod handler;
mod intensity;
mod lifecycle;
mod link;
mod mailbox;
mod registry;
mod stop;
mod supervisor;
mod task;
mod weak;

pub mod prelude {
	pub use super::actor::Actor;
	pub use super::actor::Context;
	pub use super::actor::Init;
	pub use super::actor::InitResult;
	pub use super::actor::Startup;
	pub use super::child::ChildSpec;
	pub use super::child::Restart;
	pub use super::envelope::Info;
	pub use super::exit::ExitReason;
	pub use super::handler::Call;
	pub use super::handler::Exec;
	pub use super::link::ActorRef;
	pub use super::link::Link;
	pub use super::supervisor::Strategy;
	pub use super::supervisor::Supervisor;
	pub use super::supervisor::SupervisorRef;
	pub use super::supervisor::SupervisorSpec;
}

pub use actor::Actor;
pub use actor::Context;
pub use actor::Init;
pub use actor::InitResult;
pub use actor::Startup;
pub use actor::Unmatched;
pub use call::PendingCall;
pub use child::ChildKind;
pub use child::ChildSpec;
pub use child::DEFAULT_SHUTDOWN;
pub use child::Restart;
pub use child::Shutdown;
pub use child::StartCtx;
pub use envelope::Envelope;
pub use envelope::Info;
pub use envelope::MessageKind;
pub use error::ActorError;
pub use error::CallError;
pub use error::RegistryError;
pub use error::StartError;
pub use error::SupervisorError;
pub use error::TaskError;
pub use exit::ExitReason;
pub use handler::Call;
pub use handler::Exec;
pub use intensity::Intensity;
pub use link::ActorId;
pub use link::ActorRef;
pub use link::Link;
pub use mailbox::Mailbox;
pub use registry::Registry;
pub use stop::StopRequest;
pub use stop::StopToken;
pub use supervisor::ChildInfo;
pub use supervisor::DEFAULT_CALL_TIMEOUT;
pub use supervisor::Strategy;
pub use supervisor::Supervisor;
pub use supervisor::SupervisorCall;
pub use supervisor::SupervisorCast;
pub use supervisor::SupervisorRef;
pub use supervisor::SupervisorReply;
pub use supervisor::SupervisorSpec;
pub use task::ExecutorConfig;
pub use task::TaskActor;
pub use task::TaskArgs;
pub use task::TaskExecutor;
pub use task::TaskHandle;
pub use task::TaskStep;
pub use weak::WeakLink;
pub use weak::WeakRef;

/// Starts an unsupervised actor. Shorthand for `A::start(args)`.
pub async fn start<A: Actor>(args: A::Args) -> Result<Link<A>, StartError> {
	A::start(args).await
}
