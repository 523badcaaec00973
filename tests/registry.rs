use std::time::Duration;

use runy_otp::Actor;
use runy_otp::Call;
use runy_otp::ExitReason;
use runy_otp::Init;
use runy_otp::InitResult;
use runy_otp::Registry;
use runy_otp::RegistryError;
use runy_otp::Startup;
use tokio::task::JoinSet;

const WAIT: Duration = Duration::from_secs(1);

struct Echo;

impl Actor for Echo {
	type Args = ();
	type Call = String;
	type Reply = String;
	type Cast = ();
	type Continue = ();

	async fn init(_init: Init<'_, Self>) -> InitResult<Self> {
		Ok(Startup::ready(Echo))
	}

	async fn handle_call(&mut self, _ctx: Call<'_, Self>, msg: String) -> anyhow::Result<String> {
		Ok(msg)
	}
}

struct Mute;

impl Actor for Mute {
	type Args = ();
	type Call = ();
	type Reply = ();
	type Cast = ();
	type Continue = ();

	async fn init(_init: Init<'_, Self>) -> InitResult<Self> {
		Ok(Startup::ready(Mute))
	}
}

#[tokio::test]
async fn lookup_finds_registered_actor() {
	let registry = Registry::new();
	let echo = Echo::start(()).await.unwrap();
	registry.register("echo", echo.clone()).unwrap();

	let found = registry.lookup::<Echo>("echo").unwrap();
	assert_eq!(found.id(), echo.id());
	assert_eq!(registry.whereis("echo"), Some(echo.id()));
	assert_eq!(found.call("hi".to_string(), WAIT).await.unwrap(), "hi");
}

#[tokio::test]
async fn first_writer_wins() {
	let registry = Registry::new();
	let first = Echo::start(()).await.unwrap();
	let second = Echo::start(()).await.unwrap();

	registry.register("svc", first.clone()).unwrap();
	let err = registry.register("svc", second.clone()).unwrap_err();
	assert!(matches!(err, RegistryError::NameTaken(ref name) if name == "svc"));

	// registering the same actor again is a no-op
	registry.register("svc", first.clone()).unwrap();
	assert_eq!(registry.whereis("svc"), Some(first.id()));

	first.stop_and_wait(ExitReason::Shutdown).await;
	registry.register("svc", second.clone()).unwrap();
	assert_eq!(registry.whereis("svc"), Some(second.id()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_have_one_winner() {
	let registry = Registry::new();
	let mut racers = JoinSet::new();
	for _ in 0..16 {
		let echo = Echo::start(()).await.unwrap();
		let registry = registry.clone();
		racers.spawn(async move {
			let id = echo.id();
			(id, registry.register("contested", echo))
		});
	}

	let mut winners = Vec::new();
	while let Some(joined) = racers.join_next().await {
		match joined.unwrap() {
			(id, Ok(())) => winners.push(id),
			(_, Err(RegistryError::NameTaken(name))) => assert_eq!(name, "contested"),
			(_, Err(err)) => panic!("unexpected registration error: {err}"),
		}
	}

	assert_eq!(winners.len(), 1);
	assert_eq!(registry.whereis("contested"), Some(winners[0]));
	assert_eq!(registry.names(), vec!["contested".to_string()]);
}

#[tokio::test]
async fn names_are_revoked_on_exit() {
	let registry = Registry::new();
	let echo = Echo::start(()).await.unwrap();
	registry.register("a", echo.clone()).unwrap();
	registry.register("b", echo.clone()).unwrap();
	assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);

	echo.stop_and_wait(ExitReason::Normal).await;

	assert!(registry.names().is_empty());
	assert!(registry.is_empty());
	assert!(matches!(
		registry.lookup_ref("a"),
		Err(RegistryError::NotFound(_))
	));
}

#[tokio::test]
async fn lookup_checks_actor_type() {
	let registry = Registry::new();
	registry.register("mute", Mute::start(()).await.unwrap()).unwrap();

	assert!(matches!(
		registry.lookup::<Echo>("mute"),
		Err(RegistryError::WrongType(_))
	));
	assert!(registry.lookup::<Mute>("mute").is_ok());
}

#[tokio::test]
async fn exited_actor_cannot_register() {
	let registry = Registry::new();
	let echo = Echo::start(()).await.unwrap();
	echo.stop_and_wait(ExitReason::Normal).await;

	assert!(matches!(
		registry.register("late", echo),
		Err(RegistryError::NoProc)
	));
	assert!(registry.whereis("late").is_none());
}

#[tokio::test]
async fn registry_keeps_actor_alive() {
	let registry = Registry::new();
	let echo = Echo::start(()).await.unwrap();
	let id = echo.id();
	registry.register("kept", echo).unwrap();

	let found = registry.lookup::<Echo>("kept").unwrap();
	assert_eq!(found.id(), id);
	assert_eq!(found.call("still here".to_string(), WAIT).await.unwrap(), "still here");

	let removed = registry.unregister("kept").unwrap();
	assert_eq!(removed.id(), id);
	assert!(registry.whereis("kept").is_none());
}
