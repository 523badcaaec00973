use std::time::Duration;

use runy_otp::Actor;
use runy_otp::ActorError;
use runy_otp::ActorId;
use runy_otp::ActorRef;
use runy_otp::Call;
use runy_otp::CallError;
use runy_otp::Context;
use runy_otp::Exec;
use runy_otp::ExitReason;
use runy_otp::Info;
use runy_otp::Init;
use runy_otp::InitResult;
use runy_otp::StartError;
use runy_otp::Startup;
use runy_otp::Unmatched;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(1);

type Report = (ExitReason, Vec<i64>);

#[derive(Default)]
struct ProbeArgs {
	report: Option<mpsc::UnboundedSender<Report>>,
	refuse: bool,
	panic: bool,
	preload: Option<i64>,
}

struct Probe {
	log: Vec<i64>,
	report: Option<mpsc::UnboundedSender<Report>>,
}

enum Load {
	Preload(i64),
}

enum ProbeCall {
	Log,
	Slow(Duration),
	Boom,
	Later(i64, Duration),
	Background,
}

enum ProbeCast {
	Push(i64),
	Sleep(Duration),
	Fail,
}

impl Actor for Probe {
	type Args = ProbeArgs;
	type Call = ProbeCall;
	type Reply = Vec<i64>;
	type Cast = ProbeCast;
	type Continue = Load;

	async fn init(init: Init<'_, Self>) -> InitResult<Self> {
		let args = init.args;
		if args.refuse {
			return Err(ExitReason::msg("not today"));
		}
		if args.panic {
			panic!("init exploded");
		}

		let probe = Probe {
			log: Vec::new(),
			report: args.report,
		};
		Ok(match args.preload {
			Some(value) => Startup::continue_with(probe, Load::Preload(value)),
			None => Startup::ready(probe),
		})
	}

	async fn handle_continue(&mut self, _ctx: Exec<'_, Self>, token: Load) -> anyhow::Result<()> {
		match token {
			Load::Preload(value) => self.log.push(value),
		}
		Ok(())
	}

	async fn handle_call(&mut self, mut ctx: Call<'_, Self>, msg: ProbeCall) -> anyhow::Result<Vec<i64>> {
		match msg {
			ProbeCall::Log => Ok(self.log.clone()),
			ProbeCall::Slow(delay) => {
				tokio::time::sleep(delay).await;
				Ok(self.log.clone())
			}
			ProbeCall::Boom => panic!("boom"),
			ProbeCall::Later(value, delay) => ctx.reply_async(async move {
				tokio::time::sleep(delay).await;
				vec![value]
			}),
			ProbeCall::Background => Ok(vec![ctx.background() as i64]),
		}
	}

	async fn handle_cast(&mut self, _ctx: Exec<'_, Self>, msg: ProbeCast) -> anyhow::Result<()> {
		match msg {
			ProbeCast::Push(value) => self.log.push(value),
			ProbeCast::Sleep(delay) => tokio::time::sleep(delay).await,
			ProbeCast::Fail => anyhow::bail!("cast failed"),
		}
		Ok(())
	}

	async fn handle_info(&mut self, _ctx: Exec<'_, Self>, info: Info) -> anyhow::Result<()> {
		match info.downcast::<i64>() {
			Ok(value) => {
				self.log.push(value);
				Ok(())
			}
			Err(_) => Err(ActorError::Unhandled.into()),
		}
	}

	async fn terminate(self, _ctx: &mut Context<Self>, reason: &ExitReason) {
		if let Some(report) = &self.report {
			let _ = report.send((reason.clone(), self.log.clone()));
		}
	}
}

fn probe() -> (ProbeArgs, mpsc::UnboundedReceiver<Report>) {
	let (tx, rx) = mpsc::unbounded_channel();
	let args = ProbeArgs {
		report: Some(tx),
		..Default::default()
	};
	(args, rx)
}

struct Strict;

impl Actor for Strict {
	type Args = ();
	type Call = ();
	type Reply = ();
	type Cast = ();
	type Continue = ();

	const UNMATCHED: Unmatched = Unmatched::Crash;

	async fn init(_init: Init<'_, Self>) -> InitResult<Self> {
		Ok(Startup::ready(Strict))
	}
}

struct Watcher {
	exits: mpsc::UnboundedSender<(ActorId, ExitReason)>,
}

impl Actor for Watcher {
	type Args = mpsc::UnboundedSender<(ActorId, ExitReason)>;
	type Call = ();
	type Reply = ();
	type Cast = ();
	type Continue = ();

	async fn init(init: Init<'_, Self>) -> InitResult<Self> {
		Ok(Startup::ready(Watcher { exits: init.args }))
	}

	async fn handle_info(&mut self, _ctx: Exec<'_, Self>, info: Info) -> anyhow::Result<()> {
		match info {
			Info::Exit { id, reason } => {
				let _ = self.exits.send((id, reason));
				Ok(())
			}
			Info::User(_) => Err(ActorError::Unhandled.into()),
		}
	}
}

#[tokio::test]
async fn casts_are_processed_in_order() {
	let link = Probe::start(ProbeArgs::default()).await.unwrap();
	for value in 1..=5 {
		link.cast(ProbeCast::Push(value));
	}

	let log = link.call(ProbeCall::Log, WAIT).await.unwrap();
	assert_eq!(log, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn refused_init_leaves_no_actor() {
	let err = Probe::start(ProbeArgs {
		refuse: true,
		..Default::default()
	})
	.await
	.unwrap_err();

	match err {
		StartError::Refused(reason) => assert_eq!(reason.to_string(), "error: not today"),
		other => panic!("unexpected error: {other}"),
	}
}

#[tokio::test]
async fn panicking_init_is_a_refusal() {
	let err = runy_otp::start::<Probe>(ProbeArgs {
		panic: true,
		..Default::default()
	})
	.await
	.unwrap_err();

	match err {
		StartError::Refused(ExitReason::Panic(msg)) => assert!(msg.contains("init exploded")),
		other => panic!("unexpected error: {other}"),
	}
}

#[tokio::test]
async fn continuation_runs_before_first_message() {
	let link = Probe::start(ProbeArgs {
		preload: Some(10),
		..Default::default()
	})
	.await
	.unwrap();
	link.cast(ProbeCast::Push(11));

	assert_eq!(link.call(ProbeCall::Log, WAIT).await.unwrap(), vec![10, 11]);
}

#[tokio::test]
async fn call_times_out_but_actor_survives() {
	let link = Probe::start(ProbeArgs::default()).await.unwrap();

	let err = link
		.call(ProbeCall::Slow(Duration::from_millis(200)), Duration::from_millis(20))
		.await
		.unwrap_err();
	assert!(matches!(err, CallError::Timeout(_)));
	assert!(link.alive());

	// the slow call still completes before this one
	assert!(link.call(ProbeCall::Log, WAIT).await.unwrap().is_empty());
}

#[tokio::test]
async fn panic_in_call_reaches_the_caller_as_exit_reason() {
	let (args, mut reports) = probe();
	let link = Probe::start(args).await.unwrap();

	match link.call(ProbeCall::Boom, WAIT).await.unwrap_err() {
		CallError::Actor(ExitReason::Panic(msg)) => assert!(msg.contains("boom")),
		other => panic!("unexpected error: {other}"),
	}
	assert!(!link.alive());

	let (reason, _) = reports.recv().await.unwrap();
	assert!(matches!(reason, ExitReason::Panic(_)));

	let err = link.call(ProbeCall::Log, WAIT).await.unwrap_err();
	assert!(matches!(err, CallError::NoProc));
}

#[tokio::test]
async fn failing_cast_stops_the_actor() {
	let (args, mut reports) = probe();
	let link = Probe::start(args).await.unwrap();
	link.cast(ProbeCast::Push(1));
	link.cast(ProbeCast::Fail);

	let reason = link.wait_exit().await;
	assert_eq!(reason.to_string(), "error: cast failed");

	let (reported, log) = reports.recv().await.unwrap();
	assert!(reported.is_abnormal());
	assert_eq!(log, vec![1]);
}

#[tokio::test]
async fn reply_async_frees_the_actor() {
	let link = Probe::start(ProbeArgs::default()).await.unwrap();

	let pending = link.request(ProbeCall::Later(7, Duration::from_millis(100)));
	link.cast(ProbeCast::Push(1));
	assert_eq!(
		link.call(ProbeCall::Log, Duration::from_millis(50)).await.unwrap(),
		vec![1]
	);

	assert_eq!(pending.timeout(WAIT).reply().await.unwrap(), vec![7]);
}

#[tokio::test]
async fn finished_background_replies_are_reaped() {
	let link = Probe::start(ProbeArgs::default()).await.unwrap();

	for i in 0..500 {
		let reply = link.call(ProbeCall::Later(i, Duration::ZERO), WAIT).await.unwrap();
		assert_eq!(reply, vec![i]);
	}

	let tracked = link.call(ProbeCall::Background, WAIT).await.unwrap();
	assert!(tracked[0] <= 1, "{} background tasks still tracked", tracked[0]);
}

#[tokio::test]
async fn unhandled_messages_are_discarded_by_default() {
	let link = Probe::start(ProbeArgs::default()).await.unwrap();
	link.info("not a number");
	link.info(5i64);

	assert_eq!(link.call(ProbeCall::Log, WAIT).await.unwrap(), vec![5]);
	assert!(link.alive());
}

#[tokio::test]
async fn unhandled_call_is_answered() {
	let link = Watcher::start(mpsc::unbounded_channel().0).await.unwrap();

	let err = link.call((), WAIT).await.unwrap_err();
	assert!(matches!(err, CallError::Unhandled));
	assert!(link.alive());
}

#[tokio::test]
async fn strict_actor_crashes_on_unhandled_message() {
	let link = Strict::start(()).await.unwrap();
	link.cast(());

	let reason = link.wait_exit().await;
	assert!(matches!(
		reason.downcast_ref::<ActorError>(),
		Some(ActorError::Unhandled)
	));
}

#[tokio::test]
async fn stop_takes_effect_before_queued_messages() {
	let (args, mut reports) = probe();
	let link = Probe::start(args).await.unwrap();
	link.cast(ProbeCast::Sleep(Duration::from_millis(50)));
	link.cast(ProbeCast::Push(1));
	link.stop(ExitReason::Shutdown);

	let (reason, log) = reports.recv().await.unwrap();
	assert!(matches!(reason, ExitReason::Shutdown));
	assert!(log.is_empty());
	assert!(matches!(link.wait_exit().await, ExitReason::Shutdown));
}

#[tokio::test]
async fn first_stop_reason_wins() {
	let link = Probe::start(ProbeArgs::default()).await.unwrap();
	link.stop(ExitReason::Shutdown);
	link.stop(ExitReason::msg("too late"));

	assert!(matches!(link.wait_exit().await, ExitReason::Shutdown));
}

#[tokio::test]
async fn kill_skips_terminate() {
	let (args, mut reports) = probe();
	let link = Probe::start(args).await.unwrap();
	link.kill();

	assert!(matches!(link.wait_exit().await, ExitReason::Killed));
	assert!(reports.recv().await.is_none());
}

#[tokio::test]
async fn dropping_every_handle_stops_the_actor() {
	let (args, mut reports) = probe();
	let link = Probe::start(args).await.unwrap();
	link.cast(ProbeCast::Push(3));
	drop(link);

	let (reason, log) = reports.recv().await.unwrap();
	assert!(matches!(reason, ExitReason::Normal));
	assert_eq!(log, vec![3]);
}

#[tokio::test]
async fn watcher_receives_exit_notification() {
	let (tx, mut exits) = mpsc::unbounded_channel();
	let watcher = Watcher::start(tx).await.unwrap();
	let target = Probe::start(ProbeArgs::default()).await.unwrap();

	watcher.watch(&target.to_ref());
	target.stop(ExitReason::msg("bye"));

	let (id, reason) = tokio::time::timeout(WAIT, exits.recv()).await.unwrap().unwrap();
	assert_eq!(id, target.id());
	assert!(reason.is_abnormal());
}

#[tokio::test]
async fn watching_an_exited_actor_notifies_at_once() {
	let (tx, mut exits) = mpsc::unbounded_channel();
	let watcher = Watcher::start(tx).await.unwrap();
	let target = Probe::start(ProbeArgs::default()).await.unwrap();
	target.stop_and_wait(ExitReason::Normal).await;

	watcher.watch(&target.to_ref());

	let (id, reason) = tokio::time::timeout(WAIT, exits.recv()).await.unwrap().unwrap();
	assert_eq!(id, target.id());
	assert!(matches!(reason, ExitReason::Normal));
}

#[tokio::test]
async fn untyped_handle_downcasts_to_its_actor() {
	let link = Probe::start(ProbeArgs::default()).await.unwrap();
	let actor: ActorRef = link.clone().into();

	assert!(actor.is::<Probe>());
	assert!(actor.downcast::<Watcher>().is_none());
	assert_eq!(actor.kind(), "Probe");

	let typed = actor.downcast::<Probe>().unwrap();
	typed.cast(ProbeCast::Push(9));
	assert_eq!(link.call(ProbeCall::Log, WAIT).await.unwrap(), vec![9]);
}
