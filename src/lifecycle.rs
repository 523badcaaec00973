use std::sync::Arc;
use std::sync::Weak;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::envelope::Info;
use crate::exit::ExitReason;
use crate::link::ActorId;
use crate::link::ActorRef;
use crate::link::DynamicLink;
use crate::stop::StopToken;

pub(crate) type NameTable = DashMap<String, ActorRef>;

/// Exit bookkeeping shared by every handle of one actor.
///
/// The exit reason, the monitor-set, the registered names and the linked
/// children all sit behind one lock, so an actor can never gain a watcher or
/// a name after it has been finalized.
pub(crate) struct Lifecycle {
	pub(crate) id: ActorId,
	pub(crate) kind: &'static str,
	exit: watch::Sender<Option<ExitReason>>,
	inner: Mutex<LifeState>,
}

#[derive(Default)]
struct LifeState {
	exited: bool,
	watchers: Vec<Watcher>,
	names: Vec<(Weak<NameTable>, String)>,
	linked: Vec<Linked>,
}

/// A child started under this actor, stopped when the parent exits.
struct Linked {
	token: StopToken,
	life: Weak<Lifecycle>,
}

impl Linked {
	fn is_live(&self) -> bool {
		!self.token.is_stopped() && self.life.upgrade().is_some_and(|life| !life.is_exited())
	}
}

struct Watcher {
	id: ActorId,
	link: Weak<dyn DynamicLink>,
}

impl Watcher {
	fn notify(&self, id: ActorId, reason: ExitReason) {
		match self.link.upgrade() {
			Some(link) => {
				if !link.deliver(Info::Exit { id, reason }) {
					tracing::trace!(watcher = %self.id, "watcher mailbox closed");
				}
			}
			None => tracing::trace!(watcher = %self.id, "watcher is gone"),
		}
	}
}

impl Lifecycle {
	pub(crate) fn new(id: ActorId, kind: &'static str) -> Self {
		Self {
			id,
			kind,
			exit: watch::Sender::new(None),
			inner: Mutex::new(LifeState::default()),
		}
	}

	pub(crate) fn exit_reason(&self) -> Option<ExitReason> {
		self.exit.borrow().clone()
	}

	pub(crate) fn is_exited(&self) -> bool {
		self.exit.borrow().is_some()
	}

	pub(crate) async fn exited(&self) -> ExitReason {
		let mut recv = self.exit.subscribe();
		let reason = {
			let result = recv.wait_for(Option::is_some).await;
			match result {
				Ok(reason) => (*reason).clone(),
				Err(_) => None,
			}
		};
		// `self` keeps the sender alive, so the channel never closes under us
		reason.unwrap_or_default()
	}

	/// Adds `watcher` to the monitor-set. An actor that already exited
	/// notifies right away.
	pub(crate) fn add_watcher(&self, id: ActorId, link: Weak<dyn DynamicLink>) {
		let watcher = Watcher { id, link };
		let mut inner = self.inner.lock();
		if inner.exited {
			drop(inner);
			watcher.notify(self.id, self.exit_reason().unwrap_or_default());
			return;
		}
		inner.watchers.push(watcher);
	}

	pub(crate) fn remove_watcher(&self, id: ActorId) {
		self.inner.lock().watchers.retain(|w| w.id != id);
	}

	/// Runs `insert` while the actor is guaranteed not to finalize, and
	/// records the name for revocation on exit.
	pub(crate) fn bind_name<E>(
		&self,
		table: &Arc<NameTable>,
		name: &str,
		insert: impl FnOnce() -> Result<(), E>,
	) -> Option<Result<(), E>> {
		let mut inner = self.inner.lock();
		if inner.exited {
			return None;
		}
		let result = insert();
		let known = inner
			.names
			.iter()
			.any(|(bound, bound_name)| bound_name == name && std::ptr::eq(bound.as_ptr(), Arc::as_ptr(table)));
		if result.is_ok() && !known {
			inner.names.push((Arc::downgrade(table), name.to_string()));
		}
		Some(result)
	}

	/// Stops the child's `token` with `Shutdown` once this actor exits.
	/// Children that already exited are dropped from the list.
	pub(crate) fn link_child(&self, token: StopToken, child: &Arc<Lifecycle>) {
		let mut inner = self.inner.lock();
		if inner.exited {
			drop(inner);
			token.stop(ExitReason::Shutdown);
			return;
		}
		inner.linked.retain(Linked::is_live);
		inner.linked.push(Linked {
			token,
			life: Arc::downgrade(child),
		});
	}

	/// Records the exit reason and fans it out. Runs once per actor, from
	/// the monitor task.
	pub(crate) fn finalize(&self, reason: ExitReason) {
		let (watchers, names, linked) = {
			let mut inner = self.inner.lock();
			if inner.exited {
				return;
			}
			inner.exited = true;
			self.exit.send_replace(Some(reason.clone()));
			(
				std::mem::take(&mut inner.watchers),
				std::mem::take(&mut inner.names),
				std::mem::take(&mut inner.linked),
			)
		};

		for (table, name) in names {
			if let Some(table) = table.upgrade() {
				table.remove_if(&name, |_, entry| entry.id() == self.id);
			}
		}

		for child in linked {
			child.token.stop(ExitReason::Shutdown);
		}

		for watcher in watchers {
			watcher.notify(self.id, reason.clone());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::actor::spawn;
	use crate::actor::Actor;
	use crate::actor::Init;
	use crate::actor::InitResult;
	use crate::actor::Startup;
	use crate::handler::Exec;

	impl Lifecycle {
		fn linked_len(&self) -> usize {
			self.inner.lock().linked.len()
		}

		fn names_len(&self) -> usize {
			self.inner.lock().names.len()
		}
	}

	struct Flaky;

	impl Actor for Flaky {
		/// `true` refuses to start.
		type Args = bool;
		type Call = ();
		type Reply = ();
		type Cast = ();
		type Continue = ();

		async fn init(init: Init<'_, Self>) -> InitResult<Self> {
			if init.args {
				return Err(ExitReason::msg("refused"));
			}
			Ok(Startup::ready(Flaky))
		}

		async fn handle_cast(&mut self, _ctx: Exec<'_, Self>, _msg: ()) -> anyhow::Result<()> {
			anyhow::bail!("flaky")
		}
	}

	#[tokio::test]
	async fn exited_children_are_not_kept() {
		let parent = Arc::new(Lifecycle::new(ActorId::next(), "parent"));

		for _ in 0..20 {
			let child = spawn::<Flaky>(false, Some(&parent)).await.unwrap();
			child.cast(());
			assert!(child.wait_exit().await.is_abnormal());
			assert!(spawn::<Flaky>(true, Some(&parent)).await.is_err());
		}

		let live = spawn::<Flaky>(false, Some(&parent)).await.unwrap();
		assert_eq!(parent.linked_len(), 1);

		parent.finalize(ExitReason::Normal);
		assert!(matches!(live.wait_exit().await, ExitReason::Shutdown));
	}

	#[test]
	fn binding_a_name_twice_records_it_once() {
		let life = Lifecycle::new(ActorId::next(), "named");
		let table = Arc::new(NameTable::new());
		let other = Arc::new(NameTable::new());

		for _ in 0..3 {
			let bound = life.bind_name(&table, "svc", || Ok::<(), ()>(()));
			assert!(matches!(bound, Some(Ok(()))));
		}
		assert_eq!(life.names_len(), 1);

		life.bind_name(&other, "svc", || Ok::<(), ()>(()));
		life.bind_name(&table, "alt", || Ok::<(), ()>(()));
		assert_eq!(life.names_len(), 3);

		life.finalize(ExitReason::Normal);
		assert!(life.bind_name(&table, "late", || Ok::<(), ()>(())).is_none());
	}
}
