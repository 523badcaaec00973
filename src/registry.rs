//! Name registry.
//!
//! A [`Registry`] maps logical names to live actors. It is an ordinary value:
//! construct one, hand clones to whoever needs lookups, and give it to the
//! root supervisor so it is cleared when the tree goes down.
//!
//! ## Rules
//! - at most one live actor per name; the first writer wins
//! - an entry whose actor has exited counts as vacant
//! - names are revoked automatically when their actor exits

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::actor::Actor;
use crate::error::RegistryError;
use crate::lifecycle::NameTable;
use crate::link::ActorId;
use crate::link::ActorRef;
use crate::link::Link;

#[derive(Clone, Default)]
pub struct Registry {
	names: Arc<NameTable>,
}

impl std::fmt::Debug for Registry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Registry")
			.field("len", &self.names.len())
			.finish()
	}
}

impl Registry {
	pub fn new() -> Self {
		Self {
			names: Arc::new(DashMap::new()),
		}
	}

	/// Binds `name` to `actor`.
	pub fn register(&self, name: impl Into<String>, actor: impl Into<ActorRef>) -> Result<(), RegistryError> {
		let name = name.into();
		let actor = actor.into();
		let life = actor.life().clone();

		let bound = life.bind_name(&self.names, &name, || match self.names.entry(name.clone()) {
			Entry::Vacant(slot) => {
				slot.insert(actor.clone());
				Ok(())
			}
			Entry::Occupied(mut slot) => {
				if slot.get().id() == actor.id() {
					return Ok(());
				}
				if slot.get().alive() {
					return Err(RegistryError::NameTaken(name.clone()));
				}
				// stale entry of an actor that is already gone
				slot.insert(actor.clone());
				Ok(())
			}
		});

		match bound {
			Some(Ok(())) => {
				tracing::debug!(%name, id = %actor.id(), "name registered");
				Ok(())
			}
			Some(Err(err)) => Err(err),
			None => Err(RegistryError::NoProc),
		}
	}

	/// Removes `name`. Returns the actor it pointed to, if any.
	pub fn unregister(&self, name: &str) -> Option<ActorRef> {
		self.names.remove(name).map(|(_, actor)| actor)
	}

	pub fn lookup<A: Actor>(&self, name: &str) -> Result<Link<A>, RegistryError> {
		let actor = self.lookup_ref(name)?;
		actor
			.downcast::<A>()
			.ok_or_else(|| RegistryError::WrongType(name.to_string()))
	}

	pub fn lookup_ref(&self, name: &str) -> Result<ActorRef, RegistryError> {
		match self.names.get(name) {
			Some(entry) if entry.alive() => Ok(entry.value().clone()),
			_ => Err(RegistryError::NotFound(name.to_string())),
		}
	}

	pub fn whereis(&self, name: &str) -> Option<ActorId> {
		self.lookup_ref(name).ok().map(|actor| actor.id())
	}

	/// Sorted list of names bound to live actors.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<String> = self
			.names
			.iter()
			.filter(|entry| entry.value().alive())
			.map(|entry| entry.key().clone())
			.collect();
		names.sort_unstable();
		names
	}

	pub fn len(&self) -> usize {
		self.names.len()
	}

	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	/// Drops every entry. Called when the owning root supervisor exits.
	pub fn clear(&self) {
		self.names.clear();
	}
}
