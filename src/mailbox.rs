use tokio::sync::mpsc;

use crate::actor::Actor;
use crate::envelope::Envelope;

/// Receiving end of an actor's mailbox. Owned by the actor task only.
pub struct Mailbox<A: Actor> {
	rx: mpsc::UnboundedReceiver<Envelope<A>>,
}

/// Sending end of an actor's mailbox.
pub(crate) struct MailboxSender<A: Actor> {
	tx: mpsc::UnboundedSender<Envelope<A>>,
}

impl<A: Actor> Clone for MailboxSender<A> {
	fn clone(&self) -> Self {
		Self {
			tx: self.tx.clone(),
		}
	}
}

/// Creates an unbounded FIFO mailbox.
pub(crate) fn channel<A: Actor>() -> (MailboxSender<A>, Mailbox<A>) {
	let (tx, rx) = mpsc::unbounded_channel();
	(MailboxSender { tx }, Mailbox { rx })
}

impl<A: Actor> Mailbox<A> {
	pub async fn recv(&mut self) -> Option<Envelope<A>> {
		self.rx.recv().await
	}

	/// Number of messages waiting.
	pub fn len(&self) -> usize {
		self.rx.len()
	}

	pub fn is_empty(&self) -> bool {
		self.rx.is_empty()
	}

	/// Refuses new messages; already queued ones can still be received.
	pub(crate) fn close(&mut self) {
		self.rx.close()
	}
}

impl<A: Actor> MailboxSender<A> {
	/// Enqueues the envelope, handing it back if the actor is gone.
	pub fn send(&self, envelope: Envelope<A>) -> Result<(), Envelope<A>> {
		self.tx.send(envelope).map_err(|err| err.0)
	}

	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}
