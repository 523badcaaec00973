use std::future::Future;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;

use take_once::TakeOnce;

use crate::actor::Actor;
use crate::actor::Context;
use crate::envelope::ReplyTx;
use crate::error::ActorError;

/// Step context handed to `handle_cast`, `handle_info` and
/// `handle_continue`.
pub struct Exec<'a, A: Actor> {
    pub(crate) ctx: &'a mut Context<A>,
}

impl<'a, A: Actor> Exec<'a, A> {
    pub fn new(ctx: &'a mut Context<A>) -> Self {
        Self { ctx }
    }
}

impl<'a, A: Actor> Deref for Exec<'a, A> {
    type Target = Context<A>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<'a, A: Actor> DerefMut for Exec<'a, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

/// Step context handed to `handle_call`. Holds the caller's reply address.
pub struct Call<'a, A: Actor> {
    pub(crate) reply: Arc<TakeOnce<ReplyTx<A::Reply>>>,
    pub ctx: Exec<'a, A>,
}

impl<'a, A: Actor> Deref for Call<'a, A> {
    type Target = Exec<'a, A>;

    fn deref(&self) -> &Self::Target {
        &self.ctx
    }
}

impl<'a, A: Actor> DerefMut for Call<'a, A> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.ctx
    }
}

impl<A: Actor> Call<'_, A> {
    /// Answers the call from a background future so the actor can move on
    /// to its next message.
    ///
    /// Return the value of this method from `handle_call`. The future is
    /// aborted if the actor stops first; the caller then sees the exit
    /// reason.
    pub fn reply_async<F>(&mut self, future: F) -> anyhow::Result<A::Reply>
    where
        F: Future<Output = A::Reply> + Send + 'static,
    {
        let Some(reply) = self.reply.take() else {
            return Err(ActorError::ReplyTaken.into());
        };

        self.ctx.spawn(async move {
            let value = future.await;
            let _ = reply.send(Ok(value));
        });

        Err(ActorError::AsyncReply.into())
    }
}
