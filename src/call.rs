use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::CallError;
use crate::lifecycle::Lifecycle;

/// Handle returned by `Link::request` - wait for the reply now, later, or
/// not at all.
pub struct PendingCall<R> {
    receiver: Option<oneshot::Receiver<Result<R, CallError>>>,
    life: Option<Arc<Lifecycle>>,
    timeout: Option<Duration>,
}

impl<R> PendingCall<R> {
    pub(crate) fn sent(receiver: oneshot::Receiver<Result<R, CallError>>, life: Arc<Lifecycle>) -> Self {
        Self {
            receiver: Some(receiver),
            life: Some(life),
            timeout: None,
        }
    }

    pub(crate) fn failed() -> Self {
        Self {
            receiver: None,
            life: None,
            timeout: None,
        }
    }

    /// Set timeout for the reply (chainable)
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check if the message reached the mailbox
    pub fn was_sent(&self) -> bool {
        self.receiver.is_some()
    }

    /// Wait for the reply from the actor
    pub async fn reply(mut self) -> Result<R, CallError> {
        let Some(receiver) = self.receiver.take() else {
            return Err(CallError::NoProc);
        };
        let life = self.life.take();

        let wait = async move {
            match receiver.await {
                Ok(result) => result,
                // the reply address was dropped: the actor died with our message
                Err(_) => match life {
                    Some(life) => Err(CallError::Actor(life.exited().await)),
                    None => Err(CallError::NoProc),
                },
            }
        };

        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait)
                .await
                .unwrap_or_else(|_| Err(CallError::Timeout(timeout))),
            None => wait.await,
        }
    }

    /// Non-blocking check. `Ok(None)` means no reply yet.
    pub fn try_reply(&mut self) -> Result<Option<R>, CallError> {
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(CallError::NoProc);
        };

        match receiver.try_recv() {
            Ok(result) => {
                self.receiver = None;
                result.map(Some)
            }
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => {
                match self.life.as_ref().and_then(|life| life.exit_reason()) {
                    Some(reason) => {
                        self.receiver = None;
                        Err(CallError::Actor(reason))
                    }
                    // closed but not finalized yet
                    None => Ok(None),
                }
            }
        }
    }

    /// Fire and forget - drop the reply address
    pub fn forget(mut self) {
        self.receiver.take();
    }
}
