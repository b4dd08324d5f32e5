//! Use case body results and completion handles

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll, Waker};

use tracing::debug;

use crate::error::UseCaseError;
use crate::meta::UseCaseRef;

/// Outcome of a use case.
pub type UseCaseResult = Result<(), UseCaseError>;

/// Asynchronous tail of a use case body.
pub type UseCaseFuture = Pin<Box<dyn Future<Output = UseCaseResult>>>;

/// What a use case body hands back to the executor.
///
/// Everything the body does before returning is its synchronous segment.
/// A returned future is polled once right away, so an `async` block's code
/// up to its first suspension point belongs to that segment too.
///
/// Awaiting a future that is already ready does not suspend, so it does not
/// end the segment. To flush changes made so far, call
/// [`UseCaseContext::request_flush`](crate::UseCaseContext::request_flush) or
/// await `tokio::task::yield_now()`.
pub enum Execution {
    /// The use case finished synchronously.
    Done(UseCaseResult),
    /// The use case continues asynchronously.
    Pending(UseCaseFuture),
}

impl Execution {
    /// Synchronous success.
    pub fn done() -> Self {
        Execution::Done(Ok(()))
    }

    /// Synchronous failure.
    pub fn failed(error: impl Into<UseCaseError>) -> Self {
        Execution::Done(Err(error.into()))
    }

    /// Continue with an async tail.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = UseCaseResult> + 'static,
    {
        Execution::Pending(Box::pin(future))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Execution::Pending(_))
    }

    /// Poll a pending tail once, resolving it in place if it is already done.
    pub(crate) fn poll_eagerly(self) -> Self {
        match self {
            Execution::Pending(mut future) => {
                let mut cx = TaskContext::from_waker(Waker::noop());
                match future.as_mut().poll(&mut cx) {
                    Poll::Ready(result) => Execution::Done(result),
                    Poll::Pending => Execution::Pending(future),
                }
            }
            done => done,
        }
    }
}

impl From<UseCaseResult> for Execution {
    fn from(result: UseCaseResult) -> Self {
        Execution::Done(result)
    }
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Execution::Done(result) => f.debug_tuple("Done").field(result).finish(),
            Execution::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

enum HandleState {
    Ready(UseCaseResult),
    Pending(UseCaseFuture),
    Taken,
}

/// Completion handle returned by [`UseCaseExecutor::execute`](crate::UseCaseExecutor::execute).
///
/// Resolves to the use case's result. By the time `execute` returns, the
/// synchronous segment has already run and `DidExecute` has been dispatched;
/// a handle for a synchronous use case is ready immediately.
///
/// The async tail only makes progress while the handle is polled. Await it,
/// or call [`detach`](UseCaseHandle::detach) to run it in the background.
/// Dropping a pending handle abandons the tail: the execution is closed with
/// an `Error` carrying [`UseCaseAbandoned`](crate::UseCaseAbandoned) and a
/// failed `Complete`, so store groups stop waiting for it.
pub struct UseCaseHandle {
    use_case: Option<UseCaseRef>,
    state: HandleState,
}

impl UseCaseHandle {
    pub(crate) fn ready(use_case: Option<UseCaseRef>, result: UseCaseResult) -> Self {
        Self {
            use_case,
            state: HandleState::Ready(result),
        }
    }

    pub(crate) fn pending(use_case: UseCaseRef, future: UseCaseFuture) -> Self {
        Self {
            use_case: Some(use_case),
            state: HandleState::Pending(future),
        }
    }

    /// The execution this handle belongs to.
    ///
    /// `None` when the use case was skipped by `should_execute`.
    pub fn use_case(&self) -> Option<&UseCaseRef> {
        self.use_case.as_ref()
    }

    /// Whether the result is available without waiting.
    pub fn is_ready(&self) -> bool {
        !matches!(self.state, HandleState::Pending(_))
    }

    /// Run the remaining work in the background.
    ///
    /// Lifecycle payloads and flushes still happen; the result is only
    /// observable through the `Error`/`Complete` payloads.
    ///
    /// # Panics
    ///
    /// Panics when the handle is still pending and the caller is not inside a
    /// [`tokio::task::LocalSet`].
    pub fn detach(mut self) {
        let state = std::mem::replace(&mut self.state, HandleState::Taken);
        if let HandleState::Pending(future) = state {
            let use_case = self.use_case.clone();
            tokio::task::spawn_local(async move {
                if let Err(error) = future.await {
                    debug!(use_case = ?use_case, %error, "detached use case failed");
                }
            });
        }
    }
}

impl Future for UseCaseHandle {
    type Output = UseCaseResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let result = match std::mem::replace(&mut this.state, HandleState::Taken) {
            HandleState::Pending(mut future) => match future.as_mut().poll(cx) {
                Poll::Ready(result) => result,
                Poll::Pending => {
                    this.state = HandleState::Pending(future);
                    return Poll::Pending;
                }
            },
            HandleState::Ready(result) => result,
            HandleState::Taken => panic!("`UseCaseHandle` polled after completion"),
        };
        Poll::Ready(result)
    }
}

impl fmt::Debug for UseCaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseCaseHandle")
            .field("use_case", &self.use_case)
            .field("ready", &self.is_ready())
            .finish()
    }
}
