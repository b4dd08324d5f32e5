//! Use case execution and the context a use case body sees
//!
//! [`UseCaseExecutor::execute`] drives one execution through its lifecycle:
//!
//! ```text
//! WillExecute ─▶ body (sync segment) ─▶ DidExecute ─┬─▶ Complete { succeeded: true }
//!                                                   └─▶ Error ─▶ Complete { succeeded: false }
//! ```
//!
//! `WillExecute`, the synchronous segment and `DidExecute` run before
//! `execute` returns. `Error`/`Complete` follow immediately for a synchronous
//! body, or once the returned [`UseCaseHandle`] drives the async tail to
//! completion.

use std::cell::Cell;
use std::fmt::{self, Debug};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::config::ContextConfig;
use crate::dispatcher::{Dispatchable, Dispatcher};
use crate::error::{FluxError, UseCaseAbandoned, UseCaseError};
use crate::execution::{Execution, UseCaseHandle, UseCaseResult};
use crate::meta::{DispatcherPayloadMeta, IdGenerator, UseCaseId, UseCaseRef};
use crate::payload::{
    AnyPayload, ChangedPayload, CompletePayload, DidExecutePayload, ErrorPayload, Payload,
    WillExecutePayload,
};
use crate::subscription::Subscription;
use crate::use_case::UseCaseKind;

/// Shared services every execution needs.
pub(crate) struct Runtime<P: Payload> {
    pub(crate) dispatcher: Dispatcher<P>,
    pub(crate) ids: Rc<IdGenerator>,
    pub(crate) config: ContextConfig,
}

impl<P: Payload> Clone for Runtime<P> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            ids: Rc::clone(&self.ids),
            config: self.config,
        }
    }
}

/// One running (or finished) execution.
struct Scope<P: Payload> {
    use_case: UseCaseRef,
    parent: Option<UseCaseRef>,
    /// Definition addresses from the top-level use case down to this one
    ancestry: Vec<usize>,
    runtime: Runtime<P>,
    started: Instant,
    finished: Cell<bool>,
}

impl<P: Payload> Scope<P> {
    fn meta(&self) -> DispatcherPayloadMeta {
        DispatcherPayloadMeta::for_use_case(self.use_case.clone(), self.parent.clone())
            .finished(self.finished.get())
    }

    fn elapsed(&self) -> Option<Duration> {
        self.runtime
            .config
            .performance_profile
            .then(|| self.started.elapsed())
    }

    fn dispatch_lifecycle(&self, payload: AnyPayload<P>, elapsed: Option<Duration>) {
        let meta = self.meta().trusted().with_elapsed(elapsed);
        self.runtime.dispatcher.dispatch_with_meta(payload, meta);
    }

    fn did_execute(&self) {
        let elapsed = self.elapsed();
        if let Some(elapsed) = elapsed {
            debug!(use_case = %self.use_case, ?elapsed, "use case did execute");
        }
        self.dispatch_lifecycle(AnyPayload::DidExecute(DidExecutePayload), elapsed);
    }

    fn finish(&self, result: &UseCaseResult) {
        self.finished.set(true);

        if let Err(error) = result {
            debug!(use_case = %self.use_case, %error, "use case failed");
            self.dispatch_lifecycle(
                AnyPayload::Error(ErrorPayload {
                    error: error.clone(),
                }),
                None,
            );
        }

        let elapsed = self.elapsed();
        match elapsed {
            Some(elapsed) => debug!(
                use_case = %self.use_case,
                succeeded = result.is_ok(),
                ?elapsed,
                "use case completed"
            ),
            None => trace!(use_case = %self.use_case, succeeded = result.is_ok(), "use case completed"),
        }
        self.dispatch_lifecycle(
            AnyPayload::Complete(CompletePayload {
                succeeded: result.is_ok(),
            }),
            elapsed,
        );
    }

    fn abandon(&self) {
        warn!(use_case = %self.use_case, "use case handle dropped before completion");
        let error = UseCaseError::new(UseCaseAbandoned {
            name: self.use_case.name.to_string(),
        });
        self.finish(&Err(error));
    }
}

/// Closes the execution if its async tail is dropped unfinished.
struct FinishGuard<P: Payload> {
    scope: Rc<Scope<P>>,
}

impl<P: Payload> Drop for FinishGuard<P> {
    fn drop(&mut self) {
        if !self.scope.finished.get() && !std::thread::panicking() {
            self.scope.abandon();
        }
    }
}

/// Launches a use case. Obtained from [`Context::use_case`](crate::Context::use_case)
/// or, for nesting, [`UseCaseContext::use_case`].
pub struct UseCaseExecutor<P: Payload, A> {
    use_case: UseCaseKind<P, A>,
    runtime: Runtime<P>,
    parent: Option<Rc<Scope<P>>>,
}

impl<P: Payload, A: Debug + 'static> UseCaseExecutor<P, A> {
    pub(crate) fn new(use_case: UseCaseKind<P, A>, runtime: Runtime<P>) -> Self {
        Self {
            use_case,
            runtime,
            parent: None,
        }
    }

    pub fn name(&self) -> std::borrow::Cow<'static, str> {
        self.use_case.name()
    }

    /// The use case that launched this one, if nested.
    pub fn parent(&self) -> Option<&UseCaseRef> {
        self.parent.as_ref().map(|scope| &scope.use_case)
    }

    /// Run the use case with `args`.
    ///
    /// Every call is a separate execution with a fresh [`UseCaseId`].
    pub fn execute(&self, args: A) -> UseCaseHandle {
        if !self.use_case.should_execute(&args) {
            trace!(use_case = %self.use_case.name(), "should_execute returned false, skipping");
            return UseCaseHandle::ready(None, Ok(()));
        }

        let use_case = UseCaseRef::new(self.runtime.ids.next_use_case_id(), self.use_case.name());
        let (parent, mut ancestry) = match &self.parent {
            Some(scope) => (Some(scope.use_case.clone()), scope.ancestry.clone()),
            None => (None, Vec::new()),
        };
        ancestry.push(self.use_case.identity());

        let scope = Rc::new(Scope {
            use_case,
            parent,
            ancestry,
            runtime: self.runtime.clone(),
            started: Instant::now(),
            finished: Cell::new(false),
        });
        let context = UseCaseContext {
            scope: Rc::clone(&scope),
        };

        debug!(
            use_case = %scope.use_case,
            parent = ?scope.parent.as_ref().map(ToString::to_string),
            "use case will execute"
        );
        scope.dispatch_lifecycle(
            AnyPayload::WillExecute(WillExecutePayload {
                args: format!("{:?}", args),
            }),
            None,
        );

        let execution = self.use_case.run(&context, args).poll_eagerly();
        scope.did_execute();

        match execution {
            Execution::Done(result) => {
                scope.finish(&result);
                UseCaseHandle::ready(Some(scope.use_case.clone()), result)
            }
            Execution::Pending(future) => {
                let use_case = scope.use_case.clone();
                let guard = FinishGuard { scope };
                UseCaseHandle::pending(
                    use_case,
                    Box::pin(async move {
                        let result = future.await;
                        guard.scope.finish(&result);
                        result
                    }),
                )
            }
        }
    }
}

impl<P: Payload, A: Debug + 'static> fmt::Debug for UseCaseExecutor<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseCaseExecutor")
            .field("use_case", &self.use_case)
            .field("parent", &self.parent.as_ref().map(|scope| &scope.use_case))
            .finish()
    }
}

/// What a use case body sees while it runs.
///
/// Cheap to clone; move a clone into an async tail.
pub struct UseCaseContext<P: Payload> {
    scope: Rc<Scope<P>>,
}

impl<P: Payload> Clone for UseCaseContext<P> {
    fn clone(&self) -> Self {
        Self {
            scope: Rc::clone(&self.scope),
        }
    }
}

impl<P: Payload> UseCaseContext<P> {
    /// Identity of this execution.
    pub fn id(&self) -> UseCaseId {
        self.scope.use_case.id
    }

    pub fn name(&self) -> &str {
        &self.scope.use_case.name
    }

    pub fn use_case_ref(&self) -> &UseCaseRef {
        &self.scope.use_case
    }

    /// The execution that launched this one, if nested.
    pub fn parent(&self) -> Option<&UseCaseRef> {
        self.scope.parent.as_ref()
    }

    /// Whether `Complete` has been dispatched for this execution.
    pub fn is_finished(&self) -> bool {
        self.scope.finished.get()
    }

    /// Launch a child use case. Its payloads name this execution as parent.
    ///
    /// # Panics
    ///
    /// Panics with [`FluxError::RecursiveUseCase`] if `use_case` is this
    /// execution's own definition or one of its ancestors'. Use
    /// [`try_use_case`](Self::try_use_case) to handle that as an error.
    pub fn use_case<A: Debug + 'static>(
        &self,
        use_case: impl Into<UseCaseKind<P, A>>,
    ) -> UseCaseExecutor<P, A> {
        match self.try_use_case(use_case) {
            Ok(executor) => executor,
            Err(error) => panic!("{}", error),
        }
    }

    /// Launch a child use case, rejecting self-nesting.
    pub fn try_use_case<A: Debug + 'static>(
        &self,
        use_case: impl Into<UseCaseKind<P, A>>,
    ) -> Result<UseCaseExecutor<P, A>, FluxError> {
        let use_case = use_case.into();
        if self.scope.ancestry.contains(&use_case.identity()) {
            return Err(FluxError::RecursiveUseCase {
                name: use_case.name().into_owned(),
            });
        }

        Ok(UseCaseExecutor {
            use_case,
            runtime: self.scope.runtime.clone(),
            parent: Some(Rc::clone(&self.scope)),
        })
    }

    /// Report an error to observers without failing this execution.
    pub fn throw_error(&self, error: impl Into<UseCaseError>) {
        let error = error.into();
        debug!(use_case = %self.scope.use_case, %error, "use case reported error");
        self.scope
            .dispatch_lifecycle(AnyPayload::Error(ErrorPayload { error }), None);
    }

    /// Ask store groups to flush what changed so far.
    pub fn request_flush(&self) {
        self.scope
            .dispatch_lifecycle(AnyPayload::Changed(ChangedPayload), None);
    }
}

impl<P: Payload> Dispatchable<P> for UseCaseContext<P> {
    /// Dispatch an application payload on behalf of this execution.
    fn dispatch(&self, payload: P) {
        self.scope
            .runtime
            .dispatcher
            .dispatch_with_meta(AnyPayload::User(payload), self.scope.meta());
    }

    /// Observe payloads produced by this execution or its direct children.
    fn on_dispatch<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AnyPayload<P>, &DispatcherPayloadMeta) + 'static,
    {
        let id = self.id();
        self.scope.runtime.dispatcher.on_dispatch(move |payload, meta| {
            let own = meta.use_case_id() == Some(id);
            let child = meta.parent_use_case.as_ref().map(|parent| parent.id) == Some(id);
            if own || child {
                handler(payload, meta);
            }
        })
    }
}

impl<P: Payload> fmt::Debug for UseCaseContext<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UseCaseContext")
            .field("use_case", &self.scope.use_case)
            .field("parent", &self.scope.parent)
            .field("finished", &self.scope.finished.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_case::{FunctionalUseCase, UseCase};
    use std::cell::RefCell;

    #[derive(Clone, Debug, PartialEq)]
    enum TestPayload {
        Note(&'static str),
    }

    impl Payload for TestPayload {
        fn kind(&self) -> &'static str {
            "Note"
        }
    }

    type Log = Rc<RefCell<Vec<(AnyPayload<TestPayload>, DispatcherPayloadMeta)>>>;

    fn runtime(config: ContextConfig) -> (Runtime<TestPayload>, Log) {
        let dispatcher = Dispatcher::new();
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        dispatcher.on_dispatch(move |payload, meta| {
            l.borrow_mut().push((payload.clone(), meta.clone()));
        });
        let runtime = Runtime {
            dispatcher,
            ids: Rc::new(IdGenerator::new()),
            config,
        };
        (runtime, log)
    }

    fn kinds(log: &Log) -> Vec<&'static str> {
        log.borrow().iter().map(|(payload, _)| payload.kind()).collect()
    }

    struct Greet;

    impl UseCase<TestPayload> for Greet {
        type Args = &'static str;

        fn should_execute(&self, who: &&'static str) -> bool {
            !who.is_empty()
        }

        fn execute(&self, context: &UseCaseContext<TestPayload>, who: &'static str) -> Execution {
            context.dispatch(TestPayload::Note(who));
            Execution::done()
        }
    }

    #[test]
    fn test_sync_lifecycle_order() {
        let (runtime, log) = runtime(ContextConfig::default());
        let executor = UseCaseExecutor::new(Rc::new(Greet).into(), runtime);

        let handle = executor.execute("world");

        assert!(handle.is_ready());
        assert_eq!(
            kinds(&log),
            vec!["WillExecute", "Note", "DidExecute", "Complete"]
        );

        let log = log.borrow();
        let (will, will_meta) = &log[0];
        assert_eq!(
            will,
            &AnyPayload::WillExecute(WillExecutePayload {
                args: "\"world\"".into()
            })
        );
        assert!(will_meta.is_trusted);
        assert!(!will_meta.is_use_case_finished);
        assert_eq!(will_meta.use_case.as_ref().map(|u| u.name.as_ref()), Some("Greet"));

        let (_, note_meta) = &log[1];
        assert!(!note_meta.is_trusted);
        assert_eq!(note_meta.use_case_id(), will_meta.use_case_id());

        let (complete, complete_meta) = &log[3];
        assert_eq!(
            complete,
            &AnyPayload::Complete(CompletePayload { succeeded: true })
        );
        assert!(complete_meta.is_use_case_finished);
        assert!(complete_meta.elapsed.is_none());
    }

    #[test]
    fn test_should_execute_short_circuits() {
        let (runtime, log) = runtime(ContextConfig::default());
        let ids = Rc::clone(&runtime.ids);
        let executor = UseCaseExecutor::new(Rc::new(Greet).into(), runtime);

        let handle = executor.execute("");

        assert!(handle.is_ready());
        assert!(handle.use_case().is_none());
        assert!(log.borrow().is_empty());
        assert_eq!(ids.peek(), 1);
    }

    #[test]
    fn test_each_execution_has_fresh_id() {
        let (runtime, _log) = runtime(ContextConfig::default());
        let executor = UseCaseExecutor::new(Rc::new(Greet).into(), runtime);

        let first = executor.execute("a");
        let second = executor.execute("b");

        let first = first.use_case().map(|u| u.id);
        let second = second.use_case().map(|u| u.id);
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_sync_error_lifecycle() {
        let (runtime, log) = runtime(ContextConfig::default());
        let error = UseCaseError::msg("invalid");
        let raised = error.clone();
        let executor = UseCaseExecutor::new(
            UseCaseKind::functional("Fail", move |_ctx: &UseCaseContext<TestPayload>, _: ()| {
                Execution::Done(Err(raised.clone()))
            }),
            runtime,
        );

        let result = executor.execute(()).await;

        assert_eq!(result, Err(error.clone()));
        assert_eq!(
            kinds(&log),
            vec!["WillExecute", "DidExecute", "Error", "Complete"]
        );
        let log = log.borrow();
        assert_eq!(log[2].0, AnyPayload::Error(ErrorPayload { error }));
        assert!(log[2].1.is_use_case_finished);
        assert_eq!(
            log[3].0,
            AnyPayload::Complete(CompletePayload { succeeded: false })
        );
    }

    #[tokio::test]
    async fn test_async_tail_completes_when_awaited() {
        let (runtime, log) = runtime(ContextConfig::default());
        let executor = UseCaseExecutor::new(
            UseCaseKind::functional("Load", |ctx: &UseCaseContext<TestPayload>, _: ()| {
                let ctx = ctx.clone();
                Execution::pending(async move {
                    ctx.dispatch(TestPayload::Note("before"));
                    tokio::task::yield_now().await;
                    ctx.dispatch(TestPayload::Note("after"));
                    Ok(())
                })
            }),
            runtime,
        );

        let handle = executor.execute(());
        assert!(!handle.is_ready());
        assert_eq!(kinds(&log), vec!["WillExecute", "Note", "DidExecute"]);

        handle.await.unwrap();
        assert_eq!(
            kinds(&log),
            vec!["WillExecute", "Note", "DidExecute", "Note", "Complete"]
        );
        assert!(log.borrow()[3].1.use_case.is_some());
    }

    #[tokio::test]
    async fn test_dropped_pending_handle_closes_execution() {
        let (runtime, log) = runtime(ContextConfig::default());
        let executor = UseCaseExecutor::new(
            UseCaseKind::functional("Slow", |ctx: &UseCaseContext<TestPayload>, _: ()| {
                let ctx = ctx.clone();
                Execution::pending(async move {
                    tokio::task::yield_now().await;
                    ctx.dispatch(TestPayload::Note("never"));
                    Ok(())
                })
            }),
            runtime,
        );

        let handle = executor.execute(());
        assert!(!handle.is_ready());
        drop(handle);

        assert_eq!(
            kinds(&log),
            vec!["WillExecute", "DidExecute", "Error", "Complete"]
        );
        let log = log.borrow();
        match &log[2].0 {
            AnyPayload::Error(payload) => {
                let abandoned = payload.error.downcast_ref::<UseCaseAbandoned>();
                assert_eq!(abandoned.map(|e| e.name.as_str()), Some("Slow"));
            }
            other => panic!("expected error payload, got {:?}", other),
        }
        assert!(log[2].1.is_use_case_finished);
        assert_eq!(
            log[3].0,
            AnyPayload::Complete(CompletePayload { succeeded: false })
        );
    }

    #[tokio::test]
    async fn test_completed_handle_drop_does_not_abandon() {
        let (runtime, log) = runtime(ContextConfig::default());
        let executor = UseCaseExecutor::new(
            UseCaseKind::functional("Quick", |_ctx: &UseCaseContext<TestPayload>, _: ()| {
                Execution::pending(async {
                    tokio::task::yield_now().await;
                    Ok(())
                })
            }),
            runtime,
        );

        executor.execute(()).await.unwrap();

        assert_eq!(kinds(&log), vec!["WillExecute", "DidExecute", "Complete"]);
    }

    #[test]
    fn test_executor_debug_names_use_case() {
        let (runtime, _log) = runtime(ContextConfig::default());
        let executor = UseCaseExecutor::new(Rc::new(Greet).into(), runtime);
        let rendered = format!("{:?}", executor);
        assert!(rendered.starts_with("UseCaseExecutor"));
        assert!(rendered.contains("parent: None"));
    }

    #[tokio::test]
    async fn test_nested_use_case_records_parent() {
        let (runtime, log) = runtime(ContextConfig::default());
        let child = Rc::new(Greet);
        let executor = UseCaseExecutor::new(
            UseCaseKind::functional("Parent", move |ctx: &UseCaseContext<TestPayload>, _: ()| {
                let nested = ctx.use_case(child.clone());
                assert_eq!(nested.parent(), Some(ctx.use_case_ref()));
                let handle = nested.execute("child");
                Execution::pending(handle)
            }),
            runtime,
        );

        executor.execute(()).await.unwrap();

        let log = log.borrow();
        let parent_id = log[0].1.use_case_id();
        let child_payloads: Vec<_> = log
            .iter()
            .filter(|(_, meta)| meta.parent_use_case.as_ref().map(|p| p.id) == parent_id)
            .map(|(payload, _)| payload.kind())
            .collect();
        assert_eq!(
            child_payloads,
            vec!["WillExecute", "Note", "DidExecute", "Complete"]
        );
        assert_eq!(log.last().map(|(p, _)| p.kind()), Some("Complete"));
        assert!(log.last().map(|(_, m)| m.is_top_level()).unwrap_or(false));
    }

    #[test]
    fn test_self_nesting_is_rejected() {
        let (runtime, _log) = runtime(ContextConfig::default());
        let slot: Rc<RefCell<Option<UseCaseKind<TestPayload, ()>>>> = Rc::new(RefCell::new(None));
        let outcome: Rc<RefCell<Option<FluxError>>> = Rc::new(RefCell::new(None));

        let inner_slot = slot.clone();
        let inner_outcome = outcome.clone();
        let kind: UseCaseKind<TestPayload, ()> = FunctionalUseCase::new(
            "Loop",
            move |ctx: &UseCaseContext<TestPayload>, _: ()| {
                if let Some(me) = inner_slot.borrow().clone() {
                    *inner_outcome.borrow_mut() = ctx.try_use_case(me).err();
                }
                Execution::done()
            },
        )
        .into();
        *slot.borrow_mut() = Some(kind.clone());

        UseCaseExecutor::new(kind, runtime).execute(());

        match outcome.borrow_mut().take() {
            Some(FluxError::RecursiveUseCase { name }) => assert_eq!(name, "Loop"),
            other => panic!("expected recursion error, got {:?}", other),
        }
        slot.borrow_mut().take();
    }

    #[test]
    fn test_throw_error_is_soft() {
        let (runtime, log) = runtime(ContextConfig::default());
        let executor = UseCaseExecutor::new(
            UseCaseKind::functional("Partial", |ctx: &UseCaseContext<TestPayload>, _: ()| {
                ctx.throw_error(UseCaseError::msg("one item skipped"));
                Execution::done()
            }),
            runtime,
        );

        let handle = executor.execute(());

        assert!(handle.is_ready());
        assert_eq!(
            kinds(&log),
            vec!["WillExecute", "Error", "DidExecute", "Complete"]
        );
        let log = log.borrow();
        assert!(!log[1].1.is_use_case_finished);
        assert_eq!(
            log[3].0,
            AnyPayload::Complete(CompletePayload { succeeded: true })
        );
    }

    #[test]
    fn test_request_flush_dispatches_changed() {
        let (runtime, log) = runtime(ContextConfig::default());
        let executor = UseCaseExecutor::new(
            UseCaseKind::functional("Step", |ctx: &UseCaseContext<TestPayload>, _: ()| {
                ctx.request_flush();
                Execution::done()
            }),
            runtime,
        );

        executor.execute(());
        assert_eq!(
            kinds(&log),
            vec!["WillExecute", "Changed", "DidExecute", "Complete"]
        );
        assert!(log.borrow()[1].1.is_trusted);
    }

    #[test]
    fn test_performance_profile_records_elapsed() {
        let (runtime, log) = runtime(ContextConfig::new().performance_profile(true));
        let executor = UseCaseExecutor::new(Rc::new(Greet).into(), runtime);

        executor.execute("timed");

        let log = log.borrow();
        assert!(log[0].1.elapsed.is_none());
        assert!(log[2].1.elapsed.is_some());
        assert!(log[3].1.elapsed.is_some());
    }

    #[test]
    fn test_context_on_dispatch_sees_own_payloads() {
        let (runtime, _log) = runtime(ContextConfig::default());
        let outside = runtime.dispatcher.clone();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        let executor = UseCaseExecutor::new(
            UseCaseKind::functional("Watch", move |ctx: &UseCaseContext<TestPayload>, _: ()| {
                let s = s.clone();
                let sub = ctx.on_dispatch(move |payload, _meta| s.borrow_mut().push(payload.kind()));
                outside.dispatch(TestPayload::Note("outside"));
                ctx.dispatch(TestPayload::Note("inside"));
                sub.unsubscribe();
                Execution::done()
            }),
            runtime,
        );

        executor.execute(());
        assert_eq!(*seen.borrow(), vec!["Note"]);
    }
}
