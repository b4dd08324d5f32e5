//! Test utilities for flux-dispatch applications
//!
//! - [`ChangeRecorder`]: records which stores changed in each flush
//! - [`PayloadRecorder`]: records every payload sent on a dispatcher
//! - Assertion macros for verifying dispatched payloads
//!
//! # Example
//!
//! ```ignore
//! use flux_dispatch::testing::{ChangeRecorder, PayloadRecorder};
//! use flux_dispatch::{assert_dispatched, count_dispatched};
//!
//! let changes = ChangeRecorder::attach(context.store_group());
//! let payloads = PayloadRecorder::attach(context.dispatcher());
//!
//! context.use_case(Rc::new(AddTodo)).execute("milk".into()).await?;
//!
//! assert_eq!(changes.flushes(), vec![vec!["TodoStore"]]);
//! assert_dispatched!(payloads.user_payloads(), TodoPayload::Added { .. });
//! assert_eq!(count_dispatched!(payloads.payloads(), AnyPayload::Complete(_)), 1);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::dispatcher::{Dispatchable, Dispatcher};
use crate::meta::DispatcherPayloadMeta;
use crate::payload::{AnyPayload, Payload};
use crate::store_group::StoreGroup;
use crate::subscription::Subscription;

/// Records the changed-store names of every flush of a [`StoreGroup`].
pub struct ChangeRecorder {
    flushes: Rc<RefCell<Vec<Vec<String>>>>,
    subscription: Option<Subscription>,
}

impl ChangeRecorder {
    pub fn attach<P: Payload>(group: &StoreGroup<P>) -> Self {
        let flushes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&flushes);
        let subscription = group.on_change(move |changed| {
            sink.borrow_mut()
                .push(changed.iter().map(|store| store.name.clone()).collect());
        });

        Self {
            flushes,
            subscription: Some(subscription),
        }
    }

    /// Changed store names, one list per flush.
    pub fn flushes(&self) -> Vec<Vec<String>> {
        self.flushes.borrow().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.borrow().len()
    }

    pub fn last(&self) -> Option<Vec<String>> {
        self.flushes.borrow().last().cloned()
    }

    /// Take the recorded flushes, leaving the recorder empty.
    pub fn drain(&self) -> Vec<Vec<String>> {
        std::mem::take(&mut *self.flushes.borrow_mut())
    }

    /// Stop recording.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl fmt::Debug for ChangeRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRecorder")
            .field("flushes", &self.flushes.borrow())
            .field("attached", &self.subscription.is_some())
            .finish()
    }
}

/// One recorded dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPayload<P> {
    pub payload: AnyPayload<P>,
    pub meta: DispatcherPayloadMeta,
}

/// Records every payload sent on a [`Dispatcher`].
pub struct PayloadRecorder<P: Payload> {
    records: Rc<RefCell<Vec<RecordedPayload<P>>>>,
    subscription: Option<Subscription>,
}

impl<P: Payload> PayloadRecorder<P> {
    pub fn attach(dispatcher: &Dispatcher<P>) -> Self {
        let records = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&records);
        let subscription = dispatcher.on_dispatch(move |payload, meta| {
            sink.borrow_mut().push(RecordedPayload {
                payload: payload.clone(),
                meta: meta.clone(),
            });
        });

        Self {
            records,
            subscription: Some(subscription),
        }
    }

    pub fn records(&self) -> Vec<RecordedPayload<P>> {
        self.records.borrow().clone()
    }

    pub fn payloads(&self) -> Vec<AnyPayload<P>> {
        self.records
            .borrow()
            .iter()
            .map(|record| record.payload.clone())
            .collect()
    }

    /// Application payloads only, in dispatch order.
    pub fn user_payloads(&self) -> Vec<P> {
        self.records
            .borrow()
            .iter()
            .filter_map(|record| record.payload.as_user().cloned())
            .collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.records
            .borrow()
            .iter()
            .map(|record| record.payload.kind())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn drain(&self) -> Vec<RecordedPayload<P>> {
        std::mem::take(&mut *self.records.borrow_mut())
    }

    /// Stop recording.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl<P: Payload> fmt::Debug for PayloadRecorder<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadRecorder")
            .field("kinds", &self.kinds())
            .field("attached", &self.subscription.is_some())
            .finish()
    }
}

/// Assert that a payload matching a pattern was dispatched.
///
/// # Example
///
/// ```ignore
/// use flux_dispatch::assert_dispatched;
///
/// assert_dispatched!(recorder.user_payloads(), TodoPayload::Added { .. });
/// assert_dispatched!(recorder.payloads(), AnyPayload::Complete(c) if c.succeeded);
/// ```
#[macro_export]
macro_rules! assert_dispatched {
    ($payloads:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            $payloads.iter().any(|p| matches!(p, $pattern $(if $guard)?)),
            "Expected payload matching `{}` to be dispatched, but got: {:?}",
            stringify!($pattern),
            $payloads
        );
    };
}

/// Assert that no payload matching a pattern was dispatched.
///
/// # Example
///
/// ```ignore
/// use flux_dispatch::assert_not_dispatched;
///
/// assert_not_dispatched!(recorder.payloads(), AnyPayload::Error(_));
/// ```
#[macro_export]
macro_rules! assert_not_dispatched {
    ($payloads:expr, $pattern:pat $(if $guard:expr)?) => {
        assert!(
            !$payloads.iter().any(|p| matches!(p, $pattern $(if $guard)?)),
            "Expected payload matching `{}` NOT to be dispatched, but it was: {:?}",
            stringify!($pattern),
            $payloads
        );
    };
}

/// Count how many payloads match a pattern.
///
/// # Example
///
/// ```ignore
/// use flux_dispatch::count_dispatched;
///
/// assert_eq!(count_dispatched!(recorder.payloads(), AnyPayload::Error(_)), 1);
/// ```
#[macro_export]
macro_rules! count_dispatched {
    ($payloads:expr, $pattern:pat $(if $guard:expr)?) => {
        $payloads.iter().filter(|p| matches!(p, $pattern $(if $guard)?)).count()
    };
}

/// Find the first payload matching a pattern.
#[macro_export]
macro_rules! find_dispatched {
    ($payloads:expr, $pattern:pat $(if $guard:expr)?) => {
        $payloads.iter().find(|p| matches!(p, $pattern $(if $guard)?))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{IdGenerator, UseCaseRef};
    use crate::payload::CompletePayload;
    use crate::store::{ChangeSignal, StateCell, Store};

    #[derive(Clone, Debug, PartialEq)]
    enum TestPayload {
        Set(u8),
        Reset,
    }

    impl Payload for TestPayload {
        fn kind(&self) -> &'static str {
            match self {
                TestPayload::Set(_) => "Set",
                TestPayload::Reset => "Reset",
            }
        }
    }

    #[derive(Default)]
    struct ByteStore {
        state: StateCell<u8>,
    }

    impl Store<TestPayload> for ByteStore {
        type State = u8;

        fn get_state(&self) -> Rc<u8> {
            self.state.get()
        }

        fn receive_payload(&self, payload: &AnyPayload<TestPayload>, _meta: &DispatcherPayloadMeta) {
            match payload.as_user() {
                Some(TestPayload::Set(value)) => self.state.set(*value),
                Some(TestPayload::Reset) => self.state.set(0),
                None => {}
            }
        }

        fn change_signal(&self) -> &ChangeSignal {
            self.state.signal()
        }
    }

    #[test]
    fn test_payload_recorder() {
        let dispatcher = Dispatcher::new();
        let mut recorder = PayloadRecorder::attach(&dispatcher);

        dispatcher.dispatch(TestPayload::Set(3));
        let ids = IdGenerator::new();
        dispatcher.dispatch_with_meta(
            AnyPayload::Complete(CompletePayload { succeeded: true }),
            DispatcherPayloadMeta::for_use_case(UseCaseRef::new(ids.next_use_case_id(), "Job"), None)
                .trusted()
                .finished(true),
        );

        assert_eq!(recorder.kinds(), vec!["Set", "Complete"]);
        assert_eq!(recorder.user_payloads(), vec![TestPayload::Set(3)]);
        assert!(recorder.records()[1].meta.is_trusted);

        assert_dispatched!(recorder.user_payloads(), TestPayload::Set(n) if *n == 3);
        assert_not_dispatched!(recorder.user_payloads(), TestPayload::Reset);
        assert_eq!(
            count_dispatched!(recorder.payloads(), AnyPayload::Complete(c) if c.succeeded),
            1
        );
        assert!(find_dispatched!(recorder.payloads(), AnyPayload::User(_)).is_some());

        recorder.detach();
        dispatcher.dispatch(TestPayload::Reset);
        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.drain().len(), 2);
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_change_recorder() {
        let store = Rc::new(ByteStore::default());
        let group = StoreGroup::<TestPayload>::builder().store(store.clone()).build().unwrap();
        let dispatcher = Dispatcher::new();
        group.observe(&dispatcher);
        let mut recorder = ChangeRecorder::attach(&group);

        dispatcher.dispatch(TestPayload::Set(1));
        dispatcher.dispatch(TestPayload::Reset);

        assert_eq!(recorder.flush_count(), 2);
        assert_eq!(recorder.last(), Some(vec!["ByteStore".to_string()]));
        assert_eq!(recorder.drain().len(), 2);

        recorder.detach();
        dispatcher.dispatch(TestPayload::Set(9));
        assert_eq!(recorder.flush_count(), 0);
    }
}
