//! Read-side state containers
//!
//! A store owns one slice of application state, reacts to dispatched
//! payloads, and signals "maybe changed" through its [`ChangeSignal`].
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use flux_dispatch::{AnyPayload, ChangeSignal, DispatcherPayloadMeta, StateCell, Store};
//!
//! #[derive(Clone, Debug, Default)]
//! struct CounterState {
//!     count: i32,
//! }
//!
//! #[derive(Default)]
//! struct CounterStore {
//!     state: StateCell<CounterState>,
//! }
//!
//! impl Store<CounterPayload> for CounterStore {
//!     type State = CounterState;
//!
//!     fn get_state(&self) -> Rc<CounterState> {
//!         self.state.get()
//!     }
//!
//!     fn receive_payload(&self, payload: &AnyPayload<CounterPayload>, _meta: &DispatcherPayloadMeta) {
//!         if let Some(CounterPayload::Increment) = payload.as_user() {
//!             self.state.update(|s| s.count += 1);
//!         }
//!     }
//!
//!     fn change_signal(&self) -> &ChangeSignal {
//!         self.state.signal()
//!     }
//! }
//! ```

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::meta::DispatcherPayloadMeta;
use crate::payload::{AnyPayload, Payload};
use crate::subscription::{Listeners, Subscription};

type ChangeListener = dyn Fn();

/// "Maybe changed" notification channel owned by a store.
///
/// Emitting is always safe: with no observers it does nothing, and repeated
/// emits without an intervening state change are harmless.
#[derive(Clone, Default)]
pub struct ChangeSignal {
    listeners: Listeners<ChangeListener>,
}

impl fmt::Debug for ChangeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSignal")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl ChangeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notify every observer.
    pub fn emit_change(&self) {
        for listener in self.listeners.snapshot() {
            listener();
        }
    }

    /// Register an observer.
    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        let listener: Rc<ChangeListener> = Rc::new(handler);
        self.listeners.add(listener)
    }

    pub fn observer_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Trait for read-side state containers
///
/// Stores are shared (`Rc`) between the application and a
/// [`StoreGroup`](crate::StoreGroup), so every method takes `&self` and
/// mutation goes through interior mutability.
pub trait Store<P: Payload>: 'static {
    /// State snapshot type.
    type State: 'static;

    /// Display name, used in change lists and logs.
    fn name(&self) -> &str {
        short_type_name::<Self>()
    }

    /// Key under which a positional group merges this store's state.
    ///
    /// Defaults to the name without a trailing `Store`, in snake case:
    /// `TodoListStore` becomes `todo_list`.
    fn state_key(&self) -> String {
        default_state_key(self.name())
    }

    /// Current snapshot.
    ///
    /// Must not mutate, and must return the same `Rc` until the state changes.
    fn get_state(&self) -> Rc<Self::State>;

    /// React to a payload sent on the shared channel.
    fn receive_payload(&self, _payload: &AnyPayload<P>, _meta: &DispatcherPayloadMeta) {}

    /// Channel used to announce state changes.
    fn change_signal(&self) -> &ChangeSignal;

    /// Announce that the state may have changed.
    fn emit_change(&self) {
        self.change_signal().emit_change();
    }

    /// Observe change announcements.
    fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + 'static,
        Self: Sized,
    {
        self.change_signal().on_change(handler)
    }
}

/// Type-erased view of a [`Store`], as held by a store group.
pub trait DynStore<P: Payload> {
    fn name(&self) -> &str;
    fn state_key(&self) -> String;
    fn snapshot(&self) -> Rc<dyn Any>;
    fn receive_payload(&self, payload: &AnyPayload<P>, meta: &DispatcherPayloadMeta);
    fn change_signal(&self) -> &ChangeSignal;
}

impl<P, S> DynStore<P> for S
where
    P: Payload,
    S: Store<P>,
{
    fn name(&self) -> &str {
        Store::<P>::name(self)
    }

    fn state_key(&self) -> String {
        Store::<P>::state_key(self)
    }

    fn snapshot(&self) -> Rc<dyn Any> {
        Store::<P>::get_state(self)
    }

    fn receive_payload(&self, payload: &AnyPayload<P>, meta: &DispatcherPayloadMeta) {
        Store::<P>::receive_payload(self, payload, meta)
    }

    fn change_signal(&self) -> &ChangeSignal {
        Store::<P>::change_signal(self)
    }
}

/// Copy-on-write state holder for store implementations.
///
/// Every update installs a fresh `Rc`, so snapshots handed out earlier are
/// never mutated and unchanged state keeps its identity.
pub struct StateCell<S> {
    state: RefCell<Rc<S>>,
    signal: ChangeSignal,
}

impl<S: Default> Default for StateCell<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S: fmt::Debug> fmt::Debug for StateCell<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCell")
            .field("state", &self.state.borrow())
            .field("signal", &self.signal)
            .finish()
    }
}

impl<S> StateCell<S> {
    pub fn new(state: S) -> Self {
        Self {
            state: RefCell::new(Rc::new(state)),
            signal: ChangeSignal::new(),
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> Rc<S> {
        Rc::clone(&self.state.borrow())
    }

    /// Replace the state and emit a change.
    pub fn set(&self, state: S) {
        *self.state.borrow_mut() = Rc::new(state);
        self.signal.emit_change();
    }

    /// Replace the state without emitting.
    pub fn replace_silently(&self, state: S) {
        *self.state.borrow_mut() = Rc::new(state);
    }

    pub fn signal(&self) -> &ChangeSignal {
        &self.signal
    }
}

impl<S: Clone> StateCell<S> {
    /// Apply `f` to a copy of the state, install it, and emit a change.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut S),
    {
        let mut next = S::clone(&self.state.borrow());
        f(&mut next);
        self.set(next);
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// `TodoListStore` → `todo_list`, `AStore` → `a`, `Store` → `store`.
pub fn default_state_key(name: &str) -> String {
    let base = match name.strip_suffix("Store") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => name,
    };

    let mut key = String::with_capacity(base.len() + 4);
    for (i, ch) in base.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                key.push('_');
            }
            key.extend(ch.to_lowercase());
        } else {
            key.push(ch);
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::convert::Infallible;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct CounterState {
        count: i32,
    }

    #[derive(Default)]
    struct CounterStore {
        state: StateCell<CounterState>,
    }

    impl Store<Infallible> for CounterStore {
        type State = CounterState;

        fn get_state(&self) -> Rc<CounterState> {
            self.state.get()
        }

        fn change_signal(&self) -> &ChangeSignal {
            self.state.signal()
        }
    }

    #[test]
    fn test_default_name_and_key() {
        let store = CounterStore::default();
        assert_eq!(Store::<Infallible>::name(&store), "CounterStore");
        assert_eq!(Store::<Infallible>::state_key(&store), "counter");
    }

    #[test]
    fn test_default_state_key() {
        assert_eq!(default_state_key("TodoListStore"), "todo_list");
        assert_eq!(default_state_key("AStore"), "a");
        assert_eq!(default_state_key("Store"), "store");
        assert_eq!(default_state_key("Profile"), "profile");
    }

    #[test]
    fn test_get_state_is_stable_until_update() {
        let store = CounterStore::default();
        let first = store.get_state();
        let second = store.get_state();
        assert!(Rc::ptr_eq(&first, &second));

        store.state.update(|s| s.count += 1);
        let third = store.get_state();
        assert!(!Rc::ptr_eq(&first, &third));
        assert_eq!(first.count, 0);
        assert_eq!(third.count, 1);
    }

    #[test]
    fn test_update_emits_change() {
        let store = CounterStore::default();
        let hits = Rc::new(Cell::new(0));

        let h = hits.clone();
        let sub = Store::<Infallible>::on_change(&store, move || h.set(h.get() + 1));

        store.state.update(|s| s.count = 5);
        store.state.set(CounterState { count: 6 });
        Store::<Infallible>::emit_change(&store);
        assert_eq!(hits.get(), 3);

        store.state.replace_silently(CounterState { count: 7 });
        assert_eq!(hits.get(), 3);
        assert_eq!(store.get_state().count, 7);

        sub.unsubscribe();
        store.state.set(CounterState::default());
        assert_eq!(hits.get(), 3);
    }

    #[test]
    fn test_emit_without_observers() {
        let signal = ChangeSignal::new();
        signal.emit_change();
        signal.emit_change();
        assert_eq!(signal.observer_count(), 0);
    }

    #[test]
    fn test_dyn_store_snapshot() {
        let store: Rc<dyn DynStore<Infallible>> = Rc::new(CounterStore::default());
        let snapshot = store.snapshot();
        let typed = snapshot.downcast::<CounterState>().expect("counter state");
        assert_eq!(typed.count, 0);
        assert_eq!(store.name(), "CounterStore");
    }
}
