//! Store group: batched change notification over many stores
//!
//! A [`StoreGroup`] owns a fixed set of stores and presents them as one
//! merged state. Store change signals are collected into a pending set and
//! flushed as a single `on_change` notification at use case lifecycle
//! boundaries:
//!
//! - a synchronous use case that changes N stores produces one notification
//!   listing all N, in first-signalled order;
//! - a use case with an async tail produces one notification for the
//!   synchronous part (at `DidExecute`) and one for the tail (at `Complete`);
//! - nested use cases fold into their top-level use case's next boundary;
//! - a store that changes while no use case runs is flushed right away (or
//!   at the end of the dispatch that caused it).
//!
//! # Example
//!
//! ```ignore
//! let group = StoreGroup::builder()
//!     .store(todo_store.clone())
//!     .named_store("filter", filter_store.clone())
//!     .build()?;
//!
//! group.on_change(|changed| {
//!     for store in changed {
//!         println!("{} changed", store.name);
//!     }
//! });
//!
//! let state = group.get_state();
//! let todos = state.get::<TodoState>("todo");
//! ```

use std::any::Any;
use std::cell::{RefCell, RefMut};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::dispatcher::{Dispatchable, Dispatcher};
use crate::error::FluxError;
use crate::meta::{DispatcherPayloadMeta, UseCaseId};
use crate::payload::{AnyPayload, Payload};
use crate::store::{DynStore, Store};
use crate::subscription::{Listeners, Subscription};

/// One store that changed during a flush.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangedStore {
    /// Position in the group's construction order
    pub index: usize,
    /// The store's display name
    pub name: String,
    /// Key of the store's slice in [`MergedState`]
    pub key: String,
}

type ChangeListener = dyn Fn(&[ChangedStore]);

/// Merged snapshot of every store in a group.
///
/// Keys keep construction order. Values are the stores' own `Rc` snapshots,
/// so a key whose store did not change shares its value with the previous
/// merged state.
#[derive(Clone)]
pub struct MergedState {
    slots: Vec<(String, Rc<dyn Any>)>,
}

impl MergedState {
    /// Typed access to one store's state.
    pub fn get<T: 'static>(&self, key: &str) -> Option<Rc<T>> {
        self.get_raw(key)
            .and_then(|value| Rc::clone(value).downcast::<T>().ok())
    }

    /// Untyped access to one store's state.
    pub fn get_raw(&self, key: &str) -> Option<&Rc<dyn Any>> {
        self.slots
            .iter()
            .find(|(slot_key, _)| slot_key == key)
            .map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get_raw(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `key` holds the very same value in both states.
    pub fn shares_slot(&self, other: &MergedState, key: &str) -> bool {
        match (self.get_raw(key), other.get_raw(key)) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for MergedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedState")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .finish()
    }
}

struct GroupEntry<P: Payload> {
    key: String,
    store: Rc<dyn DynStore<P>>,
}

impl<P: Payload> GroupEntry<P> {
    fn describe(&self, index: usize) -> ChangedStore {
        ChangedStore {
            index,
            name: self.store.name().to_string(),
            key: self.key.clone(),
        }
    }
}

#[derive(Default)]
struct GroupState {
    /// Per-store "already pending this cycle" flags
    pending: Vec<bool>,
    /// Pending stores in first-signalled order
    changed_order: Vec<usize>,
    cache: Option<Rc<MergedState>>,
    store_subscriptions: Vec<Subscription>,
    dispatcher_subscription: Option<Subscription>,
    /// Executions between `WillExecute` and `Complete`
    running: HashSet<UseCaseId>,
    dispatch_depth: usize,
    /// Nested deliveries of application payloads sent outside any use case
    unscoped_depth: usize,
    flushing: bool,
    strict: bool,
    released: bool,
}

impl GroupState {
    fn is_idle(&self) -> bool {
        self.running.is_empty() && self.dispatch_depth == 0
    }

    /// A change now would not be attributable to any use case.
    fn is_out_of_band(&self) -> bool {
        self.is_idle() || self.unscoped_depth > 0
    }
}

struct GroupInner<P: Payload> {
    entries: Vec<GroupEntry<P>>,
    listeners: Listeners<ChangeListener>,
    state: RefCell<GroupState>,
}

/// Resets the `flushing` flag even if a listener panics.
struct FlushGuard<'a> {
    state: &'a RefCell<GroupState>,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.state.borrow_mut().flushing = false;
    }
}

/// Leaves dispatch depth balanced even if a store panics.
struct DispatchDepthGuard<'a> {
    state: &'a RefCell<GroupState>,
    unscoped: bool,
}

impl<'a> DispatchDepthGuard<'a> {
    fn enter(state: &'a RefCell<GroupState>, unscoped: bool) -> Self {
        let mut guarded = state.borrow_mut();
        guarded.dispatch_depth += 1;
        if unscoped {
            guarded.unscoped_depth += 1;
        }
        Self { state, unscoped }
    }
}

impl Drop for DispatchDepthGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.dispatch_depth -= 1;
        if self.unscoped {
            state.unscoped_depth -= 1;
        }
    }
}

impl<P: Payload> GroupInner<P> {
    fn state_mut(&self) -> RefMut<'_, GroupState> {
        self.state.borrow_mut()
    }

    fn on_store_changed(&self, index: usize) {
        let flush_now = {
            let mut state = self.state_mut();
            if state.released {
                return;
            }

            if state.strict && state.is_out_of_band() {
                let name = self.entries[index].store.name().to_string();
                drop(state);
                panic!(
                    "store `{}` changed outside of a use case or dispatch (strict mode)",
                    name
                );
            }

            state.cache = None;
            if !state.pending[index] {
                state.pending[index] = true;
                state.changed_order.push(index);
            }
            trace!(
                store = %self.entries[index].store.name(),
                pending = state.changed_order.len(),
                "store signalled change"
            );

            state.is_idle() && !state.flushing
        };

        if flush_now {
            self.flush();
        }
    }

    fn handle_dispatch(&self, payload: &AnyPayload<P>, meta: &DispatcherPayloadMeta) {
        if self.state.borrow().released {
            return;
        }

        if let (AnyPayload::WillExecute(_), Some(id)) = (payload, meta.use_case_id()) {
            self.state_mut().running.insert(id);
        }

        // An application payload with no use case behind it, sent while none runs.
        let unscoped = matches!(payload, AnyPayload::User(_))
            && meta.use_case.is_none()
            && self.state.borrow().running.is_empty();

        {
            let _depth = DispatchDepthGuard::enter(&self.state, unscoped);
            for entry in &self.entries {
                entry.store.receive_payload(payload, meta);
            }
        }

        let should_flush = {
            let mut state = self.state_mut();
            match payload {
                AnyPayload::WillExecute(_) => false,
                AnyPayload::DidExecute(_) => meta.is_top_level(),
                AnyPayload::Error(_) => meta.is_top_level() && meta.is_use_case_finished,
                AnyPayload::Complete(_) => {
                    if let Some(id) = meta.use_case_id() {
                        state.running.remove(&id);
                    }
                    meta.is_top_level() || state.running.is_empty()
                }
                AnyPayload::Changed(_) => true,
                AnyPayload::User(_) => meta.is_use_case_finished || state.running.is_empty(),
            }
        };

        if should_flush {
            self.flush();
        }
    }

    fn flush(&self) {
        loop {
            let changed = {
                let mut state = self.state_mut();
                if state.released || state.flushing || state.changed_order.is_empty() {
                    return;
                }
                state.flushing = true;
                state.cache = None;

                let order = std::mem::take(&mut state.changed_order);
                for &index in &order {
                    state.pending[index] = false;
                }
                order
                    .into_iter()
                    .map(|index| self.entries[index].describe(index))
                    .collect::<Vec<_>>()
            };

            {
                let _guard = FlushGuard { state: &self.state };
                let listeners = self.listeners.snapshot();
                debug!(
                    changed = ?changed.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                    listeners = listeners.len(),
                    "store group flush"
                );
                for listener in listeners {
                    listener(&changed);
                }
            }

            let again = {
                let state = self.state.borrow();
                !state.released && !state.changed_order.is_empty() && state.is_idle()
            };
            if !again {
                return;
            }
        }
    }

    fn merged_state(&self) -> Rc<MergedState> {
        if let Some(cached) = self.state.borrow().cache.as_ref() {
            return Rc::clone(cached);
        }

        let merged = Rc::new(MergedState {
            slots: self
                .entries
                .iter()
                .map(|entry| (entry.key.clone(), entry.store.snapshot()))
                .collect(),
        });

        let mut state = self.state_mut();
        if !state.released {
            state.cache = Some(Rc::clone(&merged));
        }
        merged
    }
}

/// Composes stores into one state surface with batched change notification.
///
/// Cheap to clone; clones share the same group.
pub struct StoreGroup<P: Payload> {
    inner: Rc<GroupInner<P>>,
}

impl<P: Payload> Clone for StoreGroup<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P: Payload> fmt::Debug for StoreGroup<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("StoreGroup")
            .field("keys", &self.keys().collect::<Vec<_>>())
            .field("pending", &state.changed_order.len())
            .field("listeners", &self.inner.listeners.len())
            .field("released", &state.released)
            .finish()
    }
}

impl<P: Payload> StoreGroup<P> {
    /// Start building a group.
    pub fn builder() -> StoreGroupBuilder<P> {
        StoreGroupBuilder::new()
    }

    fn from_entries(entries: Vec<GroupEntry<P>>) -> Self {
        let count = entries.len();
        let inner = Rc::new(GroupInner {
            entries,
            listeners: Listeners::new(),
            state: RefCell::new(GroupState {
                pending: vec![false; count],
                ..GroupState::default()
            }),
        });

        let subscriptions = inner
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let weak: Weak<GroupInner<P>> = Rc::downgrade(&inner);
                entry.store.change_signal().on_change(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_store_changed(index);
                    }
                })
            })
            .collect();
        inner.state_mut().store_subscriptions = subscriptions;

        debug!(stores = count, "store group created");
        Self { inner }
    }

    /// Merged state of every store, cached until a store changes.
    pub fn get_state(&self) -> Rc<MergedState> {
        self.inner.merged_state()
    }

    /// Register a listener called once per flush with the changed stores.
    ///
    /// Listeners run in registration order. A listener added during a flush
    /// first runs on the next one.
    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&[ChangedStore]) + 'static,
    {
        if self.is_released() {
            return Subscription::noop();
        }
        let listener: Rc<ChangeListener> = Rc::new(handler);
        self.inner.listeners.add(listener)
    }

    /// Flush pending changes now. Does nothing when nothing is pending.
    pub fn emit_change(&self) {
        self.inner.flush();
    }

    /// Attach to a dispatcher: forward payloads to the stores and flush at
    /// use case lifecycle boundaries.
    ///
    /// Replaces any previously observed dispatcher.
    pub fn observe(&self, dispatcher: &Dispatcher<P>) {
        if self.is_released() {
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let subscription = dispatcher.on_dispatch(move |payload, meta| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_dispatch(payload, meta);
            }
        });

        let previous = self
            .inner
            .state_mut()
            .dispatcher_subscription
            .replace(subscription);
        if let Some(previous) = previous {
            previous.unsubscribe();
        }
    }

    /// Stop observing the dispatcher, if any.
    pub fn disconnect(&self) {
        let subscription = self.inner.state_mut().dispatcher_subscription.take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }

    /// Drop every store and dispatcher subscription and every listener.
    ///
    /// Idempotent. A released group never notifies again.
    pub fn release(&self) {
        let (stores, dispatcher) = {
            let mut state = self.inner.state_mut();
            if state.released {
                return;
            }
            state.released = true;
            state.cache = None;
            state.changed_order.clear();
            state.pending.iter_mut().for_each(|flag| *flag = false);
            state.running.clear();
            (
                std::mem::take(&mut state.store_subscriptions),
                state.dispatcher_subscription.take(),
            )
        };

        for subscription in stores.into_iter().chain(dispatcher) {
            subscription.unsubscribe();
        }
        self.inner.listeners.clear();
        trace!("store group released");
    }

    pub fn is_released(&self) -> bool {
        self.inner.state.borrow().released
    }

    /// Enable or disable the strict-mode assertion on out-of-band changes.
    pub fn set_strict(&self, strict: bool) {
        self.inner.state_mut().strict = strict;
    }

    /// Whether any store changed since the last flush.
    pub fn has_pending_changes(&self) -> bool {
        !self.inner.state.borrow().changed_order.is_empty()
    }

    /// Whether a use case observed through the dispatcher is still running.
    pub fn is_use_case_running(&self) -> bool {
        !self.inner.state.borrow().running.is_empty()
    }

    /// State keys in construction order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.entries.iter().map(|entry| entry.key.as_str())
    }

    /// Descriptions of every store in construction order.
    pub fn stores(&self) -> Vec<ChangedStore> {
        self.inner
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.describe(index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

/// Builder for [`StoreGroup`].
///
/// Positional stores are merged under their [`Store::state_key`]; named
/// stores under the supplied name. Duplicate keys are rejected.
pub struct StoreGroupBuilder<P: Payload> {
    entries: Vec<(Option<String>, Rc<dyn DynStore<P>>)>,
}

impl<P: Payload> Default for StoreGroupBuilder<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> StoreGroupBuilder<P> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a store keyed by its own state key.
    pub fn store<S: Store<P>>(mut self, store: Rc<S>) -> Self {
        let store: Rc<dyn DynStore<P>> = store;
        self.entries.push((None, store));
        self
    }

    /// Add a store under an explicit key.
    pub fn named_store<S: Store<P>>(mut self, key: impl Into<String>, store: Rc<S>) -> Self {
        let store: Rc<dyn DynStore<P>> = store;
        self.entries.push((Some(key.into()), store));
        self
    }

    /// Add an already type-erased store.
    pub fn dyn_store(mut self, key: Option<String>, store: Rc<dyn DynStore<P>>) -> Self {
        self.entries.push((key, store));
        self
    }

    pub fn build(self) -> Result<StoreGroup<P>, FluxError> {
        let mut entries: Vec<GroupEntry<P>> = Vec::with_capacity(self.entries.len());

        for (key, store) in self.entries {
            let key = key.unwrap_or_else(|| store.state_key());
            if let Some(existing) = entries.iter().find(|entry| entry.key == key) {
                return Err(FluxError::DuplicateStateKey {
                    key,
                    first: existing.store.name().to_string(),
                    second: store.name().to_string(),
                });
            }
            entries.push(GroupEntry { key, store });
        }

        Ok(StoreGroup::from_entries(entries))
    }
}
