//! Dispatcher: typed publish/subscribe hub for payloads

use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::meta::{DispatcherId, DispatcherPayloadMeta};
use crate::payload::{AnyPayload, Payload};
use crate::subscription::{Listeners, Subscription};

/// Listener signature for dispatched payloads.
pub type DispatchListener<P> = dyn Fn(&AnyPayload<P>, &DispatcherPayloadMeta);

/// Capability to send payloads and observe a channel.
///
/// Implemented by [`Dispatcher`] and by
/// [`UseCaseContext`](crate::UseCaseContext). A store that dispatches on its
/// own holds a `Dispatcher` field rather than inheriting from one.
pub trait Dispatchable<P: Payload> {
    /// Send an application payload.
    fn dispatch(&self, payload: P);

    /// Observe payloads sent on this channel.
    fn on_dispatch<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AnyPayload<P>, &DispatcherPayloadMeta) + 'static;
}

/// Fan-out hub for payloads.
///
/// Cheap to clone; clones share the same listener list.
///
/// Listeners run synchronously in registration order. The list is
/// snapshotted before delivery, so a listener registered during a dispatch
/// is not called for that dispatch. A panicking listener unwinds through
/// [`dispatch`](Dispatcher::dispatch) and the remaining listeners of that
/// dispatch do not run.
pub struct Dispatcher<P: Payload> {
    listeners: Listeners<DispatchListener<P>>,
    // Anchor for the address-derived id.
    anchor: Rc<()>,
}

impl<P: Payload> Clone for Dispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            anchor: Rc::clone(&self.anchor),
        }
    }
}

impl<P: Payload> Default for Dispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Payload> fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.id())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<P: Payload> Dispatcher<P> {
    /// Create a dispatcher with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: Listeners::new(),
            anchor: Rc::new(()),
        }
    }

    /// Identity of this channel, shared by all clones.
    pub fn id(&self) -> DispatcherId {
        DispatcherId(Rc::as_ptr(&self.anchor) as usize)
    }

    /// Deliver a payload with explicit meta to every listener.
    ///
    /// `meta.dispatcher` is filled in with this channel's id when unset.
    pub fn dispatch_with_meta(&self, payload: AnyPayload<P>, mut meta: DispatcherPayloadMeta) {
        if meta.dispatcher.is_none() {
            meta.dispatcher = Some(self.id());
        }

        let listeners = self.listeners.snapshot();
        trace!(
            payload = %payload.kind(),
            use_case = ?meta.use_case.as_ref().map(|u| u.name.as_ref()),
            listeners = listeners.len(),
            "dispatch"
        );

        for listener in listeners {
            listener(&payload, &meta);
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<P: Payload> Dispatchable<P> for Dispatcher<P> {
    /// Dispatch an application payload outside of any use case.
    fn dispatch(&self, payload: P) {
        self.dispatch_with_meta(AnyPayload::User(payload), DispatcherPayloadMeta::untrusted());
    }

    fn on_dispatch<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&AnyPayload<P>, &DispatcherPayloadMeta) + 'static,
    {
        let listener: Rc<DispatchListener<P>> = Rc::new(handler);
        self.listeners.add(listener)
    }
}
