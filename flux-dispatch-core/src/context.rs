//! Context: the application-facing entry point
//!
//! A [`Context`] wires one [`Dispatcher`] to one [`StoreGroup`] and is the
//! only place use cases are launched from. Reads go through
//! [`get_state`](Context::get_state), change notification through
//! [`on_change`](Context::on_change), and the lifecycle hooks expose the
//! dispatch stream to loggers and devtools.
//!
//! # Example
//!
//! ```ignore
//! use flux_dispatch::prelude::*;
//!
//! let dispatcher = Dispatcher::new();
//! let group = StoreGroup::builder().store(todo_store.clone()).build()?;
//! let context = Context::builder(dispatcher, group)
//!     .config(ContextConfig::new().strict(true))
//!     .build();
//!
//! context.on_change(|| render());
//! context.use_case(Rc::new(AddTodo)).execute("milk".into()).await?;
//! ```

use std::cell::Cell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::debug;

use crate::config::ContextConfig;
use crate::dispatcher::{Dispatchable, Dispatcher};
use crate::executor::{Runtime, UseCaseExecutor};
use crate::meta::{DispatcherPayloadMeta, IdGenerator};
use crate::payload::{
    AnyPayload, CompletePayload, DidExecutePayload, ErrorPayload, Payload, WillExecutePayload,
};
use crate::store_group::{MergedState, StoreGroup};
use crate::subscription::Subscription;
use crate::use_case::UseCaseKind;

/// Builder for [`Context`].
pub struct ContextBuilder<P: Payload> {
    dispatcher: Dispatcher<P>,
    store_group: StoreGroup<P>,
    config: ContextConfig,
    ids: Option<Rc<IdGenerator>>,
}

impl<P: Payload> ContextBuilder<P> {
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an id generator, e.g. across several contexts.
    pub fn id_generator(mut self, ids: Rc<IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> Context<P> {
        let ContextBuilder {
            dispatcher,
            store_group,
            config,
            ids,
        } = self;

        store_group.set_strict(config.strict);
        store_group.observe(&dispatcher);
        debug!(
            stores = store_group.len(),
            strict = config.strict,
            performance_profile = config.performance_profile,
            "context created"
        );

        Context {
            runtime: Runtime {
                dispatcher,
                ids: ids.unwrap_or_default(),
                config,
            },
            store_group,
            released: Cell::new(false),
        }
    }
}

/// Application entry point tying a dispatcher to a store group.
pub struct Context<P: Payload> {
    runtime: Runtime<P>,
    store_group: StoreGroup<P>,
    released: Cell<bool>,
}

impl<P: Payload> Context<P> {
    /// Create a context with the default configuration.
    pub fn new(dispatcher: Dispatcher<P>, store_group: StoreGroup<P>) -> Self {
        Self::builder(dispatcher, store_group).build()
    }

    pub fn builder(dispatcher: Dispatcher<P>, store_group: StoreGroup<P>) -> ContextBuilder<P> {
        ContextBuilder {
            dispatcher,
            store_group,
            config: ContextConfig::default(),
            ids: None,
        }
    }

    /// Merged state of every store.
    pub fn get_state(&self) -> Rc<MergedState> {
        self.store_group.get_state()
    }

    /// Called once per flush; re-read state with [`get_state`](Self::get_state).
    pub fn on_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + 'static,
    {
        self.store_group.on_change(move |_changed| handler())
    }

    /// Prepare a use case for execution.
    pub fn use_case<A: Debug + 'static>(
        &self,
        use_case: impl Into<UseCaseKind<P, A>>,
    ) -> UseCaseExecutor<P, A> {
        UseCaseExecutor::new(use_case.into(), self.runtime.clone())
    }

    /// Observe `WillExecute` of every use case, nested ones included.
    pub fn on_will_execute_each_use_case<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&WillExecutePayload, &DispatcherPayloadMeta) + 'static,
    {
        self.runtime.dispatcher.on_dispatch(move |payload, meta| {
            if let AnyPayload::WillExecute(will) = payload {
                handler(will, meta);
            }
        })
    }

    pub fn on_did_execute_each_use_case<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DidExecutePayload, &DispatcherPayloadMeta) + 'static,
    {
        self.runtime.dispatcher.on_dispatch(move |payload, meta| {
            if let AnyPayload::DidExecute(did) = payload {
                handler(did, meta);
            }
        })
    }

    pub fn on_complete_each_use_case<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CompletePayload, &DispatcherPayloadMeta) + 'static,
    {
        self.runtime.dispatcher.on_dispatch(move |payload, meta| {
            if let AnyPayload::Complete(complete) = payload {
                handler(complete, meta);
            }
        })
    }

    /// Observe every `Error` payload, soft errors included.
    pub fn on_error_dispatch<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ErrorPayload, &DispatcherPayloadMeta) + 'static,
    {
        self.runtime.dispatcher.on_dispatch(move |payload, meta| {
            if let AnyPayload::Error(error) = payload {
                handler(error, meta);
            }
        })
    }

    /// Observe application payloads. Lifecycle payloads are skipped.
    pub fn on_dispatch<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&P, &DispatcherPayloadMeta) + 'static,
    {
        self.runtime.dispatcher.on_dispatch(move |payload, meta| {
            if let AnyPayload::User(user) = payload {
                handler(user, meta);
            }
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.runtime.dispatcher
    }

    pub fn store_group(&self) -> &StoreGroup<P> {
        &self.store_group
    }

    pub fn config(&self) -> &ContextConfig {
        &self.runtime.config
    }

    pub fn id_generator(&self) -> &Rc<IdGenerator> {
        &self.runtime.ids
    }

    /// Detach the store group from the dispatcher and release it. Idempotent.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        self.store_group.disconnect();
        self.store_group.release();
        debug!("context released");
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }
}

impl<P: Payload> fmt::Debug for Context<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("dispatcher", &self.runtime.dispatcher)
            .field("store_group", &self.store_group)
            .field("config", &self.runtime.config)
            .field("released", &self.released.get())
            .finish()
    }
}
