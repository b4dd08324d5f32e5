//! Core traits and types for flux-dispatch
//!
//! This crate provides a unidirectional state-management core: use cases are
//! the only way state changes, stores hold immutable snapshots, and a store
//! group batches change notifications along use case lifecycle boundaries.
//!
//! # Core Concepts
//!
//! - **Payload**: immutable event record carried over dispatch
//! - **Dispatcher**: synchronous fan-out of payloads to listeners
//! - **UseCase**: unit of mutation logic, launched through a [`Context`]
//! - **Store**: read-side container owning one slice of state
//! - **StoreGroup**: merged state over many stores with batched `on_change`
//!
//! # Basic Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use flux_dispatch_core::prelude::*;
//!
//! #[derive(Clone, Debug)]
//! enum CounterPayload {
//!     Add(i32),
//! }
//!
//! impl Payload for CounterPayload {
//!     fn kind(&self) -> &'static str {
//!         "Add"
//!     }
//! }
//!
//! #[derive(Default)]
//! struct CounterStore {
//!     state: StateCell<i32>,
//! }
//!
//! impl Store<CounterPayload> for CounterStore {
//!     type State = i32;
//!
//!     fn get_state(&self) -> Rc<i32> {
//!         self.state.get()
//!     }
//!
//!     fn receive_payload(&self, payload: &AnyPayload<CounterPayload>, _meta: &DispatcherPayloadMeta) {
//!         if let Some(CounterPayload::Add(n)) = payload.as_user() {
//!             self.state.update(|count| *count += n);
//!         }
//!     }
//!
//!     fn change_signal(&self) -> &ChangeSignal {
//!         self.state.signal()
//!     }
//! }
//!
//! let store = Rc::new(CounterStore::default());
//! let group = StoreGroup::builder().store(store).build()?;
//! let context = Context::new(Dispatcher::new(), group);
//!
//! context.on_change(|| println!("changed"));
//!
//! let add = UseCaseKind::functional("Add", |ctx: &UseCaseContext<CounterPayload>, n: i32| {
//!     ctx.dispatch(CounterPayload::Add(n));
//!     Execution::done()
//! });
//! context.use_case(add).execute(2).await?;
//!
//! assert_eq!(*context.get_state().get::<i32>("counter").unwrap(), 2);
//! ```
//!
//! # Async Use Cases
//!
//! A body that returns [`Execution::pending`] continues asynchronously. The
//! code before its first `.await` runs inside `execute`; each later segment
//! is flushed when the use case completes, or earlier through
//! [`UseCaseContext::request_flush`].
//!
//! ```ignore
//! impl UseCase<TodoPayload> for SyncTodos {
//!     type Args = ();
//!
//!     fn execute(&self, context: &UseCaseContext<TodoPayload>, _: ()) -> Execution {
//!         let context = context.clone();
//!         let api = self.api.clone();
//!         Execution::pending(async move {
//!             context.dispatch(TodoPayload::SyncStarted);
//!             let todos = api.fetch().await?;
//!             context.dispatch(TodoPayload::Synced(todos));
//!             Ok(())
//!         })
//!     }
//! }
//! ```
//!
//! The whole core is single-threaded (`Rc`, not `Arc`). Await handles on the
//! current thread, or detach them inside a [`tokio::task::LocalSet`].

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod execution;
pub mod executor;
pub mod logger;
pub mod meta;
pub mod payload;
pub mod store;
pub mod store_group;
pub mod subscription;
pub mod testing;
pub mod use_case;

// Payload model
pub use payload::{
    AnyPayload, ChangedPayload, CompletePayload, DidExecutePayload, ErrorPayload, Payload,
    WillExecutePayload,
};
pub use meta::{DispatcherId, DispatcherPayloadMeta, IdGenerator, UseCaseId, UseCaseRef};

// Dispatch
pub use dispatcher::{Dispatchable, DispatchListener, Dispatcher};
pub use subscription::Subscription;

// Stores
pub use store::{default_state_key, ChangeSignal, DynStore, StateCell, Store};
pub use store_group::{ChangedStore, MergedState, StoreGroup, StoreGroupBuilder};

// Use cases
pub use execution::{Execution, UseCaseFuture, UseCaseHandle, UseCaseResult};
pub use executor::{UseCaseContext, UseCaseExecutor};
pub use use_case::{FunctionalUseCase, UseCase, UseCaseKind};

// Context
pub use config::ContextConfig;
pub use context::{Context, ContextBuilder};

// Errors
pub use error::{FluxError, UseCaseAbandoned, UseCaseError};

// Logging
pub use logger::{PayloadLog, PayloadLogConfig, PayloadLogEntry, PayloadLogger, PayloadLoggerConfig};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ContextConfig;
    pub use crate::context::Context;
    pub use crate::dispatcher::{Dispatchable, Dispatcher};
    pub use crate::error::{FluxError, UseCaseError};
    pub use crate::execution::{Execution, UseCaseHandle, UseCaseResult};
    pub use crate::executor::UseCaseContext;
    pub use crate::meta::DispatcherPayloadMeta;
    pub use crate::payload::{AnyPayload, Payload};
    pub use crate::store::{ChangeSignal, StateCell, Store};
    pub use crate::store_group::{MergedState, StoreGroup};
    pub use crate::subscription::Subscription;
    pub use crate::use_case::{FunctionalUseCase, UseCase, UseCaseKind};
}
