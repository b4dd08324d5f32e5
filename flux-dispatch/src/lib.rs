//! flux-dispatch: use case driven state management with batched change notification
//!
//! Use cases dispatch payloads, stores react and keep immutable snapshots,
//! and a store group tells the UI layer once per synchronous burst of changes.
//!
//! # Example
//! ```ignore
//! use flux_dispatch::prelude::*;
//!
//! #[derive(Payload, Clone, Debug)]
//! enum TodoPayload {
//!     Added { title: String },
//!     Cleared,
//! }
//!
//! let group = StoreGroup::builder().store(todo_store.clone()).build()?;
//! let context = Context::new(Dispatcher::new(), group);
//! context.use_case(Rc::new(AddTodo)).execute("milk".into()).await?;
//! ```

// Re-export everything from core
pub use flux_dispatch_core::*;

// Re-export derive macros
pub use flux_dispatch_macros::Payload;

/// Prelude for convenient imports
pub mod prelude {
    pub use flux_dispatch_core::prelude::*;

    // Derive macros
    pub use flux_dispatch_macros::Payload;
}
