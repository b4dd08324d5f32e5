//! Error types
//!
//! Two families of failure exist:
//!
//! - [`FluxError`]: usage and configuration mistakes (duplicate state keys,
//!   a use case launching itself, malformed config). These are programmer
//!   errors and surface immediately.
//! - [`UseCaseError`]: runtime failures of a use case body. They travel
//!   through the rejected [`UseCaseHandle`](crate::UseCaseHandle) and through
//!   the `Error` lifecycle payload, so both values must be the same error.

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

/// Usage and configuration errors.
#[derive(Debug, Error)]
pub enum FluxError {
    /// Two stores in one group contribute the same top-level key.
    #[error("duplicate state key `{key}` in store group (stores `{first}` and `{second}`)")]
    DuplicateStateKey {
        key: String,
        first: String,
        second: String,
    },

    /// A use case tried to launch itself, directly or through a child.
    #[error("use case `{name}` cannot execute itself as a nested use case")]
    RecursiveUseCase { name: String },

    /// Context configuration could not be parsed.
    #[error("invalid context config: {0}")]
    InvalidConfig(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("{0}")]
struct MessageError(String);

/// A pending use case whose handle was dropped before its async tail finished.
///
/// Reported through the `Error` payload that closes the abandoned execution.
#[derive(Debug, Error)]
#[error("use case `{name}` was dropped before completion")]
pub struct UseCaseAbandoned {
    pub name: String,
}

/// Failure of a use case body.
///
/// Cheap to clone: the same error value is handed to the caller awaiting the
/// handle and to every `Error` payload observer. Equality is identity, so a
/// clone compares equal to its source and two separately created errors never
/// do.
///
/// Like `anyhow::Error`, this type does not implement [`std::error::Error`]
/// itself, so `?` converts any error inside a use case body.
#[derive(Clone)]
pub struct UseCaseError {
    inner: Rc<dyn StdError + 'static>,
}

impl UseCaseError {
    /// Wrap an error value.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + 'static,
    {
        Self {
            inner: Rc::new(error),
        }
    }

    /// Create an error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(MessageError(message.to_string()))
    }

    /// Borrow the wrapped error.
    pub fn as_error(&self) -> &(dyn StdError + 'static) {
        &*self.inner
    }

    /// Attempt to view the wrapped error as a concrete type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Whether both values wrap the very same error.
    pub fn same_as(&self, other: &UseCaseError) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<E> From<E> for UseCaseError
where
    E: StdError + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl PartialEq for UseCaseError {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Display for UseCaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for UseCaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("UseCaseError")
            .field(&format_args!("{}", self.inner))
            .finish()
    }
}
