//! Use cases: the only sanctioned entry point for state change
//!
//! A use case is either a type implementing [`UseCase`] or a closure wrapped
//! in a [`FunctionalUseCase`]. Both produce the same lifecycle payloads; the
//! executor only sees the [`UseCaseKind`] tag.
//!
//! # Example
//!
//! ```ignore
//! use flux_dispatch::prelude::*;
//!
//! struct AddTodo;
//!
//! impl UseCase<TodoPayload> for AddTodo {
//!     type Args = String;
//!
//!     fn should_execute(&self, title: &String) -> bool {
//!         !title.trim().is_empty()
//!     }
//!
//!     fn execute(&self, context: &UseCaseContext<TodoPayload>, title: String) -> Execution {
//!         context.dispatch(TodoPayload::Added { title });
//!         Execution::done()
//!     }
//! }
//!
//! let handle = context.use_case(Rc::new(AddTodo)).execute("milk".into());
//! ```

use std::borrow::Cow;
use std::fmt::{self, Debug};
use std::rc::Rc;

use crate::execution::Execution;
use crate::executor::UseCaseContext;
use crate::payload::Payload;
use crate::store::short_type_name;

/// A unit of application mutation logic.
pub trait UseCase<P: Payload>: 'static {
    /// Arguments accepted by [`execute`](UseCase::execute).
    ///
    /// Rendered with `Debug` into the `WillExecute` payload.
    type Args: Debug + 'static;

    /// Display name used in payload meta and logs.
    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed(short_type_name::<Self>())
    }

    /// Returning `false` skips the execution entirely: no lifecycle
    /// payloads, and the handle resolves to `Ok(())`.
    fn should_execute(&self, _args: &Self::Args) -> bool {
        true
    }

    /// Run the use case.
    fn execute(&self, context: &UseCaseContext<P>, args: Self::Args) -> Execution;
}

type Body<P, A> = dyn Fn(&UseCaseContext<P>, A) -> Execution;
type Guard<A> = dyn Fn(&A) -> bool;

/// A use case defined by a closure.
pub struct FunctionalUseCase<P: Payload, A> {
    name: Cow<'static, str>,
    body: Box<Body<P, A>>,
    should_execute: Option<Box<Guard<A>>>,
}

impl<P: Payload, A: Debug + 'static> FunctionalUseCase<P, A> {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: Fn(&UseCaseContext<P>, A) -> Execution + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
            should_execute: None,
        }
    }

    /// Attach a `should_execute` predicate.
    pub fn with_should_execute<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&A) -> bool + 'static,
    {
        self.should_execute = Some(Box::new(predicate));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<P: Payload, A> fmt::Debug for FunctionalUseCase<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionalUseCase")
            .field("name", &self.name)
            .field("has_should_execute", &self.should_execute.is_some())
            .finish()
    }
}

/// Tagged union over the two ways of defining a use case.
pub enum UseCaseKind<P: Payload, A> {
    Instance(Rc<dyn UseCase<P, Args = A>>),
    Functional(Rc<FunctionalUseCase<P, A>>),
}

impl<P: Payload, A> Clone for UseCaseKind<P, A> {
    fn clone(&self) -> Self {
        match self {
            UseCaseKind::Instance(use_case) => UseCaseKind::Instance(Rc::clone(use_case)),
            UseCaseKind::Functional(use_case) => UseCaseKind::Functional(Rc::clone(use_case)),
        }
    }
}

impl<P: Payload, A: Debug + 'static> UseCaseKind<P, A> {
    /// Wrap a [`UseCase`] instance.
    pub fn instance<U>(use_case: Rc<U>) -> Self
    where
        U: UseCase<P, Args = A>,
    {
        UseCaseKind::Instance(use_case)
    }

    /// Define a use case from a closure.
    pub fn functional<F>(name: impl Into<Cow<'static, str>>, body: F) -> Self
    where
        F: Fn(&UseCaseContext<P>, A) -> Execution + 'static,
    {
        UseCaseKind::Functional(Rc::new(FunctionalUseCase::new(name, body)))
    }

    pub fn name(&self) -> Cow<'static, str> {
        match self {
            UseCaseKind::Instance(use_case) => use_case.name(),
            UseCaseKind::Functional(use_case) => use_case.name.clone(),
        }
    }

    pub(crate) fn should_execute(&self, args: &A) -> bool {
        match self {
            UseCaseKind::Instance(use_case) => use_case.should_execute(args),
            UseCaseKind::Functional(use_case) => use_case
                .should_execute
                .as_ref()
                .is_none_or(|predicate| predicate(args)),
        }
    }

    pub(crate) fn run(&self, context: &UseCaseContext<P>, args: A) -> Execution {
        match self {
            UseCaseKind::Instance(use_case) => use_case.execute(context, args),
            UseCaseKind::Functional(use_case) => (use_case.body)(context, args),
        }
    }

    /// Address of the shared definition, used to detect self-nesting.
    pub(crate) fn identity(&self) -> usize {
        match self {
            UseCaseKind::Instance(use_case) => Rc::as_ptr(use_case) as *const () as usize,
            UseCaseKind::Functional(use_case) => Rc::as_ptr(use_case) as *const () as usize,
        }
    }
}

impl<P: Payload, A: Debug + 'static> fmt::Debug for UseCaseKind<P, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UseCaseKind::Instance(use_case) => {
                f.debug_tuple("Instance").field(&use_case.name()).finish()
            }
            UseCaseKind::Functional(use_case) => {
                f.debug_tuple("Functional").field(&use_case.name).finish()
            }
        }
    }
}

impl<P, U> From<Rc<U>> for UseCaseKind<P, U::Args>
where
    P: Payload,
    U: UseCase<P>,
{
    fn from(use_case: Rc<U>) -> Self {
        UseCaseKind::Instance(use_case)
    }
}

impl<P: Payload, A> From<FunctionalUseCase<P, A>> for UseCaseKind<P, A> {
    fn from(use_case: FunctionalUseCase<P, A>) -> Self {
        UseCaseKind::Functional(Rc::new(use_case))
    }
}
