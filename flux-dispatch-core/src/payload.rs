//! Payloads carried over dispatch
//!
//! Application payloads implement [`Payload`]. Every dispatch wraps the
//! payload in [`AnyPayload`], which adds the system-generated lifecycle
//! variants emitted while a use case runs.

use std::convert::Infallible;
use std::fmt::Debug;

use crate::error::UseCaseError;

/// Trait for application payloads that can be dispatched
///
/// Payloads are immutable event records. They should be:
/// - Clone: payloads may be logged, recorded, or delivered to many stores
/// - Debug: for logging and summaries
///
/// Use `#[derive(Payload)]` from `flux-dispatch-macros` to auto-implement this trait.
pub trait Payload: Clone + Debug + 'static {
    /// Discriminator used for filtering and logging
    fn kind(&self) -> &'static str;

    /// Human-readable one-line summary (defaults to `Debug`)
    fn summary(&self) -> String {
        format!("{:?}", self)
    }
}

/// Payload type for applications that only use lifecycle payloads.
impl Payload for Infallible {
    fn kind(&self) -> &'static str {
        match *self {}
    }
}

/// Emitted before a use case body runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WillExecutePayload {
    /// `Debug` rendering of the arguments passed to `execute`
    pub args: String,
}

/// Emitted as soon as the synchronous part of a use case body returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DidExecutePayload;

/// Emitted once a use case has settled, successfully or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletePayload {
    /// `false` when the use case ended with an error
    pub succeeded: bool,
}

/// Emitted when a use case fails or reports a soft error.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPayload {
    pub error: UseCaseError,
}

/// Asks observers to treat the current point as a change boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangedPayload;

/// Everything that can travel over a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq)]
pub enum AnyPayload<P> {
    WillExecute(WillExecutePayload),
    DidExecute(DidExecutePayload),
    Complete(CompletePayload),
    Error(ErrorPayload),
    Changed(ChangedPayload),
    User(P),
}

impl<P: Payload> AnyPayload<P> {
    /// Discriminator of this payload.
    pub fn kind(&self) -> &'static str {
        match self {
            AnyPayload::WillExecute(_) => "WillExecute",
            AnyPayload::DidExecute(_) => "DidExecute",
            AnyPayload::Complete(_) => "Complete",
            AnyPayload::Error(_) => "Error",
            AnyPayload::Changed(_) => "Changed",
            AnyPayload::User(payload) => payload.kind(),
        }
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        match self {
            AnyPayload::WillExecute(p) => format!("WillExecute({})", p.args),
            AnyPayload::Complete(p) => format!("Complete {{ succeeded: {} }}", p.succeeded),
            AnyPayload::Error(p) => format!("Error({})", p.error),
            AnyPayload::User(payload) => payload.summary(),
            other => other.kind().to_string(),
        }
    }

    /// System-generated payloads are trusted; application payloads are not.
    pub fn is_trusted(&self) -> bool {
        !matches!(self, AnyPayload::User(_))
    }

    /// Whether this is one of the use case lifecycle markers.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            AnyPayload::WillExecute(_)
                | AnyPayload::DidExecute(_)
                | AnyPayload::Complete(_)
                | AnyPayload::Error(_)
        )
    }

    /// The application payload, if this is one.
    pub fn as_user(&self) -> Option<&P> {
        match self {
            AnyPayload::User(payload) => Some(payload),
            _ => None,
        }
    }
}

impl<P> From<P> for AnyPayload<P>
where
    P: Payload,
{
    fn from(payload: P) -> Self {
        AnyPayload::User(payload)
    }
}
