//! Dispatch metadata and identities

use std::borrow::Cow;
use std::cell::Cell;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Identity of one use case execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UseCaseId(u64);

impl UseCaseId {
    /// Raw counter value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UseCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "use-case-{}", self.0)
    }
}

/// Identity of a dispatcher channel.
///
/// Derived from the channel's address, so it is only meaningful while the
/// dispatcher is alive. It never keeps the dispatcher alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatcherId(pub(crate) usize);

/// Source of use case identities.
///
/// Monotonic for its own lifetime. A [`Context`](crate::Context) creates one
/// unless a shared generator is injected through
/// [`ContextBuilder::id_generator`](crate::ContextBuilder::id_generator).
#[derive(Debug)]
pub struct IdGenerator {
    next: Cell<u64>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    /// Create a generator whose first id is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a generator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Cell::new(first),
        }
    }

    /// Draw the next use case id.
    pub fn next_use_case_id(&self) -> UseCaseId {
        let id = self.next.get();
        self.next.set(id + 1);
        UseCaseId(id)
    }

    /// The id the next call will return, without drawing it.
    pub fn peek(&self) -> u64 {
        self.next.get()
    }
}

/// Non-owning reference to a running (or finished) use case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UseCaseRef {
    pub id: UseCaseId,
    pub name: Cow<'static, str>,
}

impl UseCaseRef {
    pub fn new(id: UseCaseId, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for UseCaseRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id.0)
    }
}

/// Context that accompanies every dispatched payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherPayloadMeta {
    /// Use case that produced the payload
    pub use_case: Option<UseCaseRef>,
    /// Channel the payload was sent on
    pub dispatcher: Option<DispatcherId>,
    /// Set iff the producing use case was launched from inside another one
    pub parent_use_case: Option<UseCaseRef>,
    /// `true` for system-generated lifecycle payloads
    pub is_trusted: bool,
    /// `true` once the producing use case has settled
    pub is_use_case_finished: bool,
    pub timestamp: SystemTime,
    /// Time since `WillExecute`, only recorded with `performance_profile`
    pub elapsed: Option<Duration>,
}

impl Default for DispatcherPayloadMeta {
    fn default() -> Self {
        Self {
            use_case: None,
            dispatcher: None,
            parent_use_case: None,
            is_trusted: false,
            is_use_case_finished: false,
            timestamp: SystemTime::now(),
            elapsed: None,
        }
    }
}

impl DispatcherPayloadMeta {
    /// Meta for a payload dispatched outside of any use case.
    pub fn untrusted() -> Self {
        Self::default()
    }

    /// Meta for a payload produced by `use_case`.
    pub fn for_use_case(use_case: UseCaseRef, parent_use_case: Option<UseCaseRef>) -> Self {
        Self {
            use_case: Some(use_case),
            parent_use_case,
            ..Self::default()
        }
    }

    pub fn trusted(mut self) -> Self {
        self.is_trusted = true;
        self
    }

    pub fn finished(mut self, finished: bool) -> Self {
        self.is_use_case_finished = finished;
        self
    }

    pub fn with_elapsed(mut self, elapsed: Option<Duration>) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// Whether the producing use case was launched directly by the application.
    pub fn is_top_level(&self) -> bool {
        self.parent_use_case.is_none()
    }

    pub fn use_case_id(&self) -> Option<UseCaseId> {
        self.use_case.as_ref().map(|use_case| use_case.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_is_monotonic() {
        let ids = IdGenerator::new();
        let a = ids.next_use_case_id();
        let b = ids.next_use_case_id();
        assert!(b > a);
        assert_eq!(a.get(), 1);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn test_generator_starting_at() {
        let ids = IdGenerator::starting_at(100);
        assert_eq!(ids.next_use_case_id().get(), 100);
        assert_eq!(ids.next_use_case_id().to_string(), "use-case-101");
    }

    #[test]
    fn test_meta_builders() {
        let ids = IdGenerator::new();
        let parent = UseCaseRef::new(ids.next_use_case_id(), "Parent");
        let child = UseCaseRef::new(ids.next_use_case_id(), "Child");

        let meta = DispatcherPayloadMeta::for_use_case(child.clone(), Some(parent.clone()))
            .trusted()
            .finished(true);

        assert_eq!(meta.use_case_id(), Some(child.id));
        assert_eq!(meta.parent_use_case, Some(parent));
        assert!(meta.is_trusted);
        assert!(meta.is_use_case_finished);
        assert!(!meta.is_top_level());
        assert!(meta.elapsed.is_none());
    }

    #[test]
    fn test_untrusted_meta() {
        let meta = DispatcherPayloadMeta::untrusted();
        assert!(meta.use_case.is_none());
        assert!(!meta.is_trusted);
        assert!(meta.is_top_level());
    }

    #[test]
    fn test_use_case_ref_display() {
        let ids = IdGenerator::starting_at(7);
        let r = UseCaseRef::new(ids.next_use_case_id(), "AddTodo");
        assert_eq!(r.to_string(), "AddTodo#7");
    }
}
