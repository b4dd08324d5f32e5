//! Listener registration and unsubscribe handles

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Handle returned by every `on_*` registration.
///
/// Call [`unsubscribe`](Subscription::unsubscribe) to remove the listener.
/// Dropping the handle leaves the listener registered.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(unsubscribe: impl FnOnce() + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription with nothing to remove.
    pub fn noop() -> Self {
        Self { unsubscribe: None }
    }

    /// Combine two subscriptions into one that removes both.
    pub fn and(self, other: Subscription) -> Subscription {
        Subscription::new(move || {
            self.unsubscribe();
            other.unsubscribe();
        })
    }

    /// Remove the listener. Calling this after the source is gone is a no-op.
    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

struct Slots<F: ?Sized> {
    next_id: u64,
    entries: Vec<(u64, Rc<F>)>,
}

/// Ordered listener registry shared by dispatchers, change signals and groups.
///
/// Delivery always works on a [`snapshot`](Listeners::snapshot), so listeners
/// added or removed while one delivery is running only affect later ones.
pub(crate) struct Listeners<F: ?Sized> {
    slots: Rc<RefCell<Slots<F>>>,
}

impl<F: ?Sized> Clone for Listeners<F> {
    fn clone(&self) -> Self {
        Self {
            slots: Rc::clone(&self.slots),
        }
    }
}

impl<F: ?Sized + 'static> Default for Listeners<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized + 'static> Listeners<F> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Rc::new(RefCell::new(Slots {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub(crate) fn add(&self, listener: Rc<F>) -> Subscription {
        let id = {
            let mut slots = self.slots.borrow_mut();
            let id = slots.next_id;
            slots.next_id += 1;
            slots.entries.push((id, listener));
            id
        };

        let weak: Weak<RefCell<Slots<F>>> = Rc::downgrade(&self.slots);
        Subscription::new(move || {
            if let Some(slots) = weak.upgrade() {
                slots.borrow_mut().entries.retain(|(entry_id, _)| *entry_id != id);
            }
        })
    }

    pub(crate) fn snapshot(&self) -> Vec<Rc<F>> {
        self.slots
            .borrow()
            .entries
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.slots.borrow_mut().entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.borrow().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    type Callback = dyn Fn(u32);

    #[test]
    fn test_add_and_unsubscribe() {
        let listeners: Listeners<Callback> = Listeners::new();
        let total = Rc::new(Cell::new(0u32));

        let t = total.clone();
        let sub = listeners.add(Rc::new(move |n: u32| t.set(t.get() + n)));
        assert_eq!(listeners.len(), 1);

        for listener in listeners.snapshot() {
            listener(5);
        }
        assert_eq!(total.get(), 5);

        sub.unsubscribe();
        assert_eq!(listeners.len(), 0);
        assert!(listeners.snapshot().is_empty());
    }

    #[test]
    fn test_unsubscribe_removes_only_its_listener() {
        let listeners: Listeners<Callback> = Listeners::new();
        let first = listeners.add(Rc::new(|_: u32| {}));
        let _second = listeners.add(Rc::new(|_: u32| {}));

        first.unsubscribe();
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_registry_dropped() {
        let listeners: Listeners<Callback> = Listeners::new();
        let sub = listeners.add(Rc::new(|_: u32| {}));
        drop(listeners);
        sub.unsubscribe();
    }

    #[test]
    fn test_combined_subscription() {
        let listeners: Listeners<Callback> = Listeners::new();
        let a = listeners.add(Rc::new(|_: u32| {}));
        let b = listeners.add(Rc::new(|_: u32| {}));
        let _c = listeners.add(Rc::new(|_: u32| {}));

        a.and(b).unsubscribe();
        assert_eq!(listeners.len(), 1);
    }

    #[test]
    fn test_noop_subscription() {
        let sub = Subscription::noop();
        assert_eq!(format!("{:?}", sub), "Subscription { active: false }");
        sub.unsubscribe();
    }
}
