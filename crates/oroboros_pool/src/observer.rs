//! # Lifecycle Observers
//!
//! Callers register observers per pool to hook the three lifecycle
//! transitions: acquire, release and destroy. Observers run synchronously,
//! in registration order, at the exact point the transition happens.

/// Which lifecycle transition an observer is being told about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Handle left the idle stack and was handed to a caller.
    Acquired,
    /// Handle went back onto the idle stack.
    Released,
    /// Handle was destroyed through the factory.
    Destroyed,
}

/// Receives lifecycle notifications for one pool.
///
/// All methods default to no-ops so observers only implement what they need.
pub trait PoolObserver<H> {
    /// Called after `handle` was popped and counted as outstanding.
    fn on_acquire(&mut self, handle: H) {
        let _ = handle;
    }

    /// Called after `handle` was pushed back onto the idle stack.
    fn on_release(&mut self, handle: H) {
        let _ = handle;
    }

    /// Called right before `handle` is handed to the factory for destruction.
    fn on_destroy(&mut self, handle: H) {
        let _ = handle;
    }
}

/// Adapter turning a closure into a [`PoolObserver`].
///
/// # Example
///
/// ```rust,ignore
/// pool.add_observer(Box::new(FnObserver::new(|event, handle| {
///     println!("{event:?} {handle:?}");
/// })));
/// ```
pub struct FnObserver<F> {
    callback: F,
}

impl<F> FnObserver<F> {
    /// Wraps `callback`.
    #[must_use]
    pub const fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<H, F> PoolObserver<H> for FnObserver<F>
where
    F: FnMut(LifecycleEvent, H),
{
    fn on_acquire(&mut self, handle: H) {
        (self.callback)(LifecycleEvent::Acquired, handle);
    }

    fn on_release(&mut self, handle: H) {
        (self.callback)(LifecycleEvent::Released, handle);
    }

    fn on_destroy(&mut self, handle: H) {
        (self.callback)(LifecycleEvent::Destroyed, handle);
    }
}

/// Identifies a registered observer so it can be removed again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

/// Ordered observer list owned by a pool.
pub(crate) struct ObserverList<H> {
    observers: Vec<(ObserverId, Box<dyn PoolObserver<H>>)>,
    next_id: u32,
}

impl<H: Copy> ObserverList<H> {
    pub(crate) const fn new() -> Self {
        Self {
            observers: Vec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn add(&mut self, observer: Box<dyn PoolObserver<H>>) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.observers.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.len()
    }

    pub(crate) fn clear(&mut self) {
        self.observers.clear();
    }

    pub(crate) fn notify(&mut self, event: LifecycleEvent, handle: H) {
        for (_, observer) in &mut self.observers {
            match event {
                LifecycleEvent::Acquired => observer.on_acquire(handle),
                LifecycleEvent::Released => observer.on_release(handle),
                LifecycleEvent::Destroyed => observer.on_destroy(handle),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_observers_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list: ObserverList<u32> = ObserverList::new();

        for tag in ["first", "second"] {
            let log = Rc::clone(&log);
            list.add(Box::new(FnObserver::new(move |event: LifecycleEvent, handle: u32| {
                log.borrow_mut().push((tag, event, handle));
            })));
        }

        list.notify(LifecycleEvent::Acquired, 9);

        assert_eq!(
            *log.borrow(),
            vec![
                ("first", LifecycleEvent::Acquired, 9),
                ("second", LifecycleEvent::Acquired, 9),
            ]
        );
    }

    #[test]
    fn test_remove_observer() {
        let hits = Rc::new(RefCell::new(0));
        let mut list: ObserverList<u32> = ObserverList::new();

        let counter = Rc::clone(&hits);
        let id = list.add(Box::new(FnObserver::new(move |_: LifecycleEvent, _: u32| {
            *counter.borrow_mut() += 1;
        })));

        assert!(list.remove(id));
        assert!(!list.remove(id));
        list.notify(LifecycleEvent::Released, 1);
        assert_eq!(*hits.borrow(), 0);
        assert_eq!(list.len(), 0);
    }
}
