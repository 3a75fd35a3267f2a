//! # Scope Lifecycle
//!
//! A scope is whatever the host considers a disposable context: a level, an
//! arena match, a menu screen. When the host moves from one scope to the next,
//! every pool not marked as persistent is torn down.
//!
//! Detection of the transition stays with the host. The registry only
//! subscribes to a [`ScopeLifecycleNotifier`] and receives
//! [`ScopeTransition`] events over a channel.
//!
//! ```text
//! Host ──transition_to()──> ScopeEventBus ──Sender──> [channel] ──Receiver──> PoolRegistry
//!                                                                    (drained on tick)
//! ```

use crossbeam_channel::{Receiver, Sender};

/// Identifier of a scope (level, match, screen).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

/// A boundary transition from one scope to another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScopeTransition {
    /// Scope being left.
    pub from: ScopeId,
    /// Scope being entered.
    pub to: ScopeId,
}

/// Handle for a subscription, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u32);

/// Source of scope transition events.
pub trait ScopeLifecycleNotifier {
    /// Registers `sink` to receive every future transition.
    fn subscribe(&mut self, sink: Sender<ScopeTransition>) -> SubscriptionId;

    /// Stops delivering to the subscription. Returns false if it was unknown.
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;
}

/// Channel pair the registry keeps for its subscription.
pub(crate) struct ScopeSubscription {
    pub(crate) id: SubscriptionId,
    pub(crate) receiver: Receiver<ScopeTransition>,
}

impl ScopeSubscription {
    /// Subscribes to `notifier` with a fresh unbounded channel.
    pub(crate) fn open<N: ScopeLifecycleNotifier + ?Sized>(notifier: &mut N) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let id = notifier.subscribe(sender);
        Self { id, receiver }
    }

    /// Takes every queued transition without blocking.
    pub(crate) fn drain(&self) -> Vec<ScopeTransition> {
        self.receiver.try_iter().collect()
    }
}

/// Simple in-process notifier.
///
/// Tracks the current scope and fans transitions out to every live
/// subscriber. Subscribers whose receiver was dropped are pruned on the next
/// publish.
pub struct ScopeEventBus {
    current: ScopeId,
    subscribers: Vec<(SubscriptionId, Sender<ScopeTransition>)>,
    next_id: u32,
}

impl ScopeEventBus {
    /// Creates a bus starting in `initial`.
    #[must_use]
    pub const fn new(initial: ScopeId) -> Self {
        Self {
            current: initial,
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    /// Returns the current scope.
    #[must_use]
    pub const fn current(&self) -> ScopeId {
        self.current
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Moves to `next` and notifies subscribers.
    ///
    /// Transitioning to the scope already current is still a boundary (a
    /// level reload) and is published.
    ///
    /// # Returns
    ///
    /// The number of subscribers the event was delivered to.
    pub fn transition_to(&mut self, next: ScopeId) -> usize {
        let transition = ScopeTransition {
            from: self.current,
            to: next,
        };
        self.current = next;
        self.publish(transition)
    }

    /// Sends `transition` to every subscriber, pruning dead ones.
    pub fn publish(&mut self, transition: ScopeTransition) -> usize {
        self.subscribers
            .retain(|(_, sender)| sender.send(transition).is_ok());
        tracing::debug!(
            "Scope {:?} -> {:?} delivered to {} subscriber(s)",
            transition.from,
            transition.to,
            self.subscribers.len()
        );
        self.subscribers.len()
    }
}

impl Default for ScopeEventBus {
    fn default() -> Self {
        Self::new(ScopeId::default())
    }
}

impl ScopeLifecycleNotifier for ScopeEventBus {
    fn subscribe(&mut self, sink: Sender<ScopeTransition>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.subscribers.push((id, sink));
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }
}
