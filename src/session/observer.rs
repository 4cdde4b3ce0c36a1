//! Observer registration.

use serde::{Deserialize, Serialize};

use super::snapshot::{Notice, SessionSnapshot};

/// Receives every state change of a session, synchronously and in order.
pub trait SessionObserver: Send {
    /// Called after a mutation with what happened and the resulting state.
    fn on_update(&mut self, notice: &Notice, snapshot: &SessionSnapshot);
}

impl<F> SessionObserver for F
where
    F: FnMut(&Notice, &SessionSnapshot) + Send,
{
    fn on_update(&mut self, notice: &Notice, snapshot: &SessionSnapshot) {
        self(notice, snapshot);
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription(u64);

/// Ordered list of observers
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<(Subscription, Box<dyn SessionObserver>)>,
    next_id: u64,
}

impl ObserverList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn subscribe(&mut self, observer: Box<dyn SessionObserver>) -> Subscription {
        let subscription = Subscription(self.next_id);
        self.next_id += 1;
        self.observers.push((subscription, observer));
        subscription
    }

    /// Remove an observer; `false` if it was not registered
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(s, _)| *s != subscription);
        self.observers.len() != before
    }

    /// Whether anyone is listening
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Number of observers
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Deliver an update to every observer in subscription order
    pub fn notify(&mut self, notice: &Notice, snapshot: &SessionSnapshot) {
        for (_, observer) in &mut self.observers {
            observer.on_update(notice, snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn test_subscribe_notify_unsubscribe() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut list = ObserverList::new();

        let sink = Arc::clone(&seen);
        let subscription = list.subscribe(Box::new(move |notice: &Notice, _: &SessionSnapshot| {
            sink.lock().unwrap().push(notice.clone());
        }));
        assert_eq!(list.len(), 1);

        list.notify(&Notice::Reset, &SessionSnapshot::default());
        assert_eq!(seen.lock().unwrap().as_slice(), &[Notice::Reset]);

        assert!(list.unsubscribe(subscription));
        assert!(!list.unsubscribe(subscription));
        list.notify(&Notice::Reset, &SessionSnapshot::default());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_subscriptions_are_distinct() {
        let mut list = ObserverList::new();
        let a = list.subscribe(Box::new(|_: &Notice, _: &SessionSnapshot| {}));
        let b = list.subscribe(Box::new(|_: &Notice, _: &SessionSnapshot| {}));
        assert_ne!(a, b);

        list.unsubscribe(a);
        assert_eq!(list.len(), 1);
    }
}
