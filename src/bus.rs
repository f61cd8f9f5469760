//! Publish/subscribe layer for derived-state changes.
//!
//! The bus is an in-process registry injected into the store at
//! construction time; there is no ambient global state. Each published
//! value is computed once per change and broadcast to every subscriber of
//! its topic.

use std::collections::HashMap;
use std::hash::Hash;

/// Opaque handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Box<dyn Fn(&E)>;

pub struct ChangeBus<T, E> {
    next_id: u64,
    subscribers: HashMap<T, Vec<(SubscriptionId, Callback<E>)>>,
}

impl<T: Eq + Hash + Copy, E> ChangeBus<T, E> {
    pub fn new() -> Self {
        ChangeBus {
            next_id: 0,
            subscribers: HashMap::new(),
        }
    }

    /// Register a callback for one topic. The callback receives each new
    /// value published under that topic.
    pub fn subscribe(&mut self, topic: T, callback: impl Fn(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers
            .entry(topic)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for subs in self.subscribers.values_mut() {
            if let Some(pos) = subs.iter().position(|(sub_id, _)| *sub_id == id) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }

    /// Broadcast one value to all subscribers of `topic`.
    pub fn publish(&self, topic: T, event: &E) {
        if let Some(subs) = self.subscribers.get(&topic) {
            for (_, callback) in subs {
                callback(event);
            }
        }
    }

    pub fn subscriber_count(&self, topic: T) -> usize {
        self.subscribers.get(&topic).map_or(0, Vec::len)
    }
}

impl<T: Eq + Hash + Copy, E> Default for ChangeBus<T, E> {
    fn default() -> Self {
        ChangeBus::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum TestTopic {
        A,
        B,
    }

    #[test]
    fn test_publish_reaches_topic_subscribers_only() {
        let mut bus: ChangeBus<TestTopic, u32> = ChangeBus::new();
        let seen_a = Rc::new(RefCell::new(Vec::new()));
        let seen_b = Rc::new(RefCell::new(Vec::new()));

        let a = seen_a.clone();
        bus.subscribe(TestTopic::A, move |v| a.borrow_mut().push(*v));
        let b = seen_b.clone();
        bus.subscribe(TestTopic::B, move |v| b.borrow_mut().push(*v));

        bus.publish(TestTopic::A, &1);
        bus.publish(TestTopic::A, &2);
        bus.publish(TestTopic::B, &3);

        assert_eq!(*seen_a.borrow(), vec![1, 2]);
        assert_eq!(*seen_b.borrow(), vec![3]);
    }

    #[test]
    fn test_all_subscribers_observe_same_value() {
        let mut bus: ChangeBus<TestTopic, u32> = ChangeBus::new();
        let first = Rc::new(RefCell::new(None));
        let second = Rc::new(RefCell::new(None));

        let f = first.clone();
        bus.subscribe(TestTopic::A, move |v| *f.borrow_mut() = Some(*v));
        let s = second.clone();
        bus.subscribe(TestTopic::A, move |v| *s.borrow_mut() = Some(*v));

        bus.publish(TestTopic::A, &42);
        assert_eq!(*first.borrow(), Some(42));
        assert_eq!(*second.borrow(), Some(42));
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus: ChangeBus<TestTopic, u32> = ChangeBus::new();
        let seen = Rc::new(RefCell::new(0));

        let s = seen.clone();
        let id = bus.subscribe(TestTopic::A, move |_| *s.borrow_mut() += 1);
        bus.publish(TestTopic::A, &0);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(TestTopic::A, &0);

        assert_eq!(*seen.borrow(), 1);
        assert_eq!(bus.subscriber_count(TestTopic::A), 0);
    }
}
