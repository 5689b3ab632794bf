//! Change notification fan-out.
//!
//! The ingestion worker calls [`UpdateNotifier::notify`] once per processed
//! file with the set of system names whose sites changed. Listeners are
//! best-effort: each call runs inside a fault barrier so a panicking
//! consumer can neither abort the ingestion loop nor starve other listeners.

use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;

/// A consumer interested in which systems changed during an ingestion pass.
pub trait UpdateListener: Send + Sync {
    fn systems_updated(&self, systems: &BTreeSet<String>);
}

/// Blanket impl so plain closures can subscribe.
impl<F> UpdateListener for F
where
    F: Fn(&BTreeSet<String>) + Send + Sync,
{
    fn systems_updated(&self, systems: &BTreeSet<String>) {
        self(systems)
    }
}

#[derive(Default)]
pub struct UpdateNotifier {
    listeners: Mutex<Vec<Box<dyn UpdateListener>>>,
}

impl UpdateNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Box<dyn UpdateListener>) {
        self.listeners
            .lock()
            .expect("notifier lock poisoned")
            .push(listener);
    }

    /// Invoke every listener with the changed-system set. Listener panics are
    /// caught and logged, never propagated.
    pub fn notify(&self, systems: &BTreeSet<String>) {
        if systems.is_empty() {
            return;
        }
        let listeners = self.listeners.lock().expect("notifier lock poisoned");
        for listener in listeners.iter() {
            let result = catch_unwind(AssertUnwindSafe(|| listener.systems_updated(systems)));
            if result.is_err() {
                tracing::warn!(?systems, "update listener panicked, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn listeners_receive_changed_systems() {
        let notifier = UpdateNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        notifier.subscribe(Box::new(move |systems: &BTreeSet<String>| {
            seen_clone.lock().unwrap().push(systems.clone());
        }));

        notifier.notify(&set(&["Alpha", "Beta"]));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("Alpha"));
    }

    #[test]
    fn empty_set_is_not_delivered() {
        let notifier = UpdateNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        notifier.subscribe(Box::new(move |_: &BTreeSet<String>| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        notifier.notify(&BTreeSet::new());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let notifier = UpdateNotifier::new();
        notifier.subscribe(Box::new(|_: &BTreeSet<String>| {
            panic!("listener bug");
        }));

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        notifier.subscribe(Box::new(move |_: &BTreeSet<String>| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        notifier.notify(&set(&["Alpha"]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
