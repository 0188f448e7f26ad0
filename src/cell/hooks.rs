//! Named callback hooks on cells.
//!
//! Observers attached to a hook are invoked synchronously on the scheduling
//! thread, in registration order, after the step that staged the invocation.
//! A slow observer stalls its pipeline.

use crate::frame::Frame;
use crate::metadata::Metadata;
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Observer callback: the frame (if any) and the cell's measurements.
pub type Observer = Arc<dyn Fn(Option<&Frame>, &Metadata) + Send + Sync>;

/// Identifies a connected observer for later disconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

struct HookInner {
    observers: SmallVec<[(ObserverId, Observer); 2]>,
    next_id: u64,
    closed: bool,
}

/// A named hook with an ordered observer list.
pub struct Hook {
    name: String,
    cell: String,
    inner: RwLock<HookInner>,
}

impl Hook {
    pub(crate) fn new(cell: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            cell: cell.to_string(),
            inner: RwLock::new(HookInner {
                observers: SmallVec::new(),
                next_id: 0,
                closed: false,
            }),
        }
    }

    /// Hook name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach an observer.
    ///
    /// Once the owning channel has closed the hook, the observer is dropped
    /// immediately and will never fire.
    pub fn connect<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(Option<&Frame>, &Metadata) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let id = ObserverId(inner.next_id);
        inner.next_id += 1;
        if inner.closed {
            tracing::debug!(cell = %self.cell, hook = %self.name, "connect on closed hook ignored");
        } else {
            inner.observers.push((id, Arc::new(observer)));
        }
        id
    }

    /// Detach an observer. Returns whether it was attached.
    pub fn disconnect(&self, id: ObserverId) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = inner.observers.len();
        inner.observers.retain(|(oid, _)| *oid != id);
        inner.observers.len() != before
    }

    /// Number of attached observers.
    pub fn observer_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .observers
            .len()
    }

    /// Whether the hook was closed with its channel.
    pub fn is_closed(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .closed
    }

    /// Invoke every observer in registration order.
    pub(crate) fn fire(&self, frame: Option<&Frame>, metadata: &Metadata) {
        // Snapshot so observers may connect/disconnect without deadlocking.
        let observers: SmallVec<[Observer; 2]> = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .observers
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();

        for observer in observers {
            observer(frame, metadata);
        }
    }

    /// Release all observers and stop accepting new ones.
    pub(crate) fn close(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.closed = true;
        inner.observers.clear();
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// The hooks declared by a cell type.
#[derive(Clone, Default, Debug)]
pub struct HookSet {
    hooks: Vec<Arc<Hook>>,
}

impl HookSet {
    pub(crate) fn new(cell: &str, names: &[&str]) -> Self {
        Self {
            hooks: names.iter().map(|n| Arc::new(Hook::new(cell, n))).collect(),
        }
    }

    /// Look up a hook.
    pub fn get(&self, name: &str) -> Option<&Arc<Hook>> {
        self.hooks.iter().find(|h| h.name == name)
    }

    /// Hook names in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name.as_str()).collect()
    }

    pub(crate) fn close_all(&self) {
        for hook in &self.hooks {
            hook.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;
    use std::sync::Mutex;

    #[test]
    fn test_observers_fire_in_order() {
        let hook = Hook::new("dst", "on_verify");
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let seen = Arc::clone(&seen);
            hook.connect(move |_, _| seen.lock().unwrap().push(tag));
        }

        hook.fire(None, &Metadata::new());
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_disconnect() {
        let hook = Hook::new("dst", "on_verify");
        let a = hook.connect(|_, _| {});
        let _b = hook.connect(|_, _| {});
        assert!(hook.disconnect(a));
        assert!(!hook.disconnect(a));
        assert_eq!(hook.observer_count(), 1);
    }

    #[test]
    fn test_metadata_reaches_observer() {
        let hook = Hook::new("dst", "on_verify");
        let freq = Arc::new(Mutex::new(None));
        let freq_clone = Arc::clone(&freq);
        hook.connect(move |_, meta| {
            *freq_clone.lock().unwrap() = meta.get("frequency").and_then(|v| v.as_f64());
        });

        hook.fire(
            None,
            &Metadata::new().with("frequency", MetadataValue::Float(25.0)),
        );
        assert_eq!(*freq.lock().unwrap(), Some(25.0));
    }

    #[test]
    fn test_closed_hook_drops_observers() {
        let hook = Hook::new("dst", "on_verify");
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        hook.connect(move |_, _| *c.lock().unwrap() += 1);

        hook.close();
        assert!(hook.is_closed());
        assert_eq!(hook.observer_count(), 0);

        let c = Arc::clone(&count);
        hook.connect(move |_, _| *c.lock().unwrap() += 1);
        hook.fire(None, &Metadata::new());
        assert_eq!(*count.lock().unwrap(), 0);
    }
}
