//! Computed Properties
//!
//! A computed property is a getter declared on a class. The store memoizes
//! its result in the state map and re-evaluates it only when one of the keys
//! it read during its last evaluation changes.
//!
//! # How Computed Properties Work
//!
//! 1. **Prepare**: while the store is inert, each getter is captured and its
//!    slot answers reads by calling the getter directly.
//!
//! 2. **Monitor**: on start the slot becomes lazy. The first read (or the
//!    first listener) evaluates the getter against a tracking [`Subscriber`]
//!    so its dependencies are recorded.
//!
//! 3. **Arm**: the recorded keys become a follower tagged with this
//!    property's [`ComputedInfo`]. The batch uses that tag to recompute
//!    before any plain listener runs.
//!
//! 4. **Refresh**: when a dependency changes, the getter runs again. A new
//!    value that is not strictly equal to the old one is stored and emitted,
//!    which pulls further dependents into the same frame.
//!
//! # Priority
//!
//! Every computed starts at priority 1. Reading another computed of priority
//! `p` raises it to at least `p + 1`, so a batch that orders recomputes by
//! priority always refreshes dependencies before their dependents.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::follower::Notify;
use super::observer::{Observer, ObserverId};
use super::subject::{Accessor, ComputedSlot, Getter, Phase, Slot};
use super::subscriber::Subscriber;
use crate::error::{Issue, Result};
use crate::schedule::Frame;
use crate::value::Value;

/// Ordering metadata of one computed property.
#[derive(Debug)]
pub struct ComputedInfo {
    key: String,
    parent: ObserverId,
    priority: AtomicU32,
}

impl ComputedInfo {
    pub(crate) fn new(key: impl Into<String>, parent: ObserverId) -> Self {
        Self {
            key: key.into(),
            parent,
            priority: AtomicU32::new(1),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The store that owns this property.
    pub fn parent(&self) -> ObserverId {
        self.parent
    }

    /// Length of the longest chain of computed properties ending here.
    pub fn priority(&self) -> u32 {
        self.priority.load(Ordering::Relaxed)
    }

    /// Raise the priority to at least `min`. Priorities never decrease.
    pub(crate) fn raise_priority(&self, min: u32) {
        self.priority.fetch_max(min, Ordering::Relaxed);
    }
}

impl Observer {
    /// Capture getters and install their declared slots.
    ///
    /// The first definition of a key wins, and a plain field of the same
    /// name shadows the getter entirely.
    pub(crate) fn prepare_computed(&self, accessors: impl IntoIterator<Item = (String, Accessor)>) {
        let mut inner = self.inner.lock();

        for (key, accessor) in accessors {
            if inner.getters.contains_key(&key) || inner.subject.slots.contains_key(&key) {
                continue;
            }

            let info = Arc::new(ComputedInfo::new(key.as_str(), self.id));
            inner.subject.slots.insert(
                key.clone(),
                Slot::Computed(ComputedSlot {
                    phase: Phase::Declared,
                    info,
                    subscriber: None,
                }),
            );
            inner.getters.insert(key, accessor);
        }
    }

    /// Monitor every captured getter that has not been overridden.
    ///
    /// Getters that already have listeners are evaluated immediately, after
    /// all of them have been switched to lazy.
    pub(crate) fn init_computed(self: &Arc<Self>) -> Result<()> {
        let expected: Vec<String> = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let mut expected = Vec::new();

            let keys: Vec<String> = inner.getters.keys().cloned().collect();
            for key in keys {
                if inner.state.contains_key(&key) {
                    continue;
                }

                let followed = inner
                    .followers
                    .values()
                    .any(|follower| follower.keys.contains(&key));

                let Some(slot) = inner.subject.computed_mut(&key) else {
                    continue;
                };

                slot.phase = Phase::Lazy;
                inner.watched.insert(key.clone());

                if followed {
                    expected.push(key);
                }
            }

            expected
        };

        for key in expected {
            self.evaluate_if_lazy(&key, false)?;
        }

        Ok(())
    }

    /// Evaluate a lazy computed now if nothing has read it yet.
    pub(crate) fn run_early_if_computed(self: &Arc<Self>, key: &str) -> Result<()> {
        self.evaluate_if_lazy(key, true)
    }

    fn evaluate_if_lazy(self: &Arc<Self>, key: &str, early: bool) -> Result<()> {
        let pending = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            match inner.subject.computed_mut(key) {
                Some(slot) if slot.phase == Phase::Lazy => match inner.getters.get(key) {
                    Some(accessor) => {
                        slot.phase = Phase::Evaluating;
                        Some((accessor.get.clone(), slot.info.clone()))
                    }
                    None => None,
                },
                _ => None,
            }
        };

        match pending {
            Some((get, info)) => self.initial(key, get, info, early).map(drop),
            None => Ok(()),
        }
    }

    /// First evaluation of `key`.
    ///
    /// Whether or not the getter succeeds, the keys it read are armed and the
    /// slot becomes memoized, so a failing getter is retried the next time a
    /// dependency changes.
    pub(crate) fn initial(
        self: &Arc<Self>,
        key: &str,
        get: Getter,
        info: Arc<ComputedInfo>,
        early: bool,
    ) -> Result<Value> {
        let refresh: Notify = {
            let observer = Arc::downgrade(self);
            let key = key.to_owned();

            Arc::new(move |_: &Frame| {
                if let Some(observer) = observer.upgrade() {
                    observer.refresh(&key);
                }
            })
        };

        let subscriber = Subscriber::with_meta(self, refresh, info.clone());
        let outcome = get(&subscriber);

        if let Err(error) = &outcome {
            Issue::compute_failed(&self.name, key, true, error).warn();
            if early {
                Issue::computed_early(&self.name, key).warn();
            }
        }

        // A getter reading its own key sees `Undefined`, not a dependency.
        subscriber.forget(key);
        subscriber.listen();

        for dependency in subscriber.following() {
            let priority = self
                .inner
                .lock()
                .subject
                .computed(&dependency)
                .map(|slot| slot.info.priority());

            if let Some(priority) = priority {
                info.raise_priority(priority + 1);
            }
        }

        let previous = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            if let Ok(value) = &outcome {
                if !value.is_undefined() {
                    inner.state.insert(key.to_owned(), value.clone());
                }
            }

            match inner.subject.computed_mut(key) {
                Some(slot) => {
                    slot.phase = Phase::Ready;
                    slot.subscriber.replace(subscriber)
                }
                None => Some(subscriber),
            }
        };

        if let Some(previous) = previous {
            previous.release();
        }

        tracing::trace!(
            model = %self.name,
            key,
            priority = info.priority(),
            early,
            "computed initialized"
        );

        outcome
    }

    /// Re-evaluate `key` against the live store and emit it if it changed.
    ///
    /// Failures are reported and leave the stored value in place.
    pub(crate) fn refresh(self: &Arc<Self>, key: &str) {
        let Some(get) = self.inner.lock().getters.get(key).map(|a| a.get.clone()) else {
            return;
        };

        let next = match get(&Subscriber::detached(self)) {
            Ok(value) => value,
            Err(error) => {
                Issue::compute_failed(&self.name, key, false, &error).warn();
                return;
            }
        };

        let previous = {
            let mut inner = self.inner.lock();
            let unchanged = inner
                .state
                .get(key)
                .map(|current| current.strict_eq(&next))
                .unwrap_or_else(|| next.is_undefined());

            if unchanged {
                return;
            }

            inner.state.insert(key.to_owned(), next)
        };

        drop(previous);
        self.emit(key);
    }

    /// Ordering metadata of the computed property `key`, if there is one.
    pub fn computed_info(&self, key: &str) -> Option<Arc<ComputedInfo>> {
        self.inner
            .lock()
            .subject
            .computed(key)
            .map(|slot| slot.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_starts_at_one() {
        let info = ComputedInfo::new("minutes", ObserverId::new());
        assert_eq!(info.key(), "minutes");
        assert_eq!(info.priority(), 1);
    }

    #[test]
    fn priority_never_decreases() {
        let info = ComputedInfo::new("total", ObserverId::new());

        info.raise_priority(3);
        assert_eq!(info.priority(), 3);

        info.raise_priority(2);
        assert_eq!(info.priority(), 3);
    }
}
