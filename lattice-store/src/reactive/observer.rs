//! Observer Implementation
//!
//! The observer is the reactive store behind every model. It owns:
//!
//! - the subject's accessor table, which routes every read and write,
//! - the state map holding the current value of each watched key,
//! - the follower registry,
//! - the open batch, if a frame is in progress.
//!
//! # Lifecycle
//!
//! A store is created *inert*. It can register followers and accept reads,
//! but emitted keys are queued rather than dispatched. [`Observer::start`]
//! instruments the subject, materializes computed properties and flushes
//! whatever was queued. From then on it is *active*.
//!
//! # Locking
//!
//! All state sits behind one mutex. User code (getters, setters, listeners)
//! is never called while it is held, which is what allows a listener to set
//! another property, or a getter to read one, without deadlocking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use super::computed::ComputedInfo;
use super::follower::{Cancel, Follower, FollowerId, Notify};
use super::subject::{Accessor, Getter, Init, Phase, SetEffect, Setter, Slot, Subject};
use super::subscriber::Subscriber;
use super::Model;
use crate::error::{Issue, Result};
use crate::lifecycle::Lifecycle;
use crate::schedule::{Batch, Frame, Scheduler};
use crate::value::Value;

/// Unique identifier for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique store ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback resolved once the awaited frame completes.
pub(crate) type Waiter = Box<dyn FnOnce(Frame) + Send>;

pub(crate) struct Inner {
    pub(crate) subject: Subject,
    pub(crate) state: IndexMap<String, Value>,
    /// Keys with installed accessors. Only ever grows.
    pub(crate) watched: IndexSet<String>,
    pub(crate) followers: IndexMap<FollowerId, Arc<Follower>>,
    /// Computed accessors captured from the class chain.
    pub(crate) getters: IndexMap<String, Accessor>,
    pub(crate) batch: Option<Batch>,
    pub(crate) waiting: Vec<Waiter>,
    pub(crate) active: bool,
    /// Keys emitted before activation.
    pub(crate) queued: IndexSet<String>,
}

/// The reactive store of one subject.
pub struct Observer {
    pub(crate) id: ObserverId,
    pub(crate) name: Arc<str>,
    pub(crate) inner: Mutex<Inner>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
}

/// What a read resolved to while the lock was held.
enum Read {
    Value(Value),
    Passthrough(Getter),
    Initial(Getter, Arc<ComputedInfo>),
}

/// What a write resolved to while the lock was held.
enum Write {
    Done,
    Assigned(Option<SetEffect>),
    Custom(Setter),
    Rejected,
}

impl Observer {
    /// Create an inert store over `subject`, preparing `accessors` as
    /// computed properties.
    ///
    /// `accessors` must be ordered most-derived first; the first definition
    /// of a key wins.
    pub(crate) fn new(
        name: Arc<str>,
        subject: Subject,
        accessors: impl IntoIterator<Item = (String, Accessor)>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Arc<Self> {
        let observer = Arc::new(Self {
            id: ObserverId::new(),
            name,
            inner: Mutex::new(Inner {
                subject,
                state: IndexMap::new(),
                watched: IndexSet::new(),
                followers: IndexMap::new(),
                getters: IndexMap::new(),
                batch: None,
                waiting: Vec::new(),
                active: false,
                queued: IndexSet::new(),
            }),
            scheduler,
        });

        observer.prepare_computed(accessors);
        observer
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Name of the class this store was created from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    /// Whether a frame is open and waiting to be flushed.
    pub fn is_pending(&self) -> bool {
        self.inner.lock().batch.is_some()
    }

    /// Keys with installed accessors, in installation order.
    pub fn watched(&self) -> Vec<String> {
        self.inner.lock().watched.iter().cloned().collect()
    }

    pub(crate) fn handle(self: &Arc<Self>) -> Model {
        Model(self.clone())
    }

    /// Instrument the subject and activate the store.
    ///
    /// Plain values become monitored state, pending markers are resolved,
    /// computed properties are materialized, and keys emitted while inert
    /// are flushed as the first frame. Calling `start` again does nothing.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        enum Step {
            Monitor(String, Value),
            Resolve(String, Init),
        }

        let steps: Vec<Step> = {
            let inner = self.inner.lock();
            if inner.active {
                return Ok(());
            }

            inner
                .subject
                .slots
                .iter()
                .filter_map(|(key, slot)| match slot {
                    // Nested stores manage themselves.
                    Slot::Raw(Value::Model(_)) => None,
                    Slot::Raw(value) => Some(Step::Monitor(key.clone(), value.clone())),
                    Slot::Pending(init) => Some(Step::Resolve(key.clone(), init.clone())),
                    _ => None,
                })
                .collect()
        };

        let model = self.handle();
        for step in steps {
            match step {
                Step::Monitor(key, value) => self.monitor_value(&key, value, None),
                Step::Resolve(key, init) => init(&key, &model)?,
            }
        }

        self.init_computed()?;

        let (queued, waiting) = {
            let mut inner = self.inner.lock();
            inner.active = true;
            let queued = std::mem::take(&mut inner.queued);
            let waiting = if queued.is_empty() {
                std::mem::take(&mut inner.waiting)
            } else {
                Vec::new()
            };
            (queued, waiting)
        };

        tracing::debug!(model = %self.name, queued = queued.len(), "store activated");

        for key in &queued {
            self.emit(key);
        }

        // Nothing to flush: resolve early waiters with an empty frame.
        for waiter in waiting {
            waiter(Frame::default());
        }

        Ok(())
    }

    /// Install `slot` for `key` and mark it watched. Installing the same kind
    /// of accessor twice is harmless.
    pub(crate) fn assign(&self, key: &str, slot: Slot) {
        let previous = {
            let mut inner = self.inner.lock();
            inner.watched.insert(key.to_owned());
            inner.subject.slots.insert(key.to_owned(), slot)
        };

        // Dropped outside the lock: it may own nested stores.
        drop(previous);
    }

    /// Monitor `key` as plain state starting at `initial`.
    ///
    /// Assignments that are strictly equal to the current value are ignored;
    /// any other assignment updates the state, runs `effect` and emits `key`.
    pub fn monitor_value(self: &Arc<Self>, key: &str, initial: Value, effect: Option<SetEffect>) {
        if !initial.is_undefined() {
            self.inner.lock().state.insert(key.to_owned(), initial);
        }

        self.assign(key, Slot::State { effect });
    }

    /// Read `key` through its accessor.
    ///
    /// A computed property that has never been read is evaluated here; its
    /// failure is returned to the caller.
    pub fn get(self: &Arc<Self>, key: &str) -> Result<Value> {
        let read = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            match inner.subject.slots.get_mut(key) {
                None | Some(Slot::Pending(_)) => Read::Value(Value::Undefined),
                Some(Slot::Raw(value)) => Read::Value(value.clone()),
                Some(Slot::State { .. }) => {
                    Read::Value(inner.state.get(key).cloned().unwrap_or_default())
                }
                Some(Slot::Computed(slot)) => match slot.phase {
                    Phase::Declared => match inner.getters.get(key) {
                        Some(accessor) => Read::Passthrough(accessor.get.clone()),
                        None => Read::Value(Value::Undefined),
                    },
                    Phase::Lazy => match inner.getters.get(key) {
                        Some(accessor) => {
                            slot.phase = Phase::Evaluating;
                            Read::Initial(accessor.get.clone(), slot.info.clone())
                        }
                        None => Read::Value(Value::Undefined),
                    },
                    Phase::Evaluating => Read::Value(Value::Undefined),
                    Phase::Ready => Read::Value(inner.state.get(key).cloned().unwrap_or_default()),
                },
            }
        };

        match read {
            Read::Value(value) => Ok(value),
            Read::Passthrough(get) => get(&Subscriber::detached(self)),
            Read::Initial(get, info) => self.initial(key, get, info, false),
        }
    }

    /// Current state of `key` without running any accessor.
    pub fn peek(&self, key: &str) -> Value {
        let inner = self.inner.lock();
        match inner.subject.slots.get(key) {
            Some(Slot::Raw(value)) => value.clone(),
            _ => inner.state.get(key).cloned().unwrap_or_default(),
        }
    }

    /// Write `key` through its accessor.
    ///
    /// Writing a computed property runs its setter. Without a setter the
    /// write is rejected with a warning, unless the store has not started
    /// yet, in which case the computed is overridden by a plain value.
    pub fn set(self: &Arc<Self>, key: &str, value: Value) -> Result<()> {
        let (write, value, replaced) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let mut replaced = None;

            let write = match inner.subject.slots.get_mut(key) {
                None => {
                    inner
                        .subject
                        .slots
                        .insert(key.to_owned(), Slot::Raw(value.clone()));
                    Write::Done
                }
                Some(Slot::Raw(current)) => {
                    replaced = Some(std::mem::replace(current, value.clone()));
                    Write::Done
                }
                Some(slot @ Slot::Pending(_)) => {
                    *slot = Slot::Raw(value.clone());
                    Write::Done
                }
                Some(Slot::State { effect }) => {
                    let unchanged = inner
                        .state
                        .get(key)
                        .map(|current| current.strict_eq(&value))
                        .unwrap_or_else(|| value.is_undefined());

                    if unchanged {
                        Write::Done
                    } else {
                        replaced = inner.state.insert(key.to_owned(), value.clone());
                        Write::Assigned(effect.clone())
                    }
                }
                Some(slot) => {
                    let phase = match slot {
                        Slot::Computed(computed) => computed.phase,
                        _ => Phase::Ready,
                    };

                    match inner.getters.get(key).and_then(|a| a.set.clone()) {
                        Some(setter) => Write::Custom(setter),
                        None if phase == Phase::Declared => {
                            inner.getters.shift_remove(key);
                            *slot = Slot::Raw(value.clone());
                            Write::Done
                        }
                        None => Write::Rejected,
                    }
                }
            };

            (write, value, replaced)
        };

        drop(replaced);

        match write {
            Write::Done => Ok(()),
            Write::Assigned(effect) => {
                if let Some(effect) = effect {
                    effect(&value, &self.handle());
                }
                self.emit(key);
                Ok(())
            }
            Write::Custom(setter) => setter(&self.handle(), value),
            Write::Rejected => {
                Issue::assign_to_getter(&self.name, key).warn();
                Ok(())
            }
        }
    }

    /// Register `handler` for changes to `keys`.
    ///
    /// The handler receives the current value and key for each matching key
    /// of a frame.
    pub fn watch<F>(self: &Arc<Self>, keys: IndexSet<String>, handler: F, once: bool) -> Result<Cancel>
    where
        F: Fn(&Value, &str) + Send + Sync + 'static,
    {
        let observer = Arc::downgrade(self);
        let watched = keys.clone();

        let callback: Notify = Arc::new(move |frame: &Frame| {
            let Some(observer) = observer.upgrade() else {
                return;
            };

            for key in frame.iter() {
                if watched.contains(key) {
                    handler(&observer.peek(key), key);
                }
            }
        });

        self.add_listener(keys, callback, once)
    }

    /// Register `callback` for frames touching any of `keys`.
    ///
    /// Listening to a computed property that has never been read evaluates
    /// it immediately.
    pub fn add_listener(
        self: &Arc<Self>,
        keys: IndexSet<String>,
        callback: Notify,
        once: bool,
    ) -> Result<Cancel> {
        for key in &keys {
            self.run_early_if_computed(key)?;
        }

        Ok(self.follow(keys, callback, None, once))
    }

    /// Add a follower record without any early evaluation.
    pub(crate) fn follow(
        self: &Arc<Self>,
        keys: IndexSet<String>,
        notify: Notify,
        computed: Option<Arc<ComputedInfo>>,
        once: bool,
    ) -> Cancel {
        let follower = Arc::new(Follower::new(keys, notify, computed, once));
        let id = follower.id;

        self.inner.lock().followers.insert(id, follower);

        let observer: Weak<Observer> = Arc::downgrade(self);
        Cancel::new(move || {
            if let Some(observer) = observer.upgrade() {
                let removed = observer.inner.lock().followers.shift_remove(&id);
                drop(removed);
            }
        })
    }

    /// Number of registered follower records.
    pub fn follower_count(&self) -> usize {
        self.inner.lock().followers.len()
    }

    /// Record `key` as changed.
    ///
    /// Joins the open frame if there is one; otherwise opens a frame and
    /// defers its flush to the scheduler. Inert stores queue the key.
    pub fn emit(self: &Arc<Self>, key: &str) {
        let opened = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            if !inner.active {
                inner.queued.insert(key.to_owned());
                tracing::trace!(model = %self.name, key, "queued before activation");
                return;
            }

            match &mut inner.batch {
                Some(batch) => {
                    batch.add(key, inner.followers.values());
                    false
                }
                None => {
                    let mut batch = Batch::new(self.id);
                    batch.add(key, inner.followers.values());
                    inner.batch = Some(batch);
                    true
                }
            }
        };

        tracing::trace!(model = %self.name, key, opened, "emit");

        if opened {
            let observer = Arc::downgrade(self);
            self.scheduler.defer(Box::new(move || {
                if let Some(observer) = observer.upgrade() {
                    observer.notify();
                }
            }));
        }
    }

    /// Flush the open frame.
    fn notify(self: &Arc<Self>) {
        loop {
            let next = match self.inner.lock().batch.as_mut() {
                Some(batch) => batch.next_recompute(),
                None => None,
            };

            match next {
                Some(recompute) => recompute.notify(&Frame::default()),
                None => break,
            }
        }

        let (frame, effects, waiting) = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            let Some(batch) = inner.batch.take() else {
                return;
            };

            let (frame, effects) = batch.finish();
            for follower in effects.iter().filter(|f| f.once) {
                inner.followers.shift_remove(&follower.id);
            }

            (frame, effects, std::mem::take(&mut inner.waiting))
        };

        tracing::debug!(model = %self.name, keys = ?frame, listeners = effects.len(), "frame flushed");

        for follower in &effects {
            follower.notify(&frame);
        }

        for waiter in waiting {
            waiter(frame.clone());
        }
    }

    /// Resolve `waiter` when the open frame (or the next one) completes.
    pub(crate) fn wait(&self, waiter: Waiter) {
        self.inner.lock().waiting.push(waiter);
    }

    /// Keys a probe selector may capture: every watched key, the lifecycle
    /// pseudo-keys, and while inert, every declared property.
    pub(crate) fn selectable(&self) -> IndexSet<String> {
        let inner = self.inner.lock();
        let mut keys: IndexSet<String> = inner.watched.iter().cloned().collect();

        if !inner.active {
            keys.extend(inner.subject.slots.keys().cloned());
        }

        keys.extend(Lifecycle::ALL.iter().map(|event| event.as_str().to_owned()));
        keys
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::TaskQueue;
    use std::sync::atomic::AtomicI32;

    fn store(queue: &TaskQueue, fields: &[(&str, Value)]) -> Arc<Observer> {
        let mut subject = Subject::new();
        for (key, value) in fields {
            subject.slots.insert(key.to_string(), Slot::Raw(value.clone()));
        }

        Observer::new(
            Arc::from("Test"),
            subject,
            std::iter::empty::<(String, Accessor)>(),
            Arc::new(queue.clone()),
        )
    }

    fn keys(keys: &[&str]) -> IndexSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn start_monitors_plain_values() {
        let queue = TaskQueue::new();
        let observer = store(&queue, &[("value", Value::from(1))]);

        assert!(observer.watched().is_empty());
        observer.start().unwrap();

        assert!(observer.is_active());
        assert_eq!(observer.watched(), ["value"]);
        assert_eq!(observer.get("value").unwrap(), Value::from(1));
    }

    #[test]
    fn mutations_are_batched_into_one_frame() {
        let queue = TaskQueue::new();
        let observer = store(&queue, &[("a", Value::from(1)), ("b", Value::from(2))]);
        observer.start().unwrap();

        let frames = Arc::new(Mutex::new(Vec::new()));
        let frames_clone = frames.clone();
        let _cancel = observer
            .add_listener(
                keys(&["a", "b"]),
                Arc::new(move |frame: &Frame| frames_clone.lock().push(frame.clone())),
                false,
            )
            .unwrap();

        observer.set("a", Value::from(10)).unwrap();
        observer.set("b", Value::from(20)).unwrap();

        assert!(observer.is_pending());
        assert_eq!(queue.len(), 1);
        assert!(frames.lock().is_empty());

        queue.run_until_idle();

        let frames = frames.lock();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].keys(), ["a", "b"]);
        assert!(!observer.is_pending());
    }

    #[test]
    fn equal_assignment_does_not_emit() {
        let queue = TaskQueue::new();
        let observer = store(&queue, &[("value", Value::from("foo"))]);
        observer.start().unwrap();

        observer.set("value", Value::from("foo")).unwrap();
        assert!(!observer.is_pending());
        assert!(queue.is_empty());
    }

    #[test]
    fn set_effect_runs_on_change() {
        let queue = TaskQueue::new();
        let observer = store(&queue, &[]);
        observer.start().unwrap();

        let seen = Arc::new(AtomicI32::new(0));
        let seen_clone = seen.clone();
        observer.monitor_value(
            "count",
            Value::from(0),
            Some(Arc::new(move |value: &Value, _: &Model| {
                seen_clone.store(value.as_i64().unwrap_or(-1) as i32, Ordering::SeqCst);
            })),
        );

        observer.set("count", Value::from(3)).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn emits_before_activation_are_queued() {
        let queue = TaskQueue::new();
        let observer = store(&queue, &[("value", Value::from(1))]);

        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let _cancel = observer
            .watch(
                keys(&["value"]),
                move |_, _| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                },
                false,
            )
            .unwrap();

        observer.emit("value");
        assert!(queue.is_empty());

        observer.start().unwrap();
        queue.run_until_idle();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_listener_is_not_called() {
        let queue = TaskQueue::new();
        let observer = store(&queue, &[("value", Value::from(1))]);
        observer.start().unwrap();

        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let cancel = observer
            .watch(
                keys(&["value"]),
                move |_, _| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                },
                false,
            )
            .unwrap();

        assert_eq!(observer.follower_count(), 1);
        cancel.cancel();
        assert_eq!(observer.follower_count(), 0);

        observer.set("value", Value::from(2)).unwrap();
        queue.run_until_idle();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn once_listener_is_removed_after_first_frame() {
        let queue = TaskQueue::new();
        let observer = store(&queue, &[("value", Value::from(1))]);
        observer.start().unwrap();

        let count = Arc::new(AtomicI32::new(0));
        let count_clone = count.clone();
        let _cancel = observer
            .watch(
                keys(&["value"]),
                move |_, _| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                },
                true,
            )
            .unwrap();

        observer.set("value", Value::from(2)).unwrap();
        queue.run_until_idle();
        observer.set("value", Value::from(3)).unwrap();
        queue.run_until_idle();

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(observer.follower_count(), 0);
    }

    #[test]
    fn nested_models_are_not_shadowed() {
        let queue = TaskQueue::new();
        let child = store(&queue, &[]);
        let observer = store(&queue, &[("child", Value::Model(child.handle()))]);
        observer.start().unwrap();

        assert!(!observer.watched().contains(&"child".to_string()));
        assert!(observer.get("child").unwrap().as_model().is_some());
    }
}
