//! Tracking Sessions
//!
//! A [`Subscriber`] stands in for a store during a bounded pass of user code
//! (a computed getter, an effect, a probe) and records every key read
//! through it.
//!
//! # How Tracking Works
//!
//! 1. **Record**: each [`Subscriber::get`] adds the key to `following`.
//!    Reading a key whose value is a nested model also opens a *child*
//!    session on that model, so a path like `a.b.c` is captured on every
//!    store it crosses.
//!
//! 2. **Listen**: [`Subscriber::listen`] snapshots `following` into one
//!    follower record per store. A child opened after its parent is armed
//!    follows each key as soon as it is read.
//!
//! 3. **Release**: [`Subscriber::release`] removes every record created by
//!    `listen`, children included.
//!
//! Subscriptions follow object identity. When the model behind a tracked key
//! is replaced, the old child session is released the next time the key
//! fires, and the new model is only observed once it is read again.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;

use super::computed::ComputedInfo;
use super::follower::{Cancel, Notify};
use super::model::{Model, Reactive};
use super::observer::Observer;
use crate::error::Result;
use crate::schedule::Frame;
use crate::value::Value;

/// Unique identifier for a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Session {
    following: IndexSet<String>,
    children: IndexMap<String, Subscriber>,
    armed: bool,
    /// Armed before anything was read: each new key is followed as it is read.
    live: bool,
    releases: Vec<Cancel>,
}

struct Tracking {
    id: SubscriberId,
    target: Weak<Observer>,
    callback: Notify,
    meta: Option<Arc<ComputedInfo>>,
    /// Reads are passed through without being recorded.
    detached: bool,
    session: Mutex<Session>,
}

/// A tracking session over one store.
///
/// Clones share the same session.
#[derive(Clone)]
pub struct Subscriber(Arc<Tracking>);

impl Subscriber {
    /// Start tracking `model`, calling `callback` with each frame that
    /// touches a followed key once the session is armed.
    pub fn new<F>(model: &impl Reactive, callback: F) -> Self
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        Self::build(model.observer(), Arc::new(callback), None, false)
    }

    pub(crate) fn tracking(observer: &Arc<Observer>, callback: Notify) -> Self {
        Self::build(observer, callback, None, false)
    }

    /// A session belonging to the recompute of a computed property.
    pub(crate) fn with_meta(
        observer: &Arc<Observer>,
        callback: Notify,
        meta: Arc<ComputedInfo>,
    ) -> Self {
        Self::build(observer, callback, Some(meta), false)
    }

    /// A session that records nothing and can never be armed.
    pub(crate) fn detached(observer: &Arc<Observer>) -> Self {
        Self::build(observer, Arc::new(|_: &Frame| {}), None, true)
    }

    fn build(
        observer: &Arc<Observer>,
        callback: Notify,
        meta: Option<Arc<ComputedInfo>>,
        detached: bool,
    ) -> Self {
        Self(Arc::new(Tracking {
            id: SubscriberId::new(),
            target: Arc::downgrade(observer),
            callback,
            meta,
            detached,
            session: Mutex::new(Session {
                following: IndexSet::new(),
                children: IndexMap::new(),
                armed: false,
                live: false,
                releases: Vec::new(),
            }),
        }))
    }

    pub fn id(&self) -> SubscriberId {
        self.0.id
    }

    /// Read `key`, recording it as a dependency.
    pub fn get(&self, key: &str) -> Result<Value> {
        let Some(observer) = self.0.target.upgrade() else {
            return Ok(Value::Undefined);
        };

        if self.0.detached {
            return observer.get(key);
        }

        let fresh = {
            let mut session = self.0.session.lock();
            session.following.insert(key.to_owned()) && session.live
        };

        if fresh {
            let keys = IndexSet::from([key.to_owned()]);
            let release = observer.follow(keys, self.forward(), self.0.meta.clone(), false);
            self.0.session.lock().releases.push(release);
        }

        let value = observer.get(key)?;
        if let Value::Model(model) = &value {
            self.track_child(key, model);
        }

        Ok(value)
    }

    /// Read `key` and descend into the nested model it holds.
    ///
    /// Returns `None` if the value is not a model.
    pub fn child(&self, key: &str) -> Result<Option<Subscriber>> {
        let value = self.get(key)?;

        let Some(model) = value.as_model() else {
            return Ok(None);
        };

        if self.0.detached {
            return Ok(Some(Subscriber::detached(model.observer())));
        }

        Ok(self.0.session.lock().children.get(key).cloned())
    }

    /// Read `key` without recording it.
    pub fn peek(&self, key: &str) -> Result<Value> {
        match self.0.target.upgrade() {
            Some(observer) => observer.get(key),
            None => Ok(Value::Undefined),
        }
    }

    /// The untracked model behind this session.
    pub fn raw(&self) -> Option<Model> {
        self.0.target.upgrade().map(Model)
    }

    /// Keys read so far, in the order first read.
    pub fn following(&self) -> Vec<String> {
        self.0.session.lock().following.iter().cloned().collect()
    }

    pub(crate) fn forget(&self, key: &str) {
        self.0.session.lock().following.shift_remove(key);
    }

    pub fn is_armed(&self) -> bool {
        self.0.session.lock().armed
    }

    fn track_child(&self, key: &str, model: &Model) {
        let (created, replaced, armed) = {
            let mut session = self.0.session.lock();

            let current = session
                .children
                .get(key)
                .map(|child| child.tracks(model.observer()))
                .unwrap_or(false);

            if current {
                return;
            }

            let child = Self::build(
                model.observer(),
                self.0.callback.clone(),
                self.0.meta.clone(),
                false,
            );

            let replaced = session.children.insert(key.to_owned(), child.clone());
            (child, replaced, session.armed)
        };

        if let Some(replaced) = replaced {
            replaced.release();
        }

        // Created mid-pass under a live subscription: follow keys as read.
        if armed {
            let mut session = created.0.session.lock();
            session.armed = true;
            session.live = true;
        }
    }

    fn tracks(&self, observer: &Arc<Observer>) -> bool {
        self.0.target.as_ptr() == Arc::as_ptr(observer)
    }

    /// Turn the recorded keys into live follower records.
    ///
    /// Does nothing for a session that is already armed.
    pub fn listen(&self) {
        if self.0.detached {
            return;
        }

        let (keys, children) = {
            let mut session = self.0.session.lock();
            if session.armed {
                return;
            }

            session.armed = true;
            let children: Vec<Subscriber> = session.children.values().cloned().collect();
            (session.following.clone(), children)
        };

        if let Some(observer) = self.0.target.upgrade() {
            if !keys.is_empty() {
                tracing::trace!(model = %observer.name(), keys = ?keys, "subscriber armed");
                let release = observer.follow(keys, self.forward(), self.0.meta.clone(), false);
                self.0.session.lock().releases.push(release);
            }
        }

        for child in children {
            child.listen();
        }
    }

    /// The follower callback: drop children whose model was replaced, then
    /// pass the frame on. The follower record keeps the session alive.
    fn forward(&self) -> Notify {
        let subscriber = self.clone();

        Arc::new(move |frame: &Frame| {
            subscriber.prune(frame);
            (subscriber.0.callback)(frame);
        })
    }

    fn prune(&self, frame: &Frame) {
        let Some(observer) = self.0.target.upgrade() else {
            return;
        };

        let stale: Vec<Subscriber> = {
            let mut session = self.0.session.lock();
            let keys: Vec<String> = session
                .children
                .keys()
                .filter(|key| frame.contains(key))
                .cloned()
                .collect();

            keys.into_iter()
                .filter_map(|key| {
                    let current = match observer.peek(&key) {
                        Value::Model(model) => session
                            .children
                            .get(&key)
                            .map(|child| child.tracks(model.observer()))
                            .unwrap_or(false),
                        _ => false,
                    };

                    if current {
                        None
                    } else {
                        session.children.shift_remove(&key)
                    }
                })
                .collect()
        };

        for child in stale {
            child.release();
        }
    }

    /// Remove every follower record created by [`Subscriber::listen`].
    pub fn release(&self) {
        let (releases, children) = {
            let mut session = self.0.session.lock();
            session.armed = false;
            session.live = false;
            let children: Vec<Subscriber> = session.children.drain(..).map(|(_, c)| c).collect();
            (std::mem::take(&mut session.releases), children)
        };

        for release in releases {
            release.cancel();
        }

        for child in children {
            child.release();
        }
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let session = self.0.session.lock();
        f.debug_struct("Subscriber")
            .field("id", &self.0.id)
            .field("following", &session.following)
            .field("children", &session.children.len())
            .field("armed", &session.armed)
            .finish()
    }
}
