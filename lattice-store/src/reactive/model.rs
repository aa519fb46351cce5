//! Models
//!
//! A [`Model`] is the handle applications hold: one instantiated subject and
//! its store. Clones are cheap and refer to the same instance; equality of
//! models is identity.
//!
//! # Example
//!
//! ```rust,ignore
//! let timer = Class::build("Timer")
//!     .value("seconds", 0)
//!     .computed("minutes", |this| {
//!         let seconds = this.get("seconds")?.as_f64().unwrap_or(0.0);
//!         Ok((seconds / 60.0).floor())
//!     })
//!     .build();
//!
//! let model = timer.create()?;
//! model.set("seconds", 60)?;
//!
//! let frame = model.request_update().await?;
//! assert_eq!(frame.keys(), ["seconds", "minutes"]);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use super::computed::ComputedInfo;
use super::effect::{Effect, IntoTeardown};
use super::follower::{Cancel, Notify};
use super::observer::{Observer, ObserverId};
use super::selector::Selector;
use super::subscriber::Subscriber;
use crate::error::{Error, Result};
use crate::lifecycle::Lifecycle;
use crate::schedule::Frame;
use crate::value::Value;

/// A plain snapshot of selected keys.
pub type Snapshot = IndexMap<String, Value>;

/// Capability of types backed by a reactive store.
pub trait Reactive {
    fn observer(&self) -> &Arc<Observer>;
}

/// A reactive subject instance.
#[derive(Clone)]
pub struct Model(pub(crate) Arc<Observer>);

impl Reactive for Model {
    fn observer(&self) -> &Arc<Observer> {
        &self.0
    }
}

impl Model {
    /// Whether both handles refer to the same instance.
    pub fn same(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn id(&self) -> ObserverId {
        self.0.id()
    }

    /// Name of the class this model was created from.
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Activate an inert model. Does nothing if it is already active.
    pub fn start(&self) -> Result<()> {
        self.0.start()
    }

    pub fn is_active(&self) -> bool {
        self.0.is_active()
    }

    /// Whether a frame is open.
    pub fn is_pending(&self) -> bool {
        self.0.is_pending()
    }

    pub fn get(&self, key: &str) -> Result<Value> {
        self.0.get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.0.set(key, value.into())
    }

    /// Monitor a new key. Returns false if `key` is already watched.
    pub fn add(&self, key: &str, initial: impl Into<Value>) -> bool {
        if self.0.watched().iter().any(|k| k == key) {
            return false;
        }

        self.0.monitor_value(key, initial.into(), None);
        true
    }

    /// Flip a boolean key, returning the new value.
    pub fn toggle(&self, key: &str) -> Result<bool> {
        let next = !self.get(key)?.as_bool().unwrap_or(false);
        self.set(key, next)?;
        Ok(next)
    }

    /// Keys with installed accessors.
    pub fn keys(&self) -> Vec<String> {
        self.0.watched()
    }

    /// Resolve `target` to the keys it names.
    pub fn select(&self, target: impl Into<Selector>) -> Vec<String> {
        self.resolve(target).into_iter().collect()
    }

    fn resolve(&self, target: impl Into<Selector>) -> IndexSet<String> {
        target.into().resolve(self.0.selectable())
    }

    /// Call `handler` with the value and key of each selected key that
    /// changes, once per frame per key.
    pub fn watch<F>(&self, target: impl Into<Selector>, handler: F) -> Result<Cancel>
    where
        F: Fn(&Value, &str) + Send + Sync + 'static,
    {
        self.0.watch(self.resolve(target), handler, false)
    }

    /// Call `handler` once per frame with every selected key it contains.
    pub fn watch_squashed<F>(&self, target: impl Into<Selector>, handler: F) -> Result<Cancel>
    where
        F: Fn(&[String]) + Send + Sync + 'static,
    {
        let keys = self.resolve(target);
        let selected = keys.clone();

        let callback: Notify = Arc::new(move |frame: &Frame| {
            let hits: Vec<String> = frame
                .iter()
                .filter(|key| selected.contains(key.as_str()))
                .cloned()
                .collect();

            handler(&hits);
        });

        self.0.add_listener(keys, callback, false)
    }

    /// Like [`Model::watch`], for the next matching frame only.
    pub fn once<F>(&self, target: impl Into<Selector>, handler: F) -> Result<Cancel>
    where
        F: Fn(&Value, &str) + Send + Sync + 'static,
    {
        self.0.watch(self.resolve(target), handler, true)
    }

    /// Resolves with the next frame touching any selected key.
    pub fn next(&self, target: impl Into<Selector>) -> impl Future<Output = Result<Frame>> + Send {
        let (sender, receiver) = oneshot::channel();
        let sender = Mutex::new(Some(sender));

        let callback: Notify = Arc::new(move |frame: &Frame| {
            if let Some(sender) = sender.lock().take() {
                let _ = sender.send(frame.clone());
            }
        });

        let registered = self.0.add_listener(self.resolve(target), callback, true);

        async move {
            registered?;
            receiver.await.map_err(|_| Error::FrameDropped)
        }
    }

    /// Run `callback` now against a tracking session and again whenever a
    /// key it read changes.
    pub fn effect<F, R>(&self, callback: F) -> Result<Cancel>
    where
        F: Fn(&Subscriber) -> R + Send + Sync + 'static,
        R: IntoTeardown,
    {
        Effect::auto(&self.0, callback).map(|effect| effect.canceller())
    }

    /// Run `callback` on every frame touching a selected key.
    pub fn effect_on<F, R>(&self, target: impl Into<Selector>, callback: F) -> Result<Cancel>
    where
        F: Fn(&Subscriber) -> R + Send + Sync + 'static,
        R: IntoTeardown,
    {
        Effect::watching(&self.0, self.resolve(target), callback).map(|effect| effect.canceller())
    }

    /// Open a tracking session on this model.
    pub fn subscribe<F>(&self, callback: F) -> Subscriber
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        Subscriber::new(self, callback)
    }

    /// Snapshot every watched key.
    pub fn export(&self) -> Result<Snapshot> {
        self.snapshot(self.0.watched())
    }

    /// Snapshot the selected keys.
    pub fn export_only(&self, target: impl Into<Selector>) -> Result<Snapshot> {
        self.snapshot(self.resolve(target))
    }

    fn snapshot(&self, keys: impl IntoIterator<Item = String>) -> Result<Snapshot> {
        keys.into_iter()
            .map(|key| {
                let value = self.get(&key)?;
                Ok((key, value))
            })
            .collect()
    }

    /// Assign every entry of `data`.
    pub fn import<K, V>(&self, data: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (key, value) in data {
            self.set(key.as_ref(), value)?;
        }
        Ok(())
    }

    /// Assign the entries of `data` whose keys are selected by `target`.
    pub fn import_only<K, V>(
        &self,
        data: impl IntoIterator<Item = (K, V)>,
        target: impl Into<Selector>,
    ) -> Result<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let selected = self.resolve(target);

        for (key, value) in data {
            if selected.contains(key.as_ref()) {
                self.set(key.as_ref(), value)?;
            }
        }
        Ok(())
    }

    /// Emit the selected keys without changing them.
    pub fn update(&self, target: impl Into<Selector>) {
        for key in self.resolve(target) {
            self.0.emit(&key);
        }
    }

    /// Resolves with the open frame once it flushes, or with the next one.
    pub fn request_update(&self) -> impl Future<Output = Result<Frame>> + Send {
        let receiver = self.waiter();
        async move { receiver.await.map_err(|_| Error::FrameDropped) }
    }

    /// Like [`Model::request_update`], but fails immediately with
    /// [`Error::StrictUpdate`] unless a frame is open exactly when
    /// `expected` says one should be.
    pub fn expect_update(&self, expected: bool) -> impl Future<Output = Result<Frame>> + Send {
        let receiver = if self.is_pending() == expected {
            Some(self.waiter())
        } else {
            None
        };

        async move {
            match receiver {
                Some(receiver) => receiver.await.map_err(|_| Error::FrameDropped),
                None => Err(Error::StrictUpdate { expected }),
            }
        }
    }

    /// Call `callback` with the open frame once it flushes, or with the next.
    pub fn on_update<F>(&self, callback: F)
    where
        F: FnOnce(&Frame) + Send + 'static,
    {
        self.0.wait(Box::new(move |frame| callback(&frame)));
    }

    fn waiter(&self) -> oneshot::Receiver<Frame> {
        let (sender, receiver) = oneshot::channel();
        self.0.wait(Box::new(move |frame| {
            let _ = sender.send(frame);
        }));
        receiver
    }

    /// Report a lifecycle event as a frame key.
    ///
    /// `didMount` activates an inert model first.
    pub fn lifecycle(&self, event: Lifecycle) -> Result<()> {
        if event == Lifecycle::DidMount {
            self.start()?;
        }

        self.0.emit(event.as_str());
        Ok(())
    }

    /// Ordering metadata of the computed property `key`.
    pub fn computed_info(&self, key: &str) -> Option<Arc<ComputedInfo>> {
        self.0.computed_info(key)
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name())
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}
