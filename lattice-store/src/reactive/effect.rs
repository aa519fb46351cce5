//! Effect Implementation
//!
//! An Effect is a side-effecting callback that re-runs whenever the keys it
//! depends on change.
//!
//! # How Effects Work
//!
//! There are two ways to say what an effect depends on:
//!
//! 1. **Discovered**: the callback runs once immediately against a tracking
//!    [`Subscriber`]. Every key it reads becomes a dependency, and the
//!    session is armed afterwards.
//!
//! 2. **Explicit**: the callback is registered for a fixed key list and
//!    first runs on the next frame touching one of them.
//!
//! Either way the effect runs at most once per frame, however many of its
//! keys the frame contains.
//!
//! # Cleanup
//!
//! A callback may return a [`Cleanup`] closure. It runs before the next
//! invocation and when the effect is cancelled. Returning a [`Value`] other
//! than `Undefined` is a contract violation and fails registration.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexSet;
use parking_lot::Mutex;

use super::follower::{Cancel, Notify};
use super::observer::Observer;
use super::subscriber::Subscriber;
use crate::error::{Error, Result};
use crate::schedule::Frame;
use crate::value::Value;

/// Teardown returned by an effect callback.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Box a closure as a [`Cleanup`].
pub fn cleanup<F>(f: F) -> Cleanup
where
    F: FnOnce() + Send + 'static,
{
    Box::new(f)
}

/// What an effect callback may return.
pub trait IntoTeardown {
    fn into_teardown(self) -> Result<Option<Cleanup>>;
}

impl IntoTeardown for () {
    fn into_teardown(self) -> Result<Option<Cleanup>> {
        Ok(None)
    }
}

impl IntoTeardown for Cleanup {
    fn into_teardown(self) -> Result<Option<Cleanup>> {
        Ok(Some(self))
    }
}

impl IntoTeardown for Option<Cleanup> {
    fn into_teardown(self) -> Result<Option<Cleanup>> {
        Ok(self)
    }
}

impl IntoTeardown for Value {
    fn into_teardown(self) -> Result<Option<Cleanup>> {
        if self.is_undefined() {
            Ok(None)
        } else {
            Err(Error::BadEffectCallback)
        }
    }
}

impl<T: IntoTeardown> IntoTeardown for Result<T> {
    fn into_teardown(self) -> Result<Option<Cleanup>> {
        self.and_then(IntoTeardown::into_teardown)
    }
}

type Run = Arc<dyn Fn(&Subscriber) -> Result<Option<Cleanup>> + Send + Sync>;

/// Where each invocation gets its session from.
enum Source {
    /// The armed session. It holds the effect through its callback, so the
    /// pair lives until the effect is disposed.
    Discovered(Subscriber),
    /// A fresh untracked session per run.
    Explicit(Weak<Observer>),
}

struct EffectInner {
    run: Run,
    /// Taken on dispose.
    source: Mutex<Option<Source>>,
    /// Follower record of an explicit-key effect.
    release: Mutex<Option<Cancel>>,
    cleanup: Mutex<Option<Cleanup>>,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

/// A side-effecting callback bound to one store.
///
/// The store keeps an effect alive through its follower record, so dropping
/// every `Effect` handle does not stop it. Clones share the same effect.
#[derive(Clone)]
pub struct Effect(Arc<EffectInner>);

impl Effect {
    fn with_run<F, R>(run: F) -> Self
    where
        F: Fn(&Subscriber) -> R + Send + Sync + 'static,
        R: IntoTeardown,
    {
        let run: Run = Arc::new(move |subscriber: &Subscriber| run(subscriber).into_teardown());

        Effect(Arc::new(EffectInner {
            run,
            source: Mutex::new(None),
            release: Mutex::new(None),
            cleanup: Mutex::new(None),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        }))
    }

    fn trigger(&self) -> Notify {
        let effect = self.clone();
        Arc::new(move |_: &Frame| effect.execute())
    }

    /// Run `run` now, then again whenever a key it read changes.
    ///
    /// Fails if the first run fails or returns an invalid teardown.
    pub(crate) fn auto<F, R>(observer: &Arc<Observer>, run: F) -> Result<Self>
    where
        F: Fn(&Subscriber) -> R + Send + Sync + 'static,
        R: IntoTeardown,
    {
        let effect = Self::with_run(run);
        let subscriber = Subscriber::tracking(observer, effect.trigger());
        *effect.0.source.lock() = Some(Source::Discovered(subscriber.clone()));

        if let Err(error) = effect.invoke(&subscriber) {
            effect.0.source.lock().take();
            return Err(error);
        }
        subscriber.listen();

        Ok(effect)
    }

    /// Run `run` on every frame touching `keys`.
    pub(crate) fn watching<F, R>(
        observer: &Arc<Observer>,
        keys: IndexSet<String>,
        run: F,
    ) -> Result<Self>
    where
        F: Fn(&Subscriber) -> R + Send + Sync + 'static,
        R: IntoTeardown,
    {
        let effect = Self::with_run(run);
        *effect.0.source.lock() = Some(Source::Explicit(Arc::downgrade(observer)));

        let release = observer.add_listener(keys, effect.trigger(), false)?;
        *effect.0.release.lock() = Some(release);

        Ok(effect)
    }

    fn session(&self) -> Option<Subscriber> {
        match self.0.source.lock().as_ref()? {
            Source::Discovered(subscriber) => Some(subscriber.clone()),
            Source::Explicit(observer) => observer.upgrade().map(|o| Subscriber::detached(&o)),
        }
    }

    fn invoke(&self, subscriber: &Subscriber) -> Result<()> {
        if let Some(previous) = self.0.cleanup.lock().take() {
            previous();
        }

        self.0.run_count.fetch_add(1, Ordering::SeqCst);
        let teardown = (self.0.run)(subscriber)?;
        *self.0.cleanup.lock() = teardown;

        Ok(())
    }

    /// Run the callback again. Does nothing once disposed.
    pub fn execute(&self) {
        if self.is_disposed() {
            return;
        }

        let Some(subscriber) = self.session() else {
            return;
        };

        if let Err(error) = self.invoke(&subscriber) {
            tracing::error!(%error, "effect failed");
        }
    }

    /// Stop the effect and run its pending cleanup.
    pub fn dispose(&self) {
        if self.0.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        let source = self.0.source.lock().take();
        if let Some(Source::Discovered(subscriber)) = source {
            subscriber.release();
        }

        if let Some(release) = self.0.release.lock().take() {
            release.cancel();
        }

        if let Some(cleanup) = self.0.cleanup.lock().take() {
            cleanup();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.0.disposed.load(Ordering::SeqCst)
    }

    /// Number of times the callback has run.
    pub fn run_count(&self) -> usize {
        self.0.run_count.load(Ordering::SeqCst)
    }

    /// Keys discovered on the first run. Empty once disposed.
    pub fn dependencies(&self) -> Vec<String> {
        self.session()
            .map(|subscriber| subscriber.following())
            .unwrap_or_default()
    }

    /// A handle that disposes this effect.
    pub fn canceller(&self) -> Cancel {
        let effect = self.clone();
        Cancel::new(move || effect.dispose())
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("run_count", &self.run_count())
            .field("dependencies", &self.dependencies())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
