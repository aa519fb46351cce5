//! Follower records.
//!
//! A follower is one callback registered against a set of keys. Records are
//! independent: several may cover the same keys, and removing one never
//! disturbs another.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;

use super::computed::ComputedInfo;
use crate::schedule::Frame;

/// Unique identifier for a follower record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FollowerId(u64);

impl FollowerId {
    /// Generate a new unique follower ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for FollowerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback invoked with the frame that triggered it.
pub type Notify = Arc<dyn Fn(&Frame) + Send + Sync>;

/// One registered callback and the keys that trigger it.
pub(crate) struct Follower {
    pub(crate) id: FollowerId,
    pub(crate) keys: IndexSet<String>,
    notify: Notify,
    /// Present when this follower recomputes a computed property.
    pub(crate) computed: Option<Arc<ComputedInfo>>,
    /// Removed from the registry after the first frame it takes part in.
    pub(crate) once: bool,
}

impl Follower {
    pub(crate) fn new(
        keys: IndexSet<String>,
        notify: Notify,
        computed: Option<Arc<ComputedInfo>>,
        once: bool,
    ) -> Self {
        Self {
            id: FollowerId::new(),
            keys,
            notify,
            computed,
            once,
        }
    }

    /// Recompute priority, or zero for plain listeners.
    pub(crate) fn priority(&self) -> u32 {
        self.computed.as_ref().map(|info| info.priority()).unwrap_or(0)
    }

    pub(crate) fn notify(&self, frame: &Frame) {
        (self.notify)(frame);
    }
}

/// Removes a subscription when called.
///
/// Dropping a `Cancel` does not remove anything; the subscription lives as
/// long as its store unless [`Cancel::cancel`] is called.
pub struct Cancel {
    release: Box<dyn FnOnce() + Send>,
}

impl Cancel {
    pub(crate) fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Box::new(release),
        }
    }

    pub fn cancel(self) {
        (self.release)();
    }
}

impl fmt::Debug for Cancel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cancel").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicI32};

    #[test]
    fn follower_ids_are_unique() {
        let id1 = FollowerId::new();
        let id2 = FollowerId::new();
        let id3 = FollowerId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn follower_notify_calls_callback() {
        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let follower = Follower::new(
            IndexSet::from(["value".to_string()]),
            Arc::new(move |frame: &Frame| {
                assert!(frame.contains("value"));
                called_clone.store(true, Ordering::SeqCst);
            }),
            None,
            false,
        );

        assert_eq!(follower.priority(), 0);
        follower.notify(&["value"].into_iter().collect());
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_runs_release_only_when_called() {
        let count = Arc::new(AtomicI32::new(0));

        let count_clone = count.clone();
        let dropped = Cancel::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        drop(dropped);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let count_clone = count.clone();
        Cancel::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        })
        .cancel();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
