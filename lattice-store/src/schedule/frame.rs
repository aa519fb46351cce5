//! Frames and Batches
//!
//! A [`Frame`] is the ordered list of distinct keys that changed during one
//! scheduling cycle. A [`Batch`] is the bookkeeping for the frame while it is
//! still open: which keys are handled, which recomputes are queued, and which
//! listeners must run once the frame closes.

use std::collections::VecDeque;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::reactive::follower::{Follower, FollowerId};
use crate::reactive::ObserverId;

/// The keys reported as changed together in one flush.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Frame(Arc<[String]>);

impl Frame {
    pub fn keys(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k == key)
    }
}

impl Deref for Frame {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<S: Into<String>> FromIterator<S> for Frame {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Frame(iter.into_iter().map(Into::into).collect())
    }
}

/// An open frame.
pub(crate) struct Batch {
    owner: ObserverId,

    /// Keys mutated or recomputed so far, in the order they changed.
    handled: IndexSet<String>,

    /// Recomputes of this store's computed properties, ordered by priority.
    recompute: VecDeque<Arc<Follower>>,

    /// Everything else touched by the frame, run once when it closes.
    effects: IndexMap<FollowerId, Arc<Follower>>,
}

impl Batch {
    pub(crate) fn new(owner: ObserverId) -> Self {
        Self {
            owner,
            handled: IndexSet::new(),
            recompute: VecDeque::new(),
            effects: IndexMap::new(),
        }
    }

    /// Record `key` as changed and collect every follower keyed to it.
    ///
    /// Returns false if the key was already handled in this frame.
    pub(crate) fn add<'a>(
        &mut self,
        key: &str,
        followers: impl IntoIterator<Item = &'a Arc<Follower>>,
    ) -> bool {
        if !self.handled.insert(key.to_owned()) {
            return false;
        }

        for follower in followers {
            if follower.keys.contains(key) {
                self.include(follower);
            }
        }

        true
    }

    fn include(&mut self, follower: &Arc<Follower>) {
        let info = match &follower.computed {
            Some(info) if info.parent() == self.owner => info,
            _ => {
                self.effects
                    .entry(follower.id)
                    .or_insert_with(|| follower.clone());
                return;
            }
        };

        if self.recompute.iter().any(|queued| queued.id == follower.id) {
            return;
        }

        // After every entry of lower or equal priority.
        let priority = info.priority();
        let at = self
            .recompute
            .iter()
            .position(|queued| queued.priority() > priority)
            .unwrap_or(self.recompute.len());

        self.recompute.insert(at, follower.clone());
    }

    /// Next recompute whose key has not already changed this frame.
    pub(crate) fn next_recompute(&mut self) -> Option<Arc<Follower>> {
        while let Some(follower) = self.recompute.pop_front() {
            let stale = follower
                .computed
                .as_ref()
                .map(|info| !self.handled.contains(info.key()))
                .unwrap_or(false);

            if stale {
                return Some(follower);
            }
        }

        None
    }

    /// Close the batch: the frame plus the listeners to notify with it.
    pub(crate) fn finish(self) -> (Frame, Vec<Arc<Follower>>) {
        let frame = Frame(self.handled.into_iter().collect());
        (frame, self.effects.into_values().collect())
    }
}
