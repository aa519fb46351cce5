//! Selector resolution.
//!
//! A [`Selector`] names the keys a subscription is interested in, either
//! directly or through a probe closure that indexes its way through a
//! capturing [`Probe`]:
//!
//! ```rust,ignore
//! model.watch("seconds", handler)?;
//! model.watch(["seconds", "hours"], handler)?;
//! model.watch(Selector::probe(|x| &x["seconds"]["hours"]), handler)?;
//! ```

use std::cell::RefCell;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

use indexmap::IndexSet;
use smallvec::SmallVec;

type ProbeFn = Arc<dyn Fn(&Probe) -> &Probe + Send + Sync>;

/// A subscription target.
#[derive(Clone)]
pub enum Selector {
    /// Explicit keys, order preserved.
    Keys(SmallVec<[String; 4]>),
    /// Keys captured by running a closure against a [`Probe`].
    Probe(ProbeFn),
}

impl Selector {
    pub fn probe<F>(probe: F) -> Self
    where
        F: for<'a> Fn(&'a Probe) -> &'a Probe + Send + Sync + 'static,
    {
        Selector::Probe(Arc::new(probe))
    }

    /// Resolve to concrete keys, capturing probe accesses against `known`.
    pub(crate) fn resolve(&self, known: IndexSet<String>) -> IndexSet<String> {
        match self {
            Selector::Keys(keys) => keys.iter().cloned().collect(),
            Selector::Probe(probe) => {
                let capture = Probe::new(known);
                probe(&capture);
                capture.into_accessed()
            }
        }
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
            Selector::Probe(_) => f.write_str("Probe(..)"),
        }
    }
}

impl From<&str> for Selector {
    fn from(key: &str) -> Self {
        Selector::Keys(SmallVec::from_iter([key.to_owned()]))
    }
}

impl From<String> for Selector {
    fn from(key: String) -> Self {
        Selector::Keys(SmallVec::from_iter([key]))
    }
}

impl From<&String> for Selector {
    fn from(key: &String) -> Self {
        Selector::from(key.as_str())
    }
}

impl From<Vec<String>> for Selector {
    fn from(keys: Vec<String>) -> Self {
        Selector::Keys(SmallVec::from_vec(keys))
    }
}

impl From<Vec<&str>> for Selector {
    fn from(keys: Vec<&str>) -> Self {
        Selector::from(keys.as_slice())
    }
}

impl From<&[&str]> for Selector {
    fn from(keys: &[&str]) -> Self {
        Selector::Keys(keys.iter().map(|k| (*k).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Selector {
    fn from(keys: [&str; N]) -> Self {
        Selector::from(keys.as_slice())
    }
}

/// A recursive capture proxy.
///
/// Indexing a probe by a known key records the key and returns the probe
/// itself, so accesses chain. Unknown keys are ignored.
pub struct Probe {
    known: IndexSet<String>,
    accessed: RefCell<IndexSet<String>>,
}

impl Probe {
    pub(crate) fn new(known: IndexSet<String>) -> Self {
        Self {
            known,
            accessed: RefCell::new(IndexSet::new()),
        }
    }

    /// Keys recorded so far, in access order.
    pub fn accessed(&self) -> Vec<String> {
        self.accessed.borrow().iter().cloned().collect()
    }

    fn into_accessed(self) -> IndexSet<String> {
        self.accessed.into_inner()
    }
}

impl Index<&str> for Probe {
    type Output = Probe;

    fn index(&self, key: &str) -> &Probe {
        if self.known.contains(key) {
            self.accessed.borrow_mut().insert(key.to_owned());
        }
        self
    }
}
