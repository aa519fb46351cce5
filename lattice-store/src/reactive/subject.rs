//! The instrumented subject.
//!
//! Rust objects cannot grow accessors at runtime, so a subject is an explicit
//! accessor table: one [`Slot`] per property name describing how reads and
//! writes of that property are routed. The store rewrites slots in place as
//! properties are monitored, computed, or overridden.

use std::sync::Arc;

use indexmap::IndexMap;

use super::computed::ComputedInfo;
use super::subscriber::Subscriber;
use super::Model;
use crate::error::Result;
use crate::value::Value;

/// Computed getter, evaluated against a tracking session.
pub type Getter = Arc<dyn Fn(&Subscriber) -> Result<Value> + Send + Sync>;

/// User-defined setter for a computed property.
pub type Setter = Arc<dyn Fn(&Model, Value) -> Result<()> + Send + Sync>;

/// Side effect run after a monitored value changes.
pub type SetEffect = Arc<dyn Fn(&Value, &Model) + Send + Sync>;

/// Pending-initialization marker, resolved when the store starts.
pub type Init = Arc<dyn Fn(&str, &Model) -> Result<()> + Send + Sync>;

/// A getter with its optional setter.
#[derive(Clone)]
pub(crate) struct Accessor {
    pub(crate) get: Getter,
    pub(crate) set: Option<Setter>,
}

/// How a computed slot currently answers reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Prepared but not monitored: reads run the getter directly.
    Declared,
    /// Monitored, evaluated on first read.
    Lazy,
    /// Initial evaluation in progress. Reads see `Undefined`.
    Evaluating,
    /// Memoized in the state map.
    Ready,
}

pub(crate) struct ComputedSlot {
    pub(crate) phase: Phase,
    pub(crate) info: Arc<ComputedInfo>,
    /// Tracking session that armed this computed's dependencies.
    pub(crate) subscriber: Option<Subscriber>,
}

pub(crate) enum Slot {
    /// A plain property the store does not track.
    Raw(Value),
    /// Resolved by calling the marker when the store starts.
    Pending(Init),
    /// Backed by the state map.
    State { effect: Option<SetEffect> },
    Computed(ComputedSlot),
}

/// The accessor table of one subject instance.
#[derive(Default)]
pub(crate) struct Subject {
    pub(crate) slots: IndexMap<String, Slot>,
}

impl Subject {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn computed(&self, key: &str) -> Option<&ComputedSlot> {
        match self.slots.get(key) {
            Some(Slot::Computed(slot)) => Some(slot),
            _ => None,
        }
    }

    pub(crate) fn computed_mut(&mut self, key: &str) -> Option<&mut ComputedSlot> {
        match self.slots.get_mut(key) {
            Some(Slot::Computed(slot)) => Some(slot),
            _ => None,
        }
    }
}
