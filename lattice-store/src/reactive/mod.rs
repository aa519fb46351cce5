//! Reactive Stores
//!
//! This module implements the store behind every model: dependency tracking,
//! computed properties, effects, and the class definitions they are declared
//! on.
//!
//! # Concepts
//!
//! ## Observers
//!
//! An [`Observer`] owns the state of one subject instance and the follower
//! records registered against its keys. Every read and write goes through
//! its accessor table.
//!
//! ## Subscribers
//!
//! A [`Subscriber`] records which keys a pass of user code reads. Once armed
//! it becomes a live subscription on every store the pass touched.
//!
//! ## Computed Properties
//!
//! Getters declared on a [`Class`] are evaluated lazily, memoized, and
//! recomputed in dependency order when their inputs change.
//!
//! ## Effects
//!
//! An [`Effect`] re-runs a callback whenever the keys it depends on change,
//! with dependencies either discovered on a first run or given explicitly.
//!
//! # Implementation Notes
//!
//! Tracking is explicit: getters and effects receive a [`Subscriber`] and
//! read through it, rather than relying on a thread-local context. This keeps
//! a pass's dependencies attached to the session that recorded them.

mod class;
pub(crate) mod computed;
mod effect;
pub(crate) mod follower;
mod model;
mod observer;
mod registry;
mod selector;
mod subject;
mod subscriber;

pub use class::{Class, ClassBuilder};
pub use computed::ComputedInfo;
pub use effect::{cleanup, Cleanup, Effect, IntoTeardown};
pub use follower::{Cancel, FollowerId, Notify};
pub use model::{Model, Reactive, Snapshot};
pub use observer::{Observer, ObserverId};
pub use registry::Registry;
pub use selector::{Probe, Selector};
pub use subject::{Getter, Init, SetEffect, Setter};
pub use subscriber::{Subscriber, SubscriberId};
