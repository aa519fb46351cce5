//! Lattice Store
//!
//! This crate provides fine-grained reactive state stores for the Lattice
//! framework. It implements:
//!
//! - Reactive stores over declared subjects (models)
//! - Automatic dependency tracking through subscribers
//! - Lazily evaluated, memoized computed properties
//! - Effects with discovered or explicit dependencies
//! - Frame batching of all mutations made in one turn
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: stores, subscribers, computed properties, effects, classes
//! - `schedule`: frame batching and the schedulers that flush frames
//! - `value`: the dynamic values held by model properties
//! - `lifecycle`: lifecycle pseudo-keys reported by a binding layer
//!
//! # Example
//!
//! ```rust,ignore
//! use lattice_store::{Class, Selector};
//!
//! let timer = Class::build("Timer")
//!     .value("seconds", 0)
//!     .value("hours", 0)
//!     .computed("minutes", |this| {
//!         let seconds = this.get("seconds")?.as_f64().unwrap_or(0.0);
//!         Ok((seconds / 60.0).floor())
//!     })
//!     .build();
//!
//! let model = timer.create()?;
//!
//! model.watch(Selector::probe(|x| &x["minutes"]), |value, key| {
//!     println!("{key} is now {value:?}");
//! })?;
//!
//! model.set("seconds", 60)?;
//! // One frame: ["seconds", "minutes"], prints "minutes is now 1"
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod reactive;
pub mod schedule;
pub mod value;

pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::Lifecycle;
pub use reactive::{
    cleanup, Cancel, Class, ClassBuilder, Cleanup, ComputedInfo, Effect, IntoTeardown, Model,
    Probe, Reactive, Registry, Selector, Snapshot, Subscriber,
};
pub use schedule::{flush, Frame, Scheduler, TaskQueue, TokioScheduler};
pub use value::Value;
