//! Class Registry
//!
//! The registry maps class names to definitions so that models can be
//! created by name, for example by a binding layer that only knows the name
//! of the class it should provide.
//!
//! # Lifetime
//!
//! The registry is process-wide. It is created on first use and lives until
//! the process exits; nothing needs to tear it down. Registering a name again
//! replaces the previous definition.

use std::sync::OnceLock;

use dashmap::DashMap;

use super::class::Class;
use super::model::Model;
use crate::config::Config;
use crate::error::{Error, Result};

/// The process-wide class registry.
pub struct Registry;

static CLASSES: OnceLock<DashMap<String, Class>> = OnceLock::new();

fn classes() -> &'static DashMap<String, Class> {
    CLASSES.get_or_init(DashMap::new)
}

impl Registry {
    /// Register `class` under its name, returning any definition it replaced.
    pub fn register(class: Class) -> Option<Class> {
        let name = class.name().to_owned();
        tracing::debug!(class = %name, "registered");
        classes().insert(name, class)
    }

    pub fn lookup(name: &str) -> Option<Class> {
        classes().get(name).map(|entry| entry.value().clone())
    }

    pub fn unregister(name: &str) -> Option<Class> {
        classes().remove(name).map(|(_, class)| class)
    }

    pub fn contains(name: &str) -> bool {
        classes().contains_key(name)
    }

    /// Create and start a model of the class registered as `name`.
    pub fn create(name: &str) -> Result<Model> {
        Self::create_with(name, Config::default())
    }

    pub fn create_with(name: &str, config: Config) -> Result<Model> {
        let class = Self::lookup(name).ok_or_else(|| Error::UnknownClass(name.to_owned()))?;
        class.create_with(config)
    }
}
