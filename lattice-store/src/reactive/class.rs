//! Class Definitions
//!
//! A [`Class`] describes a kind of subject: its instance fields, in
//! declaration order, and its accessor properties. Classes form a single
//! inheritance chain through [`ClassBuilder::extends`].
//!
//! # How Instantiation Works
//!
//! 1. Fields are collected from the root class down to the leaf. A field
//!    redeclared by a subclass keeps its original position but takes the
//!    subclass's initial value.
//!
//! 2. Accessors are collected from the leaf up to the root. The first
//!    definition of a key wins, and a field of the same name shadows it.
//!
//! 3. The store is created inert with its getters prepared.
//!    [`Class::create`] starts it immediately; [`Class::instantiate`] leaves
//!    that to the caller.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::model::Model;
use super::observer::Observer;
use super::subject::{Accessor, Init, Slot, Subject};
use super::subscriber::Subscriber;
use crate::config::Config;
use crate::error::Result;
use crate::value::Value;

#[derive(Clone)]
enum Field {
    Value(Value),
    Init(Init),
}

struct ClassDef {
    name: Arc<str>,
    parent: Option<Class>,
    fields: IndexMap<String, Field>,
    accessors: IndexMap<String, Accessor>,
}

/// A subject definition. Clones share the same definition.
#[derive(Clone)]
pub struct Class(Arc<ClassDef>);

impl Class {
    /// Start defining a class named `name`.
    pub fn build(name: impl Into<String>) -> ClassBuilder {
        ClassBuilder {
            name: name.into(),
            parent: None,
            fields: IndexMap::new(),
            accessors: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parent(&self) -> Option<&Class> {
        self.0.parent.as_ref()
    }

    /// Whether this class is `other` or inherits from it.
    pub fn inherits(&self, other: &Class) -> bool {
        self.chain().any(|class| Arc::ptr_eq(&class.0, &other.0))
    }

    /// This class followed by its ancestors.
    fn chain(&self) -> impl Iterator<Item = &Class> {
        std::iter::successors(Some(self), |class| class.parent())
    }

    /// Build an inert model. Nothing is monitored until it is started.
    pub fn instantiate(&self, config: Config) -> Model {
        let lineage: Vec<&Class> = self.chain().collect();

        let mut subject = Subject::new();
        for class in lineage.iter().rev() {
            for (key, field) in &class.0.fields {
                let slot = match field {
                    Field::Value(value) => Slot::Raw(value.clone()),
                    Field::Init(init) => Slot::Pending(init.clone()),
                };
                subject.slots.insert(key.clone(), slot);
            }
        }

        let accessors = lineage.iter().copied().flat_map(|class: &Class| {
            class
                .0
                .accessors
                .iter()
                .map(|(key, accessor)| (key.clone(), accessor.clone()))
        });

        let observer = Observer::new(self.0.name.clone(), subject, accessors, config.scheduler());
        tracing::trace!(class = %self.0.name, id = ?observer.id(), "instantiated");

        Model(observer)
    }

    /// Instantiate and start with the default configuration.
    pub fn create(&self) -> Result<Model> {
        self.create_with(Config::default())
    }

    pub fn create_with(&self, config: Config) -> Result<Model> {
        let model = self.instantiate(config);
        model.start()?;
        Ok(model)
    }

    /// Make this class available through the process-wide registry.
    pub fn register(&self) {
        super::registry::Registry::register(self.clone());
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.0.name)
            .field("parent", &self.parent().map(Class::name))
            .field("fields", &self.0.fields.keys().collect::<Vec<_>>())
            .field("accessors", &self.0.accessors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`Class`].
pub struct ClassBuilder {
    name: String,
    parent: Option<Class>,
    fields: IndexMap<String, Field>,
    accessors: IndexMap<String, Accessor>,
}

impl ClassBuilder {
    pub fn extends(mut self, parent: &Class) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// A plain field. A [`Model`] value is kept as an unwatched property.
    pub fn value(mut self, key: impl Into<String>, initial: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), Field::Value(initial.into()));
        self
    }

    /// A field holding a nested model of `class`, created and started along
    /// with its parent.
    ///
    /// Assigning another model to the key later starts it if it is inert.
    pub fn child(self, key: impl Into<String>, class: &Class) -> Self {
        let class = class.clone();

        self.init(key, move |key: &str, parent: &Model| {
            let config = Config {
                scheduler: Some(parent.0.scheduler.clone()),
            };
            let child = class.create_with(config)?;

            parent.0.monitor_value(
                key,
                Value::Model(child),
                Some(Arc::new(|value: &Value, _: &Model| {
                    let Some(model) = value.as_model() else {
                        return;
                    };

                    if let Err(error) = model.start() {
                        tracing::warn!(model = %model.name(), %error, "failed to start assigned model");
                    }
                })),
            );

            Ok(())
        })
    }

    /// A field resolved by `init` when the model starts.
    ///
    /// `init` receives the key and the starting model and is expected to
    /// install whatever the key should hold.
    pub fn init<F>(mut self, key: impl Into<String>, init: F) -> Self
    where
        F: Fn(&str, &Model) -> Result<()> + Send + Sync + 'static,
    {
        self.fields.insert(key.into(), Field::Init(Arc::new(init)));
        self
    }

    /// A computed property with no setter.
    pub fn computed<F, V>(mut self, key: impl Into<String>, get: F) -> Self
    where
        F: Fn(&Subscriber) -> Result<V> + Send + Sync + 'static,
        V: Into<Value>,
    {
        self.accessors.insert(
            key.into(),
            Accessor {
                get: Arc::new(move |this: &Subscriber| get(this).map(Into::into)),
                set: None,
            },
        );
        self
    }

    /// A computed property with a user-defined setter.
    pub fn accessor<G, S, V>(mut self, key: impl Into<String>, get: G, set: S) -> Self
    where
        G: Fn(&Subscriber) -> Result<V> + Send + Sync + 'static,
        S: Fn(&Model, Value) -> Result<()> + Send + Sync + 'static,
        V: Into<Value>,
    {
        self.accessors.insert(
            key.into(),
            Accessor {
                get: Arc::new(move |this: &Subscriber| get(this).map(Into::into)),
                set: Some(Arc::new(set)),
            },
        );
        self
    }

    pub fn build(self) -> Class {
        Class(Arc::new(ClassDef {
            name: Arc::from(self.name),
            parent: self.parent,
            fields: self.fields,
            accessors: self.accessors,
        }))
    }
}
