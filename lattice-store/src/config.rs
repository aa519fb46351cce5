//! Store configuration.

use std::fmt;
use std::sync::Arc;

use crate::schedule::{default_scheduler, Scheduler};

/// Options applied when a class is instantiated.
#[derive(Clone, Default)]
pub struct Config {
    /// Where frames are flushed. Defaults to [`default_scheduler`].
    pub scheduler: Option<Arc<dyn Scheduler>>,
}

impl Config {
    pub fn with_scheduler(scheduler: impl Scheduler + 'static) -> Self {
        Self {
            scheduler: Some(Arc::new(scheduler)),
        }
    }

    pub(crate) fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.scheduler.clone().unwrap_or_else(default_scheduler)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("scheduler", &self.scheduler.as_ref().map(|_| ".."))
            .finish()
    }
}
