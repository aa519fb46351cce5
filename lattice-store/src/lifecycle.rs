//! Lifecycle events.
//!
//! A binding layer reports what happens to the component that owns a model
//! through [`Model::lifecycle`](crate::Model::lifecycle). Each event is
//! emitted as a pseudo-key, so listeners subscribe to lifecycle events the
//! same way they subscribe to properties.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    WillReset,
    WillRender,
    WillUpdate,
    WillMount,
    WillUnmount,
    DidRender,
    /// Also activates an inert model.
    DidMount,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 7] = [
        Lifecycle::WillReset,
        Lifecycle::WillRender,
        Lifecycle::WillUpdate,
        Lifecycle::WillMount,
        Lifecycle::WillUnmount,
        Lifecycle::DidRender,
        Lifecycle::DidMount,
    ];

    /// The pseudo-key emitted for this event.
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::WillReset => "willReset",
            Lifecycle::WillRender => "willRender",
            Lifecycle::WillUpdate => "willUpdate",
            Lifecycle::WillMount => "willMount",
            Lifecycle::WillUnmount => "willUnmount",
            Lifecycle::DidRender => "didRender",
            Lifecycle::DidMount => "didMount",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == key)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip() {
        for event in Lifecycle::ALL {
            assert_eq!(Lifecycle::from_key(event.as_str()), Some(event));
        }

        assert_eq!(Lifecycle::from_key("seconds"), None);
    }
}
