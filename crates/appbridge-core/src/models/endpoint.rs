//! Endpoint identifier type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric identifier the protocol stack uses to address a content app.
///
/// `EndpointId::INVALID` marks an app that has not been assigned an id yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(u16);

impl EndpointId {
    pub const INVALID: EndpointId = EndpointId(0xFFFF);

    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<u16> for EndpointId {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "invalid")
        }
    }
}
