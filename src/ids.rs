//! Opaque identifiers and clock utilities shared by every store.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

opaque_id!(TaskId);
opaque_id!(AgentId);
opaque_id!(RuleId);
opaque_id!(UndoId);

/// Monotonic-enough wall clock timestamp, kept as a thin wrapper so call sites read
/// `now()` rather than reaching into `chrono` directly.
pub fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
