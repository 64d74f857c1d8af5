//! Strongly-typed identifiers.
//!
//! All IDs are validated at construction time and implement common traits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed ID newtype wrapper.
///
/// Generates: struct, `from_string()`, `as_str()`, Display, Serialize, Deserialize.
/// Deserialization goes through `from_string()`, so the empty string is
/// rejected there too.
/// Optionally generates `new()` (UUID v4) and `Default` if `uuid` flag is passed.
macro_rules! define_id {
    ($name:ident, uuid) => {
        define_id!($name);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String")]
        pub struct $name(String);

        impl $name {
            pub fn from_string(s: String) -> Result<Self, &'static str> {
                if s.is_empty() {
                    return Err(concat!(stringify!($name), " cannot be empty"));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = &'static str;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::from_string(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// Opaque handle to the platform's P2P radio context.
define_id!(SessionHandle, uuid);
// Hardware address of a peer, e.g. "02:00:00:00:00:01".
define_id!(DeviceAddress);
