//! Value objects.
//!
//! Numeric ids mirror the store's integer primary keys and are always
//! strictly positive. `0` on the wire means "no room" and is never a valid
//! `RoomId`.

use std::fmt;

use uuid::Uuid;

use super::error::ValueObjectError;

macro_rules! positive_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(i64);

        impl $name {
            pub fn new(value: i64) -> Result<Self, ValueObjectError> {
                if value <= 0 {
                    return Err(ValueObjectError::NonPositiveId {
                        kind: $label,
                        value,
                    });
                }
                Ok(Self(value))
            }

            pub fn value(&self) -> i64 {
                self.0
            }
        }

        impl TryFrom<i64> for $name {
            type Error = ValueObjectError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

positive_id!(
    /// Authenticated user identifier, stable across reconnects
    UserId,
    "user id"
);
positive_id!(
    /// Room identifier
    RoomId,
    "room id"
);
positive_id!(
    /// Server-assigned message identifier
    MessageId,
    "message id"
);

/// Opaque identifier of one live socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Generates fresh connection ids
pub struct ConnectionIdFactory;

impl ConnectionIdFactory {
    pub fn generate() -> ConnectionId {
        ConnectionId(Uuid::new_v4())
    }
}

/// Body of a chat message. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.is_empty() {
            return Err(ValueObjectError::EmptyContent);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
