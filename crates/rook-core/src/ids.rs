//! Branded string identifiers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing raw identifier.
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

branded_id!(
    /// Identifies one game (challenge or computer game). Doubles as the
    /// persisted key in the game's bucket.
    SessionId
);

branded_id!(
    /// Identifies one live connection.
    ParticipantId
);

impl SessionId {
    /// Derive an id from a creation timestamp (`YYYYMMDDhhmmssSSS`, UTC).
    pub fn from_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y%m%d%H%M%S%3f").to_string())
    }

    /// Disambiguate an id that collided with an existing key.
    pub fn with_suffix(&self, n: u32) -> Self {
        Self(format!("{}-{n}", self.0))
    }

    /// True if the id is empty (an inbound frame omitted it).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl ParticipantId {
    /// Fresh, time-ordered participant id.
    pub fn new() -> Self {
        Self(format!("peer_{}", Uuid::now_v7()))
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}
