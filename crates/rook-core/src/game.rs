//! Kinds of persisted games.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bucket holding realtime two-seat sessions.
pub const CHALLENGES_BUCKET: &str = "challenges";
/// Bucket holding games played against the engine over HTTP.
pub const GAMES_BUCKET: &str = "games";

/// Which bucket a game lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    /// Realtime session between two browsers.
    Challenge,
    /// Single browser against the engine.
    Computer,
}

impl GameKind {
    /// All kinds, in bucket-creation order.
    pub const ALL: [GameKind; 2] = [GameKind::Challenge, GameKind::Computer];

    /// Durable bucket name.
    pub fn bucket(self) -> &'static str {
        match self {
            Self::Challenge => CHALLENGES_BUCKET,
            Self::Computer => GAMES_BUCKET,
        }
    }
}

impl fmt::Display for GameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bucket())
    }
}

impl FromStr for GameKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CHALLENGES_BUCKET => Ok(Self::Challenge),
            GAMES_BUCKET => Ok(Self::Computer),
            other => Err(format!("unknown game bucket: {other}")),
        }
    }
}
