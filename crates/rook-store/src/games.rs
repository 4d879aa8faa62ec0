//! Game positions keyed by session id.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use rook_core::{GameKind, SessionId};

use crate::buckets::BucketStore;
use crate::database::Database;
use crate::error::StoreError;

/// Attempts at disambiguating an id created in the same millisecond.
const MAX_ID_SUFFIX: u32 = 64;

/// One stored game.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameRecord {
    pub id: SessionId,
    pub kind: GameKind,
    pub position: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Read/write access to the latest position of a session.
pub trait PositionStore: Send + Sync {
    /// Latest persisted position for `id`.
    fn load(&self, id: &SessionId) -> Result<String, StoreError>;

    /// Overwrite the persisted position for `id`.
    fn save(&self, id: &SessionId, position: &str) -> Result<(), StoreError>;
}

/// Games of every kind, one bucket per [`GameKind`].
#[derive(Clone)]
pub struct GameRepo {
    buckets: BucketStore,
}

impl GameRepo {
    pub fn new(db: Database) -> Self {
        Self {
            buckets: BucketStore::new(db),
        }
    }

    /// Create the bucket of every game kind.
    pub fn ensure_buckets(&self) -> Result<(), StoreError> {
        for kind in GameKind::ALL {
            if self.buckets.create_bucket_if_absent(kind.bucket())? {
                info!(bucket = kind.bucket(), "created game bucket");
            }
        }
        Ok(())
    }

    /// Store a new game, keyed by the current time.
    pub fn create(&self, kind: GameKind, position: &str) -> Result<GameRecord, StoreError> {
        self.create_at(kind, position, Utc::now())
    }

    /// Store a new game keyed by `at`. Ids that collide get a `-N` suffix.
    #[instrument(skip(self, position), fields(bucket = kind.bucket()))]
    pub fn create_at(
        &self,
        kind: GameKind,
        position: &str,
        at: DateTime<Utc>,
    ) -> Result<GameRecord, StoreError> {
        let base = SessionId::from_timestamp(at);
        let mut id = base.clone();
        for n in 1..=MAX_ID_SUFFIX {
            match self
                .buckets
                .insert_new(kind.bucket(), id.as_str(), position.as_bytes())
            {
                Ok(()) => {
                    info!(session_id = %id, "game created");
                    return self.get(kind, &id);
                }
                Err(StoreError::Conflict(_)) => id = base.with_suffix(n),
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Conflict(format!(
            "no free id near {base} in {}",
            kind.bucket()
        )))
    }

    /// Full record for `id`.
    pub fn get(&self, kind: GameKind, id: &SessionId) -> Result<GameRecord, StoreError> {
        let entry = self
            .buckets
            .entry(kind.bucket(), id.as_str())?
            .ok_or_else(|| not_found(kind, id))?;
        record(kind, entry)
    }

    /// Latest position for `id`.
    #[instrument(skip(self), fields(bucket = kind.bucket(), session_id = %id))]
    pub fn load_position(&self, kind: GameKind, id: &SessionId) -> Result<String, StoreError> {
        let bytes = self
            .buckets
            .get(kind.bucket(), id.as_str())?
            .ok_or_else(|| not_found(kind, id))?;
        Ok(String::from_utf8(bytes)?)
    }

    /// Overwrite the position for `id` (last write wins).
    #[instrument(skip(self, position), fields(bucket = kind.bucket(), session_id = %id))]
    pub fn save_position(
        &self,
        kind: GameKind,
        id: &SessionId,
        position: &str,
    ) -> Result<(), StoreError> {
        self.buckets
            .put(kind.bucket(), id.as_str(), position.as_bytes())
    }

    /// Every game of `kind`, oldest id first.
    pub fn list(&self, kind: GameKind) -> Result<Vec<GameRecord>, StoreError> {
        self.buckets
            .scan(kind.bucket())?
            .into_iter()
            .map(|e| record(kind, e))
            .collect()
    }

    /// Number of games of `kind`.
    pub fn count(&self, kind: GameKind) -> Result<u64, StoreError> {
        self.buckets.count(kind.bucket())
    }

    /// Delete games of `kind` not written since `cutoff`.
    #[instrument(skip(self), fields(bucket = kind.bucket()))]
    pub fn prune(&self, kind: GameKind, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let removed = self.buckets.delete_older_than(kind.bucket(), cutoff)?;
        if removed > 0 {
            info!(removed, "pruned stale games");
        }
        Ok(removed)
    }

    /// Position access bound to one kind.
    pub fn positions(&self, kind: GameKind) -> Positions {
        Positions {
            repo: self.clone(),
            kind,
        }
    }

    #[cfg(test)]
    pub(crate) fn buckets(&self) -> &BucketStore {
        &self.buckets
    }
}

fn not_found(kind: GameKind, id: &SessionId) -> StoreError {
    StoreError::NotFound {
        bucket: kind.bucket().to_string(),
        key: id.to_string(),
    }
}

fn record(kind: GameKind, entry: crate::buckets::Entry) -> Result<GameRecord, StoreError> {
    Ok(GameRecord {
        id: SessionId::from_raw(entry.key),
        kind,
        position: String::from_utf8(entry.value)?,
        created_at: entry.created_at,
        updated_at: entry.updated_at,
    })
}

/// [`PositionStore`] over one game kind's bucket.
#[derive(Clone)]
pub struct Positions {
    repo: GameRepo,
    kind: GameKind,
}

impl PositionStore for Positions {
    fn load(&self, id: &SessionId) -> Result<String, StoreError> {
        self.repo.load_position(self.kind, id)
    }

    fn save(&self, id: &SessionId, position: &str) -> Result<(), StoreError> {
        self.repo.save_position(self.kind, id, position)
    }
}
