//! Age-based pruning of idle games.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rook_core::GameKind;
use rook_store::{GameRepo, StoreError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delete games of every kind not written within `retention` of `now`.
pub fn sweep_once(repo: &GameRepo, retention: Duration, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let age = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    let cutoff = now.checked_sub_signed(age).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut removed = 0;
    for kind in GameKind::ALL {
        removed += repo.prune(kind, cutoff)?;
    }
    Ok(removed)
}

/// Sweep every `interval` until `shutdown` is cancelled.
pub fn spawn_sweeper(
    repo: GameRepo,
    retention: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let sweep_repo = repo.clone();
                    let swept = tokio::task::spawn_blocking(move || {
                        sweep_once(&sweep_repo, retention, Utc::now())
                    })
                    .await;
                    match swept {
                        Ok(Ok(removed)) => debug!(removed, "retention sweep finished"),
                        Ok(Err(e)) => warn!(error = %e, "retention sweep failed"),
                        Err(e) => warn!(error = %e, "retention sweep panicked"),
                    }
                }
            }
        }
        debug!("retention sweeper stopped");
    })
}
