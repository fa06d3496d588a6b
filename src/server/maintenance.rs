//! Background storage upkeep: periodic snapshots and orphan sweeps.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{room::RoomRegistry, storage::backup};

/// Writes a snapshot and prunes old ones. Errors are logged.
pub async fn backup_once(registry: &RoomRegistry) {
    match backup::backup(registry).await {
        Ok(key) => debug!("Room snapshot written to {}", key),
        Err(e) => {
            warn!("Room backup failed: {}", e);
            return;
        }
    }
    let keep = registry.config().storage.keep_backups;
    match backup::prune_backups(registry.store().as_ref(), keep).await {
        Ok(0) => {}
        Ok(n) => debug!("Pruned {} old snapshot(s)", n),
        Err(e) => warn!("Snapshot pruning failed: {}", e),
    }
}

pub fn spawn_backup_loop(
    registry: Arc<RoomRegistry>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => backup_once(&registry).await,
            }
        }
        debug!("Backup loop stopped");
    })
}

pub fn spawn_orphan_sweep(
    registry: Arc<RoomRegistry>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => match backup::reconcile_orphans(&registry).await {
                    Ok(0) => {}
                    Ok(n) => info!("Orphan sweep purged {} object(s)", n),
                    Err(e) => warn!("Orphan sweep failed: {}", e),
                },
            }
        }
        debug!("Orphan sweep stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::types::RoomId, configs::Config, room::broadcast::channel, storage::MemoryStore,
        storage::backup::BACKUP_PREFIX,
    };
    use bytes::Bytes;

    #[tokio::test(start_paused = true)]
    async fn backup_loop_writes_and_prunes() {
        let mut config = Config::default();
        config.storage.keep_backups = 2;
        let registry = RoomRegistry::new(Arc::new(config), Arc::new(MemoryStore::new()));
        let (tx, _rx) = channel();
        registry.add_client(&RoomId::from("123456"), "a".into(), "A".into(), tx);

        let cancel = CancellationToken::new();
        let handle = spawn_backup_loop(registry.clone(), Duration::from_secs(60), cancel.clone());
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(registry.store().list(BACKUP_PREFIX).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(182)).await;
        assert_eq!(registry.store().list(BACKUP_PREFIX).await.unwrap().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_orphans() {
        let registry =
            RoomRegistry::new(Arc::new(Config::default()), Arc::new(MemoryStore::new()));
        registry
            .store()
            .put("room-000001/a.mp3", Bytes::from_static(b"a"))
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let handle = spawn_orphan_sweep(registry.clone(), Duration::from_secs(10), cancel.clone());
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(registry.store().list("room-").await.unwrap().is_empty());

        cancel.cancel();
        handle.await.unwrap();
    }
}
