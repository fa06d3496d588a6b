//! Room snapshots: periodic backup, restore on boot, and orphaned-object
//! reconciliation.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    common::types::{ClientId, RoomId},
    protocol::AudioSource,
    room::{CachedClient, RoomRegistry, state::Room},
    storage::{ObjectStore, StoreResult},
};

pub const BACKUP_PREFIX: &str = "state-backup/";
pub const ROOM_PREFIX: &str = "room-";

/// `{timestamp, data: {rooms: {...}}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: u64,
    pub data: SnapshotData,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotData {
    pub rooms: BTreeMap<RoomId, RoomSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    #[serde(default)]
    pub clients: Vec<ClientSnapshot>,
    #[serde(default)]
    pub audio_sources: Vec<AudioSource>,
    #[serde(default)]
    pub client_cache: BTreeMap<ClientId, CachedClient>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSnapshot {
    pub client_id: ClientId,
    pub username: String,
    pub is_admin: bool,
}

impl RoomSnapshot {
    pub fn capture(room: &Room) -> Self {
        Self {
            clients: room
                .clients()
                .map(|c| ClientSnapshot {
                    client_id: c.client_id.clone(),
                    username: c.username.clone(),
                    is_admin: c.is_admin,
                })
                .collect(),
            audio_sources: room.audio_sources().to_vec(),
            client_cache: room
                .client_cache()
                .iter()
                .map(|(id, cached)| (id.clone(), *cached))
                .collect(),
        }
    }
}

/// Zero-padded so keys sort chronologically.
pub fn backup_key(timestamp_ms: u64) -> String {
    format!("{}backup-{:013}.json", BACKUP_PREFIX, timestamp_ms)
}

/// Writes a snapshot of every live room. Returns the key written.
pub async fn backup(registry: &RoomRegistry) -> StoreResult<String> {
    let snapshot = registry.snapshot();
    let key = backup_key(snapshot.timestamp);
    let body = serde_json::to_vec(&snapshot)?;
    registry.store().put(&key, Bytes::from(body)).await?;
    debug!(
        "Backed up {} room(s) to {}",
        snapshot.data.rooms.len(),
        key
    );
    Ok(key)
}

/// Deletes all but the newest `keep` snapshots.
pub async fn prune_backups(store: &dyn ObjectStore, keep: usize) -> StoreResult<usize> {
    let keys = store.list(BACKUP_PREFIX).await?;
    let excess = keys.len().saturating_sub(keep.max(1));
    let mut removed = 0;
    for key in keys.into_iter().take(excess) {
        if store.delete(&key).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

pub async fn latest_snapshot(store: &dyn ObjectStore) -> StoreResult<Option<Snapshot>> {
    let Some(key) = store.list(BACKUP_PREFIX).await?.pop() else {
        return Ok(None);
    };
    let Some(body) = store.get(&key).await? else {
        return Ok(None);
    };
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Replays the latest snapshot into the registry. Rooms that already exist
/// are left alone; every restored room starts its cleanup grace period.
pub async fn restore(registry: &Arc<RoomRegistry>) -> StoreResult<usize> {
    let Some(snapshot) = latest_snapshot(registry.store().as_ref()).await? else {
        info!("No room snapshot found, starting empty");
        return Ok(0);
    };

    let mut restored = 0;
    for (room_id, room) in snapshot.data.rooms {
        // re-checked against the live registry after the read above
        if registry.restore_room(&room_id, room.audio_sources, room.client_cache) {
            restored += 1;
        }
    }
    info!(
        "Restored {} room(s) from snapshot taken at {}",
        restored, snapshot.timestamp
    );
    Ok(restored)
}

/// Deletes stored room namespaces whose room is no longer live.
pub async fn reconcile_orphans(registry: &RoomRegistry) -> StoreResult<usize> {
    let store = registry.store();
    let room_ids: BTreeSet<RoomId> = store
        .list(ROOM_PREFIX)
        .await?
        .iter()
        .filter_map(|key| key.strip_prefix(ROOM_PREFIX)?.split('/').next())
        .filter(|id| !id.is_empty())
        .map(RoomId::from)
        .collect();

    let mut purged = 0;
    for room_id in room_ids {
        if registry.contains(&room_id) {
            continue;
        }
        match store.delete_prefix(&room_id.storage_prefix()).await {
            Ok(n) => {
                info!("Purged {} orphaned object(s) for room {}", n, room_id);
                purged += n;
            }
            Err(e) => warn!("Failed to purge orphaned room {}: {}", room_id, e),
        }
    }
    Ok(purged)
}
