use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::{Mutex, MutexGuard};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{
    common::types::{ClientId, RoomId, ServerClock},
    configs::Config,
    protocol::{AudioSource, OutgoingMessage, ScheduledAction, SpatialEffect},
    room::{
        broadcast::Outbox,
        client::CachedClient,
        playback::Coordinator,
        scheduler::{Job, RoomScheduler},
        spatial::{GainModel, Grid},
        state::Room,
    },
    storage::{
        ObjectStore,
        backup::{RoomSnapshot, Snapshot, SnapshotData},
    },
};

/// A room plus the timers that act on it.
#[derive(Debug)]
pub struct RoomEntry {
    room: Mutex<Room>,
    jobs: RoomScheduler,
}

impl RoomEntry {
    fn new(room: Room) -> Self {
        Self {
            room: Mutex::new(room),
            jobs: RoomScheduler::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Room> {
        self.room.lock()
    }

    pub fn jobs(&self) -> &RoomScheduler {
        &self.jobs
    }
}

/// Owns every live room. Creates rooms on first join, evicts silent
/// clients, and deletes rooms once they have stayed empty for the grace
/// period.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, Arc<RoomEntry>>,
    config: Arc<Config>,
    clock: ServerClock,
    store: Arc<dyn ObjectStore>,
    coordinator: Coordinator,
    gain_model: GainModel,
    grid: Grid,
}

impl RoomRegistry {
    pub fn new(config: Arc<Config>, store: Arc<dyn ObjectStore>) -> Arc<Self> {
        Arc::new(Self {
            rooms: DashMap::new(),
            coordinator: Coordinator::new(config.sync.schedule_lead_ms),
            gain_model: GainModel::from_config(&config.spatial),
            grid: Grid::from_config(&config.room),
            clock: ServerClock::new(),
            config,
            store,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn gain_model(&self) -> &GainModel {
        &self.gain_model
    }

    /// Current gains for every client in `room`, stamped for immediate use.
    pub fn gains_frame(&self, room: &Room) -> OutgoingMessage {
        room.spatial_config(
            &self.gain_model,
            self.config.spatial.ramp_time_secs,
            self.now_ms(),
        )
    }

    pub fn get(&self, room_id: &RoomId) -> Option<Arc<RoomEntry>> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<_> = self.rooms.iter().map(|kv| kv.key().clone()).collect();
        ids.sort();
        ids
    }

    fn new_room(&self, room_id: &RoomId) -> Room {
        let mut room = Room::new(room_id.clone(), self.grid);
        room.spatial_mut().speed = self.config.spatial.default_speed;
        room
    }

    /// Returns the room, creating it if needed. Creating starts no timers.
    pub fn get_or_create(&self, room_id: &RoomId) -> Arc<RoomEntry> {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                info!("Creating room {}", room_id);
                Arc::new(RoomEntry::new(self.new_room(room_id)))
            })
            .value()
            .clone()
    }

    /// Joins a connection to a room and announces it.
    pub fn add_client(
        self: &Arc<Self>,
        room_id: &RoomId,
        client_id: ClientId,
        username: String,
        outbox: Outbox,
    ) -> Arc<RoomEntry> {
        let now = self.now_ms();
        // Holding the map entry keeps a concurrent cleanup from deleting the
        // room between lookup and insertion.
        let slot = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            info!("Creating room {}", room_id);
            Arc::new(RoomEntry::new(self.new_room(room_id)))
        });
        let entry = slot.value().clone();
        {
            let mut room = entry.lock();
            if entry.jobs.cancel(Job::Cleanup) {
                info!("Cancelled pending cleanup for room {}", room_id);
            }
            let is_admin = room.join(client_id.clone(), username, outbox, now).is_admin;
            info!(
                "Client {} joined room {} (admin={}, members={})",
                client_id,
                room_id,
                is_admin,
                room.len()
            );
            room.send_to(&client_id, &room.audio_sources_event());
            room.send_to(&client_id, &room.controls_event());
            room.broadcast(&room.client_change());
            self.start_heartbeat(room_id, &entry);
        }
        drop(slot);
        entry
    }

    /// Removes a client. With `connection` set, a newer connection that
    /// replaced the client is left alone. Returns whether anything was
    /// removed.
    pub fn remove_client(
        self: &Arc<Self>,
        room_id: &RoomId,
        client_id: &ClientId,
        connection: Option<&Outbox>,
    ) -> bool {
        let Some(entry) = self.get(room_id) else {
            return false;
        };
        // Job transitions happen under the room lock so a concurrent join
        // sees either the occupied room or the fully stopped one.
        let mut room = entry.lock();
        if room.leave(client_id, connection).is_none() {
            return false;
        }
        info!(
            "Client {} left room {} (members={})",
            client_id,
            room_id,
            room.len()
        );
        if !room.is_empty() {
            room.broadcast(&room.client_change());
            return true;
        }
        entry.jobs.cancel(Job::Heartbeat);
        if entry.jobs.cancel(Job::SpatialLoop) {
            debug!("Stopped spatial loop for empty room {}", room_id);
        }
        room.spatial_mut().active = false;
        self.arm_cleanup(
            room_id,
            &entry,
            Duration::from_secs(self.config.room.cleanup_grace_secs),
        );
        true
    }

    fn start_heartbeat(self: &Arc<Self>, room_id: &RoomId, entry: &RoomEntry) {
        let registry = Arc::clone(self);
        let id = room_id.clone();
        let period = Duration::from_millis(self.config.sync.heartbeat_interval_ms);
        let started = entry.jobs.start(Job::Heartbeat, async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !registry.contains(&id) {
                    break;
                }
                registry.evict_stale(&id);
            }
        });
        if started {
            debug!("Heartbeat checker started for room {}", room_id);
        }
    }

    /// Force-closes and removes clients whose last heartbeat is older than
    /// the timeout. Returns how many were evicted.
    pub fn evict_stale(self: &Arc<Self>, room_id: &RoomId) -> usize {
        let Some(entry) = self.get(room_id) else {
            return 0;
        };
        let timeout = self.config.sync.heartbeat_timeout_ms as f64;
        let stale: Vec<(ClientId, Outbox)> = {
            let room = entry.lock();
            room.stale_clients(self.now_ms(), timeout)
                .into_iter()
                .filter_map(|id| {
                    let client = room.client(&id)?;
                    client.close();
                    Some((id, client.outbox().clone()))
                })
                .collect()
        };
        for (client_id, outbox) in &stale {
            warn!(
                "Client {} in room {} missed heartbeats, disconnecting",
                client_id, room_id
            );
            self.remove_client(room_id, client_id, Some(outbox));
        }
        stale.len()
    }

    /// (Re)arms the single cleanup timer for a room.
    pub fn schedule_cleanup(self: &Arc<Self>, room_id: &RoomId, delay: Duration) {
        if let Some(entry) = self.get(room_id) {
            self.arm_cleanup(room_id, &entry, delay);
        }
    }

    fn arm_cleanup(self: &Arc<Self>, room_id: &RoomId, entry: &RoomEntry, delay: Duration) {
        let registry = Arc::clone(self);
        let id = room_id.clone();
        entry.jobs.restart(Job::Cleanup, async move {
            tokio::time::sleep(delay).await;
            registry.cleanup_room(&id).await;
        });
        info!("Room {} scheduled for cleanup in {:?}", room_id, delay);
    }

    pub fn cancel_cleanup(&self, room_id: &RoomId) -> bool {
        self.get(room_id)
            .is_some_and(|entry| entry.jobs.cancel(Job::Cleanup))
    }

    /// Deletes an empty room and purges its stored objects. Storage failures
    /// are logged; a later orphan sweep picks up what is left.
    pub async fn cleanup_room(&self, room_id: &RoomId) -> bool {
        let Some((_, entry)) = self
            .rooms
            .remove_if(room_id, |_, entry| entry.lock().is_empty())
        else {
            debug!("Cleanup skipped for room {}: occupied or gone", room_id);
            return false;
        };
        info!("Deleting room {}", room_id);
        match self.store.delete_prefix(&room_id.storage_prefix()).await {
            Ok(0) => {}
            Ok(n) => info!("Purged {} stored object(s) for room {}", n, room_id),
            Err(e) => warn!("Failed to purge storage for room {}: {}", room_id, e),
        }
        drop(entry);
        true
    }

    /// Activates the spatial effect and starts its loop. Parameters update
    /// even if the loop is already running; the loop itself is never
    /// started twice. Returns whether a new loop was started.
    pub fn start_spatial(
        self: &Arc<Self>,
        room_id: &RoomId,
        effect: Option<SpatialEffect>,
        speed: Option<f64>,
    ) -> bool {
        let Some(entry) = self.get(room_id) else {
            return false;
        };
        let mut room = entry.lock();
        if room.is_empty() {
            return false;
        }
        let spatial = room.spatial_mut();
        if let Some(effect) = effect {
            spatial.effect = effect;
        }
        if let Some(speed) = speed.filter(|s| s.is_finite() && *s > 0.0) {
            spatial.speed = speed;
        }
        spatial.active = true;

        let registry = Arc::clone(self);
        let id = room_id.clone();
        let tick = Duration::from_millis(self.config.spatial.tick_ms);
        let started = entry.jobs.start(Job::SpatialLoop, async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;
            loop {
                interval.tick().await;
                if !registry.spatial_tick(&id) {
                    break;
                }
            }
        });
        drop(room);
        if started {
            info!("Spatial loop started for room {}", room_id);
        }
        started
    }

    /// One loop iteration. Returns false when the loop should end.
    pub fn spatial_tick(&self, room_id: &RoomId) -> bool {
        let Some(entry) = self.get(room_id) else {
            return false;
        };
        let mut room = entry.lock();
        if !room.spatial().active || room.is_empty() {
            return false;
        }
        room.advance_spatial();
        room.broadcast(&self.gains_frame(&room));
        true
    }

    /// Stops the loop and tells clients to reset their gain. Returns false if
    /// nothing was running.
    pub fn stop_spatial(&self, room_id: &RoomId) -> bool {
        let Some(entry) = self.get(room_id) else {
            return false;
        };
        let mut room = entry.lock();
        let was_running = entry.jobs.cancel(Job::SpatialLoop);
        let was_active = std::mem::replace(&mut room.spatial_mut().active, false);
        if !(was_running || was_active) {
            return false;
        }
        info!("Spatial loop stopped for room {}", room_id);
        room.broadcast(&OutgoingMessage::scheduled(
            ScheduledAction::StopSpatialAudio,
            self.now_ms(),
        ));
        true
    }

    /// Recreates a room from a snapshot unless it is already live, then arms
    /// its cleanup timer.
    pub fn restore_room(
        self: &Arc<Self>,
        room_id: &RoomId,
        audio_sources: Vec<AudioSource>,
        client_cache: impl IntoIterator<Item = (ClientId, CachedClient)>,
    ) -> bool {
        match self.rooms.entry(room_id.clone()) {
            Entry::Occupied(_) => {
                debug!("Room {} is live, skipping restore", room_id);
                return false;
            }
            Entry::Vacant(slot) => {
                let mut room = self.new_room(room_id);
                for source in audio_sources {
                    room.add_audio_source(source);
                }
                room.restore_cache(client_cache);
                slot.insert(Arc::new(RoomEntry::new(room)));
            }
        }
        self.schedule_cleanup(
            room_id,
            Duration::from_secs(self.config.room.cleanup_grace_secs),
        );
        true
    }

    pub fn snapshot(&self) -> Snapshot {
        let rooms = self
            .rooms
            .iter()
            .map(|kv| (kv.key().clone(), RoomSnapshot::capture(&kv.value().lock())))
            .collect();
        Snapshot {
            timestamp: self.now_ms() as u64,
            data: SnapshotData { rooms },
        }
    }

    /// Cancels every room timer.
    pub fn shutdown(&self) {
        for kv in self.rooms.iter() {
            kv.value().jobs.cancel_all();
        }
    }
}
