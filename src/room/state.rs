use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;

use crate::{
    common::types::{ClientId, RoomId},
    protocol::{
        AudioSource, GainUpdate, Location, OutgoingMessage, PlaybackPermissions, Position,
        RoomEvent, ScheduledAction, SpatialEffect,
    },
    room::{
        broadcast::{self, Outbox},
        client::{CachedClient, Client},
        playback::PlaybackState,
        spatial::{GainModel, Grid, path_position},
    },
};

/// Spatial-effect parameters and loop progress.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialState {
    pub effect: SpatialEffect,
    pub speed: f64,
    pub counter: u64,
    pub active: bool,
}

impl Default for SpatialState {
    fn default() -> Self {
        Self {
            effect: SpatialEffect::default(),
            speed: 1.0,
            counter: 0,
            active: false,
        }
    }
}

/// Authoritative state of one room. Mutated only while the room lock is
/// held; every method runs to completion without yielding.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    clients: HashMap<ClientId, Client>,
    /// Join order; drives the circle layout.
    order: Vec<ClientId>,
    client_cache: HashMap<ClientId, CachedClient>,
    audio_sources: Vec<AudioSource>,
    listening_source: Position,
    playback: PlaybackState,
    permissions: PlaybackPermissions,
    spatial: SpatialState,
    grid: Grid,
}

impl Room {
    pub fn new(id: RoomId, grid: Grid) -> Self {
        Self {
            id,
            clients: HashMap::new(),
            order: Vec::new(),
            client_cache: HashMap::new(),
            audio_sources: Vec::new(),
            listening_source: grid.center(),
            playback: PlaybackState::default(),
            permissions: PlaybackPermissions::default(),
            spatial: SpatialState::default(),
            grid,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn client(&self, client_id: &ClientId) -> Option<&Client> {
        self.clients.get(client_id)
    }

    /// Clients in layout order.
    pub fn clients(&self) -> impl Iterator<Item = &Client> {
        self.order.iter().filter_map(|id| self.clients.get(id))
    }

    pub fn client_ids(&self) -> &[ClientId] {
        &self.order
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    // ---- membership ----

    /// Adds a client, replacing any stale entry with the same id. The replaced
    /// connection is told to close. Admin status comes from the cache, or is
    /// granted to the first member.
    pub fn join(&mut self, client_id: ClientId, username: String, outbox: Outbox, now_ms: f64) -> &Client {
        if let Some(replaced) = self.clients.remove(&client_id) {
            replaced.close();
            self.order.retain(|id| id != &client_id);
        }

        let mut client = Client::new(client_id.clone(), username, outbox, now_ms);
        client.is_admin = self.clients.is_empty()
            || self
                .client_cache
                .get(&client_id)
                .is_some_and(|cached| cached.is_admin);

        self.client_cache
            .insert(client_id.clone(), CachedClient { is_admin: client.is_admin });
        self.clients.insert(client_id.clone(), client);
        self.order.push(client_id.clone());
        self.reposition();
        self.ensure_admin();
        &self.clients[&client_id]
    }

    /// Removes a client. With `connection` set, only removes the entry if it
    /// still belongs to that connection (a reconnect may have replaced it).
    pub fn leave(&mut self, client_id: &ClientId, connection: Option<&Outbox>) -> Option<Client> {
        if let Some(outbox) = connection {
            if !self.clients.get(client_id)?.is_connection(outbox) {
                return None;
            }
        }
        let removed = self.clients.remove(client_id)?;
        self.order.retain(|id| id != client_id);
        self.reposition();
        self.ensure_admin();
        Some(removed)
    }

    /// Promotes a random client when a non-empty room has no admin. Returns
    /// the promoted client.
    pub fn ensure_admin(&mut self) -> Option<ClientId> {
        if self.clients.is_empty() || self.admin_count() > 0 {
            return None;
        }
        let chosen = self.order.choose(&mut rand::thread_rng())?.clone();
        self.apply_admin(&chosen, true);
        Some(chosen)
    }

    pub fn admin_count(&self) -> usize {
        self.clients.values().filter(|c| c.is_admin).count()
    }

    pub fn is_admin(&self, client_id: &ClientId) -> bool {
        self.clients.get(client_id).is_some_and(|c| c.is_admin)
    }

    /// Whether `client_id` may drive playback and spatial controls.
    pub fn can_control(&self, client_id: &ClientId) -> bool {
        match self.permissions {
            PlaybackPermissions::Everyone => self.clients.contains_key(client_id),
            PlaybackPermissions::AdminOnly => self.is_admin(client_id),
        }
    }

    /// Grants or revokes admin. The last admin cannot be demoted. Returns
    /// whether anything changed.
    pub fn set_admin(&mut self, client_id: &ClientId, is_admin: bool) -> bool {
        let Some(client) = self.clients.get(client_id) else {
            return false;
        };
        if client.is_admin == is_admin {
            return false;
        }
        if !is_admin && self.admin_count() <= 1 {
            return false;
        }
        self.apply_admin(client_id, is_admin);
        true
    }

    fn apply_admin(&mut self, client_id: &ClientId, is_admin: bool) {
        if let Some(client) = self.clients.get_mut(client_id) {
            client.is_admin = is_admin;
        }
        self.client_cache
            .insert(client_id.clone(), CachedClient { is_admin });
    }

    pub fn client_cache(&self) -> &HashMap<ClientId, CachedClient> {
        &self.client_cache
    }

    /// Merges a restored admin cache; live entries win.
    pub fn restore_cache(&mut self, cache: impl IntoIterator<Item = (ClientId, CachedClient)>) {
        for (id, cached) in cache {
            self.client_cache.entry(id).or_insert(cached);
        }
    }

    // ---- positions ----

    /// Lays clients out evenly on the circle in join order.
    pub fn reposition(&mut self) {
        let layout = self.grid.circle_layout(self.order.len());
        for (id, position) in self.order.iter().zip(layout) {
            if let Some(client) = self.clients.get_mut(id) {
                client.position = position;
            }
        }
    }

    pub fn move_client(&mut self, client_id: &ClientId, position: Position) -> bool {
        let position = self.grid.clamp(position);
        match self.clients.get_mut(client_id) {
            Some(client) => {
                client.position = position;
                true
            }
            None => false,
        }
    }

    /// Moves a client to the front of the layout order.
    pub fn reorder_client(&mut self, client_id: &ClientId) -> bool {
        let Some(index) = self.order.iter().position(|id| id == client_id) else {
            return false;
        };
        let id = self.order.remove(index);
        self.order.insert(0, id);
        self.reposition();
        true
    }

    pub fn listening_source(&self) -> Position {
        self.listening_source
    }

    pub fn set_listening_source(&mut self, position: Position) {
        self.listening_source = self.grid.clamp(position);
    }

    // ---- liveness & metadata ----

    pub fn record_heartbeat(&mut self, client_id: &ClientId, now_ms: f64, rtt: Option<f64>) -> bool {
        match self.clients.get_mut(client_id) {
            Some(client) => {
                client.last_heartbeat = now_ms;
                if let Some(rtt) = rtt.filter(|r| r.is_finite() && *r >= 0.0) {
                    client.rtt = rtt;
                }
                true
            }
            None => false,
        }
    }

    /// Clients silent for longer than `timeout_ms`.
    pub fn stale_clients(&self, now_ms: f64, timeout_ms: f64) -> Vec<ClientId> {
        self.clients()
            .filter(|c| now_ms - c.last_heartbeat > timeout_ms)
            .map(|c| c.client_id.clone())
            .collect()
    }

    pub fn set_location(&mut self, client_id: &ClientId, location: Location) -> bool {
        match self.clients.get_mut(client_id) {
            Some(client) => {
                client.location = Some(location);
                true
            }
            None => false,
        }
    }

    /// Largest client-reported RTT in the room.
    pub fn max_rtt(&self) -> f64 {
        self.clients.values().map(|c| c.rtt).fold(0.0, f64::max)
    }

    // ---- playlist & playback ----

    pub fn audio_sources(&self) -> &[AudioSource] {
        &self.audio_sources
    }

    /// Appends a source unless it is already listed.
    pub fn add_audio_source(&mut self, source: AudioSource) -> bool {
        if self.audio_sources.contains(&source) {
            return false;
        }
        self.audio_sources.push(source);
        true
    }

    /// Removes the listed urls, returning the removed sources.
    pub fn remove_audio_sources(&mut self, urls: &[String]) -> Vec<AudioSource> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.audio_sources)
            .into_iter()
            .partition(|s| urls.contains(&s.url));
        self.audio_sources = kept;
        removed
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackState {
        &mut self.playback
    }

    pub fn permissions(&self) -> PlaybackPermissions {
        self.permissions
    }

    pub fn set_permissions(&mut self, permissions: PlaybackPermissions) {
        self.permissions = permissions;
    }

    // ---- spatial ----

    pub fn spatial(&self) -> &SpatialState {
        &self.spatial
    }

    pub fn spatial_mut(&mut self) -> &mut SpatialState {
        &mut self.spatial
    }

    /// One loop step: advance the counter and move the listening source
    /// along the active path.
    pub fn advance_spatial(&mut self) -> Position {
        self.spatial.counter += 1;
        self.listening_source = path_position(
            self.spatial.effect,
            self.spatial.counter,
            self.spatial.speed,
            &self.grid,
        );
        self.listening_source
    }

    pub fn gains(&self, model: &GainModel, ramp_time: f64) -> BTreeMap<ClientId, GainUpdate> {
        self.clients()
            .map(|c| {
                (
                    c.client_id.clone(),
                    GainUpdate {
                        gain: model.gain(&c.position, &self.listening_source),
                        ramp_time,
                    },
                )
            })
            .collect()
    }

    // ---- frames ----

    pub fn client_change(&self) -> OutgoingMessage {
        OutgoingMessage::room_event(RoomEvent::ClientChange {
            clients: self.clients().map(Client::info).collect(),
        })
    }

    pub fn audio_sources_event(&self) -> OutgoingMessage {
        OutgoingMessage::room_event(RoomEvent::SetAudioSources {
            sources: self.audio_sources.clone(),
        })
    }

    pub fn controls_event(&self) -> OutgoingMessage {
        OutgoingMessage::room_event(RoomEvent::SetPlaybackControls {
            permissions: self.permissions,
        })
    }

    pub fn spatial_config(&self, model: &GainModel, ramp_time: f64, now_ms: f64) -> OutgoingMessage {
        OutgoingMessage::scheduled(
            ScheduledAction::SpatialConfig {
                listening_source: self.listening_source,
                gains: self.gains(model, ramp_time),
            },
            now_ms,
        )
    }

    // ---- delivery ----

    /// Publishes to every client in the room.
    pub fn broadcast(&self, msg: &OutgoingMessage) -> usize {
        broadcast::publish(self.clients().map(Client::outbox), msg)
    }

    /// Replies to one client.
    pub fn send_to(&self, client_id: &ClientId, msg: &OutgoingMessage) -> bool {
        self.clients.get(client_id).is_some_and(|c| c.send(msg))
    }
}
