//! Kiosk session controller.
//!
//! Owns the device identity, drives the pairing handshake, runs the
//! heartbeat/command loop and applies remote commands to the local
//! playback state. All state is owned by the controller task: output events
//! and local actions arrive over channels and are handled between poll ticks.
//!
//! ## Lifecycle
//!
//! ```text
//! Unstarted --gesture--> Registering --unlinked--> AwaitingClaim --claimed--> Active
//!                             |                                                 ^
//!                             +--------------------linked-----------------------+
//! ```

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::Receiver;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use ttclient::{Device, DeviceCommand, Song};
use ttconfig::Config;

use crate::backend::KioskBackend;
use crate::command::{KioskCommand, apply_volume_delta};
use crate::config_ext::KioskConfigExt;
use crate::errors::{KioskError, Result};
use crate::events::{KioskEvent, KioskEventBus};
use crate::output::{AudioOutput, OutputEvent};
use crate::queue::{Advance, PlayQueue, merge_song_ids};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::store::KioskStore;

/// Number of command ids remembered for acknowledgment bookkeeping.
const ACK_HISTORY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for a local interaction to unlock audio.
    Unstarted,
    Registering,
    /// Claim code displayed, watching for the device to be linked.
    AwaitingClaim,
    /// Heartbeat and command loop running.
    Active,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Unstarted => "UNSTARTED",
            SessionState::Registering => "REGISTERING",
            SessionState::AwaitingClaim => "AWAITING_CLAIM",
            SessionState::Active => "ACTIVE",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KioskSettings {
    pub poll_interval: Duration,
    pub claim_poll_interval: Duration,
    pub retry_backoff: Duration,
    pub initial_volume: f32,
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1500),
            claim_poll_interval: Duration::from_secs(3),
            retry_backoff: Duration::from_secs(5),
            initial_volume: 0.5,
        }
    }
}

impl KioskSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.get_kiosk_poll_interval(),
            claim_poll_interval: config.get_kiosk_claim_poll_interval(),
            retry_backoff: config.get_kiosk_retry_backoff(),
            initial_volume: config.get_kiosk_initial_volume(),
        }
    }
}

/// Controls issued on the kiosk itself (keyboard, buttons).
#[derive(Clone, Debug, PartialEq)]
pub enum LocalAction {
    TogglePlay,
    Next,
    Prev,
    /// Volume steps, same unit as `VOLUME_DELTA`.
    Volume(f64),
    ToggleLoop,
    /// Save the current discovery song into the loaded playlist.
    PromoteCurrent,
    PromoteAll,
}

/// Cloneable sender of [`LocalAction`]s to a running controller.
#[derive(Clone, Debug)]
pub struct KioskHandle {
    tx: mpsc::UnboundedSender<LocalAction>,
}

impl KioskHandle {
    /// Returns `false` once the controller is gone.
    pub fn send(&self, action: LocalAction) -> bool {
        self.tx.send(action).is_ok()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KioskSnapshot {
    pub state: SessionState,
    pub device_id: String,
    pub linked: bool,
    pub claim_code: Option<String>,
    pub playlist_id: Option<String>,
    pub playlist_len: usize,
    pub current_index: Option<usize>,
    pub current: Option<Song>,
    pub current_is_discovery: bool,
    pub playing: bool,
    pub volume: f32,
    pub loop_enabled: bool,
    pub unlocked: bool,
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AckStatus {
    Acknowledged,
    /// Effect applied, acknowledgment failed.
    Pending,
}

#[derive(Debug, Default)]
struct AckLedger {
    order: VecDeque<String>,
    entries: HashMap<String, AckStatus>,
}

impl AckLedger {
    fn get(&self, id: &str) -> Option<AckStatus> {
        self.entries.get(id).copied()
    }

    fn record(&mut self, id: &str, status: AckStatus) {
        if self.entries.insert(id.to_string(), status).is_none() {
            self.order.push_back(id.to_string());
            while self.order.len() > ACK_HISTORY {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        }
    }
}

pub struct KioskController {
    device_id: String,
    backend: Arc<dyn KioskBackend>,
    output: Box<dyn AudioOutput>,
    output_events: mpsc::UnboundedReceiver<OutputEvent>,
    scheduler: Arc<dyn Scheduler>,
    store: Arc<dyn KioskStore>,
    bus: KioskEventBus,
    settings: KioskSettings,
    actions_tx: mpsc::UnboundedSender<LocalAction>,
    actions_rx: mpsc::UnboundedReceiver<LocalAction>,

    state: SessionState,
    device: Option<Device>,
    claim_code: Option<String>,
    queue: PlayQueue,
    playing: bool,
    volume: f32,
    loop_enabled: bool,
    unlocked: bool,
    acks: AckLedger,
}

impl KioskController {
    pub fn new(
        backend: Arc<dyn KioskBackend>,
        mut output: Box<dyn AudioOutput>,
        store: Arc<dyn KioskStore>,
        settings: KioskSettings,
    ) -> Result<Self> {
        let device_id = store.device_id().map_err(KioskError::Config)?;
        let loop_enabled = store.loop_enabled();
        let output_events = output.subscribe();
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();

        info!(device_id = %device_id, loop_enabled, "Kiosk controller created");

        Ok(Self {
            device_id,
            backend,
            output,
            output_events,
            scheduler: Arc::new(TokioScheduler),
            store,
            bus: KioskEventBus::new(),
            settings,
            actions_tx,
            actions_rx,
            state: SessionState::Unstarted,
            device: None,
            claim_code: None,
            queue: PlayQueue::new(),
            playing: false,
            volume: settings.initial_volume.clamp(0.0, 1.0),
            loop_enabled,
            unlocked: false,
            acks: AckLedger::default(),
        })
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn handle(&self) -> KioskHandle {
        KioskHandle {
            tx: self.actions_tx.clone(),
        }
    }

    pub fn subscribe(&self) -> Receiver<KioskEvent> {
        self.bus.subscribe()
    }

    pub fn snapshot(&self) -> KioskSnapshot {
        let current = self.queue.current();
        KioskSnapshot {
            state: self.state,
            device_id: self.device_id.clone(),
            linked: self.device.as_ref().is_some_and(Device::is_linked),
            claim_code: self.claim_code.clone(),
            playlist_id: self.queue.playlist_id().map(str::to_string),
            playlist_len: self.queue.len(),
            current_index: self.queue.current_index(),
            current: current.map(|e| e.song.clone()),
            current_is_discovery: current.is_some_and(|e| e.discovery),
            playing: self.playing,
            volume: self.volume,
            loop_enabled: self.loop_enabled,
            unlocked: self.unlocked,
            elapsed: self.output.elapsed(),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            info!(from = self.state.as_str(), to = state.as_str(), "Kiosk state changed");
            self.state = state;
            self.bus.broadcast(KioskEvent::StateChanged(state));
        }
    }

    fn set_playing(&mut self, playing: bool) {
        if self.playing != playing {
            self.playing = playing;
            self.bus.broadcast(KioskEvent::PlaybackChanged { playing });
        }
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Waits for `gesture`, then runs the kiosk forever.
    pub async fn run<G>(mut self, gesture: G)
    where
        G: Future<Output = ()> + Send,
    {
        info!(device_id = %self.device_id, "Waiting for interaction to start");
        gesture.await;
        self.start().await;
    }

    /// Unlock, register, pair if needed, then loop forever.
    pub async fn start(&mut self) {
        self.unlock_audio().await;
        if !self.register().await {
            self.await_claim().await;
        }
        self.run_active().await;
    }

    /// Unstarted -> Registering. Unlocks the output once.
    pub async fn unlock_audio(&mut self) {
        if !self.unlocked {
            match self.output.unlock().await {
                Ok(()) => self.unlocked = true,
                Err(e) => warn!(error = %e, "Audio unlock failed, playback may be refused"),
            }
            self.output.set_volume(self.volume).await;
        }
        self.set_state(SessionState::Registering);
    }

    /// Registers until the backend answers. Returns whether the device is linked.
    pub async fn register(&mut self) -> bool {
        self.set_state(SessionState::Registering);
        loop {
            match self.backend.register_device(&self.device_id).await {
                Ok(device) => {
                    let linked = device.is_linked();
                    info!(device_id = %self.device_id, linked, "Device registered");
                    self.device = Some(device);
                    return linked;
                }
                Err(e) => {
                    warn!(error = %e, "Registration failed, retrying");
                    self.scheduler.sleep(self.settings.retry_backoff).await;
                }
            }
        }
    }

    /// Shows a claim code and watches until an account claims the device.
    pub async fn await_claim(&mut self) {
        self.set_state(SessionState::AwaitingClaim);

        let code = loop {
            match self.backend.request_claim_code(&self.device_id).await {
                Ok(claim) => break claim.code,
                Err(e) => {
                    warn!(error = %e, "Claim code request failed, retrying");
                    self.scheduler.sleep(self.settings.retry_backoff).await;
                }
            }
        };
        info!(code = %code, "Claim code ready");
        self.claim_code = Some(code.clone());
        self.bus.broadcast(KioskEvent::ClaimCode(Some(code)));

        loop {
            self.scheduler.sleep(self.settings.claim_poll_interval).await;
            match self.backend.whoami(&self.device_id).await {
                Ok(device) if device.is_linked() => {
                    info!(account_id = ?device.account_id, "Device claimed");
                    self.device = Some(device);
                    break;
                }
                Ok(_) => debug!("Device not claimed yet"),
                Err(e) => debug!(error = %e, "Claim status check failed"),
            }
        }

        self.claim_code = None;
        self.bus.broadcast(KioskEvent::ClaimCode(None));
    }

    /// Heartbeat and command loop. The next tick is armed only once the
    /// current iteration has settled, so iterations never overlap.
    pub async fn run_active(&mut self) {
        self.set_state(SessionState::Active);
        let scheduler = Arc::clone(&self.scheduler);
        let interval = self.settings.poll_interval;

        loop {
            self.poll_once().await;

            let tick = scheduler.sleep(interval);
            tokio::pin!(tick);
            loop {
                tokio::select! {
                    _ = &mut tick => break,
                    Some(event) = self.output_events.recv() => self.on_output_event(event).await,
                    Some(action) = self.actions_rx.recv() => self.on_local_action(action).await,
                }
            }
        }
    }

    /// One loop iteration: heartbeat, fetch, then dispatch and ack in order.
    pub async fn poll_once(&mut self) {
        if let Err(e) = self.backend.heartbeat(&self.device_id).await {
            warn!(error = %e, "Heartbeat failed");
            return;
        }
        self.bus.broadcast(KioskEvent::Heartbeat(Utc::now()));

        let commands = match self.backend.pending_commands(&self.device_id).await {
            Ok(commands) => commands,
            Err(e) => {
                warn!(error = %e, "Fetching commands failed");
                return;
            }
        };

        for command in commands {
            self.process_command(&command).await;
        }
    }

    async fn process_command(&mut self, command: &DeviceCommand) {
        match self.acks.get(&command.id) {
            Some(AckStatus::Acknowledged) => {
                debug!(command_id = %command.id, "Command already acknowledged, skipping");
                return;
            }
            Some(AckStatus::Pending) => {
                debug!(command_id = %command.id, "Command already applied, retrying ack only");
            }
            None => self.dispatch(command).await,
        }

        match self.backend.ack_command(&command.id).await {
            Ok(()) => self.acks.record(&command.id, AckStatus::Acknowledged),
            Err(e) => {
                warn!(command_id = %command.id, error = %e, "Command acknowledgment failed");
                self.acks.record(&command.id, AckStatus::Pending);
            }
        }
    }

    // ========================================================================
    // Command dispatch
    // ========================================================================

    /// Best-effort execution of a remote command; failures are logged.
    pub async fn dispatch(&mut self, command: &DeviceCommand) {
        let parsed = KioskCommand::parse(command);
        info!(
            command_id = %command.id,
            command_type = %command.command_type,
            "Executing command"
        );
        if let Err(e) = self.execute(parsed).await {
            warn!(command_id = %command.id, error = %e, "Command failed");
        }
    }

    pub async fn execute(&mut self, command: KioskCommand) -> Result<()> {
        match command {
            KioskCommand::LoadPlaylist { playlist_id } => self.load_playlist(&playlist_id).await?,
            KioskCommand::PlayPause => self.toggle_play().await,
            KioskCommand::Next => self.next().await,
            KioskCommand::Prev => self.prev().await,
            KioskCommand::VolumeDelta { delta } => self.adjust_volume(delta).await,
            KioskCommand::Ignored {
                command_type,
                reason,
            } => debug!(%command_type, %reason, "Ignoring command"),
        }
        Ok(())
    }

    /// Replaces the local snapshot and starts its first song.
    pub async fn load_playlist(&mut self, playlist_id: &str) -> Result<()> {
        let playlist = self.backend.get_playlist(playlist_id).await?;
        let (id, name, len) = (playlist.id.clone(), playlist.name.clone(), playlist.songs.len());
        info!(playlist_id = %id, songs = len, "Playlist loaded");

        self.queue.load(playlist);
        self.bus
            .broadcast(KioskEvent::PlaylistLoaded { playlist_id: id, name, len });

        if len > 0 {
            self.play_index(0).await;
        } else {
            self.output.pause();
            self.set_playing(false);
        }
        Ok(())
    }

    /// Toggles from the engine's real state, which may differ from the
    /// cached flag after an asynchronous failure.
    pub async fn toggle_play(&mut self) {
        if self.output.is_paused() {
            if self.queue.current().is_none() {
                debug!("Nothing to resume");
                return;
            }
            match self.output.play().await {
                Ok(()) => self.set_playing(true),
                Err(e) => {
                    warn!(error = %e, "Resume failed");
                    self.set_playing(false);
                }
            }
        } else {
            self.output.pause();
            self.set_playing(false);
        }
    }

    pub async fn next(&mut self) {
        self.advance().await;
    }

    pub async fn prev(&mut self) {
        match self.queue.previous_index() {
            Some(index) => self.play_index(index).await,
            None => debug!("Nothing playing, ignoring previous"),
        }
    }

    pub async fn adjust_volume(&mut self, delta: f64) {
        self.volume = apply_volume_delta(self.volume, delta);
        self.output.set_volume(self.volume).await;
        debug!(volume = self.volume, "Volume changed");
        self.bus.broadcast(KioskEvent::VolumeChanged(self.volume));
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_enabled = enabled;
        if let Err(e) = self.store.set_loop_enabled(enabled) {
            warn!(error = %e, "Failed to persist loop flag");
        }
        self.bus.broadcast(KioskEvent::LoopChanged(enabled));
    }

    // ========================================================================
    // Autoplay
    // ========================================================================

    /// End-of-track policy, shared by `NEXT` and natural completion.
    pub async fn advance(&mut self) {
        match self.queue.advance() {
            Advance::Idle => debug!("Nothing playing, ignoring advance"),
            Advance::Index(index) => self.play_index(index).await,
            Advance::AtEnd if self.loop_enabled => self.play_index(0).await,
            Advance::AtEnd => {
                let first = self.discover().await;
                self.play_index(first.unwrap_or(0)).await;
            }
        }
    }

    /// Appends recommendations for the genre of the current song. Returns
    /// the index of the first appended entry.
    async fn discover(&mut self) -> Option<usize> {
        let genre = self.queue.current()?.song.genre.clone();
        let exclude = self.queue.song_ids();

        match self
            .backend
            .recommendations(&self.device_id, &genre, &exclude)
            .await
        {
            Ok(songs) if !songs.is_empty() => {
                let count = songs.len();
                let first = self.queue.append_discoveries(songs);
                info!(genre = %genre, count, "Discovery songs appended");
                self.bus.broadcast(KioskEvent::DiscoveriesAdded(count));
                first
            }
            Ok(_) => {
                info!(genre = %genre, "No recommendations, restarting playlist");
                None
            }
            Err(e) => {
                warn!(error = %e, "Recommendations failed, restarting playlist");
                None
            }
        }
    }

    /// Pause, swap the source, then play. A play failure only clears the
    /// playing flag.
    async fn play_index(&mut self, index: usize) {
        let Some(entry) = self.queue.get(index).cloned() else {
            warn!(index, "No queue entry at index");
            return;
        };

        self.output.pause();
        let url = self.backend.stream_url(&entry.song.id);
        self.output.set_source(&url);
        self.queue.set_current_index(Some(index));

        info!(
            index,
            song_id = %entry.song.id,
            title = %entry.song.title,
            discovery = entry.discovery,
            "Now playing"
        );
        self.bus.broadcast(KioskEvent::NowPlaying {
            index,
            song: entry.song,
            discovery: entry.discovery,
        });

        match self.output.play().await {
            Ok(()) => self.set_playing(true),
            Err(e) => {
                warn!(error = %e, "Playback failed to start");
                self.set_playing(false);
            }
        }
    }

    // ========================================================================
    // Discovery promotion
    // ========================================================================

    fn loaded_playlist_id(&self) -> Result<String> {
        self.queue
            .playlist_id()
            .map(str::to_string)
            .ok_or(KioskError::NoPlaylist)
    }

    pub async fn promote_discovery(&mut self, song_id: &str) -> Result<Vec<String>> {
        let playlist_id = self.loaded_playlist_id()?;
        if !self.queue.is_discovery(song_id) {
            return Err(KioskError::NotADiscovery(song_id.to_string()));
        }
        self.promote(playlist_id, vec![song_id.to_string()]).await
    }

    pub async fn promote_all_discoveries(&mut self) -> Result<Vec<String>> {
        let playlist_id = self.loaded_playlist_id()?;
        let ids = self.queue.discovery_ids();
        if ids.is_empty() {
            debug!("No discovery songs to promote");
            return Ok(Vec::new());
        }
        self.promote(playlist_id, ids).await
    }

    /// Optimistic merge: re-read the server list, union, write back. Not
    /// race-free against concurrent writers.
    async fn promote(&mut self, playlist_id: String, ids: Vec<String>) -> Result<Vec<String>> {
        let latest = self.backend.get_playlist(&playlist_id).await?;
        let merged = merge_song_ids(&latest.song_ids(), &ids);
        self.backend
            .replace_playlist_songs(&playlist_id, &merged)
            .await?;

        self.queue.mark_persisted(&ids);
        info!(playlist_id = %playlist_id, promoted = ids.len(), total = merged.len(), "Discovery songs saved");
        self.bus.broadcast(KioskEvent::DiscoveriesPromoted(ids));
        Ok(merged)
    }

    // ========================================================================
    // Events from the output and local controls
    // ========================================================================

    async fn on_output_event(&mut self, event: OutputEvent) {
        match event {
            OutputEvent::Ended => {
                debug!("Track ended");
                self.set_playing(false);
                self.advance().await;
            }
            OutputEvent::Failed(reason) => {
                warn!(%reason, "Playback stopped with an error");
                self.set_playing(false);
            }
        }
    }

    async fn on_local_action(&mut self, action: LocalAction) {
        debug!(?action, "Local action");
        match action {
            LocalAction::TogglePlay => self.toggle_play().await,
            LocalAction::Next => self.next().await,
            LocalAction::Prev => self.prev().await,
            LocalAction::Volume(delta) => self.adjust_volume(delta).await,
            LocalAction::ToggleLoop => self.set_loop(!self.loop_enabled),
            LocalAction::PromoteCurrent => {
                let current = self
                    .queue
                    .current()
                    .filter(|e| e.discovery)
                    .map(|e| e.song.id.clone());
                match current {
                    Some(song_id) => {
                        if let Err(e) = self.promote_discovery(&song_id).await {
                            warn!(error = %e, "Saving discovery song failed");
                        }
                    }
                    None => debug!("Current song is not a discovery song"),
                }
            }
            LocalAction::PromoteAll => {
                if let Err(e) = self.promote_all_discoveries().await {
                    warn!(error = %e, "Saving discovery songs failed");
                }
            }
        }
    }

    /// Processes pending output events and local actions without waiting.
    pub async fn drain_pending(&mut self) {
        while let Ok(event) = self.output_events.try_recv() {
            self.on_output_event(event).await;
        }
        while let Ok(action) = self.actions_rx.try_recv() {
            self.on_local_action(action).await;
        }
    }
}
