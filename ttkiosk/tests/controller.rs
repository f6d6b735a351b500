use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use ttclient::{ClaimCode, Device, DeviceCommand, Playlist, Result, Song, TapToneError};
use ttkiosk::{
    KioskBackend, KioskController, KioskError, KioskEvent, KioskSettings, KioskStore,
    LocalAction, MemoryStore, NullOutput, NullOutputHandle, SessionState,
};

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Default)]
struct FakeState {
    devices: HashMap<String, Device>,
    register_attempts: usize,
    register_failures: usize,
    claim_code: String,
    whoami_calls: usize,
    /// Number of whoami calls after which the device becomes linked.
    claim_after: Option<usize>,
    heartbeats: usize,
    heartbeat_failures: usize,
    fetch_calls: usize,
    commands: Vec<DeviceCommand>,
    ack_attempts: usize,
    ack_failures: usize,
    acked: Vec<String>,
    playlists: HashMap<String, Playlist>,
    playlist_reads: usize,
    recommendations: Vec<Song>,
    recommendation_calls: Vec<(String, Vec<String>)>,
    replaced: Vec<(String, Vec<String>)>,
}

#[derive(Default)]
struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    fn new() -> Arc<Self> {
        let backend = Self::default();
        backend.state().claim_code = "7F3K9Q".to_string();
        Arc::new(backend)
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn link(&self, device_id: &str) {
        self.state().devices.insert(
            device_id.to_string(),
            device(device_id, Some("42")),
        );
    }

    fn put_playlist(&self, playlist: Playlist) {
        self.state().playlists.insert(playlist.id.clone(), playlist);
    }

    fn queue_command(&self, command: DeviceCommand) {
        self.state().commands.push(command);
    }
}

fn device(device_id: &str, account_id: Option<&str>) -> Device {
    Device {
        device_id: device_id.to_string(),
        account_id: account_id.map(str::to_string),
        id: None,
        name: None,
        is_active: None,
        last_seen: None,
    }
}

#[async_trait]
impl KioskBackend for FakeBackend {
    async fn register_device(&self, device_id: &str) -> Result<Device> {
        let mut state = self.state();
        state.register_attempts += 1;
        if state.register_failures > 0 {
            state.register_failures -= 1;
            return Err(TapToneError::from_status_code(503, "unavailable"));
        }
        Ok(state
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| device(device_id, None))
            .clone())
    }

    async fn request_claim_code(&self, _device_id: &str) -> Result<ClaimCode> {
        Ok(ClaimCode {
            code: self.state().claim_code.clone(),
        })
    }

    async fn whoami(&self, device_id: &str) -> Result<Device> {
        let mut state = self.state();
        state.whoami_calls += 1;
        if state.claim_after.is_some_and(|n| state.whoami_calls >= n) {
            state
                .devices
                .insert(device_id.to_string(), device(device_id, Some("42")));
        }
        state
            .devices
            .get(device_id)
            .cloned()
            .ok_or_else(|| TapToneError::NotFound(device_id.to_string()))
    }

    async fn heartbeat(&self, _device_id: &str) -> Result<()> {
        let mut state = self.state();
        if state.heartbeat_failures > 0 {
            state.heartbeat_failures -= 1;
            return Err(TapToneError::from_status_code(500, "boom"));
        }
        state.heartbeats += 1;
        Ok(())
    }

    async fn pending_commands(&self, _device_id: &str) -> Result<Vec<DeviceCommand>> {
        let mut state = self.state();
        state.fetch_calls += 1;
        Ok(state.commands.clone())
    }

    async fn ack_command(&self, command_id: &str) -> Result<()> {
        let mut state = self.state();
        state.ack_attempts += 1;
        if state.ack_failures > 0 {
            state.ack_failures -= 1;
            return Err(TapToneError::from_status_code(502, "bad gateway"));
        }
        state.commands.retain(|c| c.id != command_id);
        state.acked.push(command_id.to_string());
        Ok(())
    }

    async fn get_playlist(&self, playlist_id: &str) -> Result<Playlist> {
        let mut state = self.state();
        state.playlist_reads += 1;
        state
            .playlists
            .get(playlist_id)
            .cloned()
            .ok_or_else(|| TapToneError::NotFound(playlist_id.to_string()))
    }

    async fn replace_playlist_songs(&self, playlist_id: &str, song_ids: &[String]) -> Result<()> {
        let mut state = self.state();
        state
            .replaced
            .push((playlist_id.to_string(), song_ids.to_vec()));
        let all: Vec<Song> = state
            .playlists
            .values()
            .flat_map(|p| p.songs.clone())
            .chain(state.recommendations.clone())
            .collect();
        if let Some(playlist) = state.playlists.get_mut(playlist_id) {
            playlist.songs = song_ids
                .iter()
                .filter_map(|id| all.iter().find(|s| &s.id == id).cloned())
                .collect();
        }
        Ok(())
    }

    async fn recommendations(
        &self,
        _device_id: &str,
        genre: &str,
        exclude_ids: &[String],
    ) -> Result<Vec<Song>> {
        let mut state = self.state();
        state
            .recommendation_calls
            .push((genre.to_string(), exclude_ids.to_vec()));
        Ok(state.recommendations.clone())
    }

    fn stream_url(&self, song_id: &str) -> String {
        format!("http://fake/stream/{song_id}")
    }
}

// ============================================================================
// Helpers
// ============================================================================

const DEVICE_ID: &str = "kiosk-test-1";

fn song(id: &str, genre: &str) -> Song {
    Song {
        id: id.to_string(),
        title: format!("Song {id}"),
        artist: "Artist".to_string(),
        genre: genre.to_string(),
        image_url: None,
        price: None,
    }
}

fn playlist(id: &str, song_ids: &[&str]) -> Playlist {
    Playlist {
        id: id.to_string(),
        name: format!("Playlist {id}"),
        user_id: Some("42".to_string()),
        songs: song_ids.iter().map(|s| song(s, "rock")).collect(),
    }
}

fn kiosk(
    backend: &Arc<FakeBackend>,
    store: &Arc<MemoryStore>,
) -> (KioskController, NullOutputHandle) {
    let output = NullOutput::new();
    let handle = output.handle();
    let controller = KioskController::new(
        backend.clone(),
        Box::new(output),
        store.clone(),
        KioskSettings::default(),
    )
    .unwrap();
    (controller, handle)
}

fn load_command(id: &str, playlist_id: &str) -> DeviceCommand {
    DeviceCommand::new(id, "LOAD_PLAYLIST")
        .with_payload(json!(format!("{{\"playlist_id\": {playlist_id}}}")))
}

fn url(song_id: &str) -> String {
    format!("http://fake/stream/{song_id}")
}

fn current_id(controller: &KioskController) -> Option<String> {
    controller.queue().current().map(|e| e.song.id.clone())
}

// ============================================================================
// Registration and pairing
// ============================================================================

#[tokio::test]
async fn test_register_is_idempotent() {
    let backend = FakeBackend::new();
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    assert!(!controller.register().await);
    assert!(!controller.register().await);

    let state = backend.state();
    assert_eq!(state.register_attempts, 2);
    assert_eq!(state.devices.len(), 1);
    assert!(state.devices.contains_key(DEVICE_ID));
}

#[tokio::test]
async fn test_register_linked_device_skips_claim() {
    let backend = FakeBackend::new();
    backend.link(DEVICE_ID);
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    assert!(controller.register().await);
    assert!(controller.snapshot().linked);
}

#[tokio::test(start_paused = true)]
async fn test_claim_flow_reaches_active() {
    let backend = FakeBackend::new();
    backend.state().claim_after = Some(2);
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (controller, output) = kiosk(&backend, &store);
    let events = controller.subscribe();

    let task = tokio::spawn(controller.run(async {}));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(output.is_unlocked());
    assert_eq!(backend.state().whoami_calls, 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(backend.state().whoami_calls, 1);
    assert_eq!(backend.state().heartbeats, 0);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(backend.state().whoami_calls, 2);
    assert!(backend.state().heartbeats >= 1);

    task.abort();

    let seen: Vec<KioskEvent> = events
        .try_iter()
        .filter(|e| !matches!(e, KioskEvent::Heartbeat(_)))
        .collect();
    assert_eq!(
        seen,
        vec![
            KioskEvent::StateChanged(SessionState::Registering),
            KioskEvent::StateChanged(SessionState::AwaitingClaim),
            KioskEvent::ClaimCode(Some("7F3K9Q".to_string())),
            KioskEvent::ClaimCode(None),
            KioskEvent::StateChanged(SessionState::Active),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_registration_retries_after_backoff() {
    let backend = FakeBackend::new();
    backend.link(DEVICE_ID);
    backend.state().register_failures = 2;
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (controller, _) = kiosk(&backend, &store);

    let task = tokio::spawn(controller.run(async {}));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.state().register_attempts, 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.state().register_attempts, 2);
    assert_eq!(backend.state().heartbeats, 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(backend.state().register_attempts, 3);
    assert!(backend.state().heartbeats >= 1);

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_gesture_gates_startup() {
    let backend = FakeBackend::new();
    backend.link(DEVICE_ID);
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (controller, output) = kiosk(&backend, &store);
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let task = tokio::spawn(controller.run(async move {
        let _ = rx.await;
    }));

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.state().register_attempts, 0);
    assert!(!output.is_unlocked());

    tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.state().register_attempts, 1);
    assert!(output.is_unlocked());

    task.abort();
}

// ============================================================================
// Command loop
// ============================================================================

#[tokio::test]
async fn test_command_is_executed_and_acked_once() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2"]));
    backend.queue_command(load_command("c1", "7"));
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, output) = kiosk(&backend, &store);

    controller.poll_once().await;
    controller.poll_once().await;

    let state = backend.state();
    assert_eq!(state.acked, vec!["c1".to_string()]);
    assert_eq!(state.playlist_reads, 1);
    assert_eq!(state.heartbeats, 2);
    drop(state);

    assert_eq!(controller.queue().playlist_id(), Some("7"));
    assert_eq!(output.source(), Some(url("1")));
    assert!(controller.is_playing());
}

#[tokio::test]
async fn test_failed_ack_retries_ack_without_reapplying() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2"]));
    backend.queue_command(load_command("c1", "7"));
    backend.state().ack_failures = 1;
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    controller.poll_once().await;
    assert!(backend.state().acked.is_empty());

    controller.poll_once().await;
    controller.poll_once().await;

    let state = backend.state();
    assert_eq!(state.playlist_reads, 1);
    assert_eq!(state.ack_attempts, 2);
    assert_eq!(state.acked, vec!["c1".to_string()]);
}

#[tokio::test]
async fn test_heartbeat_failure_skips_command_fetch() {
    let backend = FakeBackend::new();
    backend.state().heartbeat_failures = 1;
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    controller.poll_once().await;
    assert_eq!(backend.state().fetch_calls, 0);

    controller.poll_once().await;
    assert_eq!(backend.state().fetch_calls, 1);
}

#[tokio::test]
async fn test_commands_run_in_order() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2", "3"]));
    backend.queue_command(load_command("c1", "7"));
    backend.queue_command(DeviceCommand::new("c2", "NEXT"));
    backend.queue_command(DeviceCommand::new("c3", "NEXT"));
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    controller.poll_once().await;

    assert_eq!(current_id(&controller), Some("3".to_string()));
    assert_eq!(backend.state().acked, vec!["c1", "c2", "c3"]);
}

#[tokio::test]
async fn test_unknown_and_failing_commands_are_acked() {
    let backend = FakeBackend::new();
    backend.queue_command(DeviceCommand::new("c1", "REBOOT"));
    backend.queue_command(load_command("c2", "404"));
    backend.queue_command(DeviceCommand::new("c3", "VOLUME_DELTA"));
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    controller.poll_once().await;

    assert_eq!(backend.state().acked, vec!["c1", "c2", "c3"]);
    assert!(controller.queue().is_empty());
    assert_eq!(controller.volume(), 0.5);
}

// ============================================================================
// Playback controls
// ============================================================================

#[tokio::test]
async fn test_volume_delta_clamps() {
    let backend = FakeBackend::new();
    backend.queue_command(
        DeviceCommand::new("c1", "VOLUME_DELTA").with_payload(json!("{\"delta\": -20}")),
    );
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, output) = kiosk(&backend, &store);

    controller.poll_once().await;
    assert_eq!(controller.volume(), 0.0);
    assert_eq!(output.volume(), 0.0);

    backend.queue_command(
        DeviceCommand::new("c2", "VOLUME_DELTA").with_payload(json!({ "delta": 3 })),
    );
    controller.poll_once().await;
    assert!((controller.volume() - 0.15).abs() < 1e-6);

    controller.adjust_volume(100.0).await;
    assert_eq!(controller.volume(), 1.0);
}

#[tokio::test]
async fn test_next_at_end_with_loop_restarts() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2"]));
    backend.state().recommendations = vec![song("9", "rock")];
    let store = Arc::new(MemoryStore::new(DEVICE_ID).with_loop(true));
    let (mut controller, output) = kiosk(&backend, &store);

    controller.load_playlist("7").await.unwrap();
    controller.next().await;
    controller.next().await;

    assert_eq!(current_id(&controller), Some("1".to_string()));
    assert_eq!(controller.queue().len(), 2);
    assert!(backend.state().recommendation_calls.is_empty());
    assert_eq!(output.history(), vec![url("1"), url("2"), url("1")]);
}

#[tokio::test]
async fn test_next_at_end_appends_discoveries() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2"]));
    backend.state().recommendations = vec![song("9", "rock"), song("10", "rock")];
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, output) = kiosk(&backend, &store);
    let events = controller.subscribe();

    controller.load_playlist("7").await.unwrap();
    controller.next().await;
    controller.next().await;

    assert_eq!(current_id(&controller), Some("9".to_string()));
    assert_eq!(controller.queue().len(), 4);
    assert!(controller.snapshot().current_is_discovery);
    assert_eq!(output.source(), Some(url("9")));
    assert_eq!(
        backend.state().recommendation_calls,
        vec![("rock".to_string(), vec!["1".to_string(), "2".to_string()])]
    );
    assert!(events.try_iter().any(|e| e == KioskEvent::DiscoveriesAdded(2)));
}

#[tokio::test]
async fn test_next_at_end_without_recommendations_wraps() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2"]));
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    controller.load_playlist("7").await.unwrap();
    controller.next().await;
    controller.next().await;

    assert_eq!(current_id(&controller), Some("1".to_string()));
    assert_eq!(controller.queue().len(), 2);
    assert_eq!(backend.state().recommendation_calls.len(), 1);
}

#[tokio::test]
async fn test_prev_wraps_to_last() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2", "3"]));
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    controller.prev().await;
    assert_eq!(current_id(&controller), None);

    controller.load_playlist("7").await.unwrap();
    controller.prev().await;
    assert_eq!(current_id(&controller), Some("3".to_string()));
}

#[tokio::test]
async fn test_track_end_advances_and_wraps() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["A", "B", "C"]));
    let store = Arc::new(MemoryStore::new(DEVICE_ID).with_loop(true));
    let (mut controller, output) = kiosk(&backend, &store);

    controller.load_playlist("7").await.unwrap();
    for _ in 0..3 {
        output.end_track();
        controller.drain_pending().await;
    }

    assert_eq!(current_id(&controller), Some("A".to_string()));
    assert_eq!(
        output.history(),
        vec![url("A"), url("B"), url("C"), url("A")]
    );
    assert!(controller.is_playing());
}

#[tokio::test]
async fn test_play_failure_clears_playing() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2"]));
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, output) = kiosk(&backend, &store);

    output.fail_next_play();
    controller.load_playlist("7").await.unwrap();

    assert!(!controller.is_playing());
    assert_eq!(current_id(&controller), Some("1".to_string()));
    assert_eq!(output.source(), Some(url("1")));
}

#[tokio::test]
async fn test_play_pause_follows_engine_state() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1"]));
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, output) = kiosk(&backend, &store);

    controller.load_playlist("7").await.unwrap();
    assert!(output.is_playing());

    output.fail_playback("decoder error");
    controller.drain_pending().await;
    assert!(!controller.is_playing());

    controller.toggle_play().await;
    assert!(controller.is_playing());
    assert!(output.is_playing());

    controller.toggle_play().await;
    assert!(!controller.is_playing());
    assert!(!output.is_playing());
}

#[tokio::test]
async fn test_toggle_loop_persists() {
    let backend = FakeBackend::new();
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    assert!(controller.handle().send(LocalAction::ToggleLoop));
    controller.drain_pending().await;

    assert!(store.loop_enabled());
    assert!(controller.snapshot().loop_enabled);
}

// ============================================================================
// Discovery promotion
// ============================================================================

#[tokio::test]
async fn test_promotion_merges_latest_server_list() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2"]));
    backend.state().recommendations = vec![song("9", "rock")];
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    controller.load_playlist("7").await.unwrap();
    controller.next().await;
    controller.next().await;
    assert_eq!(current_id(&controller), Some("9".to_string()));

    // Someone else edits the playlist in the meantime.
    backend.put_playlist(playlist("7", &["1", "2", "3"]));

    let merged = controller.promote_discovery("9").await.unwrap();
    assert_eq!(merged, vec!["1", "2", "3", "9"]);
    assert_eq!(
        backend.state().replaced,
        vec![("7".to_string(), vec!["1", "2", "3", "9"].into_iter().map(String::from).collect())]
    );
    assert!(!controller.queue().is_discovery("9"));

    let again = controller.promote_discovery("9").await;
    assert!(matches!(again, Err(KioskError::NotADiscovery(id)) if id == "9"));
}

#[tokio::test]
async fn test_promote_all_skips_duplicates() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1"]));
    backend.state().recommendations = vec![song("9", "rock"), song("10", "rock")];
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    controller.load_playlist("7").await.unwrap();
    controller.next().await;
    backend.put_playlist(playlist("7", &["1", "9"]));

    assert!(controller.handle().send(LocalAction::PromoteAll));
    controller.drain_pending().await;

    let state = backend.state();
    assert_eq!(state.replaced.len(), 1);
    assert_eq!(state.replaced[0].1, vec!["1", "9", "10"]);
    drop(state);
    assert!(controller.queue().discovery_ids().is_empty());

    assert!(controller.promote_all_discoveries().await.unwrap().is_empty());
    assert_eq!(backend.state().replaced.len(), 1);
}

#[tokio::test]
async fn test_promotion_requires_loaded_playlist() {
    let backend = FakeBackend::new();
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    assert!(matches!(
        controller.promote_discovery("9").await,
        Err(KioskError::NoPlaylist)
    ));
    assert!(matches!(
        controller.promote_all_discoveries().await,
        Err(KioskError::NoPlaylist)
    ));
    assert!(backend.state().replaced.is_empty());
}

#[tokio::test]
async fn test_promote_current_ignores_playlist_songs() {
    let backend = FakeBackend::new();
    backend.put_playlist(playlist("7", &["1", "2"]));
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (mut controller, _) = kiosk(&backend, &store);

    controller.load_playlist("7").await.unwrap();
    controller.handle().send(LocalAction::PromoteCurrent);
    controller.drain_pending().await;

    assert!(backend.state().replaced.is_empty());
}

// ============================================================================
// Running loop
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_active_loop_handles_local_actions_and_commands() {
    let backend = FakeBackend::new();
    backend.link(DEVICE_ID);
    backend.put_playlist(playlist("7", &["1", "2"]));
    let store = Arc::new(MemoryStore::new(DEVICE_ID));
    let (controller, output) = kiosk(&backend, &store);
    let handle = controller.handle();

    let task = tokio::spawn(controller.run(async {}));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.send(LocalAction::Volume(2.0)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!((output.volume() - 0.6).abs() < 1e-6);

    backend.queue_command(load_command("c1", "7"));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(backend.state().acked, vec!["c1"]);
    assert_eq!(output.source(), Some(url("1")));

    output.end_track();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(output.source(), Some(url("2")));

    task.abort();
}
