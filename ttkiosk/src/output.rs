//! Audio outputs driven by the kiosk controller.
//!
//! The controller treats an output like a media element: pause it, swap its
//! source, ask it to play. Natural end of track and asynchronous playback
//! failures come back as [`OutputEvent`]s on the channel returned by
//! [`AudioOutput::subscribe`].

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config_ext::DEFAULT_PLAYER_COMMAND;
use crate::errors::{KioskError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// The current source played to completion.
    Ended,
    /// Playback stopped on its own with an error.
    Failed(String),
}

#[async_trait]
pub trait AudioOutput: Send {
    /// One-time unlock before the first playback.
    async fn unlock(&mut self) -> Result<()>;

    fn pause(&mut self);

    /// Replaces the source. The output must be paused first.
    fn set_source(&mut self, url: &str);

    /// Starts (or resumes) playback of the current source.
    async fn play(&mut self) -> Result<()>;

    /// Actual engine state, not a cached flag.
    fn is_paused(&self) -> bool;

    async fn set_volume(&mut self, volume: f32);

    fn elapsed(&self) -> Duration;

    /// Replaces any previous subscription.
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<OutputEvent>;
}

// ============================================================================
// NullOutput
// ============================================================================

#[derive(Debug, Default)]
struct NullState {
    unlocked: bool,
    source: Option<String>,
    playing: bool,
    volume: f32,
    offset: Duration,
    started_at: Option<Instant>,
    fail_next_play: bool,
    history: Vec<String>,
    events: Option<mpsc::UnboundedSender<OutputEvent>>,
}

impl NullState {
    fn stop_clock(&mut self) {
        if let Some(started) = self.started_at.take() {
            self.offset += started.elapsed();
        }
    }
}

fn lock_state(state: &Mutex<NullState>) -> MutexGuard<'_, NullState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Headless output: keeps playback state without producing sound.
#[derive(Debug, Default)]
pub struct NullOutput {
    state: Arc<Mutex<NullState>>,
}

/// Remote control over a [`NullOutput`], used to simulate the engine.
#[derive(Clone, Debug)]
pub struct NullOutputHandle {
    state: Arc<Mutex<NullState>>,
}

impl NullOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> NullOutputHandle {
        NullOutputHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl NullOutputHandle {
    /// Simulates the current track playing to completion.
    pub fn end_track(&self) {
        let mut state = lock_state(&self.state);
        state.stop_clock();
        state.playing = false;
        if let Some(tx) = &state.events {
            let _ = tx.send(OutputEvent::Ended);
        }
    }

    /// Simulates playback dying asynchronously (decode error, device lost).
    pub fn fail_playback(&self, reason: &str) {
        let mut state = lock_state(&self.state);
        state.stop_clock();
        state.playing = false;
        if let Some(tx) = &state.events {
            let _ = tx.send(OutputEvent::Failed(reason.to_string()));
        }
    }

    /// Makes the next `play()` call fail, like a blocked autoplay.
    pub fn fail_next_play(&self) {
        lock_state(&self.state).fail_next_play = true;
    }

    pub fn is_unlocked(&self) -> bool {
        lock_state(&self.state).unlocked
    }

    pub fn is_playing(&self) -> bool {
        lock_state(&self.state).playing
    }

    pub fn source(&self) -> Option<String> {
        lock_state(&self.state).source.clone()
    }

    pub fn volume(&self) -> f32 {
        lock_state(&self.state).volume
    }

    /// Every source passed to a successful `play()`, in order.
    pub fn history(&self) -> Vec<String> {
        lock_state(&self.state).history.clone()
    }
}

#[async_trait]
impl AudioOutput for NullOutput {
    async fn unlock(&mut self) -> Result<()> {
        lock_state(&self.state).unlocked = true;
        debug!("Null output unlocked");
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = lock_state(&self.state);
        state.stop_clock();
        state.playing = false;
    }

    fn set_source(&mut self, url: &str) {
        let mut state = lock_state(&self.state);
        state.source = Some(url.to_string());
        state.offset = Duration::ZERO;
        state.started_at = None;
    }

    async fn play(&mut self) -> Result<()> {
        let mut state = lock_state(&self.state);
        if std::mem::take(&mut state.fail_next_play) {
            state.playing = false;
            return Err(KioskError::output("playback was refused"));
        }
        let Some(source) = state.source.clone() else {
            return Err(KioskError::NoSource);
        };
        if !state.playing {
            state.playing = true;
            state.started_at = Some(Instant::now());
            state.history.push(source);
        }
        Ok(())
    }

    fn is_paused(&self) -> bool {
        !lock_state(&self.state).playing
    }

    async fn set_volume(&mut self, volume: f32) {
        lock_state(&self.state).volume = volume.clamp(0.0, 1.0);
    }

    fn elapsed(&self) -> Duration {
        let state = lock_state(&self.state);
        state.offset + state.started_at.map(|s| s.elapsed()).unwrap_or_default()
    }

    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<OutputEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock_state(&self.state).events = Some(tx);
        rx
    }
}

// ============================================================================
// ProcessOutput
// ============================================================================

struct RunningPlayer {
    stop: oneshot::Sender<()>,
    alive: Arc<AtomicBool>,
    started_at: Instant,
}

/// Plays through an external player process (mpv by default).
///
/// Pausing stops the process and remembers the position; resuming starts
/// a new process at that position with `{start}`.
pub struct ProcessOutput {
    template: Vec<String>,
    source: Option<String>,
    volume: f32,
    offset: Duration,
    running: Option<RunningPlayer>,
    generation: Arc<AtomicU64>,
    events: Option<mpsc::UnboundedSender<OutputEvent>>,
}

impl ProcessOutput {
    /// `template` is split on whitespace; `{url}`, `{volume}` (0-100) and
    /// `{start}` (seconds) are substituted in each argument.
    pub fn new(template: &str) -> Self {
        let mut parts: Vec<String> = template.split_whitespace().map(str::to_string).collect();
        if parts.is_empty() {
            parts = DEFAULT_PLAYER_COMMAND
                .split_whitespace()
                .map(str::to_string)
                .collect();
        }
        Self {
            template: parts,
            source: None,
            volume: 1.0,
            offset: Duration::ZERO,
            running: None,
            generation: Arc::new(AtomicU64::new(0)),
            events: None,
        }
    }

    pub fn program(&self) -> &str {
        &self.template[0]
    }

    /// Arguments for the player process, without the program name.
    pub fn build_args(&self, url: &str) -> Vec<String> {
        let volume = (self.volume * 100.0).round() as u32;
        let start = format!("{:.1}", self.offset.as_secs_f64());
        self.template[1..]
            .iter()
            .map(|arg| {
                arg.replace("{url}", url)
                    .replace("{volume}", &volume.to_string())
                    .replace("{start}", &start)
            })
            .collect()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|run| run.alive.load(Ordering::SeqCst))
    }

    fn emit(&self, event: OutputEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl AudioOutput for ProcessOutput {
    /// A spawned player has no autoplay gate, so there is nothing to unlock.
    async fn unlock(&mut self) -> Result<()> {
        info!(player = %self.program(), "Audio output ready");
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(run) = self.running.take() {
            // Exits of superseded processes must not be reported
            self.generation.fetch_add(1, Ordering::SeqCst);
            if run.alive.load(Ordering::SeqCst) {
                self.offset += run.started_at.elapsed();
            }
            let _ = run.stop.send(());
        }
    }

    fn set_source(&mut self, url: &str) {
        self.pause();
        self.source = Some(url.to_string());
        self.offset = Duration::ZERO;
    }

    async fn play(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        // A finished process may still be parked here
        self.running = None;

        let url = self.source.clone().ok_or(KioskError::NoSource)?;
        let args = self.build_args(&url);
        debug!(program = %self.program(), ?args, "Spawning player");

        let mut child = Command::new(self.program())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KioskError::output(format!("cannot start {}: {}", self.program(), e)))?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = Arc::clone(&self.generation);
        let alive = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let events = self.events.clone();
        let watcher_alive = Arc::clone(&alive);

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => Some(status),
                _ = stop_rx => None,
            };
            if status.is_none() {
                let _ = child.kill().await;
            }
            watcher_alive.store(false, Ordering::SeqCst);

            let Some(status) = status else { return };
            if current.load(Ordering::SeqCst) != generation {
                return;
            }
            let event = match status {
                Ok(code) if code.success() => OutputEvent::Ended,
                Ok(code) => OutputEvent::Failed(format!("player exited with {}", code)),
                Err(e) => OutputEvent::Failed(e.to_string()),
            };
            if let Some(tx) = events {
                let _ = tx.send(event);
            }
        });

        self.running = Some(RunningPlayer {
            stop: stop_tx,
            alive,
            started_at: Instant::now(),
        });
        Ok(())
    }

    fn is_paused(&self) -> bool {
        !self.is_running()
    }

    async fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if self.is_running() {
            // The player only reads its volume at startup
            self.pause();
            if let Err(e) = self.play().await {
                warn!(error = %e, "Failed to restart player after volume change");
                self.emit(OutputEvent::Failed(e.to_string()));
            }
        }
    }

    fn elapsed(&self) -> Duration {
        match &self.running {
            Some(run) if run.alive.load(Ordering::SeqCst) => self.offset + run.started_at.elapsed(),
            _ => self.offset,
        }
    }

    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<OutputEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }
}
