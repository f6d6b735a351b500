//! Kiosk settings stored in `ttconfig`.

use std::time::Duration;

use anyhow::Result;
use ttconfig::Config;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;
const DEFAULT_CLAIM_POLL_INTERVAL_MS: u64 = 3000;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 5000;
const DEFAULT_INITIAL_VOLUME: f64 = 0.5;
const DEFAULT_PLAYER_BACKEND: &str = "process";
pub const DEFAULT_PLAYER_COMMAND: &str =
    "mpv --no-video --really-quiet --volume={volume} --start={start} {url}";

pub trait KioskConfigExt {
    /// Loop flag (`kiosk.loop`), persisted across restarts
    fn get_kiosk_loop(&self) -> bool;
    fn set_kiosk_loop(&self, enabled: bool) -> Result<()>;

    /// Wait for a local interaction before unlocking audio (`kiosk.require_gesture`)
    fn get_kiosk_require_gesture(&self) -> bool;

    /// Heartbeat and command loop period
    fn get_kiosk_poll_interval(&self) -> Duration;
    /// Claim status watch period
    fn get_kiosk_claim_poll_interval(&self) -> Duration;
    /// Delay before retrying registration or claim-code requests
    fn get_kiosk_retry_backoff(&self) -> Duration;

    /// Volume at startup, clamped to [0, 1]
    fn get_kiosk_initial_volume(&self) -> f32;

    /// `process` or `null`
    fn get_kiosk_player_backend(&self) -> String;
    /// Command template with `{url}`, `{volume}` and `{start}` placeholders
    fn get_kiosk_player_command(&self) -> String;
}

impl KioskConfigExt for Config {
    fn get_kiosk_loop(&self) -> bool {
        self.get_bool_or(&["kiosk", "loop"], false)
    }

    fn set_kiosk_loop(&self, enabled: bool) -> Result<()> {
        self.set_bool(&["kiosk", "loop"], enabled)
    }

    fn get_kiosk_require_gesture(&self) -> bool {
        self.get_bool_or(&["kiosk", "require_gesture"], true)
    }

    fn get_kiosk_poll_interval(&self) -> Duration {
        Duration::from_millis(self.get_u64_or(&["kiosk", "poll_interval_ms"], DEFAULT_POLL_INTERVAL_MS))
    }

    fn get_kiosk_claim_poll_interval(&self) -> Duration {
        Duration::from_millis(self.get_u64_or(
            &["kiosk", "claim_poll_interval_ms"],
            DEFAULT_CLAIM_POLL_INTERVAL_MS,
        ))
    }

    fn get_kiosk_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.get_u64_or(&["kiosk", "retry_backoff_ms"], DEFAULT_RETRY_BACKOFF_MS))
    }

    fn get_kiosk_initial_volume(&self) -> f32 {
        self.get_f64_or(&["kiosk", "initial_volume"], DEFAULT_INITIAL_VOLUME)
            .clamp(0.0, 1.0) as f32
    }

    fn get_kiosk_player_backend(&self) -> String {
        self.get_string_or(&["kiosk", "player", "backend"], DEFAULT_PLAYER_BACKEND)
            .to_ascii_lowercase()
    }

    fn get_kiosk_player_command(&self) -> String {
        self.get_string_or(&["kiosk", "player", "command"], DEFAULT_PLAYER_COMMAND)
    }
}
