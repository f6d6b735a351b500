//! Minimal text rendering of the kiosk screen.

use std::io::Write;

use crossbeam_channel::Receiver;
use ttkiosk::{KioskEvent, SessionState};

pub fn describe(event: &KioskEvent) -> Option<String> {
    let line = match event {
        KioskEvent::StateChanged(SessionState::Unstarted) => return None,
        KioskEvent::StateChanged(SessionState::Registering) => "Connecting to TapTone...".to_string(),
        KioskEvent::StateChanged(SessionState::AwaitingClaim) => "This kiosk is not linked yet".to_string(),
        KioskEvent::StateChanged(SessionState::Active) => "✅ Kiosk ready".to_string(),
        KioskEvent::ClaimCode(Some(code)) => {
            format!("🔗 Link this kiosk from your account with code: {code}")
        }
        KioskEvent::ClaimCode(None) => "🔗 Kiosk linked".to_string(),
        KioskEvent::PlaylistLoaded { name, len, .. } => {
            format!("📀 Playlist \"{name}\" ({len} songs)")
        }
        KioskEvent::NowPlaying {
            song, discovery, ..
        } => {
            let tag = if *discovery { " [discovery]" } else { "" };
            format!("♪ {} - {}{tag}", song.title, song.artist)
        }
        KioskEvent::PlaybackChanged { playing: true } => "▶ Playing".to_string(),
        KioskEvent::PlaybackChanged { playing: false } => "⏸ Paused".to_string(),
        KioskEvent::VolumeChanged(volume) => {
            format!("🔊 Volume {}%", (volume * 100.0).round() as u32)
        }
        KioskEvent::LoopChanged(enabled) => {
            format!("🔁 Loop {}", if *enabled { "on" } else { "off" })
        }
        KioskEvent::DiscoveriesAdded(count) => format!("✨ {count} discovery song(s) added"),
        KioskEvent::DiscoveriesPromoted(ids) => {
            format!("💾 {} song(s) saved to the playlist", ids.len())
        }
        KioskEvent::Heartbeat(_) => return None,
    };
    Some(line)
}

/// Prints events until the controller drops the bus.
pub fn run(events: Receiver<KioskEvent>) {
    let mut stdout = std::io::stdout();
    for event in events.iter() {
        if let Some(line) = describe(&event) {
            let _ = writeln!(stdout, "{line}");
        }
    }
}
