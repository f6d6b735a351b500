//! Keyboard controls read from stdin.

use std::io::BufRead;

use tokio::sync::oneshot;
use tracing::debug;
use ttkiosk::{KioskHandle, LocalAction};

/// Maps one input line to local actions, one per recognised key.
///
/// `p` play/pause, `n` next, `b` previous, `+`/`-` volume, `l` loop,
/// `s` save the current discovery song, `S` save all of them.
pub fn parse_line(line: &str) -> Vec<LocalAction> {
    line.chars()
        .filter_map(|c| match c {
            'p' | 'P' => Some(LocalAction::TogglePlay),
            'n' | 'N' => Some(LocalAction::Next),
            'b' | 'B' => Some(LocalAction::Prev),
            '+' | '=' => Some(LocalAction::Volume(1.0)),
            '-' | '_' => Some(LocalAction::Volume(-1.0)),
            'l' | 'L' => Some(LocalAction::ToggleLoop),
            's' => Some(LocalAction::PromoteCurrent),
            'S' => Some(LocalAction::PromoteAll),
            _ => None,
        })
        .collect()
}

/// The first line is the start gesture when `gesture` is set.
pub fn read_stdin(handle: KioskHandle, mut gesture: Option<oneshot::Sender<()>>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };

        if let Some(tx) = gesture.take() {
            let _ = tx.send(());
            continue;
        }

        for action in parse_line(line.trim()) {
            if !handle.send(action) {
                debug!("Kiosk controller gone, stopping controls");
                return;
            }
        }
    }
}
