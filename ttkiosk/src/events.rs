use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, unbounded};
use ttclient::Song;

use crate::controller::SessionState;

/// Notifications published by the kiosk controller.
#[derive(Clone, Debug, PartialEq)]
pub enum KioskEvent {
    StateChanged(SessionState),
    /// Claim code to display, `None` once the device has been claimed.
    ClaimCode(Option<String>),
    PlaylistLoaded {
        playlist_id: String,
        name: String,
        len: usize,
    },
    NowPlaying {
        index: usize,
        song: Song,
        discovery: bool,
    },
    PlaybackChanged {
        playing: bool,
    },
    VolumeChanged(f32),
    LoopChanged(bool),
    DiscoveriesAdded(usize),
    DiscoveriesPromoted(Vec<String>),
    Heartbeat(DateTime<Utc>),
}

#[derive(Clone, Default)]
pub struct KioskEventBus {
    subscribers: Arc<Mutex<Vec<Sender<KioskEvent>>>>,
}

impl KioskEventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Each subscriber receives all future events independently.
    pub fn subscribe(&self) -> Receiver<KioskEvent> {
        let (tx, rx) = unbounded::<KioskEvent>();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    pub(crate) fn broadcast(&self, event: KioskEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
