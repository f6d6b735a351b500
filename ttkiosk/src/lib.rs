//! Kiosk side of TapTone: pairing, remote command loop and autoplay.
//!
//! [`KioskController`] owns the session. It talks to the backend through
//! [`KioskBackend`], plays through an [`AudioOutput`] and publishes
//! [`KioskEvent`]s for whatever renders the kiosk screen.

mod events;

pub mod backend;
pub mod command;
pub mod config_ext;
pub mod controller;
pub mod errors;
pub mod output;
pub mod queue;
pub mod scheduler;
pub mod store;

pub use backend::KioskBackend;
pub use command::{KioskCommand, VOLUME_STEP, apply_volume_delta, parse_payload};
pub use config_ext::KioskConfigExt;
pub use controller::{
    KioskController, KioskHandle, KioskSettings, KioskSnapshot, LocalAction, SessionState,
};
pub use errors::{KioskError, Result};
pub use events::{KioskEvent, KioskEventBus};
pub use output::{AudioOutput, NullOutput, NullOutputHandle, OutputEvent, ProcessOutput};
pub use queue::{Advance, PlayQueue, QueueEntry, merge_song_ids};
pub use scheduler::{Scheduler, TokioScheduler};
pub use store::{KioskStore, MemoryStore};
