//! Backend seam used by the kiosk controller.
//!
//! The controller never talks to `reqwest` directly: everything goes through
//! [`KioskBackend`], implemented for [`TapToneApi`] and replaced by an
//! in-memory fake in tests.

use async_trait::async_trait;
use ttclient::{ClaimCode, Device, DeviceCommand, Playlist, Result, Song, TapToneApi};

#[async_trait]
pub trait KioskBackend: Send + Sync {
    async fn register_device(&self, device_id: &str) -> Result<Device>;
    async fn request_claim_code(&self, device_id: &str) -> Result<ClaimCode>;
    async fn whoami(&self, device_id: &str) -> Result<Device>;
    async fn heartbeat(&self, device_id: &str) -> Result<()>;
    async fn pending_commands(&self, device_id: &str) -> Result<Vec<DeviceCommand>>;
    async fn ack_command(&self, command_id: &str) -> Result<()>;
    async fn get_playlist(&self, playlist_id: &str) -> Result<Playlist>;
    async fn replace_playlist_songs(&self, playlist_id: &str, song_ids: &[String]) -> Result<()>;
    async fn recommendations(
        &self,
        device_id: &str,
        genre: &str,
        exclude_ids: &[String],
    ) -> Result<Vec<Song>>;

    /// Playback source for a song.
    fn stream_url(&self, song_id: &str) -> String;
}

#[async_trait]
impl KioskBackend for TapToneApi {
    async fn register_device(&self, device_id: &str) -> Result<Device> {
        TapToneApi::register_device(self, device_id).await
    }

    async fn request_claim_code(&self, device_id: &str) -> Result<ClaimCode> {
        TapToneApi::request_claim_code(self, device_id).await
    }

    async fn whoami(&self, device_id: &str) -> Result<Device> {
        TapToneApi::whoami(self, device_id).await
    }

    async fn heartbeat(&self, device_id: &str) -> Result<()> {
        TapToneApi::heartbeat(self, device_id).await
    }

    async fn pending_commands(&self, device_id: &str) -> Result<Vec<DeviceCommand>> {
        TapToneApi::pending_commands(self, device_id).await
    }

    async fn ack_command(&self, command_id: &str) -> Result<()> {
        TapToneApi::ack_command(self, command_id).await
    }

    async fn get_playlist(&self, playlist_id: &str) -> Result<Playlist> {
        TapToneApi::get_playlist(self, playlist_id).await
    }

    async fn replace_playlist_songs(&self, playlist_id: &str, song_ids: &[String]) -> Result<()> {
        TapToneApi::replace_playlist_songs(self, playlist_id, song_ids).await
    }

    async fn recommendations(
        &self,
        device_id: &str,
        genre: &str,
        exclude_ids: &[String],
    ) -> Result<Vec<Song>> {
        TapToneApi::recommendations(self, device_id, genre, exclude_ids).await
    }

    fn stream_url(&self, song_id: &str) -> String {
        TapToneApi::stream_url(self, song_id)
    }
}
