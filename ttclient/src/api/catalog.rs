//! Module d'accès au catalogue : playlists, recommandations, streaming

use super::TapToneApi;
use crate::error::Result;
use crate::models::{Playlist, Song, id_to_json};
use serde_json::Value;
use tracing::debug;

impl TapToneApi {
    /// Récupère une playlist et ses morceaux
    pub async fn get_playlist(&self, playlist_id: &str) -> Result<Playlist> {
        debug!(playlist_id, "Fetching playlist");
        self.get(&format!("/playlists/{}", playlist_id), &[]).await
    }

    /// Remplace la liste ordonnée des morceaux d'une playlist
    pub async fn replace_playlist_songs(&self, playlist_id: &str, song_ids: &[String]) -> Result<()> {
        debug!(playlist_id, count = song_ids.len(), "Replacing playlist songs");
        let body: Vec<Value> = song_ids.iter().map(|id| id_to_json(id)).collect();
        self.put_json(&format!("/playlists/{}/songs", playlist_id), &body)
            .await
    }

    /// Recommandations pour un genre, hors morceaux déjà présents
    ///
    /// `exclude_ids` est transmis séparé par des virgules.
    pub async fn recommendations(
        &self,
        device_id: &str,
        genre: &str,
        exclude_ids: &[String],
    ) -> Result<Vec<Song>> {
        let exclude = exclude_ids.join(",");
        debug!(genre, excluded = exclude_ids.len(), "Fetching recommendations");
        self.get(
            "/api/v1/recommendations",
            &[
                ("device_id", device_id),
                ("genre", genre),
                ("exclude_ids", exclude.as_str()),
            ],
        )
        .await
    }

    /// URL de streaming d'un morceau, utilisée comme source de lecture
    pub fn stream_url(&self, song_id: &str) -> String {
        format!("{}/stream/{}", self.base_url(), song_id)
    }
}
