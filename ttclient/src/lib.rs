//! # ttclient - Client REST pour le backend TapTone
//!
//! Ce crate expose les appels HTTP consommés par le kiosque :
//!
//! - enregistrement et appairage du kiosque (code de réclamation)
//! - heartbeat, récupération et acquittement des commandes
//! - playlists, recommandations et URL de streaming
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use ttclient::TapToneApi;
//!
//! # tokio_test::block_on(async {
//! let api = TapToneApi::new("http://localhost:8000")?;
//! let device = api.register_device("3f1c...").await?;
//! println!("linked: {}", device.is_linked());
//! # Ok::<(), ttclient::TapToneError>(())
//! # }).unwrap();
//! ```

pub mod api;
pub mod config_ext;
pub mod error;
pub mod models;

pub use api::TapToneApi;
pub use config_ext::ClientConfigExt;
pub use error::{Result, TapToneError};
pub use models::{ClaimCode, Device, DeviceCommand, Playlist, Song};

use tracing::info;
use ttconfig::Config;

impl TapToneApi {
    /// Crée un client depuis un objet Config spécifique
    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config.get_api_url();
        info!(api_url = %url, "Creating TapTone API client");

        let mut api = Self::with_timeout(url, config.get_http_timeout())?;
        if let Some(token) = config.get_api_token() {
            api.set_token(token);
        }
        Ok(api)
    }
}
