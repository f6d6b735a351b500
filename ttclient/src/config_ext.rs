//! Extension pour intégrer la configuration du backend dans ttconfig
//!
//! Ce module fournit le trait `ClientConfigExt` qui ajoute à
//! `ttconfig::Config` les réglages de connexion au backend TapTone.

use anyhow::Result;
use std::time::Duration;
use ttconfig::Config;

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Trait d'extension pour la connexion au backend
///
/// # Exemple
///
/// ```rust,ignore
/// use ttconfig::get_config;
/// use ttclient::ClientConfigExt;
///
/// let config = get_config();
/// println!("Backend: {}", config.get_api_url());
/// ```
pub trait ClientConfigExt {
    /// URL de base du backend (`host.api_url`)
    fn get_api_url(&self) -> String;

    /// Définit l'URL de base du backend
    fn set_api_url(&self, url: &str) -> Result<()>;

    /// Timeout des requêtes HTTP (`host.http_timeout_secs`)
    fn get_http_timeout(&self) -> Duration;

    /// Token porteur optionnel (`host.api_token`), `None` si vide
    fn get_api_token(&self) -> Option<String>;
}

impl ClientConfigExt for Config {
    fn get_api_url(&self) -> String {
        self.get_string_or(&["host", "api_url"], DEFAULT_API_URL)
    }

    fn set_api_url(&self, url: &str) -> Result<()> {
        self.set_string(&["host", "api_url"], url)
    }

    fn get_http_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64_or(&["host", "http_timeout_secs"], DEFAULT_HTTP_TIMEOUT_SECS))
    }

    fn get_api_token(&self) -> Option<String> {
        let token = self.get_string_or(&["host", "api_token"], "");
        if token.is_empty() { None } else { Some(token) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        assert_eq!(config.get_api_url(), "http://localhost:8000");
        assert_eq!(config.get_http_timeout(), Duration::from_secs(30));
        assert!(config.get_api_token().is_none());

        config.set_api_url("https://taptone.example").unwrap();
        assert_eq!(config.get_api_url(), "https://taptone.example");
    }
}
