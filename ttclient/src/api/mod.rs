//! Couche d'accès à l'API REST TapTone
//!
//! Ce module fournit le client HTTP bas-niveau ; les appels eux-mêmes sont
//! répartis entre [`devices`] (cycle de vie du kiosque) et [`catalog`]
//! (playlists, recommandations, streaming).

pub mod catalog;
pub mod devices;

use crate::error::{Result, TapToneError};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout HTTP par défaut
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client API bas-niveau pour communiquer avec le backend TapTone
#[derive(Clone, Debug)]
pub struct TapToneApi {
    /// Client HTTP
    client: Client,
    /// URL de base, sans `/` final
    base_url: String,
    /// Token porteur optionnel
    token: Option<String>,
}

impl TapToneApi {
    /// Crée une nouvelle instance de l'API
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Crée une instance avec un timeout HTTP spécifique
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("TapTone-Kiosk/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    /// Définit le token d'authentification
    pub fn set_token(&mut self, token: impl Into<String>) {
        let token = token.into();
        self.token = if token.is_empty() { None } else { Some(token) };
    }

    /// Retourne l'URL de base
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Retourne le token si disponible
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn builder(&self, method: Method, endpoint: &str, params: &[(&str, &str)]) -> RequestBuilder {
        let url = self.url(endpoint);
        debug!("{} {} with {} params", method, url, params.len());

        let mut request = self.client.request(method, &url);
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        if !params.is_empty() {
            request = request.query(params);
        }
        request
    }

    /// Effectue une requête GET et décode la réponse JSON
    pub(crate) async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let response = self.builder(Method::GET, endpoint, params).send().await?;
        Self::decode(Self::check(response).await?).await
    }

    /// Effectue une requête POST sans corps et décode la réponse JSON
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let response = self.builder(Method::POST, endpoint, params).send().await?;
        Self::decode(Self::check(response).await?).await
    }

    /// Effectue une requête POST dont la réponse est ignorée
    pub(crate) async fn post_unit(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<()> {
        let response = self.builder(Method::POST, endpoint, params).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Effectue une requête PUT avec un corps JSON ; la réponse est ignorée
    pub(crate) async fn put_json<B: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<()> {
        let response = self
            .builder(Method::PUT, endpoint, &[])
            .json(body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Vérifie le statut HTTP
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        debug!("Response status: {}", status);

        if !status.is_success() {
            let code = status.as_u16();
            let error_text = response.text().await.unwrap_or_default();
            warn!("API error ({}): {}", code, error_text);
            return Err(TapToneError::from_status_code(code, error_text));
        }
        Ok(response)
    }

    /// Parse le corps de la réponse
    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!("Failed to parse response: {}", e);
            TapToneError::JsonParse(e)
        })
    }
}
