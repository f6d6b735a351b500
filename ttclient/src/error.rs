//! Gestion des erreurs pour le client TapTone

use thiserror::Error;

/// Type Result personnalisé pour ttclient
pub type Result<T> = std::result::Result<T, TapToneError>;

/// Erreurs possibles lors des appels au backend TapTone
#[derive(Error, Debug)]
pub enum TapToneError {
    /// Erreur d'authentification (token absent ou refusé)
    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    /// Ressource non trouvée (device, playlist, commande...)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Erreur HTTP (connexion, timeout, TLS...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Erreur de parsing JSON
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Erreur de configuration (anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Réponse d'erreur du backend
    #[error("TapTone API error (code {code}): {message}")]
    ApiError { code: u16, message: String },

    /// Quota dépassé (rate limiting)
    #[error("Rate limit exceeded, please try again later")]
    RateLimitExceeded,
}

impl TapToneError {
    /// Crée une erreur API depuis un code de statut HTTP et un message
    pub fn from_status_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            401 | 403 => Self::Unauthorized(message.into()),
            404 => Self::NotFound(message.into()),
            429 => Self::RateLimitExceeded,
            _ => Self::ApiError {
                code,
                message: message.into(),
            },
        }
    }

    /// Vérifie si l'erreur est une erreur d'authentification
    pub fn is_auth_error(&self) -> bool {
        matches!(self, TapToneError::Unauthorized(_))
    }

    /// Vérifie si l'erreur vaut la peine d'être réessayée au prochain tick
    ///
    /// Les erreurs réseau, 5xx et 429 sont transitoires ; un payload
    /// illisible ou une 404 ne changeront pas d'un appel à l'autre.
    pub fn is_transient(&self) -> bool {
        match self {
            TapToneError::Http(_) | TapToneError::RateLimitExceeded => true,
            TapToneError::ApiError { code, .. } => *code >= 500,
            _ => false,
        }
    }
}
