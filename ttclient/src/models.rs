//! Structures de données pour représenter les objets du backend TapTone

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Désérialiseur flexible pour les IDs qui peuvent être des strings ou des integers
pub(crate) fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(Error::custom("ID must be a string or number")),
    }
}

/// Variante optionnelle de [`deserialize_id`] (`null` ou absent → `None`)
pub(crate) fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(Error::custom("ID must be a string, number or null")),
    }
}

/// Convertit un ID en valeur JSON, numérique quand c'est possible
///
/// Le backend attend des entiers pour les IDs de morceaux.
pub fn id_to_json(id: &str) -> Value {
    match id.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::String(id.to_string()),
    }
}

/// Représente un morceau du catalogue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Song {
    /// Identifiant unique du morceau
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Titre du morceau
    pub title: String,
    /// Artiste
    #[serde(default)]
    pub artist: String,
    /// Genre, utilisé pour les recommandations
    #[serde(default)]
    pub genre: String,
    /// URL de la pochette
    #[serde(default)]
    pub image_url: Option<String>,
    /// Prix en boutique
    #[serde(default)]
    pub price: Option<f64>,
}

/// Représente une playlist et ses morceaux ordonnés
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Playlist {
    /// Identifiant unique de la playlist
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Nom de la playlist
    #[serde(default)]
    pub name: String,
    /// Propriétaire
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub user_id: Option<String>,
    /// Morceaux dans l'ordre de lecture
    #[serde(default)]
    pub songs: Vec<Song>,
}

impl Playlist {
    /// IDs des morceaux, dans l'ordre
    pub fn song_ids(&self) -> Vec<String> {
        self.songs.iter().map(|s| s.id.clone()).collect()
    }
}

/// Horodatage souple : secondes Unix (entier ou flottant) ou chaîne RFC 3339
///
/// Toute autre forme est ignorée plutôt que de faire échouer le décodage.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().and_then(|secs| {
            let whole = secs.trunc();
            let nanos = ((secs - whole) * 1e9).round() as u32;
            DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
        }),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    })
}

/// Enregistrement brut renvoyé par le backend
///
/// La table `devices` est indexée par `id` (l'identité du kiosque) ; certaines
/// réponses ajoutent `device_id`.
#[derive(Deserialize)]
struct DeviceRecord {
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    device_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    account_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    last_seen: Option<DateTime<Utc>>,
}

impl From<DeviceRecord> for Device {
    fn from(record: DeviceRecord) -> Self {
        let device_id = record
            .device_id
            .or_else(|| record.id.clone())
            .unwrap_or_default();
        Self {
            device_id,
            account_id: record.account_id,
            id: record.id,
            name: record.name,
            is_active: record.is_active,
            last_seen: record.last_seen,
        }
    }
}

/// Enregistrement d'un kiosque côté serveur
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "DeviceRecord")]
pub struct Device {
    /// Identité du kiosque (`device_id`, à défaut `id`)
    pub device_id: String,
    /// Compte lié, absent tant que le kiosque n'est pas réclamé
    pub account_id: Option<String>,
    /// Clé primaire côté serveur
    pub id: Option<String>,
    /// Nom donné par l'utilisateur
    pub name: Option<String>,
    pub is_active: Option<bool>,
    /// Dernier heartbeat reçu par le serveur
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// Le kiosque est-il lié à un compte ?
    pub fn is_linked(&self) -> bool {
        self.account_id.is_some()
    }
}

/// Code d'appairage affiché sur le kiosque
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClaimCode {
    pub code: String,
}

/// Commande mise en file par le serveur pour un kiosque
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceCommand {
    /// Identifiant utilisé pour l'acquittement
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Type de commande (`LOAD_PLAYLIST`, `PLAY_PAUSE`, ...)
    pub command_type: String,
    /// Payload opaque : chaîne JSON encodée ou objet JSON
    #[serde(default)]
    pub payload: Option<Value>,
}

impl DeviceCommand {
    pub fn new(id: impl Into<String>, command_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command_type: command_type.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}
