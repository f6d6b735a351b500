//! Remote commands queued by the backend for this kiosk.

use serde_json::{Map, Value};
use tracing::warn;
use ttclient::DeviceCommand;

/// Step applied to the volume for each unit of `VOLUME_DELTA`.
pub const VOLUME_STEP: f32 = 0.05;

/// A parsed remote command.
#[derive(Clone, Debug, PartialEq)]
pub enum KioskCommand {
    LoadPlaylist { playlist_id: String },
    PlayPause,
    Next,
    Prev,
    VolumeDelta { delta: f64 },
    /// Unknown type or a payload missing a required field.
    Ignored { command_type: String, reason: String },
}

impl KioskCommand {
    pub fn parse(command: &DeviceCommand) -> Self {
        let payload = parse_payload(command);
        let command_type = command.command_type.as_str();

        match command_type {
            "LOAD_PLAYLIST" => match payload.get("playlist_id").and_then(id_field) {
                Some(playlist_id) => KioskCommand::LoadPlaylist { playlist_id },
                None => KioskCommand::ignored(command_type, "missing playlist_id"),
            },
            "PLAY_PAUSE" => KioskCommand::PlayPause,
            "NEXT" => KioskCommand::Next,
            "PREV" => KioskCommand::Prev,
            "VOLUME_DELTA" => match payload.get("delta").and_then(number_field) {
                Some(delta) => KioskCommand::VolumeDelta { delta },
                None => KioskCommand::ignored(command_type, "missing delta"),
            },
            _ => KioskCommand::ignored(command_type, "unknown command type"),
        }
    }

    fn ignored(command_type: &str, reason: &str) -> Self {
        KioskCommand::Ignored {
            command_type: command_type.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Decodes the opaque payload into a record.
///
/// The backend stores payloads as JSON-encoded strings; structured objects
/// are accepted as well. Absent, `null` or unreadable payloads give the
/// empty record.
pub fn parse_payload(command: &DeviceCommand) -> Map<String, Value> {
    let value = match &command.payload {
        None | Some(Value::Null) => return Map::new(),
        Some(Value::String(raw)) if raw.trim().is_empty() => return Map::new(),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(command_id = %command.id, error = %err, "Unreadable command payload");
                return Map::new();
            }
        },
        Some(other) => other.clone(),
    };

    match value {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            warn!(command_id = %command.id, payload = %other, "Command payload is not a record");
            Map::new()
        }
    }
}

fn id_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_field(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `current + delta * VOLUME_STEP`, clamped to [0, 1].
pub fn apply_volume_delta(current: f32, delta: f64) -> f32 {
    let raw = current as f64 + delta * VOLUME_STEP as f64;
    if raw.is_nan() {
        return current.clamp(0.0, 1.0);
    }
    raw.clamp(0.0, 1.0) as f32
}
