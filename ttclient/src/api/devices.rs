//! Cycle de vie du kiosque : enregistrement, appairage, heartbeat, commandes

use super::TapToneApi;
use crate::error::Result;
use crate::models::{ClaimCode, Device, DeviceCommand};
use tracing::debug;

impl TapToneApi {
    /// Enregistre (ou ré-enregistre) le kiosque ; l'appel est idempotent
    pub async fn register_device(&self, device_id: &str) -> Result<Device> {
        debug!(device_id, "Registering device");
        self.post("/api/v1/devices/register", &[("device_id", device_id)])
            .await
    }

    /// Demande un code d'appairage à afficher
    pub async fn request_claim_code(&self, device_id: &str) -> Result<ClaimCode> {
        debug!(device_id, "Requesting claim code");
        self.post("/api/v1/devices/claim-request", &[("device_id", device_id)])
            .await
    }

    /// Relit l'enregistrement du kiosque (statut d'appairage)
    pub async fn whoami(&self, device_id: &str) -> Result<Device> {
        self.get("/api/v1/devices/me", &[("device_id", device_id)])
            .await
    }

    /// Signal de vie
    pub async fn heartbeat(&self, device_id: &str) -> Result<()> {
        self.post_unit("/api/v1/devices/heartbeat", &[("device_id", device_id)])
            .await
    }

    /// Commandes en attente, dans l'ordre de livraison
    pub async fn pending_commands(&self, device_id: &str) -> Result<Vec<DeviceCommand>> {
        self.get(&format!("/api/v1/devices/{}/commands", device_id), &[])
            .await
    }

    /// Acquitte une commande
    pub async fn ack_command(&self, command_id: &str) -> Result<()> {
        debug!(command_id, "Acknowledging command");
        self.post_unit(&format!("/api/v1/devices/commands/{}/ack", command_id), &[])
            .await
    }
}
