use std::sync::Mutex;

use anyhow::Result;
use ttconfig::Config;

use crate::config_ext::KioskConfigExt;

/// Durable client-local state: the device identity and the loop flag.
pub trait KioskStore: Send + Sync {
    /// Stable identity, created on first call.
    fn device_id(&self) -> Result<String>;
    fn loop_enabled(&self) -> bool;
    fn set_loop_enabled(&self, enabled: bool) -> Result<()>;
}

impl KioskStore for Config {
    fn device_id(&self) -> Result<String> {
        self.get_device_id()
    }

    fn loop_enabled(&self) -> bool {
        self.get_kiosk_loop()
    }

    fn set_loop_enabled(&self, enabled: bool) -> Result<()> {
        self.set_kiosk_loop(enabled)
    }
}

/// Non-durable store, for headless runs and tests.
#[derive(Debug)]
pub struct MemoryStore {
    device_id: String,
    loop_enabled: Mutex<bool>,
}

impl MemoryStore {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            loop_enabled: Mutex::new(false),
        }
    }

    pub fn with_loop(self, enabled: bool) -> Self {
        if let Ok(mut flag) = self.loop_enabled.lock() {
            *flag = enabled;
        }
        self
    }
}

impl KioskStore for MemoryStore {
    fn device_id(&self) -> Result<String> {
        Ok(self.device_id.clone())
    }

    fn loop_enabled(&self) -> bool {
        self.loop_enabled.lock().map(|flag| *flag).unwrap_or(false)
    }

    fn set_loop_enabled(&self, enabled: bool) -> Result<()> {
        let mut flag = self
            .loop_enabled
            .lock()
            .map_err(|_| anyhow::anyhow!("loop flag lock poisoned"))?;
        *flag = enabled;
        Ok(())
    }
}
