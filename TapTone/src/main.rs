mod controls;
mod render;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ttclient::TapToneApi;
use ttconfig::{Config, get_config};
use ttkiosk::{
    AudioOutput, KioskConfigExt, KioskController, KioskSettings, NullOutput, ProcessOutput,
};

/// `RUST_LOG` wins over `host.logger.min_level`.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_min_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

fn build_output(config: &Config) -> Box<dyn AudioOutput> {
    match config.get_kiosk_player_backend().as_str() {
        "null" => {
            info!("🔇 Using headless audio output");
            Box::new(NullOutput::new())
        }
        backend => {
            if backend != "process" {
                warn!(backend, "⚠️ Unknown player backend, using process output");
            }
            let output = ProcessOutput::new(&config.get_kiosk_player_command());
            info!(program = output.program(), "🔊 Using external player");
            Box::new(output)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = get_config();
    init_logging(&config);

    // ========== PHASE 1 : Backend, audio et état local ==========

    info!(config_dir = config.dir(), "🎵 Starting TapTone kiosk...");

    let api = TapToneApi::from_config(&config)?;
    let output = build_output(&config);
    let settings = KioskSettings::from_config(&config);
    let controller = KioskController::new(Arc::new(api), output, config.clone(), settings)?;

    info!(device_id = controller.device_id(), "✅ Kiosk identity ready");

    // ========== PHASE 2 : Écran et commandes locales ==========

    let events = controller.subscribe();
    std::thread::Builder::new()
        .name("taptone-render".to_string())
        .spawn(move || render::run(events))?;

    let (gesture_tx, gesture_rx) = oneshot::channel::<()>();
    let gesture = if config.get_kiosk_require_gesture() {
        println!("Press Enter to start the kiosk");
        Some(gesture_tx)
    } else {
        let _ = gesture_tx.send(());
        None
    };

    // Stdin reads block; a plain thread keeps them out of the runtime.
    let handle = controller.handle();
    std::thread::Builder::new()
        .name("taptone-controls".to_string())
        .spawn(move || controls::read_stdin(handle, gesture))?;

    // ========== PHASE 3 : Boucle du kiosque ==========

    let mut kiosk = tokio::spawn(controller.run(async move {
        let _ = gesture_rx.await;
    }));

    info!("Press Ctrl+C to stop...");
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("🛑 Stopping TapTone kiosk");
        }
        result = &mut kiosk => {
            if let Err(e) = result {
                warn!(error = %e, "Kiosk task ended unexpectedly");
            }
        }
    }
    kiosk.abort();

    Ok(())
}
