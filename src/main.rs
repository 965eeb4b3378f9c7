use color_eyre::{eyre::eyre, Result};
use joymapper::controller::{ControllerHandle, ControllerSettings, HapticsQueue};
use joymapper::mapping::{ChordSpec, InputRouter, RouterSettings};
use joymapper::modules::remote::{webos::WebOsFactory, SystemNetwork};
use joymapper::modules::{build_registry, ModuleContext};
use joymapper::output::uinput::VirtualInput;
use joymapper::persistence::{AppConfig, ConfigError, ModulesFile};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const LOG_ENV_VAR: &str = "JOYMAPPER_LOG";
const DEVICE_NAME: &str = "joymapper virtual input";

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let config_path = AppConfig::default_path();
    let (config, config_error) = match AppConfig::load(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    setup_logging(config.quiet);
    match config_error {
        None => info!("Loaded config from '{}'", config_path.display()),
        Some(e) => warn!("{}, using defaults", e),
    }

    let configs = match ModulesFile::load(&config.modules.config) {
        Ok(configs) => configs,
        Err(ConfigError::Missing(path)) => {
            info!("No module config at '{}', using defaults", path.display());
            ModulesFile::default()
        }
        Err(e) => {
            warn!("{}, using module defaults", e);
            ModulesFile::default()
        }
    };

    let device = Arc::new(
        VirtualInput::new(DEVICE_NAME).map_err(|e| eyre!("Failed to open uinput: {}", e))?,
    );
    let context = ModuleContext {
        keyboard: device.clone(),
        mouse: device,
        configs,
        remote_factory: Arc::new(WebOsFactory),
        network: Arc::new(SystemNetwork::new()),
    };
    let registry = build_registry(&config, &context);

    let settings = RouterSettings {
        switch_shortcut: ChordSpec::new(config.switch_shortcut.iter().copied()),
        ignore_multiple_buttons: config.ignore_multiple_buttons,
        skip_placeholder_on_cycle: config.modules.skip_dummy_cycle,
        haptic_feedback: config.haptic_feedback,
    };
    let (haptics, rumble_queue) = HapticsQueue::channel();
    let mut router = InputRouter::new(registry, settings, Box::new(haptics));
    if !router.activate(&config.modules.initial) {
        warn!(
            "Initial module '{}' is not available, staying on '{}'",
            config.modules.initial,
            router.current_module()
        );
    }

    let cancel = CancellationToken::new();
    let controller = ControllerHandle::spawn(
        router,
        rumble_queue,
        ControllerSettings::default(),
        cancel.clone(),
    )
    .map_err(|e| eyre!("Failed to spawn controller: {}", e))?;

    info!("Running, press Ctrl-C to exit");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    cancel.cancel();

    tokio::task::spawn_blocking(move || controller.stop())
        .await?
        .map_err(|e| eyre!("Controller did not stop cleanly: {}", e))?;
    Ok(())
}

fn setup_logging(quiet: bool) {
    let level = match std::env::var(LOG_ENV_VAR).as_deref() {
        Ok("trace") => Level::TRACE,
        Ok("debug") => Level::DEBUG,
        _ if quiet => Level::WARN,
        _ => Level::INFO,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
