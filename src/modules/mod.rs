//! Behavior modules and the list the registry is built from

pub mod dummy;
pub mod media;
pub mod mouse;
pub mod remote;

use crate::mapping::{Module, ModuleRegistry};
use crate::output::{KeyboardSink, MouseSink};
use crate::persistence::{AppConfig, ModulesFile};
use dummy::Dummy;
use media::Media;
use mouse::Mouse;
use remote::{NetworkHelper, Remote, RemoteClientFactory};
use std::sync::Arc;
use tracing::{error, info};

/// Everything a module constructor may draw from
#[derive(Clone)]
pub struct ModuleContext {
    pub keyboard: Arc<dyn KeyboardSink>,
    pub mouse: Arc<dyn MouseSink>,
    pub configs: ModulesFile,
    pub remote_factory: Arc<dyn RemoteClientFactory>,
    pub network: Arc<dyn NetworkHelper>,
}

pub type ModuleConstructor = fn(&ModuleContext) -> Box<dyn Module>;

fn new_media(ctx: &ModuleContext) -> Box<dyn Module> {
    Box::new(Media::new(ctx.keyboard.clone(), &ctx.configs.module(Media::NAME)))
}

fn new_remote(ctx: &ModuleContext) -> Box<dyn Module> {
    Box::new(Remote::new(
        &ctx.configs.module(Remote::NAME),
        ctx.remote_factory.clone(),
        ctx.network.clone(),
    ))
}

fn new_mouse(ctx: &ModuleContext) -> Box<dyn Module> {
    Box::new(Mouse::new(
        ctx.keyboard.clone(),
        ctx.mouse.clone(),
        &ctx.configs.module(Mouse::NAME),
    ))
}

/// Available modules in cycling order, after the placeholder
pub const AVAILABLE_MODULES: [(&str, ModuleConstructor); 3] = [
    (Media::NAME, new_media),
    (Remote::NAME, new_remote),
    (Mouse::NAME, new_mouse),
];

/// Builds the registry: the placeholder first, then every module that is not blacklisted
pub fn build_registry(config: &AppConfig, context: &ModuleContext) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new(Box::new(Dummy::new()));
    for (name, construct) in AVAILABLE_MODULES {
        if config.is_blacklisted(name) {
            info!("module: skipping blacklisted '{}'", name);
            continue;
        }
        match registry.register(construct(context)) {
            Ok(index) => info!("module: registered '{}' at position {}", name, index),
            Err(e) => error!("module: {}", e),
        }
    }
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::remote::testing::{FakeFactory, FakeNetwork, FakeTv};
    use crate::output::testing::{RecordingKeyboard, RecordingMouse};

    fn context() -> ModuleContext {
        let tv = FakeTv::default();
        ModuleContext {
            keyboard: Arc::new(RecordingKeyboard::default()),
            mouse: Arc::new(RecordingMouse::default()),
            configs: ModulesFile::default(),
            remote_factory: Arc::new(FakeFactory(tv.clone())),
            network: Arc::new(FakeNetwork::new(tv, None)),
        }
    }

    #[test]
    fn registry_keeps_declaration_order() {
        let registry = build_registry(&AppConfig::default(), &context());
        assert_eq!(registry.names(), vec!["dummy", "media", "remote", "mouse"]);
        assert!(registry.get(0).unwrap().is_placeholder());
    }

    #[test]
    fn blacklisted_modules_are_not_registered() {
        let mut config = AppConfig::default();
        config.modules.blacklisted = vec!["remote".to_string()];
        let registry = build_registry(&config, &context());
        assert_eq!(registry.names(), vec!["dummy", "media", "mouse"]);
    }
}
