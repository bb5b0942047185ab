use std::sync::Arc;

use serde_json::json;

use crate::extras::{self, KapuchinSentinel};
use crate::host::config::{ConfigFile, PRINTER_CONFIG_CLASS};
use crate::kernel::bootstrap::Application;
use crate::kernel::constants::KAPUCHIN_SECTION;
use crate::kernel::settings::KapuchinSettings;
use crate::patching::registry::PatchRegistry;
use crate::plugin_system::error::PluginSystemError;

use super::common::{config_with, test_app};

#[test]
fn test_install_is_idempotent() {
    let app = Application::new();
    let registry: &'static PatchRegistry = Box::leak(Box::new(PatchRegistry::new()));
    let class = app.printer().class(PRINTER_CONFIG_CLASS).unwrap();

    assert!(!extras::is_installed(&class, registry));
    assert!(extras::install(app.printer(), registry, KAPUCHIN_SECTION).unwrap());
    assert!(extras::is_installed(&class, registry));
    assert!(!extras::install(app.printer(), registry, KAPUCHIN_SECTION).unwrap());
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_manager_requires_activation() {
    let mut app = Application::new();
    app.start(ConfigFile::parse(super::common::PRINTER_CFG).unwrap()).unwrap();
    assert!(matches!(extras::manager(app.printer()), Err(PluginSystemError::NotActivated(_))));
}

#[test]
fn test_sentinel_reports_settings() {
    let mut t = test_app(KapuchinSettings::default());
    let text = config_with("").replace("[kapuchin]\n", "[kapuchin]\nstrict: False\nwarn_on_repatch: no\n");
    t.app.start(ConfigFile::parse(&text).unwrap()).unwrap();

    let sentinel: Arc<KapuchinSentinel> = t.app.printer().lookup(KAPUCHIN_SECTION).expect("sentinel registered");
    assert!(!sentinel.settings().warn_on_repatch);

    let status = t.app.status();
    let status = &status[KAPUCHIN_SECTION];
    assert_eq!(status["installed"], true);
    assert_eq!(status["settings"]["warn_on_repatch"], false);
    assert_eq!(status["settings"]["section_prefix"], json!("patch"));
}

#[test]
fn test_invalid_kapuchin_option_fails_startup() {
    let mut t = test_app(KapuchinSettings::default());
    let text = config_with("").replace("[kapuchin]\n", "[kapuchin]\nstrictness: high\n");
    assert!(t.app.start(ConfigFile::parse(&text).unwrap()).is_err());
    assert!(!t.manager.is_loaded());
}
