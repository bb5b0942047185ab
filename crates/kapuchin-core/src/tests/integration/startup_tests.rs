use serde_json::json;

use crate::host::config::ConfigFile;
use crate::host::error::HostError;
use crate::host::instance::Instance;
use crate::host::stock::TOOLHEAD_OBJECT;
use crate::kernel::bootstrap::Application;
use crate::kernel::error::Error;
use crate::kernel::settings::KapuchinSettings;
use crate::plugin_system::error::PluginSystemError;

use super::common::{commands, config_with, test_app, CapPlugin, PRINTER_CFG};

fn unfrozen() -> KapuchinSettings {
    KapuchinSettings {
        freeze_registry: false,
        ..KapuchinSettings::default()
    }
}

#[test]
fn test_patch_section_without_kapuchin_is_rejected() {
    let mut app = Application::new();
    let text = format!("{}\n[patch velocity_cap]\nmax_velocity: 100\n", PRINTER_CFG);
    match app.start(ConfigFile::parse(&text).unwrap()) {
        Err(Error::Host(HostError::InvalidSection(section))) => assert_eq!(section, "patch velocity_cap"),
        other => panic!("Expected InvalidSection, got {:?}", other),
    }
}

#[test]
fn test_end_to_end_patch_loading() {
    let mut t = test_app(KapuchinSettings::default());
    let text = config_with("[patch velocity_cap]\nmax_velocity: 100\n");
    t.app.start(ConfigFile::parse(&text).unwrap()).expect("Failed to start with plugins");

    let toolhead = t.app.printer().require::<Instance>(TOOLHEAD_OBJECT).unwrap();
    assert_eq!(toolhead.get_f64("max_velocity").unwrap(), 100.0);

    let responses = t.app.run_gcode("SET_VELOCITY_LIMIT VELOCITY=500 ACCEL=1000").unwrap();
    assert!(responses[0].starts_with("max_velocity: 100.000000\nmax_accel: 1000.000000"));

    let cap = t.app.printer().lookup::<CapPlugin>("patch velocity_cap").unwrap();
    assert_eq!(cap.ceiling, 100.0);

    assert!(t.manager.is_loaded());
    assert!(t.registry.is_frozen());
    let status = t.app.status();
    assert_eq!(status["kapuchin"]["patches_loaded"], true);
    assert_eq!(status["kapuchin_manager"]["loaded"], json!(["patch velocity_cap"]));
    assert_eq!(status["patch velocity_cap"], json!({ "ceiling": 100.0 }));
    assert_eq!(
        status["kapuchin_manager"]["registry"]["patched"],
        json!(["PrinterConfig.check_unused_options", "ToolHead.cmd_SET_VELOCITY_LIMIT"])
    );
}

#[test]
fn test_plugin_sections_load_in_file_order() {
    let mut t = test_app(unfrozen());
    let text = config_with("[patch ping]\nreply: pong\n\n[patch velocity_cap]\nmax_velocity: 150\n");
    t.app.start(ConfigFile::parse(&text).unwrap()).unwrap();

    assert_eq!(t.manager.loaded_sections(), vec!["patch ping", "patch velocity_cap"]);
    assert_eq!(t.app.run_gcode("PING").unwrap(), vec!["pong"]);
    assert!(commands(&t.app).as_array().unwrap().contains(&json!("PING")));
}

#[test]
fn test_failing_plugin_does_not_block_later_ones() {
    let mut t = test_app(unfrozen());
    let text = config_with("[patch ping]\n\n[patch unknown_plugin]\nvalue: 1\n\n[patch velocity_cap]\nmax_velocity: 120\n");
    t.app.start(ConfigFile::parse(&text).expect("config parses")).expect("startup tolerates plugin failures");

    assert_eq!(t.manager.loaded_sections(), vec!["patch velocity_cap"]);
    let failed: Vec<String> = t.manager.failures().into_iter().map(|(section, _)| section).collect();
    assert_eq!(failed, vec!["patch ping", "patch unknown_plugin"]);

    let toolhead = t.app.printer().require::<Instance>(TOOLHEAD_OBJECT).unwrap();
    assert_eq!(toolhead.get_f64("max_velocity").unwrap(), 120.0);
    assert!(t.app.run_gcode("PING").is_err());
}

#[test]
fn test_strict_mode_aborts_startup() {
    let settings = KapuchinSettings {
        strict: true,
        ..unfrozen()
    };
    let mut t = test_app(settings);
    let text = config_with("[patch ping]\n\n[patch velocity_cap]\nmax_velocity: 120\n");
    match t.app.start(ConfigFile::parse(&text).unwrap()) {
        Err(Error::Host(HostError::Plugin(error))) => {
            assert!(matches!(*error, PluginSystemError::Initialization { ref section, .. } if section == "patch ping"));
        }
        other => panic!("Expected plugin error, got {:?}", other),
    }
    let toolhead = t.app.printer().require::<Instance>(TOOLHEAD_OBJECT).unwrap();
    assert_eq!(toolhead.get_f64("max_velocity").unwrap(), 300.0);
}

#[test]
fn test_unread_plugin_option_fails_validation() {
    let mut t = test_app(unfrozen());
    let text = config_with("[patch velocity_cap]\nmax_velocity: 100\ntypo_option: 1\n");
    match t.app.start(ConfigFile::parse(&text).unwrap()) {
        Err(Error::Host(HostError::UnusedOption { section, option })) => {
            assert_eq!(section, "patch velocity_cap");
            assert_eq!(option, "typo_option");
        }
        other => panic!("Expected UnusedOption, got {:?}", other),
    }
}

#[test]
fn test_manager_created_on_demand_with_linked_modules() {
    // No pre-registered manager: the hook builds one from the linked
    // modules and records into the global registry.
    let mut app = Application::new();
    let text = format!("{}\n[kapuchin]\nfreeze_registry: False\n\n[patch loud]\n", PRINTER_CFG);
    app.start(ConfigFile::parse(&text).unwrap()).expect("startup succeeds");

    let manager = crate::extras::manager(app.printer()).expect("manager registered by the hook");
    assert!(manager.catalog().find("patches.loud").is_some());
    assert!(!manager.settings().freeze_registry);
    // `loud` patches a class this host does not have.
    assert_eq!(manager.failures().len(), 1);
    assert!(manager.failures()[0].1.contains("Greeter"));
}

#[test]
fn test_prefix_activation_section_loads_plugins() {
    let mut t = test_app(unfrozen());
    let text = format!("{}\n[kapuchin main]\nfreeze_registry: False\n\n[patch velocity_cap]\nmax_velocity: 110\n", PRINTER_CFG);
    t.app.start(ConfigFile::parse(&text).unwrap()).expect("prefix form activates kapuchin");

    assert_eq!(t.manager.loaded_sections(), vec!["patch velocity_cap"]);
    let status = t.app.status();
    assert_eq!(status["kapuchin main"]["installed"], true);
    assert_eq!(status["kapuchin main"]["patches_loaded"], true);
}

#[test]
fn test_prefix_activation_section_provides_settings() {
    let mut app = Application::new();
    let text = format!("{}\n[kapuchin main]\nfreeze_registry: False\nwarn_on_repatch: False\n", PRINTER_CFG);
    app.start(ConfigFile::parse(&text).unwrap()).expect("prefix form activates kapuchin");

    let manager = crate::extras::manager(app.printer()).unwrap();
    assert!(manager.is_loaded());
    assert!(!manager.settings().freeze_registry);
    assert!(!manager.settings().warn_on_repatch);
}
