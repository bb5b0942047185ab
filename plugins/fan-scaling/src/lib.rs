//! `[patch fan_scaling]`: PWM scaling for `Fan`.
//!
//! A stock fan cuts every request below `off_below` to zero. With this plugin
//! a request `r` in `(0, 1]` ends up as `off_below + r * (max_power - off_below)`,
//! so the whole request range spins the fan. `__init__` also rejects an
//! `off_below` larger than `max_power`.
use std::sync::Arc;

use kapuchin_core::extras::active_registry;
use kapuchin_core::host::instance::arg_f64;
use kapuchin_core::host::stock::{FAN_CLASS, FAN_OBJECT};
use kapuchin_core::host::{ConfigSection, HostError, HostResult, Instance, PrinterObject, Value, CONSTRUCTOR};
use kapuchin_core::{bootstrap_with, patch, BootstrapOptions, ModuleScope, PluginModule};
use serde_json::{json, Map};

pub const PLUGIN_ID: &str = "fan_scaling";

pub const MODULE: PluginModule = PluginModule::new(PLUGIN_ID, import)
    .with_description("Scale fan requests onto [off_below, max_power]")
    .with_load_config(load_config);

kapuchin_core::register_plugin_module!(MODULE);

fn import(scope: &mut ModuleScope<'_>) -> HostResult<()> {
    let fan = scope.class(FAN_CLASS)?;
    scope.declare(patch(&fan).extends_original().with(_apply_speed)?);
    scope.declare(patch(&fan).name(CONSTRUCTOR).extends_original().with(init)?);
    Ok(())
}

/// Value handed to the stock `_apply_speed` for a request of `value`.
///
/// The stock method multiplies by `max_power`, so the proxy starts at
/// `off_below / max_power` for the smallest non-zero request.
pub fn scaled_speed(value: f64, off_below: f64, max_power: f64) -> f64 {
    if value <= 0.0 || max_power <= 0.0 {
        return 0.0;
    }
    let base = (off_below / max_power).clamp(0.0, 1.0);
    (base + value * (1.0 - base)).clamp(0.0, 1.0)
}

fn original(this: &Instance, attribute: &str, args: &[Value]) -> HostResult<Value> {
    let printer = this.printer()?;
    let fan = printer.class(FAN_CLASS)?;
    active_registry(&printer).call_original(&fan, attribute, this, args)
}

fn _apply_speed(this: &Instance, args: &[Value]) -> HostResult<Value> {
    let print_time = arg_f64(args, 0, "Fan._apply_speed")?;
    let value = arg_f64(args, 1, "Fan._apply_speed")?;
    let proxy = scaled_speed(value, this.get_f64_or("off_below", 0.0), this.get_f64_or("max_power", 1.0));
    original(this, "_apply_speed", &[json!(print_time), json!(proxy)])
}

fn check_limits(this: &Instance) -> HostResult<()> {
    let off_below = this.get_f64_or("off_below", 0.0);
    let max_power = this.get_f64_or("max_power", 1.0);
    if off_below > max_power {
        return Err(HostError::command(format!(
            "off_below={:.6} can't be larger than max_power={:.6}",
            off_below, max_power
        )));
    }
    Ok(())
}

fn init(this: &Instance, args: &[Value]) -> HostResult<Value> {
    original(this, CONSTRUCTOR, args)?;
    check_limits(this)?;
    Ok(Value::Null)
}

fn load_config(config: &ConfigSection) -> HostResult<Arc<dyn PrinterObject>> {
    // The live fan was built by the stock constructor; check it the way the
    // patched one would have.
    let validate = |fan: &Arc<Instance>| check_limits(fan);
    let mut status = Map::new();
    status.insert("object".into(), json!(FAN_OBJECT));
    let options = BootstrapOptions {
        after_patch: Some(&validate),
        status,
        ..Default::default()
    };
    let plugin = bootstrap_with(&MODULE, config, FAN_OBJECT, options)?;
    log::info!(
        "Fan scaling enabled for '{}' (off_below={}, max_power={})",
        FAN_OBJECT,
        plugin.object().get_f64_or("off_below", 0.0),
        plugin.object().get_f64_or("max_power", 1.0)
    );
    Ok(Arc::new(plugin))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kapuchin_core::host::ConfigFile;
    use kapuchin_core::kernel::constants::MANAGER_OBJECT;
    use kapuchin_core::plugin_system::BootstrappedPlugin;
    use kapuchin_core::{Application, KapuchinManager, KapuchinSettings, ModuleCatalog, PatchRegistry};

    struct Started {
        app: Application,
        manager: Arc<KapuchinManager>,
    }

    fn start(fan_options: &str) -> Started {
        let mut app = Application::new();
        let registry: &'static PatchRegistry = Box::leak(Box::new(PatchRegistry::new()));
        let manager = Arc::new(
            KapuchinManager::new(KapuchinSettings::default(), ModuleCatalog::from_inventory()).with_registry(registry),
        );
        app.printer().add_object(MANAGER_OBJECT, manager.clone()).unwrap();

        let text = format!("[fan]\npin: PB7\n{}\n[kapuchin]\n\n[patch fan_scaling]\n", fan_options);
        app.start(ConfigFile::parse(&text).unwrap()).expect("Failed to start application");
        Started { app, manager }
    }

    fn power(app: &Application) -> f64 {
        app.printer().require::<Instance>(FAN_OBJECT).unwrap().get_f64("power").unwrap()
    }

    #[test]
    fn test_scaled_speed() {
        assert_eq!(scaled_speed(0.0, 0.2, 0.8), 0.0);
        assert_eq!(scaled_speed(-1.0, 0.2, 0.8), 0.0);
        assert_eq!(scaled_speed(0.5, 0.2, 0.0), 0.0);
        assert!((scaled_speed(0.5, 0.2, 0.8) - 0.625).abs() < 1e-12);
        assert_eq!(scaled_speed(1.0, 0.2, 0.8), 1.0);
        assert_eq!(scaled_speed(2.0, 0.2, 0.8), 1.0);
        // Without off_below the request passes through.
        assert_eq!(scaled_speed(0.3, 0.0, 1.0), 0.3);
    }

    #[test]
    fn test_requests_map_onto_power_range() {
        let started = start("max_power: 0.8\noff_below: 0.2");
        let app = &started.app;

        app.run_gcode("M106 S127.5").unwrap();
        assert!((power(app) - 0.5).abs() < 1e-9);

        // A stock fan would switch off below 0.2.
        app.run_gcode("M106 S25.5").unwrap();
        assert!((power(app) - 0.26).abs() < 1e-9);

        app.run_gcode("M106 S255").unwrap();
        assert!((power(app) - 0.8).abs() < 1e-9);

        app.run_gcode("M107").unwrap();
        assert_eq!(power(app), 0.0);
    }

    #[test]
    fn test_bootstrapped_against_live_fan() {
        let started = start("max_power: 0.8\noff_below: 0.2");
        let plugin = started
            .app
            .printer()
            .lookup::<BootstrappedPlugin>("patch fan_scaling")
            .expect("plugin object registered");
        assert_eq!(plugin.module(), PLUGIN_ID);
        assert_eq!(plugin.object().class().name(), FAN_CLASS);
        assert_eq!(plugin.status(), json!({ "enabled": true, "object": "fan" }));
        assert!(started.manager.failures().is_empty());
    }

    #[test]
    fn test_off_below_above_max_power_is_rejected() {
        let started = start("max_power: 0.5\noff_below: 0.6");
        assert!(started.manager.loaded_sections().is_empty());
        let failures = started.manager.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "patch fan_scaling");
        assert!(failures[0].1.contains("off_below=0.600000 can't be larger than max_power=0.500000"));
    }
}
