//! `[patch reset_velocity_limit]`: adds `RESET_VELOCITY_LIMIT`, which puts the
//! `ToolHead` velocity limits back to the values read from `[printer]`.
//!
//! Three `ToolHead` attributes are patched as one bundle:
//!
//! - `__init__` keeps a copy of the configured limits in `orig_cfg`;
//! - `cmd_RESET_VELOCITY_LIMIT` is new;
//! - `register_gcode_handlers` also registers the new command.
//!
//! The toolhead already exists when the plugin section is loaded, so the
//! entry point bootstraps against the live `toolhead` object and does the
//! constructor's work by hand.
use std::sync::Arc;

use kapuchin_core::extras::active_registry;
use kapuchin_core::host::gcode::method_handler;
use kapuchin_core::host::stock::{velocity_report, TOOLHEAD_CLASS, TOOLHEAD_OBJECT};
use kapuchin_core::host::{ConfigSection, HostError, HostResult, Instance, PrinterObject, Value, CONSTRUCTOR};
use kapuchin_core::{bootstrap_with, patches_named, BootstrapOptions, ModuleScope, PluginModule};
use serde_json::{json, Map};

pub const PLUGIN_ID: &str = "reset_velocity_limit";
pub const COMMAND: &str = "RESET_VELOCITY_LIMIT";
const COMMAND_HELP: &str = "Reset printer velocity limits";
const ORIGINAL_CONFIG: &str = "orig_cfg";
const LIMITS: [&str; 4] = [
    "max_velocity",
    "max_accel",
    "minimum_cruise_ratio",
    "square_corner_velocity",
];

pub const MODULE: PluginModule = PluginModule::new(PLUGIN_ID, import)
    .with_description("RESET_VELOCITY_LIMIT restores the configured velocity limits")
    .with_load_config(load_config);

kapuchin_core::register_plugin_module!(MODULE);

fn import(scope: &mut ModuleScope<'_>) -> HostResult<()> {
    let declarations = patches_named(TOOLHEAD_CLASS)
        .extending(CONSTRUCTOR, init)
        .member(cmd_RESET_VELOCITY_LIMIT)
        .extending("register_gcode_handlers", register_gcode_handlers)
        .build()?;
    scope.declare_all(declarations);
    Ok(())
}

/// Run the pre-patch `ToolHead.<attribute>` on `this`.
fn original(this: &Instance, attribute: &str, args: &[Value]) -> HostResult<Value> {
    let printer = this.printer()?;
    let toolhead = printer.class(TOOLHEAD_CLASS)?;
    active_registry(&printer).call_original(&toolhead, attribute, this, args)
}

fn save_limits(this: &Instance) {
    let saved: Map<String, Value> = LIMITS
        .iter()
        .map(|key| (key.to_string(), json!(this.get_f64_or(key, 0.0))))
        .collect();
    this.set(ORIGINAL_CONFIG, Value::Object(saved));
}

fn init(this: &Instance, args: &[Value]) -> HostResult<Value> {
    original(this, CONSTRUCTOR, args)?;
    save_limits(this);
    Ok(Value::Null)
}

#[allow(non_snake_case)]
fn cmd_RESET_VELOCITY_LIMIT(this: &Instance, _args: &[Value]) -> HostResult<Value> {
    let saved = this
        .get(ORIGINAL_CONFIG)
        .and_then(|value| value.as_object().cloned())
        .ok_or_else(|| HostError::command("No saved velocity limits to reset to"))?;
    for key in LIMITS {
        if let Some(value) = saved.get(key).and_then(Value::as_f64) {
            this.set(key, value);
        }
    }
    this.call("_calc_junction_deviation", &[])?;
    Ok(Value::String(velocity_report(this)?))
}

fn register_command(this: &Instance) -> HostResult<()> {
    let gcode = this.printer()?.gcode()?;
    gcode.register_command(COMMAND, Some(COMMAND_HELP), method_handler(this, "cmd_RESET_VELOCITY_LIMIT")?)
}

fn register_gcode_handlers(this: &Instance, args: &[Value]) -> HostResult<Value> {
    original(this, "register_gcode_handlers", args)?;
    register_command(this)?;
    Ok(Value::Null)
}

fn load_config(config: &ConfigSection) -> HostResult<Arc<dyn PrinterObject>> {
    let before = |toolhead: &Arc<Instance>| -> HostResult<()> {
        if !toolhead.contains(ORIGINAL_CONFIG) {
            save_limits(toolhead);
        }
        Ok(())
    };
    let after = |toolhead: &Arc<Instance>| -> HostResult<()> {
        if !toolhead.printer()?.gcode()?.is_registered(COMMAND) {
            register_command(toolhead)?;
        }
        Ok(())
    };
    let mut status = Map::new();
    status.insert("command".into(), json!(COMMAND));
    let options = BootstrapOptions {
        before_patch: Some(&before),
        after_patch: Some(&after),
        status,
        ..Default::default()
    };
    let plugin = bootstrap_with(&MODULE, config, TOOLHEAD_OBJECT, options)?;
    log::info!("{} available", COMMAND);
    Ok(Arc::new(plugin))
}
