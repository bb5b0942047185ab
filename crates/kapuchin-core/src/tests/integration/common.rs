//! A stock application with test plugins that patch `ToolHead`.
use std::sync::Arc;

use serde_json::{json, Value};

use crate::extras;
use crate::host::config::ConfigSection;
use crate::host::error::HostResult;
use crate::host::instance::Instance;
use crate::host::printer::{PrinterObject, GCODE_OBJECT};
use crate::host::stock::{velocity_report, TOOLHEAD_CLASS, TOOLHEAD_OBJECT};
use crate::kernel::bootstrap::Application;
use crate::kernel::constants::MANAGER_OBJECT;
use crate::kernel::settings::KapuchinSettings;
use crate::patching::declaration::{patch, ModuleScope};
use crate::patching::registry::PatchRegistry;
use crate::plugin_system::manager::KapuchinManager;
use crate::plugin_system::module::{ModuleCatalog, PluginModule};

pub const PRINTER_CFG: &str = "\
[printer]
kinematics: cartesian
max_velocity: 300
max_accel: 3000
";

const CEILING: &str = "velocity_ceiling";

/// `SET_VELOCITY_LIMIT` runs the stock handler, then caps the velocity.
fn capped_set_velocity_limit(this: &Instance, args: &[Value]) -> HostResult<Value> {
    let registry = extras::manager(&*this.printer()?)?.registry();
    registry.call_original(this.class(), "cmd_SET_VELOCITY_LIMIT", this, args)?;
    let ceiling = this.get_f64_or(CEILING, f64::MAX);
    if this.get_f64("max_velocity")? > ceiling {
        this.set("max_velocity", ceiling);
    }
    Ok(Value::String(velocity_report(this)?))
}

fn import_cap(scope: &mut ModuleScope<'_>) -> HostResult<()> {
    let toolhead = scope.class(TOOLHEAD_CLASS)?;
    scope.declare(
        patch(&toolhead)
            .name("cmd_SET_VELOCITY_LIMIT")
            .extends_original()
            .with(capped_set_velocity_limit)?,
    );
    Ok(())
}

#[derive(Debug)]
pub struct CapPlugin {
    pub ceiling: f64,
}

impl PrinterObject for CapPlugin {
    fn status(&self) -> Value {
        json!({ "ceiling": self.ceiling })
    }
}

fn load_cap(section: &ConfigSection) -> HostResult<Arc<dyn PrinterObject>> {
    let ceiling = section.getfloat("max_velocity")?;
    let printer = section.printer()?;
    let toolhead = printer.require::<Instance>(TOOLHEAD_OBJECT)?;
    toolhead.set(CEILING, ceiling);
    if toolhead.get_f64("max_velocity")? > ceiling {
        toolhead.set("max_velocity", ceiling);
    }
    Ok(Arc::new(CapPlugin { ceiling }))
}

fn import_nothing(_scope: &mut ModuleScope<'_>) -> HostResult<()> {
    Ok(())
}

/// Registers `PING`; needs a `reply` option.
fn load_ping(section: &ConfigSection) -> HostResult<Arc<dyn PrinterObject>> {
    let reply = section.get("reply")?;
    let gcode = section.printer()?.gcode()?;
    gcode.register_command("PING", Some("Reply to a ping"), move |gcmd| {
        gcmd.respond_info(&reply);
        Ok(())
    })?;
    Ok(Arc::new(CapPlugin { ceiling: 0.0 }))
}

pub const CAP: PluginModule = PluginModule::new("velocity_cap", import_cap).with_load_config(load_cap);
pub const PING: PluginModule = PluginModule::new("ping", import_nothing).with_load_config(load_ping);

pub fn catalog() -> ModuleCatalog {
    let mut catalog = ModuleCatalog::new();
    catalog.register(CAP).register(PING);
    catalog
}

/// An application whose kapuchin manager records into a private registry.
pub struct TestApp {
    pub app: Application,
    pub manager: Arc<KapuchinManager>,
    pub registry: &'static PatchRegistry,
}

pub fn test_app(settings: KapuchinSettings) -> TestApp {
    let app = Application::new();
    let registry: &'static PatchRegistry = Box::leak(Box::new(PatchRegistry::new()));
    let manager = Arc::new(KapuchinManager::new(settings, catalog()).with_registry(registry));
    app.printer()
        .add_object(MANAGER_OBJECT, manager.clone())
        .expect("Failed to pre-register manager");
    TestApp { app, manager, registry }
}

pub fn config_with(extra: &str) -> String {
    format!("{}\n[kapuchin]\n\n{}", PRINTER_CFG, extra)
}

pub fn commands(app: &Application) -> Value {
    app.status()[GCODE_OBJECT]["commands"].clone()
}
