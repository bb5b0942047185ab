//! `[patch hello]`: answers `HELLO` with the section's `message`.
//!
//! The smallest possible plugin. It declares no patches and only shows the
//! entry point contract.
//!
//! ```text
//! [patch hello]
//! message: Hi there
//! ```
use std::sync::Arc;

use kapuchin_core::host::{ConfigSection, HostResult, PrinterObject, Value};
use kapuchin_core::{ModuleScope, PluginModule};
use serde_json::json;

pub const PLUGIN_ID: &str = "hello";
pub const DEFAULT_MESSAGE: &str = "Hello from Kapuchin!";

pub const MODULE: PluginModule = PluginModule::new(PLUGIN_ID, import)
    .with_description("HELLO command answering with a configurable message")
    .with_load_config(load_config);

kapuchin_core::register_plugin_module!(MODULE);

#[derive(Debug)]
pub struct Hello {
    message: String,
}

impl Hello {
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl PrinterObject for Hello {
    fn status(&self) -> Value {
        json!({ "message": self.message })
    }
}

fn import(_scope: &mut ModuleScope<'_>) -> HostResult<()> {
    Ok(())
}

fn load_config(config: &ConfigSection) -> HostResult<Arc<dyn PrinterObject>> {
    let message = config.get_or("message", DEFAULT_MESSAGE);
    log::info!("Hello plugin loaded with message: {}", message);

    let reply = message.clone();
    config
        .printer()?
        .gcode()?
        .register_command("HELLO", Some("Print the hello plugin message"), move |gcmd| {
            gcmd.respond_info(&reply);
            Ok(())
        })?;
    Ok(Arc::new(Hello { message }))
}
