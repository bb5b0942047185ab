use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::host::config::ConfigSection;
use crate::host::error::{HostError, HostResult};
use crate::kernel::constants::DEFAULT_SECTION_PREFIX;

/// Framework options from the `[kapuchin]` section.
///
/// ```text
/// [kapuchin]
/// strict: False
/// freeze_registry: True
/// warn_on_repatch: True
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KapuchinSettings {
    /// Stop at the first plugin that fails to load.
    pub strict: bool,
    /// Freeze the patch registry once plugins are loaded.
    pub freeze_registry: bool,
    /// Log a warning when two patches replace the same attribute.
    pub warn_on_repatch: bool,
    /// Sections named `[<prefix> <id>]` load plugin `<id>`.
    pub section_prefix: String,
}

impl Default for KapuchinSettings {
    fn default() -> Self {
        Self {
            strict: false,
            freeze_registry: true,
            warn_on_repatch: true,
            section_prefix: DEFAULT_SECTION_PREFIX.to_string(),
        }
    }
}

impl KapuchinSettings {
    /// Read the settings from a config section. Every option is marked as
    /// accessed; unknown options are rejected.
    pub fn from_section(section: &ConfigSection) -> HostResult<Self> {
        let mut values = Map::new();
        for option in section.options() {
            let raw = section.get(&option)?;
            values.insert(option, config_value(&raw));
        }
        serde_json::from_value(Value::Object(values))
            .map_err(|e| HostError::invalid_option(section.name(), "settings", e.to_string()))
    }
}

/// Config values are untyped text; booleans are recognised the way the
/// host's `getboolean` does.
fn config_value(raw: &str) -> Value {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" => Value::Bool(true),
        "false" | "no" | "off" => Value::Bool(false),
        _ => Value::String(raw.trim().to_string()),
    }
}
