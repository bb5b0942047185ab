use std::fmt;

use crate::host::config::ConfigSection;
use crate::kernel::constants::{LOAD_CONFIG, LOAD_CONFIG_PREFIX};
use crate::kernel::settings::KapuchinSettings;
use crate::plugin_system::error::{PluginResult, PluginSystemError};
use crate::plugin_system::module::{module_path, InitFn, ModuleCatalog, PluginModule};

/// How a plugin section is initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitForm {
    /// `[patch <id>]`: the module's `load_config`.
    PerInstance,
    /// `[patch <id> <sub>]`: the module's `load_config_prefix`.
    PerPrefix,
}

impl InitForm {
    pub fn entry_point(&self) -> &'static str {
        match self {
            InitForm::PerInstance => LOAD_CONFIG,
            InitForm::PerPrefix => LOAD_CONFIG_PREFIX,
        }
    }

    /// The entry point of `module` for this form, when present.
    pub fn select(&self, module: &PluginModule) -> Option<InitFn> {
        match self {
            InitForm::PerInstance => module.load_config(),
            InitForm::PerPrefix => module.load_config_prefix(),
        }
    }
}

impl fmt::Display for InitForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

/// One `[patch ...]` section matched to its module.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub plugin_id: String,
    pub section: ConfigSection,
    pub module_path: String,
    pub module: PluginModule,
    pub form: InitForm,
}

impl PluginDescriptor {
    pub fn section_name(&self) -> &str {
        self.section.name()
    }
}

/// Find every plugin section of the config `config` belongs to and match it
/// to a catalog module. Results are in config-file order; a section that
/// cannot be resolved yields an error in its slot and does not affect the
/// others.
pub fn resolve(
    config: &ConfigSection,
    catalog: &ModuleCatalog,
    settings: &KapuchinSettings,
) -> Vec<PluginResult<PluginDescriptor>> {
    let sections = match config.get_prefix_sections(&settings.section_prefix) {
        Ok(sections) => sections,
        Err(e) => return vec![Err(e.into())],
    };

    sections
        .into_iter()
        .filter(|section| is_plugin_section(section.name(), &settings.section_prefix))
        .map(|section| resolve_section(section, catalog, settings))
        .collect()
}

fn is_plugin_section(name: &str, prefix: &str) -> bool {
    name == prefix || name.strip_prefix(prefix).is_some_and(|rest| rest.starts_with(char::is_whitespace))
}

fn resolve_section(
    section: ConfigSection,
    catalog: &ModuleCatalog,
    settings: &KapuchinSettings,
) -> PluginResult<PluginDescriptor> {
    let parts: Vec<&str> = section.name().split_whitespace().collect();
    let form = match parts.len() {
        2 => InitForm::PerInstance,
        n if n > 2 => InitForm::PerPrefix,
        _ => {
            return Err(PluginSystemError::InvalidSection {
                section: section.name().to_string(),
                message: format!("expected '[{} <name>]'", settings.section_prefix),
            });
        }
    };

    let plugin_id = parts[1].to_string();
    let module_path = module_path(&plugin_id);
    let module = catalog.find(&module_path).copied().ok_or_else(|| PluginSystemError::Discovery {
        name: plugin_id.clone(),
        section: Some(section.name().to_string()),
        message: format!("no module '{}' is available", module_path),
    })?;

    log::debug!("Resolved [{}] to '{}' ({})", section.name(), module_path, form);
    Ok(PluginDescriptor {
        plugin_id,
        section,
        module_path,
        module,
        form,
    })
}
