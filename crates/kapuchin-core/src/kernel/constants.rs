/// Application name
pub const APP_NAME: &str = "kapuchin";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config section that activates the framework.
pub const KAPUCHIN_SECTION: &str = "kapuchin";

/// Printer object name of the plugin manager.
pub const MANAGER_OBJECT: &str = "kapuchin_manager";

/// Default prefix of plugin sections: `[patch <id>]`.
pub const DEFAULT_SECTION_PREFIX: &str = "patch";

/// Root of plugin module paths: `patches.<id>`.
pub const MODULE_ROOT: &str = "patches";

/// Per-instance initialization entry point.
pub const LOAD_CONFIG: &str = "load_config";

/// Per-prefix initialization entry point.
pub const LOAD_CONFIG_PREFIX: &str = "load_config_prefix";
