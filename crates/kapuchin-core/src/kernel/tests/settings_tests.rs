use crate::host::config::ConfigFile;
use crate::host::error::HostError;
use crate::host::printer::Printer;
use crate::kernel::settings::KapuchinSettings;

fn settings_from(text: &str) -> (std::sync::Arc<ConfigFile>, Result<KapuchinSettings, HostError>) {
    let printer = Printer::new();
    let config = ConfigFile::parse(text).unwrap();
    let section = config.section(&printer, "kapuchin").unwrap();
    let settings = KapuchinSettings::from_section(&section);
    (config, settings)
}

#[test]
fn test_defaults() {
    let (_, settings) = settings_from("[kapuchin]\n");
    let settings = settings.unwrap();
    assert_eq!(settings, KapuchinSettings::default());
    assert!(!settings.strict);
    assert!(settings.freeze_registry);
    assert!(settings.warn_on_repatch);
    assert_eq!(settings.section_prefix, "patch");
}

#[test]
fn test_boolean_spellings() {
    let (_, settings) = settings_from("[kapuchin]\nstrict: True\nfreeze_registry: no\nwarn_on_repatch: OFF\n");
    let settings = settings.unwrap();
    assert!(settings.strict);
    assert!(!settings.freeze_registry);
    assert!(!settings.warn_on_repatch);
}

#[test]
fn test_custom_prefix() {
    let (_, settings) = settings_from("[kapuchin]\nsection_prefix: override\n");
    assert_eq!(settings.unwrap().section_prefix, "override");
}

#[test]
fn test_unknown_option_rejected() {
    let (_, settings) = settings_from("[kapuchin]\nmodule_root: somewhere\n");
    match settings {
        Err(HostError::InvalidOption { section, message, .. }) => {
            assert_eq!(section, "kapuchin");
            assert!(message.contains("module_root"));
        }
        other => panic!("Expected InvalidOption, got {:?}", other),
    }
}

#[test]
fn test_non_boolean_value_rejected() {
    let (_, settings) = settings_from("[kapuchin]\nstrict: sometimes\n");
    assert!(matches!(settings, Err(HostError::InvalidOption { .. })));
}

#[test]
fn test_reading_marks_options_accessed() {
    let printer = Printer::new();
    let config = ConfigFile::parse("[kapuchin]\nstrict: False\n").unwrap();
    let section = config.section(&printer, "kapuchin").unwrap();
    KapuchinSettings::from_section(&section).unwrap();
    config.validate(&printer).expect("Settings options should count as read");
}
