use std::sync::{Arc, Mutex};

use serde_json::{json, Map, Value};

use crate::host::error::{HostError, HostResult};
use crate::host::instance::Instance;
use crate::host::printer::{PrinterObject, CONFIGFILE_OBJECT};
use crate::kernel::settings::KapuchinSettings;
use crate::patching::registry::{PatchRegistry, TargetKey};
use crate::plugin_system::bootstrap::{bootstrap, bootstrap_with, BootstrapOptions, BootstrappedPlugin};
use crate::plugin_system::descriptor::resolve;
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::loader::PluginLoader;
use crate::plugin_system::tests::fixtures::{catalog, harness, unfrozen, BOOST, GREETER_OBJECT, LOUD};

#[test]
fn test_bootstrap_patches_live_object_class() {
    let h = harness("[patch boost]\n");
    let options = BootstrapOptions {
        registry: Some(h.registry),
        ..Default::default()
    };
    let plugin = bootstrap_with(&BOOST, &h.section("patch boost"), GREETER_OBJECT, options).expect("bootstrap should succeed");

    assert_eq!(plugin.module(), "boost");
    assert_eq!(plugin.patches_applied(), 1);
    assert!(Arc::ptr_eq(plugin.object(), &h.greeter()));
    assert_eq!(h.greet(), json!("boosted"));
    assert_eq!(h.original_greet(), json!("hello ada"));
    assert_eq!(plugin.status(), json!({ "enabled": true }));
}

#[test]
fn test_bootstrap_records_into_borrowed_registry() {
    let h = harness("[patch boost]\n");
    let local = PatchRegistry::new();
    let options = BootstrapOptions {
        registry: Some(&local),
        ..Default::default()
    };
    let plugin = bootstrap_with(&BOOST, &h.section("patch boost"), GREETER_OBJECT, options).expect("bootstrap should succeed");

    assert_eq!(plugin.patches_applied(), 1);
    assert_eq!(h.greet(), json!("boosted"));
    assert!(local.is_patched(&TargetKey::new(h.greeter().class(), "greet")));
    assert!(!h.registry.is_patched(&TargetKey::new(h.greeter().class(), "greet")));
}

#[test]
fn test_hooks_run_around_patching() {
    let h = harness("[patch boost]\n");
    let seen: Mutex<Vec<Value>> = Mutex::new(Vec::new());
    let capture = |greeter: &Arc<Instance>| -> HostResult<()> {
        let greeting = greeter.call("greet", &[json!("ada")])?;
        seen.lock().unwrap().push(greeting);
        Ok(())
    };
    let mut status = Map::new();
    status.insert("captured".into(), json!(true));

    let options = BootstrapOptions {
        before_patch: Some(&capture),
        after_patch: Some(&capture),
        status,
        registry: Some(h.registry),
    };
    let plugin = bootstrap_with(&BOOST, &h.section("patch boost"), GREETER_OBJECT, options).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![json!("hello ada"), json!("boosted")]);
    assert_eq!(plugin.status(), json!({ "enabled": true, "captured": true }));
}

#[test]
fn test_only_declarations_for_the_object_class_apply() {
    let h = harness("[patch loud]\n");
    let printer = h.printer.clone();
    let other = crate::host::class::HostClass::new("Other");
    printer.register_class(other.clone());
    printer
        .add_object("other", other.instantiate(&printer, &[]).unwrap())
        .unwrap();

    let options = BootstrapOptions {
        registry: Some(h.registry),
        ..Default::default()
    };
    let plugin = bootstrap_with(&LOUD, &h.section("patch loud"), "other", options).unwrap();
    assert_eq!(plugin.patches_applied(), 0);
    assert_eq!(h.greet(), json!("hello ada"));
}

#[test]
fn test_missing_host_object_is_discovery_error() {
    let h = harness("[patch boost]\n");
    match bootstrap(&BOOST, &h.section("patch boost"), "nozzle") {
        Err(PluginSystemError::Discovery { name, section, message }) => {
            assert_eq!(name, "nozzle");
            assert_eq!(section.as_deref(), Some("patch boost"));
            assert!(message.contains("nozzle"));
        }
        other => panic!("Expected Discovery error, got {:?}", other),
    }
}

#[test]
fn test_non_instance_object_is_not_patchable() {
    let h = harness("[patch boost]\n");
    match bootstrap(&BOOST, &h.section("patch boost"), CONFIGFILE_OBJECT) {
        Err(PluginSystemError::NotPatchable { object, .. }) => assert_eq!(object, CONFIGFILE_OBJECT),
        other => panic!("Expected NotPatchable, got {:?}", other),
    }
}

#[test]
fn test_hook_failure_is_initialization_error() {
    let h = harness("[patch boost]\n");
    let fail = |_greeter: &Arc<Instance>| -> HostResult<()> { Err(HostError::command("cannot capture")) };
    let options = BootstrapOptions {
        before_patch: Some(&fail),
        registry: Some(h.registry),
        ..Default::default()
    };
    match bootstrap_with(&BOOST, &h.section("patch boost"), GREETER_OBJECT, options) {
        Err(PluginSystemError::Initialization { section, .. }) => assert_eq!(section, "patch boost"),
        other => panic!("Expected Initialization error, got {:?}", other),
    }
    // Nothing was patched.
    assert_eq!(h.greet(), json!("hello ada"));
}

#[test]
fn test_bootstrap_uses_manager_registry() {
    let h = harness("[kapuchin]\n[patch boost]\n");
    h.install_manager(unfrozen());

    let plugin = bootstrap(&BOOST, &h.section("patch boost"), GREETER_OBJECT).unwrap();
    assert_eq!(plugin.patches_applied(), 1);
    assert_eq!(h.original_greet(), json!("hello ada"));
    assert!(h.registry.len() >= 1);
}

#[test]
fn test_loaded_bootstrap_plugin_does_not_repatch() {
    let h = harness("[kapuchin]\n[patch boost]\n");
    h.install_manager(unfrozen());
    let descriptors = resolve(&h.section("kapuchin"), &catalog(), &KapuchinSettings::default());
    let report = PluginLoader::new(&h.printer, h.registry).load_all(descriptors).unwrap();

    assert_eq!(report.loaded, vec!["patch boost"]);
    assert_eq!(report.patches_applied, 1);
    assert_eq!(h.greet(), json!("boosted"));
    assert_eq!(h.greeter().get("boosted"), Some(json!(true)));

    let plugin = h.printer.lookup::<BootstrappedPlugin>("patch boost").expect("bootstrapped object registered");
    // The loader applied the declarations before the entry point ran.
    assert_eq!(plugin.patches_applied(), 0);
    assert_eq!(plugin.status()["target"], GREETER_OBJECT);
}
