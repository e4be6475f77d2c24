//! Loading extensions into the host and reading their descriptors.

use std::sync::Arc;

use blockbay_core::menu::MenuPair;
use blockbay_core::prelude::*;
use blockbay_core::GET_INFO;
use blockbay_testing::{fixture_builtins, Greeter, HostCall, RecordingHost, FIXTURE_DEVICE};
use serde_json::{json, Value};

fn manager_for(host: &Arc<RecordingHost>) -> Arc<ExtensionManager> {
    ExtensionManager::create(host.clone(), fixture_builtins(), ManagerConfig::default()).unwrap()
}

fn loaded_greeter(host: &Arc<RecordingHost>) -> (Arc<ExtensionManager>, ModuleDescriptor) {
    let manager = manager_for(host);
    manager.load_extension_id_sync("greeter").unwrap();
    let descriptor = host.extension("greeter").unwrap();
    (manager, descriptor)
}

#[test]
fn test_builtin_load_registers_before_announcing() {
    let host = Arc::new(RecordingHost::new());
    let (manager, descriptor) = loaded_greeter(&host);

    assert!(manager.is_extension_loaded("greeter"));
    let registered = host
        .position(|call| matches!(call, HostCall::RegisterExtension { id, .. } if id == "greeter"))
        .unwrap();
    let added = host
        .position(|call| *call == HostCall::AddExtension("greeter".to_string()))
        .unwrap();
    assert!(registered < added);

    assert_eq!(
        manager.registry().extension_service("greeter").as_deref(),
        Some(descriptor.service_name.as_str())
    );
    assert!(descriptor.service_name.starts_with("extension_"));
    assert!(descriptor.service_name.ends_with("_greeter"));
    assert_eq!(descriptor.name, "Greeter");
}

#[test]
fn test_descriptor_shape() {
    let host = Arc::new(RecordingHost::new());
    let (_manager, descriptor) = loaded_greeter(&host);

    // The block with an empty opcode is dropped; the separator survives.
    assert_eq!(descriptor.prepared_blocks().count(), 7);
    assert_eq!(descriptor.blocks.len(), 8);

    let wave = descriptor.block("wave").unwrap();
    assert_eq!(wave.func.as_ref().unwrap().method(), "doWave");
    assert_eq!(wave.func.as_ref().unwrap().call_sync(json!({})).unwrap(), json!("waved"));

    let event = descriptor.block("whenGreeted").unwrap();
    assert!(event.func.is_none());
    assert!(event.spec.func.is_none());

    let button = descriptor
        .prepared_blocks()
        .find(|block| block.spec.block_type == BlockType::Button)
        .unwrap();
    assert!(button.func.is_none());
    assert!(button.spec.opcode.is_none());
    assert_eq!(button.spec.text, "Make a greeting");

    let greet = descriptor.block("greet").unwrap();
    assert_eq!(greet.spec.text, "greet [NAME]");
    assert_eq!(greet.spec.arguments["NAME"].menu.as_deref(), Some("names"));
}

#[test]
fn test_block_functions() {
    let host = Arc::new(RecordingHost::new());
    let (_manager, descriptor) = loaded_greeter(&host);

    let greet = descriptor.block("greet").and_then(|b| b.func.clone()).unwrap();
    assert_eq!(greet.call_sync(json!({"NAME": "Ada"})).unwrap(), json!("Hello, Ada"));

    let fail = descriptor.block("fail").and_then(|b| b.func.clone()).unwrap();
    assert!(matches!(
        fail.call_sync(json!({})),
        Err(Error::ExecutionFailed(message)) if message == "greeter refused"
    ));

    // Bound to a method the module lacks: calls do nothing.
    let missing = descriptor.block("notImplemented").and_then(|b| b.func.clone()).unwrap();
    assert_eq!(missing.call_sync(json!({})).unwrap(), Value::Null);
}

#[test]
fn test_dynamic_block_reads_mutation() {
    let host = Arc::new(RecordingHost::new());
    let (_manager, descriptor) = loaded_greeter(&host);
    let shape = descriptor.block("shape").and_then(|b| b.func.clone()).unwrap();

    let mutated = json!({"mutation": {"blockInfo": {"text": "circle"}}});
    assert_eq!(shape.call_sync(mutated).unwrap(), json!("circle"));
    assert_eq!(shape.call_sync(json!({})).unwrap(), json!("shape"));
}

#[test]
fn test_dynamic_menu_uses_editing_target() {
    let host = Arc::new(
        RecordingHost::new()
            .with_editing_target(TargetRef::sprite("sprite1", "Sprite1"))
            .with_stage(TargetRef::stage("stage1")),
    );
    let (_manager, descriptor) = loaded_greeter(&host);
    let names = descriptor.menu("names").and_then(|m| m.dynamic()).unwrap();
    assert_eq!(names.function(), "listNames");

    assert_eq!(
        names.open().unwrap(),
        vec![
            MenuPair::new("Ada", "Ada"),
            MenuPair::new("sprite1's friend", "friend"),
            MenuPair::new("me", 1),
        ]
    );

    host.set_editing_target(None);
    let pairs = names.open().unwrap();
    assert_eq!(pairs[1], MenuPair::new("stage1's friend", "friend"));
}

#[test]
fn test_empty_and_static_menus() {
    let host = Arc::new(RecordingHost::new());
    let (_manager, descriptor) = loaded_greeter(&host);

    let empty = descriptor.menu("emptyNames").and_then(|m| m.dynamic()).unwrap();
    assert!(matches!(empty.open(), Err(Error::EmptyMenu(function)) if function == "listNothing"));

    let moods = descriptor.menu("moods").unwrap();
    assert!(!moods.is_dynamic());
    assert_eq!(moods.static_items().unwrap().len(), 2);
}

#[test]
fn test_duplicate_and_unknown_loads() {
    let host = Arc::new(RecordingHost::new());
    let (manager, descriptor) = loaded_greeter(&host);

    manager.load_extension_id_sync("greeter").unwrap();
    assert_eq!(host.registered_extension_count(), 1);
    assert_eq!(
        manager.registry().extension_service("greeter"),
        Some(descriptor.service_name.clone())
    );

    manager.load_extension_id_sync("nothingHere").unwrap();
    assert!(!manager.is_extension_loaded("nothingHere"));
}

#[test]
fn test_builtin_url_load_is_ready_immediately() {
    let host = Arc::new(RecordingHost::new());
    let manager = manager_for(&host);

    let mut load = tokio_test::task::spawn(manager.load_extension_url("greeter"));
    tokio_test::assert_ready_ok!(load.poll());
    drop(load);
    assert!(manager.is_extension_loaded("greeter"));
}

#[tokio::test]
async fn test_url_load_without_spawner_is_not_found() {
    let host = Arc::new(RecordingHost::new());
    let manager = manager_for(&host);

    let err = manager
        .load_extension_url("https://extensions.local/pen.js")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ExtensionNotFound(url) if url.ends_with("pen.js")));
}

#[test]
fn test_invalid_module_id_is_rejected() {
    let host = Arc::new(RecordingHost::new());
    let builtins =
        Builtins::new().with_extension("broken", || Arc::new(Greeter::new("not valid!")) as _);
    let manager =
        ExtensionManager::create(host.clone(), builtins, ManagerConfig::default()).unwrap();

    let err = manager.load_extension_id_sync("broken").unwrap_err();
    assert!(matches!(err, Error::InvalidDescriptor(_)));
    assert!(!manager.is_extension_loaded("broken"));
    assert!(host.calls().is_empty());
}

#[test]
fn test_host_rejection_leaves_extension_unloaded() {
    let host = Arc::new(RecordingHost::new());
    host.reject_registrations(true);
    let manager = manager_for(&host);

    let err = manager.load_extension_id_sync("greeter").unwrap_err();
    assert!(matches!(err, Error::Host(_)));
    assert!(!manager.is_extension_loaded("greeter"));
    assert!(!host
        .calls()
        .contains(&HostCall::AddExtension("greeter".to_string())));
}

#[tokio::test]
async fn test_refresh_blocks_reports_every_module() {
    let host = Arc::new(RecordingHost::new());
    let (manager, descriptor) = loaded_greeter(&host);
    manager.load_device(DeviceRequest::new(FIXTURE_DEVICE)).unwrap();
    host.clear_calls();

    manager.refresh_blocks().await;

    let calls = host.calls();
    assert!(calls.contains(&HostCall::RefreshExtension {
        id: "greeter".to_string(),
        service: descriptor.service_name.clone(),
    }));
    assert!(calls.contains(&HostCall::RegisterDevice(vec![
        "motion".to_string(),
        "sensing".to_string()
    ])));
}

#[tokio::test]
async fn test_refresh_blocks_continues_past_a_failing_service() {
    let host = Arc::new(
        RecordingHost::new().with_editing_target(TargetRef::sprite("sprite1", "Cat")),
    );
    let (manager, greeter) = loaded_greeter(&host);
    manager.load_extension_id_sync("coreExample").unwrap();
    let core_service = manager.registry().extension_service("coreExample").unwrap();
    manager.load_device(DeviceRequest::new(FIXTURE_DEVICE)).unwrap();

    manager.dispatcher().set_local_service(
        &greeter.service_name,
        OperationTable::new().with_handler(GET_INFO, |_: &[Value]| {
            Err(Error::ExecutionFailed("metadata unavailable".to_string()))
        }),
    );
    host.clear_calls();

    manager.refresh_blocks().await;

    let calls = host.calls();
    assert!(!calls
        .iter()
        .any(|call| matches!(call, HostCall::RefreshExtension { id, .. } if id == "greeter")));
    assert!(calls.contains(&HostCall::RefreshExtension {
        id: "coreExample".to_string(),
        service: core_service,
    }));
    assert!(calls.contains(&HostCall::RegisterDevice(vec![
        "motion".to_string(),
        "sensing".to_string()
    ])));
}

#[tokio::test]
async fn test_unreachable_catalog_yields_none() {
    let host = Arc::new(RecordingHost::new());
    let config = ManagerConfig::default().with_resources_url("http://127.0.0.1:9/");
    let manager = ExtensionManager::create(host, fixture_builtins(), config).unwrap();

    assert!(manager.device_list().await.is_none());
    assert!(manager.device_extension_list().await.is_none());
}
