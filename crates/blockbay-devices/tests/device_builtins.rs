//! Builtin devices and extensions loaded through the manager.

use std::sync::Arc;

use blockbay_core::prelude::*;
use blockbay_core::ModuleDescriptor;
use parking_lot::Mutex;
use serde_json::json;

#[derive(Default)]
struct CapturingHost {
    extensions: Mutex<Vec<ModuleDescriptor>>,
    devices: Mutex<Vec<ModuleDescriptor>>,
    editing: Mutex<Option<TargetRef>>,
}

impl HostRuntime for CapturingHost {
    fn editing_target(&self) -> Option<TargetRef> {
        self.editing.lock().clone()
    }

    fn register_extension_primitives(&self, descriptor: &ModuleDescriptor) -> Result<()> {
        self.extensions.lock().push(descriptor.clone());
        Ok(())
    }

    fn register_device_primitives(&self, descriptors: &[ModuleDescriptor]) -> Result<()> {
        *self.devices.lock() = descriptors.to_vec();
        Ok(())
    }
}

fn manager(host: Arc<CapturingHost>) -> Arc<ExtensionManager> {
    ExtensionManager::create(host, blockbay_devices::builtins(), ManagerConfig::default()).unwrap()
}

#[test]
fn test_uno_core_registers_pin_and_data_categories() {
    let host = Arc::new(CapturingHost::default());
    let manager = manager(host.clone());

    let outcome = manager
        .load_device(blockbay_devices::uno_core::request("board_unoCore"))
        .unwrap();
    assert!(matches!(outcome, DeviceOutcome::Activated { .. }));
    assert!(manager.is_device_loaded("board_unoCore"));

    let devices = host.devices.lock();
    let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["pin", "data"]);

    let pin = &devices[0];
    let block = pin.block("setUnoCoreDigitalOutput").unwrap();
    let func = block.func.as_ref().unwrap();
    func.call_sync(json!({"PIN": "13", "LEVEL": "HIGH"})).unwrap();

    let read = pin.block("readUnoCoreDigitalPinNum").unwrap();
    let value = read
        .func
        .as_ref()
        .unwrap()
        .call_sync(json!({"PIN": "13"}))
        .unwrap();
    assert_eq!(value, json!(1));
}

#[test]
fn test_switching_boards_replaces_categories() {
    let host = Arc::new(CapturingHost::default());
    let manager = manager(host.clone());

    manager
        .load_device(blockbay_devices::uno_core::request("unoCore"))
        .unwrap();
    manager
        .load_device(blockbay_devices::uno_start::request("unoStart"))
        .unwrap();

    assert!(!manager.is_device_loaded("unoCore"));
    assert!(manager.is_device_loaded("unoStart"));
    assert_eq!(host.devices.lock()[0].name, "Pins");
}

#[test]
fn test_core_example_dynamic_menu() {
    let host = Arc::new(CapturingHost::default());
    *host.editing.lock() = Some(TargetRef::sprite("sprite1", "Cat"));
    let manager = manager(host.clone());

    manager.load_extension_id_sync("coreExample").unwrap();
    assert!(manager.is_extension_loaded("coreExample"));

    let extensions = host.extensions.lock();
    let descriptor = &extensions[0];
    assert!(descriptor.block("MAKE_A_VARIABLE").is_none());

    let menu = descriptor.menu("things").unwrap().dynamic().unwrap();
    assert!(matches!(menu.open(), Err(Error::EmptyMenu(_))));

    descriptor
        .block("rememberThing")
        .and_then(|block| block.func.as_ref())
        .unwrap()
        .call_sync(json!({"THING": "kite", "TARGET": "sprite1"}))
        .unwrap();
    let pairs = menu.open().unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].text, "kite");
}

#[tokio::test]
async fn test_device_calls_resolve_through_futures() {
    let host = Arc::new(CapturingHost::default());
    let manager = manager(host.clone());
    manager
        .load_device(blockbay_devices::uno_start::request("unoStart"))
        .unwrap();

    let service = manager.registry().device_service("unoStart").unwrap();
    let mapped = manager
        .dispatcher()
        .call(
            &service,
            "unoCoreDataMap",
            vec![json!({"DATA": 1023, "ARG0": 0, "ARG1": 1023, "ARG2": 0, "ARG3": 255})],
        )
        .await
        .unwrap();
    assert_eq!(mapped, json!(255));
}
