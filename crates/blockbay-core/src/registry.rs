//! Service registry.
//!
//! Assigns service names, binds module services in the dispatcher, runs the
//! sanitizer over their metadata and hands the result to the host. It also
//! tracks which extension and device ids are loaded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::descriptor::ModuleInfo;
use crate::dispatch::{Dispatcher, GET_INFO};
use crate::error::Result;
use crate::host::HostRuntime;
use crate::module::{device_operations, extension_operations, DeviceModule, ExtensionModule};
use crate::sanitize::Sanitizer;

/// Service name for a module: `extension_{n}_{module_id}`.
pub fn service_name(id: u32, module_id: &str) -> String {
    format!("extension_{id}_{module_id}")
}

#[derive(Debug, Default)]
struct LoadedServices {
    extensions: HashMap<String, String>,
    devices: HashMap<String, String>,
}

/// Tracks loaded modules and their services.
pub struct ServiceRegistry {
    host: Arc<dyn HostRuntime>,
    dispatcher: Arc<Dispatcher>,
    sanitizer: Sanitizer,
    ids: Arc<AtomicU32>,
    loaded: Mutex<LoadedServices>,
}

impl ServiceRegistry {
    pub fn new(host: Arc<dyn HostRuntime>, ids: Arc<AtomicU32>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        Self {
            sanitizer: Sanitizer::new(dispatcher.clone(), host.clone()),
            host,
            dispatcher,
            ids,
            loaded: Mutex::new(LoadedServices::default()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    /// Allocate the next service name for a module id.
    pub fn next_service_name(&self, module_id: &str) -> String {
        service_name(self.ids.fetch_add(1, Ordering::SeqCst), module_id)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a module living in the host.
    ///
    /// The binding stays in place even when the host rejects the
    /// notification; the id is only recorded as loaded on success.
    pub fn register_local(
        &self,
        extension_id: &str,
        module: Arc<dyn ExtensionModule>,
    ) -> Result<String> {
        let service = self.next_service_name(&module.info().id);
        self.dispatcher
            .set_local_service(&service, extension_operations(module));
        self.register_extension_service_sync(&service)?;

        self.loaded
            .lock()
            .extensions
            .insert(extension_id.to_string(), service.clone());
        info!(extension = %extension_id, service = %service, "Registered local extension");
        Ok(service)
    }

    /// Register a device living in the host, replacing any loaded device.
    pub fn register_local_device(
        &self,
        device_id: &str,
        module: Arc<dyn DeviceModule>,
    ) -> Result<String> {
        let service = self.next_service_name(module.device_id());
        self.dispatcher
            .set_local_service(&service, device_operations(module));

        let infos: Vec<ModuleInfo> =
            serde_json::from_value(self.dispatcher.call_sync(&service, GET_INFO, &[])?)?;
        let descriptors = self.sanitizer.prepare_device_info(&service, infos);
        self.host.register_device_primitives(&descriptors)?;

        {
            let mut loaded = self.loaded.lock();
            loaded.devices.clear();
            loaded.devices.insert(device_id.to_string(), service.clone());
        }
        info!(
            device = %device_id,
            service = %service,
            categories = descriptors.len(),
            "Registered device"
        );
        Ok(service)
    }

    /// Register a service already bound in the dispatcher, reading its
    /// metadata asynchronously.
    ///
    /// A service reporting an id that is already loaded is ignored. The id
    /// is reserved while the host is notified and released if it refuses.
    pub async fn register_remote(&self, service: &str) -> Result<()> {
        let info: ModuleInfo =
            serde_json::from_value(self.dispatcher.call(service, GET_INFO, Vec::new()).await?)?;

        let descriptor = self.sanitizer.prepare_extension_info(service, info)?;
        {
            let mut loaded = self.loaded.lock();
            if loaded.extensions.contains_key(&descriptor.id) {
                warn!(
                    extension = %descriptor.id,
                    service = %service,
                    "Ignoring attempt to load a second extension with the same id"
                );
                return Ok(());
            }
            loaded
                .extensions
                .insert(descriptor.id.clone(), service.to_string());
        }
        if let Err(err) = self.host.register_extension_primitives(&descriptor) {
            self.loaded.lock().extensions.remove(&descriptor.id);
            return Err(err);
        }
        info!(extension = %descriptor.id, service = %service, "Registered extension service");
        Ok(())
    }

    fn register_extension_service_sync(&self, service: &str) -> Result<()> {
        let info: ModuleInfo =
            serde_json::from_value(self.dispatcher.call_sync(service, GET_INFO, &[])?)?;
        let descriptor = self.sanitizer.prepare_extension_info(service, info)?;
        self.host.register_extension_primitives(&descriptor)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn is_extension_loaded(&self, extension_id: &str) -> bool {
        self.loaded.lock().extensions.contains_key(extension_id)
    }

    pub fn is_device_loaded(&self, device_id: &str) -> bool {
        self.loaded.lock().devices.contains_key(device_id)
    }

    pub fn extension_service(&self, extension_id: &str) -> Option<String> {
        self.loaded.lock().extensions.get(extension_id).cloned()
    }

    pub fn device_service(&self, device_id: &str) -> Option<String> {
        self.loaded.lock().devices.get(device_id).cloned()
    }

    pub fn loaded_extensions(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.loaded.lock().extensions.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Forget every loaded extension and drop its binding.
    pub fn clear_extensions(&self) -> Vec<String> {
        let drained: Vec<(String, String)> = self.loaded.lock().extensions.drain().collect();
        for (_, service) in &drained {
            self.dispatcher.remove_service(service);
        }
        drained.into_iter().map(|(id, _)| id).collect()
    }

    /// Forget the loaded device and drop its binding.
    pub fn clear_devices(&self) {
        let drained: Vec<(String, String)> = self.loaded.lock().devices.drain().collect();
        for (_, service) in drained {
            self.dispatcher.remove_service(&service);
        }
    }

    /// Re-read metadata from every loaded module and notify the host.
    ///
    /// Failures are logged per module.
    pub async fn refresh_blocks(&self) {
        let (extensions, devices): (Vec<String>, Vec<String>) = {
            let loaded = self.loaded.lock();
            (
                loaded.extensions.values().cloned().collect(),
                loaded.devices.values().cloned().collect(),
            )
        };

        let refreshed = join_all(
            extensions
                .iter()
                .map(|service| self.refresh_extension(service)),
        )
        .await;
        for (service, result) in extensions.iter().zip(refreshed) {
            if let Err(err) = result {
                error!(service = %service, error = %err, "Failed to refresh extension blocks");
            }
        }

        for service in devices {
            if let Err(err) = self.refresh_device(&service).await {
                error!(service = %service, error = %err, "Failed to refresh device blocks");
            }
        }
    }

    async fn refresh_extension(&self, service: &str) -> Result<()> {
        let info: ModuleInfo =
            serde_json::from_value(self.dispatcher.call(service, GET_INFO, Vec::new()).await?)?;
        let descriptor = self.sanitizer.prepare_extension_info(service, info)?;
        self.host.refresh_extension_primitives(&descriptor)
    }

    async fn refresh_device(&self, service: &str) -> Result<()> {
        let info: Value = self.dispatcher.call(service, GET_INFO, Vec::new()).await?;
        let infos: Vec<ModuleInfo> = serde_json::from_value(info)?;
        let descriptors = self.sanitizer.prepare_device_info(service, infos);
        self.host.register_device_primitives(&descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{BlockInfo, BlockType, ModuleDescriptor};
    use crate::dispatch::OperationTable;
    use crate::error::Error;

    #[derive(Default)]
    struct CountingHost {
        extensions: Mutex<Vec<String>>,
        refreshed: Mutex<Vec<String>>,
        devices: Mutex<Vec<Vec<String>>>,
        reject: bool,
    }

    impl HostRuntime for CountingHost {
        fn register_extension_primitives(&self, descriptor: &ModuleDescriptor) -> Result<()> {
            if self.reject {
                return Err(Error::Host("rejected".to_string()));
            }
            self.extensions.lock().push(descriptor.id.clone());
            Ok(())
        }

        fn refresh_extension_primitives(&self, descriptor: &ModuleDescriptor) -> Result<()> {
            self.refreshed.lock().push(descriptor.id.clone());
            Ok(())
        }

        fn register_device_primitives(&self, descriptors: &[ModuleDescriptor]) -> Result<()> {
            self.devices
                .lock()
                .push(descriptors.iter().map(|d| d.id.clone()).collect());
            Ok(())
        }
    }

    struct Pen;

    impl ExtensionModule for Pen {
        fn info(&self) -> ModuleInfo {
            ModuleInfo::new("pen").with_block(BlockInfo::new("penDown", BlockType::Command))
        }

        fn operations(self: Arc<Self>) -> OperationTable {
            OperationTable::new().with_handler("penDown", |_: &[Value]| Ok(Value::Null))
        }
    }

    struct Board;

    impl DeviceModule for Board {
        fn device_id(&self) -> &str {
            "board"
        }

        fn info(&self) -> Vec<ModuleInfo> {
            vec![ModuleInfo::new("pin"), ModuleInfo::new("serial")]
        }

        fn operations(self: Arc<Self>) -> OperationTable {
            OperationTable::new()
        }
    }

    fn registry(host: Arc<CountingHost>) -> ServiceRegistry {
        ServiceRegistry::new(host, Arc::new(AtomicU32::new(0)))
    }

    #[test]
    fn test_service_names_are_unique() {
        let registry = registry(Arc::new(CountingHost::default()));
        assert_eq!(registry.next_service_name("pen"), "extension_0_pen");
        assert_eq!(registry.next_service_name("pen"), "extension_1_pen");
    }

    #[test]
    fn test_register_local() {
        let host = Arc::new(CountingHost::default());
        let registry = registry(host.clone());

        let service = registry.register_local("pen", Arc::new(Pen)).unwrap();
        assert_eq!(service, "extension_0_pen");
        assert!(registry.is_extension_loaded("pen"));
        assert_eq!(host.extensions.lock().as_slice(), &["pen".to_string()]);
        assert!(registry.dispatcher().has_service(&service));
    }

    #[test]
    fn test_rejected_notification_keeps_binding() {
        let host = Arc::new(CountingHost {
            reject: true,
            ..CountingHost::default()
        });
        let registry = registry(host);

        let err = registry.register_local("pen", Arc::new(Pen)).unwrap_err();
        assert!(matches!(err, Error::Host(_)));
        assert!(registry.dispatcher().has_service("extension_0_pen"));
        assert!(!registry.is_extension_loaded("pen"));
    }

    #[tokio::test]
    async fn test_register_remote_dedupes_by_reported_id() {
        let host = Arc::new(CountingHost::default());
        let registry = registry(host.clone());
        registry.register_local("pen", Arc::new(Pen)).unwrap();

        registry
            .dispatcher()
            .set_local_service("extension_9_pen", extension_operations(Arc::new(Pen)));
        registry.register_remote("extension_9_pen").await.unwrap();

        assert_eq!(host.extensions.lock().len(), 1);
        assert_eq!(
            registry.extension_service("pen").as_deref(),
            Some("extension_0_pen")
        );
    }

    #[test]
    fn test_device_registration_and_clear() {
        let host = Arc::new(CountingHost::default());
        let registry = registry(host.clone());

        let service = registry.register_local_device("board", Arc::new(Board)).unwrap();
        assert!(registry.is_device_loaded("board"));
        assert_eq!(
            host.devices.lock()[0],
            vec!["pin".to_string(), "serial".to_string()]
        );

        registry.clear_devices();
        assert!(!registry.is_device_loaded("board"));
        assert!(!registry.dispatcher().has_service(&service));
    }

    #[test]
    fn test_clear_extensions() {
        let registry = registry(Arc::new(CountingHost::default()));
        registry.register_local("pen", Arc::new(Pen)).unwrap();

        assert_eq!(registry.clear_extensions(), vec!["pen".to_string()]);
        assert!(registry.loaded_extensions().is_empty());
        assert!(registry.dispatcher().service_names().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_blocks() {
        let host = Arc::new(CountingHost::default());
        let registry = registry(host.clone());
        registry.register_local("pen", Arc::new(Pen)).unwrap();
        registry.register_local_device("board", Arc::new(Board)).unwrap();

        registry.refresh_blocks().await;

        assert_eq!(host.refreshed.lock().as_slice(), &["pen".to_string()]);
        assert_eq!(host.devices.lock().len(), 2);
    }
}
