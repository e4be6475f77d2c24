//! Extension manager.
//!
//! Entry point for hosts. Ties the registry, the worker lifecycle, the
//! device switch and the catalogs together behind one handle.

use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogClient, DeviceCatalogEntry, DeviceExtensionEntry, DeviceExtensions};
use crate::channel::{self, ToContext, ToHost};
use crate::config::ManagerConfig;
use crate::device::{DeviceOutcome, DeviceRequest, DeviceState, DeviceSwitch, SwitchContext};
use crate::dispatch::{Dispatcher, RemoteLink};
use crate::error::{Error, RemotePayload, Result};
use crate::host::HostRuntime;
use crate::module::{Builtins, ExtensionFactory};
use crate::registry::ServiceRegistry;
use crate::worker::{ContextSpawner, ContextState, WorkerManager};

/// Builder for [`ExtensionManager`].
pub struct ManagerBuilder {
    host: Arc<dyn HostRuntime>,
    builtins: Builtins,
    config: ManagerConfig,
    spawner: Option<Arc<dyn ContextSpawner>>,
}

impl ManagerBuilder {
    pub fn with_builtins(mut self, builtins: Builtins) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable loading extensions by URL into isolated contexts.
    pub fn with_spawner(mut self, spawner: Arc<dyn ContextSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn build(self) -> Result<Arc<ExtensionManager>> {
        let ids = Arc::new(AtomicU32::new(0));
        let catalog = CatalogClient::new(self.config.clone())?;
        Ok(Arc::new(ExtensionManager {
            registry: ServiceRegistry::new(self.host.clone(), ids.clone()),
            workers: Mutex::new(WorkerManager::new(ids)),
            devices: DeviceSwitch::new(self.host.clone(), self.config.unselect_device_id.clone()),
            device_extensions: DeviceExtensions::new(),
            links: Mutex::new(Vec::new()),
            host: self.host,
            builtins: self.builtins,
            config: self.config,
            spawner: self.spawner,
            catalog,
        }))
    }
}

/// Loads, registers and switches extensions and devices for a host.
pub struct ExtensionManager {
    config: ManagerConfig,
    host: Arc<dyn HostRuntime>,
    builtins: Builtins,
    registry: ServiceRegistry,
    workers: Mutex<WorkerManager>,
    devices: DeviceSwitch,
    device_extensions: DeviceExtensions,
    catalog: CatalogClient,
    spawner: Option<Arc<dyn ContextSpawner>>,
    links: Mutex<Vec<RemoteLink>>,
}

impl ExtensionManager {
    pub fn builder(host: Arc<dyn HostRuntime>) -> ManagerBuilder {
        ManagerBuilder {
            host,
            builtins: Builtins::default(),
            config: ManagerConfig::default(),
            spawner: None,
        }
    }

    /// Create a manager without isolated context support.
    pub fn create(
        host: Arc<dyn HostRuntime>,
        builtins: Builtins,
        config: ManagerConfig,
    ) -> Result<Arc<Self>> {
        Self::builder(host)
            .with_builtins(builtins)
            .with_config(config)
            .build()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.registry.dispatcher()
    }

    pub fn is_extension_loaded(&self, extension_id: &str) -> bool {
        self.registry.is_extension_loaded(extension_id)
    }

    pub fn is_device_loaded(&self, device_id: &str) -> bool {
        self.registry.is_device_loaded(device_id)
    }

    pub fn device_state(&self) -> DeviceState {
        self.devices.state()
    }

    fn switch_context(&self) -> SwitchContext<'_> {
        SwitchContext {
            registry: &self.registry,
            builtins: &self.builtins,
            device_extensions: &self.device_extensions,
        }
    }

    // ========================================================================
    // Extensions
    // ========================================================================

    /// Load a builtin extension synchronously. Unknown ids are ignored with
    /// a warning.
    pub fn load_extension_id_sync(&self, extension_id: &str) -> Result<()> {
        let Some(factory) = self.builtins.extension(extension_id) else {
            warn!(extension = %extension_id, "Could not find extension in the builtin extensions");
            return Ok(());
        };
        self.load_builtin_extension(extension_id, factory)
    }

    /// Load a builtin extension by id, or any other extension by URL in an
    /// isolated context.
    ///
    /// For URLs the returned future completes once the context reports that
    /// its module initialised.
    pub async fn load_extension_url(self: &Arc<Self>, url: &str) -> Result<()> {
        if let Some(factory) = self.builtins.extension(url) {
            return self.load_builtin_extension(url, factory);
        }

        let Some(spawner) = self.spawner.clone() else {
            return Err(Error::ExtensionNotFound(url.to_string()));
        };

        let pending = self.workers.lock().enqueue(url);
        self.spawn_context(spawner.as_ref());

        match pending.await {
            Ok(Ok(worker_id)) => {
                debug!(url = %url, worker_id, "Extension loaded");
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(Error::ChannelClosed(url.to_string())),
        }
    }

    fn load_builtin_extension(&self, extension_id: &str, factory: &ExtensionFactory) -> Result<()> {
        if self.registry.is_extension_loaded(extension_id) {
            warn!(
                extension = %extension_id,
                "Rejecting attempt to load a second extension with the same id"
            );
            return Ok(());
        }

        self.registry.register_local(extension_id, factory())?;
        self.host.add_extension(extension_id);
        Ok(())
    }

    // ========================================================================
    // Isolated contexts
    // ========================================================================

    fn spawn_context(self: &Arc<Self>, spawner: &dyn ContextSpawner) {
        let (host_end, context_end) = channel::pair();
        let link = RemoteLink::new(host_end.tx);
        self.links.lock().push(link.clone());
        spawner.spawn(context_end);
        tokio::spawn(route_context(Arc::downgrade(self), link, host_end.rx));
    }

    /// Hand the oldest pending load to a context that reported in.
    pub fn allocate_worker(&self) -> Option<(u32, String)> {
        self.workers.lock().allocate_worker()
    }

    /// Settle the load assigned to a context.
    pub fn on_worker_init(&self, worker_id: u32, error: Option<RemotePayload>) {
        self.workers.lock().on_worker_init(worker_id, error);
    }

    pub fn worker_state(&self, worker_id: u32) -> Option<ContextState> {
        self.workers.lock().state(worker_id)
    }

    /// Loads not yet claimed by a context.
    pub fn pending_load_count(&self) -> usize {
        self.workers.lock().pending_load_count()
    }

    /// Contexts that claimed a load but have not reported init.
    pub fn pending_worker_count(&self) -> usize {
        self.workers.lock().pending_worker_count()
    }

    /// Register a service a context bound in the dispatcher.
    pub async fn register_extension_service(&self, service: &str) -> Result<()> {
        self.registry.register_remote(service).await
    }

    // ========================================================================
    // Devices
    // ========================================================================

    pub fn load_device(&self, request: DeviceRequest) -> Result<DeviceOutcome> {
        self.devices.load(&self.switch_context(), request)
    }

    /// Load a device by id; a missing id does nothing.
    pub fn load_device_url(
        &self,
        device_id: Option<&str>,
        device_type: Option<&str>,
        pnp_id_list: &[String],
    ) -> Result<()> {
        let Some(device_id) = device_id else {
            return Ok(());
        };
        let mut request = DeviceRequest::new(device_id).with_pnp_ids(pnp_id_list.iter().cloned());
        request.device_type = device_type.map(str::to_string);
        self.load_device(request).map(|_| ())
    }

    /// Unload the active device and announce that none is selected.
    pub fn clear_device(&self) {
        self.devices.clear(&self.switch_context());
    }

    // ========================================================================
    // Catalogs and add-ons
    // ========================================================================

    /// Devices offered by the resources server, or `None` when it cannot be
    /// reached.
    pub async fn device_list(&self) -> Option<Vec<DeviceCatalogEntry>> {
        match self.catalog.fetch_devices().await {
            Ok(devices) => Some(devices),
            Err(err) => {
                warn!(error = %err, "Can not fetch data from local device server");
                None
            }
        }
    }

    /// Device extension add-ons offered by the resources server. The result
    /// also becomes the catalog add-ons are loaded from.
    pub async fn device_extension_list(&self) -> Option<Vec<DeviceExtensionEntry>> {
        let host = self.host.clone();
        match self
            .catalog
            .fetch_device_extensions(|id| host.is_device_extension_loaded(id))
            .await
        {
            Ok(entries) => {
                self.device_extensions.replace(entries.clone());
                Some(entries)
            }
            Err(err) => {
                warn!(error = %err, "Can not fetch data from local extension server");
                None
            }
        }
    }

    /// Use a catalog obtained elsewhere instead of fetching it.
    pub fn set_device_extension_catalog(&self, entries: Vec<DeviceExtensionEntry>) {
        self.device_extensions.replace(entries);
    }

    pub fn is_device_extension_loaded(&self, extension_id: &str) -> bool {
        self.host.is_device_extension_loaded(extension_id)
    }

    pub fn load_device_extension(&self, extension_id: &str) -> Result<()> {
        self.device_extensions
            .load(self.host.as_ref(), &self.config.resources_url, extension_id)
    }

    pub fn unload_device_extension(&self, extension_id: &str) {
        self.device_extensions
            .unload(self.host.as_ref(), extension_id);
    }

    pub fn unload_all_device_extensions(&self) {
        self.device_extensions.unload_all(self.host.as_ref());
    }

    /// Regenerate the metadata of every loaded module.
    pub async fn refresh_blocks(&self) {
        self.registry.refresh_blocks().await;
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Stop every context and forget every service.
    pub fn teardown(&self) {
        for link in self.links.lock().drain(..) {
            let _ = link.send(ToContext::Shutdown);
            link.close();
        }
        self.workers.lock().clear();
        if self.devices.state().is_active() {
            self.clear_device();
        }
        self.registry.clear_extensions();
        self.registry.clear_devices();
        self.dispatcher().clear();
        info!("Extension manager torn down");
    }
}

/// Route messages from one isolated context.
async fn route_context(
    manager: Weak<ExtensionManager>,
    link: RemoteLink,
    mut rx: mpsc::UnboundedReceiver<ToHost>,
) {
    let mut assigned = None;
    let mut registration = None;

    while let Some(message) = rx.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };

        match message {
            ToHost::Hello => match manager.allocate_worker() {
                Some((worker_id, url)) => {
                    assigned = Some(worker_id);
                    if link.send(ToContext::Assign { worker_id, url }).is_ok() {
                        manager.workers.lock().mark_awaiting_init(worker_id);
                    }
                }
                None => {
                    warn!("Context reported in with no pending extension load");
                    let _ = link.send(ToContext::Reject {
                        reason: "no pending extension load".to_string(),
                    });
                }
            },
            ToHost::RegisterService { service } => {
                manager
                    .dispatcher()
                    .set_remote_service(&service, link.clone());
                // Registration waits on this context's own response, which
                // this loop has to deliver.
                registration = Some(tokio::spawn(async move {
                    let result = manager.register_extension_service(&service).await;
                    if let Err(err) = &result {
                        error!(service = %service, error = %err, "Failed to register extension service");
                    }
                    result
                }));
            }
            ToHost::InitComplete { worker_id, error } => match registration.take() {
                // The load settles once the module is registered.
                Some(pending) if error.is_none() => {
                    tokio::spawn(async move {
                        let error = match pending.await {
                            Ok(Ok(())) => None,
                            Ok(Err(err)) => Some(RemotePayload::from(&err)),
                            Err(join) => Some(RemotePayload::new(format!(
                                "registration task failed: {join}"
                            ))),
                        };
                        manager.on_worker_init(worker_id, error);
                    });
                }
                _ => manager.on_worker_init(worker_id, error),
            },
            ToHost::Response { request_id, result } => {
                if !link.resolve(request_id, result) {
                    warn!(request_id, "Response for unknown request");
                }
            }
        }
    }

    link.close();
    if let Some(worker_id) = assigned {
        if let Some(manager) = manager.upgrade() {
            if manager.worker_state(worker_id) == Some(ContextState::AwaitingInit) {
                warn!(worker_id, "Context closed before reporting init");
            }
        }
    }
}
