//! Host runtime for the command line.
//!
//! Logs every notification and keeps the registered descriptors around so
//! commands can print them.

use blockbay_core::{DeviceExtensionAssets, HostRuntime, ModuleDescriptor, Result, TargetRef};
use parking_lot::Mutex;
use tracing::{debug, info};

#[derive(Default)]
struct ConsoleState {
    extensions: Vec<ModuleDescriptor>,
    device: Vec<ModuleDescriptor>,
    current_device: Option<String>,
    device_extensions: Vec<String>,
}

/// Host without an editor. The stage is the only target.
#[derive(Default)]
pub struct ConsoleHost {
    state: Mutex<ConsoleState>,
}

impl ConsoleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last descriptor registered for an extension id.
    pub fn extension(&self, id: &str) -> Option<ModuleDescriptor> {
        self.state
            .lock()
            .extensions
            .iter()
            .rev()
            .find(|descriptor| descriptor.id == id)
            .cloned()
    }

    /// Categories of the registered device.
    pub fn device_categories(&self) -> Vec<ModuleDescriptor> {
        self.state.lock().device.clone()
    }
}

impl HostRuntime for ConsoleHost {
    fn target_for_stage(&self) -> Option<TargetRef> {
        Some(TargetRef::stage("stage"))
    }

    fn add_extension(&self, extension_id: &str) {
        info!(extension = %extension_id, "Extension added");
    }

    fn register_extension_primitives(&self, descriptor: &ModuleDescriptor) -> Result<()> {
        info!(
            extension = %descriptor.id,
            service = %descriptor.service_name,
            blocks = descriptor.prepared_blocks().count(),
            "Extension primitives registered"
        );
        self.state.lock().extensions.push(descriptor.clone());
        Ok(())
    }

    fn register_device_primitives(&self, descriptors: &[ModuleDescriptor]) -> Result<()> {
        let categories: Vec<&str> = descriptors.iter().map(|d| d.id.as_str()).collect();
        info!(categories = ?categories, "Device primitives registered");
        self.state.lock().device = descriptors.to_vec();
        Ok(())
    }

    fn emit_device_added(&self, device_id: Option<&str>, descriptors: &[ModuleDescriptor]) {
        match device_id {
            Some(device) => info!(device = %device, categories = descriptors.len(), "Device added"),
            None => info!("Device removed"),
        }
    }

    fn current_device(&self) -> Option<String> {
        self.state.lock().current_device.clone()
    }

    fn disconnect_peripheral(&self, device_id: Option<&str>) {
        debug!(device = ?device_id, "Disconnecting peripheral");
    }

    fn set_device(&self, device_id: Option<&str>) {
        self.state.lock().current_device = device_id.map(str::to_string);
    }

    fn set_device_type(&self, device_type: Option<&str>) {
        debug!(device_type = ?device_type, "Device type set");
    }

    fn set_pnp_id_list(&self, pnp_ids: &[String]) {
        debug!(pnp_ids = ?pnp_ids, "PnP id filters set");
    }

    fn clear_monitor(&self) {
        debug!("Monitor cleared");
    }

    fn loaded_device_extensions(&self) -> Vec<String> {
        self.state.lock().device_extensions.clone()
    }

    fn add_device_extension(&self, id: &str, assets: &DeviceExtensionAssets) -> Result<()> {
        info!(extension = %id, toolbox = %assets.toolbox, "Device extension added");
        self.state.lock().device_extensions.push(id.to_string());
        Ok(())
    }

    fn remove_device_extension(&self, id: &str) {
        info!(extension = %id, "Device extension removed");
        self.state.lock().device_extensions.retain(|loaded| loaded != id);
    }
}
