//! Host runtime that records every call it receives.

use std::sync::atomic::{AtomicBool, Ordering};

use blockbay_core::{
    DeviceExtensionAssets, Error, HostRuntime, ModuleDescriptor, Result, TargetRef,
};
use parking_lot::Mutex;
use tracing::trace;

/// One call made by the manager into the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    AddExtension(String),
    RegisterExtension { id: String, service: String },
    RefreshExtension { id: String, service: String },
    /// Category ids of a registered device, in order.
    RegisterDevice(Vec<String>),
    DeviceAdded {
        device: Option<String>,
        categories: Vec<String>,
    },
    DisconnectPeripheral(Option<String>),
    SetDevice(Option<String>),
    SetDeviceType(Option<String>),
    SetPnpIdList(Vec<String>),
    ClearMonitor,
    ClearCurrentExtension,
    AddDeviceExtension(String),
    RemoveDeviceExtension(String),
}

impl HostCall {
    /// Whether the call belongs to tearing a device down.
    pub fn is_teardown(&self) -> bool {
        matches!(
            self,
            Self::DisconnectPeripheral(_)
                | Self::SetDevice(None)
                | Self::SetDeviceType(None)
                | Self::ClearMonitor
                | Self::ClearCurrentExtension
                | Self::RemoveDeviceExtension(_)
        )
    }
}

#[derive(Default)]
struct HostState {
    calls: Vec<HostCall>,
    extensions: Vec<ModuleDescriptor>,
    device: Vec<ModuleDescriptor>,
    current_device: Option<String>,
    device_extensions: Vec<(String, DeviceExtensionAssets)>,
}

/// A [`HostRuntime`] for tests.
#[derive(Default)]
pub struct RecordingHost {
    state: Mutex<HostState>,
    editing: Mutex<Option<TargetRef>>,
    stage: Mutex<Option<TargetRef>>,
    reject_registrations: AtomicBool,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_editing_target(self, target: TargetRef) -> Self {
        *self.editing.lock() = Some(target);
        self
    }

    pub fn with_stage(self, stage: TargetRef) -> Self {
        *self.stage.lock() = Some(stage);
        self
    }

    pub fn set_editing_target(&self, target: Option<TargetRef>) {
        *self.editing.lock() = target;
    }

    /// Make registration notifications fail.
    pub fn reject_registrations(&self, reject: bool) {
        self.reject_registrations.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Index of the first recorded call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&HostCall) -> bool) -> Option<usize> {
        self.state.lock().calls.iter().position(predicate)
    }

    /// The most recent descriptor registered for an extension id.
    pub fn extension(&self, id: &str) -> Option<ModuleDescriptor> {
        self.state
            .lock()
            .extensions
            .iter()
            .rev()
            .find(|descriptor| descriptor.id == id)
            .cloned()
    }

    pub fn registered_extension_count(&self) -> usize {
        self.state.lock().extensions.len()
    }

    /// Categories of the most recently registered device.
    pub fn device_categories(&self) -> Vec<ModuleDescriptor> {
        self.state.lock().device.clone()
    }

    pub fn device_extension_assets(&self, id: &str) -> Option<DeviceExtensionAssets> {
        self.state
            .lock()
            .device_extensions
            .iter()
            .find(|(loaded, _)| loaded == id)
            .map(|(_, assets)| assets.clone())
    }

    fn record(&self, call: HostCall) {
        trace!(call = ?call, "Host call");
        self.state.lock().calls.push(call);
    }

    fn check_registration(&self) -> Result<()> {
        if self.reject_registrations.load(Ordering::SeqCst) {
            return Err(Error::Host("registration rejected".to_string()));
        }
        Ok(())
    }
}

fn category_ids(descriptors: &[ModuleDescriptor]) -> Vec<String> {
    descriptors.iter().map(|d| d.id.clone()).collect()
}

impl HostRuntime for RecordingHost {
    fn editing_target(&self) -> Option<TargetRef> {
        self.editing.lock().clone()
    }

    fn target_for_stage(&self) -> Option<TargetRef> {
        self.stage.lock().clone()
    }

    fn add_extension(&self, extension_id: &str) {
        self.record(HostCall::AddExtension(extension_id.to_string()));
    }

    fn register_extension_primitives(&self, descriptor: &ModuleDescriptor) -> Result<()> {
        self.record(HostCall::RegisterExtension {
            id: descriptor.id.clone(),
            service: descriptor.service_name.clone(),
        });
        self.check_registration()?;
        self.state.lock().extensions.push(descriptor.clone());
        Ok(())
    }

    fn refresh_extension_primitives(&self, descriptor: &ModuleDescriptor) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::RefreshExtension {
            id: descriptor.id.clone(),
            service: descriptor.service_name.clone(),
        });
        state.extensions.push(descriptor.clone());
        Ok(())
    }

    fn register_device_primitives(&self, descriptors: &[ModuleDescriptor]) -> Result<()> {
        self.record(HostCall::RegisterDevice(category_ids(descriptors)));
        self.check_registration()?;
        self.state.lock().device = descriptors.to_vec();
        Ok(())
    }

    fn emit_device_added(&self, device_id: Option<&str>, descriptors: &[ModuleDescriptor]) {
        self.record(HostCall::DeviceAdded {
            device: device_id.map(str::to_string),
            categories: category_ids(descriptors),
        });
    }

    fn current_device(&self) -> Option<String> {
        self.state.lock().current_device.clone()
    }

    fn disconnect_peripheral(&self, device_id: Option<&str>) {
        self.record(HostCall::DisconnectPeripheral(device_id.map(str::to_string)));
    }

    fn set_device(&self, device_id: Option<&str>) {
        let device = device_id.map(str::to_string);
        let mut state = self.state.lock();
        state.current_device = device.clone();
        state.calls.push(HostCall::SetDevice(device));
    }

    fn set_device_type(&self, device_type: Option<&str>) {
        self.record(HostCall::SetDeviceType(device_type.map(str::to_string)));
    }

    fn set_pnp_id_list(&self, pnp_ids: &[String]) {
        self.record(HostCall::SetPnpIdList(pnp_ids.to_vec()));
    }

    fn clear_monitor(&self) {
        self.record(HostCall::ClearMonitor);
    }

    fn clear_current_extension(&self) {
        self.record(HostCall::ClearCurrentExtension);
    }

    fn loaded_device_extensions(&self) -> Vec<String> {
        self.state
            .lock()
            .device_extensions
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn add_device_extension(&self, id: &str, assets: &DeviceExtensionAssets) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(HostCall::AddDeviceExtension(id.to_string()));
        state.device_extensions.push((id.to_string(), assets.clone()));
        Ok(())
    }

    fn remove_device_extension(&self, id: &str) {
        let mut state = self.state.lock();
        state.calls.push(HostCall::RemoveDeviceExtension(id.to_string()));
        state.device_extensions.retain(|(loaded, _)| loaded != id);
    }
}
