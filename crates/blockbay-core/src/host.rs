//! Host runtime capabilities.
//!
//! The manager never talks to the editor, the peripheral link or the
//! workspace directly. Everything it needs from its surroundings goes
//! through [`HostRuntime`].

use crate::descriptor::{MessageDescriptor, ModuleDescriptor};
use crate::error::Result;

/// A sprite or the stage, as seen by dynamic menus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    pub id: String,
    pub name: String,
    pub is_stage: bool,
}

impl TargetRef {
    pub fn sprite(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_stage: false,
        }
    }

    pub fn stage(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Stage".to_string(),
            is_stage: true,
        }
    }
}

/// Asset addresses of a device extension add-on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceExtensionAssets {
    pub toolbox: String,
    pub blocks: String,
    pub generator: String,
    pub msg: String,
}

/// What the manager requires from the surrounding runtime.
///
/// Only the two registration notifications are mandatory; the remaining
/// capabilities default to doing nothing.
pub trait HostRuntime: Send + Sync {
    /// The target currently being edited, if any.
    fn editing_target(&self) -> Option<TargetRef> {
        None
    }

    /// The stage target, used when nothing is being edited.
    fn target_for_stage(&self) -> Option<TargetRef> {
        None
    }

    /// Format a localisable message for a target.
    fn format_message(&self, message: &MessageDescriptor, _target: Option<&TargetRef>) -> String {
        message.default.clone()
    }

    /// A builtin extension finished loading.
    fn add_extension(&self, _extension_id: &str) {}

    /// An extension's primitives are ready.
    fn register_extension_primitives(&self, descriptor: &ModuleDescriptor) -> Result<()>;

    /// An already registered extension re-reported its metadata.
    fn refresh_extension_primitives(&self, descriptor: &ModuleDescriptor) -> Result<()> {
        self.register_extension_primitives(descriptor)
    }

    /// A device's categories are ready.
    fn register_device_primitives(&self, descriptors: &[ModuleDescriptor]) -> Result<()>;

    /// Notify listeners of the selected device. `None` with no categories
    /// means the device was removed.
    fn emit_device_added(&self, _device_id: Option<&str>, _descriptors: &[ModuleDescriptor]) {}

    /// Map a requested device id to the id of the builtin implementing it.
    fn analysis_real_device_id(&self, device_id: &str) -> String {
        device_id
            .rsplit('_')
            .next()
            .unwrap_or(device_id)
            .to_string()
    }

    fn current_device(&self) -> Option<String> {
        None
    }

    fn disconnect_peripheral(&self, _device_id: Option<&str>) {}

    fn set_device(&self, _device_id: Option<&str>) {}

    fn set_device_type(&self, _device_type: Option<&str>) {}

    fn set_pnp_id_list(&self, _pnp_ids: &[String]) {}

    fn clear_monitor(&self) {}

    /// Drop the editor's current extension selection.
    fn clear_current_extension(&self) {}

    /// Ids of the device extension add-ons currently loaded.
    fn loaded_device_extensions(&self) -> Vec<String> {
        Vec::new()
    }

    fn add_device_extension(&self, _id: &str, _assets: &DeviceExtensionAssets) -> Result<()> {
        Ok(())
    }

    fn remove_device_extension(&self, _id: &str) {}

    fn is_device_extension_loaded(&self, id: &str) -> bool {
        self.loaded_device_extensions().iter().any(|loaded| loaded == id)
    }
}
