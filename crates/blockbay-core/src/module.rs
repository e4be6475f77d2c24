//! Module traits and the builtin catalog.
//!
//! Extensions and devices are plain Rust values implementing
//! [`ExtensionModule`] or [`DeviceModule`]. A module exposes its metadata and
//! a table of named operations; the runtime adds `getInfo` on top.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::descriptor::ModuleInfo;
use crate::dispatch::{OperationTable, GET_INFO};

/// An extension: one category of operations.
pub trait ExtensionModule: Send + Sync + 'static {
    fn info(&self) -> ModuleInfo;

    /// Operations callable by name, keyed by opcode or `func`.
    fn operations(self: Arc<Self>) -> OperationTable;
}

/// A device: a peripheral contributing one or more categories.
pub trait DeviceModule: Send + Sync + 'static {
    fn device_id(&self) -> &str;

    fn info(&self) -> Vec<ModuleInfo>;

    fn operations(self: Arc<Self>) -> OperationTable;
}

/// Builds a builtin extension.
pub type ExtensionFactory = Arc<dyn Fn() -> Arc<dyn ExtensionModule> + Send + Sync>;

/// Builds a builtin device for the requested device id.
pub type DeviceFactory = Arc<dyn Fn(&str) -> Arc<dyn DeviceModule> + Send + Sync>;

/// Operations of an extension, including `getInfo`.
pub fn extension_operations(module: Arc<dyn ExtensionModule>) -> OperationTable {
    let source = module.clone();
    let mut table = module.operations();
    table.insert(GET_INFO, move |_: &[Value]| Ok(serde_json::to_value(source.info())?));
    table
}

/// Operations of a device, including `getInfo`.
pub fn device_operations(module: Arc<dyn DeviceModule>) -> OperationTable {
    let source = module.clone();
    let mut table = module.operations();
    table.insert(GET_INFO, move |_: &[Value]| Ok(serde_json::to_value(source.info())?));
    table
}

/// Extensions and devices that ship with the host, keyed by id.
#[derive(Clone, Default)]
pub struct Builtins {
    extensions: BTreeMap<String, ExtensionFactory>,
    devices: BTreeMap<String, DeviceFactory>,
}

impl Builtins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extension<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn ExtensionModule> + Send + Sync + 'static,
    {
        self.extensions.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn with_device<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&str) -> Arc<dyn DeviceModule> + Send + Sync + 'static,
    {
        self.devices.insert(id.into(), Arc::new(factory));
        self
    }

    pub fn extension(&self, id: &str) -> Option<&ExtensionFactory> {
        self.extensions.get(id)
    }

    pub fn device(&self, id: &str) -> Option<&DeviceFactory> {
        self.devices.get(id)
    }

    pub fn has_extension(&self, id: &str) -> bool {
        self.extensions.contains_key(id)
    }

    pub fn has_device(&self, id: &str) -> bool {
        self.devices.contains_key(id)
    }

    pub fn extension_ids(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().map(String::as_str)
    }

    pub fn device_ids(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }
}

impl fmt::Debug for Builtins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtins")
            .field("extensions", &self.extensions.keys().collect::<Vec<_>>())
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .finish()
    }
}
