//! Core runtime for blockbay.
//!
//! Loads block extensions and peripheral devices, validates the metadata
//! they describe themselves with, and routes calls to them whether they live
//! in the host or in an isolated context.

pub mod catalog;
pub mod channel;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod manager;
pub mod menu;
pub mod module;
pub mod registry;
pub mod sanitize;
pub mod worker;

pub use descriptor::{
    ArgumentInfo, BlockEntry, BlockInfo, BlockSpec, BlockType, CategoryColors, MenuInfo, MenuItem,
    MenuItems, MessageDescriptor, MessageText, ModuleDescriptor, ModuleInfo, PreparedBlock,
    PreparedEntry,
};
pub use device::{ActiveDevice, DeviceOutcome, DeviceRequest, DeviceState};
pub use dispatch::{Callable, Dispatcher, Locality, OperationTable, GET_INFO};
pub use error::{Error, RemotePayload, Result};
pub use host::{DeviceExtensionAssets, HostRuntime, TargetRef};
pub use manager::{ExtensionManager, ManagerBuilder};
pub use menu::{DynamicMenu, MenuPair, PreparedMenu};
pub use module::{Builtins, DeviceModule, ExtensionModule};
pub use worker::{ContextSpawner, ModuleLoader, TaskSpawner};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{defaults, endpoints, env_vars, ManagerConfig};
    pub use crate::descriptor::{
        ArgumentInfo, BlockInfo, BlockType, CategoryColors, MenuInfo, MenuItem, MessageDescriptor,
        ModuleDescriptor, ModuleInfo,
    };
    pub use crate::device::{DeviceOutcome, DeviceRequest, DeviceState};
    pub use crate::dispatch::OperationTable;
    pub use crate::error::{Error, Result};
    pub use crate::host::{HostRuntime, TargetRef};
    pub use crate::manager::ExtensionManager;
    pub use crate::module::{Builtins, DeviceModule, ExtensionModule};
}
