//! Metadata sanitizer.
//!
//! Validates a module's raw `getInfo()` output and turns it into a
//! [`ModuleDescriptor`]: ids are checked, defaults are filled in, each
//! callable operation is bound to its service once, and menus are prepared.
//! A malformed operation is logged and dropped without failing the module.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, warn};

use crate::descriptor::{
    BlockEntry, BlockInfo, BlockSpec, BlockType, ModuleDescriptor, ModuleInfo, PreparedBlock,
    PreparedEntry, SEPARATOR,
};
use crate::dispatch::{Callable, DispatchFuture, Dispatcher, Locality, ServiceBinding};
use crate::error::{Error, Result};
use crate::host::HostRuntime;
use crate::menu::MenuResolver;

/// Module ids are non-empty and ASCII alphanumeric.
pub fn is_valid_module_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Replace the first `<`, `"` or `&` with `_`.
pub fn sanitize_id(text: &str) -> String {
    let mut sanitized = text.to_string();
    if let Some(pos) = text.find(['<', '"', '&']) {
        sanitized.replace_range(pos..pos + 1, "_");
    }
    sanitized
}

/// Pick the operation spec a call should see.
///
/// Dynamic operations carry their spec in `args.mutation.blockInfo`; when
/// it is absent the declared spec is used.
pub fn resolve_block_info<'a>(is_dynamic: bool, args: &'a Value, declared: &'a Value) -> &'a Value {
    if is_dynamic {
        if let Some(info) = args.pointer("/mutation/blockInfo").filter(|v| !v.is_null()) {
            return info;
        }
    }
    declared
}

/// Fill in operation defaults without binding anything.
pub fn canonicalize_block(block: BlockInfo) -> Result<BlockSpec> {
    let block_type = block.block_type.unwrap_or_default();
    let mut opcode = block
        .opcode
        .filter(|opcode| !opcode.is_empty())
        .map(|opcode| sanitize_id(&opcode));
    let text = block
        .text
        .filter(|text| !text.is_empty())
        .or_else(|| opcode.clone())
        .unwrap_or_default();

    let func = match block_type {
        BlockType::Event => {
            if let Some(func) = &block.func {
                warn!(func = %func, opcode = ?opcode, "Ignoring function for event block");
            }
            None
        }
        BlockType::Button => {
            if let Some(opcode) = opcode.take() {
                warn!(opcode = %opcode, text = %text, "Ignoring opcode for button");
            }
            None
        }
        _ => {
            if opcode.is_none() {
                return Err(Error::OperationDropped("Missing opcode for block".to_string()));
            }
            block
                .func
                .filter(|func| !func.is_empty())
                .map(|func| sanitize_id(&func))
        }
    };

    Ok(BlockSpec {
        opcode,
        func,
        block_type,
        text,
        terminal: block.terminal.unwrap_or(false),
        block_all_threads: block.block_all_threads.unwrap_or(false),
        arguments: block.arguments.unwrap_or_default(),
        is_dynamic: block.is_dynamic,
        extra: block.extra,
    })
}

// ============================================================================
// Block functions
// ============================================================================

/// Callable attached to a prepared operation.
///
/// Calls receive `[args, real_block_info]`.
#[derive(Clone)]
pub struct BlockFunction {
    method: String,
    callable: Callable,
    declared: Arc<Value>,
    is_dynamic: bool,
}

impl BlockFunction {
    fn bind(binding: &ServiceBinding, spec: &BlockSpec) -> Result<Self> {
        let method = spec
            .func
            .clone()
            .or_else(|| spec.opcode.clone())
            .ok_or_else(|| Error::OperationDropped("Missing opcode for block".to_string()))?;
        Ok(Self {
            callable: binding.resolve(&method),
            method,
            declared: Arc::new(serde_json::to_value(spec)?),
            is_dynamic: spec.is_dynamic,
        })
    }

    /// Name of the service method behind this operation.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn locality(&self) -> Locality {
        self.callable.locality()
    }

    pub fn real_block_info(&self, args: &Value) -> Value {
        resolve_block_info(self.is_dynamic, args, &self.declared).clone()
    }

    pub fn call(&self, args: Value) -> DispatchFuture {
        let info = self.real_block_info(&args);
        self.callable.call(vec![args, info])
    }

    pub fn call_sync(&self, args: Value) -> Result<Value> {
        let info = self.real_block_info(&args);
        self.callable.call_sync(&[args, info])
    }
}

impl fmt::Debug for BlockFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockFunction")
            .field("method", &self.method)
            .field("callable", &self.callable)
            .field("is_dynamic", &self.is_dynamic)
            .finish()
    }
}

// ============================================================================
// Sanitizer
// ============================================================================

/// Turns raw module metadata into descriptors bound to a service.
#[derive(Clone)]
pub struct Sanitizer {
    dispatcher: Arc<Dispatcher>,
    menus: MenuResolver,
}

impl Sanitizer {
    pub fn new(dispatcher: Arc<Dispatcher>, host: Arc<dyn HostRuntime>) -> Self {
        Self {
            dispatcher,
            menus: MenuResolver::new(host),
        }
    }

    /// Prepare an extension's metadata. Fails only for an invalid id or an
    /// unknown service.
    pub fn prepare_extension_info(
        &self,
        service_name: &str,
        info: ModuleInfo,
    ) -> Result<ModuleDescriptor> {
        let binding = self.dispatcher.binding(service_name)?;
        self.prepare_module(&binding, info)
    }

    /// Prepare every category of a device. A failing category is logged and
    /// skipped.
    pub fn prepare_device_info(
        &self,
        service_name: &str,
        infos: Vec<ModuleInfo>,
    ) -> Vec<ModuleDescriptor> {
        let binding = match self.dispatcher.binding(service_name) {
            Ok(binding) => binding,
            Err(err) => {
                error!(service = %service_name, error = %err, "Cannot prepare device info");
                return Vec::new();
            }
        };

        infos
            .into_iter()
            .filter_map(|info| {
                let category = info.id.clone();
                match self.prepare_module(&binding, info) {
                    Ok(descriptor) => Some(descriptor),
                    Err(err) => {
                        error!(category = %category, error = %err, "Failed to prepare device category");
                        None
                    }
                }
            })
            .collect()
    }

    pub fn prepare_block_info(&self, service_name: &str, block: BlockInfo) -> Result<PreparedBlock> {
        let binding = self.dispatcher.binding(service_name)?;
        prepare_block(&binding, block)
    }

    fn prepare_module(&self, binding: &ServiceBinding, info: ModuleInfo) -> Result<ModuleDescriptor> {
        if !is_valid_module_id(&info.id) {
            return Err(Error::InvalidDescriptor(format!(
                "Invalid extension id: {:?}",
                info.id
            )));
        }

        let mut blocks = Vec::with_capacity(info.blocks.len());
        for entry in info.blocks {
            match entry {
                BlockEntry::Marker(marker) if marker == SEPARATOR => {
                    blocks.push(PreparedEntry::Separator)
                }
                BlockEntry::Marker(marker) => {
                    warn!(extension = %info.id, marker = %marker, "Ignoring unknown block marker");
                }
                BlockEntry::Block(block) => match prepare_block(binding, *block) {
                    Ok(prepared) => blocks.push(PreparedEntry::Block(prepared)),
                    Err(err) => {
                        error!(extension = %info.id, error = %err, "Error processing block");
                    }
                },
            }
        }

        Ok(ModuleDescriptor {
            name: info.name.unwrap_or_else(|| info.id.clone()),
            id: info.id,
            service_name: binding.service_name().to_string(),
            colors: info.colors,
            block_icon_uri: info.block_icon_uri,
            target_types: info.target_types,
            blocks,
            menus: self.menus.prepare_menu_info(binding, info.menus),
        })
    }
}

fn prepare_block(binding: &ServiceBinding, block: BlockInfo) -> Result<PreparedBlock> {
    let spec = canonicalize_block(block)?;
    let func = if spec.block_type.has_callable() {
        Some(BlockFunction::bind(binding, &spec)?)
    } else {
        None
    };
    Ok(PreparedBlock { spec, func })
}
