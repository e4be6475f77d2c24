//! Device switch.
//!
//! At most one device is active at a time. Switching devices tears the old
//! one down completely (peripheral link, device identity, monitors, loaded
//! extensions, add-ons) before the new device is registered, so the host
//! never sees registration for the new device interleaved with teardown of
//! the old one.
//!
//! ```text
//!            load(d)                 load(d2), d2 != d
//!   NONE ─────────────► ACTIVE(d) ───────────────────► teardown ─► ACTIVE(d2)
//!    ▲                     │
//!    └─── unselect ────────┘   (teardown + "device removed")
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::catalog::DeviceExtensions;
use crate::error::{Error, Result};
use crate::host::HostRuntime;
use crate::module::Builtins;
use crate::registry::ServiceRegistry;

/// A device load request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    pub device_id: String,
    pub device_type: Option<String>,
    pub pnp_id_list: Vec<String>,
}

impl DeviceRequest {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            device_type: None,
            pnp_id_list: Vec::new(),
        }
    }

    pub fn with_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    pub fn with_pnp_ids<I, S>(mut self, pnp_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pnp_id_list = pnp_ids.into_iter().map(Into::into).collect();
        self
    }
}

/// The active device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveDevice {
    pub device_id: String,
    pub device_type: Option<String>,
    pub pnp_id_filters: Vec<String>,
    pub service_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceState {
    #[default]
    None,
    Active(ActiveDevice),
}

impl DeviceState {
    pub fn active_device_id(&self) -> Option<&str> {
        match self {
            Self::Active(device) => Some(&device.device_id),
            Self::None => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Result of a device load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceOutcome {
    Activated { service_name: String },
    /// The device was already loaded; nothing changed.
    AlreadyLoaded,
    /// The unselect id was requested; no device is active.
    Cleared,
}

/// Collaborators a transition needs.
pub struct SwitchContext<'a> {
    pub registry: &'a ServiceRegistry,
    pub builtins: &'a Builtins,
    pub device_extensions: &'a DeviceExtensions,
}

/// Owner of the active device singleton.
pub struct DeviceSwitch {
    host: Arc<dyn HostRuntime>,
    unselect_id: String,
    state: Mutex<DeviceState>,
    // Held for a whole transition; `state` is only locked briefly so host
    // callbacks can still read it.
    transition: Mutex<()>,
}

impl DeviceSwitch {
    pub fn new(host: Arc<dyn HostRuntime>, unselect_id: impl Into<String>) -> Self {
        Self {
            host,
            unselect_id: unselect_id.into(),
            state: Mutex::new(DeviceState::None),
            transition: Mutex::new(()),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state.lock().clone()
    }

    /// Load a device, switching away from the active one if needed.
    pub fn load(&self, ctx: &SwitchContext<'_>, request: DeviceRequest) -> Result<DeviceOutcome> {
        let real_id = self.host.analysis_real_device_id(&request.device_id);
        let _transition = self.transition.lock();

        let Some(factory) = ctx.builtins.device(&real_id) else {
            if real_id == self.unselect_id {
                self.teardown(ctx);
                self.host.emit_device_added(None, &[]);
                return Ok(DeviceOutcome::Cleared);
            }
            return Err(Error::DeviceNotFound(request.device_id));
        };

        if ctx.registry.is_device_loaded(&request.device_id) {
            warn!(device = %request.device_id, "Rejecting attempt to load a device twice");
            return Ok(DeviceOutcome::AlreadyLoaded);
        }

        if self.state.lock().is_active() {
            self.teardown(ctx);
        }

        self.host.set_device(Some(&request.device_id));
        self.host.set_device_type(request.device_type.as_deref());
        self.host.set_pnp_id_list(&request.pnp_id_list);

        let module = factory(&request.device_id);
        let service_name = ctx.registry.register_local_device(&request.device_id, module)?;

        info!(
            device = %request.device_id,
            real_device = %real_id,
            service = %service_name,
            "Device activated"
        );
        *self.state.lock() = DeviceState::Active(ActiveDevice {
            device_id: request.device_id,
            device_type: request.device_type,
            pnp_id_filters: request.pnp_id_list,
            service_name: service_name.clone(),
        });
        Ok(DeviceOutcome::Activated { service_name })
    }

    /// Unload the active device, if any, and announce its removal.
    pub fn clear(&self, ctx: &SwitchContext<'_>) {
        let _transition = self.transition.lock();
        self.teardown(ctx);
        self.host.emit_device_added(None, &[]);
    }

    fn teardown(&self, ctx: &SwitchContext<'_>) {
        let previous = self.state.lock().active_device_id().map(str::to_string);
        debug!(device = ?previous, "Tearing down device");

        let current = self.host.current_device();
        self.host.disconnect_peripheral(current.as_deref());

        self.host.set_device(None);
        self.host.set_device_type(None);
        self.host.set_pnp_id_list(&[]);
        self.host.clear_monitor();
        ctx.registry.clear_devices();

        self.host.clear_current_extension();
        let cleared = ctx.registry.clear_extensions();
        if !cleared.is_empty() {
            debug!(extensions = ?cleared, "Cleared extensions");
        }
        ctx.device_extensions.unload_all(self.host.as_ref());

        *self.state.lock() = DeviceState::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_request_builder() {
        let request = DeviceRequest::new("arduinoUno")
            .with_type("arduino")
            .with_pnp_ids(["USB\\VID_1A86&PID_7523"]);
        assert_eq!(request.device_type.as_deref(), Some("arduino"));
        assert_eq!(request.pnp_id_list, vec!["USB\\VID_1A86&PID_7523".to_string()]);
    }

    #[test]
    fn test_state_accessors() {
        assert_eq!(DeviceState::default().active_device_id(), None);
        let state = DeviceState::Active(ActiveDevice {
            device_id: "unoCore".to_string(),
            device_type: None,
            pnp_id_filters: Vec::new(),
            service_name: "extension_0_unoCore".to_string(),
        });
        assert!(state.is_active());
        assert_eq!(state.active_device_id(), Some("unoCore"));
    }
}
