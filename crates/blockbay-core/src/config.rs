//! Runtime configuration defaults and environment overrides.
//!
//! Constants live in small modules so the CLI and tests can refer to the
//! same values the manager falls back to.

use serde::{Deserialize, Serialize};

/// Default endpoints.
pub mod endpoints {
    /// Local resources server hosting the device and extension catalogs.
    pub const LOCAL_RESOURCES: &str = "http://127.0.0.1:20120/";
}

/// Default values.
pub mod defaults {
    /// Catalog locale used when none is configured.
    pub const LOCALE: &str = "en";
    /// Device id that unloads the active device.
    pub const UNSELECT_DEVICE: &str = "unselectDevice";
}

/// Environment variable names.
pub mod env_vars {
    use super::{defaults, endpoints};

    pub const RESOURCES_URL: &str = "BLOCKBAY_RESOURCES_URL";
    pub const LOCALE: &str = "BLOCKBAY_LOCALE";
    pub const LOG_JSON: &str = "BLOCKBAY_LOG_JSON";

    /// Resources server address from the environment, or the default.
    pub fn resources_url() -> String {
        std::env::var(RESOURCES_URL)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(super::normalize_resources_url)
            .unwrap_or_else(|| endpoints::LOCAL_RESOURCES.to_string())
    }

    /// Catalog locale from the environment, or the default.
    pub fn locale() -> String {
        std::env::var(LOCALE)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| defaults::LOCALE.to_string())
    }

    /// Whether JSON log output was requested.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }
}

/// Configuration for an [`ExtensionManager`](crate::manager::ExtensionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Base address of the resources server, always ending in `/`.
    pub resources_url: String,
    /// Locale used to pick the catalog file.
    pub locale: String,
    /// Device id treated as "unload the current device".
    pub unselect_device_id: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            resources_url: endpoints::LOCAL_RESOURCES.to_string(),
            locale: defaults::LOCALE.to_string(),
            unselect_device_id: defaults::UNSELECT_DEVICE.to_string(),
        }
    }
}

impl ManagerConfig {
    /// Build a configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            resources_url: env_vars::resources_url(),
            locale: env_vars::locale(),
            ..Self::default()
        }
    }

    pub fn with_resources_url(mut self, url: impl Into<String>) -> Self {
        self.resources_url = normalize_resources_url(url.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Catalog address listing the available devices.
    pub fn device_catalog_url(&self) -> String {
        format!("{}devices/{}.json", self.resources_url, self.locale)
    }

    /// Catalog address listing the available device extensions.
    pub fn extension_catalog_url(&self) -> String {
        format!("{}extensions/{}.json", self.resources_url, self.locale)
    }
}

/// Ensure a resources address ends with exactly one `/`.
pub fn normalize_resources_url(url: String) -> String {
    format!("{}/", url.trim().trim_end_matches('/'))
}
