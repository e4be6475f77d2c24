//! Resource catalogs and device extension add-ons.
//!
//! The resources server publishes two JSON lists per locale: the devices a
//! user can pick and the device extension add-ons that can be layered on
//! top of the active device. Asset fields in both are relative to the
//! server and are made absolute before anything else sees them.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::host::{DeviceExtensionAssets, HostRuntime};

const USER_AGENT: &str = "blockbay-catalog";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve a catalog asset path against the resources server.
///
/// Paths that are already absolute are kept.
pub fn absolutize(base: &str, path: &str) -> String {
    if path.contains("://") || path.starts_with("data:") {
        return path.to_string();
    }
    format!("{}{}", base, path.trim_start_matches('/'))
}

fn absolutize_field(base: &str, field: &mut Option<String>) {
    if let Some(path) = field.as_mut() {
        *path = absolutize(base, path);
    }
}

/// Device listed by the resources server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCatalogEntry {
    #[serde(default)]
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(rename = "iconURL", default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(
        rename = "connectionIconURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub connection_icon_url: Option<String>,
    #[serde(
        rename = "connectionSmallIconURL",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub connection_small_icon_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceCatalogEntry {
    pub fn with_base(mut self, base: &str) -> Self {
        absolutize_field(base, &mut self.icon_url);
        absolutize_field(base, &mut self.connection_icon_url);
        absolutize_field(base, &mut self.connection_small_icon_url);
        self
    }
}

/// Device extension add-on listed by the resources server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceExtensionEntry {
    pub extension_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "iconURL", default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub toolbox: String,
    #[serde(default)]
    pub blocks: String,
    #[serde(default)]
    pub generator: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(default)]
    pub is_loaded: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeviceExtensionEntry {
    pub fn with_base(mut self, base: &str) -> Self {
        absolutize_field(base, &mut self.icon_url);
        self
    }

    /// Absolute addresses of the add-on's assets.
    pub fn assets(&self, base: &str) -> DeviceExtensionAssets {
        DeviceExtensionAssets {
            toolbox: absolutize(base, &self.toolbox),
            blocks: absolutize(base, &self.blocks),
            generator: absolutize(base, &self.generator),
            msg: absolutize(base, &self.msg),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Fetches catalogs from the resources server.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    config: ManagerConfig,
}

impl CatalogClient {
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<Vec<T>> {
        debug!(url = %url, "Fetching catalog");
        let entries = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<T>>()
            .await?;
        Ok(entries)
    }

    /// Devices offered by the resources server.
    pub async fn fetch_devices(&self) -> Result<Vec<DeviceCatalogEntry>> {
        let base = &self.config.resources_url;
        let entries: Vec<DeviceCatalogEntry> =
            self.fetch(&self.config.device_catalog_url()).await?;
        Ok(entries.into_iter().map(|entry| entry.with_base(base)).collect())
    }

    /// Device extension add-ons offered by the resources server, flagged
    /// with whether the host has them loaded.
    pub async fn fetch_device_extensions(
        &self,
        is_loaded: impl Fn(&str) -> bool,
    ) -> Result<Vec<DeviceExtensionEntry>> {
        let base = &self.config.resources_url;
        let entries: Vec<DeviceExtensionEntry> =
            self.fetch(&self.config.extension_catalog_url()).await?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let mut entry = entry.with_base(base);
                if is_loaded(&entry.extension_id) {
                    entry.is_loaded = true;
                }
                entry
            })
            .collect())
    }
}

// ============================================================================
// Add-ons
// ============================================================================

/// The last fetched add-on catalog and the load/unload operations on it.
#[derive(Debug, Default)]
pub struct DeviceExtensions {
    entries: Mutex<Vec<DeviceExtensionEntry>>,
}

impl DeviceExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, entries: Vec<DeviceExtensionEntry>) {
        *self.entries.lock() = entries;
    }

    pub fn find(&self, extension_id: &str) -> Option<DeviceExtensionEntry> {
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.extension_id == extension_id)
            .cloned()
    }

    /// Load an add-on from the cached catalog.
    pub fn load(&self, host: &dyn HostRuntime, base: &str, extension_id: &str) -> Result<()> {
        let entry = self
            .find(extension_id)
            .ok_or_else(|| Error::ExtensionNotFound(extension_id.to_string()))?;
        host.add_device_extension(extension_id, &entry.assets(base))?;
        info!(extension = %extension_id, "Loaded device extension");
        Ok(())
    }

    pub fn unload(&self, host: &dyn HostRuntime, extension_id: &str) {
        host.remove_device_extension(extension_id);
        debug!(extension = %extension_id, "Unloaded device extension");
    }

    /// Unload every add-on the host reports as loaded.
    pub fn unload_all(&self, host: &dyn HostRuntime) {
        for extension_id in host.loaded_device_extensions() {
            self.unload(host, &extension_id);
        }
    }
}
