//! Command-line interface for blockbay.

mod console;

use std::sync::Arc;

use anyhow::{Context, Result};
use blockbay_core::prelude::*;
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;

use crate::console::ConsoleHost;

/// blockbay - load block extensions and peripheral devices.
#[derive(Parser, Debug)]
#[command(name = "blockbay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform.
    #[command(subcommand)]
    command: Command,

    /// Resources server address.
    #[arg(long, global = true)]
    resources_url: Option<String>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// List the builtin extensions and devices.
    Builtins,
    /// Load a builtin and print its sanitized metadata.
    Describe {
        /// Extension or device id.
        id: String,
    },
    /// Switch through devices in order and report each transition.
    Switch {
        /// Device ids; `unselectDevice` clears the active device.
        #[arg(required = true)]
        devices: Vec<String>,
    },
    /// Call an operation on a builtin.
    Call {
        /// Extension or device id.
        id: String,
        /// Operation name.
        method: String,
        /// Arguments object as JSON.
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Fetch a catalog from the resources server.
    Catalog {
        #[arg(value_enum)]
        kind: CatalogKind,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CatalogKind {
    Devices,
    Extensions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = ManagerConfig::from_env();
    if let Some(url) = args.resources_url {
        config = config.with_resources_url(url);
    }

    let host = Arc::new(ConsoleHost::new());
    let manager = ExtensionManager::create(host.clone(), blockbay_devices::builtins(), config)
        .context("Failed to create extension manager")?;

    let result = match args.command {
        Command::Builtins => list_builtins(&manager),
        Command::Describe { id } => describe(&manager, &host, &id),
        Command::Switch { devices } => switch(&manager, &devices),
        Command::Call { id, method, args } => call(&manager, &id, &method, &args).await,
        Command::Catalog { kind } => catalog(&manager, kind).await,
    };

    manager.teardown();
    result
}

fn init_logging(verbose: bool) {
    let json_logging = env_vars::log_json();

    let default_level = if verbose { "blockbay=debug" } else { "blockbay=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries command output.
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_level(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn list_builtins(manager: &ExtensionManager) -> Result<()> {
    println!("Extensions:");
    for id in manager.builtins().extension_ids() {
        println!("  {}", id);
    }
    println!("Devices:");
    for id in manager.builtins().device_ids() {
        println!("  {}", id);
    }
    Ok(())
}

/// Load a builtin extension or device by id and return its service.
fn load_builtin(manager: &ExtensionManager, id: &str) -> Result<String> {
    if manager.builtins().has_extension(id) {
        manager.load_extension_id_sync(id)?;
        return manager
            .registry()
            .extension_service(id)
            .with_context(|| format!("Extension {} did not register", id));
    }

    match manager.load_device(DeviceRequest::new(id))? {
        DeviceOutcome::Activated { service_name } => Ok(service_name),
        DeviceOutcome::AlreadyLoaded | DeviceOutcome::Cleared => {
            anyhow::bail!("No device service for {}", id)
        }
    }
}

fn describe(manager: &ExtensionManager, host: &ConsoleHost, id: &str) -> Result<()> {
    load_builtin(manager, id)?;

    let infos: Vec<ModuleInfo> = match host.extension(id) {
        Some(descriptor) => vec![descriptor.to_info()],
        None => host
            .device_categories()
            .iter()
            .map(ModuleDescriptor::to_info)
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&infos)?);
    Ok(())
}

fn switch(manager: &ExtensionManager, devices: &[String]) -> Result<()> {
    for device in devices {
        match manager.load_device(DeviceRequest::new(device.as_str())) {
            Ok(DeviceOutcome::Activated { service_name }) => {
                println!("{}: activated as {}", device, service_name)
            }
            Ok(DeviceOutcome::AlreadyLoaded) => println!("{}: already loaded", device),
            Ok(DeviceOutcome::Cleared) => println!("{}: cleared", device),
            Err(e) => println!("{}: {}", device, e),
        }
    }

    match manager.device_state() {
        DeviceState::Active(active) => println!("Active device: {}", active.device_id),
        DeviceState::None => println!("Active device: none"),
    }
    Ok(())
}

async fn call(manager: &ExtensionManager, id: &str, method: &str, args: &str) -> Result<()> {
    let args: Value = serde_json::from_str(args).context("Arguments must be JSON")?;
    let service = load_builtin(manager, id)?;

    let result = manager
        .dispatcher()
        .call(&service, method, vec![args])
        .await
        .map_err(|e| anyhow::anyhow!("Call to {} failed: {}", method, e))?;
    println!("{}", result);
    Ok(())
}

async fn catalog(manager: &ExtensionManager, kind: CatalogKind) -> Result<()> {
    let base = &manager.config().resources_url;
    let entries = match kind {
        CatalogKind::Devices => manager
            .device_list()
            .await
            .map(serde_json::to_value)
            .transpose()?,
        CatalogKind::Extensions => manager
            .device_extension_list()
            .await
            .map(serde_json::to_value)
            .transpose()?,
    };

    let Some(entries) = entries else {
        anyhow::bail!("Could not reach the resources server at {}", base);
    };
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
