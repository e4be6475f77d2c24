//! Fixture modules, loaders and spawners.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use blockbay_core::channel::ContextEnd;
use blockbay_core::{
    ArgumentInfo, BlockInfo, BlockType, Builtins, CategoryColors, ContextSpawner, DeviceModule,
    Error, ExtensionModule, MenuInfo, MenuItem, ModuleInfo, ModuleLoader, OperationTable, Result,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Id of the fixture device in [`fixture_builtins`].
pub const FIXTURE_DEVICE: &str = "boardB";
/// A second fixture device, for switching.
pub const OTHER_DEVICE: &str = "boardC";
pub const FIXTURE_EXTENSION: &str = "greeter";

/// Extension with one of every kind of operation.
pub struct Greeter {
    id: String,
    greeted: Mutex<Vec<String>>,
}

impl Greeter {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            greeted: Mutex::new(Vec::new()),
        }
    }

    pub fn greeted(&self) -> Vec<String> {
        self.greeted.lock().clone()
    }
}

impl ExtensionModule for Greeter {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(self.id.clone())
            .with_name("Greeter")
            .with_colors(CategoryColors::new("#0FBD8C", "#0DA57A", "#0B8E69"))
            .with_block(
                BlockInfo::new("greet", BlockType::Reporter)
                    .with_text("greet [NAME]")
                    .with_argument("NAME", ArgumentInfo::new("string").with_menu("names")),
            )
            .with_block(BlockInfo::new("wave", BlockType::Command).with_func("doWave"))
            .with_block(BlockInfo::new("fail", BlockType::Command))
            .with_block(BlockInfo::new("whenGreeted", BlockType::Event).with_func("ignored"))
            .with_block(BlockInfo::button("Make a greeting"))
            .with_separator()
            .with_block(BlockInfo::new("shape", BlockType::Reporter).dynamic())
            .with_block(BlockInfo::new("", BlockType::Command))
            .with_block(BlockInfo::new("notImplemented", BlockType::Command))
            .with_menu("names", MenuInfo::dynamic("listNames"))
            .with_menu("emptyNames", MenuInfo::dynamic("listNothing"))
            .with_menu(
                "moods",
                MenuInfo::fixed(vec![
                    MenuItem::Text("happy".to_string()),
                    MenuItem::pair("sad", "SAD"),
                ]),
            )
    }

    fn operations(self: Arc<Self>) -> OperationTable {
        let greeter = self;
        OperationTable::new()
            .with_handler("greet", move |args: &[Value]| {
                let name = args
                    .first()
                    .and_then(|a| a.get("NAME"))
                    .and_then(Value::as_str)
                    .unwrap_or("world")
                    .to_string();
                greeter.greeted.lock().push(name.clone());
                Ok(json!(format!("Hello, {name}")))
            })
            .with_handler("doWave", |_: &[Value]| Ok(json!("waved")))
            .with_handler("fail", |_: &[Value]| {
                Err(Error::ExecutionFailed("greeter refused".to_string()))
            })
            .with_handler("shape", |args: &[Value]| {
                Ok(args.get(1).and_then(|info| info.get("text")).cloned().unwrap_or(Value::Null))
            })
            .with_handler("listNames", |args: &[Value]| {
                let target = args.first().and_then(Value::as_str).unwrap_or("none");
                Ok(json!([
                    "Ada",
                    { "text": format!("{target}'s friend"), "value": "friend" },
                    { "text": { "id": "greeter.names.me", "default": "me" }, "value": 1 }
                ]))
            })
            .with_handler("listNothing", |_: &[Value]| Ok(json!([])))
    }
}

/// Device with two categories that counts its moves.
pub struct FixtureBoard {
    device_id: String,
    moves: AtomicUsize,
}

impl FixtureBoard {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            moves: AtomicUsize::new(0),
        }
    }
}

impl DeviceModule for FixtureBoard {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn info(&self) -> Vec<ModuleInfo> {
        vec![
            ModuleInfo::new("motion")
                .with_block(BlockInfo::new("move", BlockType::Command).with_text("move"))
                .with_block(BlockInfo::new("moves", BlockType::Reporter)),
            ModuleInfo::new("sensing")
                .with_block(BlockInfo::new("touching", BlockType::Boolean)),
            // Rejected: not alphanumeric.
            ModuleInfo::new("bad-category"),
        ]
    }

    fn operations(self: Arc<Self>) -> OperationTable {
        let counter = self.clone();
        let reader = self;
        OperationTable::new()
            .with_handler("move", move |_: &[Value]| {
                counter.moves.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            })
            .with_handler("moves", move |_: &[Value]| {
                Ok(json!(reader.moves.load(Ordering::SeqCst)))
            })
            .with_handler("touching", |_: &[Value]| Ok(json!(false)))
    }
}

/// Fixture builtins plus the real builtin devices.
pub fn fixture_builtins() -> Builtins {
    let mut builtins = blockbay_devices::builtins();
    for id in [FIXTURE_DEVICE, OTHER_DEVICE] {
        builtins = builtins.with_device(id, |device_id: &str| {
            Arc::new(FixtureBoard::new(device_id)) as _
        });
    }
    builtins.with_extension(FIXTURE_EXTENSION, || {
        Arc::new(Greeter::new(FIXTURE_EXTENSION)) as _
    })
}

/// Loads `fixture://greeter/<id>` as a [`Greeter`] with that id.
///
/// `fixture://fail` fails to load; anything else is not found.
#[derive(Default)]
pub struct FixtureLoader {
    loaded: Mutex<Vec<String>>,
}

impl FixtureLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs loaded so far, in order.
    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().clone()
    }
}

#[async_trait]
impl ModuleLoader for FixtureLoader {
    async fn load(&self, url: &str) -> Result<Arc<dyn ExtensionModule>> {
        self.loaded.lock().push(url.to_string());
        if url == "fixture://fail" {
            return Err(Error::ExecutionFailed("fixture failed to load".to_string()));
        }
        match url.strip_prefix("fixture://greeter/") {
            Some(id) => Ok(Arc::new(Greeter::new(id))),
            None => Err(Error::ExtensionNotFound(url.to_string())),
        }
    }
}

/// Holds spawned contexts so a test decides when each one starts.
#[derive(Default)]
pub struct HeldSpawner {
    held: Mutex<Vec<ContextEnd>>,
}

impl HeldSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> usize {
        self.held.lock().len()
    }

    /// Take every context spawned so far, oldest first.
    pub fn take(&self) -> Vec<ContextEnd> {
        std::mem::take(&mut *self.held.lock())
    }
}

impl ContextSpawner for HeldSpawner {
    fn spawn(&self, end: ContextEnd) {
        self.held.lock().push(end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixture_loader() {
        let loader = FixtureLoader::new();
        let module = loader.load("fixture://greeter/hello").await.unwrap();
        assert_eq!(module.info().id, "hello");

        assert!(matches!(
            loader.load("fixture://fail").await,
            Err(Error::ExecutionFailed(_))
        ));
        assert!(matches!(
            loader.load("https://elsewhere").await,
            Err(Error::ExtensionNotFound(_))
        ));
        assert_eq!(loader.loaded().len(), 3);
    }

    #[test]
    fn test_fixture_builtins() {
        let builtins = fixture_builtins();
        assert!(builtins.has_device(FIXTURE_DEVICE));
        assert!(builtins.has_device("unoCore"));
        assert!(builtins.has_extension("coreExample"));
        assert!(builtins.has_extension(FIXTURE_EXTENSION));
    }
}
