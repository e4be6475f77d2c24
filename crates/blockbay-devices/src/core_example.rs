//! Builtin example extension.
//!
//! Exercises every kind of metadata the runtime understands: a button, a
//! dynamic menu, a dynamic operation and plain commands and reporters.

use std::sync::Arc;

use blockbay_core::{
    ArgumentInfo, BlockInfo, BlockType, ExtensionModule, MenuInfo, ModuleInfo, OperationTable,
};
use dashmap::DashMap;
use serde_json::{json, Value};

use crate::args;

pub const EXTENSION_ID: &str = "coreExample";

/// Things remembered per target id.
#[derive(Default)]
pub struct CoreExample {
    things: DashMap<String, Vec<String>>,
}

impl CoreExample {
    pub fn new() -> Self {
        Self::default()
    }

    fn target_key(value: Option<&Value>) -> String {
        value
            .and_then(Value::as_str)
            .unwrap_or("stage")
            .to_string()
    }

    pub fn remembered(&self, target: &str) -> Vec<String> {
        self.things
            .get(target)
            .map(|things| things.value().clone())
            .unwrap_or_default()
    }
}

impl ExtensionModule for CoreExample {
    fn info(&self) -> ModuleInfo {
        ModuleInfo::new(EXTENSION_ID)
            .with_name("CoreEx")
            .with_block(
                BlockInfo::button("make a variable (CoreEx)").with_func("MAKE_A_VARIABLE"),
            )
            .with_block(
                BlockInfo::new("exampleOpcode", BlockType::Reporter)
                    .with_text("example block [TARGET]")
                    .with_argument("TARGET", ArgumentInfo::new("string").with_default("stage")),
            )
            .with_block(
                BlockInfo::new("rememberThing", BlockType::Command)
                    .with_text("remember [THING] for [TARGET]")
                    .with_argument("THING", ArgumentInfo::new("string").with_default("apple"))
                    .with_argument("TARGET", ArgumentInfo::new("string").with_default("stage")),
            )
            .with_block(
                BlockInfo::new("pickThing", BlockType::Reporter)
                    .with_text("pick [THING]")
                    .with_argument("THING", ArgumentInfo::new("string").with_menu("things")),
            )
            .with_separator()
            .with_block(
                BlockInfo::new("describeBlock", BlockType::Reporter)
                    .with_text("describe this block")
                    .dynamic(),
            )
            .with_menu("things", MenuInfo::dynamic("getThings").accepting_reporters())
    }

    fn operations(self: Arc<Self>) -> OperationTable {
        let this = self.clone();
        let remember = self.clone();
        let menu = self;

        OperationTable::new()
            .with_handler("exampleOpcode", move |a: &[Value]| {
                let target = CoreExample::target_key(a.first().and_then(|o| o.get("TARGET")));
                Ok(this
                    .remembered(&target)
                    .last()
                    .map(|thing| json!(thing))
                    .unwrap_or_else(|| json!("nothing yet")))
            })
            .with_handler("rememberThing", move |a: &[Value]| {
                let thing = args::text(a, "THING")?;
                let target = CoreExample::target_key(a.first().and_then(|o| o.get("TARGET")));
                remember.things.entry(target).or_default().push(thing);
                Ok(Value::Null)
            })
            .with_handler("pickThing", |a: &[Value]| Ok(json!(args::text(a, "THING")?)))
            .with_handler("describeBlock", |a: &[Value]| {
                let info = a.get(1).cloned().unwrap_or(Value::Null);
                Ok(info.get("text").cloned().unwrap_or(Value::Null))
            })
            // Menu functions receive the target id.
            .with_handler("getThings", move |a: &[Value]| {
                let target = CoreExample::target_key(a.first());
                let items: Vec<Value> = menu
                    .remembered(&target)
                    .into_iter()
                    .map(|thing| json!({ "text": thing.clone(), "value": thing }))
                    .collect();
                Ok(Value::Array(items))
            })
    }
}
