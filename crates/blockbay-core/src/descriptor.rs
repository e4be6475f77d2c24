//! Module metadata types.
//!
//! Two families of types live here:
//! - the raw `getInfo()` shape a module produces ([`ModuleInfo`], [`BlockInfo`],
//!   [`MenuInfo`]), where almost everything is optional, and
//! - the canonical shape produced by the sanitizer ([`ModuleDescriptor`],
//!   [`BlockSpec`]), where every default has been filled in and every callable
//!   operation carries its bound [`BlockFunction`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::menu::PreparedMenu;
use crate::sanitize::BlockFunction;

/// Marker placed between operations to draw a separator.
pub const SEPARATOR: &str = "---";

// ============================================================================
// Raw metadata (getInfo shape)
// ============================================================================

/// Kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BlockType {
    #[default]
    #[serde(rename = "command")]
    Command,
    /// Returns a value.
    #[serde(rename = "reporter")]
    Reporter,
    #[serde(rename = "Boolean")]
    Boolean,
    #[serde(rename = "event")]
    Event,
    /// Has no callable.
    #[serde(rename = "button")]
    Button,
    /// Carries a body.
    #[serde(rename = "conditional")]
    Conditional,
}

impl BlockType {
    /// Whether operations of this kind are bound to a callable.
    pub fn has_callable(self) -> bool {
        !matches!(self, Self::Event | Self::Button)
    }
}

/// Argument of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgumentInfo {
    #[serde(rename = "type", default = "default_argument_type")]
    pub arg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

fn default_argument_type() -> String {
    "string".to_string()
}

impl ArgumentInfo {
    pub fn new(arg_type: impl Into<String>) -> Self {
        Self {
            arg_type: arg_type.into(),
            menu: None,
            default_value: None,
        }
    }

    pub fn with_menu(mut self, menu: impl Into<String>) -> Self {
        self.menu = Some(menu.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// An operation as declared by a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opcode: Option<String>,
    /// Handler name, when it differs from the opcode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_type: Option<BlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminal: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_all_threads: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<BTreeMap<String, ArgumentInfo>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_dynamic: bool,
    /// Fields the runtime does not interpret (`programMode`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl BlockInfo {
    pub fn new(opcode: impl Into<String>, block_type: BlockType) -> Self {
        Self {
            opcode: Some(opcode.into()),
            block_type: Some(block_type),
            ..Self::default()
        }
    }

    /// A button; it has text but no opcode.
    pub fn button(text: impl Into<String>) -> Self {
        Self {
            block_type: Some(BlockType::Button),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_func(mut self, func: impl Into<String>) -> Self {
        self.func = Some(func.into());
        self
    }

    pub fn with_argument(mut self, name: impl Into<String>, argument: ArgumentInfo) -> Self {
        self.arguments
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), argument);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn dynamic(mut self) -> Self {
        self.is_dynamic = true;
        self
    }

    pub fn terminal(mut self) -> Self {
        self.terminal = Some(true);
        self
    }
}

/// Entry of a module's operation sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockEntry {
    /// A bare string; only [`SEPARATOR`] is meaningful.
    Marker(String),
    Block(Box<BlockInfo>),
}

impl BlockEntry {
    pub fn separator() -> Self {
        Self::Marker(SEPARATOR.to_string())
    }
}

impl From<BlockInfo> for BlockEntry {
    fn from(block: BlockInfo) -> Self {
        Self::Block(Box::new(block))
    }
}

/// Localisable message descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub id: String,
    pub default: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MessageDescriptor {
    pub fn new(id: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default: default.into(),
            description: None,
        }
    }
}

/// Menu item label: plain text or a message to format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageText {
    Plain(String),
    Message(MessageDescriptor),
}

impl From<&str> for MessageText {
    fn from(text: &str) -> Self {
        Self::Plain(text.to_string())
    }
}

impl From<String> for MessageText {
    fn from(text: String) -> Self {
        Self::Plain(text)
    }
}

impl From<MessageDescriptor> for MessageText {
    fn from(message: MessageDescriptor) -> Self {
        Self::Message(message)
    }
}

/// Static menu item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MenuItem {
    /// Text used as both label and value.
    Text(String),
    Pair { text: MessageText, value: Value },
}

impl MenuItem {
    pub fn pair(text: impl Into<MessageText>, value: impl Into<Value>) -> Self {
        Self::Pair {
            text: text.into(),
            value: value.into(),
        }
    }
}

/// Items of a menu: a static list, or the name of an operation producing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MenuItems {
    Function(String),
    Static(Vec<MenuItem>),
}

/// Menu as declared by a module, in short (`items` only) or general form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MenuInfo {
    Full {
        items: MenuItems,
        #[serde(
            rename = "acceptReporters",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        accept_reporters: Option<bool>,
    },
    Short(MenuItems),
}

impl MenuInfo {
    pub fn items(items: MenuItems) -> Self {
        Self::Full {
            items,
            accept_reporters: None,
        }
    }

    pub fn dynamic(function: impl Into<String>) -> Self {
        Self::items(MenuItems::Function(function.into()))
    }

    pub fn fixed(items: Vec<MenuItem>) -> Self {
        Self::items(MenuItems::Static(items))
    }

    pub fn accepting_reporters(self) -> Self {
        match self {
            Self::Full { items, .. } | Self::Short(items) => Self::Full {
                items,
                accept_reporters: Some(true),
            },
        }
    }
}

/// Category colors of a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryColors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color3: Option<String>,
}

impl CategoryColors {
    pub fn new(
        color1: impl Into<String>,
        color2: impl Into<String>,
        color3: impl Into<String>,
    ) -> Self {
        Self {
            color1: Some(color1.into()),
            color2: Some(color2.into()),
            color3: Some(color3.into()),
        }
    }
}

/// Metadata returned by a module's `getInfo`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub colors: CategoryColors,
    #[serde(
        rename = "blockIconURI",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub block_icon_uri: Option<String>,
    #[serde(default)]
    pub blocks: Vec<BlockEntry>,
    #[serde(default)]
    pub menus: BTreeMap<String, MenuInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_types: Vec<String>,
}

impl ModuleInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_colors(mut self, colors: CategoryColors) -> Self {
        self.colors = colors;
        self
    }

    pub fn with_block(mut self, block: BlockInfo) -> Self {
        self.blocks.push(block.into());
        self
    }

    pub fn with_separator(mut self) -> Self {
        self.blocks.push(BlockEntry::separator());
        self
    }

    pub fn with_menu(mut self, name: impl Into<String>, menu: MenuInfo) -> Self {
        self.menus.insert(name.into(), menu);
        self
    }
}

// ============================================================================
// Canonical metadata
// ============================================================================

/// An operation with every default filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSpec {
    /// Missing only for buttons.
    pub opcode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func: Option<String>,
    pub block_type: BlockType,
    pub text: String,
    pub terminal: bool,
    pub block_all_threads: bool,
    pub arguments: BTreeMap<String, ArgumentInfo>,
    pub is_dynamic: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<&BlockSpec> for BlockInfo {
    fn from(spec: &BlockSpec) -> Self {
        Self {
            opcode: spec.opcode.clone(),
            func: spec.func.clone(),
            block_type: Some(spec.block_type),
            text: Some(spec.text.clone()).filter(|t| !t.is_empty()),
            terminal: Some(spec.terminal),
            block_all_threads: Some(spec.block_all_threads),
            arguments: Some(spec.arguments.clone()),
            is_dynamic: spec.is_dynamic,
            extra: spec.extra.clone(),
        }
    }
}

/// A sanitized operation together with its bound callable.
#[derive(Debug, Clone)]
pub struct PreparedBlock {
    pub spec: BlockSpec,
    /// `None` for events and buttons.
    pub func: Option<BlockFunction>,
}

/// Entry of a sanitized operation sequence.
#[derive(Debug, Clone)]
pub enum PreparedEntry {
    Separator,
    Block(PreparedBlock),
}

/// A sanitized module descriptor. Immutable once built.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub id: String,
    pub name: String,
    /// Service the callables are bound to.
    pub service_name: String,
    pub colors: CategoryColors,
    pub block_icon_uri: Option<String>,
    pub target_types: Vec<String>,
    pub blocks: Vec<PreparedEntry>,
    pub menus: BTreeMap<String, PreparedMenu>,
}

impl ModuleDescriptor {
    /// Look up a prepared operation by opcode.
    pub fn block(&self, opcode: &str) -> Option<&PreparedBlock> {
        self.prepared_blocks()
            .find(|block| block.spec.opcode.as_deref() == Some(opcode))
    }

    pub fn prepared_blocks(&self) -> impl Iterator<Item = &PreparedBlock> {
        self.blocks.iter().filter_map(|entry| match entry {
            PreparedEntry::Block(block) => Some(block),
            PreparedEntry::Separator => None,
        })
    }

    pub fn menu(&self, name: &str) -> Option<&PreparedMenu> {
        self.menus.get(name)
    }

    /// Convert back to the raw shape; callables are dropped and dynamic
    /// menus become their function names again.
    pub fn to_info(&self) -> ModuleInfo {
        ModuleInfo {
            id: self.id.clone(),
            name: Some(self.name.clone()),
            colors: self.colors.clone(),
            block_icon_uri: self.block_icon_uri.clone(),
            blocks: self
                .blocks
                .iter()
                .map(|entry| match entry {
                    PreparedEntry::Separator => BlockEntry::separator(),
                    PreparedEntry::Block(block) => BlockInfo::from(&block.spec).into(),
                })
                .collect(),
            menus: self
                .menus
                .iter()
                .map(|(name, menu)| (name.clone(), menu.to_info()))
                .collect(),
            target_types: self.target_types.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_block_type_serialize() {
        assert_eq!(serde_json::to_string(&BlockType::Boolean).unwrap(), "\"Boolean\"");
        assert_eq!(serde_json::to_string(&BlockType::Reporter).unwrap(), "\"reporter\"");
        let parsed: BlockType = serde_json::from_str("\"conditional\"").unwrap();
        assert_eq!(parsed, BlockType::Conditional);
    }

    #[test]
    fn test_module_info_deserialize() {
        let raw = json!({
            "id": "pin",
            "name": "Pins",
            "color1": "#4C97FF",
            "blocks": [
                {
                    "opcode": "setPinMode",
                    "blockType": "command",
                    "text": "set pin [PIN] mode [MODE]",
                    "arguments": {
                        "PIN": {"type": "string", "menu": "pins", "defaultValue": "A0"}
                    },
                    "programMode": ["upload"]
                },
                "---",
                {"opcode": "readPin", "blockType": "Boolean"}
            ],
            "menus": {
                "pins": {"items": [{"text": "P1", "value": "A0"}]},
                "mode": ["INPUT", "OUTPUT"],
                "sprites": {"items": "getSprites", "acceptReporters": true}
            }
        });

        let info: ModuleInfo = serde_json::from_value(raw).unwrap();
        assert_eq!(info.id, "pin");
        assert_eq!(info.colors.color1.as_deref(), Some("#4C97FF"));
        assert_eq!(info.blocks.len(), 3);
        assert_eq!(info.blocks[1], BlockEntry::Marker("---".to_string()));

        match &info.blocks[0] {
            BlockEntry::Block(block) => {
                assert_eq!(block.opcode.as_deref(), Some("setPinMode"));
                assert_eq!(block.extra.get("programMode"), Some(&json!(["upload"])));
                let pin = &block.arguments.as_ref().unwrap()["PIN"];
                assert_eq!(pin.menu.as_deref(), Some("pins"));
                assert_eq!(pin.default_value, Some(json!("A0")));
            }
            other => panic!("Expected block, got {other:?}"),
        }

        assert!(matches!(info.menus["mode"], MenuInfo::Short(MenuItems::Static(_))));
        assert_eq!(
            info.menus["sprites"],
            MenuInfo::Full {
                items: MenuItems::Function("getSprites".to_string()),
                accept_reporters: Some(true),
            }
        );
    }

    #[test]
    fn test_builders() {
        let info = ModuleInfo::new("example")
            .with_name("Example")
            .with_block(
                BlockInfo::new("say", BlockType::Command)
                    .with_text("say [TEXT]")
                    .with_argument("TEXT", ArgumentInfo::new("string").with_default("hi")),
            )
            .with_separator()
            .with_menu("things", MenuInfo::dynamic("getThings"));

        assert_eq!(info.blocks.len(), 2);
        assert_eq!(info.menus.len(), 1);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["blocks"][1], json!("---"));
        assert_eq!(json["menus"]["things"]["items"], json!("getThings"));
    }

    #[test]
    fn test_menu_item_shapes() {
        let items: Vec<MenuItem> = serde_json::from_value(json!([
            "plain",
            {"text": "P1", "value": "A0"},
            {"text": {"id": "menu.high", "default": "high"}, "value": "HIGH"}
        ]))
        .unwrap();

        assert_eq!(items[0], MenuItem::Text("plain".to_string()));
        assert_eq!(items[1], MenuItem::pair("P1", "A0"));
        assert_eq!(
            items[2],
            MenuItem::pair(MessageDescriptor::new("menu.high", "high"), "HIGH")
        );
    }
}
