//! Menu resolution.
//!
//! Static menus are kept as declared. A menu whose `items` names an
//! operation becomes a [`DynamicMenu`]: every time it is opened the
//! operation runs against the current editing target (or the stage) and
//! its output is normalised into `(text, value)` pairs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::descriptor::{MenuInfo, MenuItem, MenuItems, MessageDescriptor, MessageText};
use crate::dispatch::{Callable, ServiceBinding};
use crate::error::{Error, Result};
use crate::host::{HostRuntime, TargetRef};

/// A displayable menu entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MenuPair {
    pub text: String,
    pub value: Value,
}

impl MenuPair {
    pub fn new(text: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            text: text.into(),
            value: value.into(),
        }
    }
}

/// Items of a prepared menu.
#[derive(Debug, Clone)]
pub enum PreparedMenuItems {
    Static(Vec<MenuItem>),
    Dynamic(DynamicMenu),
}

/// A menu in general form, with dynamic items bound to their service.
#[derive(Debug, Clone)]
pub struct PreparedMenu {
    pub items: PreparedMenuItems,
    pub accept_reporters: Option<bool>,
}

impl PreparedMenu {
    pub fn is_dynamic(&self) -> bool {
        matches!(self.items, PreparedMenuItems::Dynamic(_))
    }

    pub fn dynamic(&self) -> Option<&DynamicMenu> {
        match &self.items {
            PreparedMenuItems::Dynamic(menu) => Some(menu),
            PreparedMenuItems::Static(_) => None,
        }
    }

    pub fn static_items(&self) -> Option<&[MenuItem]> {
        match &self.items {
            PreparedMenuItems::Static(items) => Some(items),
            PreparedMenuItems::Dynamic(_) => None,
        }
    }

    pub fn to_info(&self) -> MenuInfo {
        let items = match &self.items {
            PreparedMenuItems::Static(items) => MenuItems::Static(items.clone()),
            PreparedMenuItems::Dynamic(menu) => MenuItems::Function(menu.function.clone()),
        };
        MenuInfo::Full {
            items,
            accept_reporters: self.accept_reporters,
        }
    }
}

/// Menu whose items are produced by a module operation.
#[derive(Clone)]
pub struct DynamicMenu {
    function: String,
    callable: Callable,
    host: Arc<dyn HostRuntime>,
}

impl DynamicMenu {
    /// Name of the operation producing the items.
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Produce the items for the editing target, or the stage when nothing
    /// is being edited.
    pub fn open(&self) -> Result<Vec<MenuPair>> {
        let target = self
            .host
            .editing_target()
            .or_else(|| self.host.target_for_stage());
        self.open_for(target.as_ref())
    }

    /// Produce the items for a specific target.
    pub fn open_for(&self, target: Option<&TargetRef>) -> Result<Vec<MenuPair>> {
        let target_id = target
            .map(|t| Value::String(t.id.clone()))
            .unwrap_or(Value::Null);
        let produced = self.callable.call_sync(&[target_id])?;
        let pairs = format_menu_items(self.host.as_ref(), target, produced);
        if pairs.is_empty() {
            return Err(Error::EmptyMenu(self.function.clone()));
        }
        Ok(pairs)
    }
}

impl fmt::Debug for DynamicMenu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicMenu")
            .field("function", &self.function)
            .field("callable", &self.callable)
            .finish()
    }
}

/// Turns declared menus into prepared menus.
#[derive(Clone)]
pub struct MenuResolver {
    host: Arc<dyn HostRuntime>,
}

impl MenuResolver {
    pub fn new(host: Arc<dyn HostRuntime>) -> Self {
        Self { host }
    }

    pub fn prepare_menu_info(
        &self,
        binding: &ServiceBinding,
        menus: BTreeMap<String, MenuInfo>,
    ) -> BTreeMap<String, PreparedMenu> {
        menus
            .into_iter()
            .map(|(name, menu)| {
                let prepared = self.prepare_menu(binding, menu);
                (name, prepared)
            })
            .collect()
    }

    fn prepare_menu(&self, binding: &ServiceBinding, menu: MenuInfo) -> PreparedMenu {
        let (items, accept_reporters) = match menu {
            MenuInfo::Full {
                items,
                accept_reporters,
            } => (items, accept_reporters),
            MenuInfo::Short(items) => (items, None),
        };

        let items = match items {
            MenuItems::Static(items) => PreparedMenuItems::Static(items),
            MenuItems::Function(function) => PreparedMenuItems::Dynamic(DynamicMenu {
                callable: binding.resolve(&function),
                function,
                host: self.host.clone(),
            }),
        };

        PreparedMenu {
            items,
            accept_reporters,
        }
    }
}

/// Normalise the output of a menu operation into display pairs.
///
/// Strings become `(s, s)`, `{text, value}` objects keep their value with
/// the text formatted, and bare message descriptors are formatted and used
/// as both. Anything else is shown as its JSON text.
pub fn format_menu_items(
    host: &dyn HostRuntime,
    target: Option<&TargetRef>,
    produced: Value,
) -> Vec<MenuPair> {
    let items = match produced {
        Value::Array(items) => items,
        Value::Null => return Vec::new(),
        other => {
            warn!(produced = %other, "Menu function did not return a list");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| format_menu_item(host, target, item))
        .collect()
}

fn format_menu_item(
    host: &dyn HostRuntime,
    target: Option<&TargetRef>,
    item: Value,
) -> Option<MenuPair> {
    match item {
        Value::Null => None,
        Value::String(text) => Some(MenuPair::new(text.clone(), text)),
        Value::Object(mut fields) if fields.contains_key("text") && fields.contains_key("value") => {
            let value = fields.remove("value").unwrap_or(Value::Null);
            let text = fields.remove("text").unwrap_or(Value::Null);
            let text = match serde_json::from_value::<MessageText>(text.clone()) {
                Ok(MessageText::Plain(text)) => text,
                Ok(MessageText::Message(message)) => host.format_message(&message, target),
                Err(_) => text.to_string(),
            };
            Some(MenuPair { text, value })
        }
        Value::Object(fields) => {
            let object = Value::Object(fields);
            match serde_json::from_value::<MessageDescriptor>(object.clone()) {
                Ok(message) => {
                    let text = host.format_message(&message, target);
                    Some(MenuPair::new(text.clone(), text))
                }
                Err(_) => Some(MenuPair::new(object.to_string(), object)),
            }
        }
        other => Some(MenuPair::new(other.to_string(), other)),
    }
}
