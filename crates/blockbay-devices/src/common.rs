//! Pieces shared by the Uno-family devices: pin handlers and menus, and the
//! data category.

use std::sync::Arc;

use blockbay_core::dispatch::OperationTable;
use blockbay_core::{
    ArgumentInfo, BlockInfo, BlockType, CategoryColors, MenuInfo, MenuItem, MessageDescriptor,
    ModuleInfo,
};
use serde_json::{json, Value};

use crate::args;
use crate::board::{ArduinoBoard, InterruptMode, Level, PinMode};

/// Result type of every operation handler.
pub type HandlerResult = blockbay_core::Result<Value>;

fn message(id: &str, default: &str) -> MessageDescriptor {
    MessageDescriptor::new(format!("unoCore.{id}"), default)
}

/// Static menu of `(label, value)` pairs.
pub fn labelled(items: &[(&str, &str)]) -> MenuInfo {
    MenuInfo::fixed(
        items
            .iter()
            .map(|(text, value)| MenuItem::pair(*text, *value))
            .collect(),
    )
}

/// JSON number, integral when possible.
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

// ============================================================================
// Pins
// ============================================================================

pub fn mode_menu(device: &str) -> MenuInfo {
    let item = |key: &str, default: &str, value: &str| {
        MenuItem::pair(
            MessageDescriptor::new(format!("{device}.modeMenu.{key}"), default),
            value,
        )
    };
    MenuInfo::fixed(vec![
        item("input", "input", "INPUT"),
        item("output", "output", "OUTPUT"),
        item("inputPullup", "input-pullup", "INPUT_PULLUP"),
    ])
}

pub fn level_menu(device: &str) -> MenuInfo {
    let item = |key: &str, default: &str, value: &str| {
        MenuItem::pair(
            MessageDescriptor::new(format!("{device}.levelMenu.{key}"), default),
            value,
        )
    };
    MenuInfo::fixed(vec![
        item("high", "high level", "HIGH"),
        item("low", "low level", "LOW"),
    ])
    .accepting_reporters()
}

pub fn interrupt_mode_menu(device: &str) -> MenuInfo {
    let item = |key: &str, default: &str, value: &str| {
        MenuItem::pair(
            MessageDescriptor::new(format!("{device}.interruptModeMenu.{key}"), default),
            value,
        )
    };
    MenuInfo::fixed(vec![
        item("risingEdge", "rising edge", "RISING"),
        item("fallingEdge", "falling edge", "FALLING"),
        item("changeEdge", "change edge", "CHANGE"),
        item("low", "low", "LOW"),
    ])
}

pub fn set_pin_mode(board: &Arc<ArduinoBoard>) -> impl Fn(&[Value]) -> HandlerResult + Send + Sync {
    let board = board.clone();
    move |a: &[Value]| {
        let mode: PinMode = args::parsed(a, "MODE")?;
        board.set_pin_mode(&args::text(a, "PIN")?, mode)?;
        Ok(Value::Null)
    }
}

pub fn digital_output(board: &Arc<ArduinoBoard>) -> impl Fn(&[Value]) -> HandlerResult + Send + Sync {
    let board = board.clone();
    move |a: &[Value]| {
        let level: Level = args::parsed(a, "LEVEL")?;
        board.digital_write(&args::text(a, "PIN")?, level)?;
        Ok(Value::Null)
    }
}

pub fn pwm_output(board: &Arc<ArduinoBoard>) -> impl Fn(&[Value]) -> HandlerResult + Send + Sync {
    let board = board.clone();
    move |a: &[Value]| {
        board.analog_write(&args::text(a, "PIN")?, args::byte(a, "OUT")?)?;
        Ok(Value::Null)
    }
}

pub fn servo_output(board: &Arc<ArduinoBoard>) -> impl Fn(&[Value]) -> HandlerResult + Send + Sync {
    let board = board.clone();
    move |a: &[Value]| {
        let angle = board.servo_write(&args::text(a, "PIN")?, args::integer(a, "OUT")?)?;
        Ok(json!(angle))
    }
}

/// Whether a pin reads the requested level.
pub fn read_digital(board: &Arc<ArduinoBoard>) -> impl Fn(&[Value]) -> HandlerResult + Send + Sync {
    let board = board.clone();
    move |a: &[Value]| {
        let expected: Level = args::parsed(a, "LEVEL")?;
        Ok(json!(board.digital_read(&args::text(a, "PIN")?)? == expected))
    }
}

pub fn read_digital_number(
    board: &Arc<ArduinoBoard>,
) -> impl Fn(&[Value]) -> HandlerResult + Send + Sync {
    let board = board.clone();
    move |a: &[Value]| {
        let level = board.digital_read(&args::text(a, "PIN")?)?;
        Ok(json!(u8::from(level.is_high())))
    }
}

pub fn read_analog(board: &Arc<ArduinoBoard>) -> impl Fn(&[Value]) -> HandlerResult + Send + Sync {
    let board = board.clone();
    move |a: &[Value]| Ok(json!(board.analog_read(&args::text(a, "PIN")?)?))
}

/// Interrupts are wired to a fixed pin.
pub fn attach_interrupt(
    board: &Arc<ArduinoBoard>,
    pin: &'static str,
) -> impl Fn(&[Value]) -> HandlerResult + Send + Sync {
    let board = board.clone();
    move |a: &[Value]| {
        let mode: InterruptMode = args::parsed(a, "MODE")?;
        board.attach_interrupt(pin, mode)?;
        Ok(Value::Null)
    }
}

pub fn detach_interrupt(
    board: &Arc<ArduinoBoard>,
    pin: &'static str,
) -> impl Fn(&[Value]) -> HandlerResult + Send + Sync {
    let board = board.clone();
    move |_: &[Value]| {
        board.detach_interrupt(pin)?;
        Ok(Value::Null)
    }
}

// ============================================================================
// Data
// ============================================================================

pub fn data_category() -> ModuleInfo {
    ModuleInfo::new("data")
        .with_name("Data")
        .with_colors(CategoryColors::new("#CF63CF", "#C94FC9", "#BD42BD"))
        .with_block(
            BlockInfo::new("unoCoreStringConvert", BlockType::Reporter)
                .with_text("convert [DATA] to [TYPE]")
                .with_argument("DATA", ArgumentInfo::new("string").with_default("123"))
                .with_argument(
                    "TYPE",
                    ArgumentInfo::new("string").with_menu("dataType").with_default("INTEGER"),
                ),
        )
        .with_block(
            BlockInfo::new("unoCoreDataConvertASCIICharacter", BlockType::Reporter)
                .with_text("convert [DATA] to ASCII character")
                .with_argument("DATA", ArgumentInfo::new("number").with_default("97")),
        )
        .with_block(
            BlockInfo::new("unoCoreDataConvertASCIINumber", BlockType::Reporter)
                .with_text("convert [DATA] to ASCII number")
                .with_argument("DATA", ArgumentInfo::new("string").with_default("a")),
        )
        .with_block(
            BlockInfo::new("unoCoreNumConvert", BlockType::Reporter)
                .with_text("convert [DATA] to string")
                .with_argument("DATA", ArgumentInfo::new("number").with_default(132)),
        )
        .with_block(
            BlockInfo::new("unoCoreDataMap", BlockType::Reporter)
                .with_text("map [DATA] from ([ARG0], [ARG1]) to ([ARG2], [ARG3])")
                .with_argument("DATA", ArgumentInfo::new("number").with_default(0))
                .with_argument("ARG0", ArgumentInfo::new("number").with_default(0))
                .with_argument("ARG1", ArgumentInfo::new("number").with_default(1023))
                .with_argument("ARG2", ArgumentInfo::new("number").with_default(0))
                .with_argument("ARG3", ArgumentInfo::new("number").with_default(255)),
        )
        .with_separator()
        .with_block(
            BlockInfo::new("unoCoreDataConstrain", BlockType::Reporter)
                .with_text("constrain [DATA] between ([ARG0], [ARG1])")
                .with_argument("DATA", ArgumentInfo::new("number").with_default(0))
                .with_argument("ARG0", ArgumentInfo::new("number").with_default(0))
                .with_argument("ARG1", ArgumentInfo::new("number").with_default(100)),
        )
        .with_menu(
            "dataType",
            MenuInfo::fixed(vec![
                MenuItem::pair(message("dataTypeMenu.integer", "integer"), "INTEGER"),
                MenuItem::pair(message("dataTypeMenu.decimal", "decimal"), "DECIMAL"),
            ]),
        )
}

pub fn data_operations(table: &mut OperationTable) {
    table.insert("unoCoreStringConvert", |a: &[Value]| {
        let data = args::text(a, "DATA")?;
        let decimal = args::text(a, "TYPE")? == "DECIMAL";
        Ok(number_value(convert_string(&data, decimal)))
    });
    table.insert("unoCoreDataConvertASCIICharacter", |a: &[Value]| {
        let code = args::integer(a, "DATA")?;
        Ok(json!(ascii_character(code)))
    });
    table.insert("unoCoreDataConvertASCIINumber", |a: &[Value]| {
        Ok(json!(ascii_number(&args::text(a, "DATA")?)))
    });
    table.insert("unoCoreNumConvert", |a: &[Value]| {
        let value = number_value(args::number(a, "DATA")?);
        Ok(json!(value.to_string()))
    });
    table.insert("unoCoreDataMap", |a: &[Value]| {
        Ok(json!(map_range(
            args::integer(a, "DATA")?,
            (args::integer(a, "ARG0")?, args::integer(a, "ARG1")?),
            (args::integer(a, "ARG2")?, args::integer(a, "ARG3")?),
        )))
    });
    table.insert("unoCoreDataConstrain", |a: &[Value]| {
        let value = args::number(a, "DATA")?;
        let low = args::number(a, "ARG0")?;
        let high = args::number(a, "ARG1")?;
        Ok(number_value(constrain(value, low, high)))
    });
}

/// Leading number of `text`, or 0 when there is none.
pub fn convert_string(text: &str, decimal: bool) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_point = false;
    for (i, c) in text.char_indices() {
        let accept = c.is_ascii_digit()
            || ((c == '-' || c == '+') && i == 0)
            || (decimal && c == '.' && !seen_point);
        if !accept {
            break;
        }
        seen_point |= c == '.';
        end = i + c.len_utf8();
    }
    text[..end].parse().unwrap_or(0.0)
}

pub fn ascii_character(code: i64) -> String {
    u8::try_from(code)
        .ok()
        .filter(u8::is_ascii)
        .map(|byte| char::from(byte).to_string())
        .unwrap_or_default()
}

/// Code of the first character, or 0 for empty text.
pub fn ascii_number(text: &str) -> u32 {
    text.chars().next().map(u32::from).unwrap_or(0)
}

/// Integer re-mapping between ranges. An empty source range maps to the
/// start of the target range.
pub fn map_range(value: i64, from: (i64, i64), to: (i64, i64)) -> i64 {
    if from.0 == from.1 {
        return to.0;
    }
    (value - from.0) * (to.1 - to.0) / (from.1 - from.0) + to.0
}

pub fn constrain(value: f64, low: f64, high: f64) -> f64 {
    if value < low {
        low
    } else if value > high {
        high
    } else {
        value
    }
}
