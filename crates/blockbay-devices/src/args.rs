//! Argument access for operation handlers.
//!
//! Handlers receive `[args, block_info]`; `args` is an object keyed by
//! argument name. Values typed into the editor arrive as strings or
//! numbers, so both are accepted.

use serde_json::Value;

use crate::error::{DeviceError, Result};

pub fn argument<'a>(args: &'a [Value], name: &'static str) -> Result<&'a Value> {
    args.first()
        .and_then(|object| object.get(name))
        .ok_or(DeviceError::MissingArgument(name))
}

pub fn text(args: &[Value], name: &'static str) -> Result<String> {
    Ok(match argument(args, name)? {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Numeric argument. Empty text counts as zero.
pub fn number(args: &[Value], name: &'static str) -> Result<f64> {
    let value = argument(args, name)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| DeviceError::InvalidArgument {
        name,
        value: value.to_string(),
    })
}

pub fn integer(args: &[Value], name: &'static str) -> Result<i64> {
    number(args, name).map(|n| n.trunc() as i64)
}

/// Integer argument clamped to a byte.
pub fn byte(args: &[Value], name: &'static str) -> Result<u8> {
    integer(args, name).map(|n| n.clamp(0, i64::from(u8::MAX)) as u8)
}

/// Parse a text argument into a typed value.
pub fn parsed<T>(args: &[Value], name: &'static str) -> Result<T>
where
    T: std::str::FromStr<Err = DeviceError>,
{
    text(args, name)?.parse()
}
