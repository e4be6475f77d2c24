//! Builtin devices and extensions for blockbay.
//!
//! - `unoCore` and `unoStart`: Uno-family boards driving an in-memory
//!   [`ArduinoBoard`]
//! - `coreExample`: an extension exercising buttons, dynamic menus and
//!   dynamic operations

pub mod args;
pub mod board;
pub mod common;
pub mod core_example;
pub mod error;
pub mod uno_core;
pub mod uno_start;

use std::sync::Arc;

use blockbay_core::Builtins;

pub use board::{ArduinoBoard, BoardLayout, Level, PinMode};
pub use core_example::CoreExample;
pub use error::DeviceError;
pub use uno_core::UnoCore;
pub use uno_start::UnoStart;

/// Every builtin device and extension.
pub fn builtins() -> Builtins {
    Builtins::new()
        .with_device(uno_core::DEVICE_ID, |device_id: &str| {
            Arc::new(UnoCore::new(device_id)) as _
        })
        .with_device(uno_start::DEVICE_ID, |device_id: &str| {
            Arc::new(UnoStart::new(device_id)) as _
        })
        .with_extension(core_example::EXTENSION_ID, || {
            Arc::new(CoreExample::new()) as _
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockbay_core::DeviceModule;

    #[test]
    fn test_builtins() {
        let builtins = builtins();
        assert_eq!(
            builtins.device_ids().collect::<Vec<_>>(),
            vec!["unoCore", "unoStart"]
        );
        assert!(builtins.has_extension("coreExample"));

        let device = (builtins.device("unoCore").unwrap())("board_unoCore");
        assert_eq!(device.device_id(), "board_unoCore");
    }
}
