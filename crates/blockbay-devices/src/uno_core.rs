//! Uno core board: an ATmega328P board in the compact package.

use std::sync::Arc;

use blockbay_core::{
    ArgumentInfo, BlockInfo, BlockType, CategoryColors, DeviceModule, DeviceRequest, ModuleInfo,
    OperationTable,
};

use crate::board::{ArduinoBoard, BoardLayout};
use crate::common::{self, labelled};

pub const DEVICE_ID: &str = "unoCore";
pub const DEVICE_TYPE: &str = "arduino";
pub const PNPID_LIST: [&str; 1] = ["USB\\VID_1A86&PID_7523"];

/// Pin of the external interrupt block (P5).
const INTERRUPT_PIN: &str = "2";

/// Request loading this board with its usual type and USB filters.
pub fn request(device_id: impl Into<String>) -> DeviceRequest {
    DeviceRequest::new(device_id)
        .with_type(DEVICE_TYPE)
        .with_pnp_ids(PNPID_LIST)
}

pub struct UnoCore {
    device_id: String,
    board: Arc<ArduinoBoard>,
}

impl UnoCore {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self::with_board(
            device_id,
            Arc::new(ArduinoBoard::new(BoardLayout::uno_compact())),
        )
    }

    pub fn with_board(device_id: impl Into<String>, board: Arc<ArduinoBoard>) -> Self {
        Self {
            device_id: device_id.into(),
            board,
        }
    }

    pub fn board(&self) -> &Arc<ArduinoBoard> {
        &self.board
    }

    fn pin_category(&self) -> ModuleInfo {
        let pin = |menu: &str, default: &str| {
            ArgumentInfo::new("string").with_menu(menu).with_default(default)
        };

        ModuleInfo::new("pin")
            .with_name("Interface operation")
            .with_colors(CategoryColors::new("#4C97FF", "#3373CC", "#3373CC"))
            .with_block(
                BlockInfo::new("setUnoCorePinMode", BlockType::Command)
                    .with_text("set interface [PIN] mode [MODE]")
                    .with_argument("PIN", pin("pins", "A0"))
                    .with_argument("MODE", pin("mode", "INPUT")),
            )
            .with_block(
                BlockInfo::new("setUnoCoreDigitalOutput", BlockType::Command)
                    .with_text("set digital interface [PIN] output [LEVEL]")
                    .with_argument("PIN", pin("pins", "A0"))
                    .with_argument("LEVEL", pin("level", "HIGH")),
            )
            .with_block(
                BlockInfo::new("setUnoCoreInterfacePwmOutput", BlockType::Command)
                    .with_text("set PWM interface [PIN] output [OUT]")
                    .with_argument("PIN", pin("pwmInterfaces", "10"))
                    .with_argument("OUT", ArgumentInfo::new("uint8_number").with_default("255")),
            )
            .with_block(
                BlockInfo::new("setUnoCorePwmOutput", BlockType::Command)
                    .with_text("set pwm pin [PIN] output [OUT]")
                    .with_argument("PIN", pin("pwmPins", "10"))
                    .with_argument("OUT", ArgumentInfo::new("uint8_number").with_default("255")),
            )
            .with_separator()
            .with_block(
                BlockInfo::new("readUnoCoreDigitalPin", BlockType::Boolean)
                    .with_text("interface [PIN] is [LEVEL]")
                    .with_argument("PIN", pin("pins", "A0"))
                    .with_argument("LEVEL", pin("level", "HIGH")),
            )
            .with_block(
                BlockInfo::new("readUnoCoreDigitalPinNum", BlockType::Reporter)
                    .with_text("read digital interface [PIN]")
                    .with_argument("PIN", pin("pins", "A0")),
            )
            .with_block(
                BlockInfo::new("readUnoCoreAnalogPin", BlockType::Reporter)
                    .with_text("read analog interface [PIN]")
                    .with_argument("PIN", pin("analogPins", "A0")),
            )
            .with_separator()
            .with_block(
                BlockInfo::new("UnoCoreAttachInterrupt", BlockType::Conditional)
                    .with_text("attach interrupt pin P5 mode [MODE] executes")
                    .with_argument("MODE", pin("interruptMode", "RISING")),
            )
            .with_block(
                BlockInfo::new("UnoCoreDetachInterrupt", BlockType::Command)
                    .with_text("detach interrupt pin P5"),
            )
            .with_menu(
                "pins",
                labelled(&[
                    ("P1", "A0"),
                    ("P2", "A1"),
                    ("P3", "A2"),
                    ("P4", "A3"),
                    ("P5", "2"),
                    ("P6", "4"),
                    ("P7", "7"),
                    ("P8", "8"),
                    ("P9", "A6"),
                    ("P10", "A7"),
                    ("P11", "12"),
                    ("P12", "13"),
                ]),
            )
            .with_menu("mode", common::mode_menu(DEVICE_ID))
            .with_menu(
                "analogPins",
                labelled(&[
                    ("P1", "A0"),
                    ("P2", "A1"),
                    ("P3", "A2"),
                    ("P4", "A3"),
                    ("P9", "A6"),
                    ("P10", "A7"),
                ]),
            )
            .with_menu("level", common::level_menu(DEVICE_ID))
            .with_menu(
                "pwmPins",
                labelled(&[
                    ("D3", "3"),
                    ("D5", "5"),
                    ("D6", "6"),
                    ("D9", "9"),
                    ("D10", "10"),
                    ("D11", "11"),
                ]),
            )
            .with_menu("pwmInterfaces", labelled(&[("PWM1", "10"), ("PWM2", "11")]))
            .with_menu("interruptMode", common::interrupt_mode_menu(DEVICE_ID))
    }
}

impl DeviceModule for UnoCore {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn info(&self) -> Vec<ModuleInfo> {
        vec![self.pin_category(), common::data_category()]
    }

    fn operations(self: Arc<Self>) -> OperationTable {
        let board = &self.board;
        let mut table = OperationTable::new()
            .with_handler("setUnoCorePinMode", common::set_pin_mode(board))
            .with_handler("setUnoCoreDigitalOutput", common::digital_output(board))
            .with_handler("setUnoCoreInterfacePwmOutput", common::pwm_output(board))
            .with_handler("setUnoCorePwmOutput", common::pwm_output(board))
            .with_handler("readUnoCoreDigitalPin", common::read_digital(board))
            .with_handler("readUnoCoreDigitalPinNum", common::read_digital_number(board))
            .with_handler("readUnoCoreAnalogPin", common::read_analog(board))
            .with_handler(
                "UnoCoreAttachInterrupt",
                common::attach_interrupt(board, INTERRUPT_PIN),
            )
            .with_handler(
                "UnoCoreDetachInterrupt",
                common::detach_interrupt(board, INTERRUPT_PIN),
            );
        common::data_operations(&mut table);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{InterruptMode, Level};
    use serde_json::json;

    #[test]
    fn test_categories() {
        let device = UnoCore::new(DEVICE_ID);
        let ids: Vec<_> = device.info().into_iter().map(|info| info.id).collect();
        assert_eq!(ids, vec!["pin", "data"]);
    }

    #[test]
    fn test_every_block_has_a_handler() {
        let device = Arc::new(UnoCore::new(DEVICE_ID));
        let infos = device.info();
        let table = device.operations();

        for info in infos {
            for entry in info.blocks {
                if let blockbay_core::BlockEntry::Block(block) = entry {
                    let opcode = block.opcode.unwrap_or_default();
                    assert!(table.contains(&opcode), "missing handler for {opcode}");
                }
            }
        }
    }

    #[test]
    fn test_pwm_interface_reads_back() {
        let device = Arc::new(UnoCore::new(DEVICE_ID));
        let board = device.board().clone();
        let table = device.operations();

        table
            .invoke(
                "svc",
                "setUnoCoreInterfacePwmOutput",
                &[json!({"PIN": "11", "OUT": "120"})],
            )
            .unwrap();
        assert_eq!(board.pin("11").unwrap().pwm, Some(120));
        assert_eq!(board.digital_read("11").unwrap(), Level::High);

        let err = table
            .invoke("svc", "setUnoCorePwmOutput", &[json!({"PIN": "A6", "OUT": 1})])
            .unwrap_err();
        assert!(err.to_string().contains("does not support PWM"));
    }

    #[test]
    fn test_interrupt_on_p5() {
        let device = Arc::new(UnoCore::new(DEVICE_ID));
        let board = device.board().clone();
        let table = device.operations();

        table
            .invoke("svc", "UnoCoreAttachInterrupt", &[json!({"MODE": "CHANGE"})])
            .unwrap();
        assert_eq!(board.interrupt("2"), Some(InterruptMode::Change));

        table
            .invoke("svc", "UnoCoreDetachInterrupt", &[json!({})])
            .unwrap();
        assert_eq!(board.interrupt("2"), None);
    }

    #[test]
    fn test_request_carries_filters() {
        let request = request("abc_unoCore");
        assert_eq!(request.device_type.as_deref(), Some("arduino"));
        assert_eq!(request.pnp_id_list, vec![PNPID_LIST[0].to_string()]);
    }
}
