//! Uno starter board: the plain Uno pin header with servo support.

use std::sync::Arc;

use blockbay_core::{
    ArgumentInfo, BlockInfo, BlockType, CategoryColors, DeviceModule, DeviceRequest, MenuInfo,
    MenuItem, ModuleInfo, OperationTable,
};

use crate::board::{ArduinoBoard, BoardLayout};
use crate::common::{self, labelled};

pub const DEVICE_ID: &str = "unoStart";
pub const DEVICE_TYPE: &str = "arduino";
pub const PNPID_LIST: [&str; 2] = ["USB\\VID_1A86&PID_7523", "USB\\VID_2341&PID_0043"];

const INTERRUPT_PIN: &str = "3";

pub fn request(device_id: impl Into<String>) -> DeviceRequest {
    DeviceRequest::new(device_id)
        .with_type(DEVICE_TYPE)
        .with_pnp_ids(PNPID_LIST)
}

fn digital_pins() -> MenuInfo {
    let digital = (0..=13).map(|pin| MenuItem::pair(format!("D{pin}"), pin.to_string()));
    let analog = (0..=5).map(|pin| MenuItem::Text(format!("A{pin}")));
    MenuInfo::fixed(digital.chain(analog).collect())
}

pub struct UnoStart {
    device_id: String,
    board: Arc<ArduinoBoard>,
}

impl UnoStart {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            board: Arc::new(ArduinoBoard::new(BoardLayout::uno())),
        }
    }

    pub fn board(&self) -> &Arc<ArduinoBoard> {
        &self.board
    }

    fn pin_category(&self) -> ModuleInfo {
        let menu = |name: &str, default: &str| {
            ArgumentInfo::new("string").with_menu(name).with_default(default)
        };

        ModuleInfo::new("pin")
            .with_name("Pins")
            .with_colors(CategoryColors::new("#4C97FF", "#3373CC", "#3373CC"))
            .with_block(
                BlockInfo::new("setUnoStartPinMode", BlockType::Command)
                    .with_text("set pin [PIN] mode [MODE]")
                    .with_argument("PIN", menu("pins", "0"))
                    .with_argument("MODE", menu("mode", "INPUT")),
            )
            .with_block(
                BlockInfo::new("setUnoStartDigitalOutput", BlockType::Command)
                    .with_text("set digital pin [PIN] out [LEVEL]")
                    .with_argument("PIN", menu("pins", "0"))
                    .with_argument("LEVEL", menu("level", "HIGH")),
            )
            .with_block(
                BlockInfo::new("setUnoStartPwmOutput", BlockType::Command)
                    .with_text("set pwm pin [PIN] out [OUT]")
                    .with_argument("PIN", menu("pwmPins", "3"))
                    .with_argument("OUT", ArgumentInfo::new("uint8_number").with_default("255")),
            )
            .with_separator()
            .with_block(
                BlockInfo::new("readUnoStartDigitalPin", BlockType::Boolean)
                    .with_text("read [PIN] is [LEVEL]")
                    .with_argument("PIN", menu("pins", "0"))
                    .with_argument("LEVEL", menu("level", "HIGH")),
            )
            .with_block(
                BlockInfo::new("readUnoStartDigitalPinNum", BlockType::Reporter)
                    .with_text("read digital pin [PIN]")
                    .with_argument("PIN", menu("pins", "0")),
            )
            .with_block(
                BlockInfo::new("readUnoStartAnalogPin", BlockType::Reporter)
                    .with_text("read analog pin [PIN]")
                    .with_argument("PIN", menu("analogPins", "A0")),
            )
            .with_separator()
            .with_block(
                BlockInfo::new("setUnoStartServoOutput", BlockType::Command)
                    .with_text("set servo pin [PIN] out [OUT]")
                    .with_argument("PIN", menu("pins", "3"))
                    .with_argument("OUT", ArgumentInfo::new("halfAngle").with_default("90")),
            )
            .with_separator()
            .with_block(
                BlockInfo::new("unoStartAttachInterrupt", BlockType::Conditional)
                    .with_text("attach interrupt pin 3 mode [MODE] executes")
                    .with_argument("MODE", menu("interruptMode", "RISING")),
            )
            .with_block(
                BlockInfo::new("unoStartDetachInterrupt", BlockType::Command)
                    .with_text("detach interrupt pin 3"),
            )
            .with_menu("pins", digital_pins())
            .with_menu("mode", common::mode_menu(DEVICE_ID))
            .with_menu(
                "analogPins",
                MenuInfo::fixed((0..=5).map(|pin| MenuItem::Text(format!("A{pin}"))).collect()),
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
            .with_menu("interruptMode", common::interrupt_mode_menu(DEVICE_ID))
    }
}

impl DeviceModule for UnoStart {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn info(&self) -> Vec<ModuleInfo> {
        vec![self.pin_category(), common::data_category()]
    }

    fn operations(self: Arc<Self>) -> OperationTable {
        let board = &self.board;
        let mut table = OperationTable::new()
            .with_handler("setUnoStartPinMode", common::set_pin_mode(board))
            .with_handler("setUnoStartDigitalOutput", common::digital_output(board))
            .with_handler("setUnoStartPwmOutput", common::pwm_output(board))
            .with_handler("readUnoStartDigitalPin", common::read_digital(board))
            .with_handler("readUnoStartDigitalPinNum", common::read_digital_number(board))
            .with_handler("readUnoStartAnalogPin", common::read_analog(board))
            .with_handler("setUnoStartServoOutput", common::servo_output(board))
            .with_handler(
                "unoStartAttachInterrupt",
                common::attach_interrupt(board, INTERRUPT_PIN),
            )
            .with_handler(
                "unoStartDetachInterrupt",
                common::detach_interrupt(board, INTERRUPT_PIN),
            );
        common::data_operations(&mut table);
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pin_menu_lists_header() {
        match digital_pins() {
            MenuInfo::Full {
                items: blockbay_core::MenuItems::Static(items),
                ..
            } => {
                assert_eq!(items.len(), 20);
                assert_eq!(items[13], MenuItem::pair("D13", "13"));
                assert_eq!(items[14], MenuItem::Text("A0".to_string()));
            }
            other => panic!("unexpected menu: {other:?}"),
        }
    }

    #[test]
    fn test_servo_and_analog() {
        let device = Arc::new(UnoStart::new(DEVICE_ID));
        let board = device.board().clone();
        let table = device.operations();

        let angle = table
            .invoke("svc", "setUnoStartServoOutput", &[json!({"PIN": "D9", "OUT": "200"})])
            .unwrap();
        assert_eq!(angle, json!(180));
        assert_eq!(board.pin("9").unwrap().servo, Some(180));

        board.set_analog_input("A3", 512).unwrap();
        let value = table
            .invoke("svc", "readUnoStartAnalogPin", &[json!({"PIN": "A3"})])
            .unwrap();
        assert_eq!(value, json!(512));
    }

    #[test]
    fn test_shares_data_opcodes() {
        let device = Arc::new(UnoStart::new(DEVICE_ID));
        let table = device.operations();
        assert!(table.contains("unoCoreDataMap"));
    }
}
