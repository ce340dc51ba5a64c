//! Wire format of XInput interrupt messages
//!
//! Every message starts with a two byte header, `type` then `length`. The
//! device sends 20-byte controls reports, the host sends 8-byte rumble and
//! 3-byte LED messages on the OUT endpoint.

use packed_struct::prelude::*;

/// Message type of controls reports and rumble messages
pub const MESSAGE_TYPE_CONTROLS: u8 = 0x00;
/// Message type of LED animation messages
pub const MESSAGE_TYPE_LED: u8 = 0x01;

pub const CONTROLS_REPORT_LEN: usize = 20;
pub const RUMBLE_MESSAGE_LEN: usize = 8;
pub const LED_MESSAGE_LEN: usize = 3;

const PACKED_CONTROLS_LEN: usize = 12;

/// State of every control on the pad, packed to the 12-byte wire image
///
/// The button image is a little-endian `u16`, bit 0 = d-pad up through
/// bit 15 = Y; bit 11 is reserved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PackedStruct)]
#[packed_struct(endian = "lsb", bit_numbering = "msb0", size_bytes = "12")]
pub struct XInputControls {
    #[packed_field(bits = "0")]
    pub right_thumb: bool,
    #[packed_field(bits = "1")]
    pub left_thumb: bool,
    #[packed_field(bits = "2")]
    pub back: bool,
    #[packed_field(bits = "3")]
    pub start: bool,
    #[packed_field(bits = "4")]
    pub dpad_right: bool,
    #[packed_field(bits = "5")]
    pub dpad_left: bool,
    #[packed_field(bits = "6")]
    pub dpad_down: bool,
    #[packed_field(bits = "7")]
    pub dpad_up: bool,
    #[packed_field(bits = "8")]
    pub y: bool,
    #[packed_field(bits = "9")]
    pub x: bool,
    #[packed_field(bits = "10")]
    pub b: bool,
    #[packed_field(bits = "11")]
    pub a: bool,
    #[packed_field(bits = "13")]
    pub guide: bool,
    #[packed_field(bits = "14")]
    pub right_shoulder: bool,
    #[packed_field(bits = "15")]
    pub left_shoulder: bool,
    #[packed_field(bytes = "2")]
    pub left_trigger: u8,
    #[packed_field(bytes = "3")]
    pub right_trigger: u8,
    #[packed_field(bytes = "4..=5")]
    pub left_stick_x: i16,
    #[packed_field(bytes = "6..=7")]
    pub left_stick_y: i16,
    #[packed_field(bytes = "8..=9")]
    pub right_stick_x: i16,
    #[packed_field(bytes = "10..=11")]
    pub right_stick_y: i16,
}

impl XInputControls {
    /// Serialize to a full interrupt IN report, header and reserved tail
    /// included
    pub fn as_report(&self) -> Result<[u8; CONTROLS_REPORT_LEN], PackingError> {
        let mut report = [0_u8; CONTROLS_REPORT_LEN];
        report[0] = MESSAGE_TYPE_CONTROLS;
        report[1] = CONTROLS_REPORT_LEN as u8;
        report[2..2 + PACKED_CONTROLS_LEN].copy_from_slice(&self.pack()?);
        Ok(report)
    }

    /// Reparse a controls report produced by [`Self::as_report`]
    #[must_use]
    pub fn from_report(report: &[u8]) -> Option<Self> {
        if report.len() < 2 + PACKED_CONTROLS_LEN
            || report[0] != MESSAGE_TYPE_CONTROLS
            || usize::from(report[1]) != CONTROLS_REPORT_LEN
        {
            return None;
        }

        let mut packed = [0_u8; PACKED_CONTROLS_LEN];
        packed.copy_from_slice(&report[2..2 + PACKED_CONTROLS_LEN]);
        Self::unpack(&packed).ok()
    }

    /// Controls image reported for the input-capability query of a fully
    /// featured wired pad: every button present, full-scale triggers and
    /// axis resolution masks
    #[must_use]
    pub fn all_controls() -> Self {
        Self {
            right_thumb: true,
            left_thumb: true,
            back: true,
            start: true,
            dpad_right: true,
            dpad_left: true,
            dpad_down: true,
            dpad_up: true,
            y: true,
            x: true,
            b: true,
            a: true,
            guide: true,
            right_shoulder: true,
            left_shoulder: true,
            left_trigger: 0xFF,
            right_trigger: 0xFF,
            left_stick_x: i16::from_le_bytes([0xC0, 0xFF]),
            left_stick_y: i16::from_le_bytes([0xC0, 0xFF]),
            right_stick_x: i16::from_le_bytes([0xC0, 0xFF]),
            right_stick_y: i16::from_le_bytes([0xC0, 0xFF]),
        }
    }
}

/// LED animation codes of the ring of light
#[derive(Clone, Copy, Debug, PartialEq, Eq, PrimitiveEnum)]
#[repr(u8)]
pub enum LedPattern {
    Off = 0x00,
    AllBlinking = 0x01,
    Slot1Flash = 0x02,
    Slot2Flash = 0x03,
    Slot3Flash = 0x04,
    Slot4Flash = 0x05,
    Slot1On = 0x06,
    Slot2On = 0x07,
    Slot3On = 0x08,
    Slot4On = 0x09,
    Rotating = 0x0A,
    Blinking = 0x0B,
    SlowBlinking = 0x0C,
    Alternating = 0x0D,
}

/// Strength of the rumble motors reported by the capability query
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RumbleCapabilities {
    pub left: u8,
    pub right: u8,
}

impl Default for RumbleCapabilities {
    fn default() -> Self {
        Self {
            left: 0xFF,
            right: 0xFF,
        }
    }
}

impl RumbleCapabilities {
    /// Serialize as a rumble-shaped message
    #[must_use]
    pub(crate) fn as_message(&self) -> [u8; RUMBLE_MESSAGE_LEN] {
        [
            MESSAGE_TYPE_CONTROLS,
            RUMBLE_MESSAGE_LEN as u8,
            0x00,
            self.left,
            self.right,
            0x00,
            0x00,
            0x00,
        ]
    }
}

/// A message received on the interrupt OUT endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMessage {
    Rumble { left: u8, right: u8 },
    Led(LedPattern),
}

impl OutputMessage {
    /// Classify an OUT transfer by its header and transferred length.
    /// Returns `None` for any other shape, including unknown LED codes.
    #[must_use]
    pub fn parse(data: &[u8]) -> Option<Self> {
        match (*data.first()?, *data.get(1)?) {
            (MESSAGE_TYPE_CONTROLS, 0x08) if data.len() == RUMBLE_MESSAGE_LEN => {
                Some(Self::Rumble {
                    left: data[3],
                    right: data[4],
                })
            }
            (MESSAGE_TYPE_LED, 0x03) if data.len() == LED_MESSAGE_LEN => {
                LedPattern::from_primitive(data[2]).map(Self::Led)
            }
            _ => None,
        }
    }
}
