use log::error;
use packed_struct::prelude::*;
use usb_device::class_prelude::*;
use usb_device::Result;

pub const USB_CLASS_HID: u8 = 0x03;
pub const SPEC_VERSION_1_11: u16 = 0x0111; //1.11 in BCD
pub const COUNTRY_CODE_NOT_SUPPORTED: u8 = 0x0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InterfaceProtocol {
    None = 0x00,
    Keyboard = 0x01,
    Mouse = 0x02,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PrimitiveEnum)]
#[repr(u8)]
pub enum DescriptorType {
    Hid = 0x21,
    Report = 0x22,
    Physical = 0x23,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InterfaceSubClass {
    None = 0x00,
    Boot = 0x01,
}

impl From<InterfaceProtocol> for InterfaceSubClass {
    fn from(protocol: InterfaceProtocol) -> Self {
        if protocol == InterfaceProtocol::None {
            Self::None
        } else {
            Self::Boot
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PrimitiveEnum)]
#[repr(u8)]
pub enum HidProtocol {
    Boot = 0x00,
    Report = 0x01,
}

impl From<HidProtocol> for u8 {
    fn from(value: HidProtocol) -> Self {
        value.to_primitive()
    }
}

/// Report selector of GET_REPORT and SET_REPORT requests, decoded from
/// `wValue`: report type in the high byte, report ID in the low byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportId {
    In(u8),
    Out(u8),
    Feature(u8),
}

impl ReportId {
    #[must_use]
    pub fn from_value(value: u16) -> Option<Self> {
        let id = (value & 0xFF) as u8;
        match value >> 8 {
            1 => Some(Self::In(id)),
            2 => Some(Self::Out(id)),
            3 => Some(Self::Feature(id)),
            _ => None,
        }
    }

    #[must_use]
    pub fn id(&self) -> u8 {
        match *self {
            Self::In(id) | Self::Out(id) | Self::Feature(id) => id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = 7)]
pub struct HidDescriptorBody {
    bcd_hid: u16,
    country_code: u8,
    num_descriptors: u8,
    #[packed_field(ty = "enum", size_bytes = "1")]
    descriptor_type: DescriptorType,
    descriptor_length: u16,
}

pub fn hid_descriptor(report_descriptor_len: usize) -> Result<[u8; 7]> {
    if report_descriptor_len > u16::MAX as usize {
        error!(
            "Report descriptor length {:X} too long to fit in u16",
            report_descriptor_len
        );
        Err(UsbError::InvalidState)
    } else {
        HidDescriptorBody {
            bcd_hid: SPEC_VERSION_1_11,
            country_code: COUNTRY_CODE_NOT_SUPPORTED,
            num_descriptors: 1,
            descriptor_type: DescriptorType::Report,
            descriptor_length: report_descriptor_len as u16,
        }
        .pack()
        .map_err(|e| {
            error!("Failed to pack HidDescriptor {}", e);
            UsbError::InvalidState
        })
    }
}
