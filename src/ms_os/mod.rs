//! Microsoft OS 1.0 descriptors for driverless enumeration on Windows
//!
//! Windows probes string index `0xEE` for the `MSFT100` signature, then uses
//! the vendor code carried in that descriptor to request the compat-ID and
//! extended-properties feature descriptors. A compat ID of
//! [`COMPAT_ID_XUSB10`] makes Windows bind its in-box XUSB driver to the
//! interface without an INF; [`COMPAT_ID_WINUSB`] does the same for WinUSB.
//!
//! [`MsOsDescriptors`] is a standalone [`UsbClass`]: poll it alongside the
//! function classes it describes.

use log::{error, trace, warn};
use usb_device::class_prelude::*;
use usb_device::control::{Recipient, Request, RequestType};
use usb_device::descriptor::descriptor_type;


/// String descriptor index of the OS string descriptor
pub const OS_STRING_INDEX: u8 = 0xEE;

pub const COMPAT_ID_XUSB10: [u8; 8] = *b"XUSB10\0\0";
pub const COMPAT_ID_WINUSB: [u8; 8] = *b"WINUSB\0\0";

/// Feature-descriptor index of the compat-ID descriptor
const FEATURE_COMPAT_ID: u16 = 0x0004;
/// Feature-descriptor index of the extended-properties descriptor
const FEATURE_EXTENDED_PROPERTIES: u16 = 0x0005;

const MS_OS_VERSION_1_0: u16 = 0x0100; //1.0 in BCD

const OS_STRING_DESCRIPTOR_LEN: usize = 0x12;

const COMPAT_ID_HEADER_LEN: usize = 16;
const COMPAT_ID_FUNCTION_LEN: usize = 24;
// The whole reply must fit the control pipe's transfer buffer
const MAX_COMPAT_ID_FUNCTIONS: usize = 4;
const COMPAT_ID_MAX_LEN: usize =
    COMPAT_ID_HEADER_LEN + MAX_COMPAT_ID_FUNCTIONS * COMPAT_ID_FUNCTION_LEN;

const EXTENDED_PROPERTIES_HEADER_LEN: usize = 10;
const EXTENDED_PROPERTIES_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsOsBuilderError {
    TooManyFunctions,
    BufferOverflow,
}

pub type BuilderResult<B> = core::result::Result<B, MsOsBuilderError>;

/// Registry data types usable in extended properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PropertyDataType {
    Sz = 1,
    ExpandSz = 2,
    Binary = 3,
    DwordLittleEndian = 4,
    DwordBigEndian = 5,
    Link = 6,
    MultiSz = 7,
}

#[derive(Clone, Copy)]
struct CompatIdFunction {
    first_interface: u8,
    compatible_id: [u8; 8],
    sub_compatible_id: [u8; 8],
}

/// Compat-ID feature descriptor, one function section per described
/// interface
#[derive(Clone, Default)]
pub struct CompatIdDescriptor {
    functions: heapless::Vec<CompatIdFunction, MAX_COMPAT_ID_FUNCTIONS>,
}

impl CompatIdDescriptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function section with a zeroed sub-compatible ID
    pub fn function(self, first_interface: u8, compatible_id: [u8; 8]) -> BuilderResult<Self> {
        self.function_with_sub(first_interface, compatible_id, [0; 8])
    }

    pub fn function_with_sub(
        mut self,
        first_interface: u8,
        compatible_id: [u8; 8],
        sub_compatible_id: [u8; 8],
    ) -> BuilderResult<Self> {
        self.functions
            .push(CompatIdFunction {
                first_interface,
                compatible_id,
                sub_compatible_id,
            })
            .map_err(|_| MsOsBuilderError::TooManyFunctions)?;
        Ok(self)
    }

    fn len(&self) -> usize {
        COMPAT_ID_HEADER_LEN + self.functions.len() * COMPAT_ID_FUNCTION_LEN
    }

    /// Serialize into `buf`, returning the descriptor length
    fn write_to(&self, buf: &mut [u8; COMPAT_ID_MAX_LEN]) -> usize {
        let len = self.len();

        buf[0..4].copy_from_slice(&(len as u32).to_le_bytes());
        buf[4..6].copy_from_slice(&MS_OS_VERSION_1_0.to_le_bytes());
        buf[6..8].copy_from_slice(&FEATURE_COMPAT_ID.to_le_bytes());
        buf[8] = self.functions.len() as u8;
        buf[9..COMPAT_ID_HEADER_LEN].fill(0);

        let mut offset = COMPAT_ID_HEADER_LEN;
        for function in &self.functions {
            buf[offset] = function.first_interface;
            buf[offset + 1] = 0x01;
            buf[offset + 2..offset + 10].copy_from_slice(&function.compatible_id);
            buf[offset + 10..offset + 18].copy_from_slice(&function.sub_compatible_id);
            buf[offset + 18..offset + 24].fill(0);
            offset += COMPAT_ID_FUNCTION_LEN;
        }

        len
    }
}

/// Builder for the extended-properties feature descriptor
///
/// The header lengths and property count are kept consistent as properties
/// are appended. The finished bytes are served with
/// [`MsOsDescriptors::with_extended_properties`], which takes a `'static`
/// slice: the descriptor easily exceeds the control pipe's transfer buffer
/// (a single `DeviceInterfaceGUID` property is 142 bytes), so the reply
/// must be sent without copying. Author the blob with this builder and
/// store the result in a `static`, or write the `static` by hand.
#[derive(Clone)]
pub struct ExtendedPropertiesDescriptor {
    buffer: heapless::Vec<u8, EXTENDED_PROPERTIES_CAPACITY>,
    count: u16,
}

impl Default for ExtendedPropertiesDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtendedPropertiesDescriptor {
    #[must_use]
    pub fn new() -> Self {
        let mut buffer = heapless::Vec::new();
        // header, patched as properties are added
        buffer
            .extend_from_slice(&(EXTENDED_PROPERTIES_HEADER_LEN as u32).to_le_bytes())
            .ok();
        buffer.extend_from_slice(&MS_OS_VERSION_1_0.to_le_bytes()).ok();
        buffer
            .extend_from_slice(&FEATURE_EXTENDED_PROPERTIES.to_le_bytes())
            .ok();
        buffer.extend_from_slice(&0_u16.to_le_bytes()).ok();

        Self { buffer, count: 0 }
    }

    /// Add a `REG_SZ` property, name and value encoded as NUL terminated
    /// UTF-16LE
    pub fn sz_property(self, name: &str, value: &str) -> BuilderResult<Self> {
        let mut builder = self.property_header(PropertyDataType::Sz, name, utf16_len(value))?;
        builder.push_utf16(value)?;
        Ok(builder)
    }

    /// Add a property with pre-encoded data bytes
    pub fn raw_property(
        self,
        data_type: PropertyDataType,
        name: &str,
        data: &[u8],
    ) -> BuilderResult<Self> {
        let mut builder = self.property_header(data_type, name, data.len())?;
        builder.push(data)?;
        Ok(builder)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    fn property_header(
        mut self,
        data_type: PropertyDataType,
        name: &str,
        data_len: usize,
    ) -> BuilderResult<Self> {
        let name_len = utf16_len(name);
        // dwSize, dwPropertyDataType, wPropertyNameLength, name,
        // dwPropertyDataLength, data
        let section_len = 4 + 4 + 2 + name_len + 4 + data_len;

        self.push(&(section_len as u32).to_le_bytes())?;
        self.push(&(data_type as u32).to_le_bytes())?;
        self.push(&(name_len as u16).to_le_bytes())?;
        self.push_utf16(name)?;
        self.push(&(data_len as u32).to_le_bytes())?;

        // account for the whole section up front; data bytes follow
        let total = self.buffer.len() + data_len;
        self.buffer[0..4].copy_from_slice(&(total as u32).to_le_bytes());
        self.count += 1;
        self.buffer[8..10].copy_from_slice(&self.count.to_le_bytes());

        Ok(self)
    }

    fn push(&mut self, data: &[u8]) -> BuilderResult<()> {
        self.buffer
            .extend_from_slice(data)
            .map_err(|_| MsOsBuilderError::BufferOverflow)
    }

    fn push_utf16(&mut self, s: &str) -> BuilderResult<()> {
        for unit in s.encode_utf16() {
            self.push(&unit.to_le_bytes())?;
        }
        self.push(&0_u16.to_le_bytes())
    }
}

fn utf16_len(s: &str) -> usize {
    (s.encode_utf16().count() + 1) * 2
}

/// Microsoft OS 1.0 descriptor responder
pub struct MsOsDescriptors {
    vendor_code: u8,
    compat_id: Option<CompatIdDescriptor>,
    extended_properties: Option<&'static [u8]>,
}

impl MsOsDescriptors {
    #[must_use]
    pub fn new(vendor_code: u8) -> Self {
        Self {
            vendor_code,
            compat_id: None,
            extended_properties: None,
        }
    }

    #[must_use]
    pub fn with_compat_id(mut self, descriptor: CompatIdDescriptor) -> Self {
        self.compat_id = Some(descriptor);
        self
    }

    /// Serve `descriptor` for the extended-properties feature request
    ///
    /// See [`ExtendedPropertiesDescriptor`] for authoring the bytes.
    #[must_use]
    pub fn with_extended_properties(mut self, descriptor: &'static [u8]) -> Self {
        self.extended_properties = Some(descriptor);
        self
    }

    #[must_use]
    pub fn vendor_code(&self) -> u8 {
        self.vendor_code
    }

    fn os_string_descriptor(&self) -> [u8; OS_STRING_DESCRIPTOR_LEN] {
        [
            OS_STRING_DESCRIPTOR_LEN as u8,
            descriptor_type::STRING,
            b'M',
            0x00,
            b'S',
            0x00,
            b'F',
            0x00,
            b'T',
            0x00,
            b'1',
            0x00,
            b'0',
            0x00,
            b'0',
            0x00,
            self.vendor_code,
            0x00, // flags, no ContainerID
        ]
    }
}

impl<B: UsbBus> UsbClass<B> for MsOsDescriptors {
    fn control_in(&mut self, transfer: ControlIn<B>) {
        let request: &Request = transfer.request();
        let requested = usize::from(request.length);

        match request.request_type {
            RequestType::Standard => {
                if request.recipient == Recipient::Device
                    && request.request == Request::GET_DESCRIPTOR
                    && request.value
                        == (u16::from(descriptor_type::STRING) << 8) | u16::from(OS_STRING_INDEX)
                {
                    trace!("Get OS string descriptor");
                    let descriptor = self.os_string_descriptor();
                    let len = descriptor.len().min(requested);
                    if let Err(e) = transfer.accept_with(&descriptor[..len]) {
                        error!("Failed to send OS string descriptor - {:?}", e);
                    }
                }
            }
            RequestType::Vendor => {
                if request.request != self.vendor_code {
                    return;
                }

                match request.index {
                    FEATURE_COMPAT_ID => {
                        if let Some(compat_id) = &self.compat_id {
                            let mut buffer = [0_u8; COMPAT_ID_MAX_LEN];
                            let len = compat_id.write_to(&mut buffer).min(requested);
                            match transfer.accept_with(&buffer[..len]) {
                                Err(e) => error!("Failed to send compat id - {:?}", e),
                                Ok(_) => trace!("Sent compat id, {:X} bytes", len),
                            }
                        } else {
                            trace!("No compat id registered");
                        }
                    }
                    FEATURE_EXTENDED_PROPERTIES => {
                        if let Some(extended_properties) = self.extended_properties {
                            let len = extended_properties.len().min(requested);
                            // static data sidesteps the control pipe's
                            // transfer buffer
                            match transfer.accept_with_static(&extended_properties[..len]) {
                                Err(e) => error!("Failed to send extended properties - {:?}", e),
                                Ok(_) => trace!("Sent extended properties, {:X} bytes", len),
                            }
                        } else {
                            trace!("No extended properties registered");
                        }
                    }
                    _ => {
                        warn!("Unsupported OS feature descriptor index {:X}", request.index);
                    }
                }
            }
            RequestType::Class | RequestType::Reserved => {}
        }
    }
}
