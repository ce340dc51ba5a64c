//! XInput gamepad class for implementing Xbox 360 compatible controllers
//!
//! XInput is not a HID variant: the interface is vendor class `0xFF`,
//! subclass `0x5D`, protocol `0x01` with a class-specific descriptor of type
//! `0x21` and an interrupt endpoint pair. Hosts discover the pad through the
//! Microsoft OS 1.0 descriptors served by [`crate::ms_os`].

use log::{error, trace, warn};
use usb_device::class_prelude::*;
use usb_device::control::{Recipient, RequestType};
use usb_device::UsbError;

use crate::UsbXpadError;
use report::{LedPattern, OutputMessage, RumbleCapabilities, XInputControls};

pub mod report;
#[cfg(test)]
mod test;

pub const XINPUT_INTERFACE_CLASS: u8 = 0xFF;
pub const XINPUT_INTERFACE_SUBCLASS: u8 = 0x5D;
pub const XINPUT_INTERFACE_PROTOCOL: u8 = 0x01;

const MAX_PACKET_SIZE: u16 = 32;
const IN_POLL_INTERVAL_MS: u8 = 4;
const OUT_POLL_INTERVAL_MS: u8 = 8;

/// The only vendor request XUSB issues against the control interface
const VENDOR_REQUEST_CONTROL: u8 = 0x01;

// wValue of the interface-recipient capability queries. The serial-number
// request reuses 0x0000 with a device recipient, so dispatch must branch on
// the recipient before the value.
const CAPABILITIES_RUMBLE: u16 = 0x0000;
const CAPABILITIES_CONTROLS: u16 = 0x0100;
const SERIAL_NUMBER: u16 = 0x0000;

/// Host events raised by [`XInputClass`]
///
/// All methods default to doing nothing so an application only implements
/// the events it cares about.
pub trait XInputRequestHandler {
    /// The host changed the rumble motor levels
    fn received_rumble(&self, _left: u8, _right: u8) {}

    /// The host selected a new LED animation
    ///
    /// Repeats of the current animation are filtered out before this is
    /// called.
    fn received_led(&self, _pattern: LedPattern) {}

    /// A controls report was collected by the host
    fn report_complete(&self) {}
}

#[must_use = "this `XInputClassBuilder` must be assigned or consumed by `::build()`"]
#[derive(Clone, Copy)]
pub struct XInputClassBuilder<'a> {
    serial_number: Option<&'a str>,
    rumble_capabilities: RumbleCapabilities,
    input_capabilities: XInputControls,
    handler: Option<&'a dyn XInputRequestHandler>,
}

impl<'a> XInputClassBuilder<'a> {
    pub fn new() -> Self {
        Self {
            serial_number: None,
            rumble_capabilities: RumbleCapabilities::default(),
            input_capabilities: XInputControls::all_controls(),
            handler: None,
        }
    }

    /// Serial reported to the driver-side serial query, sent as raw bytes
    /// with no terminator
    pub fn serial_number(mut self, serial_number: &'a str) -> Self {
        self.serial_number = Some(serial_number);
        self
    }

    pub fn rumble_capabilities(mut self, capabilities: RumbleCapabilities) -> Self {
        self.rumble_capabilities = capabilities;
        self
    }

    pub fn input_capabilities(mut self, capabilities: XInputControls) -> Self {
        self.input_capabilities = capabilities;
        self
    }

    pub fn request_handler(mut self, handler: &'a dyn XInputRequestHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build<B: UsbBus>(self, usb_alloc: &'a UsbBusAllocator<B>) -> XInputClass<'a, B> {
        XInputClass {
            id: usb_alloc.interface(),
            in_endpoint: usb_alloc.interrupt(MAX_PACKET_SIZE, IN_POLL_INTERVAL_MS),
            out_endpoint: usb_alloc.interrupt(MAX_PACKET_SIZE, OUT_POLL_INTERVAL_MS),
            serial_number: self.serial_number,
            rumble_capabilities: self.rumble_capabilities,
            input_capabilities: self.input_capabilities,
            handler: self.handler,
            led_pattern: LedPattern::Off,
        }
    }
}

impl Default for XInputClassBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// USB XInput gamepad class
pub struct XInputClass<'a, B: UsbBus> {
    id: InterfaceNumber,
    in_endpoint: EndpointIn<'a, B>,
    out_endpoint: EndpointOut<'a, B>,
    serial_number: Option<&'a str>,
    rumble_capabilities: RumbleCapabilities,
    input_capabilities: XInputControls,
    handler: Option<&'a dyn XInputRequestHandler>,
    led_pattern: LedPattern,
}

impl<B: UsbBus> XInputClass<'_, B> {
    pub fn id(&self) -> InterfaceNumber {
        self.id
    }

    /// The LED animation most recently selected by the host
    pub fn led_pattern(&self) -> LedPattern {
        self.led_pattern
    }

    /// Send a controls report on the interrupt IN endpoint
    ///
    /// Fails with [`UsbXpadError::WouldBlock`] while a previous report is
    /// still outstanding; whether to retry, drop or coalesce is up to the
    /// caller.
    pub fn write_report(
        &self,
        controls: &XInputControls,
    ) -> core::result::Result<(), UsbXpadError> {
        let report = controls
            .as_report()
            .map_err(|_| UsbXpadError::SerializationError)?;
        self.in_endpoint.write(&report)?;
        Ok(())
    }

    // The class-specific descriptor carries the endpoint report metadata of
    // a wired pad's control interface, with the allocated endpoint
    // addresses patched in.
    fn class_descriptor_body(&self) -> [u8; 15] {
        [
            0x00,
            0x01,
            0x01,
            0x25,
            u8::from(self.in_endpoint.address()),
            0x14,
            0x00,
            0x00,
            0x00,
            0x00,
            0x13,
            u8::from(self.out_endpoint.address()),
            0x08,
            0x00,
            0x00,
        ]
    }

    fn handle_output(&mut self, data: &[u8]) {
        match OutputMessage::parse(data) {
            Some(OutputMessage::Rumble { left, right }) => {
                trace!("Received rumble, left:{:X} right:{:X}", left, right);
                if let Some(handler) = self.handler {
                    handler.received_rumble(left, right);
                }
            }
            Some(OutputMessage::Led(pattern)) => {
                if pattern == self.led_pattern {
                    trace!("Dropped repeated led animation {:?}", pattern);
                } else {
                    self.led_pattern = pattern;
                    trace!("Received led animation {:?}", pattern);
                    if let Some(handler) = self.handler {
                        handler.received_led(pattern);
                    }
                }
            }
            None => {
                warn!("Ignored malformed gamepad output, {} bytes", data.len());
            }
        }
    }
}

impl<B: UsbBus> UsbClass<B> for XInputClass<'_, B> {
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.interface(
            self.id,
            XINPUT_INTERFACE_CLASS,
            XINPUT_INTERFACE_SUBCLASS,
            XINPUT_INTERFACE_PROTOCOL,
        )?;
        writer.write(
            crate::descriptor::DESCRIPTOR_TYPE_CLASS_SPECIFIC,
            &self.class_descriptor_body(),
        )?;
        writer.endpoint(&self.in_endpoint)?;
        writer.endpoint(&self.out_endpoint)?;

        Ok(())
    }

    fn reset(&mut self) {
        self.led_pattern = LedPattern::Off;
    }

    fn control_in(&mut self, transfer: ControlIn<B>) {
        let request = transfer.request();

        if request.request_type != RequestType::Vendor
            || request.request != VENDOR_REQUEST_CONTROL
            || request.index != u16::from(u8::from(self.id))
        {
            return;
        }

        let recipient = request.recipient;
        let value = request.value;

        trace!(
            "xinput ctrl_in: recipient: {:?}, value: {:X}",
            recipient,
            value
        );

        match (recipient, value) {
            (Recipient::Interface, CAPABILITIES_RUMBLE) => {
                if let Err(e) = transfer.accept_with(&self.rumble_capabilities.as_message()) {
                    error!("Failed to send rumble capabilities - {:?}", e);
                }
            }
            (Recipient::Interface, CAPABILITIES_CONTROLS) => match self
                .input_capabilities
                .as_report()
            {
                Ok(report) => {
                    if let Err(e) = transfer.accept_with(&report) {
                        error!("Failed to send input capabilities - {:?}", e);
                    }
                }
                Err(_) => {
                    error!("Failed to pack input capabilities");
                    transfer.reject().ok();
                }
            },
            (Recipient::Device, SERIAL_NUMBER) => {
                if let Some(serial_number) = self.serial_number {
                    if let Err(e) = transfer.accept_with(serial_number.as_bytes()) {
                        error!("Failed to send serial number - {:?}", e);
                    }
                }
            }
            _ => {
                warn!(
                    "Unsupported xinput vendor request, recipient: {:?}, value: {:X}",
                    recipient, value
                );
            }
        }
    }

    fn endpoint_out(&mut self, addr: EndpointAddress) {
        if addr != self.out_endpoint.address() {
            return;
        }

        let mut data = [0_u8; MAX_PACKET_SIZE as usize];
        match self.out_endpoint.read(&mut data) {
            Ok(len) => self.handle_output(&data[..len]),
            Err(UsbError::WouldBlock) => {}
            Err(e) => {
                warn!("Failed to read gamepad output - {:?}", e);
            }
        }
    }

    fn endpoint_in_complete(&mut self, addr: EndpointAddress) {
        if addr == self.in_endpoint.address() {
            if let Some(handler) = self.handler {
                handler.report_complete();
            }
        }
    }
}
