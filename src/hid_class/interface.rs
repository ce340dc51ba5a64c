use fugit::MillisDurationU32;
use heapless::FnvIndexMap;
use log::{trace, warn};
use usb_device::class_prelude::*;
use usb_device::UsbError;

use crate::hid_class::descriptor::{
    hid_descriptor, DescriptorType, HidProtocol, InterfaceProtocol, InterfaceSubClass, ReportId,
    USB_CLASS_HID,
};
use crate::hid_class::{BuilderResult, UsbHidBuilderError, UsbHidClassBuilder, UsbPacketSize};

/// Application hooks for the HID control protocol
///
/// `get_report` and `set_report` decide whether the corresponding control
/// request succeeds; the remaining methods are notifications. A missing
/// handler, or a `None`/`false` answer, is reported to the host as a stall.
pub trait HidRequestHandler {
    /// Write the report selected by `id` into `buf`, returning its size
    fn get_report(&self, id: ReportId, buf: &mut [u8]) -> Option<usize> {
        let _ = (id, buf);
        None
    }

    /// Accept the report selected by `id`, delivered on the control pipe
    fn set_report(&self, id: ReportId, data: &[u8]) -> bool {
        let _ = (id, data);
        false
    }

    /// A report written with [`Interface::write_report`] was collected by
    /// the host
    fn report_sent(&self) {}

    /// The host changed an idle rate. `value` is in 4 ms units, `0` means
    /// indefinite
    fn idle_changed(&self, _report_id: u8, _value: u8) {}

    /// The host switched between boot and report protocol
    fn protocol_changed(&self, _protocol: HidProtocol) {}

    /// Physical descriptor for `GET_DESCRIPTOR(Physical, index)`
    fn physical_descriptor(&self, _index: u8) -> Option<&[u8]> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    pub poll_interval: u8,
    pub max_packet_size: UsbPacketSize,
}

#[derive(Clone, Copy)]
pub struct InterfaceConfig<'a> {
    pub report_descriptor: &'a [u8],
    pub description: Option<&'a str>,
    pub protocol: InterfaceProtocol,
    pub idle_default: u8,
    pub out_endpoint: Option<EndpointConfig>,
    pub in_endpoint: EndpointConfig,
    pub handler: Option<&'a dyn HidRequestHandler>,
}

#[must_use = "this `UsbHidInterfaceBuilder` must be assigned or consumed by `::build_interface()`"]
#[derive(Clone)]
pub struct UsbHidInterfaceBuilder<'a, B: UsbBus> {
    class_builder: UsbHidClassBuilder<'a, B>,
    config: InterfaceConfig<'a>,
}

impl<'a, B: UsbBus> UsbHidInterfaceBuilder<'a, B> {
    pub(super) fn new(
        class_builder: UsbHidClassBuilder<'a, B>,
        report_descriptor: &'a [u8],
    ) -> Self {
        UsbHidInterfaceBuilder {
            class_builder,
            config: InterfaceConfig {
                report_descriptor,
                description: None,
                protocol: InterfaceProtocol::None,
                idle_default: 0,
                out_endpoint: None,
                in_endpoint: EndpointConfig {
                    max_packet_size: UsbPacketSize::Size8,
                    poll_interval: 20,
                },
                handler: None,
            },
        }
    }

    pub fn boot_device(mut self, protocol: InterfaceProtocol) -> Self {
        self.config.protocol = protocol;
        self
    }

    pub fn idle_default(mut self, duration: MillisDurationU32) -> BuilderResult<Self> {
        if duration.ticks() == 0 {
            self.config.idle_default = 0;
        } else {
            let scaled_duration = duration.to_millis() / 4;

            if scaled_duration == 0 {
                //round up for 1-3ms
                self.config.idle_default = 1;
            } else {
                self.config.idle_default =
                    u8::try_from(scaled_duration).map_err(|_| UsbHidBuilderError::ValueOverflow)?;
            }
        }
        Ok(self)
    }

    pub fn description(mut self, s: &'a str) -> Self {
        self.config.description = Some(s);
        self
    }

    pub fn request_handler(mut self, handler: &'a dyn HidRequestHandler) -> Self {
        self.config.handler = Some(handler);
        self
    }

    pub fn with_out_endpoint(
        mut self,
        max_packet_size: UsbPacketSize,
        poll_interval: MillisDurationU32,
    ) -> BuilderResult<Self> {
        self.config.out_endpoint = Some(EndpointConfig {
            max_packet_size,
            poll_interval: u8::try_from(poll_interval.to_millis())
                .map_err(|_| UsbHidBuilderError::ValueOverflow)?,
        });
        Ok(self)
    }

    pub fn without_out_endpoint(mut self) -> Self {
        self.config.out_endpoint = None;
        self
    }

    pub fn in_endpoint(
        mut self,
        max_packet_size: UsbPacketSize,
        poll_interval: MillisDurationU32,
    ) -> BuilderResult<Self> {
        self.config.in_endpoint = EndpointConfig {
            max_packet_size,
            poll_interval: u8::try_from(poll_interval.to_millis())
                .map_err(|_| UsbHidBuilderError::ValueOverflow)?,
        };
        Ok(self)
    }

    pub fn build_interface(mut self) -> BuilderResult<UsbHidClassBuilder<'a, B>> {
        self.class_builder
            .interfaces
            .push(self.config)
            .map_err(|_| UsbHidBuilderError::TooManyInterfaces)?;
        Ok(self.class_builder)
    }
}

pub struct Interface<'a, B: UsbBus> {
    id: InterfaceNumber,
    config: InterfaceConfig<'a>,
    in_endpoint: EndpointIn<'a, B>,
    out_endpoint: Option<EndpointOut<'a, B>>,
    description_index: Option<StringIndex>,
    protocol: HidProtocol,
    report_idle: FnvIndexMap<u8, u8, 32>,
    global_idle: u8,
}

impl<'a, B: UsbBus> Interface<'a, B> {
    pub(super) fn new(config: InterfaceConfig<'a>, usb_alloc: &'a UsbBusAllocator<B>) -> Self {
        Interface {
            config,
            id: usb_alloc.interface(),
            in_endpoint: usb_alloc.interrupt(
                config.in_endpoint.max_packet_size as u16,
                config.in_endpoint.poll_interval,
            ),
            out_endpoint: config
                .out_endpoint
                .map(|c| usb_alloc.interrupt(c.max_packet_size as u16, c.poll_interval)),
            description_index: config.description.map(|_| usb_alloc.string()),
            //When initialized, all devices default to report protocol - Hid spec 7.2.6 Set_Protocol Request
            protocol: HidProtocol::Report,
            report_idle: FnvIndexMap::default(),
            global_idle: config.idle_default,
        }
    }

    pub fn config(&self) -> &InterfaceConfig<'a> {
        &self.config
    }

    pub fn handler(&self) -> Option<&'a dyn HidRequestHandler> {
        self.config.handler
    }

    pub fn protocol(&self) -> HidProtocol {
        self.protocol
    }

    pub fn id(&self) -> InterfaceNumber {
        self.id
    }

    pub fn global_idle(&self) -> MillisDurationU32 {
        MillisDurationU32::millis(u32::from(self.global_idle) * 4)
    }

    pub fn report_idle(&self, report_id: u8) -> Option<MillisDurationU32> {
        if report_id == 0 {
            None
        } else {
            self.report_idle
                .get(&report_id)
                .map(|&i| MillisDurationU32::millis(u32::from(i) * 4))
        }
    }

    /// Send a report on the interrupt IN endpoint
    ///
    /// The data is sent verbatim; if report IDs are in use the caller
    /// prefixes them. Fails with [`UsbError::WouldBlock`] while a previous
    /// report is outstanding.
    pub fn write_report(&self, data: &[u8]) -> usb_device::Result<usize> {
        self.in_endpoint.write(data)
    }

    /// Read a report from the interrupt OUT endpoint
    ///
    /// Until the application drains a pending report the endpoint NAKs the
    /// host, so an unread report is never overwritten.
    pub fn read_report(&self, data: &mut [u8]) -> usb_device::Result<usize> {
        if let Some(ep) = &self.out_endpoint {
            ep.read(data)
        } else {
            Err(UsbError::WouldBlock)
        }
    }

    pub(super) fn write_descriptors(&self, writer: &mut DescriptorWriter) -> usb_device::Result<()> {
        writer.interface_alt(
            self.id,
            usb_device::device::DEFAULT_ALTERNATE_SETTING,
            USB_CLASS_HID,
            InterfaceSubClass::from(self.config.protocol) as u8,
            self.config.protocol as u8,
            self.description_index,
        )?;

        //Hid descriptor
        writer.write(
            DescriptorType::Hid as u8,
            &hid_descriptor(self.config.report_descriptor.len())?,
        )?;

        //Endpoint descriptors
        writer.endpoint(&self.in_endpoint)?;
        if let Some(e) = &self.out_endpoint {
            writer.endpoint(e)?;
        }

        Ok(())
    }

    pub(super) fn get_string(&self, index: StringIndex, _lang_id: u16) -> Option<&str> {
        self.description_index
            .filter(|&i| i == index)
            .and(self.config.description)
    }

    pub(super) fn reset(&mut self) {
        self.protocol = HidProtocol::Report;
        self.global_idle = self.config.idle_default;
        self.report_idle.clear();
    }

    pub(super) fn set_idle(&mut self, report_id: u8, value: u8) {
        if report_id == 0 {
            self.global_idle = value;
            //"If the lower byte of value is zero, then the idle rate applies to all
            //input reports generated by the device" - HID spec 7.2.4
            self.report_idle.clear();
            trace!("Set global idle to {:X} and cleared report idle map", value);
        } else {
            match self.report_idle.insert(report_id, value) {
                Ok(_) => {
                    trace!("Set report idle for {:X} to {:X}", report_id, value);
                }
                Err(_) => {
                    warn!(
                        "Failed to set idle for report id {:X}, idle map is full",
                        report_id
                    );
                }
            }
        }

        if let Some(handler) = self.config.handler {
            handler.idle_changed(report_id, value);
        }
    }

    pub(super) fn get_idle(&self, report_id: u8) -> u8 {
        if report_id == 0 {
            self.global_idle
        } else {
            *self
                .report_idle
                .get(&report_id)
                .unwrap_or(&self.global_idle)
        }
    }

    pub(super) fn set_protocol(&mut self, protocol: HidProtocol) {
        self.protocol = protocol;
        trace!("Set protocol to {:?}", protocol);
        if let Some(handler) = self.config.handler {
            handler.protocol_changed(protocol);
        }
    }

    pub(super) fn in_endpoint_address(&self) -> EndpointAddress {
        self.in_endpoint.address()
    }
}
