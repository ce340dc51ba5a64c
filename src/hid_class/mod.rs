//! Abstract Human Interface Device class for implementing any HID compliant device
//!
//! The data path is not tied to a report layout: reports move as raw bytes
//! through [`Interface::write_report`] and [`Interface::read_report`], while
//! the control protocol (descriptor retrieval, GET/SET_REPORT, GET/SET_IDLE,
//! GET/SET_PROTOCOL) is dispatched to a [`interface::HidRequestHandler`]
//! supplied by the application.

use core::default::Default;

use heapless::{FnvIndexMap, Vec};
use log::{error, info, trace, warn};
use packed_struct::prelude::*;
use usb_device::class_prelude::*;
use usb_device::control::Recipient;
use usb_device::control::Request;
use usb_device::control::RequestType;
use usb_device::Result;

use descriptor::{DescriptorType, HidProtocol, ReportId};
use interface::{Interface, InterfaceConfig, UsbHidInterfaceBuilder};

pub mod descriptor;
pub mod interface;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PrimitiveEnum)]
#[repr(u8)]
pub enum HidRequest {
    GetReport = 0x01,
    GetIdle = 0x02,
    GetProtocol = 0x03,
    SetReport = 0x09,
    SetIdle = 0x0A,
    SetProtocol = 0x0B,
}

impl From<HidRequest> for u8 {
    fn from(value: HidRequest) -> Self {
        value.to_primitive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, PrimitiveEnum)]
#[repr(u8)]
pub enum UsbPacketSize {
    Size8 = 8,
    Size16 = 16,
    Size32 = 32,
    Size64 = 64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsbHidBuilderError {
    ValueOverflow,
    TooManyInterfaces,
    NoInterfacesDefined,
}

const MAX_INTERFACE_COUNT: usize = 8;

// Scratch for reports served on the control pipe
const CONTROL_REPORT_LEN: usize = 64;

#[must_use = "this `UsbHidClassBuilder` must be assigned or consumed by `::build()`"]
#[derive(Clone)]
pub struct UsbHidClassBuilder<'a, B: UsbBus> {
    usb_alloc: &'a UsbBusAllocator<B>,
    interfaces: Vec<InterfaceConfig<'a>, MAX_INTERFACE_COUNT>,
}

impl<'a, B: UsbBus> UsbHidClassBuilder<'a, B> {
    pub fn new(usb_alloc: &'a UsbBusAllocator<B>) -> Self {
        Self {
            usb_alloc,
            interfaces: Default::default(),
        }
    }

    pub fn new_interface(self, report_descriptor: &'a [u8]) -> UsbHidInterfaceBuilder<'a, B> {
        UsbHidInterfaceBuilder::new(self, report_descriptor)
    }

    pub fn build(self) -> BuilderResult<UsbHidClass<'a, B>> {
        if self.interfaces.is_empty() {
            Err(UsbHidBuilderError::NoInterfacesDefined)
        } else {
            Ok(UsbHidClass::new(self.usb_alloc, self.interfaces))
        }
    }
}

pub type BuilderResult<B> = core::result::Result<B, UsbHidBuilderError>;

/// USB Human Interface Device class
pub struct UsbHidClass<'a, B: UsbBus> {
    interfaces: Vec<Interface<'a, B>, MAX_INTERFACE_COUNT>,
    interface_num_map: FnvIndexMap<u8, usize, MAX_INTERFACE_COUNT>,
}

impl<'a, B: UsbBus> UsbHidClass<'a, B> {
    pub fn new<I: IntoIterator<Item = InterfaceConfig<'a>>>(
        usb_alloc: &'a UsbBusAllocator<B>,
        interface_configs: I,
    ) -> Self {
        let interfaces: Vec<Interface<'a, B>, MAX_INTERFACE_COUNT> = interface_configs
            .into_iter()
            .map(|config| Interface::new(config, usb_alloc))
            .collect();

        let interface_num_map = interfaces
            .iter()
            .enumerate()
            .map(|(i, interface)| (u8::from(interface.id()), i))
            .collect();

        UsbHidClass {
            interfaces,
            interface_num_map,
        }
    }

    pub fn get_interface(&self, index: usize) -> Option<&Interface<'a, B>> {
        self.interfaces.get(index)
    }

    pub fn get_interface_mut(&mut self, index: usize) -> Option<&mut Interface<'a, B>> {
        self.interfaces.get_mut(index)
    }

    /// Lookup an interface by the interface number the host addresses it with
    pub fn get_interface_by_number(&self, interface_number: u8) -> Option<&Interface<'a, B>> {
        self.interface_num_map
            .get(&interface_number)
            .map(|&i| &self.interfaces[i])
    }

    fn interface_index(&self, index: u16) -> Option<usize> {
        u8::try_from(index)
            .ok()
            .and_then(|i| self.interface_num_map.get(&i))
            .copied()
    }

    fn get_descriptor(transfer: ControlIn<B>, interface: &Interface<'a, B>) {
        let request: &Request = transfer.request();
        let value = request.value;
        match DescriptorType::from_primitive((value >> 8) as u8) {
            Some(DescriptorType::Report) => {
                match transfer.accept_with(interface.config().report_descriptor) {
                    Err(e) => error!("Failed to send report descriptor - {:?}", e),
                    Ok(_) => {
                        trace!("Sent report descriptor");
                    }
                }
            }
            Some(DescriptorType::Hid) => {
                match descriptor::hid_descriptor(interface.config().report_descriptor.len()) {
                    Err(e) => {
                        error!("Failed to generate Hid descriptor - {:?}", e);
                        //Stall, we can't make further progress without a valid descriptor
                        transfer.reject().ok();
                    }
                    Ok(hid_descriptor) => {
                        let mut buffer = [0; 9];
                        buffer[0] = buffer.len() as u8;
                        buffer[1] = DescriptorType::Hid as u8;
                        buffer[2..].copy_from_slice(&hid_descriptor);
                        match transfer.accept_with(&buffer) {
                            Err(e) => {
                                error!("Failed to send Hid descriptor - {:?}", e);
                            }
                            Ok(_) => {
                                trace!("Sent hid descriptor");
                            }
                        }
                    }
                }
            }
            Some(DescriptorType::Physical) => {
                let index = (value & 0xFF) as u8;
                match interface
                    .handler()
                    .and_then(|handler| handler.physical_descriptor(index))
                {
                    Some(data) => {
                        if let Err(e) = transfer.accept_with(data) {
                            error!("Failed to send physical descriptor - {:?}", e);
                        }
                    }
                    None => {
                        trace!("No physical descriptor for index {:X}", index);
                        transfer.reject().ok();
                    }
                }
            }
            None => {
                warn!(
                    "Unsupported descriptor type, request type:{:X?}, request:{:X}, value:{:X}",
                    request.request_type, request.request, request.value
                );
            }
        }
    }
}

impl<B: UsbBus> UsbClass<B> for UsbHidClass<'_, B> {
    fn get_configuration_descriptors(&self, writer: &mut DescriptorWriter) -> Result<()> {
        for i in &self.interfaces {
            i.write_descriptors(writer)?;
        }

        info!("wrote class config descriptor");
        Ok(())
    }

    fn get_string(&self, index: StringIndex, lang_id: u16) -> Option<&str> {
        for i in &self.interfaces {
            if let Some(s) = i.get_string(index, lang_id) {
                return Some(s);
            }
        }
        None
    }

    fn reset(&mut self) {
        info!("Reset");
        for i in &mut self.interfaces {
            i.reset();
        }
    }

    fn control_out(&mut self, transfer: ControlOut<B>) {
        let request: &Request = transfer.request();

        //only respond to Class requests for this interface
        if !(request.request_type == RequestType::Class
            && request.recipient == Recipient::Interface)
        {
            return;
        }

        let interface = match self.interface_index(request.index) {
            Some(i) => &mut self.interfaces[i],
            None => {
                return;
            }
        };

        trace!(
            "ctrl_out: request type: {:?}, request: {:X}, value: {:X}",
            request.request_type,
            request.request,
            request.value
        );

        match HidRequest::from_primitive(request.request) {
            Some(HidRequest::SetReport) => match ReportId::from_value(request.value) {
                Some(id) => {
                    let accepted = interface
                        .handler()
                        .map_or(false, |handler| handler.set_report(id, transfer.data()));

                    if accepted {
                        transfer.accept().ok();
                    } else {
                        trace!("SetReport refused for {:?}", id);
                        transfer.reject().ok();
                    }
                }
                None => {
                    warn!("SetReport with invalid report type, value: {:X}", request.value);
                    transfer.reject().ok();
                }
            },
            Some(HidRequest::SetIdle) => {
                if request.length != 0 {
                    warn!(
                        "Expected SetIdle to have length 0, received {:X}",
                        request.length
                    );
                }

                interface.set_idle((request.value & 0xFF) as u8, (request.value >> 8) as u8);
                transfer.accept().ok();
            }
            Some(HidRequest::SetProtocol) => {
                if request.length != 0 {
                    warn!(
                        "Expected SetProtocol to have length 0, received {:X}",
                        request.length
                    );
                }
                if let Some(protocol) = HidProtocol::from_primitive((request.value & 0xFF) as u8) {
                    interface.set_protocol(protocol);
                    transfer.accept().ok();
                } else {
                    error!(
                        "Unable to set protocol, unsupported value:{:X}",
                        request.value
                    );
                }
            }
            _ => {
                warn!(
                    "Unsupported control_out request type: {:?}, request: {:X}, value: {:X}",
                    request.request_type, request.request, request.value
                );
            }
        }
    }

    fn control_in(&mut self, transfer: ControlIn<B>) {
        let request: &Request = transfer.request();
        //only respond to requests for this interface
        if request.recipient != Recipient::Interface {
            return;
        }

        let interface = match self.interface_index(request.index) {
            Some(i) => &self.interfaces[i],
            None => {
                return;
            }
        };

        trace!(
            "ctrl_in: request type: {:?}, request: {:X}, value: {:X}",
            request.request_type,
            request.request,
            request.value
        );

        match request.request_type {
            RequestType::Standard => {
                if request.request == Request::GET_DESCRIPTOR {
                    info!("Get descriptor");
                    Self::get_descriptor(transfer, interface);
                }
            }

            RequestType::Class => {
                match HidRequest::from_primitive(request.request) {
                    Some(HidRequest::GetReport) => match ReportId::from_value(request.value) {
                        Some(id) => {
                            let mut buffer = [0; CONTROL_REPORT_LEN];
                            let reply = interface
                                .handler()
                                .and_then(|handler| handler.get_report(id, &mut buffer));

                            match reply {
                                Some(len) => {
                                    if len != usize::from(request.length) {
                                        warn!(
                                            "GetReport expected {:X} bytes, report length {:X} bytes",
                                            request.length, len
                                        );
                                    }
                                    if let Err(e) = transfer.accept_with(&buffer[..len]) {
                                        error!("Failed to send report - {:?}", e);
                                    }
                                }
                                None => {
                                    trace!("GetReport refused for {:?}", id);
                                    transfer.reject().ok();
                                }
                            }
                        }
                        None => {
                            warn!(
                                "GetReport with invalid report type, value: {:X}",
                                request.value
                            );
                            transfer.reject().ok();
                        }
                    },
                    Some(HidRequest::GetIdle) => {
                        if request.length != 1 {
                            warn!(
                                "Expected GetIdle to have length 1, received {:X}",
                                request.length
                            );
                        }

                        let report_id = (request.value & 0xFF) as u8;
                        let idle = interface.get_idle(report_id);
                        match transfer.accept_with(&[idle]) {
                            Err(e) => error!("Failed to send idle data - {:?}", e),
                            Ok(_) => info!("Get Idle for ID{:X}: {:X}", report_id, idle),
                        }
                    }
                    Some(HidRequest::GetProtocol) => {
                        if request.length != 1 {
                            warn!(
                                "Expected GetProtocol to have length 1, received {:X}",
                                request.length
                            );
                        }

                        let protocol = interface.protocol();
                        match transfer.accept_with(&[protocol as u8]) {
                            Err(e) => error!("Failed to send protocol data - {:?}", e),
                            Ok(_) => info!("Get protocol: {:?}", protocol),
                        }
                    }
                    _ => {
                        warn!(
                            "Unsupported control_in request type: {:?}, request: {:X}, value: {:X}",
                            request.request_type, request.request, request.value
                        );
                    }
                }
            }
            _ => {}
        }
    }

    fn endpoint_in_complete(&mut self, addr: EndpointAddress) {
        for interface in &self.interfaces {
            if interface.in_endpoint_address() == addr {
                if let Some(handler) = interface.handler() {
                    handler.report_sent();
                }
            }
        }
    }
}
