#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::cell::{Cell, RefCell};
use std::vec::Vec;

use packed_struct::prelude::*;
use usb_device::class_prelude::*;
use usb_device::control::{Recipient, Request, RequestType};
use usb_device::prelude::*;

use super::*;
use crate::descriptor::InterfaceBlock;
use crate::test_helpers::{init_logging, TestUsbBus, UsbRequest, UsbTestManager};

const IN_ENDPOINT: usize = 1;
const OUT_ENDPOINT: usize = 2;

const SERIAL: &str = "3032363530313233";

#[derive(Default)]
struct TestHandler {
    rumble: RefCell<Vec<(u8, u8)>>,
    led: RefCell<Vec<LedPattern>>,
    reports_complete: Cell<usize>,
}

impl XInputRequestHandler for TestHandler {
    fn received_rumble(&self, left: u8, right: u8) {
        self.rumble.borrow_mut().push((left, right));
    }

    fn received_led(&self, pattern: LedPattern) {
        self.led.borrow_mut().push(pattern);
    }

    fn report_complete(&self) {
        self.reports_complete.set(self.reports_complete.get() + 1);
    }
}

fn vendor_request(recipient: Recipient, value: u16, length: u16) -> [u8; 8] {
    UsbRequest {
        direction: true,
        request_type: RequestType::Vendor as u8,
        recipient: recipient as u8,
        request: VENDOR_REQUEST_CONTROL,
        value,
        index: 0x0,
        length,
    }
    .pack()
    .unwrap()
}

#[test]
fn configuration_descriptors_bind_as_xinput() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

    let mut xinput = XInputClassBuilder::new().build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E)).build();

    // Get Configuration
    manager
        .host_write_setup(
            &UsbRequest {
                direction: true,
                request_type: RequestType::Standard as u8,
                recipient: Recipient::Device as u8,
                request: Request::GET_DESCRIPTOR,
                value: u16::from(usb_device::descriptor::descriptor_type::CONFIGURATION) << 8,
                index: 0,
                length: 0xFFFF,
            }
            .pack()
            .unwrap(),
        )
        .unwrap();

    assert!(usb_dev.poll(&mut [&mut xinput]));

    // read multiple transfers then validate the stream
    let mut data = Vec::new();
    loop {
        let read = manager.host_read_in();
        if read.is_empty() {
            break;
        }
        data.extend_from_slice(&read);
        assert!(usb_dev.poll(&mut [&mut xinput]));
    }

    let block = InterfaceBlock::find_in_configuration(&data, 0).unwrap();

    assert_eq!(block.interface.class, XINPUT_INTERFACE_CLASS);
    assert_eq!(block.interface.sub_class, XINPUT_INTERFACE_SUBCLASS);
    assert_eq!(block.interface.protocol, XINPUT_INTERFACE_PROTOCOL);
    assert_eq!(block.interface.num_endpoints, 2);

    let (ep_in, ep_out) = block.endpoint_pair();
    assert_eq!(ep_in, Some(0x81));
    assert_eq!(ep_out, Some(0x02));

    // the class descriptor carries the endpoint addresses at its fixed offsets
    assert_eq!(block.class_descriptor.len(), 15);
    assert_eq!(block.class_descriptor[4], 0x81);
    assert_eq!(block.class_descriptor[5], 0x14);
    assert_eq!(block.class_descriptor[11], 0x02);
    assert_eq!(block.class_descriptor[12], 0x08);

    for endpoint in &block.endpoints {
        assert_eq!(endpoint.attributes & 0x03, 0x03, "Expected interrupt type");
        assert_eq!(endpoint.max_packet_size, 32);
    }
    assert_eq!(block.endpoints[0].interval, 4);
    assert_eq!(block.endpoints[1].interval, 8);
}

#[test]
fn button_press_report_bytes() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));
    let handler = TestHandler::default();

    let mut xinput = XInputClassBuilder::new()
        .request_handler(&handler)
        .build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E)).build();

    xinput
        .write_report(&XInputControls {
            a: true,
            ..XInputControls::default()
        })
        .unwrap();

    assert_eq!(
        manager.host_read_endpoint_in(IN_ENDPOINT),
        [
            0x00, 0x14, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00
        ]
    );

    // collection by the host surfaces as a completion callback
    assert!(usb_dev.poll(&mut [&mut xinput]));
    assert_eq!(handler.reports_complete.get(), 1);
}

#[test]
fn at_most_one_outstanding_report() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

    let mut xinput = XInputClassBuilder::new().build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E)).build();

    let controls = XInputControls::default();

    xinput.write_report(&controls).unwrap();
    assert!(matches!(
        xinput.write_report(&controls),
        Err(crate::UsbXpadError::WouldBlock)
    ));

    // draining the endpoint frees it for the next report
    assert!(!manager.host_read_endpoint_in(IN_ENDPOINT).is_empty());
    assert!(usb_dev.poll(&mut [&mut xinput]));
    xinput.write_report(&controls).unwrap();
}

#[test]
fn rumble_arrival_invokes_handler() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));
    let handler = TestHandler::default();

    let mut xinput = XInputClassBuilder::new()
        .request_handler(&handler)
        .build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E)).build();

    manager
        .host_write_out(OUT_ENDPOINT, &[0x00, 0x08, 0x00, 0x80, 0x40, 0x00, 0x00, 0x00])
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));

    assert_eq!(*handler.rumble.borrow(), [(0x80, 0x40)]);

    // the endpoint was re-armed, the next transfer is accepted
    manager
        .host_write_out(OUT_ENDPOINT, &[0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));
    assert_eq!(*handler.rumble.borrow(), [(0x80, 0x40), (0x00, 0x00)]);
}

#[test]
fn led_animation_debounce() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));
    let handler = TestHandler::default();

    let mut xinput = XInputClassBuilder::new()
        .request_handler(&handler)
        .build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E)).build();

    // two identical messages back to back fire the callback exactly once
    for _ in 0..2 {
        manager
            .host_write_out(OUT_ENDPOINT, &[0x01, 0x03, 0x06])
            .unwrap();
        assert!(usb_dev.poll(&mut [&mut xinput]));
    }

    assert_eq!(*handler.led.borrow(), [LedPattern::Slot1On]);
    assert_eq!(xinput.led_pattern(), LedPattern::Slot1On);

    // a different animation fires again
    manager
        .host_write_out(OUT_ENDPOINT, &[0x01, 0x03, 0x0A])
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));
    assert_eq!(
        *handler.led.borrow(),
        [LedPattern::Slot1On, LedPattern::Rotating]
    );

    // reset clears the stored animation, the next message fires once more
    xinput.reset();
    assert_eq!(xinput.led_pattern(), LedPattern::Off);
    manager
        .host_write_out(OUT_ENDPOINT, &[0x01, 0x03, 0x06])
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));
    assert_eq!(
        *handler.led.borrow(),
        [LedPattern::Slot1On, LedPattern::Rotating, LedPattern::Slot1On]
    );
}

#[test]
fn malformed_output_ignored() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));
    let handler = TestHandler::default();

    let mut xinput = XInputClassBuilder::new()
        .request_handler(&handler)
        .build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E)).build();

    // truncated rumble message, wrong header, unknown led code
    for message in [
        &[0x00_u8, 0x08, 0x00, 0x80][..],
        &[0x07, 0x03, 0x06][..],
        &[0x01, 0x03, 0x0F][..],
    ] {
        manager.host_write_out(OUT_ENDPOINT, message).unwrap();
        assert!(usb_dev.poll(&mut [&mut xinput]));
    }

    assert!(handler.rumble.borrow().is_empty());
    assert!(handler.led.borrow().is_empty());
}

#[test]
fn rumble_capability_query() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

    let mut xinput = XInputClassBuilder::new()
        .rumble_capabilities(RumbleCapabilities {
            left: 0xC0,
            right: 0x30,
        })
        .build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E)).build();

    manager
        .host_write_setup(&vendor_request(Recipient::Interface, 0x0000, 8))
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));

    assert_eq!(
        manager.host_read_in(),
        [0x00, 0x08, 0x00, 0xC0, 0x30, 0x00, 0x00, 0x00]
    );
}

#[test]
fn input_capability_query() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

    let mut xinput = XInputClassBuilder::new().build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E))
        .max_packet_size_0(64)
        .build();

    manager
        .host_write_setup(&vendor_request(Recipient::Interface, 0x0100, 20))
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));

    let expected = XInputControls::all_controls().as_report().unwrap();
    assert_eq!(manager.host_read_in(), expected);
}

#[test]
fn vendor_request_serial_and_rumble_share_wvalue() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

    let mut xinput = XInputClassBuilder::new()
        .serial_number(SERIAL)
        .build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E))
        .max_packet_size_0(64)
        .build();

    // wValue 0x0000 with an interface recipient is the rumble capability
    // query
    manager
        .host_write_setup(&vendor_request(Recipient::Interface, 0x0000, 8))
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));
    assert_eq!(
        manager.host_read_in(),
        [0x00, 0x08, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00]
    );

    // the same wValue with a device recipient is the serial number, raw
    // bytes with no terminator
    manager
        .host_write_setup(&vendor_request(
            Recipient::Device,
            0x0000,
            SERIAL.len() as u16,
        ))
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));
    assert_eq!(manager.host_read_in(), SERIAL.as_bytes());
}

#[test]
fn unknown_vendor_request_not_answered() {
    init_logging();

    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));

    let mut xinput = XInputClassBuilder::new().serial_number(SERIAL).build(&usb_alloc);

    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E)).build();

    // wValue out of range for the interface recipient
    manager
        .host_write_setup(&vendor_request(Recipient::Interface, 0x0200, 8))
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));
    assert!(manager.host_read_in().is_empty());

    // serial query without a configured serial stalls too
    let manager = UsbTestManager::default();
    let usb_alloc = UsbBusAllocator::new(TestUsbBus::new(&manager));
    let mut xinput = XInputClassBuilder::new().build(&usb_alloc);
    let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E)).build();

    manager
        .host_write_setup(&vendor_request(Recipient::Device, 0x0000, 16))
        .unwrap();
    assert!(usb_dev.poll(&mut [&mut xinput]));
    assert!(manager.host_read_in().is_empty());
}
