#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! In-process [`UsbBus`] for driving the classes from the host side.
//!
//! The control endpoint pair is pinned to endpoint index 0, interrupt
//! endpoints are handed out from index 1, so host-side queues can address
//! endpoints the way the device stack does. IN data is captured per
//! endpoint; consuming it reports the transfer complete on the next poll.

use std::cell::RefCell;
use std::sync::Mutex;
use std::vec::Vec;

use env_logger::Env;
use packed_struct::prelude::*;
use usb_device::bus::PollResult;
use usb_device::class_prelude::*;
use usb_device::{Result, UsbDirection, UsbError};

pub fn init_logging() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("trace"))
        .is_test(true)
        .try_init();
}

const MAX_ENDPOINTS: usize = 8;

#[derive(Default)]
struct BusState {
    setup: Vec<u8>,
    control_out_data: Vec<u8>,
    in_buffers: [Vec<u8>; MAX_ENDPOINTS],
    out_buffers: [Vec<u8>; MAX_ENDPOINTS],
    in_complete: u16,
}

#[derive(Default)]
pub struct UsbTestManager {
    state: Mutex<RefCell<BusState>>,
}

impl UsbTestManager {
    pub fn host_write_setup(&self, data: &[u8]) -> Result<()> {
        let state = self.state.lock().unwrap();
        let mut state = state.borrow_mut();
        if state.setup.is_empty() {
            state.setup.extend_from_slice(data);
            Ok(())
        } else {
            Err(UsbError::WouldBlock)
        }
    }

    /// Queue the DATA stage of a control OUT transfer
    pub fn host_write_control_data(&self, data: &[u8]) -> Result<()> {
        let state = self.state.lock().unwrap();
        let mut state = state.borrow_mut();
        if state.control_out_data.is_empty() {
            state.control_out_data.extend_from_slice(data);
            Ok(())
        } else {
            Err(UsbError::WouldBlock)
        }
    }

    /// Queue a transfer on an interrupt OUT endpoint
    pub fn host_write_out(&self, index: usize, data: &[u8]) -> Result<()> {
        let state = self.state.lock().unwrap();
        let mut state = state.borrow_mut();
        if state.out_buffers[index].is_empty() {
            state.out_buffers[index].extend_from_slice(data);
            Ok(())
        } else {
            Err(UsbError::WouldBlock)
        }
    }

    /// Collect data the device sent on the control IN endpoint
    pub fn host_read_in(&self) -> Vec<u8> {
        self.host_read_endpoint_in(0)
    }

    /// Collect data the device sent on an interrupt IN endpoint
    pub fn host_read_endpoint_in(&self, index: usize) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        let mut state = state.borrow_mut();
        let data = core::mem::take(&mut state.in_buffers[index]);
        if !data.is_empty() {
            state.in_complete |= 1 << index;
        }
        data
    }

    pub fn has_setup_data(&self) -> bool {
        !self.state.lock().unwrap().borrow().setup.is_empty()
    }

    fn device_read(&self, index: usize, data: &mut [u8]) -> Result<usize> {
        let state = self.state.lock().unwrap();
        let mut state = state.borrow_mut();

        let buf = if index == 0 {
            if state.setup.is_empty() {
                &mut state.control_out_data
            } else {
                &mut state.setup
            }
        } else {
            &mut state.out_buffers[index]
        };

        if buf.is_empty() {
            Err(UsbError::WouldBlock)
        } else {
            let tmp = core::mem::take(buf);
            data[..tmp.len()].copy_from_slice(&tmp);
            Ok(tmp.len())
        }
    }

    fn device_write(&self, index: usize, data: &[u8]) -> Result<usize> {
        let state = self.state.lock().unwrap();
        let mut state = state.borrow_mut();
        if state.in_buffers[index].is_empty() {
            state.in_buffers[index].extend_from_slice(data);
            Ok(data.len())
        } else {
            Err(UsbError::WouldBlock)
        }
    }

    fn poll(&self) -> PollResult {
        let state = self.state.lock().unwrap();
        let mut state = state.borrow_mut();

        let ep_setup = u16::from(!state.setup.is_empty());

        let mut ep_out = 0;
        if ep_setup == 0 && !state.control_out_data.is_empty() {
            ep_out |= 1;
        }
        for (i, buf) in state.out_buffers.iter().enumerate().skip(1) {
            if !buf.is_empty() {
                ep_out |= 1 << i;
            }
        }

        let ep_in_complete = core::mem::take(&mut state.in_complete);

        PollResult::Data {
            ep_out,
            ep_in_complete,
            ep_setup,
        }
    }
}

pub struct TestUsbBus<'a> {
    next_ep_index: usize,
    manager: &'a UsbTestManager,
}

impl<'a> TestUsbBus<'a> {
    pub fn new(manager: &'a UsbTestManager) -> Self {
        TestUsbBus {
            // index 0 is reserved for the control endpoint pair
            next_ep_index: 1,
            manager,
        }
    }
}

impl UsbBus for TestUsbBus<'_> {
    fn alloc_ep(
        &mut self,
        ep_dir: UsbDirection,
        _ep_addr: Option<EndpointAddress>,
        ep_type: EndpointType,
        _max_packet_size: u16,
        _interval: u8,
    ) -> Result<EndpointAddress> {
        if ep_type == EndpointType::Control {
            return Ok(EndpointAddress::from_parts(0, ep_dir));
        }

        let ep = EndpointAddress::from_parts(self.next_ep_index, ep_dir);
        self.next_ep_index += 1;
        Ok(ep)
    }

    fn enable(&mut self) {}
    fn reset(&self) {
        todo!()
    }
    fn set_device_address(&self, _addr: u8) {
        todo!()
    }
    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> Result<usize> {
        self.manager.device_write(ep_addr.index(), buf)
    }
    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> Result<usize> {
        self.manager.device_read(ep_addr.index(), buf)
    }
    fn set_stalled(&self, _ep_addr: EndpointAddress, _stalled: bool) {}
    fn is_stalled(&self, _ep_addr: EndpointAddress) -> bool {
        todo!()
    }
    fn suspend(&self) {
        todo!()
    }
    fn resume(&self) {
        todo!()
    }
    fn poll(&self) -> PollResult {
        self.manager.poll()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PackedStruct)]
#[packed_struct(endian = "lsb", bit_numbering = "msb0", size_bytes = "8")]
pub struct UsbRequest {
    #[packed_field(bits = "0")]
    pub direction: bool,
    #[packed_field(bits = "1:2")]
    pub request_type: u8,
    #[packed_field(bits = "4:7")]
    pub recipient: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}
