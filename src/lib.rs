#![no_std]
#![warn(clippy::pedantic)]
#![warn(clippy::style)]
#![warn(clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::struct_excessive_bools)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::use_self)]

//! XInput gamepad and raw HID class drivers for the [`usb-device`](usb_device)
//! stack, together with the Microsoft OS 1.0 descriptor responder that lets
//! Windows bind its in-box `XUSB10` driver without an INF.
//!
//! ```ignore
//! use usbd_xpad::prelude::*;
//!
//! let usb_alloc = UsbBusAllocator::new(usb_bus);
//!
//! let mut gamepad = XInputClassBuilder::new()
//!     .serial_number("3032363535313838")
//!     .request_handler(&handler)
//!     .build(&usb_alloc);
//!
//! let mut ms_os = MsOsDescriptors::new(0x42)
//!     .with_compat_id(CompatIdDescriptor::new().function(0, COMPAT_ID_XUSB10)?);
//!
//! let mut usb_dev = UsbDeviceBuilder::new(&usb_alloc, UsbVidPid(0x045E, 0x028E))
//!     .manufacturer("usbd-xpad")
//!     .product("Gamepad")
//!     .build();
//!
//! loop {
//!     gamepad.write_report(&controls).ok();
//!     usb_dev.poll(&mut [&mut gamepad, &mut ms_os]);
//! }
//! ```

//Allow the use of std in tests
#[cfg(test)]
extern crate std;

use usb_device::UsbError;

pub mod descriptor;
pub mod hid_class;
pub mod ms_os;
pub mod prelude;
pub mod xinput_class;

#[cfg(test)]
pub(crate) mod test_helpers;

#[derive(Debug)]
pub enum UsbXpadError {
    WouldBlock,
    UsbError(UsbError),
    SerializationError,
}

impl From<UsbError> for UsbXpadError {
    fn from(e: UsbError) -> Self {
        match e {
            UsbError::WouldBlock => Self::WouldBlock,
            _ => Self::UsbError(e),
        }
    }
}
