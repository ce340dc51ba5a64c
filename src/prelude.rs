//! Prelude to alleviate imports when building devices from the classes in
//! this crate
//!
//! ```
//! # #![allow(unused_imports)]
//! use usbd_xpad::prelude::*;
//! ```

pub use crate::hid_class::descriptor::{HidProtocol, InterfaceProtocol, ReportId};
pub use crate::hid_class::interface::HidRequestHandler;
pub use crate::hid_class::{UsbHidClass, UsbHidClassBuilder, UsbPacketSize};
pub use crate::ms_os::{
    CompatIdDescriptor, ExtendedPropertiesDescriptor, MsOsDescriptors, PropertyDataType,
    COMPAT_ID_WINUSB, COMPAT_ID_XUSB10, OS_STRING_INDEX,
};
pub use crate::xinput_class::report::{
    LedPattern, OutputMessage, RumbleCapabilities, XInputControls,
};
pub use crate::xinput_class::{XInputClass, XInputClassBuilder, XInputRequestHandler};
pub use crate::UsbXpadError;
