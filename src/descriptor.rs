//! Parsing for packed configuration-descriptor streams
//!
//! All descriptors share a common framing: the first byte is the descriptor
//! **length** (including the framing itself), the second the descriptor
//! **type**. [`DescriptorIterator`] walks a packed stream of such descriptors.
//!
//! [`InterfaceBlock`] recognizes the contiguous block a class driver binds to:
//! one interface descriptor, one class-specific descriptor of type `0x21`,
//! then exactly `bNumEndpoints` endpoint descriptors. A stream that ends
//! before the block is complete fails to parse rather than yielding a
//! truncated block.

use heapless::Vec;

pub const DESCRIPTOR_TYPE_CONFIGURATION: u8 = 0x02;
pub const DESCRIPTOR_TYPE_INTERFACE: u8 = 0x04;
pub const DESCRIPTOR_TYPE_ENDPOINT: u8 = 0x05;
/// Class-specific descriptor type shared by HID and XInput interfaces
pub const DESCRIPTOR_TYPE_CLASS_SPECIFIC: u8 = 0x21;

const INTERFACE_DESCRIPTOR_LEN: usize = 9;
const ENDPOINT_DESCRIPTOR_LEN: usize = 7;

/// Endpoints a single interface block may carry
pub const MAX_BLOCK_ENDPOINTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The stream ended before the descriptor or block was complete
    Incomplete,
    /// A descriptor declared a length shorter than its framing
    InvalidLength,
    /// A descriptor of a different type was found where `expected` is required
    UnexpectedDescriptor { expected: u8, found: u8 },
    /// The interface declared more endpoints than [`MAX_BLOCK_ENDPOINTS`]
    TooManyEndpoints,
}

/// Outer framing of a single descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor<'a> {
    pub length: u8,
    pub descriptor_type: u8,
    /// Descriptor body, `length - 2` bytes
    pub data: &'a [u8],
}

impl<'a> Descriptor<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, ParseError> {
        if buf.len() < 2 {
            return Err(ParseError::Incomplete);
        }
        let length = buf[0];
        if length < 2 {
            return Err(ParseError::InvalidLength);
        }
        if usize::from(length) > buf.len() {
            return Err(ParseError::Incomplete);
        }
        Ok(Self {
            length,
            descriptor_type: buf[1],
            data: &buf[2..usize::from(length)],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    pub number: u8,
    pub alternate_setting: u8,
    pub num_endpoints: u8,
    pub class: u8,
    pub sub_class: u8,
    pub protocol: u8,
    pub string_index: u8,
}

impl InterfaceDescriptor {
    fn from_body(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < INTERFACE_DESCRIPTOR_LEN - 2 {
            return Err(ParseError::InvalidLength);
        }
        Ok(Self {
            number: data[0],
            alternate_setting: data[1],
            num_endpoints: data[2],
            class: data[3],
            sub_class: data[4],
            protocol: data[5],
            string_index: data[6],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

impl EndpointDescriptor {
    fn from_body(data: &[u8]) -> Result<Self, ParseError> {
        if data.len() < ENDPOINT_DESCRIPTOR_LEN - 2 {
            return Err(ParseError::InvalidLength);
        }
        Ok(Self {
            address: data[0],
            attributes: data[1],
            max_packet_size: u16::from_le_bytes([data[2], data[3]]),
            interval: data[4],
        })
    }

    /// Direction bit of the endpoint address
    #[must_use]
    pub fn is_in(&self) -> bool {
        self.address & 0x80 != 0
    }
}

/// Iterator over the descriptors of a packed stream
pub struct DescriptorIterator<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> DescriptorIterator<'a> {
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0 }
    }

    fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for DescriptorIterator<'a> {
    type Item = Result<Descriptor<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.buf.len() {
            return None;
        }

        match Descriptor::parse(&self.buf[self.offset..]) {
            Ok(descriptor) => {
                self.offset += usize::from(descriptor.length);
                Some(Ok(descriptor))
            }
            Err(e) => {
                self.offset = self.buf.len();
                Some(Err(e))
            }
        }
    }
}

/// The contiguous descriptor block one interface binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceBlock<'a> {
    pub interface: InterfaceDescriptor,
    /// Body of the class-specific (`0x21`) descriptor, framing stripped
    pub class_descriptor: &'a [u8],
    pub endpoints: Vec<EndpointDescriptor, MAX_BLOCK_ENDPOINTS>,
}

impl<'a> InterfaceBlock<'a> {
    /// Parse a block starting at the interface descriptor at the head of
    /// `buf`. Returns the block and the number of bytes it consumed.
    pub fn parse(buf: &'a [u8]) -> Result<(Self, usize), ParseError> {
        let mut it = DescriptorIterator::new(buf);

        let interface = Self::expect(&mut it, DESCRIPTOR_TYPE_INTERFACE)?;
        let interface = InterfaceDescriptor::from_body(interface.data)?;

        let class_specific = Self::expect(&mut it, DESCRIPTOR_TYPE_CLASS_SPECIFIC)?;

        if usize::from(interface.num_endpoints) > MAX_BLOCK_ENDPOINTS {
            return Err(ParseError::TooManyEndpoints);
        }

        let mut endpoints = Vec::new();
        for _ in 0..interface.num_endpoints {
            let endpoint = Self::expect(&mut it, DESCRIPTOR_TYPE_ENDPOINT)?;
            // capacity checked against num_endpoints above
            endpoints
                .push(EndpointDescriptor::from_body(endpoint.data)?)
                .ok();
        }

        let consumed = it.offset();
        Ok((
            Self {
                interface,
                class_descriptor: class_specific.data,
                endpoints,
            },
            consumed,
        ))
    }

    /// Locate interface `number` inside a full configuration stream and parse
    /// its block
    pub fn find_in_configuration(config: &'a [u8], number: u8) -> Result<Self, ParseError> {
        let mut offset = 0;
        let mut it = DescriptorIterator::new(config);
        loop {
            let start = offset;
            match it.next() {
                Some(Ok(descriptor)) => {
                    offset = it.offset();
                    if descriptor.descriptor_type == DESCRIPTOR_TYPE_INTERFACE
                        && descriptor.data.first() == Some(&number)
                    {
                        return Self::parse(&config[start..]).map(|(block, _)| block);
                    }
                }
                Some(Err(e)) => return Err(e),
                None => return Err(ParseError::Incomplete),
            }
        }
    }

    fn expect(
        it: &mut DescriptorIterator<'a>,
        expected: u8,
    ) -> Result<Descriptor<'a>, ParseError> {
        match it.next() {
            Some(Ok(descriptor)) => {
                if descriptor.descriptor_type == expected {
                    Ok(descriptor)
                } else {
                    Err(ParseError::UnexpectedDescriptor {
                        expected,
                        found: descriptor.descriptor_type,
                    })
                }
            }
            Some(Err(e)) => Err(e),
            None => Err(ParseError::Incomplete),
        }
    }

    /// Interface, class-specific and endpoint descriptors are all that a
    /// block may contain
    #[must_use]
    pub fn expected_length(&self) -> usize {
        INTERFACE_DESCRIPTOR_LEN
            + 2
            + self.class_descriptor.len()
            + self.endpoints.len() * ENDPOINT_DESCRIPTOR_LEN
    }

    /// Addresses of the interrupt endpoint pair, `(in, out)`
    #[must_use]
    pub fn endpoint_pair(&self) -> (Option<u8>, Option<u8>) {
        let ep_in = self.endpoints.iter().find(|e| e.is_in()).map(|e| e.address);
        let ep_out = self
            .endpoints
            .iter()
            .find(|e| !e.is_in())
            .map(|e| e.address);
        (ep_in, ep_out)
    }
}
