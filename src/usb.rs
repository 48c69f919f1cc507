// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! USB structure and constant definitions.

use zerocopy::{AsBytes, FromBytes, LayoutVerified, Unaligned, U16, U32};
use byteorder::LittleEndian;
use num_derive::FromPrimitive;

/// USB deals in two different transfer directions, called OUT (host-to-device)
/// and IN (device-to-host). In the vast majority of cases, OUT is represented
/// by a 0 byte, and IN by an `0x80` byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbDir {
    Out = 0,
    In = 0x80,
}

impl UsbDir {
    /// Index of this direction in per-direction arrays (OUT first).
    pub const fn index(self) -> usize {
        match self {
            Self::Out => 0,
            Self::In => 1,
        }
    }
}

/// Layout of an 8-byte USB SETUP packet.
#[repr(C)]
#[derive(Debug, AsBytes, FromBytes, Unaligned)]
pub struct UsbSetupPacket {
    /// Request type: direction in bit 7, type (standard/class/vendor) in bits
    /// 6..5, recipient (device/interface/endpoint) in bits 4..0.
    pub request_type: u8,
    /// Request. Standard setup requests are in the `UsbSetupRequest` enum;
    /// vendor requests use codes advertised in our descriptors.
    pub request: u8,
    /// A simple argument of up to 16 bits, specific to the request.
    pub value: U16<LittleEndian>,
    /// Usually an interface or endpoint number.
    pub index: U16<LittleEndian>,
    /// If data will be transferred after this request (in the direction given
    /// by `request_type`), this gives the number of bytes (OUT) or maximum
    /// number of bytes (IN).
    pub length: U16<LittleEndian>,
}

impl UsbSetupPacket {
    /// Reinterprets a received payload as a setup packet. The payload must be
    /// exactly 8 bytes.
    pub fn parse(bytes: &[u8]) -> Option<&Self> {
        LayoutVerified::<_, Self>::new(bytes).map(|lv| lv.into_ref())
    }

    /// The combined dispatch key, `request << 8 | request_type`.
    pub fn request_and_type(&self) -> u16 {
        u16::from(self.request) << 8 | u16::from(self.request_type)
    }
}

/// The standard USB SETUP requests that we understand.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbSetupRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    /// Notifies the device that it's being moved to a different address on the
    /// bus. Always an OUT. The epfifo core latches the address itself.
    SetAddress = 0x05,
    /// Asks the device to send a certain descriptor back to the host. Always
    /// used on an IN request.
    GetDescriptor = 0x06,
    GetConfiguration = 0x08,
    /// Configures a device by choosing one of the options listed in its
    /// descriptors. Always an OUT.
    SetConfiguration = 0x09,
    SetInterface = 0x0b,
}

/// `bmRequestType` values for the requests we handle.
pub mod request_type {
    pub const DEVICE_OUT: u8 = 0x00;
    pub const INTERFACE_OUT: u8 = 0x01;
    pub const ENDPOINT_OUT: u8 = 0x02;
    pub const DEVICE_IN: u8 = 0x80;
    pub const INTERFACE_IN: u8 = 0x81;
    pub const ENDPOINT_IN: u8 = 0x82;
    pub const VENDOR_DEVICE_IN: u8 = 0xC0;
    pub const VENDOR_INTERFACE_IN: u8 = 0xC1;
}

/// Builds a `request << 8 | request_type` dispatch key.
pub const fn request_key(request: u8, request_type: u8) -> u16 {
    (request as u16) << 8 | request_type as u16
}

/// Describes a device. This is the most broad description in USB and is
/// typically the first thing the host asks for.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbDeviceDescriptor {
    /// Length of this structure, must be 18.
    pub length: u8,
    /// Type of this descriptor, must be `Device`.
    pub descriptor_type: UsbDescType,
    /// Version of the USB protocol, in binary-coded decimal.
    pub bcd_usb: U16<LittleEndian>,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    /// Maximum packet size on endpoint 0.
    pub max_packet_size0: u8,
    pub vendor: U16<LittleEndian>,
    pub product: U16<LittleEndian>,
    /// Device version number, as BCD again.
    pub bcd_device: U16<LittleEndian>,
    /// Index of manufacturer name in string descriptor table.
    pub manufacturer_s: u8,
    /// Index of product name in string descriptor table.
    pub product_s: u8,
    /// Index of serial number in string descriptor table.
    pub serial_s: u8,
    pub num_configurations: u8,
}

/// Description of a single available device configuration.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbConfigurationDescriptor {
    /// Length of this structure, must be 9.
    pub length: u8,
    /// Type of this descriptor, must be `Config`.
    pub descriptor_type: UsbDescType,
    /// Total length of all descriptors in this configuration, concatenated.
    pub total_length: U16<LittleEndian>,
    pub num_interfaces: u8,
    /// Number to use when requesting this configuration via a
    /// `SetConfiguration` request.
    pub configuration_value: u8,
    pub configuration_s: u8,
    /// Bit 7 must be set; bit 6 is self-powered, bit 5 is remote wakeup.
    pub attributes: u8,
    /// Maximum device power consumption in units of 2mA.
    pub max_power: u8,
}

/// Description of an interface within a configuration.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbInterfaceDescriptor {
    /// Length of this structure, must be 9.
    pub length: u8,
    /// Type of this descriptor, must be `Interface`.
    pub descriptor_type: UsbDescType,
    pub interface_number: u8,
    pub alternate_setting: u8,
    /// Number of endpoint descriptors in this interface, not counting EP0.
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_s: u8,
}

/// A configuration descriptor followed by the interface it contains, sent as
/// one blob in response to a configuration descriptor request.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbConfigurationBundle {
    pub config: UsbConfigurationDescriptor,
    pub interface: UsbInterfaceDescriptor,
}

/// Microsoft OS 1.0 extended compat ID descriptor with a single function
/// section. Windows fetches this with a vendor request after reading the
/// `MSFT100` string descriptor.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct MsCompatIdDescriptor {
    /// Length of the whole descriptor, including function sections.
    pub length: U32<LittleEndian>,
    /// Version, `0x0100`.
    pub bcd_version: U16<LittleEndian>,
    /// Feature index, 4 for extended compat ID.
    pub index: U16<LittleEndian>,
    pub count: u8,
    pub reserved0: [u8; 7],
    pub first_interface: u8,
    /// Must be 1.
    pub reserved1: u8,
    pub compatible_id: [u8; 8],
    pub sub_compatible_id: [u8; 8],
    pub reserved2: [u8; 6],
}

/// Types of USB descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, AsBytes)]
#[repr(u8)]
pub enum UsbDescType {
    Device = 0x01,
    Config = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    Bos = 0x0f,
}
