// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Descriptor table.
//!
//! Every descriptor the device can hand out lives here as static data. A
//! GET_DESCRIPTOR request is answered by looking up its `wValue` (descriptor
//! type in the high byte, index in the low byte) in a [`DescriptorTable`].
//! Typed descriptors are laid out with `zerocopy`; the odd ones (BOS, strings)
//! are byte arrays built at compile time.

use zerocopy::{AsBytes, U16, U32};

use crate::usb::{
    MsCompatIdDescriptor, UsbConfigurationBundle, UsbConfigurationDescriptor,
    UsbDescType, UsbDeviceDescriptor, UsbInterfaceDescriptor,
};

/// Builds the lookup key for a descriptor of type `ty` at `index`.
pub const fn descriptor_key(ty: UsbDescType, index: u8) -> u16 {
    (ty as u16) << 8 | index as u16
}

/// Builds a string descriptor from ASCII text. `N` must be `2 + 2 * len`.
pub const fn string_descriptor<const N: usize>(text: &[u8]) -> [u8; N] {
    assert!(N == 2 + 2 * text.len() && N <= 255);
    let mut out = [0; N];
    out[0] = N as u8;
    out[1] = UsbDescType::String as u8;
    let mut i = 0;
    while i < text.len() {
        // ASCII widens to UTF-16LE with a zero high byte.
        out[2 + 2 * i] = text[i];
        i += 1;
    }
    out
}

/// Builds a WebUSB URL descriptor. `N` must be `3 + url.len()`.
pub const fn url_descriptor<const N: usize>(scheme: UrlScheme, url: &[u8]) -> [u8; N] {
    assert!(N == 3 + url.len() && N <= 255);
    let mut out = [0; N];
    out[0] = N as u8;
    out[1] = WEBUSB_URL_DESCRIPTOR_TYPE;
    out[2] = scheme as u8;
    let mut i = 0;
    while i < url.len() {
        out[3 + i] = url[i];
        i += 1;
    }
    out
}

/// URL prefix implied by a WebUSB URL descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum UrlScheme {
    Http = 0,
    Https = 1,
    /// The URL is used as-is.
    Other = 255,
}

pub const WEBUSB_URL_DESCRIPTOR_TYPE: u8 = 0x03;

/// Arbitrary, but should be printable ASCII.
pub const MS_VENDOR_CODE: u8 = b'~';
/// Vendor code advertised in the WebUSB platform capability.
pub const WEBUSB_VENDOR_CODE: u8 = 0x02;
/// Index of the landing page URL advertised in the WebUSB platform capability.
pub const WEBUSB_LANDING_PAGE_INDEX: u8 = 0x01;

/// A descriptor's contents.
#[derive(Copy, Clone, Debug)]
pub enum DescriptorData {
    Device(&'static UsbDeviceDescriptor),
    Configuration(&'static UsbConfigurationBundle),
    Bytes(&'static [u8]),
}

impl DescriptorData {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            DescriptorData::Device(d) => d.as_bytes(),
            DescriptorData::Configuration(c) => c.as_bytes(),
            DescriptorData::Bytes(b) => b,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct DescriptorEntry {
    pub key: u16,
    pub data: DescriptorData,
}

/// Everything the control engine needs to answer descriptor requests.
#[derive(Debug)]
pub struct DescriptorTable {
    /// GET_DESCRIPTOR entries, keyed by `wValue`.
    pub entries: &'static [DescriptorEntry],
    /// Returned for the Microsoft compat ID vendor request.
    pub compat_id: &'static MsCompatIdDescriptor,
    /// `bRequest` of Microsoft OS vendor requests; must match the code in
    /// the `MSFT100` string descriptor.
    pub ms_vendor_code: u8,
    /// `bRequest` of WebUSB vendor requests; must match the BOS descriptor.
    pub webusb_vendor_code: u8,
    /// WebUSB landing page URL descriptor, if there is one.
    pub landing_page: Option<&'static [u8]>,
}

impl DescriptorTable {
    /// Finds the descriptor for a GET_DESCRIPTOR `wValue`.
    pub fn get(&self, key: u16) -> Option<&'static [u8]> {
        self.entries.iter()
            .find(|e| e.key == key)
            .map(|e| e.data.bytes())
    }

    pub fn compat_id(&self) -> &'static [u8] {
        self.compat_id.as_bytes()
    }
}

////////////////////////////////////////////////////////////////////////////
// The default device: a Fomu bootloader-style updater.

pub static DEVICE_DESCRIPTOR: UsbDeviceDescriptor = UsbDeviceDescriptor {
    length: core::mem::size_of::<UsbDeviceDescriptor>() as u8,
    descriptor_type: UsbDescType::Device,
    bcd_usb: U16::from_bytes(u16::to_le_bytes(0x0200)),
    device_class: 0,
    device_subclass: 0,
    device_protocol: 0,
    max_packet_size0: crate::MAX_PACKET_SIZE as u8,
    vendor: U16::from_bytes(u16::to_le_bytes(0x1209)),
    product: U16::from_bytes(u16::to_le_bytes(0x5bf0)),
    bcd_device: U16::from_bytes(u16::to_le_bytes(0x0101)),
    manufacturer_s: 1,
    product_s: 2,
    serial_s: 0,
    num_configurations: 1,
};

pub static CONFIGURATION: UsbConfigurationBundle = UsbConfigurationBundle {
    config: UsbConfigurationDescriptor {
        length: core::mem::size_of::<UsbConfigurationDescriptor>() as u8,
        descriptor_type: UsbDescType::Config,
        total_length: U16::from_bytes(u16::to_le_bytes(
            core::mem::size_of::<UsbConfigurationBundle>() as u16
        )),
        num_interfaces: 1,
        configuration_value: 1,
        configuration_s: 1,
        // Bus powered.
        attributes: 0x80,
        // 100 mA.
        max_power: 0x32,
    },
    interface: UsbInterfaceDescriptor {
        length: core::mem::size_of::<UsbInterfaceDescriptor>() as u8,
        descriptor_type: UsbDescType::Interface,
        interface_number: 0,
        alternate_setting: 0,
        // Everything happens on EP0.
        num_endpoints: 0,
        // Application specific.
        interface_class: 0xfe,
        interface_subclass: 0,
        interface_protocol: 0,
        interface_s: 2,
    },
};

/// Language ID list: US English only.
pub static LANGUAGES: [u8; 4] = [4, UsbDescType::String as u8, 0x09, 0x04];
pub static MANUFACTURER: [u8; 12] = string_descriptor(b"Foosn");
pub static PRODUCT: [u8; 26] = string_descriptor(b"Fomu Updater");

/// Microsoft OS string descriptor, fetched by Windows at string index 0xEE.
/// The signature is `MSFT100`, followed by the vendor code Windows should use
/// for the follow-up compat ID request.
pub static MS_OS_STRING: [u8; 18] = {
    let signature: [u8; 16] = string_descriptor(b"MSFT100");
    let mut d = [0; 18];
    let mut i = 0;
    while i < signature.len() {
        d[i] = signature[i];
        i += 1;
    }
    d[0] = 18;
    d[16] = MS_VENDOR_CODE;
    d
};

/// BOS descriptor advertising a single WebUSB platform capability.
pub static BOS: [u8; 29] = [
    // BOS header: length, type, total length, number of capabilities.
    0x05, UsbDescType::Bos as u8, 29, 0x00, 0x01,
    // Platform capability: length, type (device capability), platform, reserved.
    0x18, 0x10, 0x05, 0x00,
    // WebUSB platform capability UUID {3408b638-09a9-47a0-8bfd-a0768815b665}.
    0x38, 0xb6, 0x08, 0x34, 0xa9, 0x09, 0xa0, 0x47,
    0x8b, 0xfd, 0xa0, 0x76, 0x88, 0x15, 0xb6, 0x65,
    // WebUSB version 1.0, vendor code, landing page index.
    0x00, 0x01, WEBUSB_VENDOR_CODE, WEBUSB_LANDING_PAGE_INDEX,
];

pub static MS_COMPAT_ID: MsCompatIdDescriptor = MsCompatIdDescriptor {
    length: U32::from_bytes(u32::to_le_bytes(
        core::mem::size_of::<MsCompatIdDescriptor>() as u32
    )),
    bcd_version: U16::from_bytes(u16::to_le_bytes(0x0100)),
    index: U16::from_bytes(u16::to_le_bytes(0x0004)),
    count: 1,
    reserved0: [0; 7],
    first_interface: 0,
    reserved1: 1,
    compatible_id: *b"WINUSB\0\0",
    sub_compatible_id: [0; 8],
    reserved2: [0; 6],
};

pub static ENTRIES: [DescriptorEntry; 7] = [
    DescriptorEntry {
        key: descriptor_key(UsbDescType::Device, 0),
        data: DescriptorData::Device(&DEVICE_DESCRIPTOR),
    },
    DescriptorEntry {
        key: descriptor_key(UsbDescType::Config, 0),
        data: DescriptorData::Configuration(&CONFIGURATION),
    },
    DescriptorEntry {
        key: descriptor_key(UsbDescType::String, 0),
        data: DescriptorData::Bytes(&LANGUAGES),
    },
    DescriptorEntry {
        key: descriptor_key(UsbDescType::String, 1),
        data: DescriptorData::Bytes(&MANUFACTURER),
    },
    DescriptorEntry {
        key: descriptor_key(UsbDescType::String, 2),
        data: DescriptorData::Bytes(&PRODUCT),
    },
    DescriptorEntry {
        key: descriptor_key(UsbDescType::String, 0xee),
        data: DescriptorData::Bytes(&MS_OS_STRING),
    },
    DescriptorEntry {
        key: descriptor_key(UsbDescType::Bos, 0),
        data: DescriptorData::Bytes(&BOS),
    },
];

/// The default device's descriptors. It advertises a landing page in its BOS
/// descriptor but ships without one, so landing page requests STALL.
pub static DEFAULT_TABLE: DescriptorTable = DescriptorTable {
    entries: &ENTRIES,
    compat_id: &MS_COMPAT_ID,
    ms_vendor_code: MS_VENDOR_CODE,
    webusb_vendor_code: WEBUSB_VENDOR_CODE,
    landing_page: None,
};
