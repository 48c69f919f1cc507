// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The endpoint 0 control engine.
//!
//! Event flow, once connected:
//!
//! - The host sends SETUP. The core drops the 8 data bytes (plus CRC) into the
//!   OUT FIFO, sets both response codes to NAK, and raises an OUT packet
//!   event. `handle_interrupt` drains the FIFO, resets any reply in progress,
//!   and hands the packet to the dispatcher.
//!
//! - The dispatcher either STALLs both directions, arms a zero-length status
//!   packet, or starts a reply. Starting a reply queues its first packet right
//!   away and sets IN to ACK.
//!
//! - Each time the host collects an IN packet, the core raises an IN packet
//!   event. The handler NAKs IN and queues the next packet, until the reply
//!   (and its terminating zero-length packet, if needed) has been sent.
//!
//! All state lives in [`Ep0`], which the caller owns. Nothing here spins
//! forever: waits on the hardware are bounded by `Config::spin_limit`, and
//! draining the OUT FIFO by a small multiple of its depth.

use log::{debug, error, trace, warn};
use num_traits::FromPrimitive;

use crate::config::Config;
use crate::descriptors::{DescriptorTable, WEBUSB_LANDING_PAGE_INDEX};
use crate::error::{Error, Result};
use crate::hw::{Ep0Hardware, Events, Response, Token};
use crate::transfer::{TransferState, TxData};
use crate::usb::{request_key, request_type, UsbDir, UsbSetupPacket, UsbSetupRequest};
use crate::{MAX_PACKET_SIZE, OUT_BUFFER_LEN};

// Dispatch keys, `request << 8 | request_type`.
const SET_ADDRESS: u16 = request_key(UsbSetupRequest::SetAddress as u8, request_type::DEVICE_OUT);
const SET_INTERFACE: u16 = request_key(UsbSetupRequest::SetInterface as u8, request_type::INTERFACE_OUT);
const SET_CONFIGURATION: u16 = request_key(UsbSetupRequest::SetConfiguration as u8, request_type::DEVICE_OUT);
const GET_CONFIGURATION: u16 = request_key(UsbSetupRequest::GetConfiguration as u8, request_type::DEVICE_IN);
const GET_STATUS_DEVICE: u16 = request_key(UsbSetupRequest::GetStatus as u8, request_type::DEVICE_IN);
const GET_STATUS_ENDPOINT: u16 = request_key(UsbSetupRequest::GetStatus as u8, request_type::ENDPOINT_IN);
const CLEAR_FEATURE_ENDPOINT: u16 = request_key(UsbSetupRequest::ClearFeature as u8, request_type::ENDPOINT_OUT);
const SET_FEATURE_ENDPOINT: u16 = request_key(UsbSetupRequest::SetFeature as u8, request_type::ENDPOINT_OUT);
const GET_DESCRIPTOR_DEVICE: u16 = request_key(UsbSetupRequest::GetDescriptor as u8, request_type::DEVICE_IN);
const GET_DESCRIPTOR_INTERFACE: u16 = request_key(UsbSetupRequest::GetDescriptor as u8, request_type::INTERFACE_IN);

/// Most bytes `drain_out` will pull from the OUT FIFO before deciding the
/// hardware is stuck. Well past anything the FIFO can actually hold.
const OUT_DRAIN_LIMIT: usize = 4 * OUT_BUFFER_LEN;

/// `wIndex` of the Microsoft extended compat ID request.
const MS_COMPAT_ID_INDEX: u16 = 0x0004;
/// `wIndex` of the WebUSB GET_URL request.
const WEBUSB_GET_URL: u16 = 0x0002;

/// What the dispatcher decided to do about a SETUP.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Action {
    /// Accept with a zero-length status packet.
    Status,
    /// Send up to `len` bytes of `data`, further limited by `wLength`.
    Reply(TxData, usize),
    Stall,
}

/// Endpoint 0 of a USB device, with everything it needs to answer control
/// requests.
pub struct Ep0<H> {
    hw: H,
    descriptors: &'static DescriptorTable,
    config: Config,
    transfer: TransferState,
    /// Configuration selected by SET_CONFIGURATION; 0 is unconfigured.
    configuration: u8,
}

impl<H: Ep0Hardware> Ep0<H> {
    pub fn new(hw: H, descriptors: &'static DescriptorTable, config: Config) -> Self {
        Self {
            hw,
            descriptors,
            config,
            transfer: TransferState::new(),
            configuration: 0,
        }
    }

    pub fn hardware(&self) -> &H {
        &self.hw
    }

    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hw
    }

    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    pub fn transfer(&self) -> &TransferState {
        &self.transfer
    }

    ////////////////////////////////////////////////////////////////////////
    // Lifecycle.

    /// Power-on state: stay off the bus until `connect`.
    pub fn init(&mut self) {
        self.hw.set_pullup(false);
    }

    /// Stops responding without leaving the bus.
    pub fn idle(&mut self) {
        self.hw.enable_events(UsbDir::Out, Events::empty());
        self.hw.enable_events(UsbDir::In, Events::empty());

        // Reject all incoming data, since there is no handler anymore.
        self.hw.set_response(UsbDir::Out, Response::Nak);
        // Reject outgoing data, since we don't have any to give.
        self.hw.set_response(UsbDir::In, Response::Nak);

        self.hw.set_interrupt_enabled(false);
    }

    /// Presents the device to the host and starts handling requests.
    pub fn connect(&mut self) {
        for dir in [UsbDir::Out, UsbDir::In] {
            let stale = self.hw.pending_events(dir);
            self.hw.clear_events(dir, stale);
            self.hw.enable_events(dir, Events::PACKET | Events::ERROR);
        }

        // The host will enumerate us from scratch.
        self.transfer.reset();
        self.configuration = 0;

        // Accept incoming data by default.
        self.hw.set_response(UsbDir::Out, Response::Ack);
        // Reject outgoing data, since we have none to give yet.
        self.hw.set_response(UsbDir::In, Response::Nak);

        self.hw.set_pullup(true);
        self.hw.set_interrupt_enabled(true);
        debug!("USB connected");
    }

    /// Like `idle`, but also drops the pull-up so the host sees the device go
    /// away.
    pub fn disconnect(&mut self) {
        self.idle();
        self.hw.set_pullup(false);
        debug!("USB disconnected");
    }

    ////////////////////////////////////////////////////////////////////////
    // Interrupt handling.

    /// Services the USB interrupt. Call once each time it's asserted.
    ///
    /// Errors are hardware faults; the caller should `idle` the device.
    pub fn handle_interrupt(&mut self) -> Result<()> {
        let out_pending = self.hw.pending_events(UsbDir::Out);
        let in_pending = self.hw.pending_events(UsbDir::In);
        let mut result = Ok(());
        let mut got_setup = false;

        // We got an OUT or a SETUP packet.
        if !out_pending.is_empty() {
            if out_pending.contains(Events::ERROR) {
                warn!("EP0 OUT error event");
            }
            let token = self.hw.last_token();

            let mut obuf = [0; OUT_BUFFER_LEN];
            match self.drain_out(&mut obuf) {
                Ok(Some(mut len)) => {
                    // Strip off CRC16.
                    if len >= 2 {
                        len -= 2;
                    }
                    trace!("EP0 {:?}, {} bytes", token, len);
                    if token == Token::Setup {
                        got_setup = true;
                        // Control replies always start on DATA1.
                        self.hw.set_data_toggle(true);
                        self.transfer.reset();
                        result = self.setup(&obuf[..len]);
                    }
                }
                Ok(None) => {
                    warn!("EP0 OUT packet overflowed {} byte buffer", OUT_BUFFER_LEN);
                    self.stall();
                }
                Err(e) => result = Err(e),
            }

            self.hw.clear_events(UsbDir::Out, out_pending);
            // A STALL holds until the next SETUP.
            if !self.stalled() {
                self.hw.set_response(UsbDir::Out, Response::Ack);
            }
        }

        // The host collected a packet from us.
        if !in_pending.is_empty() {
            if in_pending.contains(Events::ERROR) {
                warn!("EP0 IN error event");
            }
            if got_setup {
                // Whatever this completed belongs to the transfer the SETUP
                // just replaced, and a new reply may already be armed.
                self.hw.clear_events(UsbDir::In, in_pending);
            } else {
                // Stop offering stale data, then queue the next packet, if any.
                self.hw.set_response(UsbDir::In, Response::Nak);
                self.hw.clear_events(UsbDir::In, in_pending);
                let tx = self.process_tx();
                result = result.and(tx);
            }
        }

        result
    }

    /// Reads the OUT FIFO dry into `buf`, returning the byte count, or `None`
    /// if more arrived than `buf` can hold. Excess bytes are still consumed
    /// so the FIFO ends up empty either way.
    fn drain_out(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        let mut len = 0;
        let mut overflow = false;
        let mut reads = 0;
        while let Some(byte) = self.hw.try_read() {
            match buf.get_mut(len) {
                Some(slot) => {
                    *slot = byte;
                    len += 1;
                }
                None => overflow = true,
            }
            reads += 1;
            if reads > OUT_DRAIN_LIMIT {
                error!("EP0 OUT FIFO never ran dry");
                return Err(Error::Timeout("OUT FIFO to drain"));
            }
        }
        Ok(if overflow { None } else { Some(len) })
    }

    fn stalled(&self) -> bool {
        self.hw.response(UsbDir::Out) == Response::Stall
    }

    ////////////////////////////////////////////////////////////////////////
    // Transmit path.

    /// Queues the next packet of the current reply, if the hardware is ready
    /// for it. Safe to call at any time; does nothing if there is no reply,
    /// or if a packet is already waiting for the host.
    pub fn process_tx(&mut self) -> Result<()> {
        // Don't allow requeueing -- only queue more data if we're currently
        // set up to respond NAK.
        if self.hw.response(UsbDir::In) != Response::Nak {
            return Ok(());
        }
        // Prevent us from double-filling the buffer.
        if !self.hw.is_empty(UsbDir::In) {
            return Ok(());
        }
        if !self.transfer.in_flight() {
            return Ok(());
        }

        let Some(chunk) = self.transfer.next_chunk(MAX_PACKET_SIZE) else {
            trace!("EP0 IN transfer complete");
            return Ok(());
        };
        trace!("EP0 IN queueing {} bytes", chunk.len());
        let hw = &mut self.hw;
        let queued = chunk.iter().all(|&byte| hw.try_write(byte));
        if !queued {
            error!("EP0 IN FIFO refused a byte");
            self.transfer.reset();
            return Err(Error::InFifoFull);
        }
        self.hw.set_response(UsbDir::In, Response::Ack);
        Ok(())
    }

    /// Starts sending the first `len` bytes of `data` and queues the first
    /// packet. The rest goes out as the host collects each packet.
    pub fn send(&mut self, data: TxData, len: usize) -> Result<()> {
        // Only `handle_interrupt` drains a transfer, and it's not running
        // while we are, so waiting here would wait forever.
        if self.transfer.in_flight() {
            return Err(Error::TransferInFlight);
        }
        self.transfer.start(data, len);
        self.process_tx()
    }

    /// Arms a zero-length status packet.
    fn ack_status(&mut self) -> Result<()> {
        self.spin_while("IN to leave ACK", |hw| hw.response(UsbDir::In) == Response::Ack)?;
        self.hw.set_response(UsbDir::In, Response::Ack);
        Ok(())
    }

    /// STALLs both directions until the next SETUP.
    fn stall(&mut self) {
        self.hw.set_response(UsbDir::Out, Response::Stall);
        self.hw.set_response(UsbDir::In, Response::Stall);
    }

    /// Polls until `busy` returns false, giving up after `spin_limit` polls.
    fn spin_while(&self, what: &'static str, busy: impl Fn(&H) -> bool) -> Result<()> {
        let mut spins = 0;
        while busy(&self.hw) {
            if spins == self.config.spin_limit {
                error!("EP0 gave up waiting for {}", what);
                return Err(Error::Timeout(what));
            }
            spins += 1;
            core::hint::spin_loop();
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////
    // Control requests.

    fn setup(&mut self, payload: &[u8]) -> Result<()> {
        let Some(setup) = UsbSetupPacket::parse(payload) else {
            warn!("EP0 SETUP with {} bytes", payload.len());
            self.stall();
            return Ok(());
        };
        debug!(
            "SETUP {:?} type={:#04x} req={:#04x} value={:#06x} index={:#06x} length={}",
            UsbSetupRequest::from_u8(setup.request),
            setup.request_type,
            setup.request,
            setup.value.get(),
            setup.index.get(),
            setup.length.get(),
        );

        match self.dispatch(setup) {
            Action::Status => self.ack_status(),
            Action::Reply(data, len) => {
                // Never send more than the host asked for.
                let len = len.min(usize::from(setup.length.get()));
                if len == 0 {
                    self.ack_status()
                } else {
                    self.send(data, len)
                }
            }
            Action::Stall => {
                debug!("STALL");
                self.stall();
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, setup: &UsbSetupPacket) -> Action {
        let value = setup.value.get();
        let index = setup.index.get();

        match setup.request_and_type() {
            // The core latches the new address by itself, and we have only
            // one interface setting.
            SET_ADDRESS | SET_INTERFACE => Action::Status,

            SET_CONFIGURATION => {
                self.configuration = value as u8;
                Action::Status
            }
            GET_CONFIGURATION => Action::Reply(TxData::inline(&[self.configuration]), 1),

            GET_STATUS_DEVICE => Action::Reply(TxData::inline(&[0, 0]), 2),
            // Only endpoint 0 exists.
            GET_STATUS_ENDPOINT if index > 0 => Action::Stall,
            GET_STATUS_ENDPOINT => Action::Reply(TxData::inline(&[0, 0]), 2),

            // The only endpoint feature is HALT, which EP0 doesn't track.
            CLEAR_FEATURE_ENDPOINT | SET_FEATURE_ENDPOINT if index > 0 || value != 0 => Action::Stall,
            CLEAR_FEATURE_ENDPOINT | SET_FEATURE_ENDPOINT => Action::Status,

            GET_DESCRIPTOR_DEVICE | GET_DESCRIPTOR_INTERFACE => match self.descriptors.get(value) {
                Some(d) => Action::Reply(TxData::Static(d), d.len()),
                None => Action::Stall,
            },

            _ => self.dispatch_vendor(setup),
        }
    }

    fn dispatch_vendor(&self, setup: &UsbSetupPacket) -> Action {
        let table = self.descriptors;
        let value = setup.value.get();
        let index = setup.index.get();

        let vendor_in = matches!(
            setup.request_type,
            request_type::VENDOR_DEVICE_IN | request_type::VENDOR_INTERFACE_IN
        );
        if !vendor_in {
            return Action::Stall;
        }

        if setup.request == table.ms_vendor_code {
            if index == MS_COMPAT_ID_INDEX {
                let d = table.compat_id();
                return Action::Reply(TxData::Static(d), d.len());
            }
        } else if setup.request == table.webusb_vendor_code
            && setup.request_type == request_type::VENDOR_DEVICE_IN
        {
            if let (WEBUSB_GET_URL, Some(url)) = (index, table.landing_page) {
                if value == u16::from(WEBUSB_LANDING_PAGE_INDEX) {
                    return Action::Reply(TxData::Static(url), url.len());
                }
            }
        }
        Action::Stall
    }
}
