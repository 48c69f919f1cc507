// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A software model of the epfifo block's endpoint 0, plus a scripted host.
//!
//! The model follows the gateware closely enough to exercise the control
//! engine: the host side only talks to the device when the relevant response
//! code allows it, a packet event forces NAK until it's cleared, and a SETUP
//! resets both directions to NAK.

use std::collections::VecDeque;

use crate::ep0::Ep0;
use crate::error::Result;
use crate::hw::{Ep0Hardware, Events, Response, Token};
use crate::usb::UsbDir;

/// Stand-in for the CRC16 trailer the core leaves at the end of each OUT
/// packet. The firmware strips it without checking.
const CRC: [u8; 2] = [0xde, 0xad];

/// What the host saw in response to a token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handshake {
    /// A data packet (IN), possibly empty.
    Data(Vec<u8>),
    /// The device accepted our data (OUT).
    Ack,
    Nak,
    Stall,
    /// The device didn't answer at all.
    Silence,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimEp0 {
    out_fifo: VecDeque<u8>,
    in_fifo: VecDeque<u8>,
    respond: [Response; 2],
    pending: [Events; 2],
    enabled: [Events; 2],
    last_tok: Token,
    /// Data toggle the next IN packet will carry; `true` is DATA1.
    pub data1: bool,
    pub pullup: bool,
    pub irq_enabled: bool,
    /// Makes the IN response stick at ACK, as if the core had locked up.
    pub wedged: bool,
    /// Makes the IN FIFO refuse every byte.
    pub in_fifo_full: bool,
}

impl SimEp0 {
    pub fn new() -> Self {
        Self {
            out_fifo: VecDeque::new(),
            in_fifo: VecDeque::new(),
            respond: [Response::Nak; 2],
            pending: [Events::empty(); 2],
            enabled: [Events::empty(); 2],
            last_tok: Token::Out,
            data1: false,
            pullup: false,
            irq_enabled: false,
            wedged: false,
            in_fifo_full: false,
        }
    }

    /// The response the core will actually give: a pending packet event
    /// turns ACK into NAK.
    fn effective(&self, dir: UsbDir) -> Response {
        let r = self.response(dir);
        if r == Response::Ack && self.pending[dir.index()].contains(Events::PACKET) {
            Response::Nak
        } else {
            r
        }
    }

    /// Whether the USB interrupt would currently fire.
    pub fn irq_asserted(&self) -> bool {
        self.irq_enabled
            && (0..2).any(|i| self.pending[i].intersects(self.enabled[i]))
    }

    pub fn enabled(&self, dir: UsbDir) -> Events {
        self.enabled[dir.index()]
    }

    /// Raw bytes waiting in the OUT FIFO, CRC included.
    pub fn out_fifo_len(&self) -> usize {
        self.out_fifo.len()
    }

    /// Pushes raw bytes into the OUT FIFO as if a packet had arrived, without
    /// touching anything else.
    pub fn inject_out(&mut self, token: Token, bytes: &[u8]) {
        self.out_fifo.extend(bytes);
        self.last_tok = token;
        self.pending[UsbDir::Out.index()] |= Events::PACKET;
    }

    /// Flags a bus error on `dir`, as the core does for a bad CRC or bit
    /// stuffing violation.
    pub fn raise_error(&mut self, dir: UsbDir) {
        self.pending[dir.index()] |= Events::ERROR;
    }

    /// Host sends SETUP followed by an 8-byte DATA0 packet. Devices can't
    /// refuse a SETUP.
    pub fn host_setup(&mut self, packet: [u8; 8]) {
        self.respond = [Response::Nak; 2];
        self.in_fifo.clear();
        self.out_fifo.extend(packet);
        self.out_fifo.extend(CRC);
        self.last_tok = Token::Setup;
        self.pending[UsbDir::Out.index()] |= Events::PACKET;
    }

    pub fn host_in(&mut self) -> Handshake {
        match self.effective(UsbDir::In) {
            Response::Ack => {
                let data = self.in_fifo.drain(..).collect();
                self.data1 = !self.data1;
                self.pending[UsbDir::In.index()] |= Events::PACKET;
                Handshake::Data(data)
            }
            Response::Nak => Handshake::Nak,
            Response::Stall => Handshake::Stall,
            Response::None => Handshake::Silence,
        }
    }

    pub fn host_out(&mut self, data: &[u8]) -> Handshake {
        match self.effective(UsbDir::Out) {
            Response::Ack => {
                self.out_fifo.extend(data);
                self.out_fifo.extend(CRC);
                self.last_tok = Token::Out;
                self.pending[UsbDir::Out.index()] |= Events::PACKET;
                Handshake::Ack
            }
            Response::Nak => Handshake::Nak,
            Response::Stall => Handshake::Stall,
            Response::None => Handshake::Silence,
        }
    }
}

impl Ep0Hardware for SimEp0 {
    fn pending_events(&self, dir: UsbDir) -> Events {
        self.pending[dir.index()]
    }

    fn clear_events(&mut self, dir: UsbDir, events: Events) {
        self.pending[dir.index()].remove(events);
    }

    fn enable_events(&mut self, dir: UsbDir, events: Events) {
        self.enabled[dir.index()] = events;
    }

    fn response(&self, dir: UsbDir) -> Response {
        if self.wedged && dir == UsbDir::In {
            Response::Ack
        } else {
            self.respond[dir.index()]
        }
    }

    fn set_response(&mut self, dir: UsbDir, response: Response) {
        self.respond[dir.index()] = response;
    }

    fn last_token(&self) -> Token {
        self.last_tok
    }

    fn try_read(&mut self) -> Option<u8> {
        self.out_fifo.pop_front()
    }

    fn is_empty(&self, dir: UsbDir) -> bool {
        match dir {
            UsbDir::Out => self.out_fifo.is_empty(),
            UsbDir::In => self.in_fifo.is_empty(),
        }
    }

    fn try_write(&mut self, byte: u8) -> bool {
        if self.in_fifo_full {
            return false;
        }
        self.in_fifo.push_back(byte);
        true
    }

    fn set_data_toggle(&mut self, data1: bool) {
        self.data1 = data1;
    }

    fn set_pullup(&mut self, enabled: bool) {
        self.pullup = enabled;
    }

    fn set_interrupt_enabled(&mut self, enabled: bool) {
        self.irq_enabled = enabled;
    }
}

/// Runs the interrupt handler if the simulated interrupt line is asserted.
pub fn service(ep0: &mut Ep0<SimEp0>) -> Result<()> {
    if ep0.hardware().irq_asserted() {
        ep0.handle_interrupt()
    } else {
        Ok(())
    }
}

/// Result of a scripted control read.
#[derive(Debug, PartialEq, Eq)]
pub struct ControlRead {
    /// Every DATA packet received during the data and status stages.
    pub packets: Vec<Vec<u8>>,
    /// The handshake that ended the IN polling (NAK once the device has
    /// nothing more to say, STALL on rejection).
    pub end: Handshake,
}

impl ControlRead {
    /// All data bytes, concatenated.
    pub fn data(&self) -> Vec<u8> {
        self.packets.concat()
    }
}

/// Plays the host side of a control transfer: SETUP, then IN tokens until the
/// device stops producing data, then an OUT status packet if the device
/// answered.
pub fn control(ep0: &mut Ep0<SimEp0>, setup: [u8; 8]) -> Result<ControlRead> {
    ep0.hardware_mut().host_setup(setup);
    service(ep0)?;

    let mut packets = Vec::new();
    let end = loop {
        assert!(packets.len() < 64, "device never stopped sending");
        match ep0.hardware_mut().host_in() {
            Handshake::Data(d) => {
                packets.push(d);
                service(ep0)?;
            }
            other => break other,
        }
    };

    if end != Handshake::Stall && setup[0] & 0x80 != 0 {
        // Status stage of a control read: zero-length OUT.
        ep0.hardware_mut().host_out(&[]);
        service(ep0)?;
    }

    Ok(ControlRead { packets, end })
}

/// Builds a SETUP packet.
pub fn setup_packet(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let v = value.to_le_bytes();
    let i = index.to_le_bytes();
    let l = length.to_le_bytes();
    [request_type, request, v[0], v[1], i[0], i[1], l[0], l[1]]
}
