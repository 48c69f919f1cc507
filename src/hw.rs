// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The endpoint-0 FIFO peripheral, as seen by the control engine.
//!
//! The epfifo USB block exposes each direction of endpoint 0 as a handful of
//! narrow CSRs: a one-byte FIFO head, an "empty" flag, a two-bit response
//! code, a pending/enable event pair, and (for OUT) the type of the last
//! token. Everything the engine does goes through [`Ep0Hardware`], so the
//! protocol logic can run against the real registers ([`CsrEp0`]) or a
//! software model in tests.

use core::ptr;

use bitflags::bitflags;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::usb::UsbDir;

/// Handshake the hardware gives the host on the next token for a direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Response {
    Ack = 0b00,
    Nak = 0b01,
    None = 0b10,
    Stall = 0b11,
}

/// Type of the last token received. The core only reports PID bits 2 and 3,
/// since the rest are redundant by the time it gets here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum Token {
    Out = 0,
    Sof = 1,
    In = 2,
    Setup = 3,
}

bitflags! {
    /// Event sources per direction, as laid out in `ev_pending`/`ev_enable`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Events: u8 {
        const ERROR = 1 << 0;
        const PACKET = 1 << 1;
    }
}

/// Access to endpoint 0 of the USB block.
pub trait Ep0Hardware {
    /// Events currently pending for `dir`.
    fn pending_events(&self, dir: UsbDir) -> Events;
    /// Clears (write-1-to-clear) the given pending events.
    fn clear_events(&mut self, dir: UsbDir, events: Events);
    /// Replaces the set of events that raise the USB interrupt.
    fn enable_events(&mut self, dir: UsbDir, events: Events);

    fn response(&self, dir: UsbDir) -> Response;
    fn set_response(&mut self, dir: UsbDir, response: Response);

    /// Type of the last token seen on the OUT side.
    fn last_token(&self) -> Token;

    /// Pops one byte off the OUT FIFO, acknowledging it to the hardware.
    fn try_read(&mut self) -> Option<u8>;
    /// Whether the FIFO for `dir` holds no bytes.
    fn is_empty(&self, dir: UsbDir) -> bool;
    /// Pushes one byte onto the IN FIFO. Returns `false` if it was refused.
    fn try_write(&mut self, byte: u8) -> bool;

    /// Forces the data toggle used for the next IN packet.
    fn set_data_toggle(&mut self, data1: bool);
    fn set_pullup(&mut self, enabled: bool);
    /// Masks or unmasks the USB interrupt line.
    fn set_interrupt_enabled(&mut self, enabled: bool);
}

/// An interrupt controller line that can be masked and unmasked.
pub trait InterruptLine {
    fn set_enabled(&mut self, enabled: bool);
}

/// CSR offsets within the USB block, for a LiteX build with 32-bit CSR data
/// width. Each register occupies one word.
mod csr {
    pub const PULLUP_OUT: usize = 0x00;

    /// Per-direction register block; OUT comes first, IN follows.
    pub const EP_BLOCK: [usize; 2] = [0x04, 0x24];

    // `ev_status` sits at 0x00 and is never read.
    pub const EV_PENDING: usize = 0x04;
    pub const EV_ENABLE: usize = 0x08;
    pub const LAST_TOK: usize = 0x0c;
    pub const RESPOND: usize = 0x10;
    pub const DTB: usize = 0x14;
    /// `obuf_head` for OUT, `ibuf_head` for IN.
    pub const HEAD: usize = 0x18;
    /// `obuf_empty` for OUT, `ibuf_empty` for IN.
    pub const EMPTY: usize = 0x1c;

    /// Size of the whole block, in bytes.
    pub const SIZE: usize = 0x44;
}

/// Endpoint 0 of an epfifo USB block, driven through its CSRs.
pub struct CsrEp0<I> {
    base: *mut u32,
    irq: I,
}

impl<I: InterruptLine> CsrEp0<I> {
    /// Size of the register window starting at the base address.
    pub const WINDOW: usize = csr::SIZE;

    /// # Safety
    ///
    /// `base` must point at the USB block's CSRs (a valid, aligned window of
    /// `WINDOW` bytes), and nothing else may access them while this value
    /// exists.
    pub unsafe fn new(base: usize, irq: I) -> Self {
        Self {
            base: base as *mut u32,
            irq,
        }
    }

    fn reg(&self, offset: usize) -> *mut u32 {
        // Offsets are compile-time constants within the window promised to
        // `new`.
        (self.base as *mut u8).wrapping_add(offset) as *mut u32
    }

    fn ep_reg(&self, dir: UsbDir, offset: usize) -> *mut u32 {
        self.reg(csr::EP_BLOCK[dir.index()] + offset)
    }

    fn read(&self, reg: *mut u32) -> u32 {
        // Safety: `reg` lies inside the window handed to `new`.
        unsafe { ptr::read_volatile(reg) }
    }

    fn write(&mut self, reg: *mut u32, value: u32) {
        // Safety: as for `read`.
        unsafe { ptr::write_volatile(reg, value) }
    }
}

impl<I: InterruptLine> Ep0Hardware for CsrEp0<I> {
    fn pending_events(&self, dir: UsbDir) -> Events {
        Events::from_bits_truncate(self.read(self.ep_reg(dir, csr::EV_PENDING)) as u8)
    }

    fn clear_events(&mut self, dir: UsbDir, events: Events) {
        let reg = self.ep_reg(dir, csr::EV_PENDING);
        self.write(reg, u32::from(events.bits()));
    }

    fn enable_events(&mut self, dir: UsbDir, events: Events) {
        let reg = self.ep_reg(dir, csr::EV_ENABLE);
        self.write(reg, u32::from(events.bits()));
    }

    fn response(&self, dir: UsbDir) -> Response {
        let raw = self.read(self.ep_reg(dir, csr::RESPOND)) as u8 & 0b11;
        // All four 2-bit values are defined.
        Response::from_u8(raw).unwrap_or(Response::None)
    }

    fn set_response(&mut self, dir: UsbDir, response: Response) {
        let reg = self.ep_reg(dir, csr::RESPOND);
        self.write(reg, response as u32);
    }

    fn last_token(&self) -> Token {
        let raw = self.read(self.ep_reg(UsbDir::Out, csr::LAST_TOK)) as u8 & 0b11;
        Token::from_u8(raw).unwrap_or(Token::Out)
    }

    fn try_read(&mut self) -> Option<u8> {
        if self.is_empty(UsbDir::Out) {
            return None;
        }
        let head = self.ep_reg(UsbDir::Out, csr::HEAD);
        let byte = self.read(head) as u8;
        // Any write to the head advances the FIFO.
        self.write(head, 0);
        Some(byte)
    }

    fn is_empty(&self, dir: UsbDir) -> bool {
        self.read(self.ep_reg(dir, csr::EMPTY)) & 1 != 0
    }

    fn try_write(&mut self, byte: u8) -> bool {
        // The IN FIFO is 512 bytes deep, far more than one packet, and has no
        // full flag to check.
        let head = self.ep_reg(UsbDir::In, csr::HEAD);
        self.write(head, u32::from(byte));
        true
    }

    fn set_data_toggle(&mut self, data1: bool) {
        let reg = self.ep_reg(UsbDir::In, csr::DTB);
        self.write(reg, u32::from(data1));
    }

    fn set_pullup(&mut self, enabled: bool) {
        let reg = self.reg(csr::PULLUP_OUT);
        self.write(reg, u32::from(enabled));
    }

    fn set_interrupt_enabled(&mut self, enabled: bool) {
        self.irq.set_enabled(enabled);
    }
}
