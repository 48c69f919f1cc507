// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! USB device-side endpoint 0 for the LiteX epfifo core.
//!
//! The epfifo core does very little by itself: it shifts bytes between the
//! bus and two small FIFOs, and answers each token with whatever handshake
//! software last wrote into the endpoint's response register. Everything else
//! (decoding SETUP packets, splitting replies into packets, ending replies
//! with a zero-length packet, STALLing what we don't understand) is up to us.
//!
//! - [`hw`] is the register interface, behind the [`Ep0Hardware`] trait.
//! - [`transfer`] tracks the reply being sent on EP0 IN.
//! - [`descriptors`] holds the descriptor table.
//! - [`ep0`] ties them together: lifecycle, interrupt handling, and control
//!   request dispatch.
//!
//! There are no callbacks and no allocation. The caller owns an [`Ep0`] and
//! calls [`Ep0::handle_interrupt`] whenever the USB interrupt fires.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod descriptors;
pub mod ep0;
pub mod error;
pub mod hw;
pub mod transfer;
pub mod usb;

#[cfg(test)]
mod sim;

pub use config::Config;
pub use descriptors::{DescriptorTable, DEFAULT_TABLE};
pub use ep0::Ep0;
pub use error::{Error, Result};
pub use hw::{CsrEp0, Ep0Hardware, Events, InterruptLine, Response, Token};
pub use transfer::TxData;

/// Maximum packet size of endpoint 0. Full speed allows 8, 16, 32, or 64.
pub const MAX_PACKET_SIZE: usize = 64;

/// Largest OUT packet we'll accept, CRC included. This matches the depth of
/// the hardware OUT FIFO.
pub const OUT_BUFFER_LEN: usize = 128;
