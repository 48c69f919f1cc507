// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt;

/// Faults the control engine cannot recover from by itself. Protocol errors
/// are answered with a STALL and never show up here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The hardware never reached the state we were waiting for.
    Timeout(&'static str),
    /// The IN FIFO refused a byte.
    InFifoFull,
    /// A reply was started while the previous one was still being sent.
    TransferInFlight,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Timeout(what) => write!(f, "timed out waiting for {}", what),
            Error::InFifoFull => f.write_str("IN FIFO full"),
            Error::TransferInFlight => f.write_str("transfer already in flight"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
