// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bookkeeping for the reply currently being sent on EP0 IN.
//!
//! A reply longer than one packet goes out as a series of maximum-size
//! packets followed by a short one. If the reply is an exact multiple of the
//! packet size, the host can't tell it has ended, so we send a zero-length
//! packet after the last full one.

/// Capacity of the scratch buffer used for small computed replies
/// (configuration number, status words).
pub const REPLY_LEN: usize = 8;

/// Where the bytes of a reply live.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TxData {
    /// A descriptor, borrowed for as long as the device exists.
    Static(&'static [u8]),
    /// A small reply computed on the spot.
    Inline([u8; REPLY_LEN]),
}

impl TxData {
    /// Copies `bytes` into an inline reply. `bytes` must fit in `REPLY_LEN`.
    pub fn inline(bytes: &[u8]) -> Self {
        let mut buf = [0; REPLY_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        TxData::Inline(buf)
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            TxData::Static(b) => b,
            TxData::Inline(b) => b,
        }
    }
}

/// State of the in-flight IN transfer. `data` is `None` exactly when nothing
/// is being sent, and `sent + chunk_len <= total_len` always holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferState {
    data: Option<TxData>,
    total_len: usize,
    /// Bytes already handed to the hardware, not counting the current chunk.
    sent: usize,
    /// Size of the packet most recently queued.
    chunk_len: usize,
    /// The last queued packet was full and ended the data, so a zero-length
    /// packet has to follow.
    zlp_next: bool,
}

impl TransferState {
    pub const fn new() -> Self {
        Self {
            data: None,
            total_len: 0,
            sent: 0,
            chunk_len: 0,
            zlp_next: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Begins sending the first `len` bytes of `data`.
    pub fn start(&mut self, data: TxData, len: usize) {
        let len = len.min(data.as_slice().len());
        if len == 0 {
            // Nothing to send, so nothing in flight.
            self.reset();
            return;
        }
        *self = Self {
            data: Some(data),
            total_len: len,
            ..Self::new()
        };
    }

    pub fn in_flight(&self) -> bool {
        self.data.is_some() && self.total_len != 0
    }

    pub fn total_len(&self) -> usize {
        self.total_len
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Moves past the packet queued last time and picks the next one.
    ///
    /// Returns the bytes of the next packet, which is empty for a terminating
    /// zero-length packet, or `None` once the transfer is over. In that case
    /// the state has been reset.
    pub fn next_chunk(&mut self, max_packet_size: usize) -> Option<&[u8]> {
        if !self.in_flight() {
            return None;
        }

        self.sent += self.chunk_len;
        let remaining = self.total_len - self.sent;

        if remaining > max_packet_size {
            // More follows, so this packet can't be the last one.
            self.chunk_len = max_packet_size;
            self.zlp_next = false;
        } else if remaining == max_packet_size {
            self.chunk_len = max_packet_size;
            self.zlp_next = true;
        } else if self.zlp_next {
            self.zlp_next = false;
            self.chunk_len = 0;
        } else if remaining == 0 {
            self.reset();
            return None;
        } else {
            self.chunk_len = remaining;
        }

        let data = self.data.as_ref()?;
        Some(&data.as_slice()[self.sent..self.sent + self.chunk_len])
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}
