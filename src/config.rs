// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/// Runtime knobs for the control engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// How many times to poll the hardware for an expected state before giving
    /// up with [`Error::Timeout`](crate::Error::Timeout).
    pub spin_limit: u32,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            spin_limit: 100_000,
        }
    }

    pub const fn with_spin_limit(self, spin_limit: u32) -> Self {
        Self { spin_limit }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
