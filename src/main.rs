// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware for a LiteX SoC with an epfifo USB core and a Cortex-M3 hard core.
//!
//! This brings up the USB device, enumerates with the host, and then just
//! answers control requests on endpoint 0 forever. All of the USB logic lives
//! in the library; this file only knows where the peripherals are.
//!
//! We don't take the USB interrupt as an exception. Instead the line is
//! unmasked in the NVIC with PRIMASK set, so it wakes us from `wfi` and shows
//! up as pending, and the main loop services it. This keeps the control flow
//! in one place, where you can read it top to bottom.

#![no_std]
#![no_main]

use core::fmt::Write;

use cortex_m::interrupt::InterruptNumber;
use cortex_m::peripheral::NVIC;
use cortex_m_rt::entry;
use log::{error, info, LevelFilter, Log, Metadata, Record};

use epfifo_usb::{Config, CsrEp0, Ep0, InterruptLine, DEFAULT_TABLE};

use panic_halt as _;

// Peripheral addresses and the USB interrupt number. These come from the
// `csr.csv` that LiteX generates alongside the gateware, and change whenever
// the SoC is rebuilt with a different set of cores.
cfg_if::cfg_if! {
    if #[cfg(feature = "target-tang-nano-4k")] {
        const USB_BASE: usize = 0x4000_4800; // `usb` CSR bank
        const UART_BASE: usize = 0x4000_5000; // `uart` CSR bank
        const USB_IRQ: u16 = 3;
    } else {
        compile_error!("missing or unknown target-* feature");
    }
}

#[entry]
fn main() -> ! {
    // Keep exceptions from being taken. Pending interrupts still wake `wfi`.
    cortex_m::interrupt::disable();

    init_logging();
    info!("epfifo-usb starting");

    // Safety: nothing else in this program touches the USB CSRs.
    let hw = unsafe { CsrEp0::new(USB_BASE, NvicLine(UsbIrq)) };
    let mut ep0 = Ep0::new(hw, &DEFAULT_TABLE, Config::default());

    // Make sure the host sees a disconnect, in case we were reset while
    // attached, then come back.
    ep0.init();
    ep0.idle();
    ep0.connect();
    info!("USB connected, waiting for host");

    loop {
        if NVIC::is_pending(UsbIrq) {
            // The core holds the line high for as long as any enabled event is
            // pending, so if we didn't clear everything it'll pend again.
            NVIC::unpend(UsbIrq);
            if let Err(e) = ep0.handle_interrupt() {
                error!("USB fault: {}", e);
                // Stop answering rather than confuse the host any further.
                ep0.idle();
            }
        } else {
            cortex_m::asm::wfi();
        }
    }
}

////////////////////////////////////////////////////////////////////////////
// Interrupt line.

#[derive(Copy, Clone)]
struct UsbIrq;

// Safety: USB_IRQ is a valid interrupt number on this SoC.
unsafe impl InterruptNumber for UsbIrq {
    fn number(self) -> u16 {
        USB_IRQ
    }
}

/// An NVIC line, as the engine's interrupt mask.
struct NvicLine<N>(N);

impl<N: InterruptNumber> InterruptLine for NvicLine<N> {
    fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            // Safety: PRIMASK is set for the lifetime of the program, so
            // unmasking can't break a critical section.
            unsafe { NVIC::unmask(self.0) }
        } else {
            NVIC::mask(self.0);
        }
    }
}

////////////////////////////////////////////////////////////////////////////
// Logging, over the LiteX UART.

/// LiteX UART CSRs: `rxtx` at 0x00 and `txfull` at 0x04.
struct Uart;

impl Uart {
    fn rxtx() -> *mut u32 {
        UART_BASE as *mut u32
    }

    fn txfull() -> *const u32 {
        (UART_BASE + 4) as *const u32
    }
}

impl Write for Uart {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for byte in s.bytes() {
            // Safety: the UART CSRs are only accessed here, and only from the
            // main thread.
            unsafe {
                while core::ptr::read_volatile(Uart::txfull()) & 1 != 0 {}
                core::ptr::write_volatile(Uart::rxtx(), u32::from(byte));
            }
        }
        Ok(())
    }
}

struct UartLogger;

impl Log for UartLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            // Nowhere to report a failed log write.
            let _ = write!(Uart, "[{}] {}\r\n", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: UartLogger = UartLogger;

fn init_logging() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}
