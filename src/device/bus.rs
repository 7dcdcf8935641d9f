//! NAND bus driver: command, address, and data cycles over raw pins.
//!
//! CE# is asserted by the first command of a logical operation and stays
//! asserted until the operation terminates ([`NandBus::release`]) or a status
//! read ends it. At idle CLE=ALE=0 and CE#=RE#=WE#=1.

use std::time::{Duration, Instant};

use log::trace;

use crate::domain::chip::NandTimings;
use crate::device::pins::NandPins;

/// ONFI command bytes used by the engine.
pub mod cmd {
    pub const READ_SETUP: u8 = 0x00;
    pub const READ_CONFIRM: u8 = 0x30;
    pub const PROGRAM_SETUP: u8 = 0x80;
    pub const PROGRAM_CONFIRM: u8 = 0x10;
    pub const ERASE_SETUP: u8 = 0x60;
    pub const ERASE_CONFIRM: u8 = 0xD0;
    pub const READ_STATUS: u8 = 0x70;
    pub const READ_ID: u8 = 0x90;
    pub const RESET: u8 = 0xFF;
}

/// ID read ready timeout.
const ID_READY_TIMEOUT: Duration = Duration::from_millis(1000);

pub struct NandBus<P: NandPins> {
    pins: P,
    timings: NandTimings,
}

impl<P: NandPins> NandBus<P> {
    /// Take ownership of the pins and drive them to the idle state.
    pub fn new(mut pins: P) -> Self {
        pins.set_cle(false);
        pins.set_ale(false);
        pins.set_ce(true);
        pins.set_re(true);
        pins.set_we(true);
        pins.io_output();
        Self {
            pins,
            timings: NandTimings::conservative(),
        }
    }

    /// Install the detected chip's timing parameters.
    pub fn set_timings(&mut self, timings: NandTimings) {
        self.timings = timings;
    }

    /// Direct pin access, for supply sampling and tests.
    pub fn pins_mut(&mut self) -> &mut P {
        &mut self.pins
    }

    /// Reset the chip (0xFF) and wait for it to come back.
    pub fn reset(&mut self) -> bool {
        self.send_command(cmd::RESET);
        let ok = self.wait_ready(ID_READY_TIMEOUT);
        self.release();
        ok
    }

    /// One command cycle: CLE high, byte latched on the WE# rising edge.
    /// Asserts CE# and leaves it asserted for the rest of the operation.
    pub fn send_command(&mut self, command: u8) {
        self.pins.set_ce(false);
        self.pins.set_cle(true);
        self.write_cycle(command);
        self.pins.set_cle(false);
    }

    /// Address cycles under ALE, least significant byte first.
    pub fn send_address(&mut self, mut value: u64, cycles: u8) {
        self.pins.set_ale(true);
        for _ in 0..cycles {
            self.write_cycle((value & 0xFF) as u8);
            value >>= 8;
        }
        self.pins.set_ale(false);
    }

    /// One write cycle: data presented, WE# pulsed low for tWP, cycle padded
    /// to tWC.
    pub fn write_cycle(&mut self, byte: u8) {
        self.pins.io_write(byte);
        self.pins.set_we(false);
        self.pins.delay_ns(self.timings.t_wp);
        self.pins.set_we(true);
        self.pins
            .delay_ns(self.timings.t_wc.saturating_sub(self.timings.t_wp));
    }

    /// One read cycle: lines to input, RE# low for max(tREA, tRP), sample,
    /// RE# high, cycle padded to tRC, lines back to output.
    pub fn read_cycle(&mut self) -> u8 {
        self.pins.io_input();
        self.pins.set_re(false);
        self.pins
            .delay_ns(self.timings.t_rea.max(self.timings.t_rp));
        let byte = self.pins.io_read();
        self.pins.set_re(true);
        self.pins
            .delay_ns(self.timings.t_rc.saturating_sub(self.timings.t_rea));
        self.pins.io_output();
        byte
    }

    /// Poll R/B# until high or `timeout`.
    pub fn wait_ready(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.pins.ready() {
            if Instant::now() >= deadline {
                return false;
            }
        }
        true
    }

    /// Read the status register (0x70). Releases CE#.
    pub fn read_status(&mut self) -> u8 {
        self.send_command(cmd::READ_STATUS);
        let status = self.read_cycle();
        self.release();
        status
    }

    /// The low status bit set means the last program/erase failed.
    pub fn status_failed(status: u8) -> bool {
        status & 0x01 != 0
    }

    /// Read the chip ID (0x90 / address 0x00). Returns the first four of six
    /// bytes read, or all 0xFF if the chip never reports ready.
    pub fn read_id(&mut self) -> [u8; 4] {
        self.send_command(cmd::READ_ID);
        self.pins.set_ale(true);
        self.write_cycle(0x00);
        self.pins.set_ale(false);

        if !self.wait_ready(ID_READY_TIMEOUT) {
            self.release();
            return [0xFF; 4];
        }

        let mut raw = [0u8; 6];
        for slot in raw.iter_mut() {
            *slot = self.read_cycle();
        }
        self.release();

        let id = [raw[0], raw[1], raw[2], raw[3]];
        trace!("NAND ID bytes: {:02X?}", raw);
        id
    }

    /// Deassert CE#, ending the current operation.
    pub fn release(&mut self) {
        self.pins.set_ce(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::SimulatedChip;
    use crate::registry::SIM_CHIP;

    fn sim_bus() -> NandBus<SimulatedChip> {
        NandBus::new(SimulatedChip::new(&SIM_CHIP, [0x5A, 0xA5, 0x00, 0x15]))
    }

    #[test]
    fn test_read_id_returns_configured_bytes() {
        let mut bus = sim_bus();
        assert_eq!(bus.read_id(), [0x5A, 0xA5, 0x00, 0x15]);
        // Repeatable
        assert_eq!(bus.read_id(), [0x5A, 0xA5, 0x00, 0x15]);
    }

    #[test]
    fn test_read_id_sentinel_on_busy_chip() {
        let mut bus = NandBus::new(
            SimulatedChip::new(&SIM_CHIP, [0x5A, 0xA5, 0x00, 0x15]).stuck_busy(),
        );
        // Shorten the wait by polling directly; read_id itself uses 1s
        assert!(!bus.wait_ready(Duration::from_millis(5)));
    }

    #[test]
    fn test_status_read_is_clean_after_reset() {
        let mut bus = sim_bus();
        assert!(bus.reset());
        let status = bus.read_status();
        assert!(!NandBus::<SimulatedChip>::status_failed(status));
    }
}
