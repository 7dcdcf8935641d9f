//! Pin-level simulated NAND chip.
//!
//! Implements [`NandPins`] with a state machine that latches commands and
//! addresses on WE# rising edges (under CLE/ALE) and drives data on RE#
//! falling edges, exactly as the bus driver toggles the lines. Backdoor
//! accessors expose the flat memory array for test setup and verification.

use crate::device::pins::NandPins;
use crate::domain::chip::ChipDescriptor;

/// Raw VSYS/3 ADC value that scales to a healthy ~5.0 V supply.
pub const VSYS_RAW_HEALTHY: u16 = 33_100;
/// Raw VSYS/3 ADC value that scales to a sagging ~3.8 V supply.
pub const VSYS_RAW_LOW: u16 = 25_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    /// Collecting address bytes after 0x00.
    ReadAddress,
    /// Streaming page bytes after 0x30.
    ReadOut,
    /// Collecting address, then data bytes after 0x80.
    ProgramInput,
    /// Collecting address bytes after 0x60.
    EraseAddress,
    /// Driving the status register after 0x70.
    Status,
    /// Driving ID bytes after 0x90.
    IdOut,
}

pub struct SimulatedChip {
    page_size: usize,
    spare_size: usize,
    pages_per_block: usize,
    memory: Vec<u8>,
    id: [u8; 4],

    cle: bool,
    ale: bool,
    we: bool,
    output_mode: bool,
    io_latch: u8,
    drive: u8,

    mode: Mode,
    addr_bytes: Vec<u8>,
    read_ptr: usize,
    id_ptr: usize,
    program_buf: Vec<u8>,
    status: u8,

    ready: bool,
    fail_next_program: bool,
    fail_next_erase: bool,
    vsys_raw: u16,
}

impl SimulatedChip {
    /// A blank (all-0xFF) chip with `desc`'s geometry, answering READ ID with
    /// `id`.
    pub fn new(desc: &ChipDescriptor, id: [u8; 4]) -> Self {
        let raw_page = desc.raw_page_size() as usize;
        let total_pages = desc.total_pages() as usize;
        Self {
            page_size: desc.page_size as usize,
            spare_size: desc.spare_size as usize,
            pages_per_block: desc.pages_per_block as usize,
            memory: vec![0xFF; raw_page * total_pages],
            id,
            cle: false,
            ale: false,
            we: true,
            output_mode: true,
            io_latch: 0,
            drive: 0xFF,
            mode: Mode::Idle,
            addr_bytes: Vec::new(),
            read_ptr: 0,
            id_ptr: 0,
            program_buf: Vec::new(),
            status: 0,
            ready: true,
            fail_next_program: false,
            fail_next_erase: false,
            vsys_raw: VSYS_RAW_HEALTHY,
        }
    }

    /// Builder: R/B# never goes high. Models a dead or absent chip.
    pub fn stuck_busy(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Copy of the raw memory array (pages of main+spare).
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Preload the raw memory array.
    pub fn set_memory(&mut self, data: &[u8]) {
        let len = self.memory.len().min(data.len());
        self.memory[..len].copy_from_slice(&data[..len]);
    }

    /// Make the next program (0x10) report a failed status.
    pub fn fail_next_program(&mut self) {
        self.fail_next_program = true;
    }

    /// Make the next erase (0xD0) report a failed status.
    pub fn fail_next_erase(&mut self) {
        self.fail_next_erase = true;
    }

    /// Override the supply sample.
    pub fn set_vsys_raw(&mut self, raw: u16) {
        self.vsys_raw = raw;
    }

    fn raw_page(&self) -> usize {
        self.page_size + self.spare_size
    }

    fn addr_value(&self) -> u64 {
        self.addr_bytes
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }

    /// Byte offset addressed by the 5-cycle read/program address
    /// (`page_index * page_size`, column assumed zero).
    fn addressed_offset(&self) -> usize {
        let page = self.addr_value() as usize / self.page_size.max(1);
        page * self.raw_page()
    }

    fn latch_command(&mut self, command: u8) {
        match command {
            0x00 => {
                self.mode = Mode::ReadAddress;
                self.addr_bytes.clear();
            }
            0x30 => {
                self.read_ptr = self.addressed_offset();
                self.mode = Mode::ReadOut;
            }
            0x80 => {
                self.mode = Mode::ProgramInput;
                self.addr_bytes.clear();
                self.program_buf.clear();
            }
            0x10 => {
                let offset = self.addressed_offset();
                self.status = if self.fail_next_program {
                    self.fail_next_program = false;
                    0x01
                } else {
                    let end = (offset + self.program_buf.len()).min(self.memory.len());
                    let n = end.saturating_sub(offset);
                    self.memory[offset..end].copy_from_slice(&self.program_buf[..n]);
                    0x00
                };
                self.mode = Mode::Idle;
            }
            0x60 => {
                self.mode = Mode::EraseAddress;
                self.addr_bytes.clear();
            }
            0xD0 => {
                let block = self.addr_value() as usize / self.pages_per_block.max(1);
                self.status = if self.fail_next_erase {
                    self.fail_next_erase = false;
                    0x01
                } else {
                    let block_bytes = self.raw_page() * self.pages_per_block;
                    let start = (block * block_bytes).min(self.memory.len());
                    let end = (start + block_bytes).min(self.memory.len());
                    self.memory[start..end].fill(0xFF);
                    0x00
                };
                self.mode = Mode::Idle;
            }
            0x70 => self.mode = Mode::Status,
            0x90 => {
                self.mode = Mode::IdOut;
                self.id_ptr = 0;
            }
            0xFF => {
                self.mode = Mode::Idle;
                self.status = 0;
            }
            _ => self.mode = Mode::Idle,
        }
    }

    /// WE# rising edge: latch whatever the lines carry.
    fn latch_write(&mut self) {
        let byte = self.io_latch;
        if self.cle {
            self.latch_command(byte);
        } else if self.ale {
            self.addr_bytes.push(byte);
            if self.mode == Mode::IdOut {
                self.id_ptr = 0;
            }
        } else if self.mode == Mode::ProgramInput {
            self.program_buf.push(byte);
        }
    }

    /// RE# falling edge: drive the next output byte.
    fn drive_read(&mut self) {
        self.drive = match self.mode {
            Mode::ReadOut => {
                let byte = self.memory.get(self.read_ptr).copied().unwrap_or(0xFF);
                self.read_ptr += 1;
                byte
            }
            Mode::Status => self.status,
            Mode::IdOut => {
                let byte = self.id.get(self.id_ptr).copied().unwrap_or(0x00);
                self.id_ptr += 1;
                byte
            }
            _ => 0xFF,
        };
    }
}

impl NandPins for SimulatedChip {
    fn set_cle(&mut self, high: bool) {
        self.cle = high;
    }

    fn set_ale(&mut self, high: bool) {
        self.ale = high;
    }

    fn set_ce(&mut self, _high: bool) {
        // The model keeps its latches across CE# deassertion, like the
        // real parts keep their cache registers.
    }

    fn set_re(&mut self, high: bool) {
        if !high {
            self.drive_read();
        }
    }

    fn set_we(&mut self, high: bool) {
        let rising = high && !self.we;
        self.we = high;
        if rising {
            self.latch_write();
        }
    }

    fn io_output(&mut self) {
        self.output_mode = true;
    }

    fn io_input(&mut self) {
        self.output_mode = false;
    }

    fn io_write(&mut self, byte: u8) {
        self.io_latch = byte;
    }

    fn io_read(&mut self) -> u8 {
        self.drive
    }

    fn ready(&mut self) -> bool {
        self.ready
    }

    fn delay_ns(&mut self, _ns: u32) {}

    fn read_vsys_raw(&mut self) -> u16 {
        self.vsys_raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::bus::{cmd, NandBus};
    use crate::registry::SIM_CHIP;

    fn fresh() -> NandBus<SimulatedChip> {
        NandBus::new(SimulatedChip::new(&SIM_CHIP, [0x5A, 0xA5, 0x00, 0x15]))
    }

    fn read_page(bus: &mut NandBus<SimulatedChip>, page: u32) -> Vec<u8> {
        let raw = SIM_CHIP.raw_page_size() as usize;
        bus.send_command(cmd::READ_SETUP);
        bus.send_address(page as u64 * SIM_CHIP.page_size as u64, 5);
        bus.send_command(cmd::READ_CONFIRM);
        assert!(bus.wait_ready(std::time::Duration::from_millis(100)));
        let data: Vec<u8> = (0..raw).map(|_| bus.read_cycle()).collect();
        bus.release();
        data
    }

    fn program_page(bus: &mut NandBus<SimulatedChip>, page: u32, data: &[u8]) -> u8 {
        bus.send_command(cmd::PROGRAM_SETUP);
        bus.send_address(page as u64 * SIM_CHIP.page_size as u64, 5);
        for &b in data {
            bus.write_cycle(b);
        }
        bus.send_command(cmd::PROGRAM_CONFIRM);
        assert!(bus.wait_ready(std::time::Duration::from_millis(100)));
        bus.read_status()
    }

    #[test]
    fn test_fresh_chip_reads_blank() {
        let mut bus = fresh();
        let page = read_page(&mut bus, 3);
        assert!(page.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_program_then_read_roundtrip() {
        let mut bus = fresh();
        let raw = SIM_CHIP.raw_page_size() as usize;
        let data: Vec<u8> = (0..raw).map(|i| (i % 251) as u8).collect();

        let status = program_page(&mut bus, 5, &data);
        assert!(!NandBus::<SimulatedChip>::status_failed(status));
        assert_eq!(read_page(&mut bus, 5), data);
        // Neighbouring page untouched
        assert!(read_page(&mut bus, 6).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_erase_block_restores_blank() {
        let mut bus = fresh();
        let raw = SIM_CHIP.raw_page_size() as usize;
        program_page(&mut bus, 0, &vec![0x00; raw]);

        bus.send_command(cmd::ERASE_SETUP);
        bus.send_address(0, 3);
        bus.send_command(cmd::ERASE_CONFIRM);
        assert!(bus.wait_ready(std::time::Duration::from_millis(100)));
        let status = bus.read_status();
        assert!(!NandBus::<SimulatedChip>::status_failed(status));

        assert!(read_page(&mut bus, 0).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_injected_program_failure_sets_status_bit() {
        let mut bus = fresh();
        bus.pins_mut().fail_next_program();
        let raw = SIM_CHIP.raw_page_size() as usize;
        let status = program_page(&mut bus, 1, &vec![0xAB; raw]);
        assert!(NandBus::<SimulatedChip>::status_failed(status));
        // Failed program must not touch the array
        let mut bus2 = bus;
        assert!(read_page(&mut bus2, 1).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_bad_block_marker_visible_in_spare() {
        let mut bus = fresh();
        let raw = SIM_CHIP.raw_page_size() as usize;
        let page_size = SIM_CHIP.page_size as usize;
        // Mark block 2 bad: spare byte 0 of its first page
        let block_first_page = 2 * SIM_CHIP.pages_per_block as usize;
        let offset = block_first_page * raw + page_size;
        let mut image = bus.pins_mut().memory().to_vec();
        image[offset] = 0x00;
        bus.pins_mut().set_memory(&image);

        let page = read_page(&mut bus, block_first_page as u32);
        assert_eq!(page[page_size], 0x00);
    }
}
