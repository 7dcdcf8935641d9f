//! Adapter-side operation engine.
//!
//! Owns the bus and the serial link for one session. The first two inbound
//! bytes pick the transport: the frame magic starts a binary session,
//! anything else a legacy line session. Operations run strictly serially;
//! between page/block units the engine polls the link for the line-based
//! control tokens (CANCEL/PAUSE/RESUME) shared by both transports.

use std::time::Duration;

use log::{debug, info, warn};

use crate::device::bus::{cmd, NandBus};
use crate::device::pins::NandPins;
use crate::domain::chip::ChipDescriptor;
use crate::error::{Error, Result};
use crate::registry;
use crate::wire::crc::crc32_ieee;
use crate::wire::frame::{self, FrameCode, FrameReader};
use crate::wire::line::{Command, Event};
use crate::wire::link::ByteLink;

const READ_READY_TIMEOUT: Duration = Duration::from_secs(5);
const PROGRAM_READY_TIMEOUT: Duration = Duration::from_secs(5);
const ERASE_READY_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-page wait for inbound WRITE data.
const WRITE_DATA_TIMEOUT: Duration = Duration::from_secs(15);
/// How long the manual-selection sub-protocol waits for the host.
const SELECT_TIMEOUT: Duration = Duration::from_secs(30);
const PAUSE_POLL: Duration = Duration::from_millis(5);

/// Supply sampling cadence, in pages (READ/WRITE) and blocks (ERASE).
const POWER_CHECK_PAGES: u32 = 100;
const POWER_CHECK_BLOCKS: u32 = 10;
const LOW_VOLTAGE_THRESHOLD: f32 = 4.5;

/// How a finished operation left the session.
enum OpEnd {
    Done,
    Cancelled,
    Failed(&'static str),
}

pub struct DeviceEngine<P: NandPins, L: ByteLink> {
    bus: NandBus<P>,
    link: L,
    reader: FrameReader,
    chip: Option<&'static ChipDescriptor>,
    binary: bool,
    paused: bool,
    /// Fill byte for the spare area when the host sends main data only.
    spare_fill: u8,
}

impl<P: NandPins, L: ByteLink> DeviceEngine<P, L> {
    pub fn new(pins: P, link: L) -> Self {
        Self {
            bus: NandBus::new(pins),
            link,
            reader: FrameReader::new(),
            chip: None,
            binary: false,
            paused: false,
            spare_fill: 0x00,
        }
    }

    /// Preselect a chip, bypassing ID detection. Used by the `sim` port and
    /// by tests with geometries outside the registry.
    pub fn with_chip(mut self, chip: &'static ChipDescriptor) -> Self {
        self.bus.set_timings(chip.timings);
        self.chip = Some(chip);
        self
    }

    /// Spare fill byte for OOB-less writes (some parts want 0xFF).
    pub fn with_spare_fill(mut self, fill: u8) -> Self {
        self.spare_fill = fill;
        self
    }

    /// The bus, for pin-level inspection after a session.
    pub fn bus_mut(&mut self) -> &mut NandBus<P> {
        &mut self.bus
    }

    /// Serve one session until EXIT or the link closes.
    pub fn run(&mut self) -> Result<()> {
        match self.serve() {
            Err(Error::LinkClosed) => Ok(()),
            other => other,
        }
    }

    fn serve(&mut self) -> Result<()> {
        // Transport negotiation on the first two bytes.
        while self.reader.buffered().len() < 2 {
            self.reader
                .fill_some(&mut self.link, Duration::from_millis(200))?;
        }
        if self.reader.buffered().starts_with(&frame::MAGIC) {
            self.binary = true;
            info!("binary session");
            self.binary_session()
        } else {
            self.binary = false;
            info!("legacy line session");
            self.line_session()
        }
    }

    fn binary_session(&mut self) -> Result<()> {
        loop {
            self.drain_control_tokens()?;
            let (code, payload) =
                match self.reader.read_frame(&mut self.link, Duration::from_millis(200)) {
                    Ok(frame) => frame,
                    Err(Error::Timeout) => continue,
                    Err(e) => return Err(e),
                };
            match FrameCode::from_u8(code) {
                Some(FrameCode::Status) => self.handle_status()?,
                Some(FrameCode::Read) => self.op_read()?,
                Some(FrameCode::Write) => {
                    let include_oob = payload.first().map_or(true, |flags| flags & 0x01 != 0);
                    self.op_write(include_oob)?;
                }
                Some(FrameCode::Erase) => self.op_erase()?,
                other => debug!("ignoring inbound frame 0x{code:02X} ({other:?})"),
            }
        }
    }

    fn line_session(&mut self) -> Result<()> {
        self.emit_line(&Event::Info("Detecting NAND...".into()))?;
        if self.chip.is_none() {
            self.detect_chip();
        }
        self.announce_model()?;
        if self.chip.is_none() {
            self.manual_select()?;
        }

        loop {
            let line = match self.reader.read_line(&mut self.link, Duration::from_millis(500)) {
                Ok(line) => line,
                Err(Error::Timeout) => continue,
                Err(e) => return Err(e),
            };
            match Command::parse(&line) {
                Some(Command::Status) => self.handle_status()?,
                Some(Command::Read) => self.op_read()?,
                Some(Command::Write) => self.op_write(true)?,
                Some(Command::WriteNoOob) => self.op_write(false)?,
                Some(Command::Erase) => self.op_erase()?,
                Some(Command::Cancel) => {
                    self.emit_line(&Event::OperationCancelled)?;
                }
                Some(Command::Pause) => {
                    self.paused = true;
                    self.emit_line(&Event::Paused)?;
                }
                Some(Command::Resume) => self.paused = false,
                Some(Command::Exit) => return Ok(()),
                Some(Command::Redetect) => {
                    self.chip = None;
                    self.detect_chip();
                    self.announce_model()?;
                }
                Some(Command::Select(_)) | None => {
                    if !line.is_empty() {
                        debug!("ignoring line: {line}");
                    }
                }
            }
        }
    }

    // ===== Detection and manual selection =====

    fn detect_chip(&mut self) {
        let id = self.bus.read_id();
        debug!("NAND ID: {}", hex::encode(id));
        self.chip = registry::lookup(&id);
        match self.chip {
            Some(chip) => {
                info!("detected {}", chip.full_name());
                self.bus.set_timings(chip.timings);
            }
            None => info!("no registry match for ID {}", hex::encode(id)),
        }
    }

    fn handle_status(&mut self) -> Result<()> {
        if self.chip.is_none() {
            self.detect_chip();
        }
        self.announce_model()?;
        if self.chip.is_none() {
            self.manual_select()?;
        }
        Ok(())
    }

    fn announce_model(&mut self) -> Result<()> {
        let name = self
            .chip
            .map(|chip| chip.full_name())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        if self.binary {
            self.emit_frame(FrameCode::Model, name.as_bytes())
        } else {
            self.emit_line(&Event::Model(name))
        }
    }

    /// Enumerate the registry and wait for the host to pick an entry.
    /// The listing and the SELECT reply are lines in both transports.
    fn manual_select(&mut self) -> Result<()> {
        self.emit_line(&Event::ManualSelectStart)?;
        for (i, chip) in registry::all().enumerate() {
            self.emit_line(&Event::ManualSelectEntry(i + 1, chip.full_name()))?;
        }
        self.emit_line(&Event::ManualSelectEnd)?;

        loop {
            let line = match self.reader.read_line(&mut self.link, SELECT_TIMEOUT) {
                Ok(line) => line,
                Err(Error::Timeout) => {
                    warn!("manual selection timed out");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            match Command::parse(&line) {
                Some(Command::Select(n)) if n >= 1 => {
                    if let Some(chip) = registry::all().nth(n - 1) {
                        info!("manually selected {}", chip.full_name());
                        self.bus.set_timings(chip.timings);
                        self.chip = Some(chip);
                        return self.announce_model();
                    }
                    warn!("selection index {n} out of range");
                }
                Some(Command::Cancel) => return Ok(()),
                _ => {}
            }
        }
    }

    // ===== Operations =====

    fn op_read(&mut self) -> Result<()> {
        let Some(chip) = self.chip else {
            return self.emit_failure("NAND_NOT_CONNECTED");
        };
        self.paused = false;

        let total = chip.total_pages();
        let mut buffer = vec![0u8; chip.raw_page_size() as usize];
        for page in 0..total {
            if self.poll_control()? {
                return self.finish(OpEnd::Cancelled);
            }
            if !self.read_page(chip, page, &mut buffer) {
                return self.finish(OpEnd::Failed("READ_PAGE_FAIL"));
            }
            if self.binary {
                self.emit_frame(FrameCode::Read, &buffer)?;
                let crc = crc32_ieee(&buffer);
                self.emit_frame(FrameCode::PageCrc, &frame::page_crc_payload(page, crc))?;
            } else {
                self.link.send(&buffer)?;
            }
            self.emit_progress(percent(page, total), page)?;
            if page % POWER_CHECK_PAGES == 0 {
                self.check_power()?;
            }
        }
        self.finish(OpEnd::Done)
    }

    fn op_write(&mut self, include_oob: bool) -> Result<()> {
        let Some(chip) = self.chip else {
            return self.emit_failure("NAND_NOT_CONNECTED");
        };
        self.paused = false;

        let page_size = chip.page_size as usize;
        let page_unit = page_size + if include_oob { chip.spare_size as usize } else { 0 };
        let total = chip.total_pages();

        if self.binary {
            self.emit_frame(FrameCode::ReadyForData, &[])?;
        } else {
            self.emit_line(&Event::ReadyForData)?;
        }

        // Inbound chunks do not align to pages; reassemble through a carry
        // buffer and consume exactly one page-unit at a time.
        let mut carry: Vec<u8> = Vec::new();
        let mut page_buf = vec![0u8; chip.raw_page_size() as usize];
        for page in 0..total {
            // Control tokens sit on frame boundaries in binary mode. Legacy
            // mode streams raw bytes, so polling would corrupt the data.
            if self.binary && self.poll_control()? {
                return self.finish(OpEnd::Cancelled);
            }
            if !self.gather_page_data(&mut carry, page_unit)? {
                return self.finish(OpEnd::Failed("WRITE_DATA_TIMEOUT"));
            }
            page_buf[..page_unit].copy_from_slice(&carry[..page_unit]);
            carry.drain(..page_unit);
            if !include_oob {
                page_buf[page_size..].fill(self.spare_fill);
            }

            if !self.program_page(chip, page, &page_buf) {
                return self.finish(OpEnd::Failed("PROG_PAGE_FAIL"));
            }
            self.emit_progress(percent(page, total), page)?;
            if page % POWER_CHECK_PAGES == 0 {
                self.check_power()?;
            }
        }
        self.finish(OpEnd::Done)
    }

    fn op_erase(&mut self) -> Result<()> {
        let Some(chip) = self.chip else {
            return self.emit_failure("NAND_NOT_CONNECTED");
        };
        self.paused = false;

        let total = chip.block_count;
        for block in 0..total {
            if self.poll_control()? {
                return self.finish(OpEnd::Cancelled);
            }
            if !self.erase_block(chip, block) {
                return self.finish(OpEnd::Failed("ERASE_BLOCK_FAIL"));
            }
            self.emit_progress(percent(block, total), block)?;
            if block % POWER_CHECK_BLOCKS == 0 {
                self.check_power()?;
            }
        }
        self.finish(OpEnd::Done)
    }

    // ===== Bus sequences =====

    fn read_page(&mut self, chip: &ChipDescriptor, page: u32, buffer: &mut [u8]) -> bool {
        self.bus.send_command(cmd::READ_SETUP);
        self.bus
            .send_address(page as u64 * chip.page_size as u64, 5);
        self.bus.send_command(cmd::READ_CONFIRM);
        if !self.bus.wait_ready(READ_READY_TIMEOUT) {
            self.bus.release();
            return false;
        }
        for slot in buffer.iter_mut() {
            *slot = self.bus.read_cycle();
        }
        self.bus.release();
        true
    }

    fn program_page(&mut self, chip: &ChipDescriptor, page: u32, buffer: &[u8]) -> bool {
        self.bus.send_command(cmd::PROGRAM_SETUP);
        self.bus
            .send_address(page as u64 * chip.page_size as u64, 5);
        for &byte in buffer {
            self.bus.write_cycle(byte);
        }
        self.bus.send_command(cmd::PROGRAM_CONFIRM);
        if !self.bus.wait_ready(PROGRAM_READY_TIMEOUT) {
            self.bus.release();
            return false;
        }
        !NandBus::<P>::status_failed(self.bus.read_status())
    }

    fn erase_block(&mut self, chip: &ChipDescriptor, block: u32) -> bool {
        self.bus.send_command(cmd::ERASE_SETUP);
        self.bus
            .send_address(block as u64 * chip.pages_per_block as u64, 3);
        self.bus.send_command(cmd::ERASE_CONFIRM);
        if !self.bus.wait_ready(ERASE_READY_TIMEOUT) {
            self.bus.release();
            return false;
        }
        !NandBus::<P>::status_failed(self.bus.read_status())
    }

    // ===== Inbound helpers =====

    /// Pull `page_unit` bytes of write payload into `carry`. Returns false on
    /// timeout.
    fn gather_page_data(&mut self, carry: &mut Vec<u8>, page_unit: usize) -> Result<bool> {
        while carry.len() < page_unit {
            if self.binary {
                match self.reader.read_frame(&mut self.link, WRITE_DATA_TIMEOUT) {
                    Ok((code, payload)) if code == FrameCode::Write as u8 => {
                        carry.extend_from_slice(&payload);
                    }
                    Ok((code, _)) => debug!("ignoring frame 0x{code:02X} during write"),
                    Err(Error::Timeout) => return Ok(false),
                    Err(e) => return Err(e),
                }
            } else {
                // Raw byte stream in legacy mode; drain the reader's buffer
                // first so nothing is lost to earlier line parsing.
                let buffered = self.reader.buffered().len();
                if buffered > 0 {
                    carry.extend_from_slice(self.reader.buffered());
                    self.reader.consume(buffered);
                    continue;
                }
                let mut chunk = [0u8; 512];
                let n = self.link.recv_some(&mut chunk, WRITE_DATA_TIMEOUT)?;
                if n == 0 {
                    return Ok(false);
                }
                carry.extend_from_slice(&chunk[..n]);
            }
        }
        Ok(true)
    }

    /// Non-blocking control poll at a suspension point. Returns true when the
    /// operation must stop. Blocks while paused.
    fn poll_control(&mut self) -> Result<bool> {
        self.reader.poll_fill(&mut self.link)?;
        if self.take_control_token()? {
            return Ok(true);
        }
        while self.paused {
            self.reader.fill_some(&mut self.link, PAUSE_POLL)?;
            if self.take_control_token()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Consume control lines sitting at the head of the inbound buffer.
    /// Stops at frame magic so queued command/data frames stay intact.
    fn take_control_token(&mut self) -> Result<bool> {
        loop {
            let buffered = self.reader.buffered();
            if buffered.is_empty() || buffered.starts_with(&frame::MAGIC) {
                return Ok(false);
            }
            let Some(pos) = buffered.iter().position(|&b| b == b'\n') else {
                return Ok(false);
            };
            let line = String::from_utf8_lossy(&buffered[..pos]).trim().to_string();
            self.reader.consume(pos + 1);
            match Command::parse(&line) {
                Some(Command::Cancel) => return Ok(true),
                Some(Command::Pause) => {
                    self.paused = true;
                    self.emit_line(&Event::Paused)?;
                }
                Some(Command::Resume) => self.paused = false,
                _ => debug!("ignoring mid-operation line: {line}"),
            }
        }
    }

    /// Between-command variant: acknowledge stray control tokens so an idle
    /// session answers PAUSE/CANCEL like the legacy firmware did.
    fn drain_control_tokens(&mut self) -> Result<()> {
        self.reader.poll_fill(&mut self.link)?;
        if self.take_control_token()? {
            // CANCEL outside an operation is acknowledged and forgotten.
            self.emit_line(&Event::OperationCancelled)?;
        }
        self.paused = false;
        Ok(())
    }

    // ===== Outbound helpers =====

    fn emit_frame(&mut self, code: FrameCode, payload: &[u8]) -> Result<()> {
        self.link.send(&frame::encode(code as u8, payload))
    }

    fn emit_line(&mut self, event: &Event) -> Result<()> {
        self.link.send(format!("{event}\n").as_bytes())
    }

    fn emit_progress(&mut self, percent: u16, index: u32) -> Result<()> {
        if self.binary {
            self.emit_frame(FrameCode::Progress, &frame::progress_payload(percent, index))
        } else {
            self.emit_line(&Event::Progress(percent.min(100) as u8))
        }
    }

    fn emit_failure(&mut self, reason: &str) -> Result<()> {
        warn!("operation failed: {reason}");
        if self.binary {
            self.emit_frame(FrameCode::Error, reason.as_bytes())
        } else {
            self.emit_line(&Event::OperationFailed)
        }
    }

    fn finish(&mut self, end: OpEnd) -> Result<()> {
        match end {
            OpEnd::Done => {
                if self.binary {
                    self.emit_frame(FrameCode::Complete, &[])
                } else {
                    self.emit_line(&Event::OperationComplete)
                }
            }
            OpEnd::Cancelled => {
                info!("operation cancelled");
                if self.binary {
                    self.emit_frame(FrameCode::Error, b"CANCELLED")
                } else {
                    self.emit_line(&Event::OperationCancelled)
                }
            }
            OpEnd::Failed(reason) => self.emit_failure(reason),
        }
    }

    fn check_power(&mut self) -> Result<()> {
        let raw = self.bus.pins_mut().read_vsys_raw();
        let volts = raw as f32 * 3.3 / 65535.0 * 3.0;
        if volts < LOW_VOLTAGE_THRESHOLD {
            let message = format!("Low voltage: {volts:.2}V");
            warn!("{message}");
            if self.binary {
                self.emit_frame(FrameCode::PowerWarning, message.as_bytes())?;
            } else {
                self.emit_line(&Event::PowerWarning(message))?;
            }
        }
        Ok(())
    }
}

/// Completed-unit percentage, 1-based like the firmware reported it.
fn percent(index: u32, total: u32) -> u16 {
    (((index as u64 + 1) * 100) / total.max(1) as u64) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_monotonic_and_complete() {
        let total = 7;
        let mut last = 0;
        for i in 0..total {
            let p = percent(i, total);
            assert!(p >= last);
            last = p;
        }
        assert_eq!(last, 100);
        assert_eq!(percent(0, 0), 100);
    }
}
