//! Host orchestration engine.
//!
//! Drives one adapter session: detection, READ/WRITE/ERASE with resumable
//! checkpoints, ECC reporting, and cooperative cancellation. One engine owns
//! the serial link exclusively; shells observe through the progress callback
//! and the cancel token.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::AppConfig;
use crate::domain::chip::ChipDescriptor;
use crate::domain::dump;
use crate::domain::ecc;
use crate::domain::types::Progress;
use crate::error::{Error, Result};
use crate::host::checkpoint::{CheckpointStore, ResumeCheckpoint};
use crate::host::CancelToken;
use crate::registry;
use crate::wire::crc::crc32_ieee;
use crate::wire::frame::{self, FrameCode, FrameReader};
use crate::wire::line::{Command, Event};
use crate::wire::link::ByteLink;

/// WRITE checkpoint cadence in bytes.
const WRITE_CHECKPOINT_INTERVAL: usize = 1024 * 1024;
/// Poll slice while waiting for frames; the real limit is the inactivity
/// window.
const POLL_SLICE: Duration = Duration::from_millis(200);
/// Grace period for the device's terminal frame after CANCEL.
const CANCEL_GRACE: Duration = Duration::from_secs(3);

/// Outcome of automatic detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Chip(&'static ChipDescriptor),
    /// Device answered UNKNOWN; call [`HostEngine::select`] with a registry
    /// index to finish manually.
    Unknown,
}

/// ECC disagreement on one received page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EccFinding {
    /// Page counter at the time the frame arrived.
    pub page: u32,
    /// Mismatching sector indices, or `[-1]` for a whole-page check.
    pub sectors: Vec<i32>,
}

pub struct HostEngine<L: ByteLink> {
    link: L,
    reader: FrameReader,
    config: AppConfig,
    store: CheckpointStore,
    cancel: CancelToken,
    chip: Option<&'static ChipDescriptor>,
    ecc_findings: Vec<EccFinding>,
}

impl<L: ByteLink> HostEngine<L> {
    pub fn new(link: L, config: AppConfig, store: CheckpointStore) -> Self {
        Self {
            link,
            reader: FrameReader::new(),
            config,
            store,
            cancel: CancelToken::new(),
            chip: None,
            ecc_findings: Vec::new(),
        }
    }

    /// Token the shell can trip to abort the running operation.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn chip(&self) -> Option<&'static ChipDescriptor> {
        self.chip
    }

    /// Adopt a descriptor without the detection exchange (tests, `sim`
    /// geometries outside the registry).
    pub fn set_chip(&mut self, chip: &'static ChipDescriptor) {
        self.chip = Some(chip);
    }

    /// ECC disagreements collected by the last READ.
    pub fn take_ecc_findings(&mut self) -> Vec<EccFinding> {
        std::mem::take(&mut self.ecc_findings)
    }

    /// Drop any stored resume state.
    pub fn clear_resume(&self) -> Result<()> {
        self.store.clear()
    }

    fn binary(&self) -> bool {
        self.config.use_binary_protocol
    }

    fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.config.response_timeout_secs)
    }

    fn inactivity_window(&self) -> Duration {
        Duration::from_secs(self.config.operation_timeout_secs)
    }

    // ===== Command plumbing =====

    fn send_operation(&mut self, code: FrameCode, token: Command) -> Result<()> {
        if self.binary() {
            self.link.send(&frame::encode(code as u8, &[]))
        } else {
            self.send_line(&token)
        }
    }

    fn send_line(&mut self, command: &Command) -> Result<()> {
        self.link.send(format!("{command}\n").as_bytes())
    }

    /// Wait for a MODEL announcement, tolerating anything else in between.
    fn await_model(&mut self) -> Result<String> {
        let deadline = Instant::now() + self.response_timeout();
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(Error::Timeout)?;
            if self.binary() {
                let (code, payload) = self.reader.read_frame(&mut self.link, remaining)?;
                match FrameCode::from_u8(code) {
                    Some(FrameCode::Model) => {
                        return Ok(String::from_utf8_lossy(&payload).into_owned());
                    }
                    Some(FrameCode::PowerWarning) => {
                        warn!("device: {}", String::from_utf8_lossy(&payload));
                    }
                    _ => debug!("ignoring frame 0x{code:02X} while detecting"),
                }
            } else {
                let line = self.reader.read_line(&mut self.link, remaining)?;
                match Event::parse(&line) {
                    Event::Model(name) => return Ok(name),
                    Event::Info(text) => debug!("device: {text}"),
                    other => debug!("ignoring {other:?} while detecting"),
                }
            }
        }
    }

    /// Issue STATUS and resolve the device's MODEL answer against the
    /// registry.
    pub fn detect(&mut self) -> Result<Detection> {
        self.send_operation(FrameCode::Status, Command::Status)?;
        let name = self.await_model()?;
        if name == "UNKNOWN" {
            info!("device could not identify the chip");
            return Ok(Detection::Unknown);
        }
        let chip = registry::by_full_name(&name).ok_or(Error::UnknownModel(name))?;
        info!("detected {}", chip.full_name());
        self.chip = Some(chip);
        Ok(Detection::Chip(chip))
    }

    /// Complete manual selection with a zero-based registry index.
    pub fn select(&mut self, index: usize) -> Result<&'static ChipDescriptor> {
        let chip = registry::all()
            .nth(index)
            .ok_or_else(|| Error::InvalidParameter(format!("no registry entry {index}")))?;
        // The wire protocol is 1-based.
        self.send_line(&Command::Select(index + 1))?;
        let name = self.await_model()?;
        if name != chip.full_name() {
            return Err(Error::UnknownModel(name));
        }
        self.chip = Some(chip);
        Ok(chip)
    }

    /// Ask the device to pause after the current unit.
    pub fn pause(&mut self) -> Result<()> {
        self.send_line(&Command::Pause)
    }

    /// Resume a paused operation.
    pub fn resume(&mut self) -> Result<()> {
        self.send_line(&Command::Resume)
    }

    // ===== READ =====

    /// Stream the whole chip. Returns main data, OOB-stripped unless
    /// configured otherwise.
    pub fn read(&mut self, mut on_progress: impl FnMut(Progress)) -> Result<Vec<u8>> {
        if !self.binary() {
            return Err(Error::Unsupported(
                "bulk read needs the binary transport; the line protocol cannot carry page data"
                    .into(),
            ));
        }
        let chip = self.chip.ok_or(Error::ChipNotDetected)?;
        let raw_page = chip.raw_page_size() as usize;
        self.cancel.reset();
        self.ecc_findings.clear();

        // A stored READ checkpoint is only acted on after its CRC is
        // confirmed by the device re-sending PAGE_CRC for that page.
        let mut pending_resume = match self.store.load() {
            Some(ResumeCheckpoint::Read {
                last_page,
                page_crc32,
                ..
            }) => {
                info!("resume candidate: page {last_page}, crc {page_crc32:08X}");
                Some((last_page, page_crc32))
            }
            _ => None,
        };

        self.send_operation(FrameCode::Read, Command::Read)?;

        let ecc_config = self.config.ecc_config();
        let mut buffer: Vec<u8> = Vec::new();
        let mut pages_received: u32 = 0;
        let mut last_activity = Instant::now();

        loop {
            if self.cancel.is_cancelled() {
                return self.cancel_handshake();
            }
            let (code, payload) = match self.reader.read_frame(&mut self.link, POLL_SLICE) {
                Ok(frame) => frame,
                Err(Error::Timeout) => {
                    if last_activity.elapsed() > self.inactivity_window() {
                        return Err(Error::Timeout);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            last_activity = Instant::now();

            match FrameCode::from_u8(code) {
                Some(FrameCode::Progress) => {
                    if let Some((percent, index)) = frame::parse_progress(&payload) {
                        on_progress(Progress::new(percent, index.unwrap_or_default()));
                    }
                }
                Some(FrameCode::PageCrc) => {
                    let Some((page, crc)) = frame::parse_page_crc(&payload) else {
                        continue;
                    };
                    if let Some((last_page, expected)) = pending_resume {
                        if page == last_page {
                            pending_resume = None;
                            if crc == expected {
                                self.apply_resume_discard(&mut buffer, last_page, raw_page)?;
                            } else {
                                warn!(
                                    "resume CRC mismatch on page {page} \
                                     (expected {expected:08X}, got {crc:08X}); restarting"
                                );
                                self.store.clear()?;
                            }
                        }
                    }
                    self.store.save(&ResumeCheckpoint::read(page, crc))?;
                }
                Some(FrameCode::Complete) => break,
                Some(FrameCode::Error) => {
                    return Err(device_failure(&payload));
                }
                Some(FrameCode::PowerWarning) => {
                    warn!("device: {}", String::from_utf8_lossy(&payload));
                }
                Some(FrameCode::Model) | Some(FrameCode::ReadyForData) => {
                    debug!("stale frame 0x{code:02X} during read");
                }
                // The READ code doubles as the page-data carrier; unknown
                // codes are treated the same way for forward compatibility.
                _ => {
                    if self.config.enable_ecc && payload.len() >= chip.page_size as usize {
                        let main = &payload[..chip.page_size as usize];
                        let spare = &payload[chip.page_size as usize..payload.len().min(raw_page)];
                        let sectors = ecc::verify_page(main, spare, &ecc_config);
                        if !sectors.is_empty() {
                            warn!("ECC errors in received page {pages_received}: {sectors:?}");
                            self.ecc_findings.push(EccFinding {
                                page: pages_received,
                                sectors,
                            });
                        }
                    }
                    if pending_resume.is_some() && payload.len() % raw_page != 0 {
                        return Err(Error::ResumeMisaligned(format!(
                            "data frame of {} bytes is not a whole number of {raw_page}-byte pages",
                            payload.len()
                        )));
                    }
                    buffer.extend_from_slice(&payload);
                    pages_received += 1;
                }
            }
        }

        info!("read complete: {} bytes", buffer.len());
        if !self.config.include_oob {
            buffer = dump::strip_oob(&buffer, chip);
        }
        Ok(buffer)
    }

    /// Drop the already-transferred prefix once the checkpoint CRC matched.
    fn apply_resume_discard(
        &mut self,
        buffer: &mut Vec<u8>,
        last_page: u32,
        raw_page: usize,
    ) -> Result<()> {
        let discard = last_page as usize * raw_page;
        if buffer.len() < discard {
            return Err(Error::ResumeMisaligned(format!(
                "checkpoint covers {discard} bytes but only {} accumulated",
                buffer.len()
            )));
        }
        if buffer.len() % raw_page != 0 {
            return Err(Error::ResumeMisaligned(format!(
                "accumulated {} bytes do not align to {raw_page}-byte pages",
                buffer.len()
            )));
        }
        info!("resume validated; discarding {discard} leading bytes");
        buffer.drain(..discard);
        Ok(())
    }

    // ===== WRITE =====

    /// Stream `data` to the chip. The image must match the device's expected
    /// page shape (with OOB when `include_oob` is set).
    pub fn write(&mut self, data: &[u8], mut on_progress: impl FnMut(Progress)) -> Result<()> {
        if self.chip.is_none() {
            return Err(Error::ChipNotDetected);
        }
        self.cancel.reset();
        let include_oob = self.config.include_oob;

        if self.binary() {
            let flags = [include_oob as u8];
            self.link
                .send(&frame::encode(FrameCode::Write as u8, &flags))?;
        } else if include_oob {
            self.send_line(&Command::Write)?;
        } else {
            self.send_line(&Command::WriteNoOob)?;
        }

        self.await_ready_for_data()?;

        let chunk_size = self.config.chunk_size.max(1);
        let mut start = 0usize;
        if let Some(ResumeCheckpoint::Write {
            bytes_sent,
            chunk_crc32,
            ..
        }) = self.store.load()
        {
            start = bytes_sent as usize;
            if start > data.len() {
                start = 0;
            } else if start >= chunk_size {
                let previous = &data[start - chunk_size..start];
                if crc32_ieee(previous) != chunk_crc32 {
                    warn!("write resume CRC mismatch; restarting from zero");
                    self.store.clear()?;
                    start = 0;
                } else {
                    info!("resuming write at byte {start}");
                }
            }
        }

        let total = data.len().max(1);
        let mut offset = start;
        while offset < data.len() {
            if self.cancel.is_cancelled() {
                self.send_line(&Command::Cancel)?;
                return Err(Error::Cancelled);
            }
            let end = (offset + chunk_size).min(data.len());
            let chunk = &data[offset..end];
            if self.binary() {
                self.link
                    .send(&frame::encode(FrameCode::Write as u8, chunk))?;
            } else {
                self.link.send(chunk)?;
            }
            on_progress(Progress::new(
                ((end as u64 * 100) / total as u64) as u16,
                (offset / chunk_size) as u32,
            ));
            if offset % WRITE_CHECKPOINT_INTERVAL == 0 {
                self.store
                    .save(&ResumeCheckpoint::write(end as u64, crc32_ieee(chunk)))?;
            }
            offset = end;
        }

        self.await_completion(&mut on_progress, None)
    }

    fn await_ready_for_data(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.response_timeout();
        loop {
            let remaining = deadline
                .checked_duration_since(Instant::now())
                .ok_or(Error::Timeout)?;
            if self.binary() {
                let (code, payload) = self.reader.read_frame(&mut self.link, remaining)?;
                match FrameCode::from_u8(code) {
                    Some(FrameCode::ReadyForData) => return Ok(()),
                    Some(FrameCode::Error) => return Err(device_failure(&payload)),
                    _ => debug!("ignoring frame 0x{code:02X} before data phase"),
                }
            } else {
                let line = self.reader.read_line(&mut self.link, remaining)?;
                match Event::parse(&line) {
                    Event::ReadyForData => return Ok(()),
                    Event::OperationFailed | Event::NandNotConnected => {
                        return Err(Error::DeviceFailure(line));
                    }
                    other => debug!("ignoring {other:?} before data phase"),
                }
            }
        }
    }

    // ===== ERASE =====

    /// Erase the whole chip, checkpointing the last acknowledged block.
    pub fn erase(&mut self, mut on_progress: impl FnMut(Progress)) -> Result<()> {
        let chip = self.chip.ok_or(Error::ChipNotDetected)?;
        self.cancel.reset();
        self.send_operation(FrameCode::Erase, Command::Erase)?;
        let block_count = chip.block_count;
        self.await_completion(&mut on_progress, Some(block_count))
    }

    // ===== Shared completion loop =====

    /// Drain PROGRESS (checkpointing blocks when `erase_blocks` is set) until
    /// COMPLETE or a terminal error.
    fn await_completion(
        &mut self,
        on_progress: &mut impl FnMut(Progress),
        erase_blocks: Option<u32>,
    ) -> Result<()> {
        let mut last_activity = Instant::now();
        loop {
            if self.cancel.is_cancelled() {
                return self.cancel_handshake();
            }
            if self.binary() {
                let (code, payload) = match self.reader.read_frame(&mut self.link, POLL_SLICE) {
                    Ok(frame) => frame,
                    Err(Error::Timeout) => {
                        if last_activity.elapsed() > self.inactivity_window() {
                            return Err(Error::Timeout);
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                last_activity = Instant::now();
                match FrameCode::from_u8(code) {
                    Some(FrameCode::Progress) => {
                        let Some((percent, index)) = frame::parse_progress(&payload) else {
                            continue;
                        };
                        if let Some(blocks) = erase_blocks {
                            let block = index
                                .unwrap_or_else(|| approx_block(percent, blocks));
                            self.store.save(&ResumeCheckpoint::erase(block))?;
                        }
                        on_progress(Progress::new(percent, index.unwrap_or_default()));
                    }
                    Some(FrameCode::Complete) => return Ok(()),
                    Some(FrameCode::Error) => return Err(device_failure(&payload)),
                    Some(FrameCode::PowerWarning) => {
                        warn!("device: {}", String::from_utf8_lossy(&payload));
                    }
                    _ => debug!("ignoring frame 0x{code:02X} while awaiting completion"),
                }
            } else {
                let line = match self.reader.read_line(&mut self.link, POLL_SLICE) {
                    Ok(line) => line,
                    Err(Error::Timeout) => {
                        if last_activity.elapsed() > self.inactivity_window() {
                            return Err(Error::Timeout);
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                last_activity = Instant::now();
                match Event::parse(&line) {
                    Event::Progress(percent) => {
                        if let Some(blocks) = erase_blocks {
                            let block = approx_block(percent as u16, blocks);
                            self.store.save(&ResumeCheckpoint::erase(block))?;
                        }
                        on_progress(Progress::new(percent as u16, 0));
                    }
                    Event::OperationComplete => return Ok(()),
                    Event::OperationFailed | Event::NandNotConnected => {
                        return Err(Error::DeviceFailure(line));
                    }
                    Event::OperationCancelled => return Err(Error::Cancelled),
                    Event::PowerWarning(msg) => warn!("device: {msg}"),
                    other => debug!("ignoring {other:?} while awaiting completion"),
                }
            }
        }
    }

    /// Emit CANCEL and wait briefly for the device's terminal frame. The
    /// checkpoint survives for a later resume.
    fn cancel_handshake<T>(&mut self) -> Result<T> {
        info!("cancelling; resume state kept");
        self.send_line(&Command::Cancel)?;
        let deadline = Instant::now() + CANCEL_GRACE;
        while let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
            if self.binary() {
                match self.reader.read_frame(&mut self.link, remaining) {
                    Ok((code, _)) if FrameCode::from_u8(code) == Some(FrameCode::Error) => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            } else {
                match self.reader.read_line(&mut self.link, remaining) {
                    Ok(line) if Event::parse(&line) == Event::OperationCancelled => break,
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        }
        Err(Error::Cancelled)
    }
}

fn device_failure(payload: &[u8]) -> Error {
    let reason = String::from_utf8_lossy(payload).into_owned();
    if reason == "CANCELLED" {
        Error::Cancelled
    } else {
        Error::DeviceFailure(reason)
    }
}

/// Block estimate when PROGRESS carries no index (old firmware).
fn approx_block(percent: u16, blocks: u32) -> u32 {
    ((percent as u64 * blocks as u64) / 100) as u32
}
