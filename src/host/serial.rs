//! USB CDC-ACM serial endpoint discovery and link.
//!
//! The adapter enumerates as a CDC serial device. Discovery walks the USB
//! bus and accepts the first device whose product string matches the
//! allow-list, or whatever the user named explicitly.

use std::collections::VecDeque;
use std::time::Duration;

use futures_lite::future::block_on;
use log::{debug, info};
use nusb::transfer::{ControlOut, ControlType, Recipient, RequestBuffer};

use crate::error::{Error, Result};
use crate::wire::link::ByteLink;

/// Substrings that identify a plausible adapter endpoint.
pub const PORT_NAME_HINTS: &[&str] = &["Pico", "Serial", "UART", "CDC"];

/// CDC data endpoints on the adapter.
const EP_OUT: u8 = 0x02;
const EP_IN: u8 = 0x82;
/// Communications interface (line coding target) and data interface.
const CDC_COMM_INTERFACE: u8 = 0;
const CDC_DATA_INTERFACE: u8 = 1;

/// CDC class requests.
mod request {
    pub const SET_LINE_CODING: u8 = 0x20;
    pub const SET_CONTROL_LINE_STATE: u8 = 0x22;
}

/// A CDC-ACM serial link to the adapter.
pub struct CdcAcmLink {
    #[allow(dead_code)]
    device: nusb::Device,
    comm: nusb::Interface,
    data: nusb::Interface,
    /// Bytes received beyond what the last read consumed.
    rx: VecDeque<u8>,
}

impl CdcAcmLink {
    /// Open `device` and configure the line for `baud_rate`.
    pub fn open(device: nusb::Device, baud_rate: u32) -> Result<Self> {
        let comm = device.claim_interface(CDC_COMM_INTERFACE)?;
        let data = device.claim_interface(CDC_DATA_INTERFACE)?;

        let mut link = Self {
            device,
            comm,
            data,
            rx: VecDeque::new(),
        };
        link.set_line_coding(baud_rate)?;
        link.set_control_lines(true, true)?;
        Ok(link)
    }

    /// SET_LINE_CODING: rate, 1 stop bit, no parity, 8 data bits.
    fn set_line_coding(&mut self, baud_rate: u32) -> Result<()> {
        debug!("configuring CDC line: {baud_rate} baud 8N1");
        let mut coding = [0u8; 7];
        coding[..4].copy_from_slice(&baud_rate.to_le_bytes());
        coding[4] = 0; // 1 stop bit
        coding[5] = 0; // no parity
        coding[6] = 8; // 8 data bits
        self.control_out(request::SET_LINE_CODING, 0, &coding)
    }

    /// SET_CONTROL_LINE_STATE: assert DTR/RTS so the adapter sees a host.
    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<()> {
        let value = (dtr as u16) | ((rts as u16) << 1);
        self.control_out(request::SET_CONTROL_LINE_STATE, value, &[])
    }

    fn control_out(&mut self, request: u8, value: u16, data: &[u8]) -> Result<()> {
        let result = block_on(self.comm.control_out(ControlOut {
            control_type: ControlType::Class,
            recipient: Recipient::Interface,
            request,
            value,
            index: CDC_COMM_INTERFACE as u16,
            data,
        }));
        result.status?;
        Ok(())
    }

    /// One bulk-in transfer bounded by `timeout`. Returns the bytes read
    /// (empty on timeout).
    fn bulk_in_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let read_future = self.data.bulk_in(EP_IN, RequestBuffer::new(512));
        let result = block_on(futures_lite::future::or(
            async { Some(read_future.await) },
            async {
                async_io::Timer::after(timeout).await;
                None
            },
        ));
        match result {
            Some(transfer) => Ok(transfer.into_result()?),
            None => Ok(Vec::new()),
        }
    }
}

impl ByteLink for CdcAcmLink {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let result = block_on(self.data.bulk_out(EP_OUT, data.to_vec()));
        result.status?;
        Ok(())
    }

    fn recv_some(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if self.rx.is_empty() {
            let data = self.bulk_in_timeout(timeout)?;
            self.rx.extend(data);
        }
        let n = buf.len().min(self.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().unwrap_or_default();
        }
        Ok(n)
    }

    fn available(&mut self) -> Result<usize> {
        if self.rx.is_empty() {
            // Opportunistic zero-ish-wait poll of the endpoint.
            let data = self.bulk_in_timeout(Duration::from_millis(1))?;
            self.rx.extend(data);
        }
        Ok(self.rx.len())
    }
}

/// Find and open an adapter endpoint.
///
/// With `preferred` set, only devices whose product or serial string contains
/// it (case-insensitive) are considered; otherwise the first device matching
/// the [`PORT_NAME_HINTS`] allow-list wins.
pub fn discover(preferred: Option<&str>, baud_rate: u32) -> Result<CdcAcmLink> {
    let devices: Vec<_> = nusb::list_devices()?.collect();
    debug!("scanning {} USB devices for an adapter...", devices.len());

    let matches_name = |info: &nusb::DeviceInfo| {
        let product = info.product_string().unwrap_or_default();
        let serial = info.serial_number().unwrap_or_default();
        match preferred {
            Some(wanted) => {
                let wanted = wanted.to_lowercase();
                product.to_lowercase().contains(&wanted)
                    || serial.to_lowercase().contains(&wanted)
            }
            None => PORT_NAME_HINTS.iter().any(|hint| product.contains(hint)),
        }
    };

    for info in &devices {
        if !matches_name(info) {
            continue;
        }
        info!(
            "using {} ({:04X}:{:04X})",
            info.product_string().unwrap_or("<unnamed>"),
            info.vendor_id(),
            info.product_id()
        );
        let device = info
            .open()
            .map_err(|e| Error::Io(std::io::Error::other(format!("open failed: {e}"))))?;
        return CdcAcmLink::open(device, baud_rate);
    }

    Err(Error::AdapterNotFound)
}
