//! Byte-link abstraction over the serial transport.
//!
//! Both ends of the protocol are written against [`ByteLink`] so the same
//! engines run over a USB CDC endpoint, an in-memory duplex pair in tests, or
//! the built-in simulator session.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// A full-duplex byte stream with timeout-aware reads.
pub trait ByteLink: Send {
    /// Queue `data` for transmission. Blocks until accepted by the transport.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive up to `buf.len()` bytes, waiting at most `timeout` for the
    /// first byte. Returns 0 on timeout.
    fn recv_some(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Number of bytes that can be read without blocking, if the transport
    /// can tell. Used by the adapter to poll for control tokens between
    /// pages.
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }
}

impl ByteLink for Box<dyn ByteLink> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.as_mut().send(data)
    }

    fn recv_some(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.as_mut().recv_some(buf, timeout)
    }

    fn available(&mut self) -> Result<usize> {
        self.as_mut().available()
    }
}

/// Read exactly `buf.len()` bytes or fail with [`Error::Timeout`].
///
/// This is the primitive both protocol readers are built on.
pub fn read_exact<L: ByteLink + ?Sized>(
    link: &mut L,
    buf: &mut [u8],
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut filled = 0;
    while filled < buf.len() {
        let now = Instant::now();
        if now >= deadline {
            return Err(Error::Timeout);
        }
        let n = link.recv_some(&mut buf[filled..], deadline - now)?;
        filled += n;
        if n == 0 && Instant::now() >= deadline {
            return Err(Error::Timeout);
        }
    }
    Ok(())
}

struct PipeState {
    buf: VecDeque<u8>,
    closed: bool,
}

struct Pipe {
    state: Mutex<PipeState>,
    cond: Condvar,
}

impl Pipe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PipeState {
                buf: VecDeque::new(),
                closed: false,
            }),
            cond: Condvar::new(),
        })
    }

    fn push(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::LinkClosed);
        }
        state.buf.extend(data.iter().copied());
        self.cond.notify_all();
        Ok(())
    }

    fn pop_some(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock().unwrap();
        loop {
            if !state.buf.is_empty() {
                let n = buf.len().min(state.buf.len());
                for slot in buf.iter_mut().take(n) {
                    *slot = state.buf.pop_front().unwrap();
                }
                return Ok(n);
            }
            if state.closed {
                return Err(Error::LinkClosed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(0);
            }
            let (guard, _) = self.cond.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }

    fn len(&self) -> usize {
        self.state.lock().unwrap().buf.len()
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        self.cond.notify_all();
    }
}

/// In-process duplex link. [`MemoryLink::pair`] returns the two endpoints.
///
/// Dropping an endpoint closes both directions: the peer drains any buffered
/// bytes and then sees [`Error::LinkClosed`].
pub struct MemoryLink {
    tx: Arc<Pipe>,
    rx: Arc<Pipe>,
}

impl MemoryLink {
    /// Create a connected pair of endpoints.
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let a_to_b = Pipe::new();
        let b_to_a = Pipe::new();
        (
            MemoryLink {
                tx: a_to_b.clone(),
                rx: b_to_a.clone(),
            },
            MemoryLink {
                tx: b_to_a,
                rx: a_to_b,
            },
        )
    }
}

impl ByteLink for MemoryLink {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.tx.push(data)
    }

    fn recv_some(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        self.rx.pop_some(buf, timeout)
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.rx.len())
    }
}

impl Drop for MemoryLink {
    fn drop(&mut self) {
        self.tx.close();
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_link_roundtrip() {
        let (mut a, mut b) = MemoryLink::pair();
        a.send(b"hello").unwrap();

        let mut buf = [0u8; 5];
        read_exact(&mut b, &mut buf, Duration::from_millis(100)).unwrap();
        assert_eq!(&buf, b"hello");

        b.send(b"ok").unwrap();
        let mut buf = [0u8; 2];
        read_exact(&mut a, &mut buf, Duration::from_millis(100)).unwrap();
        assert_eq!(&buf, b"ok");
    }

    #[test]
    fn test_recv_times_out_on_silence() {
        let (_a, mut b) = MemoryLink::pair();
        let mut buf = [0u8; 4];
        let n = b
            .recv_some(&mut buf, Duration::from_millis(20))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_read_exact_timeout() {
        let (mut a, mut b) = MemoryLink::pair();
        a.send(b"ab").unwrap();
        let mut buf = [0u8; 4];
        let err = read_exact(&mut b, &mut buf, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[test]
    fn test_closed_peer_drains_then_errors() {
        let (a, mut b) = MemoryLink::pair();
        {
            let mut a = a;
            a.send(b"xy").unwrap();
        } // a dropped here

        let mut buf = [0u8; 2];
        read_exact(&mut b, &mut buf, Duration::from_millis(100)).unwrap();
        assert_eq!(&buf, b"xy");

        let err = b
            .recv_some(&mut buf, Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, Error::LinkClosed));
    }

    #[test]
    fn test_available_reports_buffered() {
        let (mut a, mut b) = MemoryLink::pair();
        assert_eq!(b.available().unwrap(), 0);
        a.send(&[1, 2, 3]).unwrap();
        assert_eq!(b.available().unwrap(), 3);
    }
}
