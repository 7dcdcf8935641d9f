//! Wire protocol shared by the host and the adapter.
//!
//! Two transports ride the same serial link: the framed binary protocol
//! ([`frame`]) and the legacy newline-oriented protocol ([`line`]). A session
//! is binary when its first two inbound bytes are the frame magic, legacy
//! otherwise. Both are built on the [`link::ByteLink`] abstraction.

pub mod crc;
pub mod frame;
pub mod line;
pub mod link;
