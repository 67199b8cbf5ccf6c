//! Buffer descriptors and the audio buffer pool.
//!
//! A [`BufferHeader`] is owned by exactly one party at a time. While the
//! pipeline or its caller holds it, it is a plain Rust value; submitting it
//! to the hardware moves it away, and a refused submit moves it back inside
//! [`SubmitRejected`](crate::hardware::SubmitRejected).

mod history;
mod pool;

pub use history::{UsageHistory, HISTORY_LEN};
pub(crate) use pool::BufferPool;
pub use pool::SpareList;

use std::fmt;

use crate::clock::Ticks;

/// Flag bits carried by a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlags(u32);

impl BufferFlags {
    /// Last buffer of the stream.
    pub const EOS: Self = Self(0x0000_0001);
    /// Timestamp is the stream start time.
    pub const START_TIME: Self = Self(0x0000_0002);
    /// Decode but do not render.
    pub const DECODE_ONLY: Self = Self(0x0000_0004);
    /// Payload is known to be corrupt.
    pub const DATA_CORRUPT: Self = Self(0x0000_0008);
    /// Buffer ends a frame.
    pub const END_OF_FRAME: Self = Self(0x0000_0010);
    /// Buffer starts a sync frame.
    pub const SYNC_FRAME: Self = Self(0x0000_0020);
    /// Extra data follows the payload.
    pub const EXTRA_DATA: Self = Self(0x0000_0040);
    /// Payload is codec configuration.
    pub const CODEC_CONFIG: Self = Self(0x0000_0080);
    /// Timestamp is not valid.
    pub const TIME_UNKNOWN: Self = Self(0x0000_0100);
    /// Capture preview frame.
    pub const CAPTURE_PREVIEW: Self = Self(0x0000_0200);
    /// Buffer ends a NAL unit.
    pub const END_OF_NAL: Self = Self(0x0000_0400);
    /// Payload is a fragment list.
    pub const FRAGMENT_LIST: Self = Self(0x0000_0800);
    /// Discontinuity before this buffer.
    pub const DISCONTINUITY: Self = Self(0x0000_1000);
    /// Codec side information.
    pub const CODEC_SIDE_INFO: Self = Self(0x0000_2000);

    const NAMES: [(Self, &'static str); 14] = [
        (Self::EOS, "EOS"),
        (Self::START_TIME, "STARTTIME"),
        (Self::DECODE_ONLY, "DECODEONLY"),
        (Self::DATA_CORRUPT, "DATACORRUPT"),
        (Self::END_OF_FRAME, "ENDOFFRAME"),
        (Self::SYNC_FRAME, "SYNCFRAME"),
        (Self::EXTRA_DATA, "EXTRADATA"),
        (Self::CODEC_CONFIG, "CODECCONFIG"),
        (Self::TIME_UNKNOWN, "TIME_UNKNOWN"),
        (Self::CAPTURE_PREVIEW, "CAPTURE_PREV"),
        (Self::END_OF_NAL, "ENDOFNAL"),
        (Self::FRAGMENT_LIST, "FRAGMENTLIST"),
        (Self::DISCONTINUITY, "DISCONTINUITY"),
        (Self::CODEC_SIDE_INFO, "CODECSIDEINFO"),
    ];

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Sets the bits of `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the bits of `other`.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for BufferFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// An input buffer descriptor.
///
/// Created by the hardware when port buffers are enabled and handed out by
/// [`Hardware::get_input_buffer`](crate::hardware::Hardware::get_input_buffer).
/// The `next` link threads the descriptor into a [`SpareList`] without any
/// extra allocation.
#[derive(Debug)]
pub struct BufferHeader {
    id: u32,
    port: u32,
    data: Box<[u8]>,
    filled_len: u32,
    offset: u32,
    flags: BufferFlags,
    timestamp: Ticks,
    next: Option<Box<BufferHeader>>,
}

impl BufferHeader {
    /// Creates a descriptor with an `alloc_len` byte payload for `port`.
    pub fn new(id: u32, port: u32, alloc_len: usize) -> Self {
        Self {
            id,
            port,
            data: vec![0; alloc_len].into_boxed_slice(),
            filled_len: 0,
            offset: 0,
            flags: BufferFlags::empty(),
            timestamp: Ticks::default(),
            next: None,
        }
    }

    /// Hardware-assigned identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Port the buffer belongs to.
    pub fn port(&self) -> u32 {
        self.port
    }

    /// Payload capacity in bytes.
    pub fn alloc_len(&self) -> usize {
        self.data.len()
    }

    /// Bytes of valid payload.
    pub fn filled_len(&self) -> u32 {
        self.filled_len
    }

    /// Sets the number of valid payload bytes, clamped to the capacity.
    pub fn set_filled_len(&mut self, len: u32) {
        self.filled_len = len.min(u32::try_from(self.data.len()).unwrap_or(u32::MAX));
    }

    /// Start of valid payload.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Sets the payload start offset.
    pub fn set_offset(&mut self, offset: u32) {
        self.offset = offset;
    }

    /// Whole payload area.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whole payload area, writable.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Valid payload, `offset..offset + filled_len`.
    pub fn payload(&self) -> &[u8] {
        let start = (self.offset as usize).min(self.data.len());
        let end = (start + self.filled_len as usize).min(self.data.len());
        &self.data[start..end]
    }

    /// Copies as much of `bytes` as fits after the current payload and
    /// returns the number of bytes copied.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let start = (self.offset + self.filled_len) as usize;
        let room = self.data.len().saturating_sub(start);
        let n = room.min(bytes.len());
        self.data[start..start + n].copy_from_slice(&bytes[..n]);
        self.filled_len += n as u32;
        n
    }

    /// Flag bits.
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Flag bits, writable.
    pub fn flags_mut(&mut self) -> &mut BufferFlags {
        &mut self.flags
    }

    /// Presentation time in hardware ticks.
    pub fn timestamp(&self) -> Ticks {
        self.timestamp
    }

    /// Sets the presentation time.
    pub fn set_timestamp(&mut self, timestamp: Ticks) {
        self.timestamp = timestamp;
    }

    /// Clears payload bookkeeping and flags before reuse.
    pub(crate) fn reset(&mut self) {
        self.filled_len = 0;
        self.offset = 0;
        self.flags = BufferFlags::empty();
    }

    pub(crate) fn take_next(&mut self) -> Option<Box<BufferHeader>> {
        self.next.take()
    }

    pub(crate) fn set_next(&mut self, next: Option<Box<BufferHeader>>) {
        self.next = next;
    }
}

impl fmt::Display for BufferHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.payload();
        write!(
            f,
            "TS={:08x}{:08x}, LEN={:5}/{:5}: ",
            self.timestamp.high,
            self.timestamp.low,
            self.filled_len,
            self.data.len()
        )?;
        for byte in head.iter().take(4) {
            write!(f, "{byte:02x} ")?;
        }
        write!(f, "... FLAGS: {}", self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_insert_remove() {
        let mut flags = BufferFlags::empty();
        flags.insert(BufferFlags::START_TIME);
        flags.insert(BufferFlags::EOS);
        assert!(flags.contains(BufferFlags::START_TIME | BufferFlags::EOS));

        flags.remove(BufferFlags::START_TIME);
        assert!(!flags.contains(BufferFlags::START_TIME));
        assert_eq!(flags.bits(), 0x1);
    }

    #[test]
    fn test_flags_display() {
        let flags = BufferFlags::EOS | BufferFlags::TIME_UNKNOWN;
        assert_eq!(flags.to_string(), "EOS TIME_UNKNOWN");
        assert_eq!(BufferFlags::empty().to_string(), "");
    }

    #[test]
    fn test_append_stops_at_capacity() {
        let mut buf = BufferHeader::new(0, 100, 4);
        assert_eq!(buf.append(&[1, 2, 3]), 3);
        assert_eq!(buf.append(&[4, 5, 6]), 1);
        assert_eq!(buf.filled_len(), 4);
        assert_eq!(buf.payload(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_reset_clears_bookkeeping() {
        let mut buf = BufferHeader::new(0, 100, 16);
        buf.append(&[9; 8]);
        buf.set_offset(2);
        buf.flags_mut().insert(BufferFlags::START_TIME);

        buf.reset();
        assert_eq!(buf.filled_len(), 0);
        assert_eq!(buf.offset(), 0);
        assert!(buf.flags().is_empty());
    }

    #[test]
    fn test_set_filled_len_clamps() {
        let mut buf = BufferHeader::new(0, 100, 8);
        buf.set_filled_len(100);
        assert_eq!(buf.filled_len(), 8);
    }
}
