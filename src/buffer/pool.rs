//! Input buffer pool with spare-list recycling.

use crate::buffer::{BufferFlags, BufferHeader, UsageHistory};
use crate::clock::{pts_to_ticks, INVALID_PTS};
use crate::component::{ComponentRegistry, ComponentRole};

/// Free list of descriptors whose submit failed.
///
/// Singly linked through each descriptor's own `next` field; push and pop
/// are O(1).
#[derive(Debug, Default)]
pub struct SpareList {
    head: Option<Box<BufferHeader>>,
    len: usize,
}

impl SpareList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spare descriptors.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Pushes `buffer` onto the front.
    pub fn push(&mut self, buffer: BufferHeader) {
        let mut node = Box::new(buffer);
        node.set_next(self.head.take());
        self.head = Some(node);
        self.len += 1;
    }

    /// Pops the most recently pushed descriptor.
    pub fn pop(&mut self) -> Option<BufferHeader> {
        let mut node = self.head.take()?;
        self.head = node.take_next();
        self.len -= 1;
        Some(*node)
    }

    /// Empties the list, most recent first.
    pub fn drain(&mut self) -> Vec<BufferHeader> {
        let mut out = Vec::with_capacity(self.len);
        while let Some(buffer) = self.pop() {
            out.push(buffer);
        }
        out
    }
}

impl Drop for SpareList {
    fn drop(&mut self) {
        // Unlink iteratively so a long list cannot overflow the stack.
        while self.pop().is_some() {}
    }
}

/// Buffers of one input port: spare list, outstanding counter and usage
/// history, plus the one-shot start-time flag.
///
/// Every descriptor of the port is accounted for by exactly one of the
/// outstanding counter (held by the pipeline's caller), the spare list, or
/// the hardware.
#[derive(Debug)]
pub(crate) struct BufferPool {
    role: ComponentRole,
    port: u32,
    capacity: u32,
    spares: SpareList,
    usage: UsageHistory,
    start_time_pending: bool,
}

impl BufferPool {
    pub fn new(role: ComponentRole, port: u32, capacity: u32) -> Self {
        Self {
            role,
            port,
            capacity,
            spares: SpareList::new(),
            usage: UsageHistory::new(),
            start_time_pending: false,
        }
    }

    pub fn role(&self) -> ComponentRole {
        self.role
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn outstanding(&self) -> u32 {
        self.usage.outstanding()
    }

    pub fn spare_count(&self) -> usize {
        self.spares.len()
    }

    pub fn start_time_pending(&self) -> bool {
        self.start_time_pending
    }

    /// Marks the next acquired buffer with a valid timestamp as the stream
    /// start.
    pub fn arm_start_time(&mut self) {
        self.start_time_pending = true;
    }

    /// Takes a buffer for `pts`, preferring the spare list.
    pub fn acquire(&mut self, components: &ComponentRegistry, pts: i64) -> Option<BufferHeader> {
        let mut buffer = match self.spares.pop() {
            Some(buffer) => buffer,
            None => {
                let buffer = components.input_buffer(self.role, self.port)?;
                self.usage.increment();
                buffer
            }
        };

        buffer.reset();
        if pts == INVALID_PTS {
            buffer.flags_mut().insert(BufferFlags::TIME_UNKNOWN);
        } else if self.start_time_pending {
            buffer.flags_mut().insert(BufferFlags::START_TIME);
            self.start_time_pending = false;
        }
        // The sentinel is converted too; hardware ignores it under TIME_UNKNOWN.
        buffer.set_timestamp(pts_to_ticks(pts));
        Some(buffer)
    }

    /// Submits `buffer` to the hardware. A refused buffer goes to the spare
    /// list with the start-time flag restored and `false` is returned.
    pub fn release(&mut self, components: &ComponentRegistry, buffer: BufferHeader) -> bool {
        tracing::trace!(role = %self.role, %buffer, "submitting buffer");

        match components.empty_buffer(self.role, buffer) {
            Ok(()) => true,
            Err(rejected) => {
                tracing::error!(role = %self.role, error = %rejected.error, "failed to empty buffer");
                let mut buffer = rejected.buffer;
                if buffer.flags().contains(BufferFlags::START_TIME) {
                    self.start_time_pending = true;
                }
                buffer.set_filled_len(0);
                self.spares.push(buffer);
                false
            }
        }
    }

    /// The hardware finished with one buffer.
    pub fn buffer_emptied(&mut self) {
        self.usage.decrement();
    }

    pub fn tick(&mut self) {
        self.usage.tick();
    }

    /// Windowed occupancy, `0..=100`.
    pub fn usage_percent(&self) -> u32 {
        self.usage.usage_percent(self.capacity)
    }

    /// Starts a fresh accounting period with `capacity` buffers.
    pub fn reset(&mut self, capacity: u32) {
        self.capacity = capacity;
        self.usage.reset();
    }

    /// Removes every spare descriptor so it can be handed back to the
    /// hardware.
    pub fn drain_spares(&mut self) -> Vec<BufferHeader> {
        self.spares.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::test_registry;
    use crate::hardware::mock::{HardwareCall, MockHardware};
    use std::sync::Arc;

    const PORT: u32 = 100;

    fn setup(buffers: u32) -> (Arc<MockHardware>, ComponentRegistry, BufferPool) {
        let mock = Arc::new(MockHardware::new());
        mock.set_port_buffers(ComponentRole::AudioRender, PORT, buffers, 64);
        let mut reg = test_registry(&mock);
        reg.create(ComponentRole::AudioRender, true).unwrap();
        reg.enable_port_buffers(ComponentRole::AudioRender, PORT).unwrap();
        let pool = BufferPool::new(ComponentRole::AudioRender, PORT, buffers);
        (mock, reg, pool)
    }

    fn fetches(mock: &MockHardware) -> usize {
        mock.count(|c| matches!(c, HardwareCall::GetInputBuffer { .. }))
    }

    #[test]
    fn test_spare_list_is_lifo() {
        let mut spares = SpareList::new();
        spares.push(BufferHeader::new(1, PORT, 8));
        spares.push(BufferHeader::new(2, PORT, 8));
        assert_eq!(spares.len(), 2);

        assert_eq!(spares.pop().map(|b| b.id()), Some(2));
        assert_eq!(spares.pop().map(|b| b.id()), Some(1));
        assert!(spares.pop().is_none());
        assert!(spares.is_empty());
    }

    #[test]
    fn test_acquire_from_hardware_counts_once() {
        let (mock, reg, mut pool) = setup(4);

        let buf = pool.acquire(&reg, 9000).unwrap();
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(fetches(&mock), 1);
        assert_eq!(buf.timestamp(), pts_to_ticks(9000));
        assert!(buf.flags().is_empty());
    }

    #[test]
    fn test_acquire_returns_none_when_exhausted() {
        let (_mock, reg, mut pool) = setup(1);

        let _held = pool.acquire(&reg, 0).unwrap();
        assert!(pool.acquire(&reg, 0).is_none());
        assert_eq!(pool.outstanding(), 1);
    }

    #[test]
    fn test_failed_release_recycles_buffer() {
        let (mock, reg, mut pool) = setup(4);

        let mut buf = pool.acquire(&reg, 1000).unwrap();
        let id = buf.id();
        buf.append(&[1, 2, 3]);
        assert_eq!(pool.outstanding(), 1);

        mock.fail_next_empty(1);
        assert!(!pool.release(&reg, buf));
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(pool.spare_count(), 1);

        let again = pool.acquire(&reg, 2000).unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(again.filled_len(), 0);
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(fetches(&mock), 1);
    }

    #[test]
    fn test_start_time_consumed_once() {
        let (_mock, reg, mut pool) = setup(4);
        pool.arm_start_time();

        let first = pool.acquire(&reg, 0).unwrap();
        let second = pool.acquire(&reg, 100).unwrap();
        assert!(first.flags().contains(BufferFlags::START_TIME));
        assert!(!second.flags().contains(BufferFlags::START_TIME));
        assert!(!pool.start_time_pending());
    }

    #[test]
    fn test_invalid_pts_does_not_consume_start_time() {
        let (_mock, reg, mut pool) = setup(4);
        pool.arm_start_time();

        let buf = pool.acquire(&reg, INVALID_PTS).unwrap();
        assert!(buf.flags().contains(BufferFlags::TIME_UNKNOWN));
        assert!(!buf.flags().contains(BufferFlags::START_TIME));
        assert_eq!(buf.timestamp().to_i64(), -11);
        assert!(pool.start_time_pending());
    }

    #[test]
    fn test_failed_release_restores_start_time() {
        let (mock, reg, mut pool) = setup(4);
        pool.arm_start_time();

        let buf = pool.acquire(&reg, 0).unwrap();
        assert!(!pool.start_time_pending());

        mock.fail_next_empty(1);
        assert!(!pool.release(&reg, buf));
        assert!(pool.start_time_pending());

        let buf = pool.acquire(&reg, 0).unwrap();
        assert!(buf.flags().contains(BufferFlags::START_TIME));
    }

    #[test]
    fn test_successful_release_leaves_counter() {
        let (mock, reg, mut pool) = setup(4);

        let buf = pool.acquire(&reg, 0).unwrap();
        assert!(pool.release(&reg, buf));
        assert_eq!(pool.outstanding(), 1);

        mock.complete_buffers(ComponentRole::AudioRender);
        pool.buffer_emptied();
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_drain_spares_returns_everything() {
        let (mock, reg, mut pool) = setup(4);
        mock.fail_next_empty(2);

        let a = pool.acquire(&reg, 0).unwrap();
        let b = pool.acquire(&reg, 0).unwrap();
        pool.release(&reg, a);
        pool.release(&reg, b);

        let spares = pool.drain_spares();
        assert_eq!(spares.len(), 2);
        assert_eq!(pool.spare_count(), 0);
    }

    #[test]
    fn test_usage_percent_tracks_ticks() {
        let (_mock, reg, mut pool) = setup(4);

        let _a = pool.acquire(&reg, 0).unwrap();
        let _b = pool.acquire(&reg, 0).unwrap();
        for _ in 0..crate::buffer::HISTORY_LEN {
            pool.tick();
        }
        assert_eq!(pool.usage_percent(), 50);

        pool.reset(4);
        assert_eq!(pool.usage_percent(), 0);
        assert_eq!(pool.outstanding(), 0);
    }
}
