//! Shared download buffer and the streaming sink responses are written into

use crate::error::FetchError;

/// The one scratch buffer every download streams into.
///
/// `capacity` is the tracked limit, not `Vec::capacity`: the allocator may
/// hand out more, but a sink never accepts more than `capacity` bytes.
#[derive(Debug)]
pub struct DownloadBuffer {
    data: Vec<u8>,
    capacity: usize,
    max_capacity: usize,
}

impl DownloadBuffer {
    /// Allocate the buffer up front. A capacity above `max_capacity` is clamped.
    pub fn with_capacity(capacity: usize, max_capacity: usize) -> Result<Self, FetchError> {
        let capacity = capacity.min(max_capacity);
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| FetchError::AllocationFailure { requested: capacity })?;
        Ok(Self {
            data,
            capacity,
            max_capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Start a fresh transfer. Previous contents are discarded.
    pub fn sink(&mut self) -> BufferSink<'_> {
        self.data.clear();
        BufferSink {
            buf: &mut self.data,
            capacity: self.capacity,
            overflowed: false,
        }
    }

    /// Enlarge to `new_capacity`. Returns `Ok(false)` when already that large;
    /// capacity never shrinks.
    pub fn grow_to(&mut self, new_capacity: usize) -> Result<bool, FetchError> {
        if new_capacity <= self.capacity {
            return Ok(false);
        }
        if new_capacity > self.max_capacity {
            return Err(FetchError::AllocationFailure {
                requested: new_capacity,
            });
        }

        self.data.clear();
        self.data
            .try_reserve_exact(new_capacity)
            .map_err(|_| FetchError::AllocationFailure {
                requested: new_capacity,
            })?;
        self.capacity = new_capacity;
        Ok(true)
    }
}

/// Write side of a single transfer into the [`DownloadBuffer`].
///
/// Once a write would pass the capacity the sink keeps what fits, flags
/// itself overflowed and refuses everything after that.
#[derive(Debug)]
pub struct BufferSink<'a> {
    buf: &'a mut Vec<u8>,
    capacity: usize,
    overflowed: bool,
}

impl BufferSink<'_> {
    /// Returns the number of bytes accepted.
    pub fn write(&mut self, chunk: &[u8]) -> usize {
        if self.overflowed {
            return 0;
        }

        let room = self.capacity - self.buf.len();
        let accepted = if chunk.len() > room {
            self.overflowed = true;
            room
        } else {
            chunk.len()
        };

        self.buf.extend_from_slice(&chunk[..accepted]);
        accepted
    }

    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf
    }
}

/// Capacity to grow to after an overflow: the next multiple of `block`
/// strictly above `current`, or large enough for `needed` when the server
/// announced a bigger body.
pub fn next_capacity(current: usize, block: usize, needed: Option<usize>) -> usize {
    let block = block.max(1);
    let floor = current.max(needed.unwrap_or(0).saturating_sub(1));
    (floor / block)
        .saturating_add(1)
        .saturating_mul(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: usize = 128 * 1024;

    #[test]
    fn test_sink_accepts_until_capacity() {
        let mut buffer = DownloadBuffer::with_capacity(8, 1024).unwrap();
        let mut sink = buffer.sink();

        assert_eq!(sink.write(b"OK"), 2);
        assert_eq!(sink.write(b"abc"), 3);
        assert!(!sink.is_overflowed());
        assert_eq!(sink.as_slice(), b"OKabc");
    }

    #[test]
    fn test_sink_flags_overflow_and_keeps_prefix() {
        let mut buffer = DownloadBuffer::with_capacity(4, 1024).unwrap();
        let mut sink = buffer.sink();

        assert_eq!(sink.write(b"abc"), 3);
        assert_eq!(sink.write(b"defg"), 1);
        assert!(sink.is_overflowed());
        assert_eq!(sink.write(b"h"), 0);
        assert_eq!(sink.as_slice(), b"abcd");
    }

    #[test]
    fn test_new_sink_resets_state() {
        let mut buffer = DownloadBuffer::with_capacity(2, 1024).unwrap();
        {
            let mut sink = buffer.sink();
            sink.write(b"xyz");
            assert!(sink.is_overflowed());
        }
        let sink = buffer.sink();
        assert!(!sink.is_overflowed());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_grow_is_monotonic() {
        let mut buffer = DownloadBuffer::with_capacity(4096, 1024 * 1024).unwrap();
        assert!(buffer.grow_to(BLOCK).unwrap());
        assert_eq!(buffer.capacity(), BLOCK);
        assert!(!buffer.grow_to(4096).unwrap());
        assert_eq!(buffer.capacity(), BLOCK);
    }

    #[test]
    fn test_grow_past_max_is_allocation_failure() {
        let mut buffer = DownloadBuffer::with_capacity(4096, BLOCK).unwrap();
        let err = buffer.grow_to(2 * BLOCK).unwrap_err();
        assert!(matches!(err, FetchError::AllocationFailure { requested } if requested == 2 * BLOCK));
        assert_eq!(buffer.capacity(), 4096);
    }

    #[test]
    fn test_initial_capacity_clamped_to_max() {
        let buffer = DownloadBuffer::with_capacity(10_000, 4096).unwrap();
        assert_eq!(buffer.capacity(), 4096);
    }

    #[test]
    fn test_next_capacity_rounds_to_block() {
        assert_eq!(next_capacity(4096, BLOCK, None), BLOCK);
        assert_eq!(next_capacity(BLOCK, BLOCK, None), 2 * BLOCK);
        assert_eq!(next_capacity(4096, BLOCK, Some(5000)), BLOCK);
        assert_eq!(next_capacity(4096, BLOCK, Some(2 * BLOCK)), 2 * BLOCK);
        assert_eq!(next_capacity(4096, BLOCK, Some(2 * BLOCK + 1)), 3 * BLOCK);
    }
}
