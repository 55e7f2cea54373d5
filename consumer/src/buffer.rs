/// Headroom added on every growth so slightly larger frames do not reallocate.
pub const GROWTH_INCREMENT: usize = 1 << 16;

/// Worker-owned copy of the latest frame.
///
/// Nothing is allocated until the first frame arrives. Capacity only grows,
/// to `frame_len + GROWTH_INCREMENT`, and is released when the buffer drops.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
    len: usize,
    growths: u32,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of times the buffer had to grow.
    pub fn growths(&self) -> u32 {
        self.growths
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Copy `frame` in, growing first if it does not fit.
    pub fn fill(&mut self, frame: &[u8]) -> Result<(), BufferError> {
        if frame.len() > self.capacity() {
            self.grow(frame.len() + GROWTH_INCREMENT)?;
        }
        self.data[..frame.len()].copy_from_slice(frame);
        self.len = frame.len();
        Ok(())
    }

    fn grow(&mut self, new_capacity: usize) -> Result<(), BufferError> {
        let additional = new_capacity - self.data.len();
        self.data
            .try_reserve_exact(additional)
            .map_err(|_| BufferError::Alloc {
                requested: new_capacity,
            })?;
        self.data.resize(new_capacity, 0);
        self.growths += 1;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("not enough memory to grow frame buffer to {requested} bytes")]
    Alloc { requested: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unallocated() {
        let buffer = FrameBuffer::new();
        assert_eq!(buffer.capacity(), 0);
        assert_eq!(buffer.growths(), 0);
        assert!(buffer.as_slice().is_empty());
    }

    #[test]
    fn first_frame_grows_with_headroom() {
        let mut buffer = FrameBuffer::new();
        buffer.fill(&[7; 1000]).unwrap();
        assert_eq!(buffer.capacity(), 1000 + GROWTH_INCREMENT);
        assert_eq!(buffer.growths(), 1);
        assert_eq!(buffer.as_slice(), &[7u8; 1000][..]);
    }

    #[test]
    fn frames_within_capacity_do_not_grow() {
        let mut buffer = FrameBuffer::new();
        buffer.fill(&[1; 5000]).unwrap();
        let capacity = buffer.capacity();

        for len in [10, 5000, 5000 + GROWTH_INCREMENT, 0, 4321] {
            buffer.fill(&vec![2; len]).unwrap();
            assert_eq!(buffer.capacity(), capacity);
            assert_eq!(buffer.as_slice().len(), len);
        }
        assert_eq!(buffer.growths(), 1);
    }

    #[test]
    fn larger_frame_grows_again_and_never_shrinks() {
        let mut buffer = FrameBuffer::new();
        buffer.fill(&[1; 100]).unwrap();
        let big = vec![3; 100 + GROWTH_INCREMENT + 1];
        buffer.fill(&big).unwrap();
        assert_eq!(buffer.capacity(), big.len() + GROWTH_INCREMENT);
        assert_eq!(buffer.growths(), 2);

        buffer.fill(&[4; 8]).unwrap();
        assert_eq!(buffer.capacity(), big.len() + GROWTH_INCREMENT);
        assert_eq!(buffer.as_slice(), &[4u8; 8][..]);
    }
}
