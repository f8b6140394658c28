/// The frame size limit of IEEE 802.15.4. (`aMaxPhyPacketSize`)
pub const MAX_FRAME_SIZE: usize = 127;

/// Fixed capacity storage for the one frame, that is currently being (re)transmitted.
#[derive(Clone, Debug)]
pub struct FrameBuffer<const N: usize = MAX_FRAME_SIZE> {
    buffer: [u8; N],
    length: usize,
}
impl<const N: usize> FrameBuffer<N> {
    pub const CAPACITY: usize = N;

    pub const fn new() -> Self {
        Self {
            buffer: [0u8; N],
            length: 0,
        }
    }
    /// Copy `data` into the buffer starting at `offset`.
    ///
    /// The length of the frame becomes `offset + data.len()`. Bytes before `offset` keep their
    /// previous contents, which allows writing a header and a payload separately.
    /// Returns `false` without touching the buffer, if the frame wouldn't fit.
    pub fn write(&mut self, data: &[u8], offset: usize) -> bool {
        let Some(end) = offset.checked_add(data.len()).filter(|end| *end <= N) else {
            return false;
        };
        self.buffer[offset..end].copy_from_slice(data);
        self.length = end;
        true
    }
    /// The valid part of the buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer[..self.length]
    }
    pub const fn len(&self) -> usize {
        self.length
    }
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }
}
impl<const N: usize> Default for FrameBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
