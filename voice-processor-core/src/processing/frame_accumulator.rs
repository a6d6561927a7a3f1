/// Reassembles variable-length sample chunks into fixed-length frames.
///
/// A resampler with a non-integer rate ratio produces a different number of
/// samples on every call. `FrameAccumulator` holds the partial frame between
/// calls and emits a frame each time it fills up, never dropping or
/// duplicating a sample.
///
/// Invariant: `write_offset < frame_length` between calls.
#[derive(Debug)]
pub struct FrameAccumulator<T> {
    frame_length: usize,
    carry: Vec<T>,
    write_offset: usize,
}

impl<T: Copy + Default> FrameAccumulator<T> {
    /// Create an accumulator for frames of `frame_length` samples (minimum 1).
    pub fn new(frame_length: usize) -> Self {
        let frame_length = frame_length.max(1);
        Self {
            frame_length,
            carry: vec![T::default(); frame_length],
            write_offset: 0,
        }
    }

    /// Feed a chunk, calling `emit` once per completed frame, in order.
    ///
    /// Returns the number of frames emitted.
    pub fn push<F>(&mut self, chunk: &[T], mut emit: F) -> usize
    where
        F: FnMut(Vec<T>),
    {
        let mut emitted = 0;
        let mut rest = chunk;

        while !rest.is_empty() {
            let to_copy = rest.len().min(self.frame_length - self.write_offset);
            self.carry[self.write_offset..self.write_offset + to_copy]
                .copy_from_slice(&rest[..to_copy]);
            self.write_offset += to_copy;
            rest = &rest[to_copy..];

            if self.write_offset == self.frame_length {
                let frame = std::mem::replace(&mut self.carry, vec![T::default(); self.frame_length]);
                self.write_offset = 0;
                emit(frame);
                emitted += 1;
            }
        }
        emitted
    }

    /// Discard any partially filled frame.
    pub fn reset(&mut self) {
        self.write_offset = 0;
    }

    /// Samples waiting in the partial frame.
    pub fn pending(&self) -> usize {
        self.write_offset
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }
}
