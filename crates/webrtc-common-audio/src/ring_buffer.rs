//! Sample ring buffer with a movable read cursor.
//!
//! Used by the echo cancellers to hold the far-end signal between the
//! render and capture paths. Far-end audio arrives in 10 ms frames,
//! possibly resampled to a varying length by drift compensation, and is
//! consumed one block per near-end block. The read cursor can be moved in
//! either direction to realign the reference with the reported delay.
//!
//! C++ source: `webrtc/common_audio/ring_buffer.c`

/// Fixed-capacity ring of samples.
///
/// Writes that do not fit overwrite the oldest unread samples: a stalled
/// capture path must never stall the render path.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    data: Vec<f32>,
    read_pos: usize,
    /// Samples between the read cursor and the write position.
    unread: usize,
    write_pos: usize,
}

impl RingBuffer {
    /// Create an empty buffer holding up to `capacity` samples (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)],
            read_pos: 0,
            unread: 0,
            write_pos: 0,
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.read_pos = 0;
        self.unread = 0;
        self.write_pos = 0;
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Samples that can be read before the buffer runs dry.
    pub fn available_read(&self) -> usize {
        self.unread
    }

    /// Append samples, dropping the oldest unread ones on overflow.
    /// Returns the number of samples dropped.
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let cap = self.capacity();
        let samples = if samples.len() > cap {
            &samples[samples.len() - cap..]
        } else {
            samples
        };
        for &s in samples {
            self.data[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % cap;
        }
        let total = self.unread + samples.len();
        let dropped = total.saturating_sub(cap);
        if dropped > 0 {
            self.read_pos = (self.read_pos + dropped) % cap;
        }
        self.unread = total.min(cap);
        dropped
    }

    /// Fill `block` from the read cursor. Missing samples are zero-filled;
    /// returns `false` if the buffer underran.
    pub fn read_block(&mut self, block: &mut [f32]) -> bool {
        let cap = self.capacity();
        let count = self.unread.min(block.len());
        for (i, b) in block.iter_mut().enumerate() {
            *b = if i < count {
                self.data[(self.read_pos + i) % cap]
            } else {
                0.0
            };
        }
        self.read_pos = (self.read_pos + count) % cap;
        self.unread -= count;
        count == block.len()
    }

    /// Move the read cursor by `offset` samples: positive skips unread
    /// samples, negative re-exposes already read ones. Clamped to what the
    /// buffer holds; returns the applied offset.
    pub fn move_read_ptr(&mut self, offset: isize) -> isize {
        let cap = self.capacity() as isize;
        let readable = self.unread as isize;
        let rewindable = cap - readable;
        let applied = offset.clamp(-rewindable, readable);
        self.read_pos = (self.read_pos as isize + applied).rem_euclid(cap) as usize;
        self.unread = (readable - applied) as usize;
        applied
    }
}
