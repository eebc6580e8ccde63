//! The buffer a render callback writes into.
//!
//! Devices ask for different sample formats. The engine renders `f32` blocks
//! and writes them through [`OutputBuffer`], so one device callback is always
//! one render pass, whatever the format.

use dasp_sample::{FromSample, Sample};

/// Interleaved output of one callback.
pub trait OutputBuffer {
    fn channels(&self) -> usize;

    fn frames(&self) -> usize;

    /// Write consecutive frames of one channel, starting at frame `start`.
    ///
    /// Samples past the end of the buffer or a `channel` the buffer does not
    /// have are ignored.
    fn write_channel(&mut self, channel: usize, start: usize, samples: &[f32]);

    /// Silence every frame from `start` on.
    fn silence_from(&mut self, start: usize);
}

/// An interleaved slice of device samples.
pub struct Interleaved<'a, T> {
    samples: &'a mut [T],
    channels: usize,
}

impl<'a, T> Interleaved<'a, T> {
    pub fn new(samples: &'a mut [T], channels: usize) -> Self {
        Self { samples, channels }
    }
}

impl<T> OutputBuffer for Interleaved<'_, T>
where
    T: Sample + FromSample<f32>,
{
    #[inline]
    fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    fn write_channel(&mut self, channel: usize, start: usize, samples: &[f32]) {
        if channel >= self.channels {
            return;
        }
        let frames = self.samples.chunks_exact_mut(self.channels).skip(start);
        for (frame, &sample) in frames.zip(samples) {
            frame[channel] = T::from_sample_(sample);
        }
    }

    fn silence_from(&mut self, start: usize) {
        let from = (start * self.channels).min(self.samples.len());
        self.samples[from..].fill(T::EQUILIBRIUM);
    }
}
