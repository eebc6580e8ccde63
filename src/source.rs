//! The document and level-meter interfaces the engine reads from and feeds.
//!
//! Both traits are called on the audio thread: implementations must not
//! block, allocate or panic.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Read-only sample access to a document.
pub trait SampleSource: Send + Sync {
    fn channels(&self) -> usize;

    /// Length in frames
    fn frames(&self) -> u64;

    /// Copy samples of `channel` starting at frame `start` into `out`.
    ///
    /// Returns how many frames were written, which is less than `out.len()`
    /// only at the end of the data.
    fn read(&self, channel: usize, start: u64, out: &mut [f32]) -> usize;
}

/// Receives per-buffer level measurements, one value per document channel.
pub trait LevelMeter: Send + Sync {
    fn feed_levels(&self, levels: &[f32]);
}

/// A document held in memory, one buffer per channel.
///
/// For streaming large files, a [`SampleSource`] backed by a cache filled from
/// a loader thread is the better fit.
pub struct PcmDocument {
    channels: Vec<Box<[f32]>>,
    frames: u64,
    sample_rate: u32,
}

impl PcmDocument {
    /// Create a document from per-channel samples. The shortest channel sets the length.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0) as u64;
        Self {
            channels: channels.into_iter().map(Vec::into_boxed_slice).collect(),
            frames,
            sample_rate,
        }
    }

    /// Create a document from interleaved samples
    pub fn from_interleaved(samples: &[f32], channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let planar = (0..channels)
            .map(|ch| samples.iter().skip(ch).step_by(channels).copied().collect())
            .collect();
        Self::from_channels(planar, sample_rate)
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.frames as f64 / self.sample_rate.max(1) as f64
    }
}

impl SampleSource for PcmDocument {
    fn channels(&self) -> usize {
        self.channels.len()
    }

    fn frames(&self) -> u64 {
        self.frames
    }

    fn read(&self, channel: usize, start: u64, out: &mut [f32]) -> usize {
        let Some(data) = self.channels.get(channel) else {
            return 0;
        };
        if start >= self.frames {
            return 0;
        }
        let start = start as usize;
        let available = (self.frames as usize - start).min(out.len());
        out[..available].copy_from_slice(&data[start..start + available]);
        available
    }
}

/// A [`LevelMeter`] that keeps the latest peak of each channel in atomics.
///
/// The UI polls [`levels`](Self::levels) at its own pace.
pub struct PeakMeter {
    levels: Box<[AtomicU32]>,
    feeds: AtomicU64,
}

impl PeakMeter {
    pub fn new(channels: usize) -> Self {
        Self {
            levels: (0..channels).map(|_| AtomicU32::new(0)).collect(),
            feeds: AtomicU64::new(0),
        }
    }

    /// Latest peak of `channel`, 0.0 if the channel does not exist
    pub fn level(&self, channel: usize) -> f32 {
        self.levels
            .get(channel)
            .map_or(0.0, |l| f32::from_bits(l.load(Ordering::Relaxed)))
    }

    pub fn levels(&self) -> Vec<f32> {
        (0..self.levels.len()).map(|ch| self.level(ch)).collect()
    }

    /// Number of buffers measured so far
    pub fn feed_count(&self) -> u64 {
        self.feeds.load(Ordering::Relaxed)
    }
}

impl LevelMeter for PeakMeter {
    fn feed_levels(&self, levels: &[f32]) {
        for (slot, level) in self.levels.iter().zip(levels) {
            slot.store(level.to_bits(), Ordering::Relaxed);
        }
        self.feeds.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_document_is_split_per_channel() {
        let doc = PcmDocument::from_interleaved(&[0.1, -0.1, 0.2, -0.2, 0.3, -0.3], 2, 48000);
        assert_eq!(doc.channels(), 2);
        assert_eq!(doc.frames(), 3);

        let mut out = [0.0; 4];
        assert_eq!(doc.read(1, 1, &mut out), 2);
        assert_eq!(&out[..2], &[-0.2, -0.3]);
        assert_eq!(doc.read(2, 0, &mut out), 0);
        assert_eq!(doc.read(0, 3, &mut out), 0);
    }

    #[test]
    fn peak_meter_keeps_latest_levels() {
        let meter = PeakMeter::new(2);
        meter.feed_levels(&[0.5, 0.25, 1.0]);
        assert_eq!(meter.levels(), vec![0.5, 0.25]);
        assert_eq!(meter.level(7), 0.0);
        assert_eq!(meter.feed_count(), 1);
    }
}
