#![allow(dead_code)]

use std::sync::Arc;

use tonband::{AudioDevice, EngineConfig, OfflineBackend, PcmDocument, SampleSource};

pub const LEFT: f32 = 0.25;
pub const RIGHT: f32 = -0.5;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A stereo document holding `LEFT` on channel 0 and `RIGHT` on channel 1.
pub fn stereo_document(frames: usize) -> Arc<PcmDocument> {
    Arc::new(PcmDocument::from_channels(
        vec![vec![LEFT; frames], vec![RIGHT; frames]],
        48000,
    ))
}

/// A mono document whose sample at frame `n` is `(n + 1) / 100_000`.
pub fn mono_ramp(frames: usize) -> Arc<PcmDocument> {
    let ramp = (0..frames).map(|n| (n + 1) as f32 / 100_000.0).collect();
    Arc::new(PcmDocument::from_channels(vec![ramp], 48000))
}

/// An open stereo device on a fresh offline backend.
pub fn open_device(config: EngineConfig) -> (OfflineBackend, AudioDevice<OfflineBackend>) {
    init_tracing();
    let backend = OfflineBackend::new(48000, 2);
    let device = AudioDevice::new(backend.clone(), None, config);
    device.open_device(None, None).expect("offline device opens");
    (backend, device)
}

/// Claims `claimed` frames but only has `actual`.
pub struct TruncatedSource {
    pub claimed: u64,
    pub actual: usize,
}

impl SampleSource for TruncatedSource {
    fn channels(&self) -> usize {
        1
    }

    fn frames(&self) -> u64 {
        self.claimed
    }

    fn read(&self, _channel: usize, start: u64, out: &mut [f32]) -> usize {
        let start = start as usize;
        if start >= self.actual {
            return 0;
        }
        let n = (self.actual - start).min(out.len());
        out[..n].fill(0.5);
        n
    }
}

/// Frame `n` of an interleaved stereo buffer.
pub fn frame(buffer: &[f32], n: usize) -> (f32, f32) {
    (buffer[n * 2], buffer[n * 2 + 1])
}
