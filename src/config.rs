//! Engine and device-selection configuration.

use serde::{Deserialize, Serialize};

/// Largest callback the engine renders in one pass (frames).
///
/// Bigger callbacks are read from the document in blocks of this size within
/// one render pass, so this only bounds the scratch memory allocated when a
/// device opens.
pub const MAX_BLOCK_FRAMES: usize = 8192;

/// Highest channel count the engine can address. Channel selection is a `u64` mask.
pub const MAX_CHANNELS: usize = 64;

/// Default capacity of the command queue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

/// Preferred buffer size for the device stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the host choose
    #[default]
    Default,
    /// Request a specific size in frames (clamped to `64..=max_block_frames`)
    Fixed(u32),
}

/// Engine tuning. Everything is allocated up front from these numbers when a
/// device opens; nothing grows afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Commands that can be waiting for the audio thread at once.
    /// Posting beyond this is rejected, see [`PostError::Full`](crate::PostError::Full).
    pub command_capacity: usize,
    /// Slots for finished play requests travelling back to be dropped off the audio thread
    pub retire_capacity: usize,
    /// Scratch size of the renderer in frames
    pub max_block_frames: usize,
    pub buffer_size: BufferSize,
    /// Preferred sample rate; the device default is used if unsupported
    pub sample_rate: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command_capacity: DEFAULT_COMMAND_CAPACITY,
            retire_capacity: DEFAULT_COMMAND_CAPACITY,
            max_block_frames: MAX_BLOCK_FRAMES,
            buffer_size: BufferSize::Default,
            sample_rate: None,
        }
    }
}

impl EngineConfig {
    /// Buffer size to request from the host, if any.
    pub fn fixed_buffer_frames(&self) -> Option<u32> {
        match self.buffer_size {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => {
                let max = self.max_block_frames.max(64) as u32;
                Some(frames.clamp(64, max))
            }
        }
    }
}

/// Which host API and devices should be used the next time a device opens.
///
/// `None` means "unset": the host default is used for the output and no input
/// is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSelection {
    pub host: Option<usize>,
    pub output_device: Option<usize>,
    pub input_device: Option<usize>,
}

impl DeviceSelection {
    pub fn new(host: Option<usize>, output_device: Option<usize>, input_device: Option<usize>) -> Self {
        Self {
            host,
            output_device,
            input_device,
        }
    }

    /// Endpoints a device opened for this selection should use.
    pub fn endpoints(&self) -> Endpoints {
        Endpoints {
            input: self.input_device,
            output: self.output_device,
        }
    }
}

/// The input/output device pair of an open stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Endpoints {
    pub input: Option<usize>,
    pub output: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_buffer_is_clamped() {
        let mut config = EngineConfig::default();
        assert_eq!(config.fixed_buffer_frames(), None);

        config.buffer_size = BufferSize::Fixed(16);
        assert_eq!(config.fixed_buffer_frames(), Some(64));

        config.buffer_size = BufferSize::Fixed(1 << 20);
        assert_eq!(config.fixed_buffer_frames(), Some(MAX_BLOCK_FRAMES as u32));

        config.buffer_size = BufferSize::Fixed(256);
        assert_eq!(config.fixed_buffer_frames(), Some(256));
    }

    #[test]
    fn selection_maps_to_endpoints() {
        let selection = DeviceSelection::new(Some(1), Some(3), None);
        assert_eq!(
            selection.endpoints(),
            Endpoints {
                input: None,
                output: Some(3)
            }
        );
    }
}
