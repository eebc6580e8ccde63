//! Transport state, its read-only view, and the commands that change it.

use core::fmt;
use std::sync::Arc;

use crate::config::MAX_CHANNELS;
use crate::source::{LevelMeter, SampleSource};

/// Position value meaning "not positioned".
pub const UNPOSITIONED: i64 = -1;

/// What the audio thread is doing right now.
///
/// Owned and mutated by the audio thread only. Everyone else gets a
/// [`TransportView`] over a published copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportState {
    pub is_playing: bool,
    /// Next frame to be played, or [`UNPOSITIONED`]
    pub playback_position: i64,
    pub is_recording: bool,
    pub recording_position: i64,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            is_playing: false,
            playback_position: UNPOSITIONED,
            is_recording: false,
            recording_position: UNPOSITIONED,
        }
    }
}

/// Read-only snapshot of a published [`TransportState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportView {
    state: TransportState,
}

impl TransportView {
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.state.is_recording
    }

    #[inline]
    pub fn playback_position(&self) -> i64 {
        self.state.playback_position
    }

    #[inline]
    pub fn recording_position(&self) -> i64 {
        self.state.recording_position
    }
}

impl From<&TransportState> for TransportView {
    fn from(state: &TransportState) -> Self {
        Self { state: *state }
    }
}

/// Which channels of a document are audible. Bit `n` selects channel `n`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelMask(u64);

impl ChannelMask {
    pub const ALL: ChannelMask = ChannelMask(u64::MAX);
    pub const NONE: ChannelMask = ChannelMask(0);

    pub fn only(channel: usize) -> Self {
        Self::NONE.with(channel)
    }

    /// Add `channel` to the mask. Channels at or past [`MAX_CHANNELS`] are ignored.
    pub fn with(self, channel: usize) -> Self {
        if channel < MAX_CHANNELS {
            ChannelMask(self.0 | (1 << channel))
        } else {
            self
        }
    }

    #[inline]
    pub fn contains(&self, channel: usize) -> bool {
        channel < MAX_CHANNELS && self.0 & (1 << channel) != 0
    }

    /// Whether any of the first `channels` channels is selected.
    pub fn selects_any_of(&self, channels: usize) -> bool {
        let channels = channels.min(MAX_CHANNELS);
        if channels == MAX_CHANNELS {
            self.0 != 0
        } else {
            self.0 & ((1 << channels) - 1) != 0
        }
    }

    #[inline]
    pub fn bits(&self) -> u64 {
        self.0
    }
}

impl Default for ChannelMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<usize> for ChannelMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, ChannelMask::with)
    }
}

impl fmt::Debug for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMask({:#x})", self.0)
    }
}

/// Everything the audio thread needs to play part of a document.
///
/// `document` and `meter` are shared handles onto objects owned elsewhere; the
/// engine only borrows them for as long as the request is being processed and
/// hands them back to a non-real-time thread to be released.
#[derive(Clone)]
pub struct PlayRequest {
    pub document: Arc<dyn SampleSource>,
    /// First frame to play
    pub start: u64,
    /// Frame to stop at (exclusive). Only honored when `selection_active` is set.
    pub end: u64,
    /// Stop at `end` instead of running to the end of the document
    pub selection_active: bool,
    pub channels: ChannelMask,
    pub meter: Option<Arc<dyn LevelMeter>>,
}

impl PlayRequest {
    /// Play the selection `start..end` on every channel.
    pub fn new(document: Arc<dyn SampleSource>, start: u64, end: u64) -> Self {
        Self {
            document,
            start,
            end,
            selection_active: true,
            channels: ChannelMask::ALL,
            meter: None,
        }
    }

    /// Play from `start` to the end of the document.
    pub fn from_position(document: Arc<dyn SampleSource>, start: u64) -> Self {
        let end = document.frames();
        Self {
            selection_active: false,
            ..Self::new(document, start, end)
        }
    }

    pub fn with_channels(mut self, channels: ChannelMask) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_meter(mut self, meter: Arc<dyn LevelMeter>) -> Self {
        self.meter = Some(meter);
        self
    }
}

impl fmt::Debug for PlayRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayRequest")
            .field("document_channels", &self.document.channels())
            .field("document_frames", &self.document.frames())
            .field("start", &self.start)
            .field("end", &self.end)
            .field("selection_active", &self.selection_active)
            .field("channels", &self.channels)
            .field("meter", &self.meter.is_some())
            .finish()
    }
}

/// Commands accepted by the audio thread.
#[derive(Clone, Debug)]
pub enum Command {
    /// Start playing, unless already playing
    Play(PlayRequest),
    /// Stop playing and keep the current position
    Stop,
}
