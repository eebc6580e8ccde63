//! The renderer that runs inside the audio callback.
//!
//! [`TransportEngine`] is the [`MessageHandler`] of the transport exchange. It
//! owns the active [`PlayRequest`], applies [`Command`]s to the
//! [`TransportState`] and writes the selected channels of the document into
//! the device's [`OutputBuffer`].
//!
//! Nothing in here allocates, locks or logs once constructed.

use std::sync::Arc;

use rtrb::{Producer, PushError};

use crate::config::{EngineConfig, MAX_CHANNELS};
use crate::exchange::{Fault, FaultFlags, MessageHandler};
use crate::output::OutputBuffer;
use crate::transport::{Command, PlayRequest, TransportState};

pub struct TransportEngine {
    current: Option<PlayRequest>,
    /// Next frame to read from the document
    cursor: u64,
    /// Frame playback stops at (exclusive)
    stop_at: u64,
    scratch: Box<[f32]>,
    levels: [f32; MAX_CHANNELS],
    faults: Arc<FaultFlags>,
    /// Finished requests go back to a non-real-time thread to be dropped
    retired: Producer<PlayRequest>,
    /// Held when `retired` was full
    pending_retiree: Option<PlayRequest>,
}

impl TransportEngine {
    pub fn new(config: &EngineConfig, faults: Arc<FaultFlags>, retired: Producer<PlayRequest>) -> Self {
        Self {
            current: None,
            cursor: 0,
            stop_at: 0,
            scratch: vec![0.0; config.max_block_frames.max(1)].into_boxed_slice(),
            levels: [0.0; MAX_CHANNELS],
            faults,
            retired,
            pending_retiree: None,
        }
    }

    /// Render one callback's worth of audio into `output`.
    ///
    /// `output` is fully overwritten: with document samples while playing,
    /// with silence otherwise. The position advances by the frames actually
    /// written and playback stops in the same call when the stop point or the
    /// end of the data is reached.
    pub fn render<O: OutputBuffer + ?Sized>(&mut self, state: &mut TransportState, output: &mut O) {
        self.flush_retiree();
        output.silence_from(0);

        let channels = output.channels();
        if !state.is_playing || channels == 0 {
            return;
        }

        let Some(request) = self.current.as_ref() else {
            self.faults.raise(Fault::MissingSource);
            state.is_playing = false;
            return;
        };

        let frames = output.frames();
        let src_channels = request.document.channels().min(MAX_CHANNELS);
        let wanted = (self.stop_at.saturating_sub(self.cursor)).min(frames as u64) as usize;

        self.levels[..src_channels].fill(0.0);

        let mut written = 0;
        let mut exhausted = false;

        while written < wanted {
            let block = (wanted - written).min(self.scratch.len());
            let start = self.cursor + written as u64;
            // Frames every selected channel could deliver
            let mut delivered = block;

            for src in 0..src_channels {
                if !request.channels.contains(src) {
                    continue;
                }

                let scratch = &mut self.scratch[..block];
                let read = request.document.read(src, start, scratch).min(block);
                delivered = delivered.min(read);

                let peak = scratch[..read].iter().fold(0.0f32, |p, s| p.max(s.abs()));
                self.levels[src] = self.levels[src].max(peak);

                if src_channels == 1 {
                    // Mono documents are heard on every output channel
                    for out in 0..channels {
                        output.write_channel(out, written, &scratch[..read]);
                    }
                } else {
                    output.write_channel(src, written, &scratch[..read]);
                }
            }

            written += delivered;
            if delivered < block {
                exhausted = true;
                break;
            }
        }

        if exhausted {
            output.silence_from(written);
        }

        if let Some(meter) = request.meter.as_ref() {
            meter.feed_levels(&self.levels[..src_channels]);
        }

        self.cursor += written as u64;
        state.playback_position = to_position(self.cursor);

        if exhausted {
            self.faults.raise(Fault::SourceExhausted);
            self.finish(state);
        } else if self.cursor >= self.stop_at {
            self.finish(state);
        }
    }

    /// Whether a request is attached (for diagnostics).
    pub fn is_engaged(&self) -> bool {
        self.current.is_some()
    }

    fn start(&mut self, state: &mut TransportState, request: PlayRequest) {
        if state.is_playing {
            self.retire(request);
            return;
        }

        // `end` only counts for selections
        if request.selection_active && request.start > request.end {
            self.faults.raise(Fault::MalformedCommand);
            self.retire(request);
            return;
        }

        if !request.channels.selects_any_of(request.document.channels()) {
            self.faults.raise(Fault::ChannelSelection);
            self.retire(request);
            return;
        }

        let document_end = request.document.frames();
        if request.start > document_end {
            self.faults.raise(Fault::SourceExhausted);
            state.playback_position = to_position(document_end);
            self.retire(request);
            return;
        }

        let stop_at = if request.selection_active {
            request.end.min(document_end)
        } else {
            document_end
        };

        state.playback_position = to_position(request.start);
        if request.start >= stop_at {
            self.retire(request);
            return;
        }

        self.cursor = request.start;
        self.stop_at = stop_at;
        state.is_playing = true;
        if let Some(previous) = self.current.replace(request) {
            self.retire(previous);
        }
    }

    fn finish(&mut self, state: &mut TransportState) {
        state.is_playing = false;
        if let Some(request) = self.current.take() {
            self.retire(request);
        }
    }

    fn retire(&mut self, request: PlayRequest) {
        self.flush_retiree();
        if let Err(PushError::Full(request)) = self.retired.push(request) {
            if self.pending_retiree.is_none() {
                self.pending_retiree = Some(request);
            } else {
                self.faults.raise(Fault::RetireOverflow);
                drop(request);
            }
        }
    }

    fn flush_retiree(&mut self) {
        if let Some(request) = self.pending_retiree.take() {
            if let Err(PushError::Full(request)) = self.retired.push(request) {
                self.pending_retiree = Some(request);
            }
        }
    }
}

impl MessageHandler for TransportEngine {
    type State = TransportState;
    type Message = Command;

    fn apply_message(&mut self, state: &mut TransportState, message: Command) {
        match message {
            Command::Play(request) => self.start(state, request),
            Command::Stop => self.finish(state),
        }
    }
}

#[inline]
fn to_position(frame: u64) -> i64 {
    i64::try_from(frame).unwrap_or(i64::MAX)
}
