//! Real-time transport for waveform editors.
//!
//! A UI thread tells the audio thread what to play and reads back what it is
//! doing, without either side waiting on the other:
//!
//! - Commands ([`Command::Play`], [`Command::Stop`]) travel through a bounded
//!   lock-free queue and are applied at the start of the next audio callback.
//! - The resulting [`TransportState`] is published once per callback through a
//!   triple buffer; readers get a [`TransportView`] of one complete publication.
//! - No locks, allocation or logging on the audio thread.
//!
//! The generic machinery lives in [`exchange`]. [`AudioDevice`] binds it to a
//! stream, and [`DevicePool`] owns the output device and the device selection.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tonband::{CpalBackend, DevicePool, EngineConfig, PcmDocument, PlayRequest};
//!
//! let pool = DevicePool::new(CpalBackend, EngineConfig::default());
//! let device = pool.get_output_device().expect("no audio device");
//!
//! let tone: Vec<f32> = (0..48000).map(|i| (i as f32 * 0.05).sin() * 0.2).collect();
//! let document = Arc::new(PcmDocument::from_channels(vec![tone], 48000));
//!
//! device.play(PlayRequest::from_position(document, 0)).ok();
//! ```

pub mod backend;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod output;
pub mod pool;
pub mod source;
pub mod transport;

#[cfg(feature = "cpal_backend")]
pub use backend::{CpalBackend, DeviceInfo};
pub use backend::OfflineBackend;
pub use config::{BufferSize, DeviceSelection, EngineConfig, Endpoints};
pub use device::{AudioBackend, AudioDevice, RenderFn, StreamFormat};
pub use engine::TransportEngine;
pub use error::{DeviceError, DeviceResult, PostError};
pub use exchange::{Fault, FaultFlags, FaultSet, MessageHandler, RealtimeSide, StateExchange};
pub use output::{Interleaved, OutputBuffer};
pub use pool::DevicePool;
pub use source::{LevelMeter, PcmDocument, PeakMeter, SampleSource};
pub use transport::{ChannelMask, Command, PlayRequest, TransportState, TransportView};
