//! Backends that turn a render callback into sound.
//!
//! - [`CpalBackend`] - system audio through CPAL (requires the `cpal_backend` feature)
//! - [`OfflineBackend`] - driven by hand, for headless rendering and tests

#[cfg(feature = "cpal_backend")]
mod cpal_host;
mod offline;

#[cfg(feature = "cpal_backend")]
pub use cpal_host::{CpalBackend, CpalStream, DeviceInfo};
pub use offline::{OfflineBackend, OfflineStream};
