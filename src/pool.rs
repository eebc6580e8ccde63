//! Ownership of the live output device and the device selection.
//!
//! [`DevicePool`] is constructed once by the application and passed to
//! whoever needs audio. It keeps at most one output [`AudioDevice`] alive and
//! remembers which devices *should* be used.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::config::{DeviceSelection, EngineConfig};
use crate::device::{AudioBackend, AudioDevice};
use crate::error::DeviceResult;

pub struct DevicePool<B: AudioBackend + Clone> {
    backend: B,
    config: EngineConfig,
    selection: Mutex<DeviceSelection>,
    output: Mutex<Option<Arc<AudioDevice<B>>>>,
}

impl<B: AudioBackend + Clone> DevicePool<B> {
    /// A pool with nothing selected (host defaults).
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self::with_selection(backend, config, DeviceSelection::default())
    }

    pub fn with_selection(backend: B, config: EngineConfig, selection: DeviceSelection) -> Self {
        Self {
            backend,
            config,
            selection: Mutex::new(selection),
            output: Mutex::new(None),
        }
    }

    /// The output device, opened on first use.
    ///
    /// An open device is returned as is, even if the selection changed since
    /// it was opened. Otherwise a device is created and opened for the current
    /// selection.
    pub fn get_output_device(&self) -> DeviceResult<Arc<AudioDevice<B>>> {
        let mut output = lock(&self.output);

        if let Some(device) = output.as_ref() {
            if device.is_open() {
                return Ok(Arc::clone(device));
            }
        }

        let selection = self.get_device_selection();
        let device = AudioDevice::new(self.backend.clone(), selection.host, self.config.clone());
        device.open_device(selection.input_device, selection.output_device)?;
        debug!(?selection, "output device created");

        let device = Arc::new(device);
        *output = Some(Arc::clone(&device));
        Ok(device)
    }

    /// The output device if one has been created, without opening anything.
    pub fn current_output_device(&self) -> Option<Arc<AudioDevice<B>>> {
        lock(&self.output).clone()
    }

    /// Close the output device and let go of it. Other holders keep a closed device.
    ///
    /// The device is released even if closing reports an error.
    pub fn close_output_device(&self) -> DeviceResult<()> {
        match lock(&self.output).take() {
            Some(device) => device.close_device(),
            None => Ok(()),
        }
    }

    pub fn get_device_selection(&self) -> DeviceSelection {
        *lock(&self.selection)
    }

    /// Remember a new selection for the next time a device opens.
    ///
    /// Returns `false` if it equals the current selection, in which case
    /// nothing happens. An already open device is not reconfigured.
    pub fn set_device_selection(&self, selection: DeviceSelection) -> bool {
        let mut current = lock(&self.selection);
        if *current == selection {
            return false;
        }
        info!(from = ?*current, to = ?selection, "device selection changed");
        *current = selection;
        true
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
