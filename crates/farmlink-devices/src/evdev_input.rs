//! evdev-backed scanner input (Linux only).

use async_trait::async_trait;
use evdev::{Device, EventStream, EventType, Key};
use tracing::{debug, info, warn};

use farmlink_core::keymap::DIGIT_CODES;
use farmlink_core::KeyEvent;

use crate::error::{DeviceError, DeviceResult};
use crate::input::{select_scanner, CaptureMode, DeviceCandidate, KeySource, ScannerOpener, ScannerSettings};

/// Key events from one `/dev/input/event*` node.
pub struct EvdevKeySource {
    path: String,
    stream: EventStream,
}

#[async_trait]
impl KeySource for EvdevKeySource {
    async fn next_event(&mut self) -> DeviceResult<KeyEvent> {
        loop {
            let event = self.stream.next_event().await?;
            if event.event_type() == EventType::KEY {
                return Ok(KeyEvent::from_raw(event.code(), event.value()));
            }
        }
    }

    fn path(&self) -> &str {
        &self.path
    }
}

/// Opens the scanner through the Linux input subsystem.
#[derive(Debug, Clone)]
pub struct EvdevScannerOpener {
    settings: ScannerSettings,
}

impl EvdevScannerOpener {
    pub fn new(settings: ScannerSettings) -> Self {
        EvdevScannerOpener { settings }
    }

    /// Lists every readable input device.
    pub fn enumerate() -> Vec<DeviceCandidate> {
        evdev::enumerate()
            .map(|(path, device)| DeviceCandidate {
                path: path.display().to_string(),
                name: device.name().unwrap_or("unknown").to_string(),
                has_digit_keys: has_digit_keys(&device),
            })
            .collect()
    }

    fn discover(&self) -> DeviceResult<String> {
        let candidates = Self::enumerate();
        debug!(count = candidates.len(), "Enumerated input devices");

        select_scanner(&candidates, &self.settings)
            .map(|c| {
                info!(path = %c.path, name = %c.name, "Scanner found");
                c.path.clone()
            })
            .ok_or_else(|| DeviceError::NotFound(format!("no input device matching '{}'", self.settings.name_filter)))
    }

    fn open_path(&self, path: &str) -> DeviceResult<EvdevKeySource> {
        let mut device = Device::open(path).map_err(|e| DeviceError::open_failed(path, e))?;

        if !has_digit_keys(&device) {
            return Err(DeviceError::open_failed(path, "device has no digit keys"));
        }

        if self.settings.capture == CaptureMode::Exclusive {
            // Shared capture still works, so a refused grab is not fatal
            if let Err(e) = device.grab() {
                let err = DeviceError::GrabFailed {
                    path: path.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Continuing with shared capture");
            }
        }

        let stream = device
            .into_event_stream()
            .map_err(|e| DeviceError::open_failed(path, e))?;

        info!(%path, capture = ?self.settings.capture, "Scanner opened");
        Ok(EvdevKeySource {
            path: path.to_string(),
            stream,
        })
    }
}

#[async_trait]
impl ScannerOpener for EvdevScannerOpener {
    type Source = EvdevKeySource;

    async fn open(&self, hint: Option<&str>) -> DeviceResult<EvdevKeySource> {
        let path = match hint {
            Some(path) => path.to_string(),
            None => self.discover()?,
        };
        self.open_path(&path)
    }
}

fn has_digit_keys(device: &Device) -> bool {
    device
        .supported_keys()
        .map(|keys| DIGIT_CODES.clone().all(|code| keys.contains(Key::new(code))))
        .unwrap_or(false)
}
