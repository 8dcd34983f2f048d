use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SampleFormat, SampleRate, SupportedStreamConfig};
use log::{debug, warn};
use std::collections::HashMap;

use crate::error::AudioError;

/// Rates probed against each device's supported ranges
pub const STANDARD_SAMPLE_RATES: [u32; 8] = [44100, 48000, 88200, 96000, 176400, 192000, 352800, 384000];

/// Information about an audio device's capabilities
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub name: String,
    pub supported_sample_rates: Vec<u32>,
    pub sample_formats: Vec<SampleFormat>,
    pub max_channels: u16,
    pub default_config: SupportedStreamConfig,
}

/// Manages output device enumeration and selection.
///
/// Devices are identified by their cpal name, which doubles as the device UID
/// exposed by the player.
pub struct DeviceManager {
    host: Host,
    devices: HashMap<String, Device>,
    current_device: Option<Device>,
    device_capabilities: HashMap<String, DeviceCapabilities>,
}

impl DeviceManager {
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let mut manager = DeviceManager {
            host,
            devices: HashMap::new(),
            current_device: None,
            device_capabilities: HashMap::new(),
        };

        manager.refresh_devices()?;
        Ok(manager)
    }

    /// Re-enumerate output devices. Devices whose capabilities cannot be read are skipped.
    pub fn refresh_devices(&mut self) -> Result<(), AudioError> {
        self.devices.clear();
        self.device_capabilities.clear();

        let devices = self
            .host
            .output_devices()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to enumerate devices: {}", e)))?;

        for device in devices {
            let Ok(device_name) = device.name() else {
                continue;
            };

            match Self::probe_capabilities(&device, &device_name) {
                Ok(capabilities) => {
                    self.device_capabilities.insert(device_name.clone(), capabilities);
                    self.devices.insert(device_name, device);
                }
                Err(e) => warn!("Skipping output device '{}': {}", device_name, e),
            }
        }

        debug!("Found {} output device(s)", self.devices.len());
        Ok(())
    }

    /// Names of all available output devices, sorted
    pub fn list_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = self.devices.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get_capabilities(&self, device_name: &str) -> Option<&DeviceCapabilities> {
        self.device_capabilities.get(device_name)
    }

    pub fn default_device_name(&self) -> Option<String> {
        self.host.default_output_device().and_then(|device| device.name().ok())
    }

    /// Look up a device by name without selecting it
    pub fn find_device(&self, device_name: &str) -> Result<Device, AudioError> {
        self.devices
            .get(device_name)
            .cloned()
            .ok_or_else(|| AudioError::DeviceNotFound {
                device: device_name.to_string(),
            })
    }

    /// Select a device by name, or the default device for `None`
    pub fn select_device(&mut self, device_name: Option<&str>) -> Result<(), AudioError> {
        match device_name {
            Some(name) => {
                self.current_device = Some(self.find_device(name)?);
                Ok(())
            }
            None => self.select_default_device(),
        }
    }

    pub fn select_default_device(&mut self) -> Result<(), AudioError> {
        let default_device = self
            .host
            .default_output_device()
            .ok_or_else(|| AudioError::InitializationFailed("No default output device available".to_string()))?;

        self.current_device = Some(default_device);
        Ok(())
    }

    pub fn current_device(&self) -> Option<&Device> {
        self.current_device.as_ref()
    }

    /// Stream configuration for `device` closest to the preferred rate and channel count.
    ///
    /// Prefers an f32 configuration at exactly `preferred_rate`; otherwise falls back
    /// to the device default.
    pub fn best_config(
        device: &Device,
        preferred_rate: Option<u32>,
        preferred_channels: Option<u16>,
    ) -> Result<SupportedStreamConfig, AudioError> {
        let default_config = device
            .default_output_config()
            .map_err(|e| AudioError::InitializationFailed(format!("Failed to get default config: {}", e)))?;

        let rate = preferred_rate.unwrap_or(default_config.sample_rate().0);
        let channels = preferred_channels.unwrap_or(default_config.channels());

        let ranges = match device.supported_output_configs() {
            Ok(ranges) => ranges.collect::<Vec<_>>(),
            Err(e) => {
                debug!("Cannot query supported configs, using default: {}", e);
                return Ok(default_config);
            }
        };

        let candidates = ranges.into_iter().filter(|range| {
            range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0
        });

        let best = candidates
            .map(|range| {
                let score = (range.channels() == channels) as u8 * 2
                    + (range.sample_format() == SampleFormat::F32) as u8;
                (score, range)
            })
            .max_by_key(|(score, _)| *score)
            .map(|(_, range)| range.with_sample_rate(SampleRate(rate)));

        match best {
            Some(config) => Ok(config),
            None if preferred_rate.is_some() => Err(AudioError::UnsupportedSampleRate { rate }),
            None => Ok(default_config),
        }
    }

    fn probe_capabilities(device: &Device, device_name: &str) -> Result<DeviceCapabilities, AudioError> {
        let default_config = device.default_output_config().map_err(|e| {
            AudioError::InitializationFailed(format!("Failed to get default config for {}: {}", device_name, e))
        })?;

        let supported_configs = device.supported_output_configs().map_err(|e| {
            AudioError::InitializationFailed(format!("Failed to get supported configs for {}: {}", device_name, e))
        })?;

        let mut sample_rates = Vec::new();
        let mut sample_formats = Vec::new();
        let mut max_channels = 0;

        for config_range in supported_configs {
            for rate in standard_rates_in(config_range.min_sample_rate().0, config_range.max_sample_rate().0) {
                if !sample_rates.contains(&rate) {
                    sample_rates.push(rate);
                }
            }

            let sample_format = config_range.sample_format();
            if !sample_formats.contains(&sample_format) {
                sample_formats.push(sample_format);
            }

            max_channels = max_channels.max(config_range.channels());
        }

        sample_rates.sort_unstable();

        let default_rate = default_config.sample_rate().0;
        if !sample_rates.contains(&default_rate) {
            sample_rates.push(default_rate);
            sample_rates.sort_unstable();
        }
        if sample_formats.is_empty() {
            sample_formats.push(default_config.sample_format());
        }
        if max_channels == 0 {
            max_channels = default_config.channels();
        }

        Ok(DeviceCapabilities {
            name: device_name.to_string(),
            supported_sample_rates: sample_rates,
            sample_formats,
            max_channels,
            default_config,
        })
    }
}

/// Standard rates inside an inclusive range
pub fn standard_rates_in(min_rate: u32, max_rate: u32) -> impl Iterator<Item = u32> {
    STANDARD_SAMPLE_RATES
        .into_iter()
        .filter(move |rate| (min_rate..=max_rate).contains(rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_rates_in_range() {
        let rates: Vec<u32> = standard_rates_in(44100, 96000).collect();
        assert_eq!(rates, vec![44100, 48000, 88200, 96000]);

        assert_eq!(standard_rates_in(8000, 22050).count(), 0);
        assert_eq!(standard_rates_in(48000, 48000).collect::<Vec<_>>(), vec![48000]);
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_device_enumeration() {
        let manager = DeviceManager::new().unwrap();
        for device_name in manager.list_devices() {
            assert!(!device_name.is_empty());
            let capabilities = manager.get_capabilities(&device_name).unwrap();
            assert!(capabilities.max_channels > 0);
            assert!(!capabilities.supported_sample_rates.is_empty());
        }
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_default_device_selection() {
        let mut manager = DeviceManager::new().unwrap();
        manager.select_default_device().unwrap();
        assert!(manager.current_device().and_then(|device| device.name().ok()).is_some());
    }

    #[test]
    #[ignore] // Requires audio hardware
    fn test_best_config_defaults_to_device_default() {
        let mut manager = DeviceManager::new().unwrap();
        manager.select_default_device().unwrap();
        let device = manager.current_device().unwrap();

        let default_rate = device.default_output_config().unwrap().sample_rate().0;
        let config = DeviceManager::best_config(device, None, None).unwrap();
        assert_eq!(config.sample_rate().0, default_rate);
    }

    #[test]
    fn test_invalid_device_selection() {
        let Ok(mut manager) = DeviceManager::new() else {
            return;
        };
        let result = manager.select_device(Some("NonExistentDevice"));

        match result {
            Err(AudioError::DeviceNotFound { device }) => assert_eq!(device, "NonExistentDevice"),
            other => panic!("Expected DeviceNotFound error, got {:?}", other.err()),
        }
        assert!(manager.get_capabilities("NonExistentDevice").is_none());
    }
}
