// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use serde::Deserialize;

use super::error::ConfigError;

const DEFAULT_SAMPLE_RATE: u32 = 96000;
const DEFAULT_CHANNELS: u16 = 2;
const MAX_CHANNELS: u16 = 32;
const SUPPORTED_SAMPLE_RATES: [u32; 9] = [
    8000, 16000, 22050, 44100, 48000, 88200, 96000, 176400, 192000,
];

/// A YAML representation of the capture configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct Audio {
    /// The capture device. "default" is the system default input.
    device: String,

    /// Capture sample rate in Hz (default: 96000)
    sample_rate: Option<u32>,

    /// Number of channels to capture (default: 2)
    channels: Option<u16>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            channels: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the sample rate if it's one that can be captured at.
    pub fn sample_rate(&self) -> Result<u32, ConfigError> {
        let rate = self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
        if !SUPPORTED_SAMPLE_RATES.contains(&rate) {
            return Err(ConfigError::invalid(format!(
                "unsupported sample rate {}, expected one of {:?}",
                rate, SUPPORTED_SAMPLE_RATES
            )));
        }
        Ok(rate)
    }

    pub fn channels(&self) -> Result<u16, ConfigError> {
        let channels = self.channels.unwrap_or(DEFAULT_CHANNELS);
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(ConfigError::invalid(format!(
                "channels must be between 1 and {}, got {}",
                MAX_CHANNELS, channels
            )));
        }
        Ok(channels)
    }
}
