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
use std::{path::PathBuf, time::Duration};

use serde::Deserialize;

use super::{duration_ms, error::ConfigError};
use crate::{
    export::{Exporter, RawExporter, WavExporter},
    recorder,
};

const DEFAULT_DIRECTORY: &str = "output";
const DEFAULT_THRESHOLD: u32 = 256;
const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(30);
const RAW_FILE_NAME: &str = "capture.raw";

/// A YAML representation of what happens to the captured audio.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Output {
    /// Whether to capture at all (default: true)
    enabled: Option<bool>,

    /// Where exported files go (default: output)
    directory: Option<String>,

    /// Sample magnitude that counts as signal when trimming clips (default: 256)
    threshold: Option<u32>,

    /// Extra capture time on top of the schedule (default: 30s)
    safety_margin: Option<String>,

    /// Write a WAV file per note (default: true)
    wav: Option<bool>,

    /// Dump the whole capture as raw samples (default: false)
    debug: Option<bool>,
}

impl Output {
    pub fn directory(&self) -> PathBuf {
        PathBuf::from(self.directory.as_deref().unwrap_or(DEFAULT_DIRECTORY))
    }

    /// Converts the configuration into output settings, including its exporters.
    pub fn to_output(&self) -> Result<recorder::Output, ConfigError> {
        let directory = self.directory();
        let mut exporters: Vec<Box<dyn Exporter>> = Vec::new();
        if self.debug.unwrap_or(false) {
            exporters.push(Box::new(RawExporter::new(directory.join(RAW_FILE_NAME))));
        }
        if self.wav.unwrap_or(true) {
            exporters.push(Box::new(WavExporter::new(directory)));
        }

        Ok(recorder::Output {
            enabled: self.enabled.unwrap_or(true),
            threshold: self.threshold.unwrap_or(DEFAULT_THRESHOLD),
            safety_margin_ms: duration_ms(
                "safety_margin",
                self.safety_margin.as_deref(),
                DEFAULT_SAFETY_MARGIN,
            )?,
            exporters,
        })
    }
}
