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
use std::{error::Error, path::Path};

use config::{Config, File};
use serde::Deserialize;

use super::{
    audio::Audio, error::ConfigError, instrument::Instrument, output::Output, playback::Playback,
};
use crate::recorder;

/// The configuration for a recording run.
#[derive(Deserialize, Clone, Debug)]
pub struct Recorder {
    /// Where audio is captured from.
    audio: Audio,

    /// The notes to play.
    #[serde(default)]
    playback: Playback,

    /// What to do with the capture.
    #[serde(default)]
    output: Output,

    /// Whether to program instruments before playback (default: true)
    program: Option<bool>,

    #[serde(default)]
    instruments: Vec<Instrument>,
}

impl Recorder {
    /// Parse a recorder configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Recorder, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Recorder>()?)
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    /// Checks every value without touching any hardware.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings()?;
        for instrument in self.instruments.iter() {
            instrument.validate()?;
        }
        Ok(())
    }

    /// Converts the configuration into recorder settings.
    pub fn settings(&self) -> Result<recorder::Settings, ConfigError> {
        Ok(recorder::Settings {
            program: self.program.unwrap_or(true),
            channels: self.audio.channels()?,
            rate: self.audio.sample_rate()?,
            playback: self.playback.to_playback()?,
            output: self.output.to_output()?,
        })
    }

    /// Connects to every instrument's MIDI device.
    pub fn instruments(&self) -> Result<Vec<recorder::Instrument>, Box<dyn Error>> {
        self.instruments
            .iter()
            .map(|instrument| instrument.to_instrument())
            .collect()
    }

    /// Builds every instrument without connecting to anything.
    pub fn offline_instruments(&self) -> Result<Vec<recorder::Instrument>, ConfigError> {
        self.instruments
            .iter()
            .map(|instrument| instrument.to_offline_instrument())
            .collect()
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    const CONFIG: &str = r#"
audio:
  device: mock-capture
  sample_rate: 48000
  channels: 1
playback:
  min_note: C4
  max_note: D4
  on: 1s
  off: 500ms
  quiet: 100ms
output:
  directory: samples
  threshold: 300
  debug: true
instruments:
  - name: psr36
    midi_device: mock-psr
    program: 5
    notices:
      - parameter: Sustain
        value: "off"
  - name: d5
    midi_device: mock-d5
    channel: 2
"#;

    fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("synthrecord.yaml");
        fs::write(&path, contents).expect("write");
        (dir, path)
    }

    #[test]
    fn test_parses_file() {
        let (_dir, path) = write_config(CONFIG);
        let config = Recorder::deserialize(&path).expect("config");
        config.validate().expect("valid");

        assert_eq!("mock-capture", config.audio().device());
        let settings = config.settings().expect("settings");
        assert!(settings.program);
        assert_eq!((1, 48000), (settings.channels, settings.rate));
        assert_eq!(3, settings.playback.notes());
        assert_eq!(1600, settings.playback.note_window_ms());
        assert_eq!(300, settings.output.threshold);
        assert_eq!(2, settings.output.exporters.len());

        let instruments = config.instruments().expect("instruments");
        assert_eq!(
            vec!["psr36 on mock-psr channel 1", "d5 on mock-d5 channel 2"],
            instruments
                .iter()
                .map(|i| i.to_string())
                .collect::<Vec<String>>()
        );
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Recorder::deserialize(Path::new("/nonexistent/synthrecord.yaml")),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let (_dir, path) = write_config(&CONFIG.replace("48000", "44000"));
        let config = Recorder::deserialize(&path).expect("config");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let (_dir, path) = write_config(&CONFIG.replace("channel: 2", "channel: 20"));
        let config = Recorder::deserialize(&path).expect("config");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_audio_is_required() {
        let (_dir, path) = write_config("program: false\n");
        assert!(Recorder::deserialize(&path).is_err());
    }
}
