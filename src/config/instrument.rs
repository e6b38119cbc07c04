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
use std::{error::Error, sync::Arc};

use midly::num::u4;
use serde::Deserialize;

use super::{error::ConfigError, seven_bit};
use crate::{midi, recorder};

/// A control change sent while programming an instrument.
#[derive(Deserialize, Clone, Debug)]
pub struct ControlChange {
    controller: u8,
    value: u8,
}

/// A parameter the operator has to set by hand.
#[derive(Deserialize, Clone, Debug)]
pub struct Notice {
    parameter: String,
    value: String,
}

/// A YAML representation of an instrument.
#[derive(Deserialize, Clone, Debug)]
pub struct Instrument {
    name: String,

    /// The MIDI output the instrument is connected to.
    midi_device: String,

    /// The MIDI channel, from 1 to 16 (default: 1)
    channel: Option<u8>,

    /// Program to select before playback.
    program: Option<u8>,

    #[serde(default)]
    control_changes: Vec<ControlChange>,

    #[serde(default)]
    notices: Vec<Notice>,
}

impl Instrument {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn midi_device(&self) -> &str {
        &self.midi_device
    }

    /// Returns the zero based MIDI channel.
    pub fn channel(&self) -> Result<u4, ConfigError> {
        let channel = self.channel.unwrap_or(1);
        if !(1..=16).contains(&channel) {
            return Err(ConfigError::invalid(format!(
                "instrument {}: channel must be between 1 and 16, got {}",
                self.name, channel
            )));
        }
        Ok(u4::from_int_lossy(channel - 1))
    }

    /// Checks every value without connecting to anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.with_device(midi::offline_device(&self.midi_device))
            .map(|_| ())
    }

    /// Connects to the MIDI device and builds the instrument.
    pub fn to_instrument(&self) -> Result<recorder::Instrument, Box<dyn Error>> {
        self.validate()?;
        Ok(self.with_device(midi::get_device(&self.midi_device)?)?)
    }

    /// Builds the instrument on top of an offline device, for planning.
    pub fn to_offline_instrument(&self) -> Result<recorder::Instrument, ConfigError> {
        self.with_device(midi::offline_device(&self.midi_device))
    }

    fn with_device(
        &self,
        device: Arc<dyn midi::Device>,
    ) -> Result<recorder::Instrument, ConfigError> {
        let mut instrument = recorder::Instrument::new(&self.name, device, self.channel()?);
        if let Some(program) = self.program {
            instrument = instrument.with_program(seven_bit("program", program)?);
        }
        for control_change in self.control_changes.iter() {
            instrument = instrument.with_control_change(
                seven_bit("controller", control_change.controller)?,
                seven_bit("value", control_change.value)?,
            );
        }
        for notice in self.notices.iter() {
            instrument = instrument.with_manual_parameter(&notice.parameter, &notice.value);
        }
        Ok(instrument)
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Instrument {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .expect("build")
            .try_deserialize::<Instrument>()
            .expect("deserialize")
    }

    #[test]
    fn test_full_instrument() {
        let instrument = parse(
            r#"
            name: psr36
            midi_device: mock-psr
            channel: 10
            program: 5
            control_changes:
              - controller: 7
                value: 100
            notices:
              - parameter: Sustain
                value: "0"
            "#,
        );

        assert_eq!("psr36", instrument.name());
        assert_eq!("mock-psr", instrument.midi_device());
        assert_eq!(9, instrument.channel().expect("channel").as_int());
        assert!(instrument.validate().is_ok());

        let built = instrument.to_instrument().expect("instrument");
        assert_eq!("psr36", built.name());
        assert_eq!("psr36 on mock-psr channel 10", built.to_string());
    }

    #[test]
    fn test_minimal_instrument() {
        let instrument = parse("name: d5\nmidi_device: mock-d5");
        assert_eq!(0, instrument.channel().expect("channel").as_int());
        assert!(instrument.validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(parse("name: a\nmidi_device: mock\nchannel: 0")
            .validate()
            .is_err());
        assert!(parse("name: a\nmidi_device: mock\nchannel: 17")
            .validate()
            .is_err());
        assert!(parse("name: a\nmidi_device: mock\nprogram: 128")
            .validate()
            .is_err());
        assert!(parse(
            "name: a\nmidi_device: mock\ncontrol_changes:\n  - controller: 130\n    value: 1"
        )
        .validate()
        .is_err());
    }
}
