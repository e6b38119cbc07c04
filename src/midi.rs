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
use std::{error::Error, fmt, sync::Arc};

use midly::{
    live::LiveEvent,
    num::{u4, u7},
    MidiMessage,
};

mod midir;
mod mock;
mod note;

pub use note::{note_name, note_value};

/// Controller number of the channel mode message that silences every sounding note.
const ALL_NOTES_OFF_CONTROLLER: u8 = 123;

/// A MIDI device that instruments are played through.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Returns the name of the device.
    fn name(&self) -> String;

    /// Sends an event. The event has been written to the device when this returns.
    fn emit(&self, event: LiveEvent<'static>) -> Result<(), Box<dyn Error>>;
}

/// Lists the names of the output ports known to midir.
pub fn list_devices() -> Result<Vec<String>, Box<dyn Error>> {
    midir::list()
}

/// Connects to the device with the given name. A device that can't be opened fails here,
/// before anything is scheduled.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::connect(name)?));
    };

    Ok(Arc::new(midir::get(name)?))
}

/// Gets a device that remembers what it's sent and never touches hardware, for working out
/// a run ahead of time.
pub fn offline_device(name: &str) -> Arc<dyn Device> {
    Arc::new(mock::Device::get(name))
}

pub fn note_on(channel: u4, key: u7, vel: u7) -> LiveEvent<'static> {
    LiveEvent::Midi {
        channel,
        message: MidiMessage::NoteOn { key, vel },
    }
}

pub fn note_off(channel: u4, key: u7, vel: u7) -> LiveEvent<'static> {
    LiveEvent::Midi {
        channel,
        message: MidiMessage::NoteOff { key, vel },
    }
}

pub fn control_change(channel: u4, controller: u7, value: u7) -> LiveEvent<'static> {
    LiveEvent::Midi {
        channel,
        message: MidiMessage::Controller { controller, value },
    }
}

/// Silences everything sounding on the channel, including notes held by a sustain pedal
/// the recorder doesn't know about.
pub fn all_notes_off(channel: u4) -> LiveEvent<'static> {
    control_change(
        channel,
        u7::from_int_lossy(ALL_NOTES_OFF_CONTROLLER),
        u7::from_int_lossy(0),
    )
}

pub fn program_change(channel: u4, program: u7) -> LiveEvent<'static> {
    LiveEvent::Midi {
        channel,
        message: MidiMessage::ProgramChange { program },
    }
}
