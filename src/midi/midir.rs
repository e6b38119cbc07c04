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
use std::{error::Error, fmt};

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use midly::live::LiveEvent;
use parking_lot::Mutex;
use tracing::{debug, info, span, Level};

/// A connected midir output port. The connection is opened when the device is looked up
/// and held for the rest of the run.
pub struct Device {
    name: String,
    connection: Mutex<MidiOutputConnection>,
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn emit(&self, event: LiveEvent<'static>) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::DEBUG, "emit (midir)");
        let _enter = span.enter();

        // Choosing 8 here because that's what nodi does.
        let mut buf: Vec<u8> = Vec::with_capacity(8);
        event.write(&mut buf)?;

        debug!(
            device = self.name,
            event = format!("{:?}", event),
            "Emitting event."
        );
        self.connection.lock().send(&buf)?;

        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Output)", self.name)
    }
}

/// Lists the names of the midir output ports.
pub fn list() -> Result<Vec<String>, Box<dyn Error>> {
    let output = MidiOutput::new("synthrecord output listing")?;
    let mut names = output
        .ports()
        .iter()
        .map(|port| output.port_name(port))
        .collect::<Result<Vec<String>, _>>()?;

    names.sort();
    names.dedup();
    Ok(names)
}

/// Connects to the output port whose name contains the given name. The match must be unique.
pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
    let output = MidiOutput::new("synthrecord output")?;

    let mut matches: Vec<(String, MidiOutputPort)> = Vec::new();
    for port in output.ports() {
        let port_name = output.port_name(&port)?;
        if port_name.contains(name) && !matches.iter().any(|(seen, _)| *seen == port_name) {
            matches.push((port_name, port));
        }
    }

    if matches.is_empty() {
        return Err(format!("no device found with name {}", name).into());
    }
    if matches.len() > 1 {
        return Err(format!(
            "found too many devices that match ({}), use a less ambiguous device name",
            matches
                .iter()
                .map(|(port_name, _)| port_name.clone())
                .collect::<Vec<String>>()
                .join(", ")
        )
        .into());
    }

    let (port_name, port) = matches.swap_remove(0);
    let connection = output
        .connect(&port, "synthrecord player")
        .map_err(|e| format!("unable to connect to {}: {}", port_name, e))?;
    info!(device = port_name.as_str(), "Connected to MIDI output.");

    Ok(Device {
        name: port_name,
        connection: Mutex::new(connection),
    })
}
