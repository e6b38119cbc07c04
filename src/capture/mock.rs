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
use std::{
    error::Error,
    fmt, thread,
    time::{Duration, Instant},
};

use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use tracing::{info, span, Level};

use crate::capture::{CaptureWriter, Driver as CaptureDriver, Sample};

/// The magnitude of the square wave the mock device "records".
pub const LEVEL: Sample = 1000;

const TICK: Duration = Duration::from_millis(1);

struct Running {
    stop_tx: crossbeam_channel::Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// A mock capture device. It delivers a square wave in real time. A device named with "fail"
/// in it refuses to start.
pub struct Driver {
    name: String,
    running: Mutex<Option<Running>>,
}

impl Driver {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Driver {
        Driver {
            name: name.to_string(),
            running: Mutex::new(None),
        }
    }

    /// Returns true if the device is currently capturing.
    #[cfg(test)]
    pub fn is_capturing(&self) -> bool {
        self.running.lock().is_some()
    }
}

/// Writes however many frames have come due since the start of capture.
fn generate(writer: CaptureWriter, stop_rx: crossbeam_channel::Receiver<()>) {
    let channels = writer.channels() as usize;
    let rate = writer.rate() as u128;
    let start = Instant::now();
    let mut delivered: u128 = 0;
    let mut chunk: Vec<Sample> = Vec::new();

    loop {
        match stop_rx.recv_timeout(TICK) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }

        let due = start.elapsed().as_micros() * rate / 1_000_000;
        let frames = (due - delivered) as usize;
        chunk.clear();
        for frame in 0..frames {
            // Alternate polarity every frame.
            let sample = if (delivered as usize + frame) % 2 == 0 {
                LEVEL
            } else {
                -LEVEL
            };
            chunk.resize(chunk.len() + channels, sample);
        }
        writer.write(&chunk);
        delivered = due;
    }
}

impl CaptureDriver for Driver {
    fn start(&self, writer: CaptureWriter) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "start capture (mock)");
        let _enter = span.enter();

        if self.name.contains("fail") {
            return Err(format!("mock device {} failed to start", self.name).into());
        }

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(format!("capture already running on {}", self.name).into());
        }

        info!(
            device = self.name,
            channels = writer.channels(),
            rate = writer.rate(),
            "Starting mock capture."
        );
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let thread = thread::spawn(move || generate(writer, stop_rx));
        *running = Some(Running { stop_tx, thread });

        Ok(())
    }

    fn stop(&self) -> Result<(), Box<dyn Error>> {
        let running = match self.running.lock().take() {
            Some(running) => running,
            None => return Ok(()),
        };

        let _ = running.stop_tx.send(());
        if running.thread.join().is_err() {
            return Err("Error while joining thread!".into());
        }

        info!(device = self.name, "Stopped mock capture.");
        Ok(())
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}
