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
use std::{error::Error, fmt, thread};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level};

use crate::{
    capture::{CaptureWriter, Driver as CaptureDriver, Sample},
    thread_priority,
};

/// A running input stream. The stream itself lives on its own thread since cpal streams
/// can't be sent between threads.
struct Running {
    stop_tx: crossbeam_channel::Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// A capture driver backed by a cpal input device.
pub struct Driver {
    /// The name of the device.
    name: String,
    /// The maximum number of input channels the device supports.
    max_channels: u16,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// The channel count to capture.
    channels: u16,
    /// The sample rate to capture at.
    rate: u32,
    running: Mutex<Option<Running>>,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name,
            self.max_channels,
            self.host_id.name()
        )
    }
}

impl Driver {
    /// Lists cpal input devices as capture drivers.
    pub fn list() -> Result<Vec<Box<dyn CaptureDriver>>, Box<dyn Error>> {
        Ok(Driver::list_cpal_devices()?
            .into_iter()
            .map(|driver| {
                let driver: Box<dyn CaptureDriver> = Box::new(driver);
                driver
            })
            .collect())
    }

    fn list_cpal_devices() -> Result<Vec<Driver>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut drivers: Vec<Driver> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.input_devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list input devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let input_configs = match device.supported_input_configs() {
                    Ok(input_configs) => input_configs,
                    Err(_) => continue,
                };

                let max_channels = input_configs
                    .map(|input_config| input_config.channels())
                    .max()
                    .unwrap_or(0);

                if max_channels > 0 {
                    drivers.push(Driver {
                        name: device.name()?,
                        max_channels,
                        host_id,
                        device,
                        channels: max_channels,
                        rate: 0,
                        running: Mutex::new(None),
                    })
                }
            }
        }

        drivers.sort_by_key(|driver| driver.name.to_string());
        Ok(drivers)
    }

    /// Gets the named input device, configured for the given channel count and rate. The
    /// name "default" picks the default input device.
    pub fn get(name: &str, channels: u16, rate: u32) -> Result<Driver, Box<dyn Error>> {
        let mut drivers = Driver::list_cpal_devices()?;
        let position = if name == "default" {
            let default_name = {
                let _shh_stderr = shh::stderr()?;
                cpal::default_host()
                    .default_input_device()
                    .and_then(|device| device.name().ok())
            };
            drivers
                .iter()
                .position(|driver| Some(driver.name.as_str()) == default_name.as_deref())
        } else {
            drivers
                .iter()
                .position(|driver| driver.name.trim() == name)
        };

        match position {
            Some(position) => {
                let mut driver = drivers.swap_remove(position);
                if driver.max_channels < channels {
                    return Err(format!(
                        "{} channels requested, input device {} only has {}",
                        channels, driver.name, driver.max_channels
                    )
                    .into());
                }
                driver.channels = channels;
                driver.rate = rate;
                Ok(driver)
            }
            None => Err(format!("no input device found with name {}", name).into()),
        }
    }
}

/// Creates the data callback for a stream delivering samples that need conversion.
fn converting_callback<T>(
    writer: CaptureWriter,
) -> impl FnMut(&[T], &cpal::InputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample,
    Sample: cpal::FromSample<T>,
{
    let mut deliver = delivery(writer);
    let mut scratch: Vec<Sample> = Vec::new();
    move |data: &[T], _: &cpal::InputCallbackInfo| {
        scratch.clear();
        scratch.extend(
            data.iter()
                .map(|sample| <Sample as cpal::FromSample<T>>::from_sample_(*sample)),
        );
        deliver(&scratch);
    }
}

/// Returns the function that hands frames to the writer from the cpal callback thread.
fn delivery(writer: CaptureWriter) -> impl FnMut(&[Sample]) + Send + 'static {
    let priority = thread_priority::callback_thread_priority();
    let rt_audio = thread_priority::rt_audio_enabled();
    let mut priority_set = false;
    let mut overflowed = false;

    move |data: &[Sample]| {
        thread_priority::configure_audio_thread_priority(priority, rt_audio, &mut priority_set);

        let offered = data.len() / writer.channels() as usize;
        let accepted = writer.write(data);
        if accepted < offered && !overflowed {
            overflowed = true;
            warn!(
                offered,
                accepted,
                frames_written = writer.frames_written(),
                "Capture buffer is full, dropping frames."
            );
        }
    }
}

/// Builds the input stream, preferring the native sample type and falling back to float.
fn build_stream(
    device: &cpal::Device,
    writer: CaptureWriter,
) -> Result<cpal::Stream, Box<dyn Error>> {
    let config = cpal::StreamConfig {
        channels: writer.channels(),
        sample_rate: writer.rate(),
        buffer_size: cpal::BufferSize::Default,
    };

    let mut deliver = delivery(writer.clone());
    match device.build_input_stream(
        &config,
        move |data: &[Sample], _: &cpal::InputCallbackInfo| deliver(data),
        |err| error!(err = err.to_string(), "CPAL input stream error"),
        None,
    ) {
        Ok(stream) => return Ok(stream),
        Err(e) => info!(
            err = e.to_string(),
            "16 bit input stream unavailable, trying float."
        ),
    }

    Ok(device.build_input_stream(
        &config,
        converting_callback::<f32>(writer),
        |err| error!(err = err.to_string(), "CPAL input stream error"),
        None,
    )?)
}

impl CaptureDriver for Driver {
    fn start(&self, writer: CaptureWriter) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "start capture (cpal)");
        let _enter = span.enter();

        if writer.channels() != self.channels || writer.rate() != self.rate {
            return Err(format!(
                "capture buffer format ({} channels at {}Hz) doesn't match device format ({} channels at {}Hz)",
                writer.channels(),
                writer.rate(),
                self.channels,
                self.rate
            )
            .into());
        }

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(format!("capture already running on {}", self.name).into());
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (started_tx, started_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let device = self.device.clone();
        let thread = thread::spawn(move || {
            let stream = match build_stream(&device, writer) {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = started_tx.send(Err(e.to_string()));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = started_tx.send(Err(e.to_string()));
                return;
            }
            let _ = started_tx.send(Ok(()));

            // Hold the stream until told to stop.
            let _ = stop_rx.recv();
            drop(stream);
        });

        match started_rx.recv() {
            Ok(Ok(())) => {
                info!(
                    device = self.name,
                    channels = self.channels,
                    rate = self.rate,
                    "CPAL input stream started"
                );
                *running = Some(Running { stop_tx, thread });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(format!("unable to start capture on {}: {}", self.name, e).into())
            }
            Err(_) => {
                let _ = thread.join();
                Err(format!("capture thread for {} exited during startup", self.name).into())
            }
        }
    }

    fn stop(&self) -> Result<(), Box<dyn Error>> {
        let running = match self.running.lock().take() {
            Some(running) => running,
            None => return Ok(()),
        };

        let _ = running.stop_tx.send(());
        if running.thread.join().is_err() {
            return Err("Error while joining capture thread!".into());
        }

        info!(device = self.name, "CPAL input stream stopped");
        Ok(())
    }
}
